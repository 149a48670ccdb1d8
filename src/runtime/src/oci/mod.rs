//! Image handling for bpack.
//!
//! Images live in a local store as OCI image layouts:
//!
//! ```text
//! ~/.bpack/images/
//! ├── index.json                 (reference → layout)
//! └── sha256/<manifest digest>/
//!     ├── oci-layout
//!     ├── index.json
//!     └── blobs/sha256/
//!         ├── <manifest>
//!         ├── <config>
//!         └── <layers>
//! ```
//!
//! Builder assembly and rebase work against the [`Image`] trait; images are
//! obtained through an [`ImageFetcher`] under a [`PullPolicy`].

pub mod fetch;
pub mod image;
pub mod local;
pub mod reference;
pub mod registry;
pub mod store;

pub use fetch::{ImageFetcher, PullPolicy, StoreFetcher};
pub use image::{Image, LayerBlob};
pub use local::LocalImage;
pub use reference::ImageReference;
pub use registry::RegistryPuller;
pub use store::{ImageStore, StoredImage};

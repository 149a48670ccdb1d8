//! bpack Core - Foundational Types
//!
//! Error taxonomy, on-disk configuration, buildpack and order types, and the
//! lifecycle metadata label shared by the runtime and the CLI.

pub mod buildpack;
pub mod config;
pub mod error;
pub mod metadata;
pub mod volume;

// Re-export commonly used types
pub use buildpack::{Buildpack, BuildpackDescriptor, BuildpackGroup, BuildpackOrder};
pub use config::{PackConfig, RunImageConfig};
pub use error::{CleanupErrors, PackError, ResourceFailure, Result};
pub use metadata::{AppImageMetadata, StackMetadata, LIFECYCLE_METADATA_LABEL};
pub use volume::VolumeConfig;

/// bpack version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

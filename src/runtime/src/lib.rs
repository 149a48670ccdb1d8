//! bpack runtime - builder assembly, run-image resolution and rebase.
//!
//! This crate holds the image model and local OCI store, the ephemeral
//! builder assembler with its tar layer builder, and the rebase flow.

#![allow(clippy::result_large_err)]

pub mod build;
pub mod engine;
pub mod oci;
pub mod rebase;
pub mod volume;

#[cfg(test)]
pub mod testing;

// Re-export common types
pub use build::{inspect_builder, BuilderHandoff, BuilderInfo, Lifecycle, LifecycleConfig, NameGenerator, RandomNames};
pub use engine::{ContainerEngine, LocalEngine};
pub use oci::{Image, ImageFetcher, ImageReference, ImageStore, LocalImage, PullPolicy, StoreFetcher};
pub use rebase::{RebaseConfig, RebaseFactory, RebaseFlags};
pub use volume::VolumeStore;

/// bpack runtime version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Run-image resolution and rebase.
//!
//! [`RebaseFactory::rebase_config_from_flags`] picks the run image an app
//! image should move onto; [`RebaseFactory::rebase`] swaps the base layers
//! and rewrites the lifecycle metadata label.

mod mutate;
mod resolve;

use std::sync::Arc;

use bpack_core::config::PackConfig;

use crate::oci::ImageFetcher;

pub use resolve::{RebaseConfig, RebaseFlags};
pub(crate) use resolve::stack_metadata;

/// Entry point for rebase operations.
pub struct RebaseFactory {
    fetcher: Arc<dyn ImageFetcher>,
    config: PackConfig,
}

impl RebaseFactory {
    pub fn new(fetcher: Arc<dyn ImageFetcher>, config: PackConfig) -> Self {
        Self { fetcher, config }
    }
}

//! Image fetching with an explicit pull policy.

use std::sync::Arc;

use async_trait::async_trait;
use bpack_core::error::{PackError, Result};

use super::image::Image;
use super::local::LocalImage;
use super::reference::ImageReference;
use super::registry::RegistryPuller;
use super::store::ImageStore;

/// Whether a fetch may or must go to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullPolicy {
    /// Always pull, replacing any local copy
    Always,
    /// Use the local copy when present, pull otherwise
    IfNotPresent,
    /// Local store only
    Never,
}

impl PullPolicy {
    /// `publish` wins over `no_pull`.
    pub fn from_flags(publish: bool, no_pull: bool) -> Self {
        if publish {
            PullPolicy::Always
        } else if no_pull {
            PullPolicy::Never
        } else {
            PullPolicy::IfNotPresent
        }
    }
}

impl std::fmt::Display for PullPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PullPolicy::Always => "always",
            PullPolicy::IfNotPresent => "if-not-present",
            PullPolicy::Never => "never",
        };
        f.write_str(s)
    }
}

/// Resolves a reference to an image handle.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, reference: &str, policy: PullPolicy) -> Result<Box<dyn Image>>;
}

/// Fetcher over the local store, falling back to the registry.
pub struct StoreFetcher {
    store: Arc<ImageStore>,
    puller: RegistryPuller,
}

impl StoreFetcher {
    pub fn new(store: Arc<ImageStore>) -> Self {
        Self {
            store,
            puller: RegistryPuller::new(),
        }
    }

    async fn pull_and_store(&self, reference: &ImageReference) -> Result<LocalImage> {
        let full_ref = reference.full_reference();
        let staging = self.store.staging_dir()?;
        let digest = self.puller.pull(reference, staging.path()).await?;
        self.store.put(&full_ref, &digest, staging.path()).await?;
        LocalImage::open(self.store.clone(), &full_ref).await
    }
}

#[async_trait]
impl ImageFetcher for StoreFetcher {
    async fn fetch(&self, reference: &str, policy: PullPolicy) -> Result<Box<dyn Image>> {
        let parsed = ImageReference::parse(reference)?;
        let full_ref = parsed.full_reference();
        tracing::debug!(reference = %full_ref, policy = %policy, "Fetching image");

        let mut image = match policy {
            PullPolicy::Always => self.pull_and_store(&parsed).await?,
            PullPolicy::IfNotPresent => {
                if self.store.get(&full_ref).await.is_some() {
                    tracing::debug!(reference = %full_ref, "Using local image");
                    LocalImage::open(self.store.clone(), &full_ref).await?
                } else {
                    self.pull_and_store(&parsed).await?
                }
            }
            PullPolicy::Never => {
                if self.store.get(&full_ref).await.is_none() {
                    return Err(PackError::NotFound(format!(
                        "image {} not found locally and pulling is disabled",
                        reference
                    )));
                }
                LocalImage::open(self.store.clone(), &full_ref).await?
            }
        };

        // Keep the caller's spelling of the name
        image.rename(reference);
        Ok(Box::new(image))
    }
}

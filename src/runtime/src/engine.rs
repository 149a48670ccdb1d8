//! Container-engine operations used to tear down build resources.

use std::sync::Arc;

use async_trait::async_trait;
use bpack_core::error::Result;

use crate::oci::ImageStore;
use crate::volume::VolumeStore;

/// Image and volume removal.
///
/// Both operations return `PackError::NotFound` when the resource does not
/// exist, so callers can tell "already gone" from a real failure.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    async fn remove_image(&self, reference: &str) -> Result<()>;

    async fn remove_volume(&self, name: &str, force: bool) -> Result<()>;
}

/// Engine backed by the local image and volume stores.
pub struct LocalEngine {
    images: Arc<ImageStore>,
    volumes: Arc<VolumeStore>,
}

impl LocalEngine {
    pub fn new(images: Arc<ImageStore>, volumes: Arc<VolumeStore>) -> Self {
        Self { images, volumes }
    }

    pub fn volumes(&self) -> &VolumeStore {
        &self.volumes
    }
}

#[async_trait]
impl ContainerEngine for LocalEngine {
    async fn remove_image(&self, reference: &str) -> Result<()> {
        self.images.remove(reference).await?;
        tracing::debug!(image = %reference, "Removed image");
        Ok(())
    }

    async fn remove_volume(&self, name: &str, force: bool) -> Result<()> {
        self.volumes.remove(name, force)?;
        Ok(())
    }
}

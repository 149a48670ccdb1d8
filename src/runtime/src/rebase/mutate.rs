//! Base-layer swap and metadata rewrite.

use bpack_core::error::{PackError, Result};
use bpack_core::metadata::{AppImageMetadata, LIFECYCLE_METADATA_LABEL};

use super::{RebaseConfig, RebaseFactory};

impl RebaseFactory {
    /// Move `config.image` onto `config.new_base_image` and save it.
    ///
    /// Only `runImage.topLayer` and `runImage.sha` change in the metadata
    /// label; every other field is written back as read. The label is set
    /// before saving, and nothing is saved if any earlier step fails.
    pub async fn rebase(&self, config: RebaseConfig) -> Result<String> {
        let RebaseConfig {
            mut image,
            new_base_image,
        } = config;

        let label = image
            .label(LIFECYCLE_METADATA_LABEL)?
            .filter(|l| !l.trim().is_empty())
            .ok_or_else(|| {
                PackError::Config(format!(
                    "image {} is missing label {}",
                    image.name(),
                    LIFECYCLE_METADATA_LABEL
                ))
            })?;
        let mut metadata = AppImageMetadata::from_label(&label)?;

        let old_top = metadata
            .run_image
            .top_layer
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                PackError::Config(format!("image {} has no run image top layer", image.name()))
            })?;

        image.rebase(&old_top, new_base_image.as_ref())?;

        metadata.run_image.top_layer = Some(new_base_image.top_layer()?);
        metadata.run_image.sha = Some(new_base_image.digest()?);
        image.set_label(LIFECYCLE_METADATA_LABEL, &metadata.to_label()?)?;

        let digest = image.save().await?;
        tracing::info!(
            image = %image.name(),
            run_image = %new_base_image.name(),
            digest = %digest,
            "Rebased image"
        );
        Ok(digest)
    }
}

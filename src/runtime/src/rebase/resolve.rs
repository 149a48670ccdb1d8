//! Run-image resolution.

use bpack_core::error::{PackError, Result};
use bpack_core::metadata::{StackMetadata, LIFECYCLE_METADATA_LABEL};

use super::RebaseFactory;
use crate::oci::reference::registry_host;
use crate::oci::{Image, PullPolicy};

/// User input to a rebase.
#[derive(Debug, Clone, Default)]
pub struct RebaseFlags {
    /// App image to rebase
    pub repo_name: String,
    /// Overrides the run image declared in the app image's label
    pub run_image: Option<String>,
    pub publish: bool,
    pub no_pull: bool,
}

/// The app image and the run image it moves onto.
pub struct RebaseConfig {
    pub image: Box<dyn Image>,
    pub new_base_image: Box<dyn Image>,
}

impl std::fmt::Debug for RebaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RebaseConfig")
            .field("image", &self.image.name())
            .field("new_base_image", &self.new_base_image.name())
            .finish()
    }
}

impl RebaseFactory {
    /// Fetch the app image and the run image it should be rebased onto.
    ///
    /// The run image is `flags.run_image` when given, otherwise the one
    /// declared in the app image's stack metadata. A mirror is used instead
    /// when one lives on the same registry as `flags.repo_name`; locally
    /// configured mirrors are considered before those in the label.
    pub async fn rebase_config_from_flags(&self, flags: &RebaseFlags) -> Result<RebaseConfig> {
        let policy = PullPolicy::from_flags(flags.publish, flags.no_pull);

        let image = self.fetcher.fetch(&flags.repo_name, policy).await?;
        let explicit = flags.run_image.as_deref().filter(|r| !r.is_empty());

        // An explicit run image only needs the label for its mirrors
        let stack = match explicit {
            Some(_) => stack_metadata(image.as_ref()).unwrap_or_else(|e| {
                tracing::warn!(image = %flags.repo_name, error = %e, "Ignoring unreadable stack metadata");
                StackMetadata::default()
            }),
            None => stack_metadata(image.as_ref())?,
        };

        let base = match explicit {
            Some(run_image) => run_image.to_string(),
            None => stack
                .run_image()
                .map(str::to_string)
                .ok_or_else(|| PackError::Config("run image must be specified".to_string()))?,
        };

        let mut candidates: Vec<&str> = Vec::new();
        let local = self.config.run_image_mirrors(&base).iter();
        let from_label = stack
            .run_image()
            .filter(|image| *image == base)
            .map(|_| stack.run_image.mirrors.as_slice())
            .unwrap_or(&[])
            .iter();
        for mirror in local.chain(from_label) {
            if !mirror.is_empty() && !candidates.contains(&mirror.as_str()) {
                candidates.push(mirror);
            }
        }

        let run_image = select_mirror(&flags.repo_name, &base, &candidates)?;
        tracing::info!(
            image = %flags.repo_name,
            run_image = %run_image,
            policy = %policy,
            "Selected run image"
        );

        let new_base_image = self.fetcher.fetch(&run_image, policy).await?;
        Ok(RebaseConfig {
            image,
            new_base_image,
        })
    }
}

/// Stack metadata from an image's lifecycle label. A missing or empty label
/// declares nothing.
pub(crate) fn stack_metadata(image: &dyn Image) -> Result<StackMetadata> {
    match image.label(LIFECYCLE_METADATA_LABEL)? {
        Some(label) if !label.trim().is_empty() => StackMetadata::from_label(&label).map_err(|e| {
            PackError::Config(format!(
                "parsing label {} of {}: {}",
                LIFECYCLE_METADATA_LABEL,
                image.name(),
                e
            ))
        }),
        _ => Ok(StackMetadata::default()),
    }
}

/// First candidate on the same registry as `repo_name`, else `base`.
fn select_mirror(repo_name: &str, base: &str, candidates: &[&str]) -> Result<String> {
    let repo_host = registry_host(repo_name)?;
    for candidate in candidates {
        match registry_host(candidate) {
            Ok(host) if host == repo_host => return Ok(candidate.to_string()),
            Ok(_) => {}
            Err(e) => tracing::warn!(mirror = %candidate, error = %e, "Skipping invalid mirror"),
        }
    }
    Ok(base.to_string())
}

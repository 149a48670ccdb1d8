//! Builder inspection.

use bpack_core::config::PackConfig;
use bpack_core::error::Result;
use serde::Serialize;

use crate::oci::{ImageFetcher, PullPolicy};
use crate::rebase::stack_metadata;

/// Label holding the stack a builder was built for.
pub const STACK_ID_LABEL: &str = "io.buildpacks.stack.id";

/// Run image settings of a builder as seen from this machine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuilderInfo {
    pub name: String,
    pub stack: Option<String>,
    /// Run image declared by the builder
    pub run_image: Option<String>,
    /// Mirrors declared by the builder
    pub run_image_mirrors: Vec<String>,
    /// Mirrors configured locally for the declared run image
    pub local_run_image_mirrors: Vec<String>,
}

/// Read the run image and mirrors a builder declares, together with the
/// mirrors configured for that run image in `config`.
///
/// `PullPolicy::Never` restricts the lookup to the local store.
pub async fn inspect_builder(
    fetcher: &dyn ImageFetcher,
    config: &PackConfig,
    name: &str,
    policy: PullPolicy,
) -> Result<BuilderInfo> {
    let image = fetcher.fetch(name, policy).await?;
    let stack = stack_metadata(image.as_ref())?;

    let run_image = stack.run_image().map(str::to_string);
    let local_run_image_mirrors = run_image
        .as_deref()
        .map(|r| config.run_image_mirrors(r).to_vec())
        .unwrap_or_default();

    tracing::debug!(builder = %name, run_image = ?run_image, "Inspected builder");
    Ok(BuilderInfo {
        name: name.to_string(),
        stack: image.label(STACK_ID_LABEL)?.filter(|s| !s.is_empty()),
        run_image,
        run_image_mirrors: stack.run_image.mirrors,
        local_run_image_mirrors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeFetcher, FakeImage};
    use bpack_core::error::PackError;
    use bpack_core::metadata::LIFECYCLE_METADATA_LABEL;
    use tempfile::TempDir;

    const BUILDER: &str = "cnbs/sample-builder:bionic";

    fn builder() -> FakeImage {
        FakeImage::new(BUILDER)
            .with_label(STACK_ID_LABEL, "io.buildpacks.stacks.bionic")
            .with_label(
                LIFECYCLE_METADATA_LABEL,
                r#"{"stack":{"runImage":{"image":"cnbs/run","mirrors":["gcr.io/cnbs/run"]}}}"#,
            )
    }

    fn config(tmp: &TempDir) -> PackConfig {
        let mut config = PackConfig::load(&tmp.path().join("config.toml")).unwrap();
        config.set_run_image_mirrors("cnbs/run", vec!["registry.local/cnbs/run".to_string()]);
        config.set_run_image_mirrors("other/run", vec!["registry.local/other".to_string()]);
        config
    }

    #[tokio::test]
    async fn test_inspect_builder() {
        let tmp = TempDir::new().unwrap();
        let fetcher = FakeFetcher::new().with_image(BUILDER, builder());

        let info = inspect_builder(&fetcher, &config(&tmp), BUILDER, PullPolicy::IfNotPresent)
            .await
            .unwrap();

        assert_eq!(
            info,
            BuilderInfo {
                name: BUILDER.to_string(),
                stack: Some("io.buildpacks.stacks.bionic".to_string()),
                run_image: Some("cnbs/run".to_string()),
                run_image_mirrors: vec!["gcr.io/cnbs/run".to_string()],
                local_run_image_mirrors: vec!["registry.local/cnbs/run".to_string()],
            }
        );
    }

    #[tokio::test]
    async fn test_inspect_builder_without_metadata() {
        let tmp = TempDir::new().unwrap();
        let fetcher = FakeFetcher::new().with_image(BUILDER, FakeImage::new(BUILDER));

        let info = inspect_builder(&fetcher, &config(&tmp), BUILDER, PullPolicy::Never)
            .await
            .unwrap();

        assert_eq!(info.run_image, None);
        assert_eq!(info.stack, None);
        assert!(info.run_image_mirrors.is_empty());
        assert!(info.local_run_image_mirrors.is_empty());
        assert_eq!(fetcher.fetches(), vec![(BUILDER.to_string(), PullPolicy::Never)]);
    }

    #[tokio::test]
    async fn test_inspect_builder_invalid_label() {
        let tmp = TempDir::new().unwrap();
        let image = FakeImage::new(BUILDER).with_label(LIFECYCLE_METADATA_LABEL, "{");
        let fetcher = FakeFetcher::new().with_image(BUILDER, image);

        let err = inspect_builder(&fetcher, &config(&tmp), BUILDER, PullPolicy::IfNotPresent)
            .await
            .unwrap_err();
        assert!(matches!(err, PackError::Config(_)));
    }

    #[tokio::test]
    async fn test_inspect_missing_builder() {
        let tmp = TempDir::new().unwrap();
        let fetcher = FakeFetcher::new();

        let err = inspect_builder(&fetcher, &config(&tmp), BUILDER, PullPolicy::Never)
            .await
            .unwrap_err();
        assert!(matches!(err, PackError::NotFound(_)));
    }
}

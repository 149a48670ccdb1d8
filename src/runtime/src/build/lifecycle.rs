//! Ephemeral builder assembly and teardown.
//!
//! A build session starts from a base builder image and produces a private
//! copy carrying the platform environment, any local buildpacks, and the
//! detection order. The session owns that image and two scratch volumes
//! until [`Lifecycle::cleanup`] removes them.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bpack_core::error::{CleanupErrors, PackError, ResourceFailure, Result};
use serde::Serialize;

use super::buildpack::{order_layer, resolve_buildpacks};
use super::layer::env_layer;
use super::names::{app_volume_name, builder_image_name, layers_volume_name, NameGenerator};
use crate::engine::ContainerEngine;
use crate::oci::{Image, ImageFetcher, PullPolicy};

/// Builder image variable holding the uid the lifecycle runs as.
pub const ENV_USER_ID: &str = "CNB_USER_ID";

/// Builder image variable holding the gid the lifecycle runs as.
pub const ENV_GROUP_ID: &str = "CNB_GROUP_ID";

/// Input to builder assembly.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Base builder image reference
    pub builder_image: String,
    /// Platform environment written to `platform/env/`
    pub env: HashMap<String, String>,
    /// Buildpack references in detection order
    pub buildpacks: Vec<String>,
    pub app_dir: PathBuf,
    pub pull_policy: PullPolicy,
}

/// What the lifecycle phases need to run against an assembled builder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuilderHandoff {
    pub builder_image: String,
    pub uid: u32,
    pub gid: u32,
    pub layers_volume: String,
    pub app_volume: String,
    pub app_dir: PathBuf,
}

/// An assembled ephemeral builder and the resources it owns.
pub struct Lifecycle {
    builder_image: String,
    uid: u32,
    gid: u32,
    layers_volume: String,
    app_volume: String,
    app_dir: PathBuf,
    engine: Arc<dyn ContainerEngine>,
}

impl std::fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lifecycle")
            .field("builder_image", &self.builder_image)
            .field("uid", &self.uid)
            .field("gid", &self.gid)
            .field("layers_volume", &self.layers_volume)
            .field("app_volume", &self.app_volume)
            .finish()
    }
}

impl Lifecycle {
    /// Assemble an ephemeral builder from `config.builder_image`.
    ///
    /// Steps run strictly in this order, and the first failure aborts:
    ///
    /// 1. fetch the base builder under `config.pull_policy`
    /// 2. rename it to `bpack.local/builder/<hex suffix>`; the base image is
    ///    never written
    /// 3. read `CNB_USER_ID` / `CNB_GROUP_ID` from the builder's environment
    /// 4. add the env layer
    /// 5. add one layer per local buildpack, in reference order
    /// 6. add the order layer
    /// 7. save
    ///
    /// Layers stack in the order they are added, so a path in a later layer
    /// shadows the same path in an earlier one: env < buildpacks < order.
    /// Without buildpack references steps 5 and 6 are skipped and the
    /// builder's own order stays in effect. A remote `id@version` reference
    /// only enters the order layer, so `["org/bp@1.0"]` adds two layers.
    ///
    /// Scratch archives are removed whether or not assembly succeeds. On
    /// failure, whatever was created under the session's names is torn down
    /// before the error is returned.
    pub async fn prepare(
        config: LifecycleConfig,
        fetcher: &dyn ImageFetcher,
        engine: Arc<dyn ContainerEngine>,
        names: &dyn NameGenerator,
    ) -> Result<Self> {
        let mut lifecycle = Self {
            builder_image: builder_image_name(&names.suffix()),
            uid: 0,
            gid: 0,
            layers_volume: layers_volume_name(&names.suffix()),
            app_volume: app_volume_name(&names.suffix()),
            app_dir: config.app_dir.clone(),
            engine,
        };

        match lifecycle.assemble(&config, fetcher).await {
            Ok(()) => Ok(lifecycle),
            Err(e) => {
                tracing::debug!(builder = %lifecycle.builder_image, error = %e, "Assembly failed, cleaning up");
                if let Err(cleanup_err) = lifecycle.cleanup().await {
                    tracing::warn!(error = %cleanup_err, "Cleanup after failed assembly incomplete");
                }
                Err(e)
            }
        }
    }

    async fn assemble(&mut self, config: &LifecycleConfig, fetcher: &dyn ImageFetcher) -> Result<()> {
        let mut builder = fetcher
            .fetch(&config.builder_image, config.pull_policy)
            .await?;
        builder.rename(&self.builder_image);
        tracing::info!(base = %config.builder_image, builder = %self.builder_image, "Creating ephemeral builder");

        self.uid = read_id(builder.as_ref(), ENV_USER_ID)?;
        self.gid = read_id(builder.as_ref(), ENV_GROUP_ID)?;

        // Dropped on every return path
        let tmp_dir = tempfile::Builder::new()
            .prefix("bpack.build.tars")
            .tempdir()
            .map_err(|e| PackError::Build(format!("failed to create scratch directory: {}", e)))?;

        let env_tar = env_layer(tmp_dir.path(), &config.env)?;
        add_layer(builder.as_mut(), "env", &env_tar)?;

        if !config.buildpacks.is_empty() {
            let resolved = resolve_buildpacks(&config.buildpacks, tmp_dir.path(), self.uid, self.gid)?;
            for tar in &resolved.layers {
                add_layer(builder.as_mut(), "buildpack", tar)?;
            }
            let order_tar = order_layer(tmp_dir.path(), &resolved.order)?;
            add_layer(builder.as_mut(), "order", &order_tar)?;
        }

        let digest = builder.save().await.map_err(|e| {
            PackError::Build(format!("failed to save builder {}: {}", self.builder_image, e))
        })?;

        tracing::info!(
            builder = %self.builder_image,
            digest = %digest,
            uid = self.uid,
            gid = self.gid,
            "Ephemeral builder ready"
        );
        Ok(())
    }

    /// Remove the builder image, then the layers volume, then the app volume.
    ///
    /// Every removal is attempted regardless of earlier failures. Resources
    /// that do not exist are skipped. Each failure is logged and collected;
    /// the returned `PackError::Cleanup` lists them in attempt order.
    pub async fn cleanup(&self) -> Result<()> {
        let mut errors = CleanupErrors::new();

        let result = self.engine.remove_image(&self.builder_image).await;
        record(&mut errors, "builder image", &self.builder_image, result);

        let result = self.engine.remove_volume(&self.layers_volume, true).await;
        record(&mut errors, "layers volume", &self.layers_volume, result);

        let result = self.engine.remove_volume(&self.app_volume, true).await;
        record(&mut errors, "app volume", &self.app_volume, result);

        errors.into_result()
    }

    pub fn builder_image(&self) -> &str {
        &self.builder_image
    }

    pub fn uid(&self) -> u32 {
        self.uid
    }

    pub fn gid(&self) -> u32 {
        self.gid
    }

    pub fn layers_volume(&self) -> &str {
        &self.layers_volume
    }

    pub fn app_volume(&self) -> &str {
        &self.app_volume
    }

    pub fn app_dir(&self) -> &Path {
        &self.app_dir
    }

    pub fn handoff(&self) -> BuilderHandoff {
        BuilderHandoff {
            builder_image: self.builder_image.clone(),
            uid: self.uid,
            gid: self.gid,
            layers_volume: self.layers_volume.clone(),
            app_volume: self.app_volume.clone(),
            app_dir: self.app_dir.clone(),
        }
    }
}

/// Ids are unsigned decimal integers; surrounding whitespace is rejected.
fn read_id(image: &dyn Image, key: &str) -> Result<u32> {
    let value = image
        .env(key)
        .map_err(|e| PackError::Config(format!("reading builder env variables: {}", e)))?
        .ok_or_else(|| {
            PackError::Config(format!(
                "builder image {} does not define {}",
                image.name(),
                key
            ))
        })?;

    value.parse::<u32>().map_err(|e| {
        PackError::Config(format!("parsing {} from builder: '{}': {}", key, value, e))
    })
}

fn add_layer(builder: &mut dyn Image, kind: &str, tar: &Path) -> Result<()> {
    builder.add_layer(tar).map_err(|e| {
        PackError::Build(format!(
            "failed to add {} layer {} to builder {}: {}",
            kind,
            tar.display(),
            builder.name(),
            e
        ))
    })
}

fn record(errors: &mut CleanupErrors, kind: &'static str, name: &str, result: Result<()>) {
    match result {
        Ok(()) => tracing::debug!(resource = kind, name = %name, "Cleaned up"),
        Err(PackError::NotFound(_)) => {
            tracing::debug!(resource = kind, name = %name, "Nothing to clean up")
        }
        Err(e) => {
            tracing::warn!(resource = kind, name = %name, error = %e, "Failed to clean up");
            errors.push(ResourceFailure {
                kind,
                name: name.to_string(),
                source: Box::new(e),
            });
        }
    }
}

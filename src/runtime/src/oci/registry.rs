//! Registry client for pulling images.
//!
//! Uses the `oci-distribution` crate with anonymous access and writes each
//! pulled image as an OCI image layout.

use std::path::Path;

use bpack_core::error::{PackError, Result};
use oci_distribution::client::{ClientConfig, ClientProtocol};
use oci_distribution::manifest::{ImageIndexEntry, OciImageManifest};
use oci_distribution::secrets::RegistryAuth;
use oci_distribution::{Client, Reference};

use super::image::digest_hex;
use super::reference::ImageReference;

/// Pulls images from container registries.
pub struct RegistryPuller {
    client: Client,
}

impl Default for RegistryPuller {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryPuller {
    pub fn new() -> Self {
        let config = ClientConfig {
            protocol: ClientProtocol::Https,
            platform_resolver: Some(Box::new(linux_platform_resolver)),
            ..Default::default()
        };
        Self {
            client: Client::new(config),
        }
    }

    /// Pull `reference` into `target_dir` as an OCI layout.
    ///
    /// Returns the manifest digest.
    pub async fn pull(&self, reference: &ImageReference, target_dir: &Path) -> Result<String> {
        let oci_ref = to_oci_reference(reference)?;
        let registry = reference.registry.as_str();

        tracing::info!(reference = %reference, "Pulling image from registry");

        let blobs_dir = target_dir.join("blobs").join("sha256");
        std::fs::create_dir_all(&blobs_dir)
            .map_err(|e| registry_error(registry, "failed to create blobs directory", e))?;

        let (manifest, manifest_digest) = self
            .client
            .pull_image_manifest(&oci_ref, &RegistryAuth::Anonymous)
            .await
            .map_err(|e| registry_error(registry, "failed to pull manifest", e))?;

        let manifest_json = serde_json::to_vec(&manifest)?;
        std::fs::write(blobs_dir.join(digest_hex(&manifest_digest)), &manifest_json)
            .map_err(|e| registry_error(registry, "failed to write manifest", e))?;

        self.pull_blobs(&oci_ref, &manifest, &blobs_dir, registry)
            .await?;

        std::fs::write(
            target_dir.join("oci-layout"),
            r#"{"imageLayoutVersion":"1.0.0"}"#,
        )
        .map_err(|e| registry_error(registry, "failed to write oci-layout", e))?;

        let index = serde_json::json!({
            "schemaVersion": 2,
            "manifests": [{
                "mediaType": "application/vnd.oci.image.manifest.v1+json",
                "digest": manifest_digest,
                "size": manifest_json.len()
            }]
        });
        std::fs::write(
            target_dir.join("index.json"),
            serde_json::to_string_pretty(&index)?,
        )
        .map_err(|e| registry_error(registry, "failed to write index.json", e))?;

        tracing::info!(reference = %reference, digest = %manifest_digest, "Image pulled");
        Ok(manifest_digest)
    }

    async fn pull_blobs(
        &self,
        oci_ref: &Reference,
        manifest: &OciImageManifest,
        blobs_dir: &Path,
        registry: &str,
    ) -> Result<()> {
        let mut config_data: Vec<u8> = Vec::new();
        self.client
            .pull_blob(oci_ref, &manifest.config, &mut config_data)
            .await
            .map_err(|e| registry_error(registry, "failed to pull config blob", e))?;
        std::fs::write(blobs_dir.join(digest_hex(&manifest.config.digest)), &config_data)
            .map_err(|e| registry_error(registry, "failed to write config blob", e))?;

        for layer in &manifest.layers {
            tracing::debug!(digest = %layer.digest, size = layer.size, "Pulling layer");

            let mut layer_data: Vec<u8> = Vec::new();
            self.client
                .pull_blob(oci_ref, layer, &mut layer_data)
                .await
                .map_err(|e| {
                    registry_error(registry, &format!("failed to pull layer {}", layer.digest), e)
                })?;
            std::fs::write(blobs_dir.join(digest_hex(&layer.digest)), &layer_data)
                .map_err(|e| registry_error(registry, "failed to write layer blob", e))?;
        }

        Ok(())
    }
}

fn registry_error(registry: &str, what: &str, err: impl std::fmt::Display) -> PackError {
    PackError::Registry {
        registry: registry.to_string(),
        message: format!("{}: {}", what, err),
    }
}

fn to_oci_reference(reference: &ImageReference) -> Result<Reference> {
    let ref_str = match (&reference.digest, &reference.tag) {
        (Some(digest), _) => format!("{}/{}@{}", reference.registry, reference.repository, digest),
        (None, Some(tag)) => format!("{}/{}:{}", reference.registry, reference.repository, tag),
        (None, None) => format!("{}/{}:latest", reference.registry, reference.repository),
    };

    ref_str
        .parse::<Reference>()
        .map_err(|e| PackError::Image(format!("invalid reference '{}': {}", ref_str, e)))
}

/// Select the linux manifest for the host architecture from an image index.
fn linux_platform_resolver(manifests: &[ImageIndexEntry]) -> Option<String> {
    let arch = match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        other => other,
    };

    manifests
        .iter()
        .find(|entry| {
            entry
                .platform
                .as_ref()
                .map_or(false, |p| p.os == "linux" && p.architecture == arch)
        })
        .map(|entry| entry.digest.clone())
}

//! Images held as OCI layouts in the local [`ImageStore`].
//!
//! The config blob is kept as raw JSON so fields bpack does not model
//! survive a load/save cycle untouched.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bpack_core::error::{PackError, Result};
use oci_spec::image::{ImageIndex, ImageManifest};
use serde_json::{json, Map, Value};

use super::image::{blob_path, digest_hex, sha256_bytes, sha256_file, Image, LayerBlob, LAYER_MEDIA_TYPE_TAR};
use super::store::ImageStore;

const MANIFEST_MEDIA_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";
const CONFIG_MEDIA_TYPE: &str = "application/vnd.oci.image.config.v1+json";
const INDEX_MEDIA_TYPE: &str = "application/vnd.oci.image.index.v1+json";

/// An image backed by the local store.
pub struct LocalImage {
    name: String,
    store: Arc<ImageStore>,
    config: Value,
    layers: Vec<LayerBlob>,
    digest: Option<String>,
}

impl std::fmt::Debug for LocalImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalImage")
            .field("name", &self.name)
            .field("layers", &self.layers.len())
            .field("digest", &self.digest)
            .finish()
    }
}

impl LocalImage {
    /// Load `reference` from the store.
    pub async fn open(store: Arc<ImageStore>, reference: &str) -> Result<Self> {
        let stored = store
            .get(reference)
            .await
            .ok_or_else(|| PackError::NotFound(format!("image {}", reference)))?;
        let mut image = Self::from_layout(store, reference, &stored.path)?;
        image.digest = Some(stored.digest);
        Ok(image)
    }

    /// An image with no layers and the given config, never saved.
    pub fn new(store: Arc<ImageStore>, name: &str, config: Value) -> Self {
        let mut image = Self {
            name: name.to_string(),
            store,
            config,
            layers: Vec::new(),
            digest: None,
        };
        image.sync_diff_ids();
        image
    }

    /// Parse an OCI layout directory.
    pub fn from_layout(store: Arc<ImageStore>, name: &str, root_dir: &Path) -> Result<Self> {
        for required in ["oci-layout", "index.json"] {
            if !root_dir.join(required).exists() {
                return Err(PackError::Image(format!(
                    "not a valid OCI layout: missing {} in {}",
                    required,
                    root_dir.display()
                )));
            }
        }

        let index: ImageIndex = read_json(&root_dir.join("index.json"), "index.json")?;
        let manifest_desc = index.manifests().first().ok_or_else(|| {
            PackError::Image(format!("no manifests in {}/index.json", root_dir.display()))
        })?;
        let manifest_digest = manifest_desc.digest().to_string();

        let manifest: ImageManifest =
            read_json(&blob_path(root_dir, &manifest_digest), "manifest")?;
        let config: Value = read_json(
            &blob_path(root_dir, manifest.config().digest()),
            "image config",
        )?;
        if !config.is_object() {
            return Err(PackError::Image(format!(
                "image config of {} is not a JSON object",
                name
            )));
        }

        let diff_ids: Vec<String> = config
            .pointer("/rootfs/diff_ids")
            .and_then(Value::as_array)
            .map(|ids| ids.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default();
        if diff_ids.len() != manifest.layers().len() {
            return Err(PackError::Image(format!(
                "image {} has {} layers but {} diff IDs",
                name,
                manifest.layers().len(),
                diff_ids.len()
            )));
        }

        let layers = manifest
            .layers()
            .iter()
            .zip(diff_ids)
            .map(|(desc, diff_id)| LayerBlob {
                media_type: desc.media_type().to_string(),
                digest: desc.digest().to_string(),
                diff_id,
                size: desc.size().max(0) as u64,
                path: blob_path(root_dir, desc.digest()),
            })
            .collect();

        Ok(Self {
            name: name.to_string(),
            store,
            config,
            layers,
            digest: Some(manifest_digest),
        })
    }

    /// Raw image config.
    pub fn config(&self) -> &Value {
        &self.config
    }

    fn container_config(&self) -> Option<&Map<String, Value>> {
        self.config.get("config").and_then(Value::as_object)
    }

    fn container_config_mut(&mut self) -> Result<&mut Map<String, Value>> {
        let root = self.config.as_object_mut().ok_or_else(|| {
            PackError::Image("image config is not a JSON object".to_string())
        })?;
        let section = root.entry("config").or_insert_with(|| json!({}));
        if section.is_null() {
            *section = json!({});
        }
        section
            .as_object_mut()
            .ok_or_else(|| PackError::Image("image config section is not an object".to_string()))
    }

    fn sync_diff_ids(&mut self) {
        let diff_ids: Vec<Value> = self
            .layers
            .iter()
            .map(|l| Value::String(l.diff_id.clone()))
            .collect();
        if let Some(root) = self.config.as_object_mut() {
            root.insert(
                "rootfs".to_string(),
                json!({ "type": "layers", "diff_ids": diff_ids }),
            );
        }
    }
}

#[async_trait]
impl Image for LocalImage {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn rename(&mut self, name: &str) {
        self.name = name.to_string();
    }

    fn env(&self, key: &str) -> Result<Option<String>> {
        let prefix = format!("{}=", key);
        let value = self
            .container_config()
            .and_then(|c| c.get("Env"))
            .and_then(Value::as_array)
            .and_then(|vars| {
                vars.iter()
                    .rev()
                    .filter_map(Value::as_str)
                    .find_map(|var| var.strip_prefix(&prefix).map(String::from))
            });
        Ok(value)
    }

    fn label(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .container_config()
            .and_then(|c| c.get("Labels"))
            .and_then(|labels| labels.get(key))
            .and_then(Value::as_str)
            .map(String::from);
        Ok(value)
    }

    fn set_label(&mut self, key: &str, value: &str) -> Result<()> {
        let section = self.container_config_mut()?;
        let labels = section.entry("Labels").or_insert_with(|| json!({}));
        if labels.is_null() {
            *labels = json!({});
        }
        labels
            .as_object_mut()
            .ok_or_else(|| PackError::Image("image labels are not an object".to_string()))?
            .insert(key.to_string(), Value::String(value.to_string()));
        Ok(())
    }

    fn add_layer(&mut self, tar_path: &Path) -> Result<()> {
        let hash = sha256_file(tar_path)?;
        let size = std::fs::metadata(tar_path)?.len();
        let digest = format!("sha256:{}", hash);

        self.layers.push(LayerBlob {
            media_type: LAYER_MEDIA_TYPE_TAR.to_string(),
            digest: digest.clone(),
            diff_id: digest,
            size,
            path: tar_path.to_path_buf(),
        });
        self.sync_diff_ids();

        if let Some(history) = self.config.get_mut("history").and_then(Value::as_array_mut) {
            history.push(json!({ "created_by": "bpack: add layer" }));
        }

        tracing::debug!(image = %self.name, layer = %hash, size, "Added layer");
        Ok(())
    }

    fn rebase(&mut self, old_top_layer: &str, new_base: &dyn Image) -> Result<()> {
        let boundary = self
            .layers
            .iter()
            .position(|l| l.diff_id == old_top_layer)
            .ok_or_else(|| {
                PackError::Image(format!(
                    "top layer {} not found in image {}",
                    old_top_layer, self.name
                ))
            })?;

        let mut layers = new_base.layers();
        let base_count = layers.len();
        layers.extend(self.layers.drain(boundary + 1..));
        self.layers = layers;
        self.sync_diff_ids();

        // Per-layer history no longer lines up with the new base
        if let Some(root) = self.config.as_object_mut() {
            root.remove("history");
        }

        tracing::debug!(
            image = %self.name,
            base = %new_base.name(),
            replaced = boundary + 1,
            base_layers = base_count,
            "Rebased image"
        );
        Ok(())
    }

    fn top_layer(&self) -> Result<String> {
        self.layers
            .last()
            .map(|l| l.diff_id.clone())
            .ok_or_else(|| PackError::Image(format!("image {} has no layers", self.name)))
    }

    fn digest(&self) -> Result<String> {
        self.digest
            .clone()
            .ok_or_else(|| PackError::Image(format!("image {} has not been saved", self.name)))
    }

    fn layers(&self) -> Vec<LayerBlob> {
        self.layers.clone()
    }

    async fn save(&mut self) -> Result<String> {
        let staging = self.store.staging_dir()?;
        let root = staging.path();
        let blobs_dir = root.join("blobs").join("sha256");
        std::fs::create_dir_all(&blobs_dir)?;

        let mut layer_descriptors = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            let target = blobs_dir.join(digest_hex(&layer.digest));
            if !target.exists() {
                std::fs::copy(&layer.path, &target).map_err(|e| {
                    PackError::Image(format!(
                        "failed to copy layer {} of {}: {}",
                        layer.digest, self.name, e
                    ))
                })?;
            }
            layer_descriptors.push(json!({
                "mediaType": layer.media_type,
                "digest": layer.digest,
                "size": layer.size,
            }));
        }

        self.sync_diff_ids();
        let config_bytes = serde_json::to_vec(&self.config)?;
        let config_digest = sha256_bytes(&config_bytes);
        std::fs::write(blobs_dir.join(&config_digest), &config_bytes)?;

        let manifest = json!({
            "schemaVersion": 2,
            "mediaType": MANIFEST_MEDIA_TYPE,
            "config": {
                "mediaType": CONFIG_MEDIA_TYPE,
                "digest": format!("sha256:{}", config_digest),
                "size": config_bytes.len(),
            },
            "layers": layer_descriptors,
        });
        let manifest_bytes = serde_json::to_vec(&manifest)?;
        let manifest_digest = format!("sha256:{}", sha256_bytes(&manifest_bytes));
        std::fs::write(blobs_dir.join(digest_hex(&manifest_digest)), &manifest_bytes)?;

        let index = json!({
            "schemaVersion": 2,
            "mediaType": INDEX_MEDIA_TYPE,
            "manifests": [{
                "mediaType": MANIFEST_MEDIA_TYPE,
                "digest": manifest_digest,
                "size": manifest_bytes.len(),
                "annotations": { "org.opencontainers.image.ref.name": self.name },
            }],
        });
        std::fs::write(root.join("index.json"), serde_json::to_vec_pretty(&index)?)?;
        std::fs::write(root.join("oci-layout"), r#"{"imageLayoutVersion":"1.0.0"}"#)?;

        let stored = self.store.put(&self.name, &manifest_digest, root).await?;

        // Staging goes away; point layers at the stored copies
        for layer in &mut self.layers {
            layer.path = blob_path(&stored.path, &layer.digest);
        }
        self.digest = Some(manifest_digest.clone());

        tracing::info!(image = %self.name, digest = %manifest_digest, "Saved image");
        Ok(manifest_digest)
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let data = std::fs::read(path).map_err(|e| {
        PackError::Image(format!("failed to read {} at {}: {}", what, path.display(), e))
    })?;
    serde_json::from_slice(&data)
        .map_err(|e| PackError::Image(format!("failed to parse {}: {}", what, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store(tmp: &TempDir) -> Arc<ImageStore> {
        Arc::new(ImageStore::new(&tmp.path().join("store")).unwrap())
    }

    fn base_config() -> Value {
        json!({
            "architecture": "amd64",
            "os": "linux",
            "config": {
                "Env": ["PATH=/usr/bin", "CNB_USER_ID=1000", "CNB_GROUP_ID=1001"],
                "Labels": { "io.buildpacks.stack.id": "io.buildpacks.stacks.bionic" },
            },
            "custom": { "kept": true },
        })
    }

    fn write_layer(tmp: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = tmp.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn test_save_and_open() {
        let tmp = TempDir::new().unwrap();
        let store = test_store(&tmp);

        let mut image = LocalImage::new(store.clone(), "some/base", base_config());
        image.add_layer(&write_layer(&tmp, "l1.tar", "one")).unwrap();
        image.add_layer(&write_layer(&tmp, "l2.tar", "two")).unwrap();
        let digest = image.save().await.unwrap();
        assert!(digest.starts_with("sha256:"));

        let loaded = LocalImage::open(store, "some/base").await.unwrap();
        assert_eq!(loaded.digest().unwrap(), digest);
        assert_eq!(loaded.layers().len(), 2);
        assert_eq!(loaded.top_layer().unwrap(), format!("sha256:{}", sha256_bytes(b"two")));
        assert_eq!(loaded.env("CNB_USER_ID").unwrap().as_deref(), Some("1000"));
        assert_eq!(loaded.env("MISSING").unwrap(), None);
        assert_eq!(
            loaded.label("io.buildpacks.stack.id").unwrap().as_deref(),
            Some("io.buildpacks.stacks.bionic")
        );
        assert_eq!(loaded.config()["custom"]["kept"], json!(true));
    }

    #[tokio::test]
    async fn test_open_missing_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let err = LocalImage::open(test_store(&tmp), "missing/image").await.unwrap_err();
        assert!(matches!(err, PackError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_rename_leaves_source_untouched() {
        let tmp = TempDir::new().unwrap();
        let store = test_store(&tmp);

        let mut base = LocalImage::new(store.clone(), "some/builder", base_config());
        base.add_layer(&write_layer(&tmp, "l1.tar", "one")).unwrap();
        let base_digest = base.save().await.unwrap();

        let mut copy = LocalImage::open(store.clone(), "some/builder").await.unwrap();
        copy.rename("bpack.local/builder/abc");
        copy.set_label("extra", "value").unwrap();
        copy.add_layer(&write_layer(&tmp, "l2.tar", "two")).unwrap();
        copy.save().await.unwrap();

        let original = LocalImage::open(store.clone(), "some/builder").await.unwrap();
        assert_eq!(original.digest().unwrap(), base_digest);
        assert_eq!(original.layers().len(), 1);
        assert_eq!(original.label("extra").unwrap(), None);

        let renamed = LocalImage::open(store, "bpack.local/builder/abc").await.unwrap();
        assert_eq!(renamed.layers().len(), 2);
        assert_eq!(renamed.label("extra").unwrap().as_deref(), Some("value"));
    }

    #[tokio::test]
    async fn test_set_label_on_null_labels() {
        let tmp = TempDir::new().unwrap();
        let mut image = LocalImage::new(
            test_store(&tmp),
            "some/app",
            json!({ "config": { "Labels": null } }),
        );
        image.set_label("k", "v").unwrap();
        assert_eq!(image.label("k").unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn test_rebase_swaps_base_layers() {
        let tmp = TempDir::new().unwrap();
        let store = test_store(&tmp);

        let mut old_base = LocalImage::new(store.clone(), "some/run:old", json!({}));
        old_base.add_layer(&write_layer(&tmp, "old.tar", "old-base")).unwrap();
        let old_top = old_base.top_layer().unwrap();

        let mut new_base = LocalImage::new(store.clone(), "some/run:new", json!({}));
        new_base.add_layer(&write_layer(&tmp, "new1.tar", "new-base-1")).unwrap();
        new_base.add_layer(&write_layer(&tmp, "new2.tar", "new-base-2")).unwrap();
        new_base.save().await.unwrap();

        let mut app = LocalImage::new(store.clone(), "some/app", json!({ "history": [] }));
        app.add_layer(&write_layer(&tmp, "old2.tar", "old-base")).unwrap();
        app.add_layer(&write_layer(&tmp, "app.tar", "app")).unwrap();
        let app_layer = app.top_layer().unwrap();
        assert_eq!(app.layers()[0].diff_id, old_top);

        app.rebase(&old_top, &new_base).unwrap();
        let diff_ids: Vec<String> = app.layers().into_iter().map(|l| l.diff_id).collect();
        assert_eq!(
            diff_ids,
            vec![
                format!("sha256:{}", sha256_bytes(b"new-base-1")),
                format!("sha256:{}", sha256_bytes(b"new-base-2")),
                app_layer.clone(),
            ]
        );
        assert!(app.config().get("history").is_none());

        app.save().await.unwrap();
        let reloaded = LocalImage::open(store, "some/app").await.unwrap();
        assert_eq!(reloaded.layers().len(), 3);
        assert_eq!(reloaded.top_layer().unwrap(), app_layer);
    }

    #[tokio::test]
    async fn test_rebase_unknown_top_layer() {
        let tmp = TempDir::new().unwrap();
        let store = test_store(&tmp);
        let new_base = LocalImage::new(store.clone(), "some/run", json!({}));
        let mut app = LocalImage::new(store, "some/app", json!({}));

        let err = app.rebase("sha256:nope", &new_base).unwrap_err();
        assert!(err.to_string().contains("sha256:nope"));
    }

    #[test]
    fn test_from_layout_rejects_non_layout() {
        let tmp = TempDir::new().unwrap();
        let store = test_store(&tmp);
        let err = LocalImage::from_layout(store, "x", tmp.path()).unwrap_err();
        assert!(err.to_string().contains("oci-layout"));
    }

    #[tokio::test]
    async fn test_unsaved_image_has_no_digest() {
        let tmp = TempDir::new().unwrap();
        let image = LocalImage::new(test_store(&tmp), "some/app", json!({}));
        assert!(image.digest().is_err());
        assert!(image.top_layer().is_err());
    }
}

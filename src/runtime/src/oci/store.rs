//! Disk-based image store.
//!
//! Holds OCI image layouts under `sha256/<manifest digest>/` with an
//! in-memory index backed by a persistent `index.json`. Index keys are
//! canonical references, so `ubuntu` and `docker.io/library/ubuntu:latest`
//! name the same entry.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bpack_core::error::{PackError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::reference;

/// Metadata for a stored image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredImage {
    /// Canonical reference (e.g. "docker.io/cnbs/run:latest")
    pub reference: String,
    /// Manifest digest (e.g. "sha256:abc123...")
    pub digest: String,
    /// Total size in bytes
    pub size_bytes: u64,
    /// When the image entered the store
    pub stored_at: DateTime<Utc>,
    /// Path to the OCI image layout on disk
    pub path: PathBuf,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreIndex {
    images: Vec<StoredImage>,
}

/// Disk-based image store with an in-memory index.
pub struct ImageStore {
    store_dir: PathBuf,
    index: Arc<RwLock<HashMap<String, StoredImage>>>,
}

impl ImageStore {
    /// Open (or create) a store rooted at `store_dir`.
    pub fn new(store_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(store_dir).map_err(|e| {
            PackError::Image(format!(
                "failed to create image store directory {}: {}",
                store_dir.display(),
                e
            ))
        })?;

        let index = Self::load_index(store_dir)?;
        Ok(Self {
            store_dir: store_dir.to_path_buf(),
            index: Arc::new(RwLock::new(index)),
        })
    }

    /// Look up an image by reference.
    pub async fn get(&self, reference: &str) -> Option<StoredImage> {
        let key = key_for(reference);
        self.index.read().await.get(&key).cloned()
    }

    /// Look up an image by manifest digest.
    pub async fn get_by_digest(&self, digest: &str) -> Option<StoredImage> {
        let index = self.index.read().await;
        index.values().find(|img| img.digest == digest).cloned()
    }

    /// Register the layout in `source_dir` under `reference`.
    ///
    /// Content is copied into `sha256/<digest>/` unless a layout with the
    /// same digest is already present. An existing entry for `reference`
    /// is replaced; its content is dropped once nothing else points at it.
    pub async fn put(&self, reference: &str, digest: &str, source_dir: &Path) -> Result<StoredImage> {
        let digest_hex = digest.strip_prefix("sha256:").unwrap_or(digest);
        let target_dir = self.store_dir.join("sha256").join(digest_hex);

        if !target_dir.exists() {
            copy_dir_recursive(source_dir, &target_dir).map_err(|e| {
                PackError::Image(format!("failed to copy image {} to store: {}", reference, e))
            })?;
        }

        let stored = StoredImage {
            reference: key_for(reference),
            digest: digest.to_string(),
            size_bytes: dir_size(&target_dir),
            stored_at: Utc::now(),
            path: target_dir,
        };

        let replaced = {
            let mut index = self.index.write().await;
            let replaced = index.insert(stored.reference.clone(), stored.clone());
            replaced.filter(|old| !index.values().any(|img| img.digest == old.digest))
        };
        if let Some(old) = replaced {
            remove_layout(&old.path)?;
        }

        self.save_index().await?;
        tracing::debug!(reference = %stored.reference, digest = %digest, "Stored image");
        Ok(stored)
    }

    /// Remove an image by reference. Content shared with another reference is kept.
    pub async fn remove(&self, reference: &str) -> Result<()> {
        let key = key_for(reference);
        let removed = {
            let mut index = self.index.write().await;
            match index.remove(&key) {
                Some(image) => {
                    let still_used = index.values().any(|img| img.digest == image.digest);
                    Some((image, still_used))
                }
                None => None,
            }
        };

        let Some((image, still_used)) = removed else {
            return Err(PackError::NotFound(format!("image {}", reference)));
        };

        if !still_used {
            remove_layout(&image.path)?;
        }

        self.save_index().await
    }

    /// All stored images, sorted by reference.
    pub async fn list(&self) -> Vec<StoredImage> {
        let index = self.index.read().await;
        let mut images: Vec<StoredImage> = index.values().cloned().collect();
        images.sort_by(|a, b| a.reference.cmp(&b.reference));
        images
    }

    /// Scratch directory on the same filesystem as the store.
    pub fn staging_dir(&self) -> Result<tempfile::TempDir> {
        let tmp_root = self.store_dir.join("tmp");
        std::fs::create_dir_all(&tmp_root)?;
        Ok(tempfile::Builder::new().prefix("layout-").tempdir_in(tmp_root)?)
    }

    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    fn load_index(store_dir: &Path) -> Result<HashMap<String, StoredImage>> {
        let index_path = store_dir.join("index.json");
        if !index_path.exists() {
            return Ok(HashMap::new());
        }

        let data = std::fs::read_to_string(&index_path).map_err(|e| {
            PackError::Image(format!(
                "failed to read image store index {}: {}",
                index_path.display(),
                e
            ))
        })?;
        let store_index: StoreIndex = serde_json::from_str(&data).map_err(|e| {
            PackError::Image(format!("failed to parse image store index: {}", e))
        })?;

        // Entries whose layout vanished are dropped
        Ok(store_index
            .images
            .into_iter()
            .filter(|img| img.path.exists())
            .map(|img| (img.reference.clone(), img))
            .collect())
    }

    async fn save_index(&self) -> Result<()> {
        let data = {
            let index = self.index.read().await;
            let mut images: Vec<StoredImage> = index.values().cloned().collect();
            images.sort_by(|a, b| a.reference.cmp(&b.reference));
            serde_json::to_string_pretty(&StoreIndex { images })?
        };

        let index_path = self.store_dir.join("index.json");
        let tmp_path = self.store_dir.join("index.json.tmp");
        tokio::fs::write(&tmp_path, data).await.map_err(|e| {
            PackError::Image(format!(
                "failed to write image store index {}: {}",
                tmp_path.display(),
                e
            ))
        })?;
        tokio::fs::rename(&tmp_path, &index_path).await?;
        Ok(())
    }
}

fn key_for(reference: &str) -> String {
    reference::canonical(reference).unwrap_or_else(|_| reference.to_string())
}

fn remove_layout(path: &Path) -> Result<()> {
    if path.exists() {
        std::fs::remove_dir_all(path).map_err(|e| {
            PackError::Image(format!(
                "failed to remove image directory {}: {}",
                path.display(),
                e
            ))
        })?;
    }
    Ok(())
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        if src_path.is_dir() {
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            std::fs::copy(&src_path, &dst_path)?;
        }
    }
    Ok(())
}

fn dir_size(path: &Path) -> u64 {
    walkdir::WalkDir::new(path)
        .into_iter()
        .flatten()
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

//! Image abstraction used by builder assembly and rebase.

use std::io::Read;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bpack_core::error::{PackError, Result};
use sha2::{Digest, Sha256};

/// Media type of layers added locally (uncompressed tar).
pub const LAYER_MEDIA_TYPE_TAR: &str = "application/vnd.oci.image.layer.v1.tar";

/// One filesystem layer of an image, bottom to top.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerBlob {
    /// Layer media type as recorded in the manifest
    pub media_type: String,
    /// Digest of the blob as stored ("sha256:...")
    pub digest: String,
    /// Digest of the uncompressed tar ("sha256:...")
    pub diff_id: String,
    pub size: u64,
    /// Blob location on disk
    pub path: PathBuf,
}

/// A mutable image handle.
///
/// Mutations stay in memory until [`Image::save`] persists them under the
/// current name; the image the handle was loaded from is never rewritten
/// in place.
#[async_trait]
pub trait Image: Send + Sync {
    /// Current reference of the image.
    fn name(&self) -> String;

    /// Change the reference that `save` will write to.
    fn rename(&mut self, name: &str);

    /// Value of an environment variable in the image config.
    fn env(&self, key: &str) -> Result<Option<String>>;

    /// Value of a config label.
    fn label(&self, key: &str) -> Result<Option<String>>;

    fn set_label(&mut self, key: &str, value: &str) -> Result<()>;

    /// Append an uncompressed tar as the new top layer.
    fn add_layer(&mut self, tar_path: &Path) -> Result<()>;

    /// Replace every layer up to and including `old_top_layer` with the
    /// layers of `new_base`.
    fn rebase(&mut self, old_top_layer: &str, new_base: &dyn Image) -> Result<()>;

    /// Diff ID of the topmost layer.
    fn top_layer(&self) -> Result<String>;

    /// Manifest digest of the image as last loaded or saved.
    fn digest(&self) -> Result<String>;

    /// Layers, bottom to top.
    fn layers(&self) -> Vec<LayerBlob>;

    /// Persist the image under its current name and return the new digest.
    async fn save(&mut self) -> Result<String>;
}

/// SHA256 of a file's content as lowercase hex.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path).map_err(|e| {
        PackError::Image(format!("failed to open {}: {}", path.display(), e))
    })?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// SHA256 of bytes as lowercase hex.
pub fn sha256_bytes(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// `sha256:<hex>` → `<hex>`
pub(crate) fn digest_hex(digest: &str) -> &str {
    digest.split_once(':').map(|(_, hex)| hex).unwrap_or(digest)
}

/// Path of a blob inside an OCI layout.
pub(crate) fn blob_path(root_dir: &Path, digest: &str) -> PathBuf {
    let (algorithm, hash) = digest.split_once(':').unwrap_or(("sha256", digest));
    root_dir.join("blobs").join(algorithm).join(hash)
}

//! Persistent storage for build volumes.
//!
//! Records live in `~/.bpack/volumes.json`, rewritten atomically (tmp file
//! then rename). Volume data lives under `~/.bpack/volumes/<name>/`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use bpack_core::config::PackConfig;
use bpack_core::error::{PackError, Result};
use bpack_core::volume::VolumeConfig;

/// Persistent store for volume records.
#[derive(Debug)]
pub struct VolumeStore {
    path: PathBuf,
    volumes_dir: PathBuf,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Default)]
struct VolumesFile {
    volumes: BTreeMap<String, VolumeConfig>,
}

impl VolumeStore {
    pub fn new(path: impl Into<PathBuf>, volumes_dir: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            volumes_dir: volumes_dir.into(),
        }
    }

    /// Store under `~/.bpack`.
    pub fn default_path() -> Self {
        let home = PackConfig::home_dir();
        Self::new(home.join("volumes.json"), home.join("volumes"))
    }

    fn load(&self) -> Result<BTreeMap<String, VolumeConfig>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }

        let data = std::fs::read_to_string(&self.path).map_err(|e| {
            PackError::Other(format!(
                "failed to read volumes file {}: {}",
                self.path.display(),
                e
            ))
        })?;
        let file: VolumesFile = serde_json::from_str(&data)
            .map_err(|e| PackError::Other(format!("failed to parse volumes file: {}", e)))?;
        Ok(file.volumes)
    }

    fn save(&self, volumes: BTreeMap<String, VolumeConfig>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(&VolumesFile { volumes })?;
        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json).map_err(|e| {
            PackError::Other(format!(
                "failed to write tmp file {}: {}",
                tmp_path.display(),
                e
            ))
        })?;
        std::fs::rename(&tmp_path, &self.path).map_err(|e| {
            PackError::Other(format!(
                "failed to rename {} to {}: {}",
                tmp_path.display(),
                self.path.display(),
                e
            ))
        })?;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Option<VolumeConfig>> {
        Ok(self.load()?.remove(name))
    }

    /// Create a named volume and its data directory.
    ///
    /// The returned record carries the actual mount point.
    pub fn create(&self, mut config: VolumeConfig) -> Result<VolumeConfig> {
        let mut volumes = self.load()?;
        if volumes.contains_key(&config.name) {
            return Err(PackError::Other(format!(
                "volume '{}' already exists",
                config.name
            )));
        }

        let vol_dir = self.volume_dir(&config.name);
        std::fs::create_dir_all(&vol_dir).map_err(|e| {
            PackError::Other(format!(
                "failed to create volume directory {}: {}",
                vol_dir.display(),
                e
            ))
        })?;
        config.mount_point = vol_dir.to_string_lossy().to_string();

        volumes.insert(config.name.clone(), config.clone());
        self.save(volumes)?;
        tracing::debug!(volume = %config.name, "Created volume");
        Ok(config)
    }

    /// Release `image`'s hold on a volume. Releasing a volume the image
    /// does not hold is a no-op.
    pub fn detach(&self, name: &str, image: &str) -> Result<()> {
        let mut volumes = self.load()?;
        let volume = volumes
            .get_mut(name)
            .ok_or_else(|| PackError::NotFound(format!("volume {}", name)))?;
        if volume.detach(image) {
            self.save(volumes)?;
            tracing::debug!(volume = %name, image = %image, "Detached volume");
        }
        Ok(())
    }

    /// Remove a volume and its data. A volume still in use is only removed with `force`.
    pub fn remove(&self, name: &str, force: bool) -> Result<VolumeConfig> {
        let mut volumes = self.load()?;
        let config = match volumes.get(name) {
            Some(config) => config.clone(),
            None => return Err(PackError::NotFound(format!("volume {}", name))),
        };

        if config.is_in_use() && !force {
            return Err(PackError::Other(format!(
                "volume '{}' is in use by {}",
                name,
                config.in_use_by.join(", ")
            )));
        }

        volumes.remove(name);
        self.save(volumes)?;

        let vol_dir = self.volume_dir(name);
        if vol_dir.exists() {
            std::fs::remove_dir_all(&vol_dir).map_err(|e| {
                PackError::Other(format!(
                    "failed to remove volume directory {}: {}",
                    vol_dir.display(),
                    e
                ))
            })?;
        }

        tracing::debug!(volume = %name, force, "Removed volume");
        Ok(config)
    }

    pub fn volume_dir(&self, name: &str) -> PathBuf {
        self.volumes_dir.join(name)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

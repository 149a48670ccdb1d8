//! User configuration stored in `~/.bpack/config.toml`.
//!
//! ```toml
//! default-builder-image = "cnbs/sample-builder:bionic"
//!
//! [[run-images]]
//! image = "cnbs/run"
//! mirrors = ["gcr.io/cnbs/run"]
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{PackError, Result};

/// Locally preferred mirrors for a run image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunImageConfig {
    /// Run image name as declared by the builder or app image
    pub image: String,

    /// Mirrors to prefer, in order
    #[serde(default)]
    pub mirrors: Vec<String>,
}

/// bpack configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PackConfig {
    /// Builder used by `build` when `--builder` is not given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_builder_image: Option<String>,

    /// Run image mirror overrides
    #[serde(default)]
    pub run_images: Vec<RunImageConfig>,

    /// Where this config was loaded from
    #[serde(skip)]
    path: Option<PathBuf>,
}

impl PackConfig {
    /// Home directory for bpack state (`~/.bpack`).
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .map(|h| h.join(".bpack"))
            .unwrap_or_else(|| PathBuf::from(".bpack"))
    }

    /// Default config file location.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Load from `~/.bpack/config.toml`, or an empty config if absent.
    pub fn load_default() -> Result<Self> {
        Self::load(&Self::default_path())
    }

    /// Load from `path`. A missing file yields an empty config bound to `path`.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self {
                path: Some(path.to_path_buf()),
                ..Self::default()
            });
        }

        let data = std::fs::read_to_string(path).map_err(|e| {
            PackError::Config(format!("failed to read config {}: {}", path.display(), e))
        })?;
        let mut config: PackConfig = toml::from_str(&data).map_err(|e| {
            PackError::Config(format!("failed to parse config {}: {}", path.display(), e))
        })?;
        config.path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Persist to the path this config was loaded from (atomic write).
    pub fn save(&self) -> Result<()> {
        let path = self.path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                PackError::Config(format!(
                    "failed to create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let data = toml::to_string_pretty(self)?;
        let tmp_path = path.with_extension("toml.tmp");
        std::fs::write(&tmp_path, data).map_err(|e| {
            PackError::Config(format!(
                "failed to write tmp file {}: {}",
                tmp_path.display(),
                e
            ))
        })?;
        std::fs::rename(&tmp_path, &path).map_err(|e| {
            PackError::Config(format!(
                "failed to rename {} → {}: {}",
                tmp_path.display(),
                path.display(),
                e
            ))
        })?;

        tracing::debug!(path = %path.display(), "Saved config");
        Ok(())
    }

    /// Path backing this config.
    pub fn path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(Self::default_path)
    }

    /// Mirror configuration for a run image, if any.
    pub fn run_image(&self, image: &str) -> Option<&RunImageConfig> {
        self.run_images.iter().find(|r| r.image == image)
    }

    /// Locally configured mirrors for a run image (empty when unconfigured).
    pub fn run_image_mirrors(&self, image: &str) -> &[String] {
        self.run_image(image)
            .map(|r| r.mirrors.as_slice())
            .unwrap_or(&[])
    }

    /// Replace the mirrors configured for `image`.
    pub fn set_run_image_mirrors(&mut self, image: &str, mirrors: Vec<String>) {
        match self.run_images.iter_mut().find(|r| r.image == image) {
            Some(existing) => existing.mirrors = mirrors,
            None => self.run_images.push(RunImageConfig {
                image: image.to_string(),
                mirrors,
            }),
        }
    }

    pub fn set_default_builder(&mut self, image: &str) {
        self.default_builder_image = Some(image.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_missing_file_is_empty() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");

        let config = PackConfig::load(&path).unwrap();
        assert!(config.run_images.is_empty());
        assert!(config.default_builder_image.is_none());
        assert_eq!(config.path(), path);
    }

    #[test]
    fn test_parse_run_images() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
default-builder-image = "some/builder"

[[run-images]]
image = "some/run"
mirrors = ["gcr.io/some/run", "example.com/some/run"]
"#,
        )
        .unwrap();

        let config = PackConfig::load(&path).unwrap();
        assert_eq!(config.default_builder_image.as_deref(), Some("some/builder"));
        assert_eq!(
            config.run_image_mirrors("some/run"),
            &["gcr.io/some/run".to_string(), "example.com/some/run".to_string()]
        );
        assert!(config.run_image_mirrors("other/run").is_empty());
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "run-images = 5").unwrap();

        let err = PackConfig::load(&path).unwrap_err();
        assert!(matches!(err, PackError::Config(_)));
        assert!(err.to_string().contains("failed to parse config"));
    }

    #[test]
    fn test_set_run_image_mirrors_replaces_existing() {
        let mut config = PackConfig::default();
        config.set_run_image_mirrors("some/run", vec!["a/run".to_string()]);
        config.set_run_image_mirrors("some/run", vec!["b/run".to_string()]);

        assert_eq!(config.run_images.len(), 1);
        assert_eq!(config.run_image_mirrors("some/run"), &["b/run".to_string()]);
    }

    #[test]
    fn test_save_and_reload() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("config.toml");

        let mut config = PackConfig::load(&path).unwrap();
        config.set_default_builder("some/builder");
        config.set_run_image_mirrors("some/run", vec!["gcr.io/some/run".to_string()]);
        config.save().unwrap();

        let reloaded = PackConfig::load(&path).unwrap();
        assert_eq!(reloaded, config);
        assert!(!path.with_extension("toml.tmp").exists());
    }
}

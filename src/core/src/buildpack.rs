//! Buildpack identity and detection order types.
//!
//! The order document lands in the builder at `buildpacks/order.toml`:
//!
//! ```toml
//! [[groups]]
//!
//! [[groups.buildpacks]]
//! id = "org/bp"
//! version = "1.0"
//! optional = false
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{PackError, Result};

/// A buildpack reference resolved to `(id, version)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Buildpack {
    pub id: String,
    pub version: String,
    #[serde(default)]
    pub optional: bool,
}

impl Buildpack {
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
            optional: false,
        }
    }

    /// Id with `/` replaced so it can be used as a single path component.
    pub fn escaped_id(&self) -> String {
        self.id.replace('/', "_")
    }
}

/// Buildpacks tried together during detection, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildpackGroup {
    #[serde(default)]
    pub buildpacks: Vec<Buildpack>,
}

/// Detection order: groups are tried in sequence until one passes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildpackOrder {
    #[serde(default)]
    pub groups: Vec<BuildpackGroup>,
}

impl BuildpackOrder {
    /// An order consisting of one group.
    pub fn single_group(buildpacks: Vec<Buildpack>) -> Self {
        Self {
            groups: vec![BuildpackGroup { buildpacks }],
        }
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string(self)
            .map_err(|e| PackError::Serialization(format!("encoding order.toml: {}", e)))
    }
}

/// `buildpack.toml` found at the root of a local buildpack directory.
#[derive(Debug, Clone, Deserialize)]
pub struct BuildpackDescriptor {
    pub buildpack: BuildpackInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BuildpackInfo {
    pub id: String,
    pub version: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl BuildpackDescriptor {
    pub fn parse(data: &str) -> Result<Self> {
        Ok(toml::from_str(data)?)
    }
}

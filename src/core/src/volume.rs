//! Build scratch volumes.
//!
//! A build session owns two named volumes (layers and app). Each is created
//! for one ephemeral builder, which holds it until the session ends.

use serde::{Deserialize, Serialize};

/// Record of a named volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeConfig {
    pub name: String,

    /// Host directory holding the volume data; assigned by the store.
    #[serde(default)]
    pub mount_point: String,

    /// Ephemeral builder the volume was created for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub builder: Option<String>,

    /// Images currently holding this volume.
    #[serde(default)]
    pub in_use_by: Vec<String>,

    /// RFC 3339
    pub created_at: String,
}

impl VolumeConfig {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            mount_point: String::new(),
            builder: None,
            in_use_by: Vec::new(),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// A volume created for and held by `builder`.
    pub fn for_builder(name: &str, builder: &str) -> Self {
        let mut volume = Self::new(name);
        volume.builder = Some(builder.to_string());
        volume.attach(builder);
        volume
    }

    pub fn attach(&mut self, image: &str) {
        if !self.in_use_by.iter().any(|u| u == image) {
            self.in_use_by.push(image.to_string());
        }
    }

    /// Returns whether `image` was holding the volume.
    pub fn detach(&mut self, image: &str) -> bool {
        let before = self.in_use_by.len();
        self.in_use_by.retain(|u| u != image);
        self.in_use_by.len() != before
    }

    pub fn is_in_use(&self) -> bool {
        !self.in_use_by.is_empty()
    }
}

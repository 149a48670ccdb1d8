//! Lifecycle metadata carried in the `io.buildpacks.lifecycle.metadata` label.
//!
//! Only the fields bpack reads or rewrites are typed. Everything else is kept
//! in flattened maps so a parse/serialize cycle leaves it untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

/// Label holding the lifecycle metadata document.
pub const LIFECYCLE_METADATA_LABEL: &str = "io.buildpacks.lifecycle.metadata";

/// Run image declared by the stack the app was built on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackRunImage {
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub mirrors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackMetadata {
    #[serde(default, rename = "runImage")]
    pub run_image: StackRunImage,
}

#[derive(Debug, Default, Deserialize)]
struct StackLabel {
    #[serde(default)]
    stack: StackMetadata,
}

impl StackMetadata {
    /// Read the `stack` object of a metadata label. Absent fields are empty.
    pub fn from_label(label: &str) -> Result<Self> {
        let parsed: StackLabel = serde_json::from_str(label)?;
        Ok(parsed.stack)
    }

    /// Declared run image, if any.
    pub fn run_image(&self) -> Option<&str> {
        let image = self.run_image.image.trim();
        (!image.is_empty()).then_some(image)
    }
}

/// The base layers an app image currently sits on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunImageMetadata {
    #[serde(rename = "topLayer", default, skip_serializing_if = "Option::is_none")]
    pub top_layer: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Full metadata document on an app image.
///
/// Everything but the run image, `app` included, is carried through
/// untouched in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppImageMetadata {
    #[serde(rename = "runImage", alias = "runimage", default)]
    pub run_image: RunImageMetadata,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AppImageMetadata {
    pub fn from_label(label: &str) -> Result<Self> {
        Ok(serde_json::from_str(label)?)
    }

    pub fn to_label(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

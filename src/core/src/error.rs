use std::fmt;

use thiserror::Error;

/// bpack error types
#[derive(Error, Debug)]
pub enum PackError {
    /// Invalid or missing configuration (flags, builder env, image labels)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Builder assembly failed (archive creation, layer staging)
    #[error("Build error: {0}")]
    Build(String),

    /// Image manipulation error
    #[error("Image error: {0}")]
    Image(String),

    /// Container registry error
    #[error("Registry error: {registry} - {message}")]
    Registry { registry: String, message: String },

    /// Requested resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// One or more ephemeral resources could not be removed
    #[error("Cleanup failed: {0}")]
    Cleanup(CleanupErrors),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for PackError {
    fn from(err: serde_json::Error) -> Self {
        PackError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for PackError {
    fn from(err: toml::de::Error) -> Self {
        PackError::Serialization(err.to_string())
    }
}

impl From<toml::ser::Error> for PackError {
    fn from(err: toml::ser::Error) -> Self {
        PackError::Serialization(err.to_string())
    }
}

/// A single resource that could not be torn down.
#[derive(Debug)]
pub struct ResourceFailure {
    /// Resource kind ("builder image", "layers volume", ...)
    pub kind: &'static str,
    /// Image reference or volume name
    pub name: String,
    /// Underlying failure
    pub source: Box<PackError>,
}

impl fmt::Display for ResourceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "failed to clean up {} {}: {}",
            self.kind, self.name, self.source
        )
    }
}

/// Every failure collected during a best-effort teardown, in attempt order.
#[derive(Debug, Default)]
pub struct CleanupErrors {
    failures: Vec<ResourceFailure>,
}

impl CleanupErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, failure: ResourceFailure) {
        self.failures.push(failure);
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failures(&self) -> &[ResourceFailure] {
        &self.failures
    }

    /// The most recent failure.
    pub fn last(&self) -> Option<&ResourceFailure> {
        self.failures.last()
    }

    /// `Ok(())` when nothing failed, otherwise a `PackError::Cleanup`.
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(PackError::Cleanup(self))
        }
    }
}

impl fmt::Display for CleanupErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<String> = self.failures.iter().map(|e| e.to_string()).collect();
        write!(f, "{}", messages.join("; "))
    }
}

/// Result type alias for bpack operations
pub type Result<T> = std::result::Result<T, PackError>;

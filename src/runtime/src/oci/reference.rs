//! Image reference parsing.
//!
//! Normalizes references like `cnbs/run`, `gcr.io/cnbs/run:bionic` or
//! `bpack.local/builder/6162` into registry, repository, tag and digest.

use bpack_core::error::{PackError, Result};

/// Default registry when none is specified.
pub const DEFAULT_REGISTRY: &str = "docker.io";

/// Default tag when none is specified.
const DEFAULT_TAG: &str = "latest";

/// Aliases that resolve to the default registry.
const DEFAULT_REGISTRY_ALIASES: &[&str] = &["index.docker.io", "registry-1.docker.io"];

/// Parsed image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    /// Registry hostname, with port if present (e.g. "gcr.io", "localhost:5000")
    pub registry: String,
    /// Repository path (e.g. "library/ubuntu", "cnbs/run")
    pub repository: String,
    pub tag: Option<String>,
    /// Digest (e.g. "sha256:abc123...")
    pub digest: Option<String>,
}

impl ImageReference {
    /// Parse an image reference string.
    ///
    /// - `ubuntu` → docker.io/library/ubuntu:latest
    /// - `cnbs/run:bionic` → docker.io/cnbs/run:bionic
    /// - `gcr.io/org/run` → gcr.io/org/run:latest
    /// - `localhost:5000/run@sha256:abc` → localhost:5000/run@sha256:abc
    pub fn parse(reference: &str) -> Result<Self> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(PackError::Image("empty image reference".to_string()));
        }

        let (name_tag, digest) = match reference.rsplit_once('@') {
            Some((name_tag, digest)) => {
                if !digest.contains(':') {
                    return Err(PackError::Image(format!(
                        "invalid digest in reference '{}': expected algorithm:hex",
                        reference
                    )));
                }
                (name_tag, Some(digest.to_string()))
            }
            None => (reference, None),
        };

        // A colon after the last slash separates the tag; a bare `host:port`
        // with no slash is a name, not a tag.
        let last_component_start = name_tag.rfind('/').map(|p| p + 1).unwrap_or(0);
        let (name, tag) = match name_tag[last_component_start..].rfind(':') {
            Some(colon) => {
                let split = last_component_start + colon;
                let candidate = &name_tag[split + 1..];
                let looks_like_port = last_component_start == 0
                    && digest.is_none()
                    && !candidate.is_empty()
                    && candidate.chars().all(|c| c.is_ascii_digit());
                if looks_like_port {
                    (name_tag, None)
                } else {
                    (&name_tag[..split], Some(candidate.to_string()))
                }
            }
            None => (name_tag, None),
        };

        if tag.as_deref() == Some("") {
            return Err(PackError::Image(format!(
                "empty tag in reference '{}'",
                reference
            )));
        }

        let (registry, repository) = Self::split_registry_repository(name)?;

        let tag = if tag.is_none() && digest.is_none() {
            Some(DEFAULT_TAG.to_string())
        } else {
            tag
        };

        Ok(ImageReference {
            registry,
            repository,
            tag,
            digest,
        })
    }

    fn split_registry_repository(name: &str) -> Result<(String, String)> {
        if let Some((first, rest)) = name.split_once('/') {
            if first.contains('.') || first.contains(':') || first == "localhost" {
                if rest.is_empty() {
                    return Err(PackError::Image(format!(
                        "empty repository in reference '{}'",
                        name
                    )));
                }
                let registry = if DEFAULT_REGISTRY_ALIASES.contains(&first) {
                    DEFAULT_REGISTRY.to_string()
                } else {
                    first.to_string()
                };
                let repository = if registry == DEFAULT_REGISTRY && !rest.contains('/') {
                    format!("library/{}", rest)
                } else {
                    rest.to_string()
                };
                return Ok((registry, repository));
            }
        }

        if name.is_empty() {
            return Err(PackError::Image("empty repository name".to_string()));
        }

        let repository = if name.contains('/') {
            name.to_string()
        } else {
            format!("library/{}", name)
        };

        Ok((DEFAULT_REGISTRY.to_string(), repository))
    }

    /// Registry host this reference resolves against.
    pub fn registry_host(&self) -> &str {
        &self.registry
    }

    /// Canonical reference string, used as the local store key.
    pub fn full_reference(&self) -> String {
        let mut s = format!("{}/{}", self.registry, self.repository);
        if let Some(ref tag) = self.tag {
            s.push(':');
            s.push_str(tag);
        }
        if let Some(ref digest) = self.digest {
            s.push('@');
            s.push_str(digest);
        }
        s
    }
}

impl std::fmt::Display for ImageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.full_reference())
    }
}

/// Registry host of a reference string.
pub fn registry_host(reference: &str) -> Result<String> {
    Ok(ImageReference::parse(reference)?.registry)
}

/// Canonical form of a reference string.
pub fn canonical(reference: &str) -> Result<String> {
    Ok(ImageReference::parse(reference)?.full_reference())
}

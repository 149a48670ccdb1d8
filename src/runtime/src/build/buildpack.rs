//! Buildpack reference resolution.
//!
//! A reference naming a directory that contains `buildpack.toml` is a local
//! buildpack and gets archived into the builder. Anything else is an
//! `id[@version]` reference to a buildpack the builder already carries.

use std::path::{Path, PathBuf};

use bpack_core::buildpack::{Buildpack, BuildpackDescriptor, BuildpackOrder};
use bpack_core::error::{PackError, Result};

use super::layer::{self, BUILDPACKS_DIR, ORDER_PATH};

/// Descriptor file marking a local buildpack directory.
pub const BUILDPACK_DESCRIPTOR: &str = "buildpack.toml";

/// Outcome of resolving a list of buildpack references.
#[derive(Debug, Default)]
pub struct ResolvedBuildpacks {
    /// Single detection group in input order
    pub order: BuildpackOrder,
    /// Archives for local buildpacks, in input order
    pub layers: Vec<PathBuf>,
}

/// Resolve `refs` in order, archiving local buildpacks into `tmp_dir`.
pub fn resolve_buildpacks(refs: &[String], tmp_dir: &Path, uid: u32, gid: u32) -> Result<ResolvedBuildpacks> {
    let local: Vec<bool> = refs.iter().map(|r| is_local(r)).collect();
    if cfg!(windows) && local.iter().any(|l| *l) {
        return Err(PackError::Config(
            "directory buildpacks are not implemented on windows".to_string(),
        ));
    }

    let mut buildpacks = Vec::with_capacity(refs.len());
    let mut layers = Vec::new();

    for (reference, is_local) in refs.iter().zip(local) {
        let buildpack = if is_local {
            let (buildpack, tar) = archive_local(reference, tmp_dir, uid, gid)?;
            layers.push(tar);
            buildpack
        } else {
            let (id, version) = parse_buildpack_ref(reference);
            Buildpack::new(id, version)
        };
        tracing::debug!(id = %buildpack.id, version = %buildpack.version, local = is_local, "Resolved buildpack");
        buildpacks.push(buildpack);
    }

    Ok(ResolvedBuildpacks {
        order: BuildpackOrder::single_group(buildpacks),
        layers,
    })
}

/// Split `id@version`. Without exactly one `@` the version is `latest`.
pub fn parse_buildpack_ref(reference: &str) -> (String, String) {
    let parts: Vec<&str> = reference.split('@').collect();
    if parts.len() == 2 {
        return (parts[0].to_string(), parts[1].to_string());
    }
    tracing::warn!(
        buildpack = %parts[0],
        "No version for {} buildpack provided, will use {}@latest",
        parts[0],
        parts[0]
    );
    (parts[0].to_string(), "latest".to_string())
}

/// `order.tar` carrying `buildpacks/order.toml`.
pub fn order_layer(tmp_dir: &Path, order: &BuildpackOrder) -> Result<PathBuf> {
    let contents = order.to_toml()?;
    layer::single_file_layer(tmp_dir, "order.tar", ORDER_PATH, &contents)
}

fn is_local(reference: &str) -> bool {
    Path::new(reference).join(BUILDPACK_DESCRIPTOR).exists()
}

fn archive_local(dir: &str, tmp_dir: &Path, uid: u32, gid: u32) -> Result<(Buildpack, PathBuf)> {
    let descriptor_path = Path::new(dir).join(BUILDPACK_DESCRIPTOR);
    let data = std::fs::read_to_string(&descriptor_path).map_err(|e| {
        PackError::Config(format!("failed to read {}: {}", descriptor_path.display(), e))
    })?;
    let descriptor = BuildpackDescriptor::parse(&data).map_err(|e| {
        PackError::Config(format!("failed to decode buildpack.toml from \"{}\": {}", dir, e))
    })?;

    let buildpack = Buildpack::new(descriptor.buildpack.id, descriptor.buildpack.version);
    let escaped = buildpack.escaped_id();
    let tar_name = format!("{}.{}.tar", escaped, buildpack.version);
    let dest = format!("{}/{}/{}", BUILDPACKS_DIR, escaped, buildpack.version);

    let tar = layer::buildpack_layer(tmp_dir, &tar_name, Path::new(dir), &dest, uid, gid)?;
    Ok((buildpack, tar))
}

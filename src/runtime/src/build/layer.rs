//! Deterministic tar layers for builder assembly.
//!
//! Every archive uses GNU headers and a fixed mtime, emits directories
//! before their children, and orders entries independently of map or
//! directory iteration order, so equal input yields an identical file
//! (and digest) on every run.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::path::{Path, PathBuf};

use bpack_core::error::{PackError, Result};

/// 1980-01-01T00:00:01Z
pub const NORMALIZED_MTIME: u64 = 315_532_801;

/// Directory holding platform inputs (`platform/env/<KEY>`).
pub const PLATFORM_DIR: &str = "platform";

/// Directory holding buildpacks and the detection order.
pub const BUILDPACKS_DIR: &str = "buildpacks";

/// Location of the detection order document.
pub const ORDER_PATH: &str = "buildpacks/order.toml";

const MODE_READ_ONLY_DIR: u32 = 0o555;
const MODE_DIR: u32 = 0o755;
const MODE_READ_ONLY_FILE: u32 = 0o444;
const MODE_EXEC_FILE: u32 = 0o555;

/// Writes one layer archive with normalized headers.
struct LayerWriter {
    builder: tar::Builder<File>,
    path: PathBuf,
    uid: u64,
    gid: u64,
}

impl LayerWriter {
    fn create(path: PathBuf, uid: u32, gid: u32) -> Result<Self> {
        let file = File::create(&path).map_err(|e| {
            PackError::Build(format!("failed to create layer {}: {}", path.display(), e))
        })?;
        Ok(Self {
            builder: tar::Builder::new(file),
            path,
            uid: uid as u64,
            gid: gid as u64,
        })
    }

    fn header(&self, entry_type: tar::EntryType, mode: u32, size: u64) -> tar::Header {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(entry_type);
        header.set_mode(mode);
        header.set_size(size);
        header.set_mtime(NORMALIZED_MTIME);
        header.set_uid(self.uid);
        header.set_gid(self.gid);
        header
    }

    fn dir(&mut self, name: &str, mode: u32) -> Result<()> {
        let mut header = self.header(tar::EntryType::Directory, mode, 0);
        let name = format!("{}/", name.trim_end_matches('/'));
        self.builder
            .append_data(&mut header, &name, std::io::empty())
            .map_err(|e| self.error(&name, e))
    }

    fn file(&mut self, name: &str, mode: u32, contents: &[u8]) -> Result<()> {
        let mut header = self.header(tar::EntryType::Regular, mode, contents.len() as u64);
        self.builder
            .append_data(&mut header, name, contents)
            .map_err(|e| self.error(name, e))
    }

    fn file_from_disk(&mut self, name: &str, mode: u32, src: &Path) -> Result<()> {
        let file = File::open(src).map_err(|e| self.error(name, e))?;
        let size = file.metadata().map_err(|e| self.error(name, e))?.len();
        let mut header = self.header(tar::EntryType::Regular, mode, size);
        self.builder
            .append_data(&mut header, name, file)
            .map_err(|e| self.error(name, e))
    }

    fn symlink(&mut self, name: &str, target: &Path) -> Result<()> {
        let mut header = self.header(tar::EntryType::Symlink, 0o777, 0);
        self.builder
            .append_link(&mut header, name, target)
            .map_err(|e| self.error(name, e))
    }

    /// Emit `path` and each of its ancestors as directories, outermost first.
    fn parents(&mut self, path: &str, mode: u32) -> Result<()> {
        let mut current = String::new();
        for component in path.split('/').filter(|c| !c.is_empty()) {
            if !current.is_empty() {
                current.push('/');
            }
            current.push_str(component);
            self.dir(&current, mode)?;
        }
        Ok(())
    }

    fn finish(self) -> Result<PathBuf> {
        let Self { builder, path, .. } = self;
        let mut file = builder.into_inner().map_err(|e| {
            PackError::Build(format!("failed to finalize layer {}: {}", path.display(), e))
        })?;
        std::io::Write::flush(&mut file)?;
        Ok(path)
    }

    fn error(&self, entry: &str, err: impl std::fmt::Display) -> PackError {
        PackError::Build(format!(
            "failed to write {} to layer {}: {}",
            entry,
            self.path.display(),
            err
        ))
    }
}

/// `env.tar`: one read-only file per variable under `platform/env/`.
pub fn env_layer(dir: &Path, env: &HashMap<String, String>) -> Result<PathBuf> {
    let mut writer = LayerWriter::create(dir.join("env.tar"), 0, 0)?;
    writer.dir(PLATFORM_DIR, MODE_READ_ONLY_DIR)?;
    writer.dir(&format!("{}/env", PLATFORM_DIR), MODE_READ_ONLY_DIR)?;

    let sorted: BTreeMap<&String, &String> = env.iter().collect();
    for (key, value) in sorted {
        writer.file(
            &format!("{}/env/{}", PLATFORM_DIR, key),
            MODE_READ_ONLY_FILE,
            value.as_bytes(),
        )?;
    }

    writer.finish()
}

/// Archive the tree at `src` under `dest`, owned by `uid:gid`.
///
/// Directories are 0755. Files keep execute permission as 0555 and are
/// otherwise 0444. Symlinks are stored as links.
pub fn buildpack_layer(
    dir: &Path,
    tar_name: &str,
    src: &Path,
    dest: &str,
    uid: u32,
    gid: u32,
) -> Result<PathBuf> {
    let mut writer = LayerWriter::create(dir.join(tar_name), uid, gid)?;
    let dest = dest.trim_matches('/');
    writer.parents(dest, MODE_DIR)?;

    let walker = walkdir::WalkDir::new(src)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name();

    for entry in walker {
        let entry = entry.map_err(|e| {
            PackError::Build(format!("failed to read buildpack {}: {}", src.display(), e))
        })?;
        let relative = entry.path().strip_prefix(src).map_err(|e| {
            PackError::Build(format!("failed to archive {}: {}", entry.path().display(), e))
        })?;
        let name = format!("{}/{}", dest, relative.to_string_lossy().replace('\\', "/"));

        let file_type = entry.file_type();
        if file_type.is_dir() {
            writer.dir(&name, MODE_DIR)?;
        } else if file_type.is_symlink() {
            let target = std::fs::read_link(entry.path()).map_err(|e| writer.error(&name, e))?;
            writer.symlink(&name, &target)?;
        } else {
            let metadata = entry.metadata().map_err(|e| writer.error(&name, e))?;
            let mode = if is_executable(&metadata) {
                MODE_EXEC_FILE
            } else {
                MODE_READ_ONLY_FILE
            };
            writer.file_from_disk(&name, mode, entry.path())?;
        }
    }

    writer.finish()
}

/// An archive holding one read-only file at `path`.
pub fn single_file_layer(dir: &Path, tar_name: &str, path: &str, contents: &str) -> Result<PathBuf> {
    let mut writer = LayerWriter::create(dir.join(tar_name), 0, 0)?;
    let path = path.trim_start_matches('/');
    if let Some((parent, _)) = path.rsplit_once('/') {
        writer.parents(parent, MODE_DIR)?;
    }
    writer.file(path, MODE_READ_ONLY_FILE, contents.as_bytes())?;
    writer.finish()
}

#[cfg(unix)]
fn is_executable(metadata: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &std::fs::Metadata) -> bool {
    false
}

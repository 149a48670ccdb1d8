//! In-memory fakes for the image, fetcher, engine and name seams.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bpack_core::error::{PackError, Result};
use parking_lot::Mutex;

use crate::build::names::NameGenerator;
use crate::engine::ContainerEngine;
use crate::oci::{Image, ImageFetcher, LayerBlob, PullPolicy};

#[derive(Debug, Default)]
pub struct FakeImageState {
    pub name: String,
    pub env: HashMap<String, String>,
    pub labels: HashMap<String, String>,
    /// Path and content of every added layer, in order
    pub added_layers: Vec<(PathBuf, Vec<u8>)>,
    /// Method calls in order ("rename", "add_layer", "set_label", "rebase", "save")
    pub calls: Vec<String>,
    pub rebases: Vec<(String, String)>,
    pub top_layer: String,
    pub digest: String,
    pub save_digest: String,
    pub fail_save: Option<String>,
    pub fail_set_label: Option<String>,
    pub fail_rebase: Option<String>,
    pub saved_as: Vec<String>,
}

/// Image whose state is shared between clones, so a test can keep a handle
/// to an image it gave away as `Box<dyn Image>`.
#[derive(Debug, Clone, Default)]
pub struct FakeImage {
    state: Arc<Mutex<FakeImageState>>,
}

impl FakeImage {
    pub fn new(name: &str) -> Self {
        let image = Self::default();
        {
            let mut state = image.state.lock();
            state.name = name.to_string();
            state.save_digest = "sha256:saved".to_string();
        }
        image
    }

    pub fn with_env(self, key: &str, value: &str) -> Self {
        self.state.lock().env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_label(self, key: &str, value: &str) -> Self {
        self.state.lock().labels.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_top_layer(self, top_layer: &str, digest: &str) -> Self {
        {
            let mut state = self.state.lock();
            state.top_layer = top_layer.to_string();
            state.digest = digest.to_string();
        }
        self
    }

    pub fn state(&self) -> parking_lot::MutexGuard<'_, FakeImageState> {
        self.state.lock()
    }

    pub fn is_same(&self, other: &FakeImage) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

#[async_trait]
impl Image for FakeImage {
    fn name(&self) -> String {
        self.state.lock().name.clone()
    }

    fn rename(&mut self, name: &str) {
        let mut state = self.state.lock();
        state.calls.push("rename".to_string());
        state.name = name.to_string();
    }

    fn env(&self, key: &str) -> Result<Option<String>> {
        Ok(self.state.lock().env.get(key).cloned())
    }

    fn label(&self, key: &str) -> Result<Option<String>> {
        Ok(self.state.lock().labels.get(key).cloned())
    }

    fn set_label(&mut self, key: &str, value: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push("set_label".to_string());
        if let Some(msg) = &state.fail_set_label {
            return Err(PackError::Image(msg.clone()));
        }
        state.labels.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn add_layer(&mut self, tar_path: &Path) -> Result<()> {
        let content = std::fs::read(tar_path)?;
        let mut state = self.state.lock();
        state.calls.push("add_layer".to_string());
        state.added_layers.push((tar_path.to_path_buf(), content));
        Ok(())
    }

    fn rebase(&mut self, old_top_layer: &str, new_base: &dyn Image) -> Result<()> {
        let base_name = new_base.name();
        let mut state = self.state.lock();
        state.calls.push("rebase".to_string());
        if let Some(msg) = &state.fail_rebase {
            return Err(PackError::Image(msg.clone()));
        }
        state.rebases.push((old_top_layer.to_string(), base_name));
        Ok(())
    }

    fn top_layer(&self) -> Result<String> {
        Ok(self.state.lock().top_layer.clone())
    }

    fn digest(&self) -> Result<String> {
        Ok(self.state.lock().digest.clone())
    }

    fn layers(&self) -> Vec<LayerBlob> {
        Vec::new()
    }

    async fn save(&mut self) -> Result<String> {
        let mut state = self.state.lock();
        state.calls.push("save".to_string());
        if let Some(msg) = &state.fail_save {
            return Err(PackError::Image(msg.clone()));
        }
        let name = state.name.clone();
        state.saved_as.push(name);
        let digest = state.save_digest.clone();
        state.digest = digest.clone();
        Ok(digest)
    }
}

/// Fetcher serving registered fake images and recording every request.
#[derive(Debug, Clone, Default)]
pub struct FakeFetcher {
    images: Arc<Mutex<HashMap<String, FakeImage>>>,
    fetches: Arc<Mutex<Vec<(String, PullPolicy)>>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image(self, reference: &str, image: FakeImage) -> Self {
        self.images.lock().insert(reference.to_string(), image);
        self
    }

    pub fn fetches(&self) -> Vec<(String, PullPolicy)> {
        self.fetches.lock().clone()
    }

    pub fn fetched_refs(&self) -> Vec<String> {
        self.fetches().into_iter().map(|(r, _)| r).collect()
    }
}

#[async_trait]
impl ImageFetcher for FakeFetcher {
    async fn fetch(&self, reference: &str, policy: PullPolicy) -> Result<Box<dyn Image>> {
        self.fetches.lock().push((reference.to_string(), policy));
        match self.images.lock().get(reference) {
            Some(image) => Ok(Box::new(image.clone())),
            None => Err(PackError::NotFound(format!("image {}", reference))),
        }
    }
}

/// Engine recording removals, with per-resource failures.
#[derive(Debug, Clone, Default)]
pub struct FakeEngine {
    calls: Arc<Mutex<Vec<String>>>,
    failures: Arc<Mutex<HashMap<String, String>>>,
    missing: Arc<Mutex<HashSet<String>>>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removing `name` fails with `message`.
    pub fn failing(self, name: &str, message: &str) -> Self {
        self.failures.lock().insert(name.to_string(), message.to_string());
        self
    }

    /// `name` does not exist.
    pub fn missing(self, name: &str) -> Self {
        self.missing.lock().insert(name.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn outcome(&self, name: &str) -> Result<()> {
        if let Some(msg) = self.failures.lock().get(name) {
            return Err(PackError::Other(msg.clone()));
        }
        if self.missing.lock().contains(name) {
            return Err(PackError::NotFound(name.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn remove_image(&self, reference: &str) -> Result<()> {
        self.calls.lock().push(format!("remove_image {}", reference));
        self.outcome(reference)
    }

    async fn remove_volume(&self, name: &str, force: bool) -> Result<()> {
        self.calls.lock().push(format!("remove_volume {} force={}", name, force));
        self.outcome(name)
    }
}

/// Hands out the given suffixes in order, then repeats the last one.
#[derive(Debug, Default)]
pub struct FixedNames {
    suffixes: Vec<String>,
    next: Mutex<usize>,
}

impl FixedNames {
    pub fn new(suffixes: &[&str]) -> Self {
        Self {
            suffixes: suffixes.iter().map(|s| s.to_string()).collect(),
            next: Mutex::new(0),
        }
    }
}

impl NameGenerator for FixedNames {
    fn suffix(&self) -> String {
        let mut next = self.next.lock();
        let index = (*next).min(self.suffixes.len().saturating_sub(1));
        *next += 1;
        self.suffixes.get(index).cloned().unwrap_or_default()
    }
}

//! `bpack build` command - assemble an ephemeral builder for an app.
//!
//! Creates a private copy of the builder image carrying the platform env,
//! buildpacks and detection order, creates the layers and app volumes, and
//! prints what the lifecycle phases need to run against them.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use bpack_core::config::PackConfig;
use bpack_core::error::PackError;
use bpack_core::volume::VolumeConfig;
use bpack_runtime::{
    ContainerEngine, Lifecycle, LifecycleConfig, LocalEngine, PullPolicy, RandomNames,
    StoreFetcher, VolumeStore,
};
use clap::Args;

#[derive(Args)]
pub struct BuildArgs {
    /// Builder image (defaults to the configured default builder)
    #[arg(long)]
    pub builder: Option<String>,

    /// Platform environment variable (KEY=VALUE), can be repeated
    #[arg(short = 'e', long = "env")]
    pub env: Vec<String>,

    /// Buildpack ID[@VERSION] or directory, can be repeated
    #[arg(short = 'b', long = "buildpack")]
    pub buildpacks: Vec<String>,

    /// Application directory
    #[arg(short, long, default_value = ".")]
    pub path: String,

    /// Use only local images
    #[arg(long)]
    pub no_pull: bool,

    /// Leave the ephemeral builder and volumes in place
    #[arg(long)]
    pub keep: bool,
}

pub async fn execute(args: BuildArgs) -> Result<(), Box<dyn std::error::Error>> {
    let app_dir = PathBuf::from(&args.path)
        .canonicalize()
        .map_err(|e| format!("Invalid app path '{}': {}", args.path, e))?;

    let config = PackConfig::load_default()?;
    let builder = args
        .builder
        .clone()
        .or_else(|| config.default_builder_image.clone())
        .ok_or("No builder specified; pass --builder or run `bpack set-default-builder`")?;

    let env = parse_env(&args.env)?;

    let images = Arc::new(super::open_image_store()?);
    let volumes = Arc::new(VolumeStore::default_path());
    let engine: Arc<dyn ContainerEngine> =
        Arc::new(LocalEngine::new(images.clone(), volumes.clone()));
    let fetcher = StoreFetcher::new(images);

    let lifecycle = Lifecycle::prepare(
        LifecycleConfig {
            builder_image: builder,
            env,
            buildpacks: args.buildpacks.clone(),
            app_dir,
            pull_policy: PullPolicy::from_flags(false, args.no_pull),
        },
        &fetcher,
        engine,
        &RandomNames,
    )
    .await?;

    let names = session_volumes(&lifecycle);
    let result = create_volumes(&volumes, &names, lifecycle.builder_image()).and_then(|()| {
        println!("{}", serde_json::to_string_pretty(&lifecycle.handoff())?);
        Ok(())
    });

    if args.keep && result.is_ok() {
        return result;
    }

    release_volumes(&volumes, &names, lifecycle.builder_image());
    let cleanup = lifecycle.cleanup().await;
    result?;
    cleanup?;
    Ok(())
}

fn session_volumes(lifecycle: &Lifecycle) -> [&str; 2] {
    [lifecycle.layers_volume(), lifecycle.app_volume()]
}

/// Layers and app volumes, held by the builder image.
fn create_volumes(
    volumes: &VolumeStore,
    names: &[&str],
    builder: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    for name in names {
        volumes.create(VolumeConfig::for_builder(name, builder))?;
    }
    Ok(())
}

/// Drop the builder's hold on its volumes ahead of teardown. Volumes that
/// were never created are skipped.
fn release_volumes(volumes: &VolumeStore, names: &[&str], builder: &str) {
    for name in names {
        match volumes.detach(name, builder) {
            Ok(()) | Err(PackError::NotFound(_)) => {}
            Err(e) => tracing::warn!(volume = %name, error = %e, "Failed to release volume"),
        }
    }
}

/// Parse KEY=VALUE pairs into a HashMap.
fn parse_env(args: &[String]) -> Result<HashMap<String, String>, String> {
    let mut map = HashMap::new();
    for arg in args {
        let (key, value) = arg
            .split_once('=')
            .ok_or_else(|| format!("Invalid env (expected KEY=VALUE): {arg}"))?;
        if key.is_empty() || key.contains('/') {
            return Err(format!("Invalid env variable name: '{key}'"));
        }
        map.insert(key.to_string(), value.to_string());
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volumes_held_until_released() {
        let tmp = tempfile::TempDir::new().unwrap();
        let volumes = VolumeStore::new(tmp.path().join("volumes.json"), tmp.path().join("volumes"));
        let builder = "bpack.local/builder/abc";
        let names = ["bpack-layers-abc", "bpack-app-abc"];

        // Only the first volume exists, as after a failed second create
        create_volumes(&volumes, &names[..1], builder).unwrap();
        assert!(volumes.remove(names[0], false).is_err());

        release_volumes(&volumes, &names, builder);
        assert!(!volumes.get(names[0]).unwrap().unwrap().is_in_use());
        volumes.remove(names[0], false).unwrap();
    }

    #[test]
    fn test_parse_env_valid() {
        let args = vec!["BP_JAVA_VERSION=17".to_string(), "DEBUG=true".to_string()];
        let result = parse_env(&args).unwrap();
        assert_eq!(result.get("BP_JAVA_VERSION"), Some(&"17".to_string()));
        assert_eq!(result.get("DEBUG"), Some(&"true".to_string()));
    }

    #[test]
    fn test_parse_env_invalid() {
        assert!(parse_env(&["NOEQUALS".to_string()]).is_err());
        assert!(parse_env(&["=value".to_string()]).is_err());
        assert!(parse_env(&["a/b=value".to_string()]).is_err());
    }

    #[test]
    fn test_parse_env_value_with_equals() {
        let args = vec!["URL=http://example.com?a=1".to_string()];
        let result = parse_env(&args).unwrap();
        assert_eq!(
            result.get("URL"),
            Some(&"http://example.com?a=1".to_string())
        );
    }

    #[test]
    fn test_parse_env_last_wins() {
        let args = vec!["K=1".to_string(), "K=2".to_string()];
        assert_eq!(parse_env(&args).unwrap()["K"], "2");
    }
}

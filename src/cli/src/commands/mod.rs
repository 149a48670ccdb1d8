//! CLI command definitions and dispatch.

mod build;
mod inspect_builder;
mod rebase;
mod set_default_builder;
mod set_run_image_mirrors;
mod version;

use std::path::PathBuf;

use bpack_core::config::PackConfig;
use clap::{Parser, Subcommand};

/// bpack - Cloud Native Buildpacks builder and rebase tool.
#[derive(Parser)]
#[command(name = "bpack", version, about)]
pub struct Cli {
    /// Only show errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Show debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Prefix log lines with timestamps
    #[arg(long, global = true)]
    pub timestamps: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Log level forced by flags, if any.
    pub fn log_level(&self) -> Option<&'static str> {
        if self.verbose {
            Some("debug")
        } else if self.quiet {
            Some("error")
        } else {
            None
        }
    }
}

/// Available commands.
#[derive(Subcommand)]
pub enum Command {
    /// Assemble an ephemeral builder for an app
    Build(build::BuildArgs),
    /// Swap an app image's run image without rebuilding
    Rebase(rebase::RebaseArgs),
    /// Show the run image and mirrors a builder uses
    InspectBuilder(inspect_builder::InspectBuilderArgs),
    /// Configure mirrors preferred for a run image
    SetRunImageMirrors(set_run_image_mirrors::SetRunImageMirrorsArgs),
    /// Set the builder used when none is given
    SetDefaultBuilder(set_default_builder::SetDefaultBuilderArgs),
    /// Show version information
    Version(version::VersionArgs),
}

/// Return the path to the image store directory (~/.bpack/images).
pub(crate) fn images_dir() -> PathBuf {
    PackConfig::home_dir().join("images")
}

/// Open the shared image store.
pub(crate) fn open_image_store() -> Result<bpack_runtime::ImageStore, Box<dyn std::error::Error>> {
    let dir = images_dir();
    let store = bpack_runtime::ImageStore::new(&dir)?;
    Ok(store)
}

/// Dispatch a parsed CLI to the appropriate command handler.
pub async fn dispatch(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::Build(args) => build::execute(args).await,
        Command::Rebase(args) => rebase::execute(args).await,
        Command::InspectBuilder(args) => inspect_builder::execute(args).await,
        Command::SetRunImageMirrors(args) => set_run_image_mirrors::execute(args).await,
        Command::SetDefaultBuilder(args) => set_default_builder::execute(args).await,
        Command::Version(args) => version::execute(args).await,
    }
}

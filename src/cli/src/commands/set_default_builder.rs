//! `bpack set-default-builder` command.

use bpack_core::config::PackConfig;
use clap::Args;

#[derive(Args)]
pub struct SetDefaultBuilderArgs {
    /// Builder image used when `build` gets no --builder
    pub image: String,
}

pub async fn execute(args: SetDefaultBuilderArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = PackConfig::load_default()?;
    config.set_default_builder(&args.image);
    config.save()?;

    println!("Default builder set to '{}'", args.image);
    Ok(())
}

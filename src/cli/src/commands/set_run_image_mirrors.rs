//! `bpack set-run-image-mirrors` command.

use bpack_core::config::PackConfig;
use clap::Args;

#[derive(Args)]
pub struct SetRunImageMirrorsArgs {
    /// Run image the mirrors stand in for
    pub run_image: String,

    /// Mirror to prefer, can be repeated
    #[arg(short = 'm', long = "mirror", required = true)]
    pub mirrors: Vec<String>,
}

pub async fn execute(args: SetRunImageMirrorsArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = PackConfig::load_default()?;
    config.set_run_image_mirrors(&args.run_image, args.mirrors.clone());
    config.save()?;

    println!(
        "Run image '{}' configured with mirrors: {}",
        args.run_image,
        args.mirrors.join(", ")
    );
    Ok(())
}

//! `bpack rebase` command - move an app image onto a new run image.

use std::sync::Arc;

use bpack_core::config::PackConfig;
use bpack_runtime::{ImageFetcher, RebaseFactory, RebaseFlags, StoreFetcher};
use clap::Args;

#[derive(Args)]
pub struct RebaseArgs {
    /// App image to rebase
    pub image: String,

    /// Run image to use instead of the one recorded in the app image
    #[arg(long)]
    pub run_image: Option<String>,

    /// Always fetch images from the registry
    #[arg(long)]
    pub publish: bool,

    /// Use only local images
    #[arg(long)]
    pub no_pull: bool,
}

pub async fn execute(args: RebaseArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = PackConfig::load_default()?;
    let store = Arc::new(super::open_image_store()?);
    let fetcher: Arc<dyn ImageFetcher> = Arc::new(StoreFetcher::new(store));

    let factory = RebaseFactory::new(fetcher, config);
    let flags = RebaseFlags {
        repo_name: args.image,
        run_image: args.run_image,
        publish: args.publish,
        no_pull: args.no_pull,
    };

    let rebase_config = factory.rebase_config_from_flags(&flags).await?;
    let digest = factory.rebase(rebase_config).await?;

    println!("{digest}");
    Ok(())
}

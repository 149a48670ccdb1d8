//! `bpack inspect-builder` command - show a builder's run image settings.

use std::fmt::Write;

use bpack_core::config::PackConfig;
use bpack_runtime::{inspect_builder, BuilderInfo, PullPolicy, StoreFetcher};
use clap::Args;

#[derive(Args)]
pub struct InspectBuilderArgs {
    /// Builder image (defaults to the configured default builder)
    pub image: Option<String>,

    /// Use only local images
    #[arg(long)]
    pub no_pull: bool,
}

pub async fn execute(args: InspectBuilderArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = PackConfig::load_default()?;
    let builder = args
        .image
        .or_else(|| config.default_builder_image.clone())
        .ok_or("No builder specified; pass an image or run `bpack set-default-builder`")?;

    let fetcher = StoreFetcher::new(std::sync::Arc::new(super::open_image_store()?));
    let policy = PullPolicy::from_flags(false, args.no_pull);
    let info = inspect_builder(&fetcher, &config, &builder, policy).await?;

    print!("{}", format_builder_info(&info));
    Ok(())
}

fn format_builder_info(info: &BuilderInfo) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Builder: {}", info.name);
    let _ = writeln!(out, "Stack: {}", info.stack.as_deref().unwrap_or("(none)"));
    let _ = writeln!(out, "Run Image: {}", info.run_image.as_deref().unwrap_or("(none)"));
    for (title, mirrors) in [
        ("Run Image Mirrors", &info.run_image_mirrors),
        ("Local Run Image Mirrors", &info.local_run_image_mirrors),
    ] {
        let _ = writeln!(out, "{}:", title);
        if mirrors.is_empty() {
            let _ = writeln!(out, "  (none)");
        }
        for mirror in mirrors {
            let _ = writeln!(out, "  {}", mirror);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_builder_info() {
        let info = BuilderInfo {
            name: "cnbs/builder".to_string(),
            stack: Some("io.buildpacks.stacks.bionic".to_string()),
            run_image: Some("cnbs/run".to_string()),
            run_image_mirrors: vec!["gcr.io/cnbs/run".to_string(), "quay.io/cnbs/run".to_string()],
            local_run_image_mirrors: vec![],
        };

        assert_eq!(
            format_builder_info(&info),
            "Builder: cnbs/builder\n\
             Stack: io.buildpacks.stacks.bionic\n\
             Run Image: cnbs/run\n\
             Run Image Mirrors:\n  gcr.io/cnbs/run\n  quay.io/cnbs/run\n\
             Local Run Image Mirrors:\n  (none)\n"
        );
    }

    #[test]
    fn test_format_builder_without_run_image() {
        let info = BuilderInfo {
            name: "b".to_string(),
            ..Default::default()
        };
        let out = format_builder_info(&info);
        assert!(out.contains("Stack: (none)\n"));
        assert!(out.contains("Run Image: (none)\n"));
    }
}

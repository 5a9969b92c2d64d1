use std::path::PathBuf;

use clap::Parser;
use iptv_merge::settings::{self, IpVersion};
use tracing::info;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(long, default_value = "config.toml")]
    config: String,

    /// Channel template (overrides config)
    #[arg(long)]
    template: Option<PathBuf>,

    /// Preferred address family for channel lines (overrides config)
    #[arg(long)]
    ip_version: Option<IpVersion>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut settings = settings::load(&args.config)?;
    if let Some(template) = args.template {
        settings.template = template;
    }
    if let Some(ip_version) = args.ip_version {
        settings.output.ip_version_priority = ip_version;
    }
    info!("Configuration loaded from {}: {:?}", args.config, settings);

    let summary = iptv_merge::run(&settings).await?;
    info!(
        "Sources: {} ok, {} failed; {} entries decoded, {} channels matched, {} lines written",
        summary.sources_ok,
        summary.sources_failed,
        summary.entries,
        summary.matched_channels,
        summary.written_channels
    );
    Ok(())
}

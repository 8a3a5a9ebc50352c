//! Paper Monitor - Entry Point
//!
//! Runs the pipeline once; scheduling is left to cron or a systemd timer.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use paper_monitor::delivery::{Delivery, JsonFileDelivery};
use paper_monitor::pacing::tokio_sleeper;
use paper_monitor::{Config, Pipeline};

#[derive(Parser, Debug)]
#[command(name = "paper-monitor")]
#[command(about = "Fetch new preprints and keep the relevant ones")]
#[command(version)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, short, default_value = "config.toml", env = "PAPER_MONITOR_CONFIG")]
    config: PathBuf,

    /// Where to write the relevant papers and run statistics
    #[arg(long, short, default_value = "output/papers.json")]
    output: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,
}

fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        subscriber.with(tracing_subscriber::fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    init_tracing(&cli.log_level, cli.json_logs);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "Starting paper monitor"
    );

    let config = Config::load(&cli.config)?;
    let pipeline = Pipeline::from_config(&config, tokio_sleeper())
        .await
        .context("failed to set up the pipeline")?;

    let report = pipeline.run(chrono::Utc::now()).await;
    for failed in report.stats.failed_sources() {
        tracing::warn!(source = %failed.name, status = ?failed.status, "Source contributed no papers");
    }

    JsonFileDelivery::new(&cli.output).deliver(&report.relevant, &report.stats).await?;

    Ok(())
}

//! Clickstream attribution pipeline runner.
//!
//! Loads the canonical event feed, runs the batch pipeline, writes the
//! artifact set, and prints the monitoring report. The report is emitted
//! on every run, including CRITICAL ones; only internal-consistency
//! failures (reconciliation) exit non-zero.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clickstream_attribution::{config::PipelineConfig, feed, pipeline};

#[derive(Debug, Parser)]
#[command(name = "clickstream", about = "Session reconstruction and multi-touch attribution")]
struct Args {
    /// Canonical event feed (newline-delimited JSON).
    #[arg(long, env = "EVENT_FEED_PATH")]
    input: PathBuf,

    /// Directory for the run's JSON artifacts.
    #[arg(long, env = "OUTPUT_DIR", default_value = "output")]
    out_dir: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clickstream_attribution=info,clickstream=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = PipelineConfig::from_env();
    info!(?config, "starting attribution run");

    let events = feed::load_events(&args.input)?;
    let output = pipeline::run(events, &config)?;
    feed::write_artifacts(&args.out_dir, &output)?;

    let report_json = serde_json::to_string_pretty(&output.report)
        .context("failed to render monitoring report")?;
    println!("{report_json}");

    if output.report.is_critical() {
        warn!("run flagged CRITICAL; downstream consumers should not trust these numbers");
    }
    Ok(())
}

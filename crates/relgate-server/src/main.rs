//! relgate binary
//!
//! Installs access rules, evaluates configured checks, streams relationship
//! changes through the ingestor and evaluates the checks again.
//!
//! # Usage
//!
//! ```bash
//! # With config file
//! relgate --config scenario.yaml
//!
//! # The built-in demonstration
//! relgate --demo
//! ```

use clap::Parser;
use tracing::info;

use relgate_domain::cache::register_cache_metrics;
use relgate_server::observability::{init_logging, LoggingConfig};
use relgate_server::{runner, ServerConfig};

/// relgate - path access checks over a product/category/group graph
#[derive(Parser, Debug)]
#[command(name = "relgate")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML)
    #[arg(short, long)]
    config: Option<String>,

    /// Run the built-in demonstration scenario
    #[arg(long, conflicts_with = "config")]
    demo: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = if args.demo {
        let mut demo = ServerConfig::demo();
        demo.logging = ServerConfig::from_env()?.logging;
        demo
    } else if let Some(config_path) = args.config {
        ServerConfig::load(&config_path)?
    } else {
        ServerConfig::from_env()?
    };

    init_logging(LoggingConfig::from(&config.logging));
    register_cache_metrics();

    info!(version = env!("CARGO_PKG_VERSION"), "Starting relgate");

    let report = runner::run(&config).await?;

    info!(
        rules = config.rules.len(),
        checks = report.before.len(),
        changes_applied = report.ingest.applied,
        changes_dropped = report.ingest.dropped,
        changes_malformed = report.ingest.malformed,
        warmup_failures = report.warmup.failures.len(),
        "Scenario complete"
    );
    Ok(())
}

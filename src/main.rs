//! Pool balancer daemon.
//!
//! Loads a target pool from a TOML file, keeps it health-checked in the
//! background and periodically logs pool statistics until interrupted.
//!
//! ```text
//!   config.toml ──▶ loader ──▶ Balancer ──┬──▶ health-checks thread ──▶ prober workers ──▶ targets
//!                                         │
//!                                         └──▶ stats ticker (tokio) ──▶ tracing / metrics
//! ```

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use pool_balancer::config::load_config;
use pool_balancer::observability::{logging, metrics};
use pool_balancer::Balancer;

#[derive(Parser)]
#[command(name = "pool-balancer")]
#[command(about = "Health-checked target pool with round-robin selection", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "pool-balancer.toml")]
    config: PathBuf,

    /// Override the configured log level.
    #[arg(short, long)]
    log_level: Option<String>,

    /// Run a single health check, print a JSON report and exit.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    let level = cli
        .log_level
        .as_deref()
        .unwrap_or(&config.observability.log_level);
    logging::init_logging(level);

    tracing::info!(
        path = %cli.config.display(),
        strategy = %config.strategy,
        targets = config.targets.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let balancer = Arc::new(Balancer::from_config(&config)?);

    if cli.once {
        let checker = Arc::clone(&balancer);
        let all_reachable =
            tokio::task::spawn_blocking(move || checker.perform_health_check()).await?;
        let report: Vec<_> = balancer.servers().iter().map(|t| t.status()).collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "all_reachable": all_reachable,
                "stats": balancer.stats(),
                "targets": report,
            }))?
        );
        return Ok(());
    }

    if config.health_check.enabled {
        balancer.start_health_checks()?;
    } else {
        tracing::info!("Background health checks disabled");
    }

    let stats_interval = Duration::from_secs(config.observability.stats_interval_secs);
    let mut ticker = tokio::time::interval(stats_interval);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let stats = balancer.stats();
                tracing::info!(
                    total = stats.total,
                    alive = stats.alive,
                    healthy = stats.healthy,
                    average_load = stats.average_load,
                    "Pool statistics"
                );
            }
            _ = &mut shutdown => {
                tracing::info!("Shutdown signal received");
                break;
            }
        }
    }

    // stop_health_checks joins an OS thread
    let stopping = Arc::clone(&balancer);
    tokio::task::spawn_blocking(move || stopping.stop_health_checks()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

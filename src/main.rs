//! reqmetrics - instrumented HTTP server exposing Prometheus metrics
//!
//! Usage:
//!     reqmetrics [--config <path>]
//!
//! See --help for more options.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use reqmetrics::config::{load_config, validate_config, Config};
use reqmetrics::server::{AppServer, Router};
use reqmetrics::util::{init_logging, ShutdownSignal};
use reqmetrics::{HttpMetrics, MetricsEndpoint, MetricsRegistry};

/// HTTP server with request instrumentation and a Prometheus metrics endpoint.
#[derive(Parser, Debug)]
#[command(name = "reqmetrics")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file (defaults are used when omitted)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Override the listen address
    #[arg(long, value_name = "ADDR")]
    listen: Option<SocketAddr>,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path).with_context(|| {
            format!("failed to load configuration from '{}'", path.display())
        })?,
        None => Config::default(),
    };

    if let Some(listen) = cli.listen {
        config.server.listen = listen;
    }
    if let Some(level) = &cli.log_level {
        config.global.log_level = level.clone();
    }
    validate_config(&config)
        .map_err(anyhow::Error::msg)
        .context("invalid configuration")?;

    init_logging(&config.global.log_level, &config.global.log_format)
        .context("failed to initialize logging")?;

    if cli.validate {
        info!("Configuration is valid");
        println!("Configuration is valid.");
        println!("  Listen: {}", config.server.listen);
        println!("  Metrics path: {}", config.metrics.path);
        println!("  Duration buckets: {:?}", config.metrics.duration_buckets);
        return Ok(());
    }

    info!(
        config_path = ?cli.config,
        listen = %config.server.listen,
        metrics_path = %config.metrics.path,
        "reqmetrics starting"
    );

    run(config)
}

/// Run the server with the given configuration.
fn run(config: Config) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    runtime.block_on(run_async(config))
}

async fn run_async(config: Config) -> Result<()> {
    // Metric identity must be settled before the first request is served.
    let registry = Arc::new(MetricsRegistry::new());
    let metrics = HttpMetrics::register_with_buckets(&registry, &config.metrics.duration_buckets)
        .context("failed to register request metrics")?;

    let router = Router::new(
        config.metrics.path.clone(),
        MetricsEndpoint::new(Arc::clone(&registry)),
    );

    let server = AppServer::bind(&config.server, router, metrics)
        .await
        .with_context(|| format!("failed to bind server on {}", config.server.listen))?;

    let shutdown = ShutdownSignal::new();
    let shutdown_rx = shutdown.subscribe();
    shutdown.shutdown_on_ctrl_c();

    info!(address = %server.local_addr(), "reqmetrics is running");
    info!("press Ctrl+C to stop");

    server.run(shutdown_rx).await;

    info!("reqmetrics shut down complete");
    Ok(())
}

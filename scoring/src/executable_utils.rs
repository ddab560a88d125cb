use clap::Parser;
use common::config::Config;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing_subscriber::EnvFilter;

use crate::model::GenericError;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to config file
    #[arg(short, long, default_value = "scoring/config/dev.yaml")]
    pub config: String,
}

/// Operator options for the population run.
#[derive(Parser, Debug)]
#[command(author, version, about = "Score every patient's latest observation for anomalies", long_about = None)]
pub struct PopulationArgs {
    /// Path to config file
    #[arg(short, long, default_value = "scoring/config/dev.yaml")]
    pub config: String,

    /// Contamination fraction; overrides `batch.contamination`
    #[arg(short, long)]
    pub fraction: Option<f64>,

    /// Compute and report without writing records
    #[arg(long)]
    pub dry_run: bool,
}

/// Loads `.env`, the config file and installs the tracing subscriber.
///
/// `RUST_LOG` wins over `processor.log_level`.
pub fn initialize_executable(config_path: &str) -> Result<Config, GenericError> {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("No .env loaded: {}", e);
    }

    let config = Config::load(config_path)?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.processor.log_level))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!(
        project = %config.common.project_name,
        config = config_path,
        "Configuration loaded"
    );
    Ok(config)
}

/// Serves Prometheus metrics on `address` when one is configured.
pub fn install_metrics_exporter(address: Option<&str>) -> Result<(), GenericError> {
    let Some(address) = address else {
        tracing::debug!("No metrics address configured");
        return Ok(());
    };
    let socket: SocketAddr = address.parse()?;
    PrometheusBuilder::new().with_http_listener(socket).install()?;
    tracing::info!("Metrics exporter listening on {}", socket);
    Ok(())
}

//! CLI binary for the air-quality viewer.
//!
//! Loads every site from the historical database and the forecast directory,
//! then serves the query API.
//!
//! # Usage
//!
//! ```bash
//! aq-viewer
//! aq-viewer --config /etc/aq-monitor.yaml
//! aq-viewer --historical-db data/air_pollution_database.db --forecast-dir data --port 8080
//! RUST_LOG=air_quality_monitor=debug aq-viewer --json-logs
//! ```

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use air_quality_monitor::config::{ConfigOverrides, LogFormat, LogSettings, DEFAULT_CONFIG_FILE};
use air_quality_monitor::loader::{CsvForecastDir, SqliteHistory};
use air_quality_monitor::{server, MonitorConfig, QueryEngine, SeriesStore};
use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "aq-viewer")]
#[command(about = "Air-quality observation and forecast viewer")]
#[command(version)]
struct Args {
    /// YAML configuration file (optional; defaults apply when absent)
    #[arg(short, long, env = "AQ_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// SQLite database with one table per site
    #[arg(long, env = "AQ_HISTORICAL_DB")]
    historical_db: Option<PathBuf>,

    /// Directory containing the per-site forecast CSV files
    #[arg(long, env = "AQ_FORECAST_DIR")]
    forecast_dir: Option<PathBuf>,

    /// Address to bind
    #[arg(long, env = "AQ_BIND")]
    bind: Option<IpAddr>,

    /// Port for the API server
    #[arg(short, long, env = "AQ_PORT")]
    port: Option<u16>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

/// RUST_LOG takes precedence, then the configured level.
fn init_tracing(log: &LogSettings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match log.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let file_config = MonitorConfig::from_file(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    let found = file_config.is_some();
    let mut config = file_config.unwrap_or_default();
    config.apply(ConfigOverrides {
        historical_db: args.historical_db,
        forecast_dir: args.forecast_dir,
        bind_address: args.bind,
        port: args.port,
        log_format: args.json_logs.then_some(LogFormat::Json),
    });
    config.validate()?;

    init_tracing(&config.log);

    if !found {
        tracing::warn!(path = %args.config.display(), "Config file not found, using defaults");
    }
    tracing::info!(
        historical_db = %config.historical_db.display(),
        forecast_dir = %config.forecast_dir.display(),
        forecast_begin = %config.forecast_begin,
        forecast_end = %config.forecast_end,
        "Starting aq-viewer"
    );

    let history = SqliteHistory::open(&config.historical_db)
        .with_context(|| format!("opening {}", config.historical_db.display()))?;
    tracing::debug!(path = %history.path().display(), "Historical database opened");
    let forecast = CsvForecastDir::new(&config.forecast_dir, &config.forecast_pattern);

    // Single construction barrier: nothing is served until every site loads
    let store = SeriesStore::load(config.forecast_window(), &history, &forecast)
        .context("loading series store")?;

    let engine = QueryEngine::new(Arc::new(store)).with_window_end(config.window_end);
    server::run_server(engine, &config.server).await?;

    Ok(())
}

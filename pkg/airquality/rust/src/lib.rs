//! Time-series assembly and query engine for the Sasolburg-area air-quality
//! dashboard.
//!
//! Hourly pollutant readings for seven monitoring sites are loaded once at
//! startup, split into Observed, HeldOut and Forecast series, and served
//! read-only to an interactive front end.
//!
//! ## Architecture
//!
//! - `catalog` - Fixed enumerations: sites, pollutants, provenance classes
//! - `data` - Observation and series types
//! - `loader` - Backing-store readers (SQLite history, per-site forecast CSVs)
//! - `store` - Immutable per-site series, built in parallel
//! - `query` - Selection to filtered, plot-ready traces
//! - `server` - JSON API over the query engine
//! - `config` - YAML configuration
//!
//! ## Usage
//!
//! ```bash
//! aq-viewer --config aq-monitor.yaml
//! aq-viewer --historical-db air_pollution_database.db --forecast-dir forecasts --port 8050
//! ```

pub mod catalog;
pub mod config;
pub mod data;
pub mod error;
pub mod loader;
pub mod query;
pub mod server;
pub mod store;

pub use catalog::{Pollutant, Provenance, SiteId};
pub use config::MonitorConfig;
pub use error::{ConfigError, LoadError, QueryError};
pub use query::{QueryEngine, QueryOutcome, QueryResult, Selection, WindowEnd};
pub use store::SeriesStore;

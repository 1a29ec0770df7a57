//! Error taxonomy.
//!
//! Startup (`LoadError`) is fatal: the store is either fully populated or not
//! built at all. Query-time errors (`QueryError`) are local to one request and
//! never touch the store.

use std::path::PathBuf;

use crate::catalog::SiteId;

/// Failures while populating the series store.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("no {store} records for site {site}")]
    MissingSiteData { site: SiteId, store: &'static str },

    #[error("malformed {store} record for site {site} at row {row}: {reason}")]
    MalformedRecord {
        site: SiteId,
        store: &'static str,
        row: usize,
        reason: String,
    },

    #[error("{store} source for site {site} is missing column {column}")]
    Schema {
        site: SiteId,
        store: &'static str,
        column: String,
    },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A rejected query. The store is unaffected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("unknown site: {0}")]
    UnknownSite(String),

    #[error("invalid selection: {0}")]
    InvalidSelection(String),
}

/// Configuration file and value errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

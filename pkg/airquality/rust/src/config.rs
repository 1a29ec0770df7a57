//! YAML configuration for the viewer.
//!
//! Every field has a default, so an absent or empty file is a valid
//! configuration. Command-line flags are layered on top via [`ConfigOverrides`].

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer};

use crate::data::{parse_forecast_timestamp, ForecastWindow};
use crate::error::ConfigError;
use crate::loader::csv::{DEFAULT_PATTERN, SITE_PLACEHOLDER};
use crate::query::WindowEnd;

pub const DEFAULT_CONFIG_FILE: &str = "aq-monitor.yaml";

fn default_historical_db() -> PathBuf {
    PathBuf::from("air_pollution_database.db")
}

fn default_forecast_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_forecast_pattern() -> String {
    DEFAULT_PATTERN.to_string()
}

fn default_forecast_begin() -> NaiveDateTime {
    ForecastWindow::default().begin
}

fn default_forecast_end() -> NaiveDateTime {
    ForecastWindow::default().end
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    parse_forecast_timestamp(&text).map_err(serde::de::Error::custom)
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MonitorConfig {
    /// SQLite database with one table per site.
    #[serde(default = "default_historical_db")]
    pub historical_db: PathBuf,

    /// Directory holding the per-site forecast CSV files.
    #[serde(default = "default_forecast_dir")]
    pub forecast_dir: PathBuf,

    /// Forecast file name; `{site}` is replaced by the site identifier.
    #[serde(default = "default_forecast_pattern")]
    pub forecast_pattern: String,

    /// Observed/HeldOut cutoff.
    #[serde(
        default = "default_forecast_begin",
        deserialize_with = "deserialize_timestamp"
    )]
    pub forecast_begin: NaiveDateTime,

    #[serde(
        default = "default_forecast_end",
        deserialize_with = "deserialize_timestamp"
    )]
    pub forecast_end: NaiveDateTime,

    #[serde(default)]
    pub window_end: WindowEnd,

    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub log: LogSettings,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            historical_db: default_historical_db(),
            forecast_dir: default_forecast_dir(),
            forecast_pattern: default_forecast_pattern(),
            forecast_begin: default_forecast_begin(),
            forecast_end: default_forecast_end(),
            window_end: WindowEnd::default(),
            server: ServerSettings::default(),
            log: LogSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSettings {
    pub bind_address: IpAddr,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 8050,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Values supplied on the command line. `None` keeps the file value.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub historical_db: Option<PathBuf>,
    pub forecast_dir: Option<PathBuf>,
    pub bind_address: Option<IpAddr>,
    pub port: Option<u16>,
    pub log_format: Option<LogFormat>,
}

impl MonitorConfig {
    /// Read `path`. Returns `Ok(None)` when the file does not exist or is
    /// blank; read and parse failures are errors.
    pub fn from_file(path: &Path) -> Result<Option<Self>, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        if contents.trim().is_empty() {
            return Ok(None);
        }

        let config = serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Some(config))
    }

    pub fn apply(&mut self, overrides: ConfigOverrides) {
        if let Some(db) = overrides.historical_db {
            self.historical_db = db;
        }
        if let Some(dir) = overrides.forecast_dir {
            self.forecast_dir = dir;
        }
        if let Some(addr) = overrides.bind_address {
            self.server.bind_address = addr;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(format) = overrides.log_format {
            self.log.format = format;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.forecast_end < self.forecast_begin {
            return Err(ConfigError::Invalid(format!(
                "forecast_end {} is before forecast_begin {}",
                self.forecast_end, self.forecast_begin
            )));
        }
        if !self.forecast_pattern.contains(SITE_PLACEHOLDER) {
            return Err(ConfigError::Invalid(format!(
                "forecast_pattern {:?} must contain {}",
                self.forecast_pattern, SITE_PLACEHOLDER
            )));
        }
        Ok(())
    }

    pub fn forecast_window(&self) -> ForecastWindow {
        ForecastWindow {
            begin: self.forecast_begin,
            end: self.forecast_end,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_parse_full_config() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = r#"
historical_db: /data/air_pollution_database.db
forecast_dir: /data/forecasts
forecast_pattern: "{site}_forcast.csv"
forecast_begin: "2023-01-01 00:00:00"
forecast_end: "2023-01-07 23:00:00"
window_end: month_end
server:
  bind_address: 0.0.0.0
  port: 9000
log:
  level: debug
  format: json
"#;
        let path = dir.path().join("aq.yaml");
        fs::write(&path, yaml).unwrap();

        let cfg = MonitorConfig::from_file(&path).unwrap().unwrap();
        assert_eq!(cfg.historical_db, PathBuf::from("/data/air_pollution_database.db"));
        assert_eq!(cfg.forecast_pattern, "{site}_forcast.csv");
        assert_eq!(cfg.forecast_begin.to_string(), "2023-01-01 00:00:00");
        assert_eq!(cfg.window_end, WindowEnd::MonthEnd);
        assert_eq!(cfg.server.bind_address, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        assert_eq!(cfg.server.port, 9000);
        assert_eq!(cfg.log.format, LogFormat::Json);
        cfg.validate().unwrap();
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aq.yaml");
        fs::write(&path, "server:\n  port: 8080\n").unwrap();

        let cfg = MonitorConfig::from_file(&path).unwrap().unwrap();
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.server.bind_address, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(cfg.forecast_window(), ForecastWindow::default());
        assert_eq!(cfg.window_end, WindowEnd::MonthStart);
        assert_eq!(cfg.log.level, "info");
    }

    #[test]
    fn test_missing_or_blank_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(MonitorConfig::from_file(&dir.path().join("absent.yaml")).unwrap().is_none());

        let blank = dir.path().join("blank.yaml");
        fs::write(&blank, "\n  \n").unwrap();
        assert!(MonitorConfig::from_file(&blank).unwrap().is_none());
    }

    #[test]
    fn test_rejects_unknown_fields_and_bad_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aq.yaml");

        fs::write(&path, "forecast_start: 2022-03-01\n").unwrap();
        assert!(matches!(MonitorConfig::from_file(&path), Err(ConfigError::Parse { .. })));

        fs::write(&path, "forecast_begin: \"next tuesday\"\n").unwrap();
        assert!(matches!(MonitorConfig::from_file(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_validate() {
        let mut cfg = MonitorConfig::default();
        cfg.validate().unwrap();

        cfg.forecast_end = cfg.forecast_begin - chrono::Duration::hours(1);
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));

        let cfg = MonitorConfig {
            forecast_pattern: "forecast.csv".to_string(),
            ..MonitorConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_overrides_win() {
        let mut cfg = MonitorConfig::default();
        cfg.apply(ConfigOverrides {
            port: Some(9999),
            forecast_dir: Some(PathBuf::from("/tmp/f")),
            ..ConfigOverrides::default()
        });
        assert_eq!(cfg.server.port, 9999);
        assert_eq!(cfg.forecast_dir, PathBuf::from("/tmp/f"));
        assert_eq!(cfg.historical_db, default_historical_db());
    }
}

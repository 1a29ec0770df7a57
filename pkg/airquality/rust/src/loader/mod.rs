//! Source loading: turns backing-store rows into sorted per-site series.
//!
//! Two backing stores feed every site:
//! - the historical store (`sqlite`), split at the forecast cutoff into
//!   Observed and HeldOut
//! - the forecast store (`csv`), one file per site
//!
//! Sources sit behind traits so the store can also be populated from
//! in-memory fixtures.

pub mod csv;
pub mod sqlite;

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::catalog::SiteId;
use crate::data::{ForecastWindow, Observation, SiteSeries};
use crate::error::LoadError;

pub use self::csv::CsvForecastDir;
pub use self::sqlite::SqliteHistory;

/// Historical backing store: one logical table per site.
pub trait HistoricalSource: Send + Sync {
    /// Read every row for `site`, in any order.
    fn read_site(&self, site: SiteId) -> Result<Vec<Observation>, LoadError>;
}

/// Forecast backing store: one file per site.
pub trait ForecastSource: Send + Sync {
    /// Read every forecast row for `site`, in any order.
    fn read_site(&self, site: SiteId) -> Result<Vec<Observation>, LoadError>;
}

/// Observations held in memory, keyed by site. Serves as either store.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    name: &'static str,
    rows: HashMap<SiteId, Vec<Observation>>,
}

impl InMemorySource {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            rows: HashMap::new(),
        }
    }

    pub fn with_site(mut self, site: SiteId, rows: Vec<Observation>) -> Self {
        self.rows.insert(site, rows);
        self
    }

    fn read(&self, site: SiteId) -> Result<Vec<Observation>, LoadError> {
        match self.rows.get(&site) {
            Some(rows) if !rows.is_empty() => Ok(rows.clone()),
            _ => Err(LoadError::MissingSiteData {
                site,
                store: self.name,
            }),
        }
    }
}

impl HistoricalSource for InMemorySource {
    fn read_site(&self, site: SiteId) -> Result<Vec<Observation>, LoadError> {
        self.read(site)
    }
}

impl ForecastSource for InMemorySource {
    fn read_site(&self, site: SiteId) -> Result<Vec<Observation>, LoadError> {
        self.read(site)
    }
}

/// Load and normalize the three series for one site.
pub fn load_site(
    site: SiteId,
    history: &dyn HistoricalSource,
    forecast: &dyn ForecastSource,
    window: &ForecastWindow,
) -> Result<SiteSeries, LoadError> {
    let historical = history.read_site(site)?;
    if historical.is_empty() {
        return Err(LoadError::MissingSiteData {
            site,
            store: "historical",
        });
    }
    let predicted = forecast.read_site(site)?;
    if predicted.is_empty() {
        return Err(LoadError::MissingSiteData {
            site,
            store: "forecast",
        });
    }

    let series = SiteSeries::from_streams(site, historical, predicted, window.begin);

    debug!(
        site = %site,
        observed = series.observed.len(),
        held_out = series.held_out.len(),
        forecast = series.forecast.len(),
        "Loaded site"
    );

    check_forecast_alignment(&series, window);
    Ok(series)
}

/// Forecast/held-out overlap is an assumption about the input data, not an
/// engine invariant: report, never fail.
fn check_forecast_alignment(series: &SiteSeries, window: &ForecastWindow) {
    let (Some(first), Some(last)) = (series.forecast.first(), series.forecast.last()) else {
        return;
    };

    if let (Some(held_first), Some(held_last)) = (series.held_out.first(), series.held_out.last()) {
        if last.timestamp < held_first.timestamp || first.timestamp > held_last.timestamp {
            warn!(
                site = %series.site,
                forecast_start = %first.timestamp,
                forecast_end = %last.timestamp,
                held_out_start = %held_first.timestamp,
                held_out_end = %held_last.timestamp,
                "Forecast does not overlap held-out data"
            );
        }
    }

    if last.timestamp > window.end {
        warn!(
            site = %series.site,
            forecast_end = %last.timestamp,
            horizon_end = %window.end,
            "Forecast extends past the nominal horizon"
        );
    }
}

/// Parse a numeric cell. Blank or non-numeric text is a missing reading.
pub(crate) fn parse_reading(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    text.parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Pollutant;
    use crate::data::PollutantValues;
    use chrono::{NaiveDate, NaiveDateTime};

    fn ts(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn hourly(site: SiteId, start: NaiveDateTime, hours: i64) -> Vec<Observation> {
        (0..hours)
            .map(|h| {
                Observation::new(
                    site,
                    start + chrono::Duration::hours(h),
                    PollutantValues::default().with(Pollutant::SO2, h as f64),
                )
            })
            .collect()
    }

    #[test]
    fn test_load_site_splits_history_at_cutoff() {
        let site = SiteId::Sharpeville;
        let window = ForecastWindow::default();
        let mut history = hourly(site, ts(2022, 2, 28, 0), 48);
        history.reverse();
        let history = InMemorySource::new("historical").with_site(site, history);
        let forecast =
            InMemorySource::new("forecast").with_site(site, hourly(site, ts(2022, 3, 1, 2), 10));

        let series = load_site(site, &history, &forecast, &window).unwrap();

        // 2022-02-28 00:00 .. 2022-03-01 01:00 inclusive
        assert_eq!(series.observed.len(), 26);
        assert_eq!(series.held_out.len(), 22);
        assert_eq!(series.forecast.len(), 10);
        assert_eq!(series.observed.last().unwrap().timestamp, window.begin);
        assert!(series.held_out.first().unwrap().timestamp > window.begin);
    }

    #[test]
    fn test_load_site_missing_history() {
        let site = SiteId::Leitrim;
        let history = InMemorySource::new("historical");
        let forecast =
            InMemorySource::new("forecast").with_site(site, hourly(site, ts(2022, 3, 1, 2), 1));

        let err = load_site(site, &history, &forecast, &ForecastWindow::default()).unwrap_err();
        assert!(matches!(
            err,
            LoadError::MissingSiteData {
                site: SiteId::Leitrim,
                store: "historical"
            }
        ));
    }

    #[test]
    fn test_load_site_missing_forecast() {
        let site = SiteId::Leitrim;
        let history =
            InMemorySource::new("historical").with_site(site, hourly(site, ts(2022, 2, 1, 0), 5));
        let forecast = InMemorySource::new("forecast");

        let err = load_site(site, &history, &forecast, &ForecastWindow::default()).unwrap_err();
        assert!(matches!(err, LoadError::MissingSiteData { store: "forecast", .. }));
    }

    struct EmptyForecast;

    impl ForecastSource for EmptyForecast {
        fn read_site(&self, _site: SiteId) -> Result<Vec<Observation>, LoadError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_load_site_empty_forecast_is_missing() {
        let site = SiteId::Leitrim;
        let history =
            InMemorySource::new("historical").with_site(site, hourly(site, ts(2022, 2, 1, 0), 5));

        let err = load_site(site, &history, &EmptyForecast, &ForecastWindow::default()).unwrap_err();
        assert!(matches!(
            err,
            LoadError::MissingSiteData {
                site: SiteId::Leitrim,
                store: "forecast"
            }
        ));
    }

    #[test]
    fn test_parse_reading() {
        assert_eq!(parse_reading(" 12.5 "), Some(12.5));
        assert_eq!(parse_reading("7"), Some(7.0));
        assert_eq!(parse_reading(""), None);
        assert_eq!(parse_reading("NoData"), None);
        assert_eq!(parse_reading("NaN"), None);
    }
}

//! Core data types shared by the loader, the store and the query engine.

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use serde::Serialize;

use crate::catalog::{Pollutant, SiteId};

/// Timestamp formats accepted in the forecast `datetime` column.
const FORECAST_TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

/// The fixed instant separating Observed from HeldOut, and the nominal end of
/// the forecast horizon. `end` only feeds UI defaults and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ForecastWindow {
    pub begin: NaiveDateTime,
    pub end: NaiveDateTime,
}

const DEFAULT_FORECAST_BEGIN: NaiveDateTime = hour_of(2022, 3, 1, 1);
const DEFAULT_FORECAST_END: NaiveDateTime = hour_of(2022, 3, 7, 23);

impl Default for ForecastWindow {
    fn default() -> Self {
        Self {
            begin: DEFAULT_FORECAST_BEGIN,
            end: DEFAULT_FORECAST_END,
        }
    }
}

/// Only used in const context, where an invalid literal fails the build.
const fn hour_of(year: i32, month: u32, day: u32, hour: u32) -> NaiveDateTime {
    match NaiveDate::from_ymd_opt(year, month, day) {
        Some(date) => match date.and_hms_opt(hour, 0, 0) {
            Some(timestamp) => timestamp,
            None => panic!("invalid hour in constant timestamp"),
        },
        None => panic!("invalid date in constant timestamp"),
    }
}

/// One optional concentration per pollutant, indexed by [`Pollutant::index`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PollutantValues([Option<f64>; 8]);

impl PollutantValues {
    pub fn get(&self, pollutant: Pollutant) -> Option<f64> {
        self.0[pollutant.index()]
    }

    pub fn set(&mut self, pollutant: Pollutant, value: Option<f64>) {
        self.0[pollutant.index()] = value;
    }

    pub fn with(mut self, pollutant: Pollutant, value: f64) -> Self {
        self.set(pollutant, Some(value));
        self
    }
}

/// One timestamped set of readings for one site.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub site: SiteId,
    pub timestamp: NaiveDateTime,
    pub values: PollutantValues,
}

impl Observation {
    pub fn new(site: SiteId, timestamp: NaiveDateTime, values: PollutantValues) -> Self {
        Self {
            site,
            timestamp,
            values,
        }
    }

    pub fn year(&self) -> i32 {
        self.timestamp.year()
    }

    pub fn month(&self) -> u32 {
        self.timestamp.month()
    }

    pub fn day(&self) -> u32 {
        self.timestamp.day()
    }

    pub fn hour(&self) -> u32 {
        self.timestamp.hour()
    }
}

/// Build a timestamp from the separate historical date/time fields.
///
/// `hour` is the `time` column: whole hours 0-23.
pub fn combine_timestamp(year: i64, month: i64, day: i64, hour: i64) -> Result<NaiveDateTime, String> {
    let year = i32::try_from(year).map_err(|_| format!("year {} out of range", year))?;
    let month = u32::try_from(month).map_err(|_| format!("month {} out of range", month))?;
    let day = u32::try_from(day).map_err(|_| format!("day {} out of range", day))?;
    let hour = u32::try_from(hour).map_err(|_| format!("hour {} out of range", hour))?;

    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| format!("invalid date {:04}-{:02}-{:02}", year, month, day))?
        .and_hms_opt(hour, 0, 0)
        .ok_or_else(|| format!("invalid hour {}", hour))
}

/// Parse the pre-combined forecast timestamp.
pub fn parse_forecast_timestamp(text: &str) -> Result<NaiveDateTime, String> {
    let text = text.trim();
    FORECAST_TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .ok_or_else(|| format!("unparsable datetime {:?}", text))
}

/// Ordered, immutable observations for one (site, provenance) pair.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
    observations: Vec<Observation>,
}

impl Series {
    /// Sort ascending by timestamp. The sort is stable, so rows sharing a
    /// timestamp keep their source order.
    pub fn from_unsorted(mut observations: Vec<Observation>) -> Self {
        observations.sort_by_key(|o| o.timestamp);
        Self { observations }
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn first(&self) -> Option<&Observation> {
        self.observations.first()
    }

    pub fn last(&self) -> Option<&Observation> {
        self.observations.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Observation> {
        self.observations.iter()
    }

    pub fn as_slice(&self) -> &[Observation] {
        &self.observations
    }

    /// Observations with `start <= timestamp <= end`. Empty when `end < start`.
    pub fn window(&self, start: NaiveDateTime, end: NaiveDateTime) -> &[Observation] {
        if end < start {
            return &[];
        }
        let lo = self.observations.partition_point(|o| o.timestamp < start);
        let hi = self.observations.partition_point(|o| o.timestamp <= end);
        &self.observations[lo..hi]
    }

    /// Split at `cutoff`: `(<= cutoff, > cutoff)`.
    fn split_at_cutoff(mut self, cutoff: NaiveDateTime) -> (Series, Series) {
        let at = self.observations.partition_point(|o| o.timestamp <= cutoff);
        let after = self.observations.split_off(at);
        (self, Series { observations: after })
    }
}

/// The three series held for one site.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteSeries {
    pub site: SiteId,
    pub observed: Series,
    pub held_out: Series,
    pub forecast: Series,
}

impl SiteSeries {
    /// Sort both streams and partition the historical one at `cutoff`.
    pub fn from_streams(
        site: SiteId,
        historical: Vec<Observation>,
        forecast: Vec<Observation>,
        cutoff: NaiveDateTime,
    ) -> Self {
        let (observed, held_out) = Series::from_unsorted(historical).split_at_cutoff(cutoff);
        Self {
            site,
            observed,
            held_out,
            forecast: Series::from_unsorted(forecast),
        }
    }
}

/// A single plot point for the selected pollutant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub timestamp: NaiveDateTime,
    /// `None` when the reading is missing; plotted as a gap.
    pub value: Option<f64>,
}

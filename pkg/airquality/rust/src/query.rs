//! Query engine: selection in, per-site filtered point lists out.
//!
//! Every query is a pure read over the shared [`SeriesStore`]. Nothing here
//! holds state between calls, so overlapping requests need no coordination.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{Datelike, Duration, Months, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::{Marker, Pollutant, Provenance, SiteId};
use crate::data::{Series, SeriesPoint};
use crate::error::QueryError;
use crate::store::SeriesStore;

/// How the end of the date window is resolved from `(month_end, year_end)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowEnd {
    /// First instant of the end month. A March-to-March window covers only
    /// `YYYY-03-01 00:00:00`.
    #[default]
    MonthStart,
    /// Last second of the end month.
    MonthEnd,
}

/// Inclusive `[start, end]` timestamp window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl DateWindow {
    pub fn resolve(
        month_range: (u32, u32),
        year_range: (i32, i32),
        end_bound: WindowEnd,
    ) -> Result<Self, QueryError> {
        let (month_start, month_end) = month_range;
        let (year_start, year_end) = year_range;

        let start = first_of_month(year_start, month_start)?;
        let end_month = first_of_month(year_end, month_end)?;
        let end = match end_bound {
            WindowEnd::MonthStart => end_month,
            WindowEnd::MonthEnd => end_month
                .date()
                .checked_add_months(Months::new(1))
                .map(|next| next.and_time(end_month.time()) - Duration::seconds(1))
                .ok_or_else(|| {
                    QueryError::InvalidSelection(format!("year {} out of range", year_end))
                })?,
        };

        Ok(Self { start, end })
    }

    /// An inverted window is valid and matches nothing.
    pub fn is_inverted(&self) -> bool {
        self.end < self.start
    }

    pub fn contains(&self, timestamp: NaiveDateTime) -> bool {
        self.start <= timestamp && timestamp <= self.end
    }

    fn filter(&self, series: &Series, pollutant: Pollutant) -> Vec<SeriesPoint> {
        series
            .window(self.start, self.end)
            .iter()
            .map(|o| SeriesPoint {
                timestamp: o.timestamp,
                value: o.values.get(pollutant),
            })
            .collect()
    }
}

fn first_of_month(year: i32, month: u32) -> Result<NaiveDateTime, QueryError> {
    if !(1..=12).contains(&month) {
        return Err(QueryError::InvalidSelection(format!(
            "month {} outside 1-12",
            month
        )));
    }
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| QueryError::InvalidSelection(format!("year {} out of range", year)))
}

/// One interaction's worth of user choices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Selection {
    pub sites: BTreeSet<SiteId>,
    pub pollutant: Pollutant,
    /// `(start, end)`; start may exceed end.
    pub month_range: (u32, u32),
    pub year_range: (i32, i32),
}

impl Selection {
    pub fn new<I>(sites: I, pollutant: Pollutant, month_range: (u32, u32), year_range: (i32, i32)) -> Self
    where
        I: IntoIterator<Item = SiteId>,
    {
        Self {
            sites: sites.into_iter().collect(),
            pollutant,
            month_range,
            year_range,
        }
    }

    /// Build from raw identifiers. Blank site entries are skipped.
    pub fn from_identifiers<S: AsRef<str>>(
        sites: &[S],
        pollutant: &str,
        month_range: (u32, u32),
        year_range: (i32, i32),
    ) -> Result<Self, QueryError> {
        let sites = sites
            .iter()
            .map(|s| s.as_ref().trim())
            .filter(|s| !s.is_empty())
            .map(str::parse::<SiteId>)
            .collect::<Result<BTreeSet<_>, _>>()?;
        let pollutant = pollutant.parse::<Pollutant>()?;

        Ok(Self {
            sites,
            pollutant,
            month_range,
            year_range,
        })
    }
}

/// Filtered points for one site, one list per provenance class.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SiteTraces {
    pub observed: Vec<SeriesPoint>,
    pub held_out: Vec<SeriesPoint>,
    pub forecast: Vec<SeriesPoint>,
}

impl SiteTraces {
    pub fn get(&self, provenance: Provenance) -> &[SeriesPoint] {
        match provenance {
            Provenance::Observed => &self.observed,
            Provenance::HeldOut => &self.held_out,
            Provenance::Forecast => &self.forecast,
        }
    }

    fn point_count(&self) -> usize {
        self.observed.len() + self.held_out.len() + self.forecast.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub pollutant: Pollutant,
    /// Unit-labelled pollutant name for the y axis.
    pub axis_label: String,
    pub window: DateWindow,
    pub sites: BTreeMap<SiteId, SiteTraces>,
}

/// A plot-ready series with its styling.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trace<'a> {
    pub site: SiteId,
    pub provenance: Provenance,
    pub name: &'static str,
    pub color: &'static str,
    pub marker: Marker,
    pub show_legend: bool,
    pub points: &'a [SeriesPoint],
}

impl QueryResult {
    /// Traces in site order, then Observed, HeldOut, Forecast per site.
    pub fn traces(&self) -> Vec<Trace<'_>> {
        self.sites
            .iter()
            .flat_map(|(site, traces)| {
                Provenance::ALL.iter().map(move |provenance| Trace {
                    site: *site,
                    provenance: *provenance,
                    name: site.identifier(),
                    color: provenance.color_for(*site),
                    marker: provenance.marker(),
                    show_legend: provenance.shows_legend(),
                    points: traces.get(*provenance),
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    Update(QueryResult),
    /// Nothing selected; the caller keeps what it last rendered.
    NoUpdate,
}

#[derive(Debug, Clone)]
pub struct QueryEngine {
    store: Arc<SeriesStore>,
    window_end: WindowEnd,
}

impl QueryEngine {
    pub fn new(store: Arc<SeriesStore>) -> Self {
        Self {
            store,
            window_end: WindowEnd::default(),
        }
    }

    pub fn with_window_end(mut self, window_end: WindowEnd) -> Self {
        self.window_end = window_end;
        self
    }

    pub fn store(&self) -> &SeriesStore {
        &self.store
    }

    pub fn window_end(&self) -> WindowEnd {
        self.window_end
    }

    pub fn query(&self, selection: &Selection) -> Result<QueryOutcome, QueryError> {
        if selection.sites.is_empty() {
            debug!("Empty site selection, no update");
            return Ok(QueryOutcome::NoUpdate);
        }

        self.check_years(selection.year_range)?;
        let window = DateWindow::resolve(selection.month_range, selection.year_range, self.window_end)?;

        let mut sites = BTreeMap::new();
        for site in &selection.sites {
            let entry = self.store.site(*site)?;
            sites.insert(
                *site,
                SiteTraces {
                    observed: window.filter(&entry.observed, selection.pollutant),
                    held_out: window.filter(&entry.held_out, selection.pollutant),
                    forecast: window.filter(&entry.forecast, selection.pollutant),
                },
            );
        }

        debug!(
            sites = sites.len(),
            pollutant = %selection.pollutant,
            window_start = %window.start,
            window_end = %window.end,
            points = sites.values().map(SiteTraces::point_count).sum::<usize>(),
            "Query served"
        );

        Ok(QueryOutcome::Update(QueryResult {
            pollutant: selection.pollutant,
            axis_label: selection.pollutant.axis_label(),
            window,
            sites,
        }))
    }

    /// The dashboard's initial selection: Zamdela, SO2, February to April of
    /// the latest observed year.
    pub fn defaults(&self) -> Selection {
        let year = self
            .store
            .years()
            .last()
            .copied()
            .or_else(|| self.store.year_bounds().map(|(_, max)| max))
            .unwrap_or_else(|| self.store.forecast_window().begin.year());

        Selection::new([SiteId::ZamdelaNaqi], Pollutant::SO2, (2, 4), (year, year))
    }

    fn check_years(&self, (start, end): (i32, i32)) -> Result<(), QueryError> {
        let Some((min, max)) = self.store.year_bounds() else {
            return Ok(());
        };
        for year in [start, end] {
            if year < min || year > max {
                return Err(QueryError::InvalidSelection(format!(
                    "year {} outside data range {}-{}",
                    year, min, max
                )));
            }
        }
        Ok(())
    }
}

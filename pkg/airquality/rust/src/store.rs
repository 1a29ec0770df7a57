//! Series store: every site's three series, built once and read-only afterwards.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use rayon::prelude::*;
use tracing::info;

use crate::catalog::{Provenance, SiteId};
use crate::data::{ForecastWindow, Series, SiteSeries};
use crate::error::{LoadError, QueryError};
use crate::loader::{load_site, ForecastSource, HistoricalSource};

/// Immutable per-site series keyed by [`SiteId`].
///
/// Share it as `Arc<SeriesStore>`; there is no interior mutability, so
/// concurrent readers need no locking.
#[derive(Debug, Clone)]
pub struct SeriesStore {
    window: ForecastWindow,
    sites: BTreeMap<SiteId, SiteSeries>,
    year_bounds: Option<(i32, i32)>,
    observed_years: Vec<i32>,
}

impl SeriesStore {
    /// Build from already-loaded site series. A later entry for the same site
    /// replaces an earlier one.
    pub fn new(window: ForecastWindow, series: Vec<SiteSeries>) -> Self {
        let sites: BTreeMap<SiteId, SiteSeries> =
            series.into_iter().map(|s| (s.site, s)).collect();

        let mut years = BTreeSet::new();
        let mut bounds: Option<(i32, i32)> = None;
        for site in sites.values() {
            for series in [&site.observed, &site.held_out, &site.forecast] {
                // Sorted, so the ends carry the extremes
                if let (Some(first), Some(last)) = (series.first(), series.last()) {
                    let (lo, hi) = (first.year(), last.year());
                    bounds = Some(match bounds {
                        Some((min, max)) => (min.min(lo), max.max(hi)),
                        None => (lo, hi),
                    });
                }
            }
            years.extend(site.observed.iter().map(|o| o.year()));
        }

        Self {
            window,
            sites,
            year_bounds: bounds,
            observed_years: years.into_iter().collect(),
        }
    }

    /// Load every site from both backing stores.
    ///
    /// Sites load in parallel. The first error aborts construction, so a
    /// store is either complete or never built.
    pub fn load(
        window: ForecastWindow,
        history: &dyn HistoricalSource,
        forecast: &dyn ForecastSource,
    ) -> Result<Self, LoadError> {
        let start = Instant::now();

        let series = SiteId::ALL
            .par_iter()
            .map(|site| load_site(*site, history, forecast, &window))
            .collect::<Result<Vec<_>, _>>()?;

        let store = Self::new(window, series);

        let (observed, held_out, forecast_rows) =
            store.sites.values().fold((0, 0, 0), |(o, h, f), s| {
                (o + s.observed.len(), h + s.held_out.len(), f + s.forecast.len())
            });
        info!(
            sites = store.sites.len(),
            observed,
            held_out,
            forecast = forecast_rows,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Series store loaded"
        );

        Ok(store)
    }

    /// The series for one site and provenance class. Empty series are valid.
    pub fn get(&self, site: SiteId, provenance: Provenance) -> Result<&Series, QueryError> {
        let entry = self.site(site)?;
        Ok(match provenance {
            Provenance::Observed => &entry.observed,
            Provenance::HeldOut => &entry.held_out,
            Provenance::Forecast => &entry.forecast,
        })
    }

    pub fn site(&self, site: SiteId) -> Result<&SiteSeries, QueryError> {
        self.sites
            .get(&site)
            .ok_or_else(|| QueryError::UnknownSite(site.identifier().to_string()))
    }

    /// Loaded sites in declaration order.
    pub fn sites(&self) -> impl Iterator<Item = SiteId> + '_ {
        self.sites.keys().copied()
    }

    pub fn forecast_window(&self) -> &ForecastWindow {
        &self.window
    }

    /// Min and max year over all loaded observations, `None` for an empty store.
    pub fn year_bounds(&self) -> Option<(i32, i32)> {
        self.year_bounds
    }

    /// Distinct years present in Observed data, ascending.
    pub fn years(&self) -> &[i32] {
        &self.observed_years
    }
}

//! End-to-end tests over a real SQLite history database and forecast CSVs.

use std::path::Path;
use std::sync::Arc;

use air_quality_monitor::catalog::{Pollutant, Provenance, SiteId};
use air_quality_monitor::data::ForecastWindow;
use air_quality_monitor::loader::{CsvForecastDir, SqliteHistory};
use air_quality_monitor::{
    LoadError, QueryEngine, QueryError, QueryOutcome, QueryResult, Selection, SeriesStore, WindowEnd,
};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike};
use rusqlite::{params, Connection};
use tempfile::TempDir;

const FORECAST_PATTERN: &str = "{site}_forecast.csv";

fn ts(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(h, 0, 0)
        .unwrap()
}

fn hours(from: NaiveDateTime, to: NaiveDateTime) -> impl Iterator<Item = NaiveDateTime> {
    let count = (to - from).num_hours();
    (0..=count).map(move |h| from + Duration::hours(h))
}

/// Hourly history from 2021-11-01 to 2022-03-07 23:00 and an hourly forecast
/// from 2022-03-01 02:00 over the same horizon, for every site.
struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let mut conn = Connection::open(dir.path().join("air.db")).unwrap();

        let tx = conn.transaction().unwrap();
        for (i, site) in SiteId::ALL.iter().enumerate() {
            tx.execute_batch(&format!(
                "CREATE TABLE \"{}\" (year INTEGER, month INTEGER, day INTEGER, time INTEGER, site TEXT, \
                 SO2 REAL, NO2 REAL, NO REAL, NOx REAL, O3 REAL, CO REAL, PM2_5 REAL, PM10 REAL)",
                site.identifier()
            ))
            .unwrap();
            let mut stmt = tx
                .prepare(&format!(
                    "INSERT INTO \"{}\" VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6, ?6, ?6, ?6, ?7, ?8, ?8)",
                    site.identifier()
                ))
                .unwrap();
            for (n, t) in hours(ts(2021, 11, 1, 0), ts(2022, 3, 7, 23)).enumerate() {
                // Every 50th PM reading is missing
                let pm = if n % 50 == 0 { None } else { Some(20.0 + i as f64) };
                stmt.execute(params![
                    t.year(),
                    t.month(),
                    t.day(),
                    t.hour(),
                    site.identifier(),
                    n as f64 % 24.0,
                    0.3,
                    pm,
                ])
                .unwrap();
            }
        }
        tx.commit().unwrap();

        for site in SiteId::ALL {
            let mut csv = String::from("datetime,SO2,NO2,NO,NOx,O3,CO,PM2_5,PM10\n");
            for t in hours(ts(2022, 3, 1, 2), ts(2022, 3, 7, 23)) {
                csv.push_str(&format!("{},5,5,5,5,5,0.4,25,30\n", t.format("%Y-%m-%d %H:%M:%S")));
            }
            std::fs::write(dir.path().join(format!("{}_forecast.csv", site.identifier())), csv)
                .unwrap();
        }

        Self { dir }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn load(&self) -> Result<SeriesStore, LoadError> {
        let history = SqliteHistory::open(self.path().join("air.db")).unwrap();
        let forecast = CsvForecastDir::new(self.path(), FORECAST_PATTERN);
        SeriesStore::load(ForecastWindow::default(), &history, &forecast)
    }

    fn engine(&self) -> QueryEngine {
        QueryEngine::new(Arc::new(self.load().unwrap()))
    }
}

fn update(outcome: QueryOutcome) -> QueryResult {
    match outcome {
        QueryOutcome::Update(result) => result,
        QueryOutcome::NoUpdate => panic!("expected an update"),
    }
}

#[test]
fn test_store_partitions_history_at_cutoff() {
    let fixture = Fixture::new();
    let store = fixture.load().unwrap();
    let cutoff = store.forecast_window().begin;
    let total = hours(ts(2021, 11, 1, 0), ts(2022, 3, 7, 23)).count();

    for site in SiteId::ALL {
        let observed = store.get(site, Provenance::Observed).unwrap();
        let held_out = store.get(site, Provenance::HeldOut).unwrap();
        assert_eq!(observed.len() + held_out.len(), total);
        assert_eq!(observed.last().unwrap().timestamp, cutoff);
        assert_eq!(held_out.first().unwrap().timestamp, cutoff + Duration::hours(1));
        assert_eq!(store.get(site, Provenance::Forecast).unwrap().len(), 166);
    }
    assert_eq!(store.year_bounds(), Some((2021, 2022)));
}

#[test]
fn test_single_year_selection() {
    let engine = Fixture::new().engine();
    let selection = Selection::new([SiteId::ZamdelaNaqi], Pollutant::PM2_5, (1, 12), (2021, 2021));
    let result = update(engine.query(&selection).unwrap());

    let traces = &result.sites[&SiteId::ZamdelaNaqi];
    // 2021-11-01 00:00 through 2021-12-01 00:00
    assert_eq!(traces.observed.len(), 30 * 24 + 1);
    assert!(traces.observed.iter().all(|p| p.timestamp.year() == 2021));
    assert!(traces.held_out.is_empty());
    assert!(traces.forecast.is_empty());
    // Missing readings come through as gaps, not zeros
    assert!(traces.observed.iter().any(|p| p.value.is_none()));
    assert!(traces.observed.iter().flat_map(|p| p.value).all(|v| v == 26.0));
}

#[test]
fn test_cutoff_month_with_month_start_window() {
    let engine = Fixture::new().engine();
    let selection = Selection::new([SiteId::Leitrim], Pollutant::SO2, (3, 3), (2022, 2022));
    let result = update(engine.query(&selection).unwrap());

    // Window collapses to the first instant of March
    assert_eq!(result.window.start, result.window.end);
    let traces = &result.sites[&SiteId::Leitrim];
    assert_eq!(traces.observed.len(), 1);
    assert_eq!(traces.observed[0].timestamp, ts(2022, 3, 1, 0));
    assert!(traces.held_out.is_empty());
    assert!(traces.forecast.is_empty());
}

#[test]
fn test_cutoff_month_with_month_end_window() {
    let engine = Fixture::new().engine().with_window_end(WindowEnd::MonthEnd);
    let selection = Selection::new([SiteId::Leitrim], Pollutant::SO2, (3, 3), (2022, 2022));
    let result = update(engine.query(&selection).unwrap());

    let cutoff = ts(2022, 3, 1, 1);
    let traces = &result.sites[&SiteId::Leitrim];
    let observed: Vec<_> = traces.observed.iter().map(|p| p.timestamp).collect();
    assert_eq!(observed, vec![ts(2022, 3, 1, 0), cutoff]);

    // Remainder of March
    assert_eq!(traces.held_out.first().unwrap().timestamp, cutoff + Duration::hours(1));
    assert_eq!(traces.held_out.last().unwrap().timestamp, ts(2022, 3, 7, 23));
    assert_eq!(traces.forecast.len(), 166);
    assert!(traces.forecast.iter().all(|p| p.timestamp > cutoff));
}

#[test]
fn test_two_sites_filtered_independently() {
    let engine = Fixture::new().engine();
    let selection = Selection::new(
        [SiteId::Sharpeville, SiteId::AjJacobs],
        Pollutant::CO,
        (12, 2),
        (2021, 2022),
    );
    let result = update(engine.query(&selection).unwrap());

    let keys: Vec<_> = result.sites.keys().copied().collect();
    assert_eq!(keys, vec![SiteId::AjJacobs, SiteId::Sharpeville]);
    assert_eq!(result.sites[&SiteId::AjJacobs], result.sites[&SiteId::Sharpeville]);
    assert_eq!(result.axis_label, "CO (ppm)");
    assert_eq!(result.traces().len(), 6);
}

#[test]
fn test_unknown_site_leaves_store_intact() {
    let engine = Fixture::new().engine();
    let err = Selection::from_identifiers(&["Soweto"], "SO2", (1, 2), (2022, 2022)).unwrap_err();
    assert!(matches!(err, QueryError::UnknownSite(_)));

    let selection = Selection::new([SiteId::Leitrim], Pollutant::SO2, (1, 2), (2022, 2022));
    let first = engine.query(&selection).unwrap();
    assert_eq!(engine.query(&selection).unwrap(), first);
}

#[test]
fn test_empty_selection_is_no_update() {
    let engine = Fixture::new().engine();
    let selection = Selection::from_identifiers::<&str>(&[], "SO2", (2, 4), (2022, 2022)).unwrap();
    assert_eq!(engine.query(&selection).unwrap(), QueryOutcome::NoUpdate);
}

#[test]
fn test_missing_forecast_file_aborts_load() {
    let fixture = Fixture::new();
    std::fs::remove_file(fixture.path().join("Vanderbijlpark_NAQI_forecast.csv")).unwrap();

    let err = fixture.load().unwrap_err();
    assert!(matches!(
        err,
        LoadError::MissingSiteData {
            site: SiteId::VanderbijlparkNaqi,
            store: "forecast"
        }
    ));
}

#[test]
fn test_malformed_history_row_aborts_load() {
    let fixture = Fixture::new();
    let conn = Connection::open(fixture.path().join("air.db")).unwrap();
    conn.execute(
        "INSERT INTO Leitrim VALUES (2022, 2, 30, 4, 'Leitrim', 1, 1, 1, 1, 1, 1, 1, 1)",
        [],
    )
    .unwrap();
    drop(conn);

    let err = fixture.load().unwrap_err();
    assert!(matches!(
        err,
        LoadError::MalformedRecord {
            site: SiteId::Leitrim,
            store: "historical",
            ..
        }
    ));
}

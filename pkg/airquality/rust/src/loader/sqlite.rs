//! Historical store reader: one SQLite table per site.
//!
//! Table layout: `year, month, day, time, site, <pollutant columns...>`, where
//! `time` is the hour of day. Cells are read as dynamic SQLite values because
//! the tables were written by a dataframe export and column affinity varies
//! between sites.

use std::path::{Path, PathBuf};

use rusqlite::types::Value;
use rusqlite::{params, Connection, OpenFlags};
use tracing::debug;

use super::{parse_reading, HistoricalSource};
use crate::catalog::{Pollutant, SiteId};
use crate::data::{combine_timestamp, Observation, PollutantValues};
use crate::error::LoadError;

const STORE: &str = "historical";

/// Date/time columns combined into the observation timestamp.
const DATE_COLUMNS: [&str; 4] = ["year", "month", "day", "time"];

/// Read-only handle on the historical SQLite database.
///
/// A connection is opened per site load so loads can run on separate threads.
#[derive(Debug, Clone)]
pub struct SqliteHistory {
    path: PathBuf,
}

impl SqliteHistory {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, LoadError> {
        let path = path.as_ref().to_path_buf();
        if !path.is_file() {
            return Err(LoadError::Io {
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "historical database not found",
                ),
                path,
            });
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection, LoadError> {
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(conn)
    }
}

impl HistoricalSource for SqliteHistory {
    fn read_site(&self, site: SiteId) -> Result<Vec<Observation>, LoadError> {
        let conn = self.connect()?;
        let table = site.identifier();

        let exists: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![table],
            |row| row.get(0),
        )?;
        if exists == 0 {
            return Err(LoadError::MissingSiteData { site, store: STORE });
        }

        check_columns(&conn, site)?;

        let pollutant_columns: Vec<String> = Pollutant::ALL
            .iter()
            .map(|p| format!("\"{}\"", p.column()))
            .collect();
        let sql = format!(
            "SELECT year, month, day, time, {} FROM \"{}\"",
            pollutant_columns.join(", "),
            table
        );

        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;

        let mut observations = Vec::new();
        let mut missing_readings = 0usize;
        let mut row_num = 0usize;

        while let Some(row) = rows.next()? {
            row_num += 1;

            let mut fields = [0i64; 4];
            for (i, name) in DATE_COLUMNS.iter().enumerate() {
                let cell: Value = row.get(i)?;
                fields[i] = integer_cell(&cell).ok_or_else(|| LoadError::MalformedRecord {
                    site,
                    store: STORE,
                    row: row_num,
                    reason: format!("{} is not an integer: {:?}", name, cell),
                })?;
            }

            let [year, month, day, hour] = fields;
            let timestamp =
                combine_timestamp(year, month, day, hour).map_err(|reason| LoadError::MalformedRecord {
                    site,
                    store: STORE,
                    row: row_num,
                    reason,
                })?;

            let mut values = PollutantValues::default();
            for (offset, pollutant) in Pollutant::ALL.iter().enumerate() {
                let cell: Value = row.get(DATE_COLUMNS.len() + offset)?;
                let reading = numeric_cell(&cell);
                if reading.is_none() {
                    missing_readings += 1;
                }
                values.set(*pollutant, reading);
            }

            observations.push(Observation::new(site, timestamp, values));
        }

        if observations.is_empty() {
            return Err(LoadError::MissingSiteData { site, store: STORE });
        }

        debug!(
            site = %site,
            rows = observations.len(),
            missing_readings,
            "Read historical table"
        );

        Ok(observations)
    }
}

/// Fail with a schema error naming the first required column the table lacks.
fn check_columns(conn: &Connection, site: SiteId) -> Result<(), LoadError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info(\"{}\")", site.identifier()))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;

    let required = DATE_COLUMNS
        .iter()
        .copied()
        .chain(Pollutant::ALL.iter().map(|p| p.column()));

    for column in required {
        if !names.iter().any(|n| n == column) {
            return Err(LoadError::Schema {
                site,
                store: STORE,
                column: column.to_string(),
            });
        }
    }
    Ok(())
}

fn integer_cell(cell: &Value) -> Option<i64> {
    match cell {
        Value::Integer(i) => Some(*i),
        Value::Real(f) if f.is_finite() && f.fract() == 0.0 => Some(*f as i64),
        Value::Text(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite() && f.fract() == 0.0)
                    .map(|f| f as i64)
            })
        }
        _ => None,
    }
}

fn numeric_cell(cell: &Value) -> Option<f64> {
    match cell {
        Value::Integer(i) => Some(*i as f64),
        Value::Real(f) if f.is_finite() => Some(*f),
        Value::Text(s) => parse_reading(s),
        _ => None,
    }
}

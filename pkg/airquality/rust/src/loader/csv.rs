//! Forecast store reader: one CSV file per site.
//!
//! The header is inferred first, then every needed column is projected as UTF-8
//! and parsed here, so a bad timestamp surfaces as a row-level error instead of
//! a silently re-typed column.

use std::fs::File;
use std::io::Seek;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{Array, StringArray};
use arrow::csv::reader::Format;
use arrow::csv::ReaderBuilder;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use tracing::debug;

use super::{parse_reading, ForecastSource};
use crate::catalog::{Pollutant, SiteId};
use crate::data::{parse_forecast_timestamp, Observation, PollutantValues};
use crate::error::LoadError;

const STORE: &str = "forecast";

/// Column holding the pre-combined forecast timestamp.
const DATETIME_COLUMN: &str = "datetime";

/// Placeholder replaced by the site identifier in the file name pattern.
pub const SITE_PLACEHOLDER: &str = "{site}";

pub const DEFAULT_PATTERN: &str = "{site}_forecast.csv";

/// Directory of per-site forecast CSV files.
#[derive(Debug, Clone)]
pub struct CsvForecastDir {
    dir: PathBuf,
    pattern: String,
}

impl CsvForecastDir {
    pub fn new<P: AsRef<Path>>(dir: P, pattern: &str) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            pattern: pattern.to_string(),
        }
    }

    /// File for `site`, e.g. `<dir>/Zamdela_NAQI_forecast.csv`.
    pub fn path_for(&self, site: SiteId) -> PathBuf {
        self.dir
            .join(self.pattern.replace(SITE_PLACEHOLDER, site.identifier()))
    }
}

impl ForecastSource for CsvForecastDir {
    fn read_site(&self, site: SiteId) -> Result<Vec<Observation>, LoadError> {
        let path = self.path_for(site);
        let io_err = |source| LoadError::Io {
            path: path.clone(),
            source,
        };

        let mut file = match File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(LoadError::MissingSiteData { site, store: STORE });
            }
            Err(e) => return Err(io_err(e)),
        };
        if file.metadata().map_err(io_err)?.len() == 0 {
            return Err(LoadError::MissingSiteData { site, store: STORE });
        }

        let (inferred, _) = Format::default()
            .with_header(true)
            .infer_schema(&mut file, Some(1))?;
        file.rewind().map_err(io_err)?;

        // Everything as text; parsing happens per cell below.
        let schema = Arc::new(Schema::new(
            inferred
                .fields()
                .iter()
                .map(|f| Field::new(f.name(), DataType::Utf8, true))
                .collect::<Vec<_>>(),
        ));

        let wanted: Vec<&str> = std::iter::once(DATETIME_COLUMN)
            .chain(Pollutant::ALL.iter().map(|p| p.column()))
            .collect();
        let projection = wanted
            .iter()
            .map(|name| {
                schema.index_of(name).map_err(|_| LoadError::Schema {
                    site,
                    store: STORE,
                    column: name.to_string(),
                })
            })
            .collect::<Result<Vec<usize>, _>>()?;

        let reader = ReaderBuilder::new(schema)
            .with_header(true)
            .with_batch_size(8192)
            .with_projection(projection)
            .build(file)?;

        let mut observations = Vec::new();
        let mut missing_readings = 0usize;

        for batch_result in reader {
            let batch = batch_result?;
            let datetimes = string_column(&batch, DATETIME_COLUMN, site)?;
            let pollutant_columns = Pollutant::ALL
                .iter()
                .map(|p| string_column(&batch, p.column(), site))
                .collect::<Result<Vec<_>, _>>()?;

            for i in 0..batch.num_rows() {
                let row_num = observations.len() + 1;

                let text = if datetimes.is_null(i) { "" } else { datetimes.value(i) };
                let timestamp =
                    parse_forecast_timestamp(text).map_err(|reason| LoadError::MalformedRecord {
                        site,
                        store: STORE,
                        row: row_num,
                        reason,
                    })?;

                let mut values = PollutantValues::default();
                for (pollutant, column) in Pollutant::ALL.iter().zip(&pollutant_columns) {
                    let reading = if column.is_null(i) {
                        None
                    } else {
                        parse_reading(column.value(i))
                    };
                    if reading.is_none() {
                        missing_readings += 1;
                    }
                    values.set(*pollutant, reading);
                }

                observations.push(Observation::new(site, timestamp, values));
            }
        }

        if observations.is_empty() {
            return Err(LoadError::MissingSiteData { site, store: STORE });
        }

        debug!(
            site = %site,
            path = %path.display(),
            rows = observations.len(),
            missing_readings,
            "Read forecast file"
        );

        Ok(observations)
    }
}

fn string_column<'a>(
    batch: &'a RecordBatch,
    name: &str,
    site: SiteId,
) -> Result<&'a StringArray, LoadError> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| LoadError::Schema {
            site,
            store: STORE,
            column: name.to_string(),
        })
}

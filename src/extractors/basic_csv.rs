//! Generic delimited table extractor
//!
//! Handles comma, semicolon and tab separated logs: a header line, an
//! optional unit line, then one row per sample. Timestamps come from
//! configured or well-known columns, falling back to the file modification
//! time.

use super::{Extractor, file_mtime, provenance, read_text, resolve_encoding};
use crate::calibration::CalibrationSpec;
use crate::config::{ExtractorConfig, FileType, TableOptions, TimestampColumn, TimestampSpec};
use crate::constants::{ORIGINAL_METADATA_KEY, table};
use crate::dataset::{Dataset, TableAssembler};
use crate::error::{ExtractError, Result};
use crate::locale::NumberLocale;
use crate::models::{Field, Quantity, RawRecord, Scalar};
use crate::timestamp::{self, Resolved, Zone};
use crate::tree::DataTree;
use crate::uncertainty::UncertaintyModel;
use encoding_rs::Encoding;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::{debug, info, warn};

/// How the timestamp of a row is built, with resolved column indices
#[derive(Debug, Clone, PartialEq)]
enum RowClock {
    Uts(usize),
    Timestamp(usize, Option<String>),
    DateTime {
        date: (usize, Option<String>),
        time: (usize, Option<String>),
    },
    TimeOnly(usize, Option<String>),
    FileTime(f64),
}

impl RowClock {
    fn columns(&self) -> Vec<usize> {
        match self {
            RowClock::Uts(i) | RowClock::Timestamp(i, _) | RowClock::TimeOnly(i, _) => vec![*i],
            RowClock::DateTime { date, time } => vec![date.0, time.0],
            RowClock::FileTime(_) => Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BasicCsvExtractor {
    locale: NumberLocale,
    zone: Zone,
    encoding: &'static Encoding,
    uncertainty: UncertaintyModel,
    options: TableOptions,
    calibration: CalibrationSpec,
}

impl BasicCsvExtractor {
    pub fn new(
        locale: NumberLocale,
        zone: Zone,
        encoding: &'static Encoding,
        uncertainty: UncertaintyModel,
        options: TableOptions,
    ) -> Result<Self> {
        let calibration = options.calibration()?;
        Ok(Self {
            locale,
            zone,
            encoding,
            uncertainty,
            options,
            calibration,
        })
    }

    pub fn from_config(config: &ExtractorConfig, file_type: FileType) -> Result<Self> {
        Self::new(
            config.number_locale()?,
            config.zone()?,
            resolve_encoding(config.encoding_for(file_type))?,
            config.uncertainty_model()?,
            config.table.clone(),
        )
    }

    /// Parse one table into a dataset
    pub fn extract_dataset(&self, path: &Path) -> Result<Dataset> {
        info!("Parsing table: {}", path.display());
        let text = read_text(path, self.encoding)?;
        self.parse_text(&text, path)
    }

    /// Parse decoded table contents; `path` is used for context and mtime
    pub fn parse_text(&self, text: &str, path: &Path) -> Result<Dataset> {
        let sep = self.options.sep.as_str();
        let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
        let header_line = lines
            .first()
            .ok_or_else(|| ExtractError::format(path, "table has no header line"))?;
        let headers: Vec<String> = header_line.split(sep).map(clean_header).collect();
        self.calibration.check_columns(&headers)?;

        let (mut units, body) = match &self.options.units {
            Some(units) => (units.clone(), &lines[1..]),
            None => {
                let unit_line = lines
                    .get(1)
                    .ok_or_else(|| ExtractError::format(path, "table has no unit line"))?;
                (read_units(&headers, unit_line, sep), &lines[2..])
            }
        };
        units.extend(self.calibration.units());

        let clock = self.row_clock(&headers, path)?;
        let skipped: HashSet<usize> = clock.columns().into_iter().collect();

        let mut assembler = TableAssembler::new(path).with_units(units.clone());
        let mut uts = Vec::with_capacity(body.len());
        let mut fulldate = true;
        for (row, line) in body.iter().enumerate() {
            let cells: Vec<&str> = line.split(sep).map(str::trim).collect();
            if cells.len() != headers.len() {
                warn!(
                    "Row {} of {} has {} fields for {} columns",
                    row,
                    path.display(),
                    cells.len(),
                    headers.len()
                );
            }

            let resolved = self.resolve_row_time(&clock, &cells, row, path)?;
            fulldate &= resolved.fulldate;
            uts.push(resolved.uts);

            let mut record = RawRecord::new();
            for (i, (name, cell)) in headers.iter().zip(&cells).enumerate() {
                if skipped.contains(&i) || cell.is_empty() {
                    continue;
                }
                record.insert(name.as_str(), self.field(name, cell, units.get(name)));
            }
            self.calibration.apply(&mut record)?;
            assembler.push(record)?;
        }

        let dataset = assembler.finish(uts, Some(fulldate))?;
        debug!(
            "Extracted {} rows x {} variables from {}",
            dataset.len(),
            dataset.variables().len(),
            path.display()
        );
        Ok(dataset.with_attr(
            ORIGINAL_METADATA_KEY,
            provenance(FileType::BasicCsv.name(), path),
        ))
    }

    fn field(&self, name: &str, cell: &str, unit: Option<&String>) -> Field {
        match unit {
            Some(unit) => match self.locale.parse(cell) {
                Scalar::Text(text) => Field::Plain(Scalar::Text(text)),
                value => {
                    let v = value.as_f64().unwrap_or(f64::NAN);
                    let sigma = self.uncertainty.sigma(name, v, unit, None);
                    Field::Measured(Quantity::new(v, sigma, unit.as_str()))
                }
            },
            None => Field::Plain(self.locale.parse_int(cell)),
        }
    }

    /// Pick the timestamp columns from the options, else from well-known headers
    fn row_clock(&self, headers: &[String], path: &Path) -> Result<RowClock> {
        let spec = match &self.options.timestamp {
            Some(spec) if !spec.is_empty() => spec.clone(),
            _ => detect_timestamp(headers),
        };

        let locate = |column: &TimestampColumn, default: &str| -> Result<(usize, Option<String>)> {
            let index = match column.index {
                Some(index) if index < headers.len() => index,
                Some(index) => {
                    return Err(ExtractError::configuration(format!(
                        "timestamp column {} out of range for {} columns",
                        index,
                        headers.len()
                    )));
                }
                None => headers.iter().position(|h| h == default).ok_or_else(|| {
                    ExtractError::configuration(format!("no '{}' column in header", default))
                })?,
            };
            Ok((index, column.format.clone()))
        };

        let clock = match (&spec.uts, &spec.timestamp, &spec.date, &spec.time) {
            (Some(uts), _, _, _) => RowClock::Uts(locate(uts, table::UTS_HEADER)?.0),
            (None, Some(ts), _, _) => {
                let (index, format) = locate(ts, table::TIMESTAMP_HEADER)?;
                RowClock::Timestamp(index, format)
            }
            (None, None, Some(date), Some(time)) => RowClock::DateTime {
                date: locate(date, table::DATE_HEADER)?,
                time: locate(time, table::TIME_HEADER)?,
            },
            (None, None, Some(_), None) => {
                return Err(ExtractError::configuration(
                    "a date column needs a matching time column",
                ));
            }
            (None, None, None, Some(time)) => {
                let (index, format) = locate(time, table::TIME_HEADER)?;
                RowClock::TimeOnly(index, format)
            }
            (None, None, None, None) => {
                warn!(
                    "No timestamp column in {}, using file modification time",
                    path.display()
                );
                RowClock::FileTime(file_mtime(path)?)
            }
        };
        debug!("Timestamp source for {}: {:?}", path.display(), clock);
        Ok(clock)
    }

    fn resolve_row_time(
        &self,
        clock: &RowClock,
        cells: &[&str],
        row: usize,
        path: &Path,
    ) -> Result<Resolved> {
        let cell = |index: usize| {
            cells.get(index).copied().ok_or_else(|| {
                ExtractError::format(path, format!("row {} has no timestamp field {}", row, index))
            })
        };
        let strict = |value: &str, format: Option<&str>, found: Option<Resolved>| {
            found.ok_or_else(|| ExtractError::TimeFormat {
                timestamp: value.to_string(),
                format: format.unwrap_or("ISO 8601").to_string(),
            })
        };

        match clock {
            RowClock::Uts(index) => {
                let value = cell(*index)?;
                match self.locale.parse(value).as_f64() {
                    Some(uts) => Ok(Resolved::full(uts)),
                    None => Err(ExtractError::format(
                        path,
                        format!("non-numeric uts '{}' on row {}", value, row),
                    )),
                }
            }
            RowClock::Timestamp(index, format) => {
                let value = cell(*index)?;
                let found = timestamp::str_to_uts(value, format.as_deref(), &self.zone, true)?;
                strict(value, format.as_deref(), found)
            }
            RowClock::DateTime { date, time } => {
                let (date_value, time_value) = (cell(date.0)?, cell(time.0)?);
                let found = timestamp::date_time_to_uts(
                    date_value,
                    date.1.as_deref(),
                    time_value,
                    time.1.as_deref(),
                    &self.zone,
                    true,
                )?;
                strict(
                    format!("{} {}", date_value, time_value).as_str(),
                    date.1.as_deref(),
                    found,
                )
            }
            RowClock::TimeOnly(index, format) => {
                let value = cell(*index)?;
                let seconds = timestamp::time_to_seconds(value, format.as_deref(), true)?;
                match seconds {
                    Some(seconds) => Ok(Resolved::partial(seconds)),
                    None => strict(value, format.as_deref(), None),
                }
            }
            RowClock::FileTime(mtime) => Ok(Resolved::partial(*mtime)),
        }
    }
}

impl Extractor for BasicCsvExtractor {
    fn name(&self) -> &'static str {
        FileType::BasicCsv.name()
    }

    fn extract(&self, path: &Path) -> Result<DataTree> {
        let dataset = self.extract_dataset(path)?;
        Ok(DataTree::from_dataset("/", dataset))
    }
}

fn clean_header(raw: &str) -> String {
    raw.trim().trim_matches('"').trim_matches('\'').to_string()
}

/// Units from the second line; an empty unit marks a unitless column
fn read_units(headers: &[String], line: &str, sep: &str) -> BTreeMap<String, String> {
    headers
        .iter()
        .zip(line.split(sep))
        .map(|(name, unit)| (name, clean_header(unit)))
        .filter(|(_, unit)| !unit.is_empty())
        .map(|(name, unit)| (name.clone(), unit))
        .collect()
}

/// Well-known timestamp headers, most specific first
fn detect_timestamp(headers: &[String]) -> TimestampSpec {
    let has = |name: &str| headers.iter().any(|h| h == name);
    let mut spec = TimestampSpec::default();
    if has(table::UTS_HEADER) {
        spec.uts = Some(TimestampColumn::default());
    } else if has(table::TIMESTAMP_HEADER) {
        spec.timestamp = Some(TimestampColumn::default());
    } else if has(table::DATE_HEADER) && has(table::TIME_HEADER) {
        spec.date = Some(TimestampColumn::default());
        spec.time = Some(TimestampColumn::default());
    } else if has(table::TIME_HEADER) {
        spec.time = Some(TimestampColumn::default());
    }
    spec
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_detect_timestamp_priority() {
        let spec = detect_timestamp(&headers(&["uts", "timestamp", "flow"]));
        assert!(spec.uts.is_some() && spec.timestamp.is_none());

        let spec = detect_timestamp(&headers(&["date", "time", "flow"]));
        assert!(spec.date.is_some() && spec.time.is_some());

        let spec = detect_timestamp(&headers(&["time", "flow"]));
        assert!(spec.time.is_some() && spec.date.is_none());

        assert!(detect_timestamp(&headers(&["flow"])).is_empty());
    }

    #[test]
    fn test_read_units_skips_empty() {
        let units = read_units(&headers(&["uts", "flow", "valve"]), "s, ml/min,", ",");
        assert_eq!(units.get("uts").map(String::as_str), Some("s"));
        assert_eq!(units.get("flow").map(String::as_str), Some("ml/min"));
        assert!(!units.contains_key("valve"));
    }

    #[test]
    fn test_clean_header_strips_quotes() {
        assert_eq!(clean_header(" \"flow\" "), "flow");
        assert_eq!(clean_header("'T'"), "T");
    }
}

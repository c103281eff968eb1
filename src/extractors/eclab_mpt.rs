//! EC-Lab text export (`.mpt`) extractor
//!
//! Wires the header parser, the column table, the numeric parser and the
//! resolution model together. Every data row becomes one record; the active
//! potential and current ranges are looked up per row from the sequence
//! index `Ns`.

use super::{Extractor, file_mtime, provenance, read_text, resolve_encoding};
use crate::columns::{self, I_RANGE, current_range_amps};
use crate::config::{ExtractorConfig, FileType};
use crate::constants::{ORIGINAL_METADATA_KEY, eclab};
use crate::dataset::{Dataset, TableAssembler};
use crate::error::{ExtractError, Result};
use crate::header::{self, control_mode, e_range, i_range};
use crate::locale::NumberLocale;
use crate::models::{Field, Quantity, RawRecord, Scalar, Settings};
use crate::timestamp::Zone;
use crate::tree::DataTree;
use crate::uncertainty::{DEFAULT_E_RANGE, RangeContext, UncertaintyModel};
use encoding_rs::Encoding;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// Ranges in effect while one hardware sequence runs
#[derive(Debug, Clone, PartialEq)]
struct SequenceRange {
    e_range: f64,
    i_range: String,
    control: Option<String>,
}

impl Default for SequenceRange {
    fn default() -> Self {
        Self {
            e_range: DEFAULT_E_RANGE,
            i_range: eclab::AUTO_RANGE.to_string(),
            control: None,
        }
    }
}

/// Start of the recording and the per-sequence ranges
struct Preamble {
    start: f64,
    fulldate: Option<bool>,
    settings: Option<Settings>,
    ranges: Vec<SequenceRange>,
}

#[derive(Debug, Clone)]
pub struct EclabMptExtractor {
    locale: NumberLocale,
    zone: Zone,
    encoding: &'static Encoding,
    uncertainty: UncertaintyModel,
}

impl EclabMptExtractor {
    pub fn new(
        locale: NumberLocale,
        zone: Zone,
        encoding: &'static Encoding,
        uncertainty: UncertaintyModel,
    ) -> Self {
        Self {
            locale,
            zone,
            encoding,
            uncertainty,
        }
    }

    pub fn from_config(config: &ExtractorConfig, file_type: FileType) -> Result<Self> {
        Ok(Self::new(
            config.number_locale()?,
            config.zone()?,
            resolve_encoding(config.encoding_for(file_type))?,
            config.uncertainty_model()?,
        ))
    }

    /// Parse one export into a dataset
    pub fn extract_dataset(&self, path: &Path) -> Result<Dataset> {
        info!("Parsing EC-Lab export: {}", path.display());
        let text = read_text(path, self.encoding)?;
        self.parse_text(&text, path)
    }

    /// Parse the decoded contents of an export; `path` is used for context and mtime
    pub fn parse_text(&self, text: &str, path: &Path) -> Result<Dataset> {
        let mut lines = text.split('\n');
        match lines.next() {
            Some(magic) if magic.trim_end() == eclab::FILE_MAGIC => {}
            _ => return Err(ExtractError::format(path, "invalid file magic")),
        }
        let lines: Vec<&str> = lines.collect();

        let nb_header = header_line_count(&lines, path)?;
        let split = nb_header - eclab::MIN_HEADER_LINES;
        if lines.len() < split + 2 {
            return Err(ExtractError::format(
                path,
                format!("header declares {} lines but the file is shorter", nb_header),
            ));
        }
        let (header_lines, data_lines) = lines.split_at(split);

        let preamble = self.preamble(header_lines, path)?;
        let columns = column_names(data_lines[1], path)?;

        let mut assembler = TableAssembler::new(path).with_units(declared_units(&columns));
        let mut uts = Vec::new();
        for (row, line) in data_lines[2..].iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let (record, time) = self.parse_row(line, &columns, &preamble.ranges, row, path)?;
            uts.push(preamble.start + time.unwrap_or(0.0));
            assembler.push(record)?;
        }

        let dataset = assembler.finish(uts, preamble.fulldate)?;
        debug!(
            "Extracted {} rows from {} (fulldate: {:?})",
            dataset.len(),
            path.display(),
            dataset.fulldate()
        );
        Ok(attach_metadata(dataset, preamble.settings, path))
    }

    fn preamble(&self, header_lines: &[&str], path: &Path) -> Result<Preamble> {
        if header_lines.is_empty() {
            warn!(
                "{} has no header and hence no timestamp, using file modification time",
                path.display()
            );
            return without_header(path);
        }

        let settings = match header::parse_header(header_lines, &self.locale, &self.zone, path) {
            Ok(settings) => settings,
            Err(e @ ExtractError::MissingHeaderSection { .. }) => {
                warn!("{}, using file modification time", e);
                return without_header(path);
            }
            Err(e) => return Err(e),
        };

        let ranges: Vec<SequenceRange> = settings
            .params
            .iter()
            .enumerate()
            .map(|(i, params)| {
                let mut span = e_range(params);
                if !span.is_finite() {
                    warn!(
                        "Sequence {} of {} has no potential range, assuming {} V",
                        i,
                        path.display(),
                        DEFAULT_E_RANGE
                    );
                    span = DEFAULT_E_RANGE;
                }
                SequenceRange {
                    e_range: span,
                    i_range: i_range(params),
                    control: control_mode(params),
                }
            })
            .collect();

        let start = match settings.posix_timestamp {
            Some(start) => start,
            None => file_mtime(path)?,
        };

        Ok(Preamble {
            start,
            fulldate: None,
            settings: Some(settings),
            ranges,
        })
    }

    /// Parse one tab-delimited data line into a record and its relative time
    fn parse_row(
        &self,
        line: &str,
        columns: &[(&'static str, Option<&'static str>)],
        ranges: &[SequenceRange],
        row: usize,
        path: &Path,
    ) -> Result<(RawRecord, Option<f64>)> {
        let cells: Vec<Scalar> = line
            .split('\t')
            .zip(columns)
            .map(|(cell, (name, unit))| match (unit, *name) {
                (None, "I Range") => self.locale.parse(cell),
                (None, _) => self.locale.parse_int(cell),
                (Some(_), _) => self.locale.parse(cell),
            })
            .collect();
        let cell = |wanted: &str| {
            columns
                .iter()
                .zip(&cells)
                .find(|((name, _), _)| *name == wanted)
                .map(|(_, value)| value)
        };

        let sequence = match cell("Ns") {
            None => 0,
            Some(value) => match value.as_f64() {
                Some(ns) if ns >= 0.0 && (ns as usize) < ranges.len().max(1) => ns as usize,
                _ => {
                    return Err(ExtractError::format(
                        path,
                        format!(
                            "row {} refers to sequence {} but the header describes {}",
                            row,
                            value,
                            ranges.len()
                        ),
                    ));
                }
            },
        };
        let range = ranges.get(sequence).cloned().unwrap_or_default();

        let i_range_label = match cell("I Range") {
            Some(code) => match I_RANGE.decode(code) {
                Some(label) => label.to_string(),
                None => {
                    warn!(
                        "Unknown current range code '{}' on row {} of {}, assuming {}",
                        code,
                        row,
                        path.display(),
                        eclab::AUTO_RANGE
                    );
                    eclab::AUTO_RANGE.to_string()
                }
            },
            None => range.i_range.clone(),
        };
        let ctx = RangeContext {
            e_range: range.e_range,
            i_range: current_range_amps(&i_range_label),
        };

        let mut record = RawRecord::new();
        let mut time = None;
        for ((name, unit), value) in columns.iter().zip(cells) {
            let field = match (unit, value) {
                (None, _) if *name == "I Range" => {
                    Field::Plain(Scalar::Text(i_range_label.clone()))
                }
                (None, value) => Field::Plain(value),
                (Some(unit), Scalar::Text(text)) => {
                    let (name, _) = control_column(name, unit, range.control.as_deref());
                    record.insert(name, Field::Plain(Scalar::Text(text)));
                    continue;
                }
                (Some(unit), value) => {
                    let v = value.as_f64().unwrap_or(f64::NAN);
                    let (name, unit) = control_column(name, unit, range.control.as_deref());
                    let sigma = self.uncertainty.sigma(name, v, unit, Some(&ctx));
                    if name == "time" {
                        time = Some(v);
                    }
                    record.insert(name, Field::Measured(Quantity::new(v, sigma, unit)));
                    continue;
                }
            };
            record.insert(*name, field);
        }

        Ok((record, time))
    }
}

impl Extractor for EclabMptExtractor {
    fn name(&self) -> &'static str {
        FileType::EclabMpt.name()
    }

    fn extract(&self, path: &Path) -> Result<DataTree> {
        let dataset = self.extract_dataset(path)?;
        Ok(DataTree::from_dataset("/", dataset))
    }
}

fn without_header(path: &Path) -> Result<Preamble> {
    Ok(Preamble {
        start: file_mtime(path)?,
        fulldate: Some(false),
        settings: None,
        ranges: vec![SequenceRange::default()],
    })
}

/// Read `N` from the `Nb header lines : N` line
fn header_line_count(lines: &[&str], path: &Path) -> Result<usize> {
    let line = lines
        .first()
        .filter(|l| l.starts_with(eclab::HEADER_LINES_PREFIX))
        .ok_or_else(|| ExtractError::format(path, "missing header line count"))?;
    let count = line
        .rsplit(':')
        .next()
        .and_then(|n| n.trim().parse::<usize>().ok())
        .ok_or_else(|| {
            ExtractError::format(path, format!("invalid header line count '{}'", line.trim()))
        })?;
    if count < eclab::MIN_HEADER_LINES {
        return Err(ExtractError::format(
            path,
            format!("header line count {} below {}", count, eclab::MIN_HEADER_LINES),
        ));
    }
    Ok(count)
}

fn column_names(line: &str, path: &Path) -> Result<Vec<(&'static str, Option<&'static str>)>> {
    let mut raw: Vec<&str> = line.trim_end_matches('\r').split('\t').collect();
    if raw.last().is_some_and(|last| last.is_empty()) {
        raw.pop();
    }
    raw.into_iter()
        .map(|name| columns::eclab_column(name, path))
        .collect()
}

/// `control/V/mA` carries a current in current-controlled sequences, a potential otherwise
fn control_column<'a>(name: &'a str, unit: &'a str, mode: Option<&str>) -> (&'a str, &'a str) {
    if name != "control_VI" {
        return (name, unit);
    }
    match mode {
        Some("I") | Some("C") => ("control_I", "mA"),
        _ => ("control_V", "V"),
    }
}

fn declared_units(columns: &[(&'static str, Option<&'static str>)]) -> BTreeMap<String, String> {
    columns
        .iter()
        .filter(|(name, _)| *name != "control_VI")
        .filter_map(|(name, unit)| unit.map(|u| (name.to_string(), u.to_string())))
        .collect()
}

fn attach_metadata(dataset: Dataset, settings: Option<Settings>, path: &Path) -> Dataset {
    let (settings, params, loops) = match settings {
        Some(settings) => {
            let params = serde_json::to_value(&settings.params).unwrap_or(Value::Null);
            let loops = settings
                .loops
                .as_ref()
                .and_then(|l| serde_json::to_value(l).ok());
            let summary = json!({
                "posix_timestamp": settings.posix_timestamp,
                "technique": settings.technique,
                "raw": settings.raw,
            });
            (summary, params, loops)
        }
        None => (json!({}), json!([]), None),
    };

    let mut dataset = dataset
        .with_attr("settings", settings)
        .with_attr("params", params)
        .with_attr(
            ORIGINAL_METADATA_KEY,
            provenance(FileType::EclabMpt.name(), path),
        );
    if let Some(loops) = loops {
        dataset = dataset.with_attr("loops", loops);
    }
    dataset
}

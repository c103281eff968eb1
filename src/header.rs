//! EC-Lab text export header parsing.
//!
//! The header is a sequence of blank-line separated sections: generic file
//! information, the technique title, the settings block and optionally the
//! loop definitions. The settings block ends with fixed-width parameter lines
//! holding one 20-character column per hardware sequence.

use crate::error::{ExtractError, Result};
use crate::locale::NumberLocale;
use crate::models::{Loops, Scalar, SequenceParams, Settings};
use crate::techniques::{self, SETTINGS_COLUMN_WIDTH};
use crate::timestamp::{self, Zone};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;
use tracing::debug;

/// Layouts of the acquisition start line, tried in order
pub const ACQUISITION_FORMATS: &[&str] = &[
    "%m/%d/%Y %H:%M:%S",
    "%m.%d.%Y %H:%M:%S",
    "%m/%d/%Y %H:%M:%S.%f",
];

const LOOPS_PREFIX: &str = "Number of loops : ";

static ACQUISITION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Acquisition started on : (?P<val>.+)").expect("valid acquisition regex")
});

static LOOP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"from point number\s+(?P<start>\d+)\s+to\s+(?P<end>\d+)")
        .expect("valid loop regex")
});

/// Parse header lines into settings.
///
/// `lines` starts with the `Nb header lines` line. A header without a
/// settings section yields `MissingHeaderSection`, which callers downgrade to
/// defaults.
pub fn parse_header(
    lines: &[&str],
    locale: &NumberLocale,
    zone: &Zone,
    path: &Path,
) -> Result<Settings> {
    let raw = lines.join("\n");
    let sections: Vec<&str> = raw.split("\n\n").collect();

    if sections.len() < 3 || sections[1].starts_with(LOOPS_PREFIX) {
        return Err(ExtractError::MissingHeaderSection {
            path: path.to_path_buf(),
            reason: "no settings present".to_string(),
        });
    }

    let title = sections[1].trim();
    let settings_lines: Vec<&str> = sections[2].split('\n').collect();
    let (technique, layout) = techniques::technique_params(title, &settings_lines, path)?;

    let split = settings_lines.len() - layout.len();
    let (info_lines, param_lines) = settings_lines.split_at(split);
    let params = parse_sequences(param_lines, layout.keys(), locale, path)?;

    let posix_timestamp = acquisition_start(info_lines, zone, path)?;

    let loops = match sections.last() {
        Some(last) if sections.len() >= 4 && last.starts_with(LOOPS_PREFIX) => {
            Some(parse_loops(last, path)?)
        }
        _ => None,
    };

    debug!(
        "Parsed {} header of {}: {} sequence(s), loops: {}",
        technique.name,
        path.display(),
        params.len(),
        loops.is_some()
    );

    Ok(Settings {
        posix_timestamp: Some(posix_timestamp),
        technique: technique.name.to_string(),
        raw,
        params,
        loops,
    })
}

/// Slice the fixed-width parameter lines into one mapping per sequence
fn parse_sequences<'k>(
    param_lines: &[&str],
    keys: impl Iterator<Item = &'k str>,
    locale: &NumberLocale,
    path: &Path,
) -> Result<Vec<SequenceParams>> {
    let columns: Vec<Vec<char>> = param_lines.iter().map(|l| l.chars().collect()).collect();
    let width = columns.iter().map(Vec::len).max().unwrap_or(0);
    let n_columns = width.div_ceil(SETTINGS_COLUMN_WIDTH);

    if n_columns < 2 {
        return Err(ExtractError::format(
            path,
            "settings block has no sequence columns",
        ));
    }

    let keys: Vec<&str> = keys.collect();
    let params = (1..n_columns)
        .map(|seq| {
            let start = seq * SETTINGS_COLUMN_WIDTH;
            keys.iter()
                .zip(&columns)
                .map(|(key, chars)| {
                    let end = (start + SETTINGS_COLUMN_WIDTH).min(chars.len());
                    let field: String = chars.get(start..end).unwrap_or_default().iter().collect();
                    (key.to_string(), locale.parse(&field))
                })
                .collect::<SequenceParams>()
        })
        .collect();

    Ok(params)
}

fn acquisition_start(info_lines: &[&str], zone: &Zone, path: &Path) -> Result<f64> {
    let text = info_lines.join("\n");
    let value = ACQUISITION_RE
        .captures(&text)
        .and_then(|caps| caps.name("val"))
        .map(|m| m.as_str().trim().to_string())
        .ok_or_else(|| ExtractError::MissingHeaderSection {
            path: path.to_path_buf(),
            reason: "no acquisition start time".to_string(),
        })?;

    Ok(timestamp::first_match(&value, ACQUISITION_FORMATS, zone)?.uts)
}

fn parse_loops(section: &str, path: &Path) -> Result<Loops> {
    let mut lines = section.lines();
    let count_line = lines.next().unwrap_or_default();
    let n_loops = count_line
        .rsplit(':')
        .next()
        .and_then(|n| n.trim().parse::<usize>().ok())
        .ok_or_else(|| {
            ExtractError::format(path, format!("invalid loop count line '{}'", count_line))
        })?;

    let indexes = lines
        .take(n_loops)
        .map(|line| {
            LOOP_RE
                .captures(line)
                .and_then(|caps| caps["start"].parse::<usize>().ok())
                .ok_or_else(|| {
                    ExtractError::format(path, format!("invalid loop definition '{}'", line))
                })
        })
        .collect::<Result<Vec<usize>>>()?;

    if indexes.len() != n_loops {
        return Err(ExtractError::format(
            path,
            format!("expected {} loop definitions, found {}", n_loops, indexes.len()),
        ));
    }

    Ok(Loops { n_loops, indexes })
}

/// Potential span of a sequence, unbounded when the limits are missing
pub fn e_range(params: &SequenceParams) -> f64 {
    let max = params
        .get("E_range_max")
        .and_then(Scalar::as_f64)
        .unwrap_or(f64::INFINITY);
    let min = params
        .get("E_range_min")
        .and_then(Scalar::as_f64)
        .unwrap_or(f64::NEG_INFINITY);
    max - min
}

/// Current range label of a sequence, `Auto` when missing
pub fn i_range(params: &SequenceParams) -> String {
    match params.get("I_range") {
        Some(Scalar::Text(label)) if !label.is_empty() => label.clone(),
        _ => "Auto".to_string(),
    }
}

/// Control mode (`I`, `C`, ...) of a sequence
pub fn control_mode(params: &SequenceParams) -> Option<String> {
    ["set_I/C", "apply_I/C"]
        .iter()
        .find_map(|key| params.get(*key))
        .map(|value| value.to_string())
}

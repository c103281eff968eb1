//! Test fixtures for the extractors
//!
//! Builds EC-Lab exports, delimited tables and zip containers in temporary
//! directories.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::config::ExtractorConfig;
use crate::dataset::Dataset;
use crate::tree::DataTree;

mod csv_tests;

/// Acquisition start used by [`mpt_export`], in `Europe/Berlin`
pub const ACQUISITION_START: &str = "09/14/2021 15:36:50";
pub const ACQUISITION_UTS: f64 = 1631626610.0;

/// Labels of the OCV settings block
pub const OCV_LABELS: &[&str] = &[
    "tR (h:m:s)",
    "dER/dt (mV/h)",
    "record",
    "dER (mV)",
    "dtR (s)",
    "E range min (V)",
    "E range max (V)",
];

/// One fixed-width settings line
pub fn settings_row(label: &str, values: &[&str]) -> String {
    let mut line = format!("{:<20}", label);
    for value in values {
        line.push_str(&format!("{:<20}", value));
    }
    line
}

/// Settings lines of an OCV run, one `(E min, E max)` per sequence
pub fn ocv_settings(e_ranges: &[(&str, &str)]) -> Vec<String> {
    OCV_LABELS
        .iter()
        .enumerate()
        .map(|(i, label)| {
            let values: Vec<&str> = e_ranges
                .iter()
                .map(|&(min, max)| match i {
                    0 => "0:01:00.0000",
                    1 => "0.0",
                    2 => "Ewe",
                    3 => "0.00",
                    4 => "1.0000",
                    5 => min,
                    _ => max,
                })
                .collect();
            settings_row(label, &values)
        })
        .collect()
}

/// A complete EC-Lab text export with header
pub fn mpt_export(
    title: &str,
    acquisition: &str,
    settings: &[String],
    trailer: Option<&str>,
    columns: &[&str],
    rows: &[&str],
) -> String {
    let mut header = vec![
        String::new(),
        title.to_string(),
        String::new(),
        "Run on channel : 1 (SN 1234)".to_string(),
        format!("Acquisition started on : {}", acquisition),
    ];
    header.extend(settings.iter().cloned());
    if let Some(trailer) = trailer {
        header.push(String::new());
        header.extend(trailer.lines().map(str::to_string));
    }

    // magic, count line, header, blank, column names
    let count = header.len() + 4;
    let mut text = format!("EC-Lab ASCII FILE\nNb header lines : {}\n", count);
    for line in &header {
        text.push_str(line);
        text.push('\n');
    }
    text.push('\n');
    text.push_str(&export_body(columns, rows));
    text
}

/// An EC-Lab text export without settings
pub fn bare_mpt_export(columns: &[&str], rows: &[&str]) -> String {
    format!(
        "EC-Lab ASCII FILE\nNb header lines : 3\n{}",
        export_body(columns, rows)
    )
}

fn export_body(columns: &[&str], rows: &[&str]) -> String {
    let mut text = columns.join("\t");
    text.push_str("\t\n");
    for row in rows {
        text.push_str(row);
        text.push_str("\t\n");
    }
    text
}

pub fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

/// Zip `members` into `dir/name`
pub fn write_zip(dir: &Path, name: &str, members: &[(&str, &str)]) -> PathBuf {
    let path = dir.join(name);
    let file = File::create(&path).unwrap();
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for (member, content) in members {
        zip.start_file(*member, options).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
    path
}

/// Configuration pinned to UTC so expectations do not depend on the host
pub fn test_config() -> ExtractorConfig {
    ExtractorConfig::default()
        .with_timezone("UTC")
        .with_jobs(1)
}

pub fn root_dataset(tree: &DataTree) -> &Dataset {
    tree.dataset.as_ref().expect("root dataset")
}

pub fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0)
}

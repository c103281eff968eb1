//! Integration tests for file extraction through the public API
//!
//! These tests write instrument files into temporary directories and run
//! them through `extractor_for`, the way the command line does.

use labgram::{DataTree, Dataset, ExtractError, ExtractorConfig, FileType, extractor_for};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

const OCV_LABELS: &[&str] = &[
    "tR (h:m:s)",
    "dER/dt (mV/h)",
    "record",
    "dER (mV)",
    "dtR (s)",
    "E range min (V)",
    "E range max (V)",
];

/// EC-Lab export of one OCV sequence with the given E range
fn ocv_export(acquisition: &str, e_min: &str, e_max: &str, rows: &[&str]) -> String {
    let values = ["0:01:00.0000", "0.0", "Ewe", "0.00", "1.0000", e_min, e_max];
    let mut header = vec![
        String::new(),
        "Open Circuit Voltage".to_string(),
        String::new(),
        "Run on channel : 1 (SN 1234)".to_string(),
        format!("Acquisition started on : {}", acquisition),
    ];
    header.extend(
        OCV_LABELS
            .iter()
            .zip(values)
            .map(|(label, value)| format!("{:<20}{:<20}", label, value)),
    );

    let mut text = format!("EC-Lab ASCII FILE\nNb header lines : {}\n", header.len() + 4);
    for line in &header {
        text.push_str(line);
        text.push('\n');
    }
    text.push_str("\nmode\ttime/s\tEwe/V\t\n");
    for row in rows {
        text.push_str(row);
        text.push_str("\t\n");
    }
    text
}

fn write_zip(path: &Path, members: &[(&str, &str)]) {
    let mut zip = ZipWriter::new(File::create(path).unwrap());
    for (name, content) in members {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
}

fn extract(file_type: FileType, path: &Path, config: &ExtractorConfig) -> labgram::Result<DataTree> {
    extractor_for(file_type, config)?.extract(path)
}

fn root(tree: &DataTree) -> &Dataset {
    tree.dataset.as_ref().expect("root dataset")
}

fn berlin() -> ExtractorConfig {
    ExtractorConfig::default().with_timezone("Europe/Berlin")
}

/// Purpose: Validate the resolution-derived uncertainty of a potential reading
/// Benefit: Ensures the header ranges reach the sigma of every measured value
#[test]
fn test_eclab_export_potential_uncertainty() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ocv.mpt");
    fs::write(
        &path,
        ocv_export("09/14/2021 15:36:50", "-5.000", "5.000", &["0\t10.0\t1.000000"]),
    )
    .unwrap();

    let tree = extract(FileType::EclabMpt, &path, &berlin()).unwrap();
    let ds = root(&tree);

    assert_eq!(ds.len(), 1);
    assert_eq!(ds.values("Ewe").unwrap(), vec![Some(1.0)]);
    assert_eq!(ds.unit("Ewe"), Some("V"));
    let sigma = ds.sigmas("Ewe").unwrap()[0].unwrap();
    assert!(sigma > 0.0 && sigma < 0.01, "sigma {}", sigma);
    assert_eq!(ds.uts().unwrap(), vec![1631626610.0 + 10.0]);
    assert_eq!(ds.fulldate(), None);
}

/// Purpose: Validate that archive members concatenate into one time-sorted dataset
/// Benefit: Ensures exports split over several files read back as one run
#[test]
fn test_zip_of_tables_merges_sorted() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("flows.zip");
    write_zip(
        &path,
        &[
            ("late.csv", "uts,flow\ns,ml/min\n100,2.0\n"),
            ("early.csv", "uts,flow\ns,ml/min\n0,1.0\n50,1.5\n"),
        ],
    );

    let config = ExtractorConfig::default().with_timezone("UTC");
    let tree = extract(FileType::ZipCsv, &path, &config).unwrap();
    let ds = root(&tree);

    assert_eq!(ds.uts().unwrap(), vec![0.0, 50.0, 100.0]);
    assert_eq!(ds.values("flow").unwrap(), vec![Some(1.0), Some(1.5), Some(2.0)]);
    assert!(ds.uts_regressions().unwrap().is_empty());

    let summary = tree.summary();
    assert_eq!(summary["dataset"]["rows"], 3);
    assert_eq!(summary["dataset"]["variables"]["flow"], "ml/min");
}

/// Purpose: Validate that members disagreeing at the same timestamp are rejected
/// Benefit: Ensures conflicting data is never silently overwritten
#[test]
fn test_zip_members_in_conflict() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("flows.zip");
    write_zip(
        &path,
        &[
            ("a.csv", "uts,flow\ns,ml/min\n0,1.0\n"),
            ("b.csv", "uts,flow\ns,ml/min\n0,2.0\n"),
        ],
    );

    let config = ExtractorConfig::default().with_timezone("UTC");
    let err = extract(FileType::ZipCsv, &path, &config).unwrap_err();
    assert!(matches!(err, ExtractError::MergeConflict { .. }), "got {:?}", err);
}

/// Purpose: Validate EC-Lab exports inside a zip container
/// Benefit: Ensures member acquisition times place rows on one absolute axis
#[test]
fn test_zip_of_eclab_exports() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ocv.zip");
    let first = ocv_export("09/14/2021 15:36:50", "-5.000", "5.000", &["0\t0.0\t1.0"]);
    let second = ocv_export("09/14/2021 15:36:50", "-5.000", "5.000", &["0\t30.0\t1.1"]);
    write_zip(&path, &[("b.mpt", second.as_str()), ("a.mpt", first.as_str())]);

    let tree = extract(FileType::ZipMpt, &path, &berlin()).unwrap();
    let ds = root(&tree);
    assert_eq!(ds.uts().unwrap(), vec![1631626610.0, 1631626640.0]);
    assert_eq!(tree.attrs["a.mpt"]["settings"]["technique"], "OCV");
}

/// Purpose: Validate a legacy encoded table with comma decimals
/// Benefit: Ensures encoding and locale options travel from the configuration
#[test]
fn test_windows_1252_table_with_comma_decimals() {
    let dir = TempDir::new().unwrap();
    let path: PathBuf = dir.path().join("temperature.csv");
    let text = "uts;T\ns;°C\n0;21,5\n60;21,75\n";
    let (bytes, _, _) = encoding_rs::WINDOWS_1252.encode(text);
    fs::write(&path, &bytes).unwrap();

    let mut config = ExtractorConfig::default()
        .with_timezone("UTC")
        .with_locale("de_DE")
        .with_encoding("windows-1252");
    config.table.sep = ";".to_string();

    let tree = extract(FileType::BasicCsv, &path, &config).unwrap();
    let ds = root(&tree);
    assert_eq!(ds.unit("T"), Some("°C"));
    assert_eq!(ds.values("T").unwrap(), vec![Some(21.5), Some(21.75)]);
}

/// Purpose: Validate that invalid configuration is rejected before extraction
/// Benefit: Ensures typos in options fail fast with a configuration error
#[test]
fn test_invalid_configuration_fails_fast() {
    let config = ExtractorConfig::default().with_timezone("Mars/Olympus_Mons");
    let err = extractor_for(FileType::EclabMpt, &config).err().unwrap();
    assert!(matches!(err, ExtractError::Configuration { .. }), "got {:?}", err);
}

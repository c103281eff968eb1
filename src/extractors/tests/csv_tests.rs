//! Tests for the delimited table extractor

use super::*;
use crate::config::{FileType, TableOptions, TimestampColumn, TimestampSpec};
use crate::error::ExtractError;
use crate::extractors::BasicCsvExtractor;
use crate::uncertainty::Tolerance;
use std::collections::BTreeMap;
use tempfile::TempDir;

fn extract_with(config: &ExtractorConfig, content: &str) -> crate::error::Result<Dataset> {
    let dir = TempDir::new().unwrap();
    let path = write_file(dir.path(), "log.csv", content);
    BasicCsvExtractor::from_config(config, FileType::BasicCsv)?.extract_dataset(&path)
}

fn units(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn test_unit_line_and_uts_column() {
    let content = "uts,flow,valve\ns,ml/min,\n0,15.0,open\n10,15.5,closed\n";
    let ds = extract_with(&test_config().with_tolerance(None, Some(0.01)), content).unwrap();

    assert_eq!(ds.uts().unwrap(), vec![0.0, 10.0]);
    assert_eq!(ds.fulldate(), Some(true));
    assert!(!ds.contains("uts"));
    assert_eq!(ds.unit("flow"), Some("ml/min"));
    assert_eq!(ds.values("flow").unwrap(), vec![Some(15.0), Some(15.5)]);
    let sigmas = ds.sigmas("flow").unwrap();
    assert!(approx_eq(sigmas[0].unwrap(), 0.15));
    assert_eq!(ds.unit("valve"), None);
    assert_eq!(
        ds.texts("valve").unwrap(),
        vec![Some("open".to_string()), Some("closed".to_string())]
    );
    assert_eq!(ds.attrs().metadata["original_metadata"]["extractor"], "basic.csv");
}

#[test]
fn test_time_only_column_is_partial() {
    let table = TableOptions {
        units: Some(units(&[("flow", "ml/min")])),
        timestamp: Some(TimestampSpec {
            time: Some(TimestampColumn::at(0).with_format("%H:%M:%S")),
            ..TimestampSpec::default()
        }),
        ..TableOptions::default()
    };
    let content = "time,flow\n12:00:00,1.0\n12:00:10,2.0\n";
    let ds = extract_with(&test_config().with_table(table), content).unwrap();

    assert_eq!(ds.fulldate(), Some(false));
    assert_eq!(ds.uts().unwrap(), vec![43200.0, 43210.0]);
    assert_eq!(ds.sigmas("flow").unwrap(), vec![Some(0.0), Some(0.0)]);
}

#[test]
fn test_separate_date_and_time_columns() {
    let table = TableOptions {
        sep: ";".to_string(),
        timestamp: Some(TimestampSpec {
            date: Some(TimestampColumn::at(0).with_format("%d.%m.%Y")),
            time: Some(TimestampColumn::at(1)),
            ..TimestampSpec::default()
        }),
        ..TableOptions::default()
    };
    let content = "Datum;Zeit;T\n;;degC\n14.09.2021;13:36:50;23,1\n14.09.2021;13:36:51;23,2\n";
    let config = test_config().with_locale("de_DE").with_table(table);
    let ds = extract_with(&config, content).unwrap();

    assert_eq!(ds.uts().unwrap(), vec![1631626610.0, 1631626611.0]);
    assert_eq!(ds.fulldate(), Some(true));
    assert_eq!(ds.values("T").unwrap(), vec![Some(23.1), Some(23.2)]);
    assert!(!ds.contains("Datum") && !ds.contains("Zeit"));
}

#[test]
fn test_detected_iso_timestamp_column() {
    let content = "timestamp,T\n,K\n2021-09-14T13:36:50+00:00,300\n";
    let ds = extract_with(&test_config(), content).unwrap();
    assert_eq!(ds.uts().unwrap(), vec![1631626610.0]);
    assert_eq!(ds.unit("T"), Some("K"));
}

#[test]
fn test_strict_timestamp_mismatch() {
    let table = TableOptions {
        timestamp: Some(TimestampSpec {
            timestamp: Some(TimestampColumn::at(0).with_format("%Y-%m-%d %H:%M:%S")),
            ..TimestampSpec::default()
        }),
        ..TableOptions::default()
    };
    let content = "when,T\n,K\n14/09/2021 13:36,300\n";
    let err = extract_with(&test_config().with_table(table), content).unwrap_err();
    assert!(matches!(err, ExtractError::TimeFormat { .. }), "got {:?}", err);
}

#[test]
fn test_no_timestamp_falls_back_to_mtime() {
    let content = "flow\nml/min\n1.0\n2.0\n";
    let ds = extract_with(&test_config(), content).unwrap();
    let uts = ds.uts().unwrap();
    assert_eq!(ds.fulldate(), Some(false));
    assert_eq!(uts[0], uts[1]);
    assert!(uts[0] > 0.0);
}

#[test]
fn test_calibration_replaces_raw_column() {
    let table = TableOptions {
        convert: Some(
            serde_json::from_value(serde_json::json!({
                "T": {"T": {"calib": {"linear": {"intercept": 273.15}, "atol": 0.1}}, "unit": "K"}
            }))
            .unwrap(),
        ),
        ..TableOptions::default()
    };
    let content = "uts,T\n,degC\n0,25.0\n";
    let ds = extract_with(&test_config().with_table(table), content).unwrap();

    assert_eq!(ds.unit("T"), Some("K"));
    assert!(approx_eq(ds.values("T").unwrap()[0].unwrap(), 298.15));
    assert_eq!(ds.sigmas("T").unwrap(), vec![Some(0.1)]);
}

#[test]
fn test_calibration_file_is_merged() {
    let dir = TempDir::new().unwrap();
    let calfile = write_file(
        dir.path(),
        "calib.json",
        r#"{"flow_m3s": {"unit": "m3/s", "flow": {"calib": {"linear": {"slope": 2.0}}}}}"#,
    );
    let table = TableOptions {
        calfile: Some(calfile),
        ..TableOptions::default()
    };
    let content = "uts,flow\n,ml/min\n0,3.0\n";
    let ds = extract_with(&test_config().with_table(table), content).unwrap();

    assert_eq!(ds.unit("flow"), Some("ml/min"));
    assert_eq!(ds.unit("flow_m3s"), Some("m3/s"));
    assert_eq!(ds.values("flow_m3s").unwrap(), vec![Some(6.0)]);
}

fn kelvin_table() -> TableOptions {
    TableOptions {
        convert: Some(
            serde_json::from_value(serde_json::json!({
                "T": {"T": {"calib": {"linear": {"intercept": 273.15}}}, "unit": "K"}
            }))
            .unwrap(),
        ),
        ..TableOptions::default()
    }
}

#[test]
fn test_calibrated_column_with_empty_cell() {
    let content = "uts,T,p\n,degC,bar\n0,25.0,1.0\n1,,1.1\n2,26.0,1.2\n";
    let ds = extract_with(&test_config().with_table(kelvin_table()), content).unwrap();

    assert_eq!(ds.len(), 3);
    assert_eq!(ds.unit("T"), Some("K"));
    let values = ds.values("T").unwrap();
    assert!(approx_eq(values[0].unwrap(), 298.15));
    assert_eq!(values[1], None);
    assert!(approx_eq(values[2].unwrap(), 299.15));
    assert_eq!(ds.sigmas("T").unwrap()[1], None);
    assert_eq!(ds.values("p").unwrap(), vec![Some(1.0), Some(1.1), Some(1.2)]);
}

#[test]
fn test_calibration_of_absent_header_column_fails() {
    let content = "uts,Tx,p\n,degC,bar\n0,25.0,1.0\n";
    let err = extract_with(&test_config().with_table(kelvin_table()), content).unwrap_err();
    assert!(matches!(err, ExtractError::Configuration { .. }));
}

#[test]
fn test_column_sigma_override_and_text_in_unitful_column() {
    let config = test_config()
        .with_sigma("T", Tolerance::absolute(0.5))
        .with_tolerance(Some(0.01), None);
    let content = "uts,T,p\n,degC,bar\n0,20.0,1.0\n1,n/a,1.1\n";
    let ds = extract_with(&config, content).unwrap();

    assert_eq!(ds.sigmas("T").unwrap(), vec![Some(0.5), None]);
    assert_eq!(ds.values("T").unwrap(), vec![Some(20.0), None]);
    assert_eq!(ds.sigmas("p").unwrap(), vec![Some(0.01), Some(0.01)]);
}

#[test]
fn test_empty_cells_become_null() {
    let content = "uts,a,b\n,V,\n0,1.0,\n1,,7\n";
    let ds = extract_with(&test_config(), content).unwrap();
    assert_eq!(ds.values("a").unwrap(), vec![Some(1.0), None]);
    assert_eq!(ds.values("b").unwrap(), vec![None, Some(7.0)]);
}

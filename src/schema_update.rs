//! Migration of extraction schemas and calibration files.
//!
//! Old list-style schemas and calibration documents are rewritten into the
//! current layout as plain JSON transforms. Presets get their relative file
//! references anchored to a folder.

use crate::constants::{PRESET_PROVENANCE, REMOVED_PARAMETERS, SCHEMA_VERSION, UPDATE_PROVENANCE};
use crate::error::{ExtractError, Result};
use serde_json::{Map, Value, json};
use std::path::{Component, Path, PathBuf};
use tracing::{info, warn};

/// Calibration document kinds understood by [`calib_3to4`]
pub const CALIBRATION_KINDS: &[&str] = &["calfile", "Tcalfile", "MFCcalfile"];

fn object<'a>(value: &'a Value, what: &str) -> Result<&'a Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| ExtractError::configuration(format!("{} must be an object", what)))
}

fn number(value: Option<&Value>, default: f64) -> f64 {
    value.and_then(Value::as_f64).unwrap_or(default)
}

/// Convert a version 3 calibration document of the given kind
pub fn calib_3to4(old: &Value, kind: &str) -> Result<Value> {
    match kind {
        "calfile" => chromatography_calib(old),
        "Tcalfile" => Ok(json!({"T": {"T_f": {"calib": {"linear": old}}, "unit": "degC"}})),
        "MFCcalfile" => flow_calib(old),
        other => Err(ExtractError::configuration(format!(
            "Unknown calibration kind '{}', expected one of {}",
            other,
            CALIBRATION_KINDS.join(", ")
        ))),
    }
}

fn chromatography_calib(old: &Value) -> Result<Value> {
    let detectors = object(&old["detectors"], "calfile 'detectors'")?;
    let mut new = Map::new();
    for (name, detector) in detectors {
        let window = detector.get("window").and_then(Value::as_i64).unwrap_or(3);
        let peakdetect = json!({
            "window": (window - 1) / 2,
            "polyorder": detector.get("poly").and_then(Value::as_i64).unwrap_or(2),
            "prominence": number(detector.get("prominence"), 1.0),
            "threshold": number(detector.get("threshold"), 1.0),
        });

        let mut species = Map::new();
        for (label, spec) in object(&detector["species"], "detector 'species'")? {
            if label == "units" && *spec == "min" {
                continue;
            }
            let bound = |key: &str| {
                spec.get(key).and_then(Value::as_f64).ok_or_else(|| {
                    ExtractError::configuration(format!(
                        "species '{}' of detector '{}' has no '{}'",
                        label, name, key
                    ))
                })
            };
            species.insert(
                label.clone(),
                json!({
                    "l": bound("l")? * 60.0,
                    "r": bound("r")? * 60.0,
                    "calib": {"inverse": {"slope": number(spec.get("rf"), 1.0)}},
                }),
            );
        }

        let id = match detector.get("id").and_then(Value::as_str) {
            Some("det_1") => 0,
            Some("det_2") => 1,
            other => {
                return Err(ExtractError::configuration(format!(
                    "detector '{}' has unsupported id {:?}",
                    name, other
                )));
            }
        };
        new.insert(
            name.clone(),
            json!({"id": id, "peakdetect": peakdetect, "species": species}),
        );
    }
    Ok(Value::Object(new))
}

fn flow_calib(old: &Value) -> Result<Value> {
    let mut new: Map<String, Value> = Map::new();
    for (controller, calib) in object(old, "MFCcalfile")? {
        let mut default_content = Map::new();
        default_content.insert(controller.clone(), json!(1.0));
        let default_content = Value::Object(default_content);
        let content = calib.get("content").unwrap_or(&default_content);
        for (target, fraction) in object(content, "MFC 'content'")? {
            let entry = new
                .entry(target.clone())
                .or_insert_with(|| json!({"unit": "ml/min"}));
            if let Value::Object(entry) = entry {
                entry.insert(
                    controller.clone(),
                    json!({
                        "calib": {"linear": {
                            "slope": number(calib.get("slope"), 1.0),
                            "intercept": number(calib.get("intercept"), 0.0),
                        }},
                        "fraction": fraction,
                    }),
                );
            }
        }
    }
    Ok(Value::Object(new))
}

/// Convert a list-style version 3 schema into a version 4.1 schema
pub fn schema_3to4(old: &[Value]) -> Result<Value> {
    let mut steps = Vec::with_capacity(old.len());
    for (i, old_step) in old.iter().enumerate() {
        let mut step = Map::new();

        let parser = old_step["datagram"].as_str().ok_or_else(|| {
            ExtractError::configuration(format!("step {} has no 'datagram'", i))
        })?;
        let parser = if parser == "gctrace" { "chromtrace" } else { parser };
        step.insert("parser".to_string(), json!(parser));

        let mut input = object(&old_step["import"], "step 'import'")?.clone();
        if let Some(paths) = input.remove("paths") {
            input.insert("files".to_string(), paths);
        }
        step.insert("input".to_string(), Value::Object(input));

        match old_step.get("export") {
            Some(Value::Null) | None => {}
            Some(tag) => {
                step.insert("tag".to_string(), tag.clone());
            }
        }

        let mut parameters = Map::new();
        if let Some(old_parameters) = old_step.get("parameters").and_then(Value::as_object) {
            for (key, value) in old_parameters {
                let removed = REMOVED_PARAMETERS.contains(&key.as_str())
                    || (key == "method" && *value == "q0refl");
                if removed {
                    warn!(
                        "Post-processing parameter '{}' of step {} is no longer supported and was dropped",
                        key, i
                    );
                } else {
                    parameters.insert(key.clone(), value.clone());
                }
            }
        }
        if !parameters.is_empty() {
            step.insert("parameters".to_string(), Value::Object(parameters));
        }
        steps.push(Value::Object(step));
    }

    Ok(json!({
        "metadata": {
            "provenance": {
                "type": UPDATE_PROVENANCE,
                "metadata": {
                    "labgram": {"version": env!("CARGO_PKG_VERSION")},
                    "update_schema": {"updater": "schema_3to4"},
                },
            },
            "version": SCHEMA_VERSION,
            "timezone": "localtime",
        },
        "steps": steps,
    }))
}

/// Bring a schema to the current layout; list-style schemas are migrated
pub fn update_schema(value: Value) -> Result<Value> {
    match value {
        Value::Array(steps) => {
            info!("Updating list-style schema with {} step(s)", steps.len());
            schema_3to4(&steps)
        }
        Value::Object(schema) => {
            info!("Schema is already dict-style, keeping it");
            Ok(Value::Object(schema))
        }
        other => Err(ExtractError::configuration(format!(
            "Schema must be a list or an object, got {}",
            kind_of(&other)
        ))),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

/// Anchor the relative paths of a preset to `folder`
pub fn schema_from_preset(mut preset: Value, folder: &Path) -> Result<Value> {
    if let Some(provenance) = preset
        .get_mut("metadata")
        .and_then(|m| m.get_mut("provenance"))
    {
        if provenance.is_string() {
            *provenance = json!(PRESET_PROVENANCE);
        } else if provenance.is_object() {
            let original = provenance.take();
            *provenance = json!({
                "type": PRESET_PROVENANCE,
                "metadata": {"preset_provenance": original},
            });
        }
    }

    let steps = preset
        .get_mut("steps")
        .and_then(Value::as_array_mut)
        .ok_or_else(|| ExtractError::configuration("preset has no 'steps' list"))?;

    for step in steps.iter_mut() {
        if !step.is_object() {
            return Err(ExtractError::configuration("preset steps must be objects"));
        }
        let input_key = if step.get("import").is_some() { "import" } else { "input" };
        let files_key = if step[input_key].get("files").is_some() {
            "files"
        } else {
            "folders"
        };

        let items = step[input_key][files_key].as_array().cloned().unwrap_or_default();
        let mut patched = Vec::with_capacity(items.len());
        for item in items {
            let item = item.as_str().ok_or_else(|| {
                ExtractError::configuration(format!("items in '{}' must be strings", files_key))
            })?;
            if Path::new(item).is_absolute() {
                warn!(
                    "Item '{}' in '{}' is an absolute path and will not be patched",
                    item, files_key
                );
                patched.push(json!(item));
                continue;
            }
            if item.starts_with("./") || item.starts_with(".\\") {
                return Err(ExtractError::configuration(format!(
                    "Item '{}' in '{}' starts with './' and cannot be patched using '{}'",
                    item,
                    files_key,
                    folder.display()
                )));
            }
            patched.push(json!(anchored(folder, item)?));
        }
        step[input_key][files_key] = Value::Array(patched);

        if let Some(calfile) = step
            .get_mut("parameters")
            .and_then(|p| p.get_mut("calfile"))
        {
            patch_path(calfile, folder, "calfile")?;
        }

        if let Some(external) = step.get_mut("externaldate") {
            let using = if external.get("from").is_some() { "from" } else { "using" };
            if let Some(path) = external
                .get_mut(using)
                .and_then(|u| u.get_mut("file"))
                .and_then(|f| f.get_mut("path"))
            {
                patch_path(path, folder, "externaldate file")?;
            }
        }
    }
    Ok(preset)
}

fn patch_path(value: &mut Value, folder: &Path, what: &str) -> Result<()> {
    let Some(path) = value.as_str() else {
        return Err(ExtractError::configuration(format!("{} must be a string", what)));
    };
    if Path::new(path).is_absolute() {
        warn!(
            "Specified {} '{}' is an absolute path and will not be patched",
            what, path
        );
        return Ok(());
    }
    *value = json!(anchored(folder, path)?);
    Ok(())
}

/// Absolute, lexically normalized `folder/item`
fn anchored(folder: &Path, item: &str) -> Result<String> {
    let joined = std::path::absolute(folder.join(item))?;
    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    Ok(normalized.to_string_lossy().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temperature_calibration() {
        let new = calib_3to4(&json!({"slope": 1.02, "intercept": -0.5}), "Tcalfile").unwrap();
        assert_eq!(new["T"]["unit"], "degC");
        assert_eq!(new["T"]["T_f"]["calib"]["linear"]["slope"], 1.02);
    }

    #[test]
    fn test_flow_calibration_with_content() {
        let old = json!({
            "flow low": {"slope": 0.98, "content": {"N2": 0.9, "O2": 0.1}},
            "flow high": {"intercept": 0.2}
        });
        let new = calib_3to4(&old, "MFCcalfile").unwrap();
        assert_eq!(new["N2"]["unit"], "ml/min");
        assert_eq!(new["N2"]["flow low"]["fraction"], 0.9);
        assert_eq!(new["O2"]["flow low"]["calib"]["linear"]["slope"], 0.98);
        assert_eq!(new["flow high"]["flow high"]["fraction"], 1.0);
        assert_eq!(new["flow high"]["flow high"]["calib"]["linear"]["intercept"], 0.2);
    }

    #[test]
    fn test_chromatography_calibration() {
        let old = json!({"detectors": {"TCD": {
            "id": "det_2",
            "window": 7,
            "species": {
                "units": "min",
                "CO2": {"l": 1.5, "r": 2.0, "rf": 3.0}
            }
        }}});
        let new = calib_3to4(&old, "calfile").unwrap();
        let tcd = &new["TCD"];
        assert_eq!(tcd["id"], 1);
        assert_eq!(tcd["peakdetect"]["window"], 3);
        assert_eq!(tcd["peakdetect"]["polyorder"], 2);
        assert_eq!(tcd["species"]["CO2"]["l"], 90.0);
        assert_eq!(tcd["species"]["CO2"]["calib"]["inverse"]["slope"], 3.0);
        assert!(tcd["species"].get("units").is_none());
    }

    #[test]
    fn test_unknown_calibration_kind() {
        assert!(calib_3to4(&json!({}), "GCcalfile").is_err());
    }

    #[test]
    fn test_schema_3to4() {
        let old = json!([
            {
                "datagram": "gctrace",
                "import": {"paths": ["a.dat"], "encoding": "utf-8"},
                "parameters": {"tracetype": "fusion", "calfile": "c.json"},
                "export": "gc"
            },
            {
                "datagram": "qftrace",
                "import": {"folders": ["."]},
                "parameters": {"method": "q0refl"},
                "export": null
            }
        ]);
        let new = update_schema(old).unwrap();

        assert_eq!(new["metadata"]["version"], SCHEMA_VERSION);
        assert_eq!(new["metadata"]["provenance"]["type"], UPDATE_PROVENANCE);
        let steps = new["steps"].as_array().unwrap();
        assert_eq!(steps[0]["parser"], "chromtrace");
        assert_eq!(steps[0]["input"]["files"], json!(["a.dat"]));
        assert!(steps[0]["input"].get("paths").is_none());
        assert_eq!(steps[0]["tag"], "gc");
        assert_eq!(steps[0]["parameters"], json!({"tracetype": "fusion"}));
        assert!(steps[1].get("tag").is_none());
        assert!(steps[1].get("parameters").is_none());
    }

    #[test]
    fn test_update_schema_passthrough_and_rejects() {
        let current = json!({"metadata": {"version": "5.0"}, "steps": []});
        assert_eq!(update_schema(current.clone()).unwrap(), current);
        assert!(update_schema(json!("schema")).is_err());
    }

    #[test]
    fn test_preset_paths_are_anchored() {
        let preset = json!({
            "metadata": {"provenance": {"type": "manual"}, "version": "4.1"},
            "steps": [{
                "parser": "basiccsv",
                "input": {"files": ["data/log.csv", "/abs/log.csv"]},
                "parameters": {"calfile": "cal/../calib.json"},
                "externaldate": {"using": {"file": {"path": "dates.json"}}}
            }]
        });
        let new = schema_from_preset(preset, Path::new("/runs/2021")).unwrap();

        assert_eq!(new["metadata"]["provenance"]["type"], PRESET_PROVENANCE);
        assert_eq!(
            new["metadata"]["provenance"]["metadata"]["preset_provenance"]["type"],
            "manual"
        );
        let step = &new["steps"][0];
        assert_eq!(
            step["input"]["files"],
            json!(["/runs/2021/data/log.csv", "/abs/log.csv"])
        );
        assert_eq!(step["parameters"]["calfile"], "/runs/2021/calib.json");
        assert_eq!(
            step["externaldate"]["using"]["file"]["path"],
            "/runs/2021/dates.json"
        );
    }

    #[test]
    fn test_preset_rejects_dot_prefixed_items() {
        let preset = json!({
            "metadata": {"provenance": "manual"},
            "steps": [{"import": {"folders": ["./raw"]}}]
        });
        let err = schema_from_preset(preset, Path::new("/runs")).unwrap_err();
        assert!(matches!(err, ExtractError::Configuration { .. }));
    }
}

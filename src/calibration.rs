//! Calibration and unit conversion of parsed columns.
//!
//! A calibration maps one or more raw columns onto a target column through
//! linear or inverse transforms. Components are weighted by their fraction
//! and summed; their uncertainties add in quadrature.

use crate::error::{ExtractError, Result};
use crate::models::{Field, Quantity, RawRecord, Scalar};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

fn one() -> f64 {
    1.0
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coefficients {
    #[serde(default = "one")]
    pub slope: f64,
    #[serde(default)]
    pub intercept: f64,
}

impl Default for Coefficients {
    fn default() -> Self {
        Self {
            slope: 1.0,
            intercept: 0.0,
        }
    }
}

/// Transform plus the tolerance of its result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Calib {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linear: Option<Coefficients>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inverse: Option<Coefficients>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub atol: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rtol: Option<f64>,
}

impl Calib {
    /// Transformed value and its derivative with respect to the input
    fn evaluate(&self, x: f64, target: &str) -> Result<(f64, f64)> {
        match (self.linear, self.inverse) {
            (Some(_), Some(_)) => Err(ExtractError::configuration(format!(
                "calibration for '{}' is both linear and inverse",
                target
            ))),
            (Some(c), None) => Ok((c.slope * x + c.intercept, c.slope)),
            (None, Some(c)) if c.slope == 0.0 => Err(ExtractError::configuration(format!(
                "inverse calibration for '{}' has zero slope",
                target
            ))),
            (None, Some(c)) => Ok(((x - c.intercept) / c.slope, 1.0 / c.slope)),
            (None, None) => Ok((x, 1.0)),
        }
    }
}

fn default_fraction() -> f64 {
    1.0
}

/// Contribution of one raw column to a target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    #[serde(default)]
    pub calib: Calib,
    #[serde(default = "default_fraction")]
    pub fraction: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Target {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Raw column name to its contribution
    #[serde(flatten)]
    pub components: BTreeMap<String, Component>,
}

/// Target column name to its definition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CalibrationSpec {
    pub targets: BTreeMap<String, Target>,
}

impl CalibrationSpec {
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Read a calibration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let spec: Self = serde_json::from_str(&text)?;
        debug!(
            "Loaded {} calibration target(s) from {}",
            spec.targets.len(),
            path.display()
        );
        Ok(spec)
    }

    /// Combine with another spec; targets of `other` replace same-named ones
    pub fn merged_with(mut self, other: CalibrationSpec) -> Self {
        self.targets.extend(other.targets);
        self
    }

    /// Unit of every target that declares one
    pub fn units(&self) -> BTreeMap<String, String> {
        self.targets
            .iter()
            .filter_map(|(name, t)| t.unit.clone().map(|u| (name.clone(), u)))
            .collect()
    }

    /// Every raw column a target draws on must be present in the header
    pub fn check_columns(&self, headers: &[String]) -> Result<()> {
        for (name, target) in &self.targets {
            for raw in target.components.keys() {
                if !headers.iter().any(|h| h == raw) {
                    return Err(ExtractError::configuration(format!(
                        "calibration of '{}' refers to missing column '{}'",
                        name, raw
                    )));
                }
            }
        }
        Ok(())
    }

    /// Compute every target from the raw values of a row
    ///
    /// A target whose raw values are empty on this row is left out, so the
    /// assembler stores null for it.
    pub fn apply(&self, record: &mut RawRecord) -> Result<()> {
        let mut computed = Vec::with_capacity(self.targets.len());
        for (name, target) in &self.targets {
            if let Some(field) = convert(name, target, record)? {
                computed.push((name.clone(), field));
            }
        }
        for (name, field) in computed {
            record.insert(name, field);
        }
        Ok(())
    }
}

fn convert(name: &str, target: &Target, record: &RawRecord) -> Result<Option<Field>> {
    let mut value = 0.0;
    let mut variance = 0.0;
    let mut unit = target.unit.clone();

    for (raw, component) in &target.components {
        let Some(field) = record.get(raw) else {
            warn!("No value for '{}' in this row, '{}' stored as null", raw, name);
            return Ok(None);
        };

        let (x, sigma_x) = match field {
            Field::Measured(q) => {
                unit.get_or_insert_with(|| q.unit.clone());
                (q.value, q.sigma)
            }
            Field::Plain(Scalar::Text(text)) => {
                warn!(
                    "Cannot calibrate '{}' from non-numeric '{}' = '{}'",
                    name, raw, text
                );
                return Ok(Some(Field::Plain(Scalar::Text(text.clone()))));
            }
            Field::Plain(scalar) => (scalar.as_f64().unwrap_or(f64::NAN), 0.0),
        };

        let (y, dydx) = component.calib.evaluate(x, name)?;
        let sigma = component
            .calib
            .atol
            .unwrap_or(0.0)
            .max(component.calib.rtol.unwrap_or(0.0) * y.abs())
            .max(dydx.abs() * sigma_x);

        value += component.fraction * y;
        variance += (component.fraction * sigma).powi(2);
    }

    Ok(Some(match unit {
        Some(unit) => Field::Measured(Quantity::new(value, variance.sqrt(), unit)),
        None => Field::Plain(Scalar::Float(value)),
    }))
}

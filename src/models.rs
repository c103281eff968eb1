//! Core data structures shared by the extractors.
//!
//! Defines parsed scalar values, unit-carrying quantities, per-row records
//! and the per-file header settings produced by the section parser.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A plain, unitless value as read from a file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    /// Numeric view of the value, `None` for text
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Int(i) => Some(*i as f64),
            Scalar::Float(f) => Some(*f),
            Scalar::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        !matches!(self, Scalar::Text(_))
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::Float(v) => write!(f, "{}", v),
            Scalar::Text(s) => write!(f, "{}", s),
        }
    }
}

/// A numeric value with its uncertainty, in the same unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    pub value: f64,
    pub sigma: f64,
    pub unit: String,
}

impl Quantity {
    pub fn new(value: f64, sigma: f64, unit: impl Into<String>) -> Self {
        Self {
            value,
            sigma,
            unit: unit.into(),
        }
    }
}

/// One cell of a parsed row
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    /// Unitless value (integer code, free text, ...)
    Plain(Scalar),
    /// Numeric value with a unit, always carrying a sigma
    Measured(Quantity),
}

impl Field {
    pub fn unit(&self) -> Option<&str> {
        match self {
            Field::Plain(_) => None,
            Field::Measured(q) => Some(&q.unit),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Field::Plain(s) => s.as_f64(),
            Field::Measured(q) => Some(q.value),
        }
    }
}

/// One parsed data line, keyed by canonical column name in file order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    fields: Vec<(String, Field)>,
}

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a field, replacing any existing field of the same name in place
    pub fn insert(&mut self, name: impl Into<String>, field: Field) {
        let name = name.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = field,
            None => self.fields.push((name, field)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, f)| f)
    }

    pub fn remove(&mut self, name: &str) -> Option<Field> {
        let pos = self.fields.iter().position(|(n, _)| n == name)?;
        Some(self.fields.remove(pos).1)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Field)> {
        self.fields.iter().map(|(n, f)| (n.as_str(), f))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Technique parameters of one hardware sequence
pub type SequenceParams = BTreeMap<String, Scalar>;

/// Loop definitions from the trailing header section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loops {
    pub n_loops: usize,
    /// Starting data-row index of each loop iteration
    pub indexes: Vec<usize>,
}

/// Per-file header metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub posix_timestamp: Option<f64>,
    pub technique: String,
    pub raw: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub params: Vec<SequenceParams>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub loops: Option<Loops>,
}

impl Settings {
    /// Number of hardware sequences described by the header
    pub fn sequence_count(&self) -> usize {
        self.params.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_insert_replaces_in_place() {
        let mut record = RawRecord::new();
        record.insert("time", Field::Measured(Quantity::new(1.0, 0.0, "s")));
        record.insert("Ns", Field::Plain(Scalar::Int(0)));
        record.insert("time", Field::Measured(Quantity::new(2.0, 0.0, "s")));

        let names: Vec<&str> = record.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["time", "Ns"]);
        assert_eq!(record.get("time").and_then(Field::as_f64), Some(2.0));
    }

    #[test]
    fn test_record_remove() {
        let mut record = RawRecord::new();
        record.insert("control_VI", Field::Measured(Quantity::new(0.5, 0.0, "mA")));
        assert!(record.remove("control_VI").is_some());
        assert!(record.is_empty());
        assert!(record.remove("control_VI").is_none());
    }

    #[test]
    fn test_scalar_serializes_untagged() {
        let mut params = SequenceParams::new();
        params.insert("E_range_max".to_string(), Scalar::Float(5.0));
        params.insert("I_range".to_string(), Scalar::Text("Auto".to_string()));
        params.insert("N".to_string(), Scalar::Int(3));

        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"E_range_max": 5.0, "I_range": "Auto", "N": 3})
        );
    }
}

//! Time-indexed, unit-annotated datasets.
//!
//! A [`Dataset`] is built once by the [`TableAssembler`] and then frozen. Rows
//! live in a polars frame with a `uts` column, an optional category column and
//! one column per variable; unitful variables carry a sibling `<name>_std_err`
//! column with their uncertainty.

pub mod assembler;
pub mod merge;

pub use assembler::TableAssembler;

use crate::error::{ExtractError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Name of the time coordinate
pub const UTS: &str = "uts";

/// Suffix of uncertainty columns
pub const STD_ERR_SUFFIX: &str = "_std_err";

pub fn std_err_name(name: &str) -> String {
    format!("{}{}", name, STD_ERR_SUFFIX)
}

/// A data variable and its fixed unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub unit: Option<String>,
}

/// Dataset-level attributes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attrs {
    /// `Some(false)` for relative timestamps, absent once a genuine start time is known
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub fulldate: Option<bool>,
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct Dataset {
    frame: DataFrame,
    category: Option<String>,
    variables: Vec<Variable>,
    attrs: Attrs,
}

impl Dataset {
    pub(crate) fn from_parts(
        frame: DataFrame,
        category: Option<String>,
        variables: Vec<Variable>,
        attrs: Attrs,
    ) -> Self {
        Self {
            frame,
            category,
            variables,
            attrs,
        }
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn len(&self) -> usize {
        self.frame.height()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.height() == 0
    }

    /// Name of the secondary coordinate, e.g. `species`
    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.variable(name).is_some()
    }

    pub fn unit(&self, name: &str) -> Option<&str> {
        self.variable(name).and_then(|v| v.unit.as_deref())
    }

    pub fn attrs(&self) -> &Attrs {
        &self.attrs
    }

    pub fn fulldate(&self) -> Option<bool> {
        self.attrs.fulldate
    }

    /// Attach an attribute, replacing an existing value
    pub fn with_attr(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attrs.metadata.insert(key.into(), value);
        self
    }

    /// Split off the free-form metadata, keeping `fulldate`
    pub fn take_metadata(mut self) -> (Self, Map<String, Value>) {
        let metadata = std::mem::take(&mut self.attrs.metadata);
        (self, metadata)
    }

    pub fn with_fulldate(mut self, fulldate: Option<bool>) -> Self {
        self.attrs.fulldate = fulldate;
        self
    }

    pub fn uts(&self) -> Result<Vec<f64>> {
        self.float_column(UTS)
            .map(|values| values.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    }

    /// Values of a numeric variable, nulls as `None`
    pub fn values(&self, name: &str) -> Result<Vec<Option<f64>>> {
        self.require(name)?;
        self.float_column(name)
    }

    /// Uncertainties of a unitful variable
    pub fn sigmas(&self, name: &str) -> Result<Vec<Option<f64>>> {
        match self.require(name)?.unit {
            Some(_) => self.float_column(&std_err_name(name)),
            None => Err(ExtractError::configuration(format!(
                "variable '{}' has no unit and carries no uncertainty",
                name
            ))),
        }
    }

    /// Values of a text variable
    pub fn texts(&self, name: &str) -> Result<Vec<Option<String>>> {
        self.require(name)?;
        self.string_column(name)
    }

    /// Category label of every row
    pub fn categories(&self) -> Result<Vec<Option<String>>> {
        match &self.category {
            Some(category) => self.string_column(category),
            None => Ok(vec![None; self.len()]),
        }
    }

    /// Rows where `uts` decreases with respect to the previous row
    pub fn uts_regressions(&self) -> Result<Vec<usize>> {
        let uts = self.uts()?;
        Ok(decreasing_positions(&uts))
    }

    /// Compact description of the dataset
    pub fn summary(&self) -> Value {
        let variables: Map<String, Value> = self
            .variables
            .iter()
            .map(|v| {
                let unit = v.unit.clone().map(Value::String).unwrap_or(Value::Null);
                (v.name.clone(), unit)
            })
            .collect();
        serde_json::json!({
            "rows": self.len(),
            "category": self.category,
            "variables": variables,
            "attrs": self.attrs,
        })
    }

    fn require(&self, name: &str) -> Result<&Variable> {
        self.variable(name).ok_or_else(|| {
            ExtractError::configuration(format!("dataset has no variable '{}'", name))
        })
    }

    fn float_column(&self, name: &str) -> Result<Vec<Option<f64>>> {
        let column = self.frame.column(name)?.cast(&DataType::Float64)?;
        Ok(column.f64()?.into_iter().collect())
    }

    fn string_column(&self, name: &str) -> Result<Vec<Option<String>>> {
        let column = self.frame.column(name)?.cast(&DataType::String)?;
        Ok(column
            .str()?
            .into_iter()
            .map(|v| v.map(str::to_string))
            .collect())
    }
}

pub(crate) fn decreasing_positions(uts: &[f64]) -> Vec<usize> {
    uts.windows(2)
        .enumerate()
        .filter(|(_, pair)| pair[1] < pair[0])
        .map(|(i, _)| i + 1)
        .collect()
}

//! Row-by-row accumulation of parsed records into a [`Dataset`].

use super::{Attrs, Dataset, UTS, Variable, decreasing_positions, std_err_name};
use crate::error::{ExtractError, Result};
use crate::models::{Field, RawRecord, Scalar};
use polars::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug)]
enum Cells {
    Measured {
        values: Vec<Option<f64>>,
        sigmas: Vec<Option<f64>>,
    },
    Plain(Vec<Option<Scalar>>),
}

impl Cells {
    fn len(&self) -> usize {
        match self {
            Cells::Measured { values, .. } => values.len(),
            Cells::Plain(values) => values.len(),
        }
    }

    fn push_null(&mut self) {
        match self {
            Cells::Measured { values, sigmas } => {
                values.push(None);
                sigmas.push(None);
            }
            Cells::Plain(values) => values.push(None),
        }
    }
}

#[derive(Debug)]
struct ColumnBuilder {
    name: String,
    unit: Option<String>,
    cells: Cells,
}

/// Accumulates records and freezes them into a [`Dataset`]
#[derive(Debug)]
pub struct TableAssembler {
    path: PathBuf,
    declared_units: BTreeMap<String, String>,
    category: Option<String>,
    categories: Vec<Option<String>>,
    columns: Vec<ColumnBuilder>,
    index: HashMap<String, usize>,
    rows: usize,
}

impl TableAssembler {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            declared_units: BTreeMap::new(),
            category: None,
            categories: Vec::new(),
            columns: Vec::new(),
            index: HashMap::new(),
            rows: 0,
        }
    }

    /// Units known before the first row, e.g. from a column table
    pub fn with_units(mut self, units: BTreeMap<String, String>) -> Self {
        self.declared_units = units;
        self
    }

    /// Index rows by a secondary coordinate such as `species`
    pub fn with_category(mut self, name: impl Into<String>) -> Self {
        self.category = Some(name.into());
        self
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn push(&mut self, record: RawRecord) -> Result<()> {
        self.push_row(None, record)
    }

    pub fn push_in_category(&mut self, category: impl Into<String>, record: RawRecord) -> Result<()> {
        if self.category.is_none() {
            return Err(ExtractError::format(
                &self.path,
                "categorized row pushed into an assembler without a category axis",
            ));
        }
        self.push_row(Some(category.into()), record)
    }

    fn push_row(&mut self, category: Option<String>, record: RawRecord) -> Result<()> {
        for (name, field) in record.iter() {
            if name == UTS || self.category.as_deref() == Some(name) {
                return Err(ExtractError::format(
                    &self.path,
                    format!("column name '{}' is reserved", name),
                ));
            }
            let idx = self.column_index(name, field);
            let path = &self.path;
            let column = &mut self.columns[idx];
            append(column, field, path, self.rows)?;
        }

        let expected = self.rows + 1;
        for column in &mut self.columns {
            if column.cells.len() < expected {
                column.cells.push_null();
            }
        }
        self.categories.push(category);
        self.rows = expected;
        Ok(())
    }

    fn column_index(&mut self, name: &str, field: &Field) -> usize {
        if let Some(idx) = self.index.get(name) {
            return *idx;
        }

        let unit = self
            .declared_units
            .get(name)
            .cloned()
            .or_else(|| field.unit().map(str::to_string));
        let mut cells = match unit {
            Some(_) => Cells::Measured {
                values: Vec::with_capacity(self.rows + 1),
                sigmas: Vec::with_capacity(self.rows + 1),
            },
            None => Cells::Plain(Vec::with_capacity(self.rows + 1)),
        };
        if self.rows > 0 {
            debug!(
                "Column '{}' first appears on row {} of {}, back-filling nulls",
                name,
                self.rows,
                self.path.display()
            );
            for _ in 0..self.rows {
                cells.push_null();
            }
        }

        self.columns.push(ColumnBuilder {
            name: name.to_string(),
            unit,
            cells,
        });
        let idx = self.columns.len() - 1;
        self.index.insert(name.to_string(), idx);
        idx
    }

    /// Freeze the accumulated rows with their timestamps.
    ///
    /// Decreasing timestamps are reported, not reordered.
    pub fn finish(self, uts: Vec<f64>, fulldate: Option<bool>) -> Result<Dataset> {
        if uts.len() != self.rows {
            return Err(ExtractError::format(
                &self.path,
                format!("{} timestamps for {} rows", uts.len(), self.rows),
            ));
        }

        let regressions = decreasing_positions(&uts);
        if let Some(first) = regressions.first() {
            warn!(
                "Timestamps decrease at {} row(s) of {}, first at row {}",
                regressions.len(),
                self.path.display(),
                first
            );
        }

        let mut frame_columns = vec![Column::new(UTS.into(), uts)];
        if let Some(category) = &self.category {
            frame_columns.push(Column::new(category.as_str().into(), self.categories));
        }

        let mut variables = Vec::with_capacity(self.columns.len());
        for column in self.columns {
            match column.cells {
                Cells::Measured { values, sigmas } => {
                    frame_columns.push(Column::new(column.name.as_str().into(), values));
                    frame_columns.push(Column::new(std_err_name(&column.name).into(), sigmas));
                }
                Cells::Plain(values) => {
                    frame_columns.push(plain_column(&column.name, values));
                }
            }
            variables.push(Variable {
                name: column.name,
                unit: column.unit,
            });
        }

        let frame = DataFrame::new(frame_columns)?;
        debug!(
            "Assembled {} rows x {} variables from {}",
            frame.height(),
            variables.len(),
            self.path.display()
        );

        Ok(Dataset::from_parts(
            frame,
            self.category,
            variables,
            Attrs {
                fulldate,
                ..Attrs::default()
            },
        ))
    }
}

fn append(column: &mut ColumnBuilder, field: &Field, path: &Path, row: usize) -> Result<()> {
    match (&mut column.cells, field) {
        (Cells::Measured { values, sigmas }, Field::Measured(q)) => {
            if column.unit.as_deref() != Some(q.unit.as_str()) {
                return Err(ExtractError::format(
                    path,
                    format!(
                        "unit of column '{}' changed from '{}' to '{}' on row {}",
                        column.name,
                        column.unit.as_deref().unwrap_or_default(),
                        q.unit,
                        row
                    ),
                ));
            }
            values.push(Some(q.value));
            sigmas.push(Some(q.sigma));
        }
        (Cells::Measured { values, sigmas }, Field::Plain(Scalar::Text(text))) => {
            warn!(
                "Non-numeric value '{}' in column '{}' on row {} of {}, stored as null",
                text,
                column.name,
                row,
                path.display()
            );
            values.push(None);
            sigmas.push(None);
        }
        (Cells::Measured { .. }, Field::Plain(value)) => {
            return Err(ExtractError::format(
                path,
                format!(
                    "unitless value {} in column '{}' with unit '{}' on row {}",
                    value,
                    column.name,
                    column.unit.as_deref().unwrap_or_default(),
                    row
                ),
            ));
        }
        (Cells::Plain(values), Field::Plain(value)) => values.push(Some(value.clone())),
        (Cells::Plain(_), Field::Measured(q)) => {
            return Err(ExtractError::format(
                path,
                format!(
                    "value with unit '{}' in unitless column '{}' on row {}",
                    q.unit, column.name, row
                ),
            ));
        }
    }
    Ok(())
}

/// Int64 when every value is integral, Float64 when all are numeric, String otherwise
fn plain_column(name: &str, values: Vec<Option<Scalar>>) -> Column {
    let present = || values.iter().flatten();

    if present().all(|v| matches!(v, Scalar::Int(_))) && present().next().is_some() {
        let ints: Vec<Option<i64>> = values
            .iter()
            .map(|v| match v {
                Some(Scalar::Int(i)) => Some(*i),
                _ => None,
            })
            .collect();
        return Column::new(name.into(), ints);
    }

    if present().all(Scalar::is_numeric) {
        let floats: Vec<Option<f64>> = values
            .iter()
            .map(|v| v.as_ref().and_then(Scalar::as_f64))
            .collect();
        return Column::new(name.into(), floats);
    }

    let texts: Vec<Option<String>> = values
        .iter()
        .map(|v| v.as_ref().map(Scalar::to_string))
        .collect();
    Column::new(name.into(), texts)
}

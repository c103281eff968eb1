//! Concatenation of datasets along the time axis.

use super::{Dataset, UTS, std_err_name};
use crate::error::{ExtractError, Result};
use polars::prelude::*;
use std::collections::HashMap;
use tracing::debug;

impl Dataset {
    /// Concatenate two datasets along `uts`.
    ///
    /// Attributes must be identical and shared variables must agree in unit
    /// and type. Rows sharing a `(uts, category)` key must not disagree on any
    /// non-null shared value. The result is sorted by `uts`, keeping the
    /// input order of equal timestamps.
    pub fn concat(self, other: Dataset, node: &str) -> Result<Dataset> {
        if self.attrs != other.attrs {
            let mut keys: Vec<&String> = self
                .attrs
                .metadata
                .keys()
                .chain(other.attrs.metadata.keys())
                .filter(|k| self.attrs.metadata.get(*k) != other.attrs.metadata.get(*k))
                .collect();
            keys.sort();
            keys.dedup();
            let fulldate = if self.attrs.fulldate != other.attrs.fulldate {
                " fulldate"
            } else {
                ""
            };
            return Err(ExtractError::merge_conflict(
                node,
                format!("attributes are not identical:{} {:?}", fulldate, keys),
            ));
        }

        if self.category != other.category {
            return Err(ExtractError::merge_conflict(
                node,
                format!(
                    "category axes differ: {:?} vs {:?}",
                    self.category, other.category
                ),
            ));
        }

        let mut shared_columns = Vec::new();
        for variable in &other.variables {
            let Some(mine) = self.variable(&variable.name) else {
                continue;
            };
            if mine.unit != variable.unit {
                return Err(ExtractError::merge_conflict(
                    node,
                    format!(
                        "variable '{}' has units {:?} and {:?}",
                        variable.name, mine.unit, variable.unit
                    ),
                ));
            }
            let left = self.frame.column(&variable.name)?;
            let right = other.frame.column(&variable.name)?;
            let both_filled = left.null_count() < left.len() && right.null_count() < right.len();
            if both_filled && left.dtype() != right.dtype() {
                return Err(ExtractError::merge_conflict(
                    node,
                    format!(
                        "variable '{}' has types {} and {}",
                        variable.name,
                        left.dtype(),
                        right.dtype()
                    ),
                ));
            }
            shared_columns.push(variable.name.clone());
            if variable.unit.is_some() {
                shared_columns.push(std_err_name(&variable.name));
            }
        }

        self.check_overlap(&other, &shared_columns, node)?;

        let mut variables = self.variables.clone();
        for variable in &other.variables {
            if !self.contains(&variable.name) {
                variables.push(variable.clone());
            }
        }

        let frame = concat_lf_diagonal(
            [self.frame.lazy(), other.frame.lazy()],
            UnionArgs {
                to_supertypes: true,
                ..Default::default()
            },
        )?
        .sort([UTS], SortMultipleOptions::default().with_maintain_order(true))
        .collect()?;

        debug!(
            "Concatenated node '{}' into {} rows x {} variables",
            node,
            frame.height(),
            variables.len()
        );

        Ok(Dataset::from_parts(frame, self.category, variables, self.attrs))
    }

    /// Reject rows that share a key but carry different values
    fn check_overlap(&self, other: &Dataset, columns: &[String], node: &str) -> Result<()> {
        if columns.is_empty() {
            return Ok(());
        }

        let keys = |ds: &Dataset| -> Result<Vec<(u64, Option<String>)>> {
            let uts = ds.uts()?;
            let categories = ds.categories()?;
            Ok(uts
                .into_iter()
                .map(|t| t.to_bits())
                .zip(categories)
                .collect())
        };

        let mut left_rows: HashMap<(u64, Option<String>), Vec<usize>> = HashMap::new();
        for (row, key) in keys(self)?.into_iter().enumerate() {
            left_rows.entry(key).or_default().push(row);
        }

        for (right_row, key) in keys(other)?.into_iter().enumerate() {
            let Some(rows) = left_rows.get(&key) else {
                continue;
            };
            for name in columns {
                let left = self.frame.column(name)?;
                let right = other.frame.column(name)?;
                let theirs = right.get(right_row)?;
                for left_row in rows {
                    let mine = left.get(*left_row)?;
                    if !compatible(&mine, &theirs) {
                        return Err(ExtractError::merge_conflict(
                            node,
                            format!(
                                "conflicting values for '{}' at uts {}: {} vs {}",
                                name,
                                f64::from_bits(key.0),
                                mine,
                                theirs
                            ),
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Null is compatible with anything; NaN equals NaN
fn compatible(a: &AnyValue, b: &AnyValue) -> bool {
    if a.is_null() || b.is_null() {
        return true;
    }
    match (a.extract::<f64>(), b.extract::<f64>()) {
        (Some(x), Some(y)) => x == y || (x.is_nan() && y.is_nan()),
        _ => a == b,
    }
}

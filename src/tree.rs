//! Named hierarchies of datasets.
//!
//! Multi-stream instruments produce one dataset per stream (e.g. per
//! detector) below a root that may hold cross-stream summaries.

use crate::dataset::Dataset;
use crate::error::Result;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct DataTree {
    pub name: String,
    pub dataset: Option<Dataset>,
    pub attrs: Map<String, Value>,
    pub children: BTreeMap<String, DataTree>,
}

impl DataTree {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn from_dataset(name: impl Into<String>, dataset: Dataset) -> Self {
        Self {
            name: name.into(),
            dataset: Some(dataset),
            ..Self::default()
        }
    }

    pub fn with_child(mut self, child: DataTree) -> Self {
        self.children.insert(child.name.clone(), child);
        self
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attrs.insert(key.into(), value);
        self
    }

    pub fn child(&self, name: &str) -> Option<&DataTree> {
        self.children.get(name)
    }

    /// Whether this node carries any rows
    pub fn has_rows(&self) -> bool {
        self.dataset.as_ref().is_some_and(|ds| !ds.is_empty())
    }

    /// Slash-separated paths of all nodes, sorted
    pub fn paths(&self) -> Vec<String> {
        let mut out = vec!["/".to_string()];
        for child in self.children.values() {
            child.collect_paths("", &mut out);
        }
        out.sort();
        out
    }

    fn collect_paths(&self, prefix: &str, out: &mut Vec<String>) {
        let path = format!("{}/{}", prefix, self.name);
        for child in self.children.values() {
            child.collect_paths(&path, out);
        }
        out.push(path);
    }

    /// JSON description of the node and its descendants
    pub fn summary(&self) -> Value {
        let children: Map<String, Value> = self
            .children
            .iter()
            .map(|(name, child)| (name.clone(), child.summary()))
            .collect();
        serde_json::json!({
            "name": self.name,
            "dataset": self.dataset.as_ref().map(Dataset::summary),
            "attrs": self.attrs,
            "children": children,
        })
    }
}

/// Merge `other` into `base`.
///
/// Datasets with rows on both sides are concatenated along the time axis; an
/// empty side adopts the other dataset. Node attributes are last-writer-wins
/// and children merge recursively by name.
pub fn merge_trees(mut base: DataTree, other: DataTree) -> Result<DataTree> {
    let DataTree {
        dataset,
        attrs,
        children,
        ..
    } = other;

    base.dataset = match (base.dataset.take(), dataset) {
        (Some(mine), Some(theirs)) if !mine.is_empty() && !theirs.is_empty() => {
            Some(mine.concat(theirs, &base.name)?)
        }
        (Some(mine), Some(theirs)) if mine.is_empty() => Some(theirs),
        (Some(mine), _) => Some(mine),
        (None, theirs) => theirs,
    };

    base.attrs.extend(attrs);

    for (name, child) in children {
        let merged = match base.children.remove(&name) {
            Some(mine) => merge_trees(mine, child)?,
            None => {
                debug!("Adopting node '{}' into '{}'", name, base.name);
                child
            }
        };
        base.children.insert(name, merged);
    }

    Ok(base)
}

//! Zip container extractor
//!
//! Members matching the configured suffix are unpacked into a scoped
//! temporary directory, extracted one by one in name order and folded into a
//! single tree. The directory is removed when the extractor returns, whether
//! extraction succeeded or not.

use super::Extractor;
use crate::constants::ORIGINAL_METADATA_KEY;
use crate::error::{ExtractError, Result};
use crate::tree::{DataTree, merge_trees};
use serde_json::{Value, json};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;
use zip::ZipArchive;

#[derive(Debug, Clone)]
pub struct ArchiveExtractor<E> {
    name: &'static str,
    member_suffix: String,
    inner: E,
}

impl<E: Extractor> ArchiveExtractor<E> {
    pub fn new(name: &'static str, member_suffix: impl Into<String>, inner: E) -> Self {
        Self {
            name,
            member_suffix: member_suffix.into(),
            inner,
        }
    }

    pub fn member_suffix(&self) -> &str {
        &self.member_suffix
    }

    /// Member files below `root` carrying the suffix, sorted by relative name
    fn members(&self, root: &Path) -> Result<Vec<(String, PathBuf)>> {
        let mut members = Vec::new();
        for entry in WalkDir::new(root) {
            let entry = entry.map_err(std::io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(root)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .replace('\\', "/");
            if relative.ends_with(&self.member_suffix) {
                members.push((relative, entry.into_path()));
            }
        }
        members.sort();
        Ok(members)
    }
}

impl<E: Extractor> Extractor for ArchiveExtractor<E> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn extract(&self, path: &Path) -> Result<DataTree> {
        info!("Unpacking archive: {}", path.display());
        let file = File::open(path)?;
        let mut archive = ZipArchive::new(BufReader::new(file))?;

        let workdir = tempfile::tempdir()?;
        archive.extract(workdir.path())?;

        let members = self.members(workdir.path())?;
        if members.is_empty() {
            return Err(ExtractError::format(
                path,
                format!("archive holds no '{}' members", self.member_suffix),
            ));
        }
        debug!(
            "Extracting {} member(s) of {}",
            members.len(),
            path.display()
        );

        let mut merged = DataTree::new("/");
        for (name, member) in &members {
            let mut tree = self.inner.extract(member)?;
            if let Some(dataset) = tree.dataset.take() {
                let (dataset, metadata) = dataset.take_metadata();
                tree.dataset = Some(dataset);
                tree.attrs.insert(name.clone(), Value::Object(metadata));
            }
            merged = merge_trees(merged, tree)?;
        }

        let names: Vec<&str> = members.iter().map(|(name, _)| name.as_str()).collect();
        Ok(merged.with_attr(
            ORIGINAL_METADATA_KEY,
            json!({
                "extractor": self.name,
                "filename": path.file_name().map(|n| n.to_string_lossy().to_string()),
                "members": names,
            }),
        ))
    }
}

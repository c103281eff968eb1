//! File extractors.
//!
//! Every extractor turns one input file into a [`DataTree`]. Single-stream
//! formats put their dataset at the root; archives merge their members.

pub mod archive;
pub mod basic_csv;
pub mod eclab_mpt;

#[cfg(test)]
pub mod tests;

pub use archive::ArchiveExtractor;
pub use basic_csv::BasicCsvExtractor;
pub use eclab_mpt::EclabMptExtractor;

use crate::config::{ExtractorConfig, FileType};
use crate::error::{ExtractError, Result};
use crate::tree::DataTree;
use encoding_rs::Encoding;
use serde_json::{Value, json};
use std::fs;
use std::path::Path;
use std::time::UNIX_EPOCH;
use tracing::warn;

/// Parses one file into a tree of datasets
pub trait Extractor: Send + Sync {
    /// Name recorded in provenance metadata
    fn name(&self) -> &'static str;

    fn extract(&self, path: &Path) -> Result<DataTree>;
}

impl<E: Extractor + ?Sized> Extractor for Box<E> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn extract(&self, path: &Path) -> Result<DataTree> {
        (**self).extract(path)
    }
}

/// Build the extractor for a file type
pub fn extractor_for(file_type: FileType, config: &ExtractorConfig) -> Result<Box<dyn Extractor>> {
    config.validate()?;
    let extractor: Box<dyn Extractor> = match file_type {
        FileType::EclabMpt => Box::new(EclabMptExtractor::from_config(config, file_type)?),
        FileType::BasicCsv => Box::new(BasicCsvExtractor::from_config(config, file_type)?),
        FileType::ZipMpt => Box::new(ArchiveExtractor::new(
            file_type.name(),
            config.member_suffix_for(file_type),
            EclabMptExtractor::from_config(config, file_type)?,
        )),
        FileType::ZipCsv => Box::new(ArchiveExtractor::new(
            file_type.name(),
            config.member_suffix_for(file_type),
            BasicCsvExtractor::from_config(config, file_type)?,
        )),
    };
    Ok(extractor)
}

/// Resolve an encoding label such as `windows-1252`
pub fn resolve_encoding(label: &str) -> Result<&'static Encoding> {
    Encoding::for_label(label.as_bytes())
        .ok_or_else(|| ExtractError::configuration(format!("Unknown encoding '{}'", label)))
}

/// Read a whole file and decode it, normalizing line endings
pub fn read_text(path: &Path, encoding: &'static Encoding) -> Result<String> {
    let bytes = fs::read(path)?;
    let (text, used, had_errors) = encoding.decode(&bytes);
    if had_errors {
        warn!(
            "Invalid {} sequences in {} were replaced",
            used.name(),
            path.display()
        );
    }
    Ok(text.replace("\r\n", "\n"))
}

/// Modification time of a file as a Unix timestamp
pub fn file_mtime(path: &Path) -> Result<f64> {
    let modified = fs::metadata(path)?.modified()?;
    let elapsed = modified.duration_since(UNIX_EPOCH).map_err(|e| {
        ExtractError::format(path, format!("modification time before epoch: {}", e))
    })?;
    Ok(elapsed.as_secs_f64())
}

/// Provenance block attached to extracted datasets
pub fn provenance(extractor: &str, path: &Path) -> Value {
    json!({
        "extractor": extractor,
        "filename": path.file_name().map(|n| n.to_string_lossy().to_string()),
    })
}

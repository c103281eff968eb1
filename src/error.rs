//! Error handling for instrument file extraction.
//!
//! Provides typed failures for file structure problems, column vocabulary
//! gaps, timestamp formats and archive merges, with enough context to
//! point at the offending file or field.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid file format: {path} - {reason}")]
    Format { path: PathBuf, reason: String },

    #[error("Unknown column '{column}' in file: {path}")]
    UnknownColumn { path: PathBuf, column: String },

    #[error("Timestamp '{timestamp}' does not match format '{format}'")]
    TimeFormat { timestamp: String, format: String },

    #[error("Time format for '{timestamp}' not implemented (tried: {tried})")]
    UnsupportedTimeFormat { timestamp: String, tried: String },

    #[error("Header section missing in file: {path} - {reason}")]
    MissingHeaderSection { path: PathBuf, reason: String },

    #[error("Merging datasets at node '{node}' failed: {reason}")]
    MergeConflict { node: String, reason: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl ExtractError {
    /// Create a format error for a file
    pub fn format(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Format {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a merge conflict error for a tree node
    pub fn merge_conflict(node: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MergeConflict {
            node: node.into(),
            reason: reason.into(),
        }
    }

    /// Whether the caller may recover by falling back to defaults
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ExtractError::MissingHeaderSection { .. } | ExtractError::TimeFormat { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ExtractError>;

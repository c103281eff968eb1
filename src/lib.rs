//! labgram
//!
//! Extracts time-resolved measurements from laboratory instrument files into
//! typed, uncertainty-aware datasets.
//!
//! This library provides tools for:
//! - Parsing EC-Lab text exports, including the settings header and loops
//! - Reading generic delimited tables with unit lines and timestamp columns
//! - Locale-aware numbers and timezone-aware timestamps
//! - Attaching instrument-resolution uncertainties to every measured value
//! - Merging the members of zip containers on the time axis
//! - Migrating old extraction schemas and calibration files

pub mod calibration;
pub mod cli;
pub mod columns;
pub mod config;
pub mod constants;
pub mod dataset;
pub mod error;
pub mod extractors;
pub mod header;
pub mod locale;
pub mod models;
pub mod schema_update;
pub mod techniques;
pub mod timestamp;
pub mod tree;
pub mod uncertainty;

// Re-export commonly used types
pub use config::{ExtractorConfig, FileType};
pub use dataset::Dataset;
pub use error::{ExtractError, Result};
pub use extractors::{Extractor, extractor_for};
pub use tree::DataTree;

//! Configuration management and validation.
//!
//! Provides the per-extraction options (encoding, timezone, locale,
//! delimiter, units, timestamp columns, tolerances, calibration) and the
//! loading of JSON configuration files.

use crate::calibration::CalibrationSpec;
use crate::constants::{self, CONFIG_DIR_NAME, CONFIG_FILE_NAME};
use crate::error::{ExtractError, Result};
use crate::locale::NumberLocale;
use crate::timestamp::Zone;
use crate::uncertainty::{Tolerance, UncertaintyModel};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Supported input file types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileType {
    /// EC-Lab text export
    #[serde(rename = "eclab.mpt")]
    EclabMpt,
    /// Delimited table with optional unit line
    #[serde(rename = "basic.csv")]
    BasicCsv,
    /// Zip archive of EC-Lab text exports
    #[serde(rename = "zip.mpt")]
    ZipMpt,
    /// Zip archive of delimited tables
    #[serde(rename = "zip.csv")]
    ZipCsv,
}

impl FileType {
    /// Name recorded in provenance metadata
    pub fn name(&self) -> &'static str {
        match self {
            FileType::EclabMpt => "eclab.mpt",
            FileType::BasicCsv => "basic.csv",
            FileType::ZipMpt => "zip.mpt",
            FileType::ZipCsv => "zip.csv",
        }
    }

    /// Guess the type from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "mpt" => Some(FileType::EclabMpt),
            "csv" | "tsv" | "ssv" | "txt" => Some(FileType::BasicCsv),
            _ => None,
        }
    }

    pub fn default_encoding(&self) -> &'static str {
        match self {
            FileType::EclabMpt | FileType::ZipMpt => constants::eclab::ENCODING,
            FileType::BasicCsv | FileType::ZipCsv => constants::table::ENCODING,
        }
    }

    pub fn default_member_suffix(&self) -> &'static str {
        match self {
            FileType::ZipMpt | FileType::EclabMpt => constants::eclab::MEMBER_SUFFIX,
            FileType::ZipCsv | FileType::BasicCsv => constants::table::MEMBER_SUFFIX,
        }
    }
}

/// Location and layout of one timestamp component
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimestampColumn {
    /// Zero-based column index; the component's default header name is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl TimestampColumn {
    pub fn at(index: usize) -> Self {
        Self {
            index: Some(index),
            format: None,
        }
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }
}

/// Which columns make up the timestamp of a table row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimestampSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uts: Option<TimestampColumn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<TimestampColumn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<TimestampColumn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<TimestampColumn>,
}

impl TimestampSpec {
    pub fn is_empty(&self) -> bool {
        self.uts.is_none() && self.timestamp.is_none() && self.date.is_none() && self.time.is_none()
    }
}

/// Options specific to delimited tables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableOptions {
    pub sep: String,
    /// Column units; read from the second line of the file when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub units: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<TimestampSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub convert: Option<CalibrationSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calfile: Option<PathBuf>,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            sep: constants::DEFAULT_SEPARATOR.to_string(),
            units: None,
            timestamp: None,
            convert: None,
            calfile: None,
        }
    }
}

impl TableOptions {
    /// Inline conversions merged over the calibration file
    pub fn calibration(&self) -> Result<CalibrationSpec> {
        let from_file = match &self.calfile {
            Some(path) => CalibrationSpec::from_file(path)?,
            None => CalibrationSpec::default(),
        };
        Ok(from_file.merged_with(self.convert.clone().unwrap_or_default()))
    }
}

/// Global configuration for one extraction run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Text encoding; the file type's default when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,

    pub timezone: String,

    pub locale: String,

    /// Per-column tolerance overrides
    pub sigma: BTreeMap<String, Tolerance>,

    /// Global absolute tolerance
    #[serde(skip_serializing_if = "Option::is_none")]
    pub atol: Option<f64>,

    /// Global relative tolerance
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rtol: Option<f64>,

    /// Suffix of archive members to extract; the file type's default when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member_suffix: Option<String>,

    pub table: TableOptions,

    /// Maximum number of files extracted concurrently
    pub jobs: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            encoding: None,
            timezone: constants::DEFAULT_TIMEZONE.to_string(),
            locale: constants::DEFAULT_LOCALE.to_string(),
            sigma: BTreeMap::new(),
            atol: None,
            rtol: None,
            member_suffix: None,
            table: TableOptions::default(),
            jobs: num_cpus::get(),
        }
    }
}

impl ExtractorConfig {
    /// Load configuration from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        debug!("Loaded configuration from {}", path.display());
        config.validate()?;
        Ok(config)
    }

    /// Default configuration file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load an explicit file, else the default file if present, else defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(default) if default.is_file() => Self::from_file(&default),
                _ => Ok(Self::default()),
            },
        }
    }

    /// Set the text encoding
    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }

    /// Set the timezone
    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = timezone.into();
        self
    }

    /// Set the numeric locale
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }

    /// Override the tolerance of one column
    pub fn with_sigma(mut self, column: impl Into<String>, tolerance: Tolerance) -> Self {
        self.sigma.insert(column.into(), tolerance);
        self
    }

    /// Set the global tolerances
    pub fn with_tolerance(mut self, atol: Option<f64>, rtol: Option<f64>) -> Self {
        self.atol = atol;
        self.rtol = rtol;
        self
    }

    /// Set the archive member suffix
    pub fn with_member_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.member_suffix = Some(suffix.into());
        self
    }

    /// Set the table options
    pub fn with_table(mut self, table: TableOptions) -> Self {
        self.table = table;
        self
    }

    /// Set the maximum number of concurrent files
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn zone(&self) -> Result<Zone> {
        self.timezone.parse()
    }

    pub fn number_locale(&self) -> Result<NumberLocale> {
        NumberLocale::from_id(&self.locale)
    }

    pub fn uncertainty_model(&self) -> Result<UncertaintyModel> {
        UncertaintyModel::new(
            self.sigma.clone(),
            Tolerance {
                atol: self.atol,
                rtol: self.rtol,
            },
        )
    }

    pub fn encoding_for(&self, file_type: FileType) -> &str {
        self.encoding
            .as_deref()
            .unwrap_or_else(|| file_type.default_encoding())
    }

    pub fn member_suffix_for(&self, file_type: FileType) -> &str {
        self.member_suffix
            .as_deref()
            .unwrap_or_else(|| file_type.default_member_suffix())
    }

    /// Check that every option resolves
    pub fn validate(&self) -> Result<()> {
        self.zone()?;
        self.number_locale()?;
        self.uncertainty_model()?;
        if let Some(encoding) = &self.encoding {
            if encoding_rs::Encoding::for_label(encoding.as_bytes()).is_none() {
                return Err(ExtractError::configuration(format!(
                    "Unknown encoding '{}'",
                    encoding
                )));
            }
        }
        if self.table.sep.is_empty() {
            return Err(ExtractError::configuration("Table separator must not be empty"));
        }
        if self.jobs == 0 {
            return Err(ExtractError::configuration("jobs must be at least 1"));
        }
        Ok(())
    }
}

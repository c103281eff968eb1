//! Command-line argument definitions for labgram
//!
//! Defines the `extract` and `update` subcommands with the clap derive API.
//! Extraction flags override values loaded from the configuration file.

use crate::config::{ExtractorConfig, FileType};
use crate::error::{ExtractError, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// CLI arguments for the labgram instrument file extractor
#[derive(Debug, Clone, Parser)]
#[command(
    name = "labgram",
    version,
    about = "Extract time-resolved measurements from laboratory instrument files",
    long_about = "Parses instrument exports (EC-Lab text files, delimited tables and zip \
                  containers of either) into datasets of values with units and \
                  instrument-resolution uncertainties, and migrates old extraction schemas."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Increase logging verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short = 'q', long = "quiet", global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

/// Available subcommands
#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Extract instrument files into datasets
    Extract(ExtractArgs),
    /// Migrate an extraction schema, preset or calibration file
    Update(UpdateArgs),
}

/// Arguments for the extract command
#[derive(Debug, Clone, Parser)]
pub struct ExtractArgs {
    /// Files or glob patterns to extract
    #[arg(value_name = "PATTERN", required = true)]
    pub inputs: Vec<String>,

    /// File format; inferred from the extension when omitted
    #[arg(short = 'f', long = "format", value_enum)]
    pub format: Option<InputFormat>,

    /// JSON configuration file (defaults to the user configuration directory)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Timezone of dated timestamps, e.g. Europe/Berlin or localtime
    #[arg(long = "timezone", value_name = "TZ")]
    pub timezone: Option<String>,

    /// Numeric locale, e.g. en_US or de_DE
    #[arg(long = "locale")]
    pub locale: Option<String>,

    /// Text encoding of the input files
    #[arg(long = "encoding")]
    pub encoding: Option<String>,

    /// Suffix of archive members to extract
    #[arg(long = "member-suffix", value_name = "SUFFIX")]
    pub member_suffix: Option<String>,

    /// Delimiter of generic tables
    #[arg(long = "sep")]
    pub sep: Option<String>,

    /// Global absolute tolerance
    #[arg(long = "atol")]
    pub atol: Option<f64>,

    /// Global relative tolerance
    #[arg(long = "rtol")]
    pub rtol: Option<f64>,

    /// Number of files extracted concurrently (defaults to CPU cores)
    #[arg(short = 'j', long = "jobs")]
    pub jobs: Option<usize>,

    /// Report format
    #[arg(short = 'o', long = "output-format", value_enum, default_value = "human")]
    pub output_format: OutputFormat,

    /// Include dataset metadata in the human-readable report
    #[arg(long = "metadata")]
    pub metadata: bool,
}

/// Arguments for the update command
#[derive(Debug, Clone, Parser)]
pub struct UpdateArgs {
    /// JSON document to migrate
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Destination file; the document is printed when omitted
    #[arg(value_name = "OUTPUT")]
    pub output: Option<PathBuf>,

    /// Treat the input as a preset and anchor its relative paths to FOLDER
    #[arg(long = "preset", value_name = "FOLDER", conflicts_with = "calib")]
    pub preset: Option<PathBuf>,

    /// Treat the input as a calibration document of the given kind
    #[arg(long = "calib", value_enum)]
    pub calib: Option<CalibKind>,
}

/// Input formats selectable on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum InputFormat {
    /// EC-Lab text export
    Mpt,
    /// Delimited table
    Csv,
    /// Zip archive of EC-Lab text exports
    ZipMpt,
    /// Zip archive of delimited tables
    ZipCsv,
}

impl InputFormat {
    pub fn file_type(self) -> FileType {
        match self {
            InputFormat::Mpt => FileType::EclabMpt,
            InputFormat::Csv => FileType::BasicCsv,
            InputFormat::ZipMpt => FileType::ZipMpt,
            InputFormat::ZipCsv => FileType::ZipCsv,
        }
    }
}

/// Calibration document kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CalibKind {
    #[value(name = "calfile")]
    Chromatography,
    #[value(name = "Tcalfile")]
    Temperature,
    #[value(name = "MFCcalfile")]
    MassFlow,
}

impl CalibKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CalibKind::Chromatography => "calfile",
            CalibKind::Temperature => "Tcalfile",
            CalibKind::MassFlow => "MFCcalfile",
        }
    }
}

/// Output format options for the extraction report
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON tree summaries for scripting
    Json,
}

impl Args {
    /// Log level implied by the verbosity flags
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            return "error";
        }
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

impl ExtractArgs {
    /// Validate the extract command arguments for consistency
    pub fn validate(&self) -> Result<()> {
        if let Some(config_file) = &self.config_file {
            if !config_file.is_file() {
                return Err(ExtractError::configuration(format!(
                    "Config file does not exist: {}",
                    config_file.display()
                )));
            }
        }

        if self.jobs == Some(0) {
            return Err(ExtractError::configuration(
                "Number of jobs must be greater than 0",
            ));
        }

        if self.member_suffix.is_some()
            && !matches!(self.format, None | Some(InputFormat::ZipMpt | InputFormat::ZipCsv))
        {
            return Err(ExtractError::configuration(
                "--member-suffix only applies to zip formats",
            ));
        }

        Ok(())
    }

    /// Layer the command line flags over a loaded configuration
    pub fn apply(&self, mut config: ExtractorConfig) -> ExtractorConfig {
        if let Some(timezone) = &self.timezone {
            config = config.with_timezone(timezone);
        }
        if let Some(locale) = &self.locale {
            config = config.with_locale(locale);
        }
        if let Some(encoding) = &self.encoding {
            config = config.with_encoding(encoding);
        }
        if let Some(suffix) = &self.member_suffix {
            config = config.with_member_suffix(suffix);
        }
        if let Some(sep) = &self.sep {
            config.table.sep = sep.clone();
        }
        if self.atol.is_some() || self.rtol.is_some() {
            let atol = self.atol.or(config.atol);
            let rtol = self.rtol.or(config.rtol);
            config = config.with_tolerance(atol, rtol);
        }
        if let Some(jobs) = self.jobs {
            config = config.with_jobs(jobs);
        }
        config
    }

    /// Load the configuration file and apply the flags
    pub fn load_config(&self) -> Result<ExtractorConfig> {
        let config = self.apply(ExtractorConfig::load(self.config_file.as_deref())?);
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(argv).unwrap()
    }

    fn extract_args(argv: &[&str]) -> ExtractArgs {
        match parse(argv).command {
            Some(Commands::Extract(args)) => args,
            other => panic!("Expected extract command, got {:?}", other),
        }
    }

    #[test]
    fn test_command_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_extract_flags() {
        let args = extract_args(&[
            "labgram",
            "extract",
            "runs/*.mpt",
            "other.mpt",
            "--format",
            "zip-mpt",
            "--timezone",
            "Europe/Berlin",
            "--rtol",
            "0.01",
            "-j",
            "2",
        ]);
        assert_eq!(args.inputs, vec!["runs/*.mpt", "other.mpt"]);
        assert_eq!(args.format.map(InputFormat::file_type), Some(FileType::ZipMpt));
        assert_eq!(args.output_format, OutputFormat::Human);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_flags_override_configuration() {
        let args = extract_args(&[
            "labgram", "extract", "a.csv", "--locale", "de_DE", "--sep", ";", "--atol", "0.5",
        ]);
        let base = ExtractorConfig::default().with_tolerance(None, Some(0.1));
        let config = args.apply(base);

        assert_eq!(config.locale, "de_DE");
        assert_eq!(config.table.sep, ";");
        assert_eq!(config.atol, Some(0.5));
        assert_eq!(config.rtol, Some(0.1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_extract_validation() {
        let mut args = extract_args(&["labgram", "extract", "a.zip"]);
        args.jobs = Some(0);
        assert!(args.validate().is_err());

        let mut args = extract_args(&["labgram", "extract", "a.mpt", "-f", "mpt"]);
        args.member_suffix = Some(".mpt".to_string());
        assert!(args.validate().is_err());

        let mut args = extract_args(&["labgram", "extract", "a.mpt"]);
        args.config_file = Some(PathBuf::from("/nonexistent/labgram.json"));
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_extract_requires_input() {
        assert!(Args::try_parse_from(["labgram", "extract"]).is_err());
    }

    #[test]
    fn test_update_flags() {
        let args = parse(&["labgram", "update", "old.json", "new.json", "--calib", "Tcalfile"]);
        match args.command {
            Some(Commands::Update(update)) => {
                assert_eq!(update.output, Some(PathBuf::from("new.json")));
                assert_eq!(update.calib.map(CalibKind::as_str), Some("Tcalfile"));
                assert!(update.preset.is_none());
            }
            other => panic!("Expected update command, got {:?}", other),
        }

        assert!(
            Args::try_parse_from([
                "labgram", "update", "old.json", "--calib", "calfile", "--preset", "runs"
            ])
            .is_err()
        );
    }

    #[test]
    fn test_log_level() {
        assert_eq!(parse(&["labgram"]).log_level(), "warn");
        assert_eq!(parse(&["labgram", "-vv"]).log_level(), "debug");
        assert_eq!(parse(&["labgram", "extract", "a.mpt", "-q"]).log_level(), "error");
    }

    #[test]
    fn test_calibration_kinds_match_migration() {
        for kind in CalibKind::value_variants() {
            assert!(crate::schema_update::CALIBRATION_KINDS.contains(&kind.as_str()));
        }
    }
}

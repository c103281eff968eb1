//! Application constants for labgram
//!
//! Default values, file signatures and naming conventions used by the
//! extractors and the command line interface.

// =============================================================================
// Defaults
// =============================================================================

/// Locale assumed for numeric fields when none is configured
pub const DEFAULT_LOCALE: &str = "en_US";

/// Timezone used to localize dated timestamps when none is configured
pub const DEFAULT_TIMEZONE: &str = "localtime";

/// Delimiter of generic tables
pub const DEFAULT_SEPARATOR: &str = ",";

// =============================================================================
// EC-Lab text exports
// =============================================================================

pub mod eclab {
    /// First line of every text export
    pub const FILE_MAGIC: &str = "EC-Lab ASCII FILE";

    /// Prefix of the line declaring the header length
    pub const HEADER_LINES_PREFIX: &str = "Nb header lines";

    /// Header length of files carrying no settings
    pub const MIN_HEADER_LINES: usize = 3;

    /// Encoding written by EC-Lab on Windows
    pub const ENCODING: &str = "windows-1252";

    pub const MEMBER_SUFFIX: &str = ".mpt";

    /// Current range reported when the instrument ranges automatically
    pub const AUTO_RANGE: &str = "Auto";
}

// =============================================================================
// Generic tables
// =============================================================================

pub mod table {
    pub const ENCODING: &str = "utf-8";

    pub const MEMBER_SUFFIX: &str = ".csv";

    /// Header names recognized as timestamp columns, in priority order
    pub const UTS_HEADER: &str = "uts";
    pub const TIMESTAMP_HEADER: &str = "timestamp";
    pub const DATE_HEADER: &str = "date";
    pub const TIME_HEADER: &str = "time";
}

// =============================================================================
// Metadata and schema migration
// =============================================================================

/// Provenance key attached to every extracted dataset
pub const ORIGINAL_METADATA_KEY: &str = "original_metadata";

/// Schema version produced by list-style schema migration
pub const SCHEMA_VERSION: &str = "4.1";

/// Provenance type recorded by migrations and presets
pub const UPDATE_PROVENANCE: &str = "labgram update";
pub const PRESET_PROVENANCE: &str = "labgram preset";

/// Parameters dropped during migration, post-processing has moved elsewhere
pub const REMOVED_PARAMETERS: &[&str] = &["Tcalfile", "MFCcalfile", "calfile"];

// =============================================================================
// Configuration files
// =============================================================================

pub const CONFIG_DIR_NAME: &str = "labgram";
pub const CONFIG_FILE_NAME: &str = "config.json";

// =============================================================================
// Progress reporting
// =============================================================================

pub const PROGRESS_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}";
pub const PROGRESS_CHARS: &str = "#>-";

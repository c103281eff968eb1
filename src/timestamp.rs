//! Timestamp resolution into Unix timestamps.
//!
//! Combines full timestamps, split date and time strings, or bare times into
//! seconds since the epoch. Inputs without a calendar date resolve to an
//! elapsed-seconds quantity and are flagged as not carrying a full date.

use crate::error::{ExtractError, Result};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike};
use chrono_tz::Tz;
use std::str::FromStr;
use tracing::{debug, warn};

/// Default format for date-only columns
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";

/// Default format for time-only columns
pub const DEFAULT_TIME_FORMAT: &str = "%H:%M:%S%.f";

/// ISO-like layouts tried when no format is configured
const ISO_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Year substituted into partial dates that lack one
const PARTIAL_DATE_YEAR: &str = "1970";

/// Timezone used to localize genuinely dated inputs
#[derive(Debug, Clone, PartialEq)]
pub enum Zone {
    Local,
    Named(Tz),
}

impl Default for Zone {
    fn default() -> Self {
        Zone::Named(Tz::UTC)
    }
}

impl FromStr for Zone {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "localtime" | "local" => Ok(Zone::Local),
            name => name.parse::<Tz>().map(Zone::Named).map_err(|_| {
                ExtractError::configuration(format!("Unknown timezone '{}'", name))
            }),
        }
    }
}

impl Zone {
    /// Localize a wall-clock datetime; ambiguous times resolve to the earliest instant
    fn localize(&self, naive: &NaiveDateTime) -> Option<f64> {
        match self {
            Zone::Local => Local.from_local_datetime(naive).earliest().map(|dt| to_uts(&dt)),
            Zone::Named(tz) => tz.from_local_datetime(naive).earliest().map(|dt| to_uts(&dt)),
        }
    }
}

/// A resolved timestamp
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolved {
    pub uts: f64,
    /// `true` when the input carried a genuine calendar date
    pub fulldate: bool,
}

impl Resolved {
    pub fn full(uts: f64) -> Self {
        Self { uts, fulldate: true }
    }

    pub fn partial(uts: f64) -> Self {
        Self {
            uts,
            fulldate: false,
        }
    }
}

fn to_uts<T: TimeZone>(dt: &DateTime<T>) -> f64 {
    dt.timestamp() as f64 + f64::from(dt.timestamp_subsec_nanos()) * 1e-9
}

/// Seconds elapsed since midnight for a wall-clock time
pub fn seconds_since_midnight(time: &NaiveTime) -> f64 {
    f64::from(time.num_seconds_from_midnight()) + f64::from(time.nanosecond()) * 1e-9
}

/// Convert strptime-style fraction directives into chrono's
pub fn translate_format(format: &str) -> String {
    format.replace(".%f", "%.f").replace("%f", "%6f")
}

fn has_any(format: &str, directives: &[&str]) -> bool {
    directives.iter().any(|d| format.contains(d))
}

fn has_year(format: &str) -> bool {
    has_any(format, &["%Y", "%y", "%D", "%F", "%c", "%x", "%G"])
}

fn has_date(format: &str) -> bool {
    has_year(format) || has_any(format, &["%m", "%d", "%e", "%b", "%B", "%h", "%j"])
}

fn has_offset(format: &str) -> bool {
    has_any(format, &["%z", "%:z", "%#z"])
}

/// Resolve a timestamp string into a Unix timestamp.
///
/// With `strict` set, a mismatching format is a `TimeFormat` error; otherwise
/// `Ok(None)` is returned so that the caller can try the next candidate.
pub fn str_to_uts(
    timestamp: &str,
    format: Option<&str>,
    zone: &Zone,
    strict: bool,
) -> Result<Option<Resolved>> {
    let value = timestamp.trim();
    let resolved = match format {
        Some(format) => parse_with_format(value, &translate_format(format), zone),
        None => parse_iso(value, zone),
    };

    match resolved {
        Some(r) => Ok(Some(r)),
        None if strict => Err(ExtractError::TimeFormat {
            timestamp: value.to_string(),
            format: format.unwrap_or("ISO 8601").to_string(),
        }),
        None => {
            debug!(
                "Timestamp '{}' does not match format {:?}",
                value, format
            );
            Ok(None)
        }
    }
}

/// Try each candidate format in order, first match wins
pub fn first_match(timestamp: &str, formats: &[&str], zone: &Zone) -> Result<Resolved> {
    for format in formats {
        if let Some(resolved) = str_to_uts(timestamp, Some(format), zone, false)? {
            return Ok(resolved);
        }
    }
    Err(ExtractError::UnsupportedTimeFormat {
        timestamp: timestamp.trim().to_string(),
        tried: formats.join(", "),
    })
}

/// Resolve a bare time of day into seconds since midnight
pub fn time_to_seconds(time: &str, format: Option<&str>, strict: bool) -> Result<Option<f64>> {
    let value = time.trim();
    let format = translate_format(format.unwrap_or(DEFAULT_TIME_FORMAT));
    match NaiveTime::parse_from_str(value, &format) {
        Ok(t) => Ok(Some(seconds_since_midnight(&t))),
        Err(_) if strict => Err(ExtractError::TimeFormat {
            timestamp: value.to_string(),
            format,
        }),
        Err(_) => Ok(None),
    }
}

/// Combine separate date and time strings into a localized timestamp
pub fn date_time_to_uts(
    date: &str,
    date_format: Option<&str>,
    time: &str,
    time_format: Option<&str>,
    zone: &Zone,
    strict: bool,
) -> Result<Option<Resolved>> {
    let date_format = date_format.unwrap_or(DEFAULT_DATE_FORMAT);
    let time_format = time_format.unwrap_or(DEFAULT_TIME_FORMAT);
    let combined = format!("{}T{}", date.trim(), time.trim());
    let format = format!("{}T{}", date_format, time_format);
    str_to_uts(&combined, Some(&format), zone, strict)
}

fn parse_with_format(value: &str, format: &str, zone: &Zone) -> Option<Resolved> {
    if has_offset(format) {
        return DateTime::parse_from_str(value, format)
            .ok()
            .map(|dt| Resolved::full(to_uts(&dt)));
    }

    if has_year(format) {
        let naive = NaiveDateTime::parse_from_str(value, format).ok().or_else(|| {
            NaiveDate::parse_from_str(value, format)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;
        return match zone.localize(&naive) {
            Some(uts) => Some(Resolved::full(uts)),
            None => {
                warn!(
                    "Timestamp '{}' does not exist in timezone {:?}",
                    value, zone
                );
                None
            }
        };
    }

    if has_date(format) {
        // Partial date: anchor to a fixed year, keep it in UTC and flag it.
        let anchored_value = format!("{} {}", value, PARTIAL_DATE_YEAR);
        let anchored_format = format!("{} %Y", format);
        let naive = NaiveDateTime::parse_from_str(&anchored_value, &anchored_format)
            .ok()
            .or_else(|| {
                NaiveDate::parse_from_str(&anchored_value, &anchored_format)
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            })?;
        return Some(Resolved::partial(to_uts(&naive.and_utc())));
    }

    NaiveTime::parse_from_str(value, format)
        .ok()
        .map(|t| Resolved::partial(seconds_since_midnight(&t)))
}

fn parse_iso(value: &str, zone: &Zone) -> Option<Resolved> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(Resolved::full(to_uts(&dt)));
    }
    ISO_DATETIME_FORMATS
        .iter()
        .chain(std::iter::once(&DEFAULT_DATE_FORMAT))
        .find_map(|format| parse_with_format(value, format, zone))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn utc() -> Zone {
        Zone::default()
    }

    #[test]
    fn test_zone_parsing() {
        assert_eq!("localtime".parse::<Zone>().unwrap(), Zone::Local);
        assert_eq!(
            "Europe/Berlin".parse::<Zone>().unwrap(),
            Zone::Named(chrono_tz::Europe::Berlin)
        );
        assert!("Mars/Olympus".parse::<Zone>().is_err());
    }

    #[test]
    fn test_iso_timestamp() {
        let r = str_to_uts("2021-09-14T13:36:50", None, &utc(), true)
            .unwrap()
            .unwrap();
        assert_eq!(r.uts, 1631626610.0);
        assert!(r.fulldate);

        let r = str_to_uts("2021-09-14T15:36:50+02:00", None, &utc(), true)
            .unwrap()
            .unwrap();
        assert_eq!(r.uts, 1631626610.0);
    }

    #[test]
    fn test_custom_format_with_am_pm() {
        let r = str_to_uts("10.09.2021 11:43:05AM", Some("%d.%m.%Y %I:%M:%S%p"), &utc(), true)
            .unwrap()
            .unwrap();
        assert_eq!(r.uts, 1631274185.0);
        assert!(r.fulldate);
    }

    #[test]
    fn test_timezone_localization() {
        let berlin = Zone::Named(chrono_tz::Europe::Berlin);
        let r = str_to_uts("2021-01-14 22:30:00", Some("%Y-%m-%d %H:%M:%S"), &berlin, true)
            .unwrap()
            .unwrap();
        assert_eq!(r.uts, 1610659800.0);
    }

    #[test]
    fn test_time_only_is_partial() {
        let r = str_to_uts("01:00:05", Some("%H:%M:%S"), &utc(), true)
            .unwrap()
            .unwrap();
        assert_eq!(r.uts, 3605.0);
        assert!(!r.fulldate);

        assert_eq!(time_to_seconds("11.59AM", Some("%I.%M%p"), true).unwrap(), Some(43140.0));
        assert_eq!(time_to_seconds("12.00PM", Some("%I.%M%p"), true).unwrap(), Some(43200.0));
    }

    #[test]
    fn test_partial_date_without_year() {
        let r = str_to_uts("01/02 00:00:10", Some("%m/%d %H:%M:%S"), &utc(), true)
            .unwrap()
            .unwrap();
        assert_eq!(r.uts, 86410.0);
        assert!(!r.fulldate);
    }

    #[test]
    fn test_strict_and_lenient_failure() {
        let err = str_to_uts("yesterday", Some("%Y-%m-%d"), &utc(), true).unwrap_err();
        assert!(matches!(err, ExtractError::TimeFormat { .. }));
        assert_eq!(str_to_uts("yesterday", Some("%Y-%m-%d"), &utc(), false).unwrap(), None);
    }

    #[test]
    fn test_fallback_chain() {
        let formats = ["%m/%d/%Y %H:%M:%S", "%m.%d.%Y %H:%M:%S", "%m/%d/%Y %H:%M:%S.%f"];
        let r = first_match("03/02/2022 17:52:24.250", &formats, &utc()).unwrap();
        assert!((r.uts - 1646243544.25).abs() < 1e-6);

        let r = first_match("03.02.2022 17:52:24", &formats, &utc()).unwrap();
        assert_eq!(r.uts, 1646243544.0);

        let err = first_match("2022-03-02", &formats, &utc()).unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedTimeFormat { .. }));
    }

    #[test]
    fn test_split_date_and_time() {
        let r = date_time_to_uts("2021-01-14", None, "21:30:00", None, &utc(), true)
            .unwrap()
            .unwrap();
        assert_eq!(r.uts, 1610659800.0);
        assert!(r.fulldate);
    }

    proptest! {
        #[test]
        fn prop_resolution_preserves_order(mut offsets in prop::collection::vec(0i64..400_000_000, 2..20)) {
            offsets.sort_unstable();
            let base = NaiveDate::from_ymd_opt(2015, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
            let mut previous = f64::MIN;
            for offset in offsets {
                let dt = base + chrono::Duration::seconds(offset);
                let date = dt.format("%Y-%m-%d").to_string();
                let time = dt.format("%H:%M:%S").to_string();
                let r = date_time_to_uts(&date, None, &time, Some("%H:%M:%S"), &utc(), true).unwrap().unwrap();
                prop_assert!(r.uts >= previous);
                previous = r.uts;
            }
        }
    }
}

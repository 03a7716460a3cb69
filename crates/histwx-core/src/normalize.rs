//! Normalization of API-supplied strings into storage values
//!
//! The API sends timestamps with an embedded UTC offset and most numbers as
//! strings. Storage wants naive local minute-resolution timestamps and
//! plain numbers, with "absent" kept distinct from zero.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Deserializer};

/// Timestamp/date normalization error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimestampError {
    #[error("unrecognized timestamp '{0}'")]
    Unrecognized(String),

    #[error("unrecognized date '{0}'")]
    UnrecognizedDate(String),
}

const TIME_FORMATS: [&str; 3] = ["%H:%M:%S", "%H:%M:%S%.f", "%H:%M"];

/// Convert an API timestamp into a naive local timestamp truncated to the minute.
///
/// `2025-07-21T00:00+08:00` becomes `2025-07-21 00:00:00`: the offset is
/// dropped, the wall-clock time is kept. Inputs without an offset
/// (`2025-07-21 00:00`, `2025-07-21T00:00:00`) only get their format
/// normalized.
pub fn normalize_timestamp(raw: &str) -> Result<NaiveDateTime, TimestampError> {
    let unrecognized = || TimestampError::Unrecognized(raw.to_string());
    let trimmed = raw.trim();

    let (date_part, time_part) = trimmed
        .split_once('T')
        .or_else(|| trimmed.split_once(' '))
        .ok_or_else(unrecognized)?;

    let date = NaiveDate::parse_from_str(date_part.trim(), "%Y-%m-%d").map_err(|_| unrecognized())?;

    let time_part = strip_offset(time_part.trim());
    let time = TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(time_part, fmt).ok())
        .ok_or_else(unrecognized)?;

    let minute = NaiveTime::from_hms_opt(time.hour(), time.minute(), 0).ok_or_else(unrecognized)?;
    Ok(date.and_time(minute))
}

/// Remove a trailing `Z`, `+hh:mm` or `-hh:mm` from the time portion
fn strip_offset(time: &str) -> &str {
    if let Some(stripped) = time.strip_suffix(['Z', 'z']) {
        return stripped;
    }
    match time.find(['+', '-']) {
        Some(idx) => &time[..idx],
        None => time,
    }
}

/// Parse a calendar date in either `YYYY-MM-DD` or `YYYYMMDD` form
pub fn parse_date(raw: &str) -> Result<NaiveDate, TimestampError> {
    let trimmed = raw.trim();
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(trimmed, "%Y%m%d"))
        .map_err(|_| TimestampError::UnrecognizedDate(raw.to_string()))
}

/// Date in the compact `YYYYMMDD` form the API expects
pub fn format_api_date(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// A JSON scalar that may be a number or a string holding one
#[derive(Deserialize)]
#[serde(untagged)]
enum Lenient {
    Number(f64),
    Text(String),
    Flag(bool),
}

/// Deserialize `"28"`, `28`, `""` or `null` into `Option<f64>`
///
/// Empty or unparseable strings become `None` rather than an error.
pub fn deserialize_lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Lenient>::deserialize(deserializer)?;
    Ok(match value {
        Some(Lenient::Number(n)) if n.is_finite() => Some(n),
        Some(Lenient::Text(s)) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    })
}

/// Deserialize a string-ish scalar into `Option<String>`, mapping `""` to `None`
pub fn deserialize_lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Lenient>::deserialize(deserializer)?;
    Ok(match value {
        Some(Lenient::Text(s)) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Some(Lenient::Number(n)) => Some(n.to_string()),
        Some(Lenient::Flag(b)) => Some(b.to_string()),
        None => None,
    })
}

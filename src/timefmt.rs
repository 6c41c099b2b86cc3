//! Timestamp parsing and formatting.
//!
//! The upstream emits ISO-8601 creation timestamps in two shapes, with and
//! without fractional seconds (`2024-03-30T21:49:28.123+0800` and
//! `2024-03-30T21:49:28+0800`). Everything derived from them downstream
//! (index rows, post headers, filenames) uses fixed-width zero-padded
//! renderings, so lexicographic order equals chronological order.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};

const API_FORMAT_FRACTIONAL: &str = "%Y-%m-%dT%H:%M:%S%.f%z";
const API_FORMAT_PLAIN: &str = "%Y-%m-%dT%H:%M:%S%z";

/// Rendering used in index rows and post headers.
pub const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Rendering used inside derived filenames.
pub const FILENAME_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Parse a creation timestamp exactly as the API sends it.
///
/// # Errors
///
/// Returns the parse error of the plain variant when neither shape matches.
pub fn parse_api_time(raw: &str) -> Result<DateTime<FixedOffset>, chrono::ParseError> {
    DateTime::parse_from_str(raw, API_FORMAT_FRACTIONAL)
        .or_else(|_| DateTime::parse_from_str(raw, API_FORMAT_PLAIN))
}

/// Render an instant for index rows and post headers, in its own offset.
#[must_use]
pub fn display_time(time: &DateTime<FixedOffset>) -> String {
    time.format(DISPLAY_FORMAT).to_string()
}

/// Render an instant for use inside a derived filename.
#[must_use]
pub fn filename_time(time: &DateTime<FixedOffset>) -> String {
    time.format(FILENAME_FORMAT).to_string()
}

/// Current instant rendered for a filename, for records whose own
/// timestamp cannot be parsed.
#[must_use]
pub fn filename_time_now() -> String {
    Utc::now().format(FILENAME_FORMAT).to_string()
}

/// Parse an operator-supplied lower time bound.
///
/// Accepted shapes, tried in order:
/// - `YYYY-MM-DDTHH:MM:SSZ`
/// - ISO-8601 with a UTC offset (what the run-state file contains)
/// - `YYYY-MM-DDTHH:MM:SS`, assumed UTC
/// - `YYYY-MM-DD`, midnight UTC
///
/// # Errors
///
/// Returns a parse error when the input matches none of the shapes.
pub fn parse_start_bound(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    if raw.contains('T') {
        if let Some(naive) = raw.strip_suffix('Z') {
            return NaiveDateTime::parse_from_str(naive, "%Y-%m-%dT%H:%M:%S")
                .map(|dt| dt.and_utc());
        }
        if let Ok(with_offset) = DateTime::parse_from_rfc3339(raw) {
            return Ok(with_offset.with_timezone(&Utc));
        }
        if let Ok(with_offset) = parse_api_time(raw) {
            return Ok(with_offset.with_timezone(&Utc));
        }
        return NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S").map(|dt| dt.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map(|date| date.and_time(NaiveTime::MIN).and_utc())
}

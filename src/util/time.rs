//! Timestamp parsing for sync metadata.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

/// Parse a `last_import_time` metadata value.
///
/// Tries RFC3339 first, then RFC3339 with fractional seconds and no
/// offset designator, matching the two formats historical exporters have
/// written. Returns `None` when neither form parses; callers treat that
/// as advisory (warn, not fail).
#[must_use]
pub fn parse_import_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }

    // Nano-precision timestamps without an explicit offset
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

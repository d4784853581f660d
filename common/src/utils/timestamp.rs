//! Canonical timestamp handling shared by ingestion and storage.
//!
//! Every timestamp persisted on a package is rendered as
//! `YYYY-MM-DDTHH:MM:SS.mmmZ` in UTC, so lexicographic order on the stored
//! strings equals chronological order.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

pub const CANONICAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

pub fn canonical(at: DateTime<Utc>) -> String {
    at.format(CANONICAL_FORMAT).to_string()
}

/// Parses the timestamp shapes upstream sources hand out: RFC 3339 with any
/// offset, naive date-times (read as UTC), and bare dates (midnight UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

pub fn normalize_timestamp(raw: &str) -> Option<String> {
    parse_timestamp(raw).map(canonical)
}

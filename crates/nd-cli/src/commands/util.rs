//! Shared utilities for CLI commands.

use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDateTime};
use nd_core::types::{CourseKey, TypeCode};

/// Wall-clock formats accepted for busy blocks, tried in order.
const LOCAL_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d %H:%M:%S",
];

/// Parse a datetime string as local wall-clock time.
///
/// Supports:
/// - RFC 3339: "2026-01-15T10:30:00Z", converted to local time
/// - Local: "2026-01-15T10:30", "2026-01-15 10:30"
pub fn parse_local_datetime(s: &str) -> Result<NaiveDateTime> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Local).naive_local());
    }

    LOCAL_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
        .with_context(|| {
            format!(
                "Invalid datetime: {s}. Use YYYY-MM-DDTHH:MM (local) or RFC 3339 (e.g., 2026-01-15T10:30:00Z)"
            )
        })
}

/// Normalizes a user-typed course key or name.
pub fn parse_course_key(raw: &str) -> Result<CourseKey> {
    CourseKey::from_name(raw).with_context(|| format!("invalid course key: {raw:?}"))
}

pub fn parse_type_code(raw: &str) -> Result<TypeCode> {
    TypeCode::new(raw.trim()).with_context(|| format!("invalid session type: {raw:?}"))
}

/// Formats minutes past midnight as `HH:MM`.
pub fn format_minute(minute: u32) -> String {
    format!("{:02}:{:02}", minute / 60, minute % 60)
}

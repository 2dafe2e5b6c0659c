//! Attendance record and its persisted form.

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One first-seen-today entry.
///
/// Persisted as `{"name", "timestamp", "date"}` with ISO-8601 values
/// (`2026-10-18T09:15:02.123456`, `2026-10-18`). Fields written by other
/// tools are kept in `extra` and written back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub name: String,
    #[serde(with = "iso_timestamp")]
    pub timestamp: NaiveDateTime,
    pub date: NaiveDate,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl AttendanceRecord {
    /// Record for `name` seen at `at`, truncated to microseconds.
    pub fn new(name: &str, at: NaiveDateTime) -> Self {
        let micros = at.nanosecond() / 1_000 * 1_000;
        let timestamp = at.with_nanosecond(micros).unwrap_or(at);
        Self {
            name: name.to_string(),
            timestamp,
            date: timestamp.date(),
            extra: Map::new(),
        }
    }
}

pub(crate) mod iso_timestamp {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&ts.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }

    /// Accepts any fractional precision, or none.
    pub fn parse(raw: &str) -> chrono::ParseResult<NaiveDateTime> {
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
    }
}

//! Value coercion shared by the forecast and energy extractors.
//!
//! Nothing here fails: a value that cannot be coerced is `None`, which callers
//! keep as an explicit missing cell.

use serde_json::Value;
use time::{
    format_description::well_known::{Iso8601, Rfc2822, Rfc3339},
    OffsetDateTime, PrimitiveDateTime, UtcOffset,
};

const MISSING_SENTINELS: [&str; 2] = ["", "NA"];

fn is_missing_sentinel(s: &str) -> bool {
    MISSING_SENTINELS.contains(&s)
}

/// Parse a numeric cell. Empty, `NA`, NaN and non-numeric text are missing.
pub fn parse_number(raw: &str) -> Option<f64> {
    let s = raw.trim();
    if is_missing_sentinel(s) {
        return None;
    }
    s.parse::<f64>().ok().filter(|v| !v.is_nan())
}

/// Parse a timestamp and normalize it to UTC.
///
/// Accepts RFC 3339 (`2025-08-25T03:00:00.000-04:00`), extended ISO 8601 with
/// an offset, RFC 2822, and offset-less ISO 8601 which is taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<OffsetDateTime> {
    let s = raw.trim();
    if is_missing_sentinel(s) {
        return None;
    }

    OffsetDateTime::parse(s, &Rfc3339)
        .or_else(|_| OffsetDateTime::parse(s, &Iso8601::DEFAULT))
        .or_else(|_| OffsetDateTime::parse(s, &Rfc2822))
        .or_else(|_| PrimitiveDateTime::parse(s, &Iso8601::DEFAULT).map(PrimitiveDateTime::assume_utc))
        .ok()
        .map(|ts| ts.to_offset(UtcOffset::UTC))
}

/// Numeric coercion of a decoded JSON value.
pub fn json_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64().filter(|x| !x.is_nan()),
        Value::String(s) => parse_number(s),
        _ => None,
    }
}

/// Text form of a scalar JSON value; `null`, arrays and objects have none.
pub fn json_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Timestamp coercion of a decoded JSON value.
pub fn json_timestamp(v: &Value) -> Option<OffsetDateTime> {
    match v {
        Value::String(s) => parse_timestamp(s),
        _ => None,
    }
}

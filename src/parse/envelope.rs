// src/parse/envelope.rs
//! Response envelope adapter. The classification service has answered with
//! several shapes over time; all of them collapse into `Envelope` here so the
//! parser only ever sees text + optional timestamp + optional id.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::error::ParseFailure;

/// Object keys that may carry the classification text, in lookup order.
const TEXT_KEYS: &[&str] = &["classification", "response", "text", "result", "output", "data", "payload"];
const TIMESTAMP_KEYS: &[&str] = &["timestamp", "ts", "created_at", "time"];

/// Unix values above this are milliseconds (year 2286 in seconds).
const MILLIS_CUTOFF: i64 = 10_000_000_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub text: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub id: Option<u64>,
}

impl Envelope {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            timestamp: None,
            id: None,
        }
    }
}

/// Normalize any known envelope shape. Accepted:
/// - `"bare string"`
/// - `{"data": ["text", ...]}`
/// - `{"response": ...}`, `{"classification": ...}`, `{"text": ...}`
/// - nesting of the above (`{"data": {"classification": "..."}}`)
///
/// Timestamp and id are taken from the outermost object that has them.
pub fn from_value(v: &Value) -> Result<Envelope, ParseFailure> {
    from_value_at(v, 0)
}

fn from_value_at(v: &Value, depth: usize) -> Result<Envelope, ParseFailure> {
    // Four levels is already more wrapping than any observed response.
    if depth > 4 {
        return Err(ParseFailure::MissingText);
    }
    match v {
        Value::Null => Err(ParseFailure::Null),
        Value::Bool(_) => Err(ParseFailure::NotText("bool")),
        Value::Number(_) => Err(ParseFailure::NotText("number")),
        Value::String(s) => Ok(Envelope::text(s.clone())),
        Value::Array(items) => items
            .iter()
            .find_map(|it| from_value_at(it, depth + 1).ok())
            .ok_or(ParseFailure::NotText("array")),
        Value::Object(map) => {
            let mut env = TEXT_KEYS
                .iter()
                .filter_map(|k| map.get(*k))
                .find_map(|inner| from_value_at(inner, depth + 1).ok())
                .ok_or(ParseFailure::MissingText)?;

            if let Some(ts) = TIMESTAMP_KEYS.iter().find_map(|k| map.get(*k).and_then(parse_timestamp)) {
                env.timestamp = Some(ts);
            }
            if let Some(id) = map.get("id").and_then(parse_id) {
                env.id = Some(id);
            }
            Ok(env)
        }
    }
}

/// Decode raw bytes: JSON when it parses as JSON, otherwise the bytes are the text.
pub fn from_bytes(raw: &[u8]) -> Result<Envelope, ParseFailure> {
    let s = std::str::from_utf8(raw).map_err(|_| ParseFailure::InvalidUtf8)?;
    let trimmed = s.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') || trimmed.starts_with('"') || trimmed == "null" {
        if let Ok(v) = serde_json::from_str::<Value>(s) {
            return from_value(&v);
        }
    }
    Ok(Envelope::text(s))
}

/// RFC 3339 strings, or unix seconds/millis as number or numeric string.
pub fn parse_timestamp(v: &Value) -> Option<DateTime<Utc>> {
    match v {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .map(|d| d.with_timezone(&Utc))
            .ok()
            .or_else(|| s.trim().parse::<i64>().ok().and_then(from_unix)),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(from_unix),
        _ => None,
    }
}

fn from_unix(n: i64) -> Option<DateTime<Utc>> {
    if n <= 0 {
        return None;
    }
    if n >= MILLIS_CUTOFF {
        Utc.timestamp_millis_opt(n).single()
    } else {
        Utc.timestamp_opt(n, 0).single()
    }
}

fn parse_id(v: &Value) -> Option<u64> {
    match v {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

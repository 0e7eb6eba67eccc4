//! # Telemetry Records
//!
//! A record is `{ id, timestamp, value }` as delivered by both the history
//! endpoint and the live feed. Decoding never fails on shape: fields that are
//! missing or of an unexpected type are kept as such and surface downstream as
//! `Invalid Date` / `NaN` when rendered.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Rendered id for a record that arrived without one
pub const MISSING_ID: &str = "undefined";

/// Point-in-time marker of a record as it was received
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    /// Milliseconds since the Unix epoch
    Millis(f64),
    /// Textual timestamp (RFC 3339, naive ISO 8601 or integer milliseconds)
    Text(String),
    /// Field absent or not a number/string
    Missing,
}

impl Timestamp {
    /// Absolute instant in epoch milliseconds, or `None` if unparseable
    pub fn epoch_millis(&self) -> Option<i64> {
        match self {
            Timestamp::Millis(ms) if ms.is_finite() => {
                let ms = ms.trunc();
                if ms.abs() > i64::MAX as f64 {
                    return None;
                }
                DateTime::<Utc>::from_timestamp_millis(ms as i64).map(|dt| dt.timestamp_millis())
            }
            Timestamp::Millis(_) => None,
            Timestamp::Text(text) => parse_text_instant(text.trim()).map(|dt| dt.timestamp_millis()),
            Timestamp::Missing => None,
        }
    }

    /// Absolute instant in UTC, or `None` if unparseable
    pub fn instant(&self) -> Option<DateTime<Utc>> {
        self.epoch_millis().and_then(DateTime::<Utc>::from_timestamp_millis)
    }

    fn from_json(value: Option<&Value>) -> Self {
        match value {
            Some(Value::Number(n)) => n.as_f64().map(Timestamp::Millis).unwrap_or(Timestamp::Missing),
            Some(Value::String(s)) => Timestamp::Text(s.clone()),
            _ => Timestamp::Missing,
        }
    }
}

impl From<i64> for Timestamp {
    fn from(ms: i64) -> Self {
        Timestamp::Millis(ms as f64)
    }
}

impl From<&str> for Timestamp {
    fn from(text: &str) -> Self {
        Timestamp::Text(text.to_string())
    }
}

fn parse_text_instant(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    text.parse::<i64>().ok().and_then(DateTime::<Utc>::from_timestamp_millis)
}

/// Measured reading of a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reading {
    Number(f64),
    Text(String),
    Missing,
}

impl Reading {
    fn from_json(value: Option<&Value>) -> Self {
        match value {
            None | Some(Value::Null) => Reading::Missing,
            Some(Value::Number(n)) => n.as_f64().map(Reading::Number).unwrap_or(Reading::Missing),
            Some(Value::String(s)) => Reading::Text(s.clone()),
            Some(other) => Reading::Text(other.to_string()),
        }
    }
}

impl From<f64> for Reading {
    fn from(v: f64) -> Self {
        Reading::Number(v)
    }
}

impl From<&str> for Reading {
    fn from(v: &str) -> Self {
        Reading::Text(v.to_string())
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reading::Number(v) if v.is_nan() => f.write_str("NaN"),
            Reading::Number(v) if v.is_infinite() => {
                f.write_str(if *v > 0.0 { "Infinity" } else { "-Infinity" })
            }
            Reading::Number(v) => f.write_str(&format_number(*v)),
            Reading::Text(s) => f.write_str(s),
            Reading::Missing => f.write_str("NaN"),
        }
    }
}

/// Shortest round-trip decimal, switching to exponent form outside
/// `1e-7 <= |v| < 1e21` (`1e+21`, `5e-324`)
fn format_number(v: f64) -> String {
    let magnitude = v.abs();
    if v == 0.0 || (1e-7..1e21).contains(&magnitude) {
        // f64's Display omits a trailing ".0" and never prints "-0"
        return if v == 0.0 { "0".to_string() } else { v.to_string() };
    }

    let exponent_form = format!("{:e}", v);
    match exponent_form.split_once('e') {
        Some((mantissa, exponent)) if !exponent.starts_with('-') => format!("{}e+{}", mantissa, exponent),
        _ => exponent_form,
    }
}

/// One telemetry sample. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value")]
pub struct TelemetryRecord {
    /// Channel identifier, e.g. `pwr.v`
    pub id: String,
    pub timestamp: Timestamp,
    pub value: Reading,
}

impl TelemetryRecord {
    pub fn new(id: impl Into<String>, timestamp: impl Into<Timestamp>, value: impl Into<Reading>) -> Self {
        Self {
            id: id.into(),
            timestamp: timestamp.into(),
            value: value.into(),
        }
    }

    /// Build a record from arbitrary JSON, keeping whatever fields are usable
    pub fn from_json(value: &Value) -> Self {
        let object = value.as_object();
        let field = |name: &str| object.and_then(|o| o.get(name));

        let id = match field("id") {
            Some(Value::String(s)) => s.clone(),
            None | Some(Value::Null) => MISSING_ID.to_string(),
            Some(other) => other.to_string(),
        };

        Self {
            id,
            timestamp: Timestamp::from_json(field("timestamp")),
            value: Reading::from_json(field("value")),
        }
    }

    /// Sort key: epoch milliseconds, `None` for an invalid instant
    pub fn sort_key(&self) -> Option<i64> {
        self.timestamp.epoch_millis()
    }
}

impl From<Value> for TelemetryRecord {
    fn from(value: Value) -> Self {
        Self::from_json(&value)
    }
}

/// Decode one live-feed message into a record
///
/// # Errors
///
/// Returns `ViewerError::Payload` only when the text is not JSON at all.
/// Valid JSON of the wrong shape still yields a (degraded) record.
pub fn decode_message(text: &str) -> Result<TelemetryRecord> {
    let value: Value = serde_json::from_str(text)?;
    Ok(TelemetryRecord::from_json(&value))
}

/// Flatten a history response body into records, in body order
///
/// # Errors
///
/// Returns `ViewerError::Payload` if the body is not a JSON object.
pub fn decode_history_body(body: Value) -> Result<Vec<TelemetryRecord>> {
    match body {
        Value::Object(map) => Ok(map.into_iter().map(|(_, v)| TelemetryRecord::from(v)).collect()),
        other => Err(crate::error::ViewerError::Payload(format!(
            "history body is not an object: {}",
            json_type_name(&other)
        ))),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Numeric record shorthand for tests
#[cfg(test)]
pub(crate) fn sample(id: &str, timestamp: i64, value: f64) -> TelemetryRecord {
    TelemetryRecord::new(id, Timestamp::Millis(timestamp as f64), Reading::Number(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ViewerError;
    use serde_json::json;

    #[test]
    fn test_decode_live_message() {
        let record = decode_message(r#"{"id":"pwr.v","timestamp":300,"value":3}"#).unwrap();
        assert_eq!(record, sample("pwr.v", 300, 3.0));
    }

    #[test]
    fn test_decode_non_json_is_payload_error() {
        let err = decode_message("subscribe pwr.v").unwrap_err();
        assert!(matches!(err, ViewerError::Payload(_)));
    }

    #[test]
    fn test_decode_missing_fields_is_lenient() {
        let record = decode_message(r#"{"value":"12.5"}"#).unwrap();
        assert_eq!(record.id, MISSING_ID);
        assert_eq!(record.timestamp, Timestamp::Missing);
        assert_eq!(record.value, Reading::Text("12.5".into()));
        assert_eq!(record.sort_key(), None);
    }

    #[test]
    fn test_decode_non_object_is_lenient() {
        let record = decode_message("42").unwrap();
        assert_eq!(record.id, MISSING_ID);
        assert_eq!(record.value, Reading::Missing);
    }

    #[test]
    fn test_serde_deserialize_goes_through_lenient_path() {
        let record: TelemetryRecord =
            serde_json::from_value(json!({"id": 7, "timestamp": true, "value": null})).unwrap();
        assert_eq!(record.id, "7");
        assert_eq!(record.timestamp, Timestamp::Missing);
        assert_eq!(record.value, Reading::Missing);
    }

    #[test]
    fn test_numeric_timestamp_is_epoch_millis() {
        assert_eq!(Timestamp::Millis(1_500.9).epoch_millis(), Some(1_500));
        assert_eq!(Timestamp::Millis(f64::NAN).epoch_millis(), None);
        assert_eq!(Timestamp::Millis(f64::INFINITY).epoch_millis(), None);
    }

    #[test]
    fn test_text_timestamp_formats() {
        assert_eq!(
            Timestamp::from("1970-01-01T00:00:01Z").epoch_millis(),
            Some(1_000)
        );
        assert_eq!(
            Timestamp::from("1970-01-01T01:00:00+01:00").epoch_millis(),
            Some(0)
        );
        assert_eq!(
            Timestamp::from("1970-01-01T00:00:02.500").epoch_millis(),
            Some(2_500)
        );
        assert_eq!(Timestamp::from("1970-01-02").epoch_millis(), None);
        assert_eq!(Timestamp::from(" 1234 ").epoch_millis(), Some(1_234));
        assert_eq!(Timestamp::from("yesterday").epoch_millis(), None);
    }

    #[test]
    fn test_reading_display() {
        assert_eq!(Reading::Number(3.0).to_string(), "3");
        assert_eq!(Reading::Number(-0.25).to_string(), "-0.25");
        assert_eq!(Reading::Number(f64::NAN).to_string(), "NaN");
        assert_eq!(Reading::Number(f64::NEG_INFINITY).to_string(), "-Infinity");
        assert_eq!(Reading::Text("ok".into()).to_string(), "ok");
        assert_eq!(Reading::Missing.to_string(), "NaN");
    }

    #[test]
    fn test_reading_display_switches_to_exponent_form() {
        assert_eq!(Reading::Number(1e21).to_string(), "1e+21");
        assert_eq!(Reading::Number(-2.5e22).to_string(), "-2.5e+22");
        assert_eq!(Reading::Number(5e-324).to_string(), "5e-324");
        assert_eq!(Reading::Number(1.5e-8).to_string(), "1.5e-8");
        assert_eq!(Reading::Number(1e20).to_string(), "100000000000000000000");
        assert_eq!(Reading::Number(1e-7).to_string(), "0.0000001");
        assert_eq!(Reading::Number(-0.0).to_string(), "0");
    }

    #[test]
    fn test_object_value_is_kept_as_text() {
        let record = TelemetryRecord::from_json(&json!({"id": "pwr.c", "timestamp": 1, "value": {"a": 1}}));
        assert_eq!(record.value, Reading::Text(r#"{"a":1}"#.into()));
    }

    #[test]
    fn test_history_body_keeps_body_order() {
        let body: Value = serde_json::from_str(
            r#"{
                "z": {"id":"pwr.v","timestamp":2,"value":1},
                "a": {"id":"pwr.v","timestamp":1,"value":2},
                "m": "garbage"
            }"#,
        )
        .unwrap();

        let records = decode_history_body(body).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].sort_key(), Some(2));
        assert_eq!(records[1].sort_key(), Some(1));
        assert_eq!(records[2].id, MISSING_ID);
    }

    #[test]
    fn test_history_body_must_be_object() {
        let err = decode_history_body(json!([1, 2, 3])).unwrap_err();
        match err {
            ViewerError::Payload(msg) => assert!(msg.contains("array")),
            other => panic!("Expected Payload error, got: {:?}", other),
        }
    }
}

//! Line decoder for newline-delimited tracer output
//!
//! Each input line is one JSON object emitted by the packet-level tracer.
//! Lines that cannot be decoded are logged and skipped; the stream never
//! terminates because of bad input.

use serde_json::{Map, Value};

/// One decoded tracer event: the raw JSON object plus the connection id
/// extracted from its `conn` field. Everything besides the few fields the
/// aggregator inspects passes through opaquely into the uploaded payload.
#[derive(Debug, Clone)]
pub struct TraceEvent {
    pub conn_id: i64,
    pub raw: Map<String, Value>,
}

impl TraceEvent {
    pub fn event_type(&self) -> Option<&str> {
        self.raw.get("type").and_then(Value::as_str)
    }

    pub fn time_ms(&self) -> Option<i64> {
        self.raw.get("time").and_then(Value::as_i64)
    }

    pub fn packet_number(&self) -> Option<i64> {
        self.raw.get("pn").and_then(Value::as_i64)
    }
}

/// Decode one input line.
///
/// Returns `None` for every line the aggregator should skip:
/// - malformed JSON or a non-object top level (logged with the line),
/// - a missing `conn` field (benign, e.g. process-level events),
/// - a `conn` field that is not an integer (logged loudly; the upstream
///   contract says this should not happen, but one bad line must not take
///   the whole collector down).
pub fn decode_line(line: &str) -> Option<TraceEvent> {
    let raw: Map<String, Value> = match serde_json::from_str::<Value>(line) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            log::warn!("Skipping non-object JSON line '{}': got {}", line.trim_end(), type_name(&other));
            return None;
        }
        Err(e) => {
            log::warn!("Cannot parse JSON line '{}': {}", line.trim_end(), e);
            return None;
        }
    };

    let conn = raw.get("conn")?;
    let conn_id = match conn.as_i64() {
        Some(id) => id,
        None => {
            log::error!("Skipping event with non-integer connection id: {}", conn);
            return None;
        }
    };

    Some(TraceEvent { conn_id, raw })
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

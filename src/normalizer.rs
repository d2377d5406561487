//! Event normalization
//!
//! Recorder payloads arrive in more than one shape: fields may sit inside a
//! nested payload object (`data`) or be flattened onto the record itself, and
//! the event kind may be a numeric code or a name. This module resolves every
//! raw record into one canonical [`Event`].
//!
//! Field lookup contract, for every canonical field:
//! 1. the nested payload object
//! 2. the top-level record
//! 3. the caller-supplied fallback
//!
//! Records without a usable timestamp are dropped from the timeline.

use crate::error::AnalysisError;
use crate::types::{Event, EventKind};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value};

/// Keys under which recorders nest the event payload, in lookup order
const PAYLOAD_KEYS: [&str; 2] = ["data", "payload"];

/// Keys carrying the event kind, in lookup order
const KIND_KEYS: [&str; 2] = ["event_type", "type"];

const URL_KEYS: [&str; 3] = ["url", "href", "page"];
const ELEMENT_KEYS: [&str; 2] = ["selector", "element"];
const FIELD_KEYS: [&str; 3] = ["selector", "element", "field"];
const VALUE_KEYS: [&str; 2] = ["value", "text"];
const DEPTH_KEYS: [&str; 3] = ["scrollDepth", "depth", "percentage"];
const MESSAGE_KEYS: [&str; 2] = ["message", "error"];
const SOURCE_KEYS: [&str; 2] = ["source", "filename"];
const LINE_KEYS: [&str; 2] = ["lineno", "line"];
const NAME_KEYS: [&str; 2] = ["name", "event"];

/// Read-only view over one raw recorder record
#[derive(Debug, Clone, Copy)]
pub struct RawRecord<'a> {
    record: &'a Map<String, Value>,
    payload: Option<&'a Map<String, Value>>,
}

impl<'a> RawRecord<'a> {
    /// Wrap a JSON value; non-objects have no fields
    pub fn new(value: &'a Value) -> Option<Self> {
        let record = value.as_object()?;
        let payload = PAYLOAD_KEYS
            .iter()
            .find_map(|key| record.get(*key).and_then(Value::as_object));
        Some(Self { record, payload })
    }

    /// Resolve a field: payload first, then the top-level record.
    ///
    /// `null` counts as absent at both levels.
    pub fn field(&self, name: &str) -> Option<&'a Value> {
        self.payload
            .and_then(|p| p.get(name))
            .filter(|v| !v.is_null())
            .or_else(|| self.record.get(name).filter(|v| !v.is_null()))
    }

    /// Resolve a field, returning `fallback` when it is missing
    pub fn field_or(&self, name: &str, fallback: &'a Value) -> &'a Value {
        self.field(name).unwrap_or(fallback)
    }

    /// First non-empty string among synonym fields
    pub fn text(&self, names: &[&str]) -> Option<String> {
        names
            .iter()
            .filter_map(|name| self.field(name))
            .filter_map(value_to_text)
            .find(|s| !s.is_empty())
    }

    /// First numeric reading among synonym fields
    pub fn number(&self, names: &[&str]) -> Option<f64> {
        names
            .iter()
            .filter_map(|name| self.field(name))
            .find_map(value_to_number)
    }

    /// Event kind from `event_type`, then `type`
    pub fn kind(&self) -> EventKind {
        KIND_KEYS
            .iter()
            .filter_map(|key| self.record.get(*key))
            .find_map(|value| match value {
                Value::Number(n) => n.as_i64().map(EventKind::from_code),
                Value::String(s) => Some(EventKind::from_name(s)),
                _ => None,
            })
            .unwrap_or(EventKind::Other)
    }

    /// Event timestamp, `None` when missing or unparsable
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.record.get("timestamp").and_then(parse_timestamp)
    }
}

/// Normalizer turning raw recorder records into a sorted canonical timeline
pub struct EventNormalizer;

impl EventNormalizer {
    /// Normalize a single record. Returns `None` when the record has no
    /// usable timestamp or is not a JSON object.
    pub fn normalize_record(value: &Value) -> Option<Event> {
        let raw = RawRecord::new(value)?;
        let timestamp = raw.timestamp()?;

        Some(Event {
            kind: raw.kind(),
            timestamp,
            url: raw.text(&URL_KEYS),
            element: raw.text(&ELEMENT_KEYS),
            field: raw.text(&FIELD_KEYS),
            value: raw.text(&VALUE_KEYS),
            scroll_depth: raw.number(&DEPTH_KEYS),
            message: raw.text(&MESSAGE_KEYS),
            source: raw.text(&SOURCE_KEYS),
            line: raw.text(&LINE_KEYS),
            name: raw.text(&NAME_KEYS),
            action: raw.text(&["action"]),
        })
    }

    /// Normalize and sort a batch of records.
    ///
    /// Records without a valid timestamp are excluded; the sort is stable so
    /// events sharing a timestamp keep their recorded order.
    pub fn normalize(records: &[Value]) -> Vec<Event> {
        let mut dropped = 0usize;
        let mut events: Vec<Event> = records
            .iter()
            .filter_map(|record| {
                let event = Self::normalize_record(record);
                if event.is_none() {
                    dropped += 1;
                }
                event
            })
            .collect();

        if dropped > 0 {
            tracing::warn!(
                dropped,
                kept = events.len(),
                "Dropped events without a usable timestamp"
            );
        }

        sort_events(&mut events);
        events
    }

    /// Parse a JSON array of records and normalize it
    pub fn parse_array(json: &str) -> Result<Vec<Event>, AnalysisError> {
        let records: Vec<Value> = serde_json::from_str(json)?;
        Ok(Self::normalize(&records))
    }

    /// Parse NDJSON (one record per line) and normalize it
    pub fn parse_ndjson(ndjson: &str) -> Result<Vec<Event>, AnalysisError> {
        let mut records = Vec::new();
        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let record: Value = serde_json::from_str(trimmed).map_err(|e| {
                AnalysisError::ParseError(format!("Failed to parse line {}: {}", line_num + 1, e))
            })?;
            records.push(record);
        }
        Ok(Self::normalize(&records))
    }
}

/// Stable ascending sort by timestamp
pub fn sort_events(events: &mut [Event]) {
    events.sort_by_key(|e| e.timestamp);
}

/// Parse a recorder timestamp: RFC 3339, `YYYY-MM-DD HH:MM:SS[.fff]` (UTC),
/// or epoch milliseconds as a number or numeric string.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        Value::String(s) => parse_timestamp_str(s.trim()),
        _ => None,
    }
}

pub(crate) fn parse_timestamp_str(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    s.parse::<i64>()
        .ok()
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
}

fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn value_to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite())
}

/*!
 * Timed Events
 * Nestable sub-operation timing records within a transaction
 */

use crate::core::types::{DurationMs, GcDurationMs};
use crate::data::Value;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Interpretation of an event body, carried through serialization as a
/// stable integer id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum BodyFormat {
    /// Plain text
    Plain,
    /// An SQL statement (may be scrubbed downstream)
    Sql,
    /// A rendered template
    RenderedTemplate,
}

impl From<BodyFormat> for u8 {
    fn from(format: BodyFormat) -> u8 {
        match format {
            BodyFormat::Plain => 0,
            BodyFormat::Sql => 1,
            BodyFormat::RenderedTemplate => 2,
        }
    }
}

impl TryFrom<u8> for BodyFormat {
    type Error = String;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        match id {
            0 => Ok(BodyFormat::Plain),
            1 => Ok(BodyFormat::Sql),
            2 => Ok(BodyFormat::RenderedTemplate),
            other => Err(format!("unknown body format id {}", other)),
        }
    }
}

/// Event body: raw text or a composed structured payload.
///
/// The serializer handles both through one code path; the text/structured
/// distinction survives serialization via the tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "content", rename_all = "snake_case")]
pub enum EventBody {
    Text(String),
    Structured(Value),
}

impl From<&str> for EventBody {
    fn from(text: &str) -> Self {
        EventBody::Text(text.to_string())
    }
}

impl From<String> for EventBody {
    fn from(text: String) -> Self {
        EventBody::Text(text)
    }
}

impl From<Value> for EventBody {
    fn from(value: Value) -> Self {
        EventBody::Structured(value)
    }
}

/// A finished timed event within a transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Event {
    pub name: String,
    pub title: String,
    pub body: EventBody,
    pub body_format: BodyFormat,
    /// Start of the event relative to the transaction start
    pub start_offset_ms: DurationMs,
    pub duration_ms: DurationMs,
    /// Garbage collection time attributed to this event, supplied by the
    /// caller as deltas of its cumulative GC clock
    pub gc_duration_ms: GcDurationMs,
}

/// An event pushed by start_event and not yet finished
#[derive(Debug)]
pub(crate) struct OpenEvent {
    pub(crate) name: String,
    pub(crate) started_at: Instant,
    pub(crate) start_offset_ms: DurationMs,
    pub(crate) gc_at_start_ms: GcDurationMs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_format_ids_are_stable() {
        assert_eq!(u8::from(BodyFormat::Plain), 0);
        assert_eq!(u8::from(BodyFormat::Sql), 1);
        assert_eq!(u8::from(BodyFormat::RenderedTemplate), 2);
        assert_eq!(BodyFormat::try_from(1), Ok(BodyFormat::Sql));
        assert!(BodyFormat::try_from(9).is_err());
    }

    #[test]
    fn test_body_format_serializes_as_integer() {
        let json = serde_json::to_string(&BodyFormat::Sql).unwrap();
        assert_eq!(json, "1");
        let parsed: BodyFormat = serde_json::from_str("2").unwrap();
        assert_eq!(parsed, BodyFormat::RenderedTemplate);
    }

    #[test]
    fn test_event_body_distinction_survives_serialization() {
        let text: EventBody = "SELECT 1".into();
        let json = serde_json::to_string(&text).unwrap();
        assert_eq!(json, r#"{"kind":"text","content":"SELECT 1"}"#);

        let mut payload = Value::new_map();
        payload.set_string("statement", "SELECT 1").unwrap();
        let structured: EventBody = payload.into();
        let json = serde_json::to_string(&structured).unwrap();
        assert_eq!(
            json,
            r#"{"kind":"structured","content":{"statement":"SELECT 1"}}"#
        );

        let roundtrip: EventBody = serde_json::from_str(&json).unwrap();
        assert_eq!(roundtrip, structured);
    }

    #[test]
    fn test_event_record_shape() {
        let event = Event {
            name: "sql".to_string(),
            title: "SELECT 1".to_string(),
            body: "SELECT 1".into(),
            body_format: BodyFormat::Sql,
            start_offset_ms: 1.5,
            duration_ms: 4.0,
            gc_duration_ms: 0.0,
        };

        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(
            json,
            r#"{"name":"sql","title":"SELECT 1","body":{"kind":"text","content":"SELECT 1"},"body_format":1,"start_offset_ms":1.5,"duration_ms":4.0,"gc_duration_ms":0.0}"#
        );
    }
}

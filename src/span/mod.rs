/*!
 * Spans
 * Distributed-trace tree nodes, independent of transactions
 *
 * Every span carries the trace id of its tree and its own span id;
 * children hold the parent's id as a back-reference only. There is no
 * owning pointer between spans, so closing a parent never closes or
 * invalidates its children.
 */

mod id;

pub use id::{SpanId, TraceId};

use crate::agent::AgentShared;
use crate::core::errors::{DataError, Result, SpanError};
use crate::core::json;
use crate::core::types::{elapsed_ms, now_epoch_ms, DurationMs, TimestampMs};
use crate::data::{ErrorDetails, Value};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Span lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanState {
    Open,
    Closed,
}

/// A typed span attribute; the later write's type wins per key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    String(String),
    Int(i64),
    Bool(bool),
    Double(f64),
}

/// A node in a distributed trace tree
pub struct Span {
    trace_id: TraceId,
    id: SpanId,
    parent_id: Option<SpanId>,
    namespace: String,
    name: Option<String>,
    attributes: Vec<(String, AttributeValue)>,
    error: Option<ErrorDetails>,
    sample_data: BTreeMap<String, Value>,
    started_at: Instant,
    start_ms: TimestampMs,
    duration_ms: Option<DurationMs>,
    state: SpanState,
    agent: Arc<AgentShared>,
}

impl Span {
    pub(crate) fn root(agent: Arc<AgentShared>, namespace: impl Into<String>) -> Self {
        let trace_id = TraceId::generate();
        let id = SpanId::generate();
        let namespace = namespace.into();
        debug!(trace_id = %trace_id, span_id = %id, namespace = %namespace, "root span opened");
        Self::open(agent, trace_id, id, None, namespace)
    }

    /// Create a child span in the same trace. The child records this span's
    /// id and nothing else of it; its lifetime is independent.
    pub fn child(&self) -> Result<Span> {
        self.ensure_open("child")?;
        let id = SpanId::generate();
        debug!(trace_id = %self.trace_id, span_id = %id, parent_span_id = %self.id, "child span opened");
        Ok(Self::open(
            Arc::clone(&self.agent),
            self.trace_id.clone(),
            id,
            Some(self.id.clone()),
            self.namespace.clone(),
        ))
    }

    fn open(
        agent: Arc<AgentShared>,
        trace_id: TraceId,
        id: SpanId,
        parent_id: Option<SpanId>,
        namespace: String,
    ) -> Self {
        Self {
            trace_id,
            id,
            parent_id,
            namespace,
            name: None,
            attributes: Vec::new(),
            error: None,
            sample_data: BTreeMap::new(),
            started_at: Instant::now(),
            start_ms: now_epoch_ms(),
            duration_ms: None,
            state: SpanState::Open,
            agent,
        }
    }

    #[inline]
    pub fn trace_id(&self) -> &TraceId {
        &self.trace_id
    }

    #[inline]
    pub fn id(&self) -> &SpanId {
        &self.id
    }

    #[inline]
    pub fn parent_id(&self) -> Option<&SpanId> {
        self.parent_id.as_ref()
    }

    #[inline]
    pub fn state(&self) -> SpanState {
        self.state
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.state == SpanState::Closed
    }

    pub fn set_name(&mut self, name: impl Into<String>) -> Result<()> {
        self.ensure_open("set_name")?;
        self.name = Some(name.into());
        Ok(())
    }

    pub fn set_namespace(&mut self, namespace: impl Into<String>) -> Result<()> {
        self.ensure_open("set_namespace")?;
        self.namespace = namespace.into();
        Ok(())
    }

    // Typed attributes: last write wins per key, regardless of the type of
    // any prior write under the same key.

    pub fn set_attribute_string(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<()> {
        self.set_attribute(key.into(), AttributeValue::String(value.into()))
    }

    pub fn set_attribute_int(&mut self, key: impl Into<String>, value: i64) -> Result<()> {
        self.set_attribute(key.into(), AttributeValue::Int(value))
    }

    pub fn set_attribute_bool(&mut self, key: impl Into<String>, value: bool) -> Result<()> {
        self.set_attribute(key.into(), AttributeValue::Bool(value))
    }

    pub fn set_attribute_double(&mut self, key: impl Into<String>, value: f64) -> Result<()> {
        if !value.is_finite() {
            return Err(
                DataError::InvalidArgumentType(format!("non-finite float {}", value)).into(),
            );
        }
        self.set_attribute(key.into(), AttributeValue::Double(value))
    }

    fn set_attribute(&mut self, key: String, value: AttributeValue) -> Result<()> {
        self.ensure_open("set_attribute")?;
        if let Some(entry) = self.attributes.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.attributes.push((key, value));
        }
        Ok(())
    }

    /// At most one error per span; a second call overwrites the first
    pub fn add_error(
        &mut self,
        name: impl Into<String>,
        message: impl Into<String>,
        backtrace: Value,
    ) -> Result<()> {
        self.ensure_open("add_error")?;
        self.error = Some(ErrorDetails::new(name, message, backtrace));
        Ok(())
    }

    /// Attach a sample-data payload under a key, overwrite semantics.
    /// Takes ownership of the value.
    pub fn set_sample_data(&mut self, key: impl Into<String>, payload: Value) -> Result<()> {
        self.ensure_open("set_sample_data")?;
        self.sample_data.insert(key.into(), payload);
        Ok(())
    }

    /// Canonical JSON record, valid any time including before close
    pub fn to_json(&self) -> Result<String> {
        let record = SpanRecord {
            trace_id: &self.trace_id,
            span_id: &self.id,
            parent_span_id: self.parent_id.as_ref(),
            namespace: &self.namespace,
            name: self.name.as_deref(),
            start_ms: self.start_ms,
            duration_ms: self.duration_ms,
            closed: self.is_closed(),
            attributes: AttributeMap(&self.attributes),
            error: self.error.as_ref(),
            sample_data: &self.sample_data,
        };
        Ok(json::to_string(&record)?)
    }

    /// Close the span and hand its record to the exporter. Children remain
    /// open and mutable; further mutation of this span fails.
    pub fn close(&mut self) -> Result<()> {
        self.ensure_open("close")?;
        self.duration_ms = Some(elapsed_ms(self.started_at));
        self.state = SpanState::Closed;
        let record = self.to_json()?;
        self.agent.exporter.export_span(&record);
        debug!(
            trace_id = %self.trace_id,
            span_id = %self.id,
            duration_ms = self.duration_ms,
            "span closed"
        );
        Ok(())
    }

    fn ensure_open(&self, operation: &str) -> Result<()> {
        if self.state == SpanState::Open {
            Ok(())
        } else {
            Err(SpanError::ClosedSpanMutation(operation.to_string()).into())
        }
    }
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Span")
            .field("trace_id", &self.trace_id)
            .field("id", &self.id)
            .field("parent_id", &self.parent_id)
            .field("state", &self.state)
            .finish()
    }
}

/// Attribute list serialized as a JSON object in insertion order
struct AttributeMap<'a>(&'a [(String, AttributeValue)]);

impl Serialize for AttributeMap<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Canonical wire shape; field order is the serialization order
#[derive(Serialize)]
#[serde(rename_all = "snake_case")]
struct SpanRecord<'a> {
    trace_id: &'a TraceId,
    span_id: &'a SpanId,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_span_id: Option<&'a SpanId>,
    namespace: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    start_ms: TimestampMs,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_ms: Option<DurationMs>,
    closed: bool,
    attributes: AttributeMap<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a ErrorDetails>,
    sample_data: &'a BTreeMap<String, Value>,
}

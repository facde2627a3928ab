/*!
 * Transactions
 * The monitored unit of work: ordered timed events, an error slot,
 * metadata, and sample data, serialized to one record at the end
 *
 * Lifecycle: Created -> Finished -> Completed. No transition skips
 * Finished; Completed is terminal. A transaction is single-owner state;
 * every mutation takes &mut self.
 */

mod event;

pub use event::{BodyFormat, Event, EventBody};

use crate::agent::AgentShared;
use crate::core::errors::{Result, TransactionError};
use crate::core::json;
use crate::core::types::{elapsed_ms, now_epoch_ms, DurationMs, GcDurationMs, TimestampMs};
use crate::data::{ErrorDetails, Value};
use event::OpenEvent;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Transaction lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionState {
    Created,
    Finished,
    Completed,
}

/// A monitored unit of work (one request, one job)
pub struct Transaction {
    id: String,
    namespace: String,
    action: Option<String>,
    queue_start_ms: Option<TimestampMs>,
    metadata: BTreeMap<String, String>,
    sample_data: BTreeMap<String, Value>,
    error: Option<ErrorDetails>,
    events: Vec<Event>,
    open_events: Vec<OpenEvent>,
    state: TransactionState,
    started_at: Instant,
    start_ms: TimestampMs,
    gc_at_create_ms: GcDurationMs,
    gc_duration_ms: GcDurationMs,
    duration_ms: Option<DurationMs>,
    sampled: Option<bool>,
    agent: Arc<AgentShared>,
}

impl Transaction {
    pub(crate) fn start(
        agent: Arc<AgentShared>,
        id: impl Into<String>,
        namespace: impl Into<String>,
        gc_duration_ms: GcDurationMs,
    ) -> Self {
        let id = id.into();
        let namespace = namespace.into();
        debug!(transaction_id = %id, namespace = %namespace, "transaction started");
        Self {
            id,
            namespace,
            action: None,
            queue_start_ms: None,
            metadata: BTreeMap::new(),
            sample_data: BTreeMap::new(),
            error: None,
            events: Vec::new(),
            open_events: Vec::new(),
            state: TransactionState::Created,
            started_at: Instant::now(),
            start_ms: now_epoch_ms(),
            gc_at_create_ms: gc_duration_ms,
            gc_duration_ms: 0.0,
            duration_ms: None,
            sampled: None,
            agent,
        }
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[inline]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    #[inline]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Sampling decision, available after finish
    #[inline]
    pub fn sampled(&self) -> Option<bool> {
        self.sampled
    }

    /// Finished events recorded so far, in completion order
    #[inline]
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    // Attribute setters: last-write-wins, valid until finish

    pub fn set_action(&mut self, action: impl Into<String>) -> Result<()> {
        self.ensure_mutable("set_action")?;
        self.action = Some(action.into());
        Ok(())
    }

    pub fn set_namespace(&mut self, namespace: impl Into<String>) -> Result<()> {
        self.ensure_mutable("set_namespace")?;
        self.namespace = namespace.into();
        Ok(())
    }

    /// Epoch milliseconds at which the unit of work was enqueued
    pub fn set_queue_start(&mut self, queue_start_ms: TimestampMs) -> Result<()> {
        self.ensure_mutable("set_queue_start")?;
        self.queue_start_ms = Some(queue_start_ms);
        Ok(())
    }

    pub fn set_metadata(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<()> {
        self.ensure_mutable("set_metadata")?;
        self.metadata.insert(key.into(), value.into());
        Ok(())
    }

    /// At most one error per transaction; a second call overwrites the first
    pub fn set_error(
        &mut self,
        name: impl Into<String>,
        message: impl Into<String>,
        backtrace: Value,
    ) -> Result<()> {
        self.ensure_mutable("set_error")?;
        self.error = Some(ErrorDetails::new(name, message, backtrace));
        Ok(())
    }

    /// Merge a payload into the sample data, last-write-wins per key.
    /// Takes ownership of the value.
    pub fn set_sample_data(&mut self, key: impl Into<String>, payload: Value) -> Result<()> {
        self.ensure_mutable("set_sample_data")?;
        self.sample_data.insert(key.into(), payload);
        Ok(())
    }

    // Event stack

    /// Push a new open event. The caller passes its cumulative GC clock;
    /// the delta observed at finish_event is attributed to the event.
    pub fn start_event(
        &mut self,
        name: impl Into<String>,
        gc_duration_ms: GcDurationMs,
    ) -> Result<()> {
        if self.state != TransactionState::Created {
            return Err(TransactionError::StackCorruption(
                "start_event on a finished transaction".to_string(),
            )
            .into());
        }
        self.open_events.push(OpenEvent {
            name: name.into(),
            started_at: Instant::now(),
            start_offset_ms: elapsed_ms(self.started_at),
            gc_at_start_ms: gc_duration_ms,
        });
        Ok(())
    }

    /// Close the most recently started open event. Finishing any other
    /// event is a LIFO violation.
    pub fn finish_event(
        &mut self,
        name: &str,
        title: impl Into<String>,
        body: impl Into<EventBody>,
        body_format: BodyFormat,
        gc_duration_ms: GcDurationMs,
    ) -> Result<()> {
        self.ensure_mutable("finish_event")?;
        let open = match self.open_events.pop() {
            Some(open) => open,
            None => return Err(TransactionError::EventStackUnderflow.into()),
        };
        if open.name != name {
            let error = TransactionError::EventStackMismatch(format!(
                "tried to finish {:?} while {:?} is the open event",
                name, open.name
            ));
            self.open_events.push(open);
            return Err(error.into());
        }

        self.events.push(Event {
            name: open.name,
            title: title.into(),
            body: body.into(),
            body_format,
            start_offset_ms: open.start_offset_ms,
            duration_ms: elapsed_ms(open.started_at),
            gc_duration_ms: (gc_duration_ms - open.gc_at_start_ms).max(0.0),
        });
        Ok(())
    }

    /// Append a fully-formed event directly, bypassing the stack. The event
    /// is timestamped as ending now minus `duration_ms`.
    pub fn record_event(
        &mut self,
        name: impl Into<String>,
        title: impl Into<String>,
        body: impl Into<EventBody>,
        body_format: BodyFormat,
        duration_ms: DurationMs,
        gc_duration_ms: GcDurationMs,
    ) -> Result<()> {
        self.ensure_mutable("record_event")?;
        let end_offset_ms = elapsed_ms(self.started_at);
        self.events.push(Event {
            name: name.into(),
            title: title.into(),
            body: body.into(),
            body_format,
            start_offset_ms: (end_offset_ms - duration_ms).max(0.0),
            duration_ms,
            gc_duration_ms,
        });
        Ok(())
    }

    // Lifecycle

    /// Finish the transaction and return the sampling decision.
    ///
    /// The decision comes from the exporter; policy lives outside this core.
    pub fn finish(&mut self, gc_duration_ms: GcDurationMs) -> Result<bool> {
        if self.state != TransactionState::Created {
            return Err(TransactionError::AlreadyFinished("finish".to_string()).into());
        }
        if !self.open_events.is_empty() {
            return Err(TransactionError::UnbalancedEventStack(format!(
                "{} event(s) still open",
                self.open_events.len()
            ))
            .into());
        }

        self.duration_ms = Some(elapsed_ms(self.started_at));
        self.gc_duration_ms = (gc_duration_ms - self.gc_at_create_ms).max(0.0);
        let sampled = self.agent.exporter.should_sample(&self.id, &self.namespace);
        self.sampled = Some(sampled);
        self.state = TransactionState::Finished;
        debug!(
            transaction_id = %self.id,
            namespace = %self.namespace,
            duration_ms = self.duration_ms,
            sampled,
            "transaction finished"
        );
        Ok(sampled)
    }

    /// Mark the transaction fully done and hand the record to the exporter
    /// when it was sampled. Requires a prior finish; terminal.
    pub fn complete(&mut self) -> Result<()> {
        match self.state {
            TransactionState::Created => {
                Err(TransactionError::NotFinished("complete".to_string()).into())
            }
            TransactionState::Completed => {
                Err(TransactionError::AlreadyFinished("complete".to_string()).into())
            }
            TransactionState::Finished => {
                if self.sampled == Some(true) {
                    let record = self.to_json()?;
                    self.agent.exporter.export_transaction(&record);
                }
                self.state = TransactionState::Completed;
                debug!(transaction_id = %self.id, "transaction completed");
                Ok(())
            }
        }
    }

    /// Canonical JSON record. Before finish this is an in-flight snapshot;
    /// the exporter only ever receives it from complete.
    pub fn to_json(&self) -> Result<String> {
        let record = TransactionRecord {
            id: &self.id,
            namespace: &self.namespace,
            action: self.action.as_deref(),
            queue_start_ms: self.queue_start_ms,
            start_ms: self.start_ms,
            duration_ms: self.duration_ms,
            gc_duration_ms: self.gc_duration_ms,
            metadata: &self.metadata,
            sample_data: &self.sample_data,
            error: self.error.as_ref(),
            events: &self.events,
            sampled: self.sampled,
        };
        Ok(json::to_string(&record)?)
    }

    fn ensure_mutable(&self, operation: &str) -> Result<()> {
        if self.state == TransactionState::Created {
            Ok(())
        } else {
            Err(TransactionError::AlreadyFinished(operation.to_string()).into())
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("namespace", &self.namespace)
            .field("state", &self.state)
            .field("events", &self.events.len())
            .field("open_events", &self.open_events.len())
            .finish()
    }
}

/// Canonical wire shape; field order is the serialization order
#[derive(Serialize)]
#[serde(rename_all = "snake_case")]
struct TransactionRecord<'a> {
    id: &'a str,
    namespace: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    action: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    queue_start_ms: Option<TimestampMs>,
    start_ms: TimestampMs,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_ms: Option<DurationMs>,
    gc_duration_ms: GcDurationMs,
    metadata: &'a BTreeMap<String, String>,
    sample_data: &'a BTreeMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a ErrorDetails>,
    events: &'a [Event],
    #[serde(skip_serializing_if = "Option::is_none")]
    sampled: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{Agent, AgentConfig, NullExporter};
    use crate::core::errors::ProbeError;
    use std::sync::Arc;

    fn started_agent() -> Agent {
        let agent = Agent::new(AgentConfig::new("test-app"), Arc::new(NullExporter));
        agent.start();
        agent
    }

    fn transaction(agent: &Agent) -> Transaction {
        agent
            .start_transaction("tx-1", "http", 0.0)
            .expect("agent is started")
    }

    #[test]
    fn test_lifo_event_nesting_succeeds() {
        let agent = started_agent();
        let mut tx = transaction(&agent);

        tx.start_event("outer", 0.0).unwrap();
        tx.start_event("inner", 0.0).unwrap();
        tx.finish_event("inner", "inner title", "body", BodyFormat::Plain, 0.0)
            .unwrap();
        tx.finish_event("outer", "outer title", "body", BodyFormat::Plain, 0.0)
            .unwrap();

        assert_eq!(tx.events().len(), 2);
        assert_eq!(tx.events()[0].name, "inner");
        assert_eq!(tx.events()[1].name, "outer");
    }

    #[test]
    fn test_out_of_order_finish_is_a_mismatch() {
        let agent = started_agent();
        let mut tx = transaction(&agent);

        tx.start_event("a", 0.0).unwrap();
        tx.start_event("b", 0.0).unwrap();

        let err = tx
            .finish_event("a", "title", "body", BodyFormat::Plain, 0.0)
            .unwrap_err();
        assert!(matches!(
            err,
            ProbeError::Transaction(TransactionError::EventStackMismatch(_))
        ));

        // The stack is intact: the correct order still succeeds
        tx.finish_event("b", "title", "body", BodyFormat::Plain, 0.0)
            .unwrap();
        tx.finish_event("a", "title", "body", BodyFormat::Plain, 0.0)
            .unwrap();
    }

    #[test]
    fn test_finish_event_on_empty_stack_underflows() {
        let agent = started_agent();
        let mut tx = transaction(&agent);

        let err = tx
            .finish_event("sql", "title", "body", BodyFormat::Plain, 0.0)
            .unwrap_err();
        assert!(matches!(
            err,
            ProbeError::Transaction(TransactionError::EventStackUnderflow)
        ));
    }

    #[test]
    fn test_finish_with_open_event_is_unbalanced() {
        let agent = started_agent();
        let mut tx = transaction(&agent);

        tx.start_event("sql", 0.0).unwrap();
        let err = tx.finish(0.0).unwrap_err();
        assert!(matches!(
            err,
            ProbeError::Transaction(TransactionError::UnbalancedEventStack(_))
        ));
    }

    #[test]
    fn test_double_finish_fails_without_double_counting() {
        let agent = started_agent();
        let mut tx = transaction(&agent);

        tx.start_event("sql", 0.0).unwrap();
        tx.finish_event("sql", "SELECT 1", "SELECT 1", BodyFormat::Sql, 0.0)
            .unwrap();
        tx.finish(0.0).unwrap();

        let err = tx.finish(0.0).unwrap_err();
        assert!(matches!(
            err,
            ProbeError::Transaction(TransactionError::AlreadyFinished(_))
        ));
        assert_eq!(tx.events().len(), 1);
    }

    #[test]
    fn test_start_event_after_finish_is_stack_corruption() {
        let agent = started_agent();
        let mut tx = transaction(&agent);

        tx.finish(0.0).unwrap();
        let err = tx.start_event("late", 0.0).unwrap_err();
        assert!(matches!(
            err,
            ProbeError::Transaction(TransactionError::StackCorruption(_))
        ));
    }

    #[test]
    fn test_mutation_after_finish_fails() {
        let agent = started_agent();
        let mut tx = transaction(&agent);
        tx.finish(0.0).unwrap();

        assert!(tx.set_action("late").is_err());
        assert!(tx.set_metadata("k", "v").is_err());
        assert!(tx
            .record_event("r", "t", "b", BodyFormat::Plain, 1.0, 0.0)
            .is_err());
    }

    #[test]
    fn test_complete_requires_finish() {
        let agent = started_agent();
        let mut tx = transaction(&agent);

        let err = tx.complete().unwrap_err();
        assert!(matches!(
            err,
            ProbeError::Transaction(TransactionError::NotFinished(_))
        ));

        tx.finish(0.0).unwrap();
        tx.complete().unwrap();

        let err = tx.complete().unwrap_err();
        assert!(matches!(
            err,
            ProbeError::Transaction(TransactionError::AlreadyFinished(_))
        ));
    }

    #[test]
    fn test_setters_are_last_write_wins() {
        let agent = started_agent();
        let mut tx = transaction(&agent);

        tx.set_action("first").unwrap();
        tx.set_action("second").unwrap();
        tx.set_metadata("path", "/a").unwrap();
        tx.set_metadata("path", "/b").unwrap();

        let mut backtrace = Value::new_array();
        backtrace.append_string("app.rb:1").unwrap();
        tx.set_error("First", "one", Value::new_array()).unwrap();
        tx.set_error("Second", "two", backtrace).unwrap();

        tx.finish(0.0).unwrap();
        let record = tx.to_json().unwrap();
        assert!(record.contains(r#""action":"second""#));
        assert!(record.contains(r#""path":"/b""#));
        assert!(record.contains(r#""name":"Second""#));
        assert!(!record.contains("First"));
    }

    #[test]
    fn test_gc_duration_is_a_delta_of_the_cumulative_clock() {
        let agent = started_agent();
        let mut tx = agent.start_transaction("tx-gc", "http", 10.0).unwrap();

        tx.start_event("sql", 12.0).unwrap();
        tx.finish_event("sql", "SELECT 1", "SELECT 1", BodyFormat::Sql, 15.0)
            .unwrap();
        tx.finish(18.0).unwrap();

        assert_eq!(tx.events()[0].gc_duration_ms, 3.0);
        let record = tx.to_json().unwrap();
        assert!(record.contains(r#""gc_duration_ms":8.0"#));
    }

    #[test]
    fn test_record_event_bypasses_the_stack() {
        let agent = started_agent();
        let mut tx = transaction(&agent);

        tx.record_event("cache", "get", "key", BodyFormat::Plain, 2.5, 0.0)
            .unwrap();
        tx.finish(0.0).unwrap();

        assert_eq!(tx.events().len(), 1);
        assert_eq!(tx.events()[0].duration_ms, 2.5);
    }

    #[test]
    fn test_record_shape_after_finish() {
        let agent = started_agent();
        let mut tx = transaction(&agent);

        tx.set_action("HomeController#index").unwrap();
        tx.set_queue_start(1_700_000_000_000).unwrap();

        let mut params = Value::new_map();
        params.set_string("id", "42").unwrap();
        tx.set_sample_data("params", params).unwrap();

        let sampled = tx.finish(0.0).unwrap();
        assert!(sampled); // NullExporter samples everything

        let record = tx.to_json().unwrap();
        assert!(record.starts_with(r#"{"id":"tx-1","namespace":"http""#));
        assert!(record.contains(r#""action":"HomeController#index""#));
        assert!(record.contains(r#""queue_start_ms":1700000000000"#));
        assert!(record.contains(r#""sample_data":{"params":{"id":"42"}}"#));
        assert!(record.contains(r#""sampled":true"#));
    }
}

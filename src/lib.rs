/*!
 * Probe Core Library
 * In-process instrumentation core: transactions, timed events, spans,
 * and metrics, handed to an external agent through an exporter boundary
 */

pub mod agent;
pub mod core;
pub mod data;
pub mod metrics;
pub mod span;
pub mod transaction;

// Re-exports
pub use agent::{Agent, AgentConfig, Exporter, NullExporter};
pub use crate::core::errors::{
    AgentError, DataError, MetricsError, ProbeError, Result, SpanError, TransactionError,
};
pub use crate::core::init_tracing;
pub use data::{ErrorDetails, Value, ValueKind};
pub use metrics::{MetricKind, MetricsSink, MetricsSnapshot};
pub use span::{Span, SpanId, SpanState, TraceId};
pub use transaction::{BodyFormat, Event, EventBody, Transaction, TransactionState};

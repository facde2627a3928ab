/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Value container misuse errors with serialization support
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum DataError {
    #[error("Invalid variant operation: {0}")]
    #[diagnostic(
        code(data::invalid_variant_operation),
        help("Map operations require a map value, array operations an array value.")
    )]
    InvalidVariantOperation(String),

    #[error("Invalid argument type: {0}")]
    #[diagnostic(
        code(data::invalid_argument_type),
        help("Non-finite floats are not representable. Supply a finite value.")
    )]
    InvalidArgumentType(String),
}

/// Transaction lifecycle and event nesting errors
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum TransactionError {
    #[error("Event stack corruption: {0}")]
    #[diagnostic(
        code(transaction::stack_corruption),
        help("Events cannot be started on a finished transaction.")
    )]
    StackCorruption(String),

    #[error("Event stack underflow: no open event to finish")]
    #[diagnostic(
        code(transaction::event_stack_underflow),
        help("Every finish_event call must be preceded by a matching start_event.")
    )]
    EventStackUnderflow,

    #[error("Event stack mismatch: {0}")]
    #[diagnostic(
        code(transaction::event_stack_mismatch),
        help("Events must be finished in LIFO order. Finish the most recently started event first.")
    )]
    EventStackMismatch(String),

    #[error("Unbalanced event stack: {0}")]
    #[diagnostic(
        code(transaction::unbalanced_event_stack),
        help("Finish all open events before finishing the transaction.")
    )]
    UnbalancedEventStack(String),

    #[error("Transaction already finished: {0}")]
    #[diagnostic(
        code(transaction::already_finished),
        help("A finished transaction accepts no further mutation.")
    )]
    AlreadyFinished(String),

    #[error("Transaction not finished: {0}")]
    #[diagnostic(
        code(transaction::not_finished),
        help("Call finish before completing the transaction.")
    )]
    NotFinished(String),
}

/// Span lifecycle errors
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum SpanError {
    #[error("Closed span mutation: {0}")]
    #[diagnostic(
        code(span::closed_span_mutation),
        help("A closed span accepts no further mutation or children.")
    )]
    ClosedSpanMutation(String),
}

/// Metric recording errors
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum MetricsError {
    #[error("Invalid argument type: {0}")]
    #[diagnostic(
        code(metrics::invalid_argument_type),
        help("Metric values must be finite and tag sets must be maps of scalars.")
    )]
    InvalidArgumentType(String),
}

/// Agent lifecycle errors
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum AgentError {
    #[error("Agent not started")]
    #[diagnostic(
        code(agent::not_started),
        help("Call Agent::start before creating transactions, spans, or metrics.")
    )]
    NotStarted,
}

/// Unified instrumentation error type with miette diagnostics
#[derive(Error, Debug, Diagnostic)]
pub enum ProbeError {
    #[error("Data error: {0}")]
    #[diagnostic(transparent)]
    Data(#[from] DataError),

    #[error("Transaction error: {0}")]
    #[diagnostic(transparent)]
    Transaction(#[from] TransactionError),

    #[error("Span error: {0}")]
    #[diagnostic(transparent)]
    Span(#[from] SpanError),

    #[error("Metrics error: {0}")]
    #[diagnostic(transparent)]
    Metrics(#[from] MetricsError),

    #[error("Agent error: {0}")]
    #[diagnostic(transparent)]
    Agent(#[from] AgentError),

    #[error("Serialization error: {0}")]
    #[diagnostic(
        code(probe::serialization_error),
        help("A record failed to serialize. This indicates a bug in the embedding application's payload.")
    )]
    Serialization(String),
}

impl From<super::json::JsonError> for ProbeError {
    fn from(err: super::json::JsonError) -> Self {
        ProbeError::Serialization(err.to_string())
    }
}

/// Result type for instrumentation operations
///
/// # Must Use
/// Every error in this crate signals a programming error in the embedding
/// application and must be surfaced to the caller.
pub type Result<T> = std::result::Result<T, ProbeError>;

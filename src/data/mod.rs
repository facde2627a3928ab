/*!
 * Structured Data
 * Tagged value container and shared record fragments
 */

mod value;

pub use value::{Value, ValueKind};

use serde::{Deserialize, Serialize};

/// Error attached to a transaction or span: name, message, and a structured
/// backtrace payload. At most one per record; last write wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ErrorDetails {
    pub name: String,
    pub message: String,
    pub backtrace: Value,
}

impl ErrorDetails {
    pub fn new(
        name: impl Into<String>,
        message: impl Into<String>,
        backtrace: Value,
    ) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            backtrace,
        }
    }
}

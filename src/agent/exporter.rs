/*!
 * Exporter Boundary
 * The external agent behind a narrow send/export trait
 *
 * Everything past this trait is the agent's concern: persistence,
 * transmission, retention, and retries are invisible to the core. Every
 * export call is fire-and-forget; the core never waits for acknowledgment.
 */

use crate::metrics::MetricKind;

/// External collaborator receiving finished records
pub trait Exporter: Send + Sync {
    /// Sampling decision for a finishing transaction. Policy lives outside
    /// the core; the default samples everything.
    fn should_sample(&self, _transaction_id: &str, _namespace: &str) -> bool {
        true
    }

    /// Hand off a finished transaction record
    fn export_transaction(&self, json: &str);

    /// Hand off a closed span record
    fn export_span(&self, json: &str);

    /// Hand off one metric series value; tags arrive as canonical JSON
    fn export_metric(&self, kind: MetricKind, name: &str, value: f64, tags_json: &str);

    /// Read-only lookup of operational server state
    fn server_state(&self, _key: &str) -> Option<String> {
        None
    }

    /// Free-form diagnostic report
    fn diagnose(&self) -> String {
        String::new()
    }
}

/// Exporter that discards every record
#[derive(Debug, Default, Clone, Copy)]
pub struct NullExporter;

impl Exporter for NullExporter {
    fn export_transaction(&self, _json: &str) {}

    fn export_span(&self, _json: &str) {}

    fn export_metric(&self, _kind: MetricKind, _name: &str, _value: f64, _tags_json: &str) {}
}

/*!
 * Agent Lifecycle
 * Explicit process-wide instrumentation state: started flag, the shared
 * metrics sink, and the injected exporter
 *
 * The agent is a value, not a hidden singleton; tests substitute a
 * recording exporter. Every Transaction/Span/metric entry point requires
 * a started agent and fails with NotStarted otherwise.
 */

mod config;
mod exporter;

pub use config::AgentConfig;
pub use exporter::{Exporter, NullExporter};

use crate::core::errors::{AgentError, Result};
use crate::core::types::GcDurationMs;
use crate::data::Value;
use crate::metrics::{MetricKind, MetricsSink, MetricsSnapshot};
use crate::span::Span;
use crate::transaction::Transaction;
use parking_lot::Mutex;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// State shared between the agent handle and the records it produces
pub(crate) struct AgentShared {
    pub(crate) config: AgentConfig,
    pub(crate) exporter: Arc<dyn Exporter>,
    pub(crate) started: AtomicBool,
    pub(crate) started_at: Mutex<Option<Instant>>,
    pub(crate) metrics: MetricsSink,
}

/// Process-wide instrumentation agent handle
pub struct Agent {
    shared: Arc<AgentShared>,
}

impl Agent {
    pub fn new(config: AgentConfig, exporter: Arc<dyn Exporter>) -> Self {
        Self {
            shared: Arc::new(AgentShared {
                config,
                exporter,
                started: AtomicBool::new(false),
                started_at: Mutex::new(None),
                metrics: MetricsSink::new(),
            }),
        }
    }

    /// Start the agent. Idempotent; required before any other entry point.
    pub fn start(&self) {
        if !self.shared.started.swap(true, Ordering::SeqCst) {
            *self.shared.started_at.lock() = Some(Instant::now());
            info!(app = %self.shared.config.app_name, "instrumentation agent started");
        }
    }

    /// Stop the agent, flushing accumulated metrics first. Entry points
    /// fail with NotStarted afterwards; start may be called again.
    pub fn stop(&self) {
        if self.shared.started.swap(false, Ordering::SeqCst) {
            self.flush_metrics();
            info!(app = %self.shared.config.app_name, "instrumentation agent stopped");
        }
    }

    #[inline]
    pub fn is_started(&self) -> bool {
        self.shared.started.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn config(&self) -> &AgentConfig {
        &self.shared.config
    }

    /// Create a transaction for one unit of work
    pub fn start_transaction(
        &self,
        id: impl Into<String>,
        namespace: impl Into<String>,
        gc_duration_ms: GcDurationMs,
    ) -> Result<Transaction> {
        self.ensure_started()?;
        Ok(Transaction::start(
            Arc::clone(&self.shared),
            id,
            namespace,
            gc_duration_ms,
        ))
    }

    /// Create a new root span, opening a new trace tree
    pub fn root_span(&self, namespace: impl Into<String>) -> Result<Span> {
        self.ensure_started()?;
        Ok(Span::root(Arc::clone(&self.shared), namespace))
    }

    // Metric entry points. The sink is shared; all of these may be called
    // concurrently. The tag value is owned by the call.

    pub fn set_gauge(&self, key: &str, value: f64, tags: Value) -> Result<()> {
        self.ensure_started()?;
        self.shared.metrics.set_gauge(key, value, tags)?;
        Ok(())
    }

    pub fn set_host_gauge(&self, key: &str, value: f64) -> Result<()> {
        self.ensure_started()?;
        self.shared.metrics.set_host_gauge(key, value)?;
        Ok(())
    }

    pub fn set_process_gauge(&self, key: &str, value: f64) -> Result<()> {
        self.ensure_started()?;
        self.shared.metrics.set_process_gauge(key, value)?;
        Ok(())
    }

    pub fn increment_counter(&self, key: &str, delta: f64, tags: Value) -> Result<()> {
        self.ensure_started()?;
        self.shared.metrics.increment_counter(key, delta, tags)?;
        Ok(())
    }

    pub fn add_distribution_value(&self, key: &str, value: f64, tags: Value) -> Result<()> {
        self.ensure_started()?;
        self.shared.metrics.add_distribution_value(key, value, tags)?;
        Ok(())
    }

    /// Current metric state, for inspection
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    /// Drain the sink and hand every series to the exporter
    pub fn flush_metrics(&self) {
        let snapshot = self.shared.metrics.drain();
        if snapshot.is_empty() {
            return;
        }

        let exporter = &self.shared.exporter;
        let mut exported = 0usize;
        for sample in &snapshot.counters {
            exporter.export_metric(MetricKind::Counter, &sample.name, sample.value, &sample.tags);
            exported += 1;
        }
        for sample in &snapshot.gauges {
            exporter.export_metric(MetricKind::Gauge, &sample.name, sample.value, &sample.tags);
            exported += 1;
        }
        for sample in &snapshot.host_gauges {
            exporter.export_metric(MetricKind::HostGauge, &sample.name, sample.value, &sample.tags);
            exported += 1;
        }
        for sample in &snapshot.process_gauges {
            exporter.export_metric(
                MetricKind::ProcessGauge,
                &sample.name,
                sample.value,
                &sample.tags,
            );
            exported += 1;
        }
        for series in &snapshot.distributions {
            for value in &series.values {
                exporter.export_metric(MetricKind::Distribution, &series.name, *value, &series.tags);
                exported += 1;
            }
        }
        debug!(exported, "metrics flushed to exporter");
    }

    /// Read-only operational state lookup on the exporter
    pub fn server_state(&self, key: &str) -> Option<String> {
        self.shared.exporter.server_state(key)
    }

    /// Free-form diagnostic report
    pub fn diagnose(&self) -> String {
        let config = &self.shared.config;
        let uptime_secs = self
            .shared
            .started_at
            .lock()
            .as_ref()
            .map(|at| at.elapsed().as_secs())
            .unwrap_or(0);
        let snapshot = self.shared.metrics.snapshot();

        let mut report = String::new();
        let _ = writeln!(report, "app: {}", config.app_name);
        let _ = writeln!(report, "environment: {}", config.environment);
        if let Some(hostname) = &config.hostname {
            let _ = writeln!(report, "hostname: {}", hostname);
        }
        let _ = writeln!(report, "started: {}", self.is_started());
        let _ = writeln!(report, "uptime_secs: {}", uptime_secs);
        let _ = writeln!(
            report,
            "metric_series: {}",
            snapshot.counters.len()
                + snapshot.gauges.len()
                + snapshot.host_gauges.len()
                + snapshot.process_gauges.len()
                + snapshot.distributions.len()
        );

        let exporter_report = self.shared.exporter.diagnose();
        if !exporter_report.is_empty() {
            let _ = writeln!(report, "exporter: {}", exporter_report);
        }
        report
    }

    #[inline]
    fn ensure_started(&self) -> Result<()> {
        if self.is_started() {
            Ok(())
        } else {
            Err(AgentError::NotStarted.into())
        }
    }
}

impl Clone for Agent {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::ProbeError;
    use parking_lot::Mutex;

    /// Exporter that records every boundary call
    #[derive(Default)]
    struct RecordingExporter {
        transactions: Mutex<Vec<String>>,
        spans: Mutex<Vec<String>>,
        metrics: Mutex<Vec<(MetricKind, String, f64, String)>>,
    }

    impl Exporter for RecordingExporter {
        fn export_transaction(&self, json: &str) {
            self.transactions.lock().push(json.to_string());
        }

        fn export_span(&self, json: &str) {
            self.spans.lock().push(json.to_string());
        }

        fn export_metric(&self, kind: MetricKind, name: &str, value: f64, tags_json: &str) {
            self.metrics
                .lock()
                .push((kind, name.to_string(), value, tags_json.to_string()));
        }

        fn server_state(&self, key: &str) -> Option<String> {
            (key == "ready").then(|| "true".to_string())
        }

        fn diagnose(&self) -> String {
            "recording".to_string()
        }
    }

    #[test]
    fn test_entry_points_require_start() {
        let agent = Agent::new(AgentConfig::new("app"), Arc::new(NullExporter));

        assert!(matches!(
            agent.start_transaction("tx", "http", 0.0).unwrap_err(),
            ProbeError::Agent(AgentError::NotStarted)
        ));
        assert!(agent.root_span("http").is_err());
        assert!(agent
            .increment_counter("requests", 1.0, Value::new_map())
            .is_err());
        assert!(agent.set_gauge("memory", 1.0, Value::new_map()).is_err());
        assert!(agent.set_host_gauge("cpu", 1.0).is_err());
        assert!(agent.set_process_gauge("cpu", 1.0).is_err());
        assert!(agent
            .add_distribution_value("latency", 1.0, Value::new_map())
            .is_err());
    }

    #[test]
    fn test_stop_then_restart() {
        let agent = Agent::new(AgentConfig::new("app"), Arc::new(NullExporter));
        agent.start();
        assert!(agent.is_started());

        agent.stop();
        assert!(!agent.is_started());
        assert!(agent.start_transaction("tx", "http", 0.0).is_err());

        agent.start();
        assert!(agent.start_transaction("tx", "http", 0.0).is_ok());
    }

    #[test]
    fn test_completed_transaction_reaches_exporter() {
        let exporter = Arc::new(RecordingExporter::default());
        let agent = Agent::new(AgentConfig::new("app"), exporter.clone());
        agent.start();

        let mut tx = agent.start_transaction("tx-1", "http", 0.0).unwrap();
        tx.finish(0.0).unwrap();
        tx.complete().unwrap();

        let exported = exporter.transactions.lock();
        assert_eq!(exported.len(), 1);
        assert!(exported[0].contains(r#""id":"tx-1""#));
    }

    #[test]
    fn test_closed_span_reaches_exporter() {
        let exporter = Arc::new(RecordingExporter::default());
        let agent = Agent::new(AgentConfig::new("app"), exporter.clone());
        agent.start();

        let mut span = agent.root_span("http").unwrap();
        span.close().unwrap();

        assert_eq!(exporter.spans.lock().len(), 1);
    }

    #[test]
    fn test_stop_flushes_metrics() {
        let exporter = Arc::new(RecordingExporter::default());
        let agent = Agent::new(AgentConfig::new("app"), exporter.clone());
        agent.start();

        agent
            .increment_counter("requests", 2.0, Value::new_map())
            .unwrap();
        agent.set_host_gauge("cpu", 0.5).unwrap();
        agent
            .add_distribution_value("latency", 0.1, Value::new_map())
            .unwrap();
        agent
            .add_distribution_value("latency", 0.2, Value::new_map())
            .unwrap();

        agent.stop();

        let metrics = exporter.metrics.lock();
        assert_eq!(metrics.len(), 4); // 1 counter + 1 host gauge + 2 samples
        assert!(metrics
            .iter()
            .any(|(kind, name, value, _)| *kind == MetricKind::Counter
                && name == "requests"
                && *value == 2.0));
        assert_eq!(
            metrics
                .iter()
                .filter(|(kind, ..)| *kind == MetricKind::Distribution)
                .count(),
            2
        );
    }

    #[test]
    fn test_server_state_delegates_to_exporter() {
        let agent = Agent::new(
            AgentConfig::new("app"),
            Arc::new(RecordingExporter::default()),
        );
        assert_eq!(agent.server_state("ready").as_deref(), Some("true"));
        assert_eq!(agent.server_state("missing"), None);
    }

    #[test]
    fn test_diagnose_reports_config_and_exporter() {
        let agent = Agent::new(
            AgentConfig::new("app").with_environment("production"),
            Arc::new(RecordingExporter::default()),
        );
        agent.start();

        let report = agent.diagnose();
        assert!(report.contains("app: app"));
        assert!(report.contains("environment: production"));
        assert!(report.contains("started: true"));
        assert!(report.contains("exporter: recording"));
    }
}

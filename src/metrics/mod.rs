/*!
 * Metrics
 * Process-wide counters, gauges, and distributions keyed by
 * (name, tag set)
 *
 * The sink is shared mutable state: all writers may call concurrently.
 * Per-series updates go through the map's entry API, which holds the
 * shard lock across the read-modify-write, so concurrent increments
 * never lose updates.
 */

mod series;

pub use series::SeriesKey;

use crate::core::errors::MetricsError;
use crate::data::Value;
use ahash::RandomState;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Metric kinds handed to the exporter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Counter,
    Gauge,
    HostGauge,
    ProcessGauge,
    Distribution,
}

/// Process-wide metrics sink
///
/// # Performance
/// - Cache-line aligned to prevent false sharing in high-frequency metric updates
#[repr(C, align(64))]
pub struct MetricsSink {
    counters: DashMap<SeriesKey, f64, RandomState>,
    gauges: DashMap<SeriesKey, f64, RandomState>,
    host_gauges: DashMap<String, f64, RandomState>,
    process_gauges: DashMap<String, f64, RandomState>,
    distributions: DashMap<SeriesKey, Vec<f64>, RandomState>,
}

impl MetricsSink {
    pub fn new() -> Self {
        Self {
            counters: DashMap::with_hasher(RandomState::new()),
            gauges: DashMap::with_hasher(RandomState::new()),
            host_gauges: DashMap::with_hasher(RandomState::new()),
            process_gauges: DashMap::with_hasher(RandomState::new()),
            distributions: DashMap::with_hasher(RandomState::new()),
        }
    }

    /// Set a gauge, last write wins per (name, tag set)
    pub fn set_gauge(&self, key: &str, value: f64, tags: Value) -> Result<(), MetricsError> {
        let value = check_finite(value)?;
        let series = SeriesKey::new(key, &tags)?;
        self.gauges.insert(series, value);
        Ok(())
    }

    /// Set a host-level gauge, keyed by name only
    pub fn set_host_gauge(&self, key: &str, value: f64) -> Result<(), MetricsError> {
        let value = check_finite(value)?;
        self.host_gauges.insert(key.to_string(), value);
        Ok(())
    }

    /// Set a process-level gauge, keyed by name only
    pub fn set_process_gauge(&self, key: &str, value: f64) -> Result<(), MetricsError> {
        let value = check_finite(value)?;
        self.process_gauges.insert(key.to_string(), value);
        Ok(())
    }

    /// Increment a counter; the delta may be fractional
    pub fn increment_counter(
        &self,
        key: &str,
        delta: f64,
        tags: Value,
    ) -> Result<(), MetricsError> {
        let delta = check_finite(delta)?;
        let series = SeriesKey::new(key, &tags)?;
        self.counters
            .entry(series)
            .and_modify(|v| *v += delta)
            .or_insert(delta);
        Ok(())
    }

    /// Append a sample to a distribution; no eviction or windowing here,
    /// retention belongs to the external agent
    pub fn add_distribution_value(
        &self,
        key: &str,
        value: f64,
        tags: Value,
    ) -> Result<(), MetricsError> {
        let value = check_finite(value)?;
        let series = SeriesKey::new(key, &tags)?;
        self.distributions
            .entry(series)
            .and_modify(|samples| samples.push(value))
            .or_insert_with(|| vec![value]);
        Ok(())
    }

    /// Snapshot of all series, sorted by (name, tags) for determinism
    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut counters: Vec<SeriesSample> = self
            .counters
            .iter()
            .map(|entry| SeriesSample::from_series(entry.key(), *entry.value()))
            .collect();
        counters.sort();

        let mut gauges: Vec<SeriesSample> = self
            .gauges
            .iter()
            .map(|entry| SeriesSample::from_series(entry.key(), *entry.value()))
            .collect();
        gauges.sort();

        let mut host_gauges: Vec<SeriesSample> = self
            .host_gauges
            .iter()
            .map(|entry| SeriesSample::untagged(entry.key(), *entry.value()))
            .collect();
        host_gauges.sort();

        let mut process_gauges: Vec<SeriesSample> = self
            .process_gauges
            .iter()
            .map(|entry| SeriesSample::untagged(entry.key(), *entry.value()))
            .collect();
        process_gauges.sort();

        let mut distributions: Vec<DistributionSeries> = self
            .distributions
            .iter()
            .map(|entry| DistributionSeries {
                name: entry.key().name().to_string(),
                tags: entry.key().tags().to_string(),
                values: entry.value().clone(),
            })
            .collect();
        distributions.sort_by(|a, b| (&a.name, &a.tags).cmp(&(&b.name, &b.tags)));

        MetricsSnapshot {
            counters,
            gauges,
            host_gauges,
            process_gauges,
            distributions,
        }
    }

    /// Snapshot and clear distribution samples. Counters and gauges persist
    /// for the process lifetime.
    pub fn drain(&self) -> MetricsSnapshot {
        let snapshot = self.snapshot();
        self.distributions.clear();
        snapshot
    }

    /// Reset all series
    pub fn reset(&self) {
        self.counters.clear();
        self.gauges.clear();
        self.host_gauges.clear();
        self.process_gauges.clear();
        self.distributions.clear();
    }
}

impl Default for MetricsSink {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn check_finite(value: f64) -> Result<f64, MetricsError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(MetricsError::InvalidArgumentType(format!(
            "non-finite metric value {}",
            value
        )))
    }
}

/// One series and its current value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SeriesSample {
    pub name: String,
    /// Canonical JSON of the tag set, sorted by key
    pub tags: String,
    pub value: f64,
}

impl SeriesSample {
    fn from_series(key: &SeriesKey, value: f64) -> Self {
        Self {
            name: key.name().to_string(),
            tags: key.tags().to_string(),
            value,
        }
    }

    fn untagged(name: &str, value: f64) -> Self {
        Self {
            name: name.to_string(),
            tags: "{}".to_string(),
            value,
        }
    }
}

impl Eq for SeriesSample {}

impl Ord for SeriesSample {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (&self.name, &self.tags)
            .cmp(&(&other.name, &other.tags))
            .then_with(|| self.value.total_cmp(&other.value))
    }
}

impl PartialOrd for SeriesSample {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// One distribution series and its accumulated samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DistributionSeries {
    pub name: String,
    pub tags: String,
    pub values: Vec<f64>,
}

/// Snapshot of all metrics at a point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MetricsSnapshot {
    pub counters: Vec<SeriesSample>,
    pub gauges: Vec<SeriesSample>,
    pub host_gauges: Vec<SeriesSample>,
    pub process_gauges: Vec<SeriesSample>,
    pub distributions: Vec<DistributionSeries>,
}

impl MetricsSnapshot {
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
            && self.gauges.is_empty()
            && self.host_gauges.is_empty()
            && self.process_gauges.is_empty()
            && self.distributions.is_empty()
    }
}

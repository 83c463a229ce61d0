//! Run statistics for pipeline executions.
//!
//! A [`MetricsCollector`] is a cloneable handle to one shared registry.
//! Attach it with [`crate::Pipeline::with_metrics`] and every run records:
//!
//! - [`CHUNKS_READ`] - chunks that left the reader
//! - [`ITEMS_EMITTED`] - items handed to the consumer
//! - [`UNITS_EMITTED`] - units across emitted chunks (formatted items excluded)
//! - [`EMITTED_CHUNK_SIZES`] - distribution of emitted chunk sizes
//! - [`WORKERS_SPAWNED`], [`SENTINELS_RECEIVED`], [`WORKERS_JOINED`]
//! - wall time between the start of the run and its end
//!
//! Starting a run clears the counts and distributions of the previous one.
//! Values registered through [`MetricsCollector::register`] are kept.
//!
//! ```no_run
//! use mldp::metrics::{MetricsCollector, CHUNKS_READ};
//! # fn main() -> anyhow::Result<()> {
//! let metrics = MetricsCollector::new();
//! // ... run a pipeline built with `.with_metrics(metrics.clone())` ...
//! println!("read {:?} chunks", metrics.counter(CHUNKS_READ));
//! metrics.save_to_file("metrics.json")?;
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

pub const CHUNKS_READ: &str = "chunks_read";
pub const ITEMS_EMITTED: &str = "items_emitted";
pub const UNITS_EMITTED: &str = "units_emitted";
pub const EMITTED_CHUNK_SIZES: &str = "emitted_chunk_sizes";
pub const WORKERS_SPAWNED: &str = "workers_spawned";
pub const SENTINELS_RECEIVED: &str = "sentinels_received";
pub const WORKERS_JOINED: &str = "workers_joined";

const ELAPSED_MS: &str = "elapsed_ms";

/// A caller-defined value reported next to the run statistics.
pub trait Metric: Send + Sync {
    fn name(&self) -> &str;

    fn value(&self) -> Value;

    fn description(&self) -> Option<&str> {
        None
    }
}

enum Entry {
    Count(u64),
    Observations(Vec<f64>),
    Custom(Box<dyn Metric>),
}

impl Entry {
    fn value(&self) -> Value {
        match self {
            Self::Count(n) => json!(n),
            Self::Observations(values) => summarize(values).to_json(),
            Self::Custom(metric) => metric.value(),
        }
    }

    fn description(&self) -> Option<&str> {
        match self {
            Self::Custom(metric) => metric.description(),
            _ => None,
        }
    }
}

#[derive(Default)]
struct Registry {
    entries: BTreeMap<String, Entry>,
    started: Option<Instant>,
    ended: Option<Instant>,
}

/// Thread-safe, shared registry of run statistics.
#[derive(Clone, Default)]
pub struct MetricsCollector {
    inner: Arc<Mutex<Registry>>,
}

impl MetricsCollector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // Every update is a single map operation, so a poisoned lock still holds
    // consistent data.
    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a custom metric, replacing any entry of the same name.
    pub fn register(&self, metric: impl Metric + 'static) {
        self.lock()
            .entries
            .insert(metric.name().to_string(), Entry::Custom(Box::new(metric)));
    }

    /// Mark the start of a run and drop the statistics of the previous one.
    pub fn record_start(&self) {
        let mut registry = self.lock();
        registry.entries.retain(|_, e| matches!(e, Entry::Custom(_)));
        registry.started = Some(Instant::now());
        registry.ended = None;
    }

    pub fn record_end(&self) {
        self.lock().ended = Some(Instant::now());
    }

    /// Duration of the last finished run.
    #[must_use]
    pub fn elapsed(&self) -> Option<Duration> {
        let registry = self.lock();
        Some(registry.ended?.duration_since(registry.started?))
    }

    /// Add `value` to a counter, creating it on first use. Entries of another
    /// type under the same name are left alone.
    pub fn increment_counter(&self, name: &str, value: u64) {
        let mut registry = self.lock();
        let entry = registry
            .entries
            .entry(name.to_string())
            .or_insert(Entry::Count(0));
        if let Entry::Count(n) = entry {
            *n += value;
        }
    }

    #[must_use]
    pub fn counter(&self, name: &str) -> Option<u64> {
        match self.lock().entries.get(name) {
            Some(Entry::Count(n)) => Some(*n),
            _ => None,
        }
    }

    /// Record one observation of a distribution, creating it on first use.
    pub fn record_value(&self, name: &str, value: f64) {
        let mut registry = self.lock();
        let entry = registry
            .entries
            .entry(name.to_string())
            .or_insert_with(|| Entry::Observations(Vec::new()));
        if let Entry::Observations(values) = entry {
            values.push(value);
        }
    }

    /// Summary of a distribution recorded with [`record_value`](Self::record_value).
    #[must_use]
    pub fn histogram(&self, name: &str) -> Option<HistogramStats> {
        match self.lock().entries.get(name) {
            Some(Entry::Observations(values)) => Some(summarize(values)),
            _ => None,
        }
    }

    /// Name-to-value view of every entry.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.lock()
            .entries
            .iter()
            .map(|(name, entry)| (name.clone(), entry.value()))
            .collect()
    }

    /// Every entry as `{"value": ..}` objects, custom descriptions included,
    /// plus `elapsed_ms` once a run has finished.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let elapsed = self.elapsed();
        let registry = self.lock();
        let mut out = Map::new();
        for (name, entry) in &registry.entries {
            let mut obj = Map::new();
            obj.insert("value".into(), entry.value());
            if let Some(desc) = entry.description() {
                obj.insert("description".into(), json!(desc));
            }
            out.insert(name.clone(), Value::Object(obj));
        }
        drop(registry);
        if let Some(elapsed) = elapsed {
            out.insert(ELAPSED_MS.into(), json!({ "value": elapsed.as_millis() }));
        }
        Value::Object(out)
    }

    /// One line per entry, names aligned, sorted by name.
    #[must_use]
    pub fn report(&self) -> String {
        let snapshot = self.snapshot();
        let width = snapshot.keys().map(String::len).max().unwrap_or(0).max(ELAPSED_MS.len());
        let mut out = String::from("PIPELINE METRICS\n");
        if let Some(elapsed) = self.elapsed() {
            let _ = writeln!(out, "  {ELAPSED_MS:<width$}  {}", elapsed.as_millis());
        }
        for (name, value) in &snapshot {
            let _ = writeln!(out, "  {name:<width$}  {value}");
        }
        out
    }

    /// Write [`to_json`](Self::to_json) as pretty JSON.
    ///
    /// # Errors
    /// IO or serialization failures.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let text = serde_json::to_string_pretty(&self.to_json())?;
        fs::write(path, text).with_context(|| format!("write metrics to {}", path.display()))
    }
}

/// A fixed reading set by the caller, e.g. a dataset size.
pub struct Gauge {
    name: String,
    value: f64,
    description: Option<String>,
}

impl Gauge {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
            description: None,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl Metric for Gauge {
    fn name(&self) -> &str {
        &self.name
    }

    fn value(&self) -> Value {
        json!(self.value)
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistogramStats {
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub p50: f64,
    pub p95: f64,
}

impl HistogramStats {
    fn to_json(&self) -> Value {
        json!({
            "count": self.count,
            "mean": self.mean,
            "min": self.min,
            "max": self.max,
            "p50": self.p50,
            "p95": self.p95,
        })
    }
}

#[allow(clippy::cast_precision_loss)]
fn summarize(values: &[f64]) -> HistogramStats {
    if values.is_empty() {
        return HistogramStats::default();
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let count = sorted.len();
    let rank = |q: usize| sorted[(count * q / 100).min(count - 1)];
    HistogramStats {
        count,
        mean: sorted.iter().sum::<f64>() / count as f64,
        min: sorted[0],
        max: sorted[count - 1],
        p50: rank(50),
        p95: rank(95),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_and_distributions() {
        let m = MetricsCollector::new();
        m.increment_counter(CHUNKS_READ, 2);
        m.increment_counter(CHUNKS_READ, 3);
        for size in [4.0, 4.0, 1.0] {
            m.record_value(EMITTED_CHUNK_SIZES, size);
        }
        assert_eq!(m.counter(CHUNKS_READ), Some(5));
        assert_eq!(m.counter(EMITTED_CHUNK_SIZES), None);

        let stats = m.histogram(EMITTED_CHUNK_SIZES).expect("recorded");
        assert_eq!(stats.count, 3);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 4.0);
        assert_eq!(stats.p50, 4.0);
        assert_eq!(stats.mean, 3.0);
    }

    #[test]
    fn a_new_run_keeps_only_custom_metrics() {
        let m = MetricsCollector::new();
        m.register(Gauge::new("dataset_rows", 120.0).with_description("rows on disk"));
        m.increment_counter(ITEMS_EMITTED, 7);
        m.record_end();
        assert!(m.elapsed().is_none());

        m.record_start();
        assert_eq!(m.counter(ITEMS_EMITTED), None);
        m.record_end();
        assert!(m.elapsed().is_some());

        let json = m.to_json();
        assert_eq!(json["dataset_rows"]["value"], json!(120.0));
        assert_eq!(json["dataset_rows"]["description"], json!("rows on disk"));
        assert!(json.get(ELAPSED_MS).is_some());
    }

    #[test]
    fn report_and_file() -> Result<()> {
        let m = MetricsCollector::new();
        m.increment_counter(WORKERS_SPAWNED, 3);
        m.increment_counter(WORKERS_JOINED, 3);
        let report = m.report();
        assert!(report.starts_with("PIPELINE METRICS\n"));
        assert!(report.contains("workers_spawned  3\n"));

        let dir = tempfile::tempdir()?;
        let path = dir.path().join("metrics.json");
        m.save_to_file(&path)?;
        let saved: Value = serde_json::from_str(&fs::read_to_string(&path)?)?;
        assert_eq!(saved[WORKERS_JOINED]["value"], json!(3));
        Ok(())
    }
}

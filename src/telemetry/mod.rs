//! telemetry
//!
//! Logging and metrics collaborators.
//!
//! The executor, lock manager and tracker hooks never talk to a backend
//! directly; they go through [`Logger`] and [`Metrics`]. The defaults forward
//! to `tracing`. The recording variants keep everything in memory and are
//! what the tests assert against.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use serde_json::Value;

/// Structured log metadata.
pub type Metadata = serde_json::Map<String, Value>;

/// Logging collaborator.
pub trait Logger: Send + Sync {
    /// Informational message.
    fn info(&self, message: &str, metadata: &Metadata);
    /// Warning.
    fn warn(&self, message: &str, metadata: &Metadata);
    /// Error.
    fn error(&self, message: &str, metadata: &Metadata);
}

/// Metric emission method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatsMethod {
    Incr,
    Histogram,
    Set,
}

impl fmt::Display for StatsMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StatsMethod::Incr => "incr",
            StatsMethod::Histogram => "histogram",
            StatsMethod::Set => "set",
        };
        f.write_str(s)
    }
}

/// Metrics collaborator.
pub trait Metrics: Send + Sync {
    /// Emit one metric sample.
    fn emit(&self, method: StatsMethod, metric: &str, value: f64, tags: &[String]);
}

/// Build metadata from key/value pairs.
pub fn metadata<I, K>(pairs: I) -> Metadata
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

/// [`Logger`] that forwards to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn info(&self, message: &str, metadata: &Metadata) {
        tracing::info!(metadata = %serde_json::Value::Object(metadata.clone()), "{}", message);
    }

    fn warn(&self, message: &str, metadata: &Metadata) {
        tracing::warn!(metadata = %serde_json::Value::Object(metadata.clone()), "{}", message);
    }

    fn error(&self, message: &str, metadata: &Metadata) {
        tracing::error!(metadata = %serde_json::Value::Object(metadata.clone()), "{}", message);
    }
}

/// [`Metrics`] that writes samples as `tracing` debug events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMetrics;

impl Metrics for TracingMetrics {
    fn emit(&self, method: StatsMethod, metric: &str, value: f64, tags: &[String]) {
        tracing::debug!(%method, metric, value, tags = ?tags, "metric");
    }
}

/// Log level of a recorded message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// A recorded log line.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub level: LogLevel,
    pub message: String,
    pub metadata: Metadata,
}

/// [`Logger`] that keeps every record in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingLogger {
    records: Arc<Mutex<Vec<LogRecord>>>,
}

impl RecordingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all records so far.
    pub fn records(&self) -> Vec<LogRecord> {
        lock(&self.records).clone()
    }

    /// Messages of all records so far.
    pub fn messages(&self) -> Vec<String> {
        lock(&self.records)
            .iter()
            .map(|r| r.message.clone())
            .collect()
    }

    /// Whether any record's message contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        lock(&self.records)
            .iter()
            .any(|r| r.message.contains(needle))
    }

    fn push(&self, level: LogLevel, message: &str, metadata: &Metadata) {
        lock(&self.records).push(LogRecord {
            level,
            message: message.to_string(),
            metadata: metadata.clone(),
        });
    }
}

impl Logger for RecordingLogger {
    fn info(&self, message: &str, metadata: &Metadata) {
        self.push(LogLevel::Info, message, metadata);
    }

    fn warn(&self, message: &str, metadata: &Metadata) {
        self.push(LogLevel::Warn, message, metadata);
    }

    fn error(&self, message: &str, metadata: &Metadata) {
        self.push(LogLevel::Error, message, metadata);
    }
}

/// A recorded metric sample.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRecord {
    pub method: StatsMethod,
    pub metric: String,
    pub value: f64,
    pub tags: Vec<String>,
}

/// [`Metrics`] that keeps every sample in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingMetrics {
    records: Arc<Mutex<Vec<MetricRecord>>>,
}

impl RecordingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all samples so far.
    pub fn records(&self) -> Vec<MetricRecord> {
        lock(&self.records).clone()
    }

    /// Samples emitted under `metric`.
    pub fn find(&self, metric: &str) -> Vec<MetricRecord> {
        lock(&self.records)
            .iter()
            .filter(|r| r.metric == metric)
            .cloned()
            .collect()
    }
}

impl Metrics for RecordingMetrics {
    fn emit(&self, method: StatsMethod, metric: &str, value: f64, tags: &[String]) {
        lock(&self.records).push(MetricRecord {
            method,
            metric: metric.to_string(),
            value,
            tags: tags.to_vec(),
        });
    }
}

// A poisoned recorder still holds valid records.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn recording_logger_keeps_order_and_level() {
        let logger = RecordingLogger::new();
        logger.info("first", &Metadata::new());
        logger.error("second", &metadata([("key", json!("k1"))]));

        let records = logger.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].level, LogLevel::Info);
        assert_eq!(records[1].level, LogLevel::Error);
        assert_eq!(records[1].metadata["key"], json!("k1"));
        assert!(logger.contains("sec"));
        assert_eq!(logger.messages(), vec!["first", "second"]);
    }

    #[test]
    fn recording_logger_clones_share_records() {
        let logger = RecordingLogger::new();
        let handle = logger.clone();
        handle.warn("shared", &Metadata::new());
        assert_eq!(logger.records().len(), 1);
    }

    #[test]
    fn recording_metrics_find_by_name() {
        let metrics = RecordingMetrics::new();
        metrics.emit(StatsMethod::Incr, "cache_hit", 1.0, &["cache_group:g".into()]);
        metrics.emit(StatsMethod::Histogram, "op.duration", 12.0, &[]);

        let hits = metrics.find("cache_hit");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].method, StatsMethod::Incr);
        assert_eq!(hits[0].tags, vec!["cache_group:g"]);
        assert!(metrics.find("missing").is_empty());
    }

    #[test]
    fn stats_method_display() {
        assert_eq!(StatsMethod::Incr.to_string(), "incr");
        assert_eq!(StatsMethod::Histogram.to_string(), "histogram");
        assert_eq!(StatsMethod::Set.to_string(), "set");
    }
}

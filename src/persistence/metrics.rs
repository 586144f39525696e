// Copyright 2025 Cowboy AI, LLC.

//! Metrics collection for buffering operations
//!
//! Synchronous so that the admission path can record without awaiting.
//! Recording is best-effort and never fails.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Duration samples kept per operation
const MAX_SAMPLES: usize = 1000;

/// Metrics for buffering operations
#[derive(Debug, Clone, Default)]
pub struct BufferMetrics {
    counters: Arc<RwLock<HashMap<String, u64>>>,
    durations: Arc<RwLock<HashMap<String, Vec<Duration>>>>,
    errors: Arc<RwLock<HashMap<String, u64>>>,
}

impl BufferMetrics {
    /// Create new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment a counter
    pub fn increment(&self, name: &str) {
        self.increment_by(name, 1);
    }

    /// Add `amount` to a counter
    pub fn increment_by(&self, name: &str, amount: u64) {
        let mut counters = self.counters.write();
        *counters.entry(name.to_string()).or_insert(0) += amount;
    }

    /// Record an error
    pub fn record_error(&self, operation: &str) {
        let mut errors = self.errors.write();
        *errors.entry(operation.to_string()).or_insert(0) += 1;
    }

    /// Record operation duration
    pub fn record_duration(&self, operation: &str, duration: Duration) {
        let mut durations = self.durations.write();
        let samples = durations.entry(operation.to_string()).or_default();
        samples.push(duration);
        if samples.len() > MAX_SAMPLES {
            let excess = samples.len() - MAX_SAMPLES;
            samples.drain(0..excess);
        }
    }

    /// Get counter value
    pub fn get_counter(&self, name: &str) -> u64 {
        self.counters.read().get(name).copied().unwrap_or(0)
    }

    /// Get error count
    pub fn get_error_count(&self, operation: &str) -> u64 {
        self.errors.read().get(operation).copied().unwrap_or(0)
    }

    /// Get average duration for an operation
    pub fn get_avg_duration(&self, operation: &str) -> Option<Duration> {
        let durations = self.durations.read();
        let samples = durations.get(operation)?;
        if samples.is_empty() {
            return None;
        }
        let sum: Duration = samples.iter().sum();
        Some(sum / samples.len() as u32)
    }

    /// Get percentile duration
    pub fn get_percentile_duration(&self, operation: &str, percentile: f64) -> Option<Duration> {
        let durations = self.durations.read();
        let mut sorted = durations.get(operation)?.clone();
        if sorted.is_empty() {
            return None;
        }
        sorted.sort();
        Some(sorted[percentile_index(sorted.len(), percentile)])
    }

    /// Get all metrics as a summary
    pub fn summary(&self) -> MetricsSummary {
        let counters = self.counters.read().clone();
        let errors = self.errors.read().clone();

        let durations = self
            .durations
            .read()
            .iter()
            .filter_map(|(op, samples)| DurationStats::from_samples(samples).map(|s| (op.clone(), s)))
            .collect();

        MetricsSummary {
            counters,
            errors,
            durations,
        }
    }

    /// Reset all metrics
    pub fn reset(&self) {
        self.counters.write().clear();
        self.durations.write().clear();
        self.errors.write().clear();
    }
}

fn percentile_index(len: usize, percentile: f64) -> usize {
    let percentile = percentile.clamp(0.0, 100.0);
    ((len as f64 - 1.0) * percentile / 100.0) as usize
}

/// Summary of all metrics
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    /// Counter values
    pub counters: HashMap<String, u64>,
    /// Error counts
    pub errors: HashMap<String, u64>,
    /// Duration statistics
    pub durations: HashMap<String, DurationStats>,
}

/// Duration statistics for an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DurationStats {
    /// Number of measurements
    pub count: usize,
    /// Average duration
    pub avg: Duration,
    /// 50th percentile
    pub p50: Duration,
    /// 95th percentile
    pub p95: Duration,
    /// 99th percentile
    pub p99: Duration,
    /// Minimum duration
    pub min: Duration,
    /// Maximum duration
    pub max: Duration,
}

impl DurationStats {
    fn from_samples(samples: &[Duration]) -> Option<Self> {
        let mut sorted = samples.to_vec();
        sorted.sort();
        let min = *sorted.first()?;
        let max = *sorted.last()?;
        let sum: Duration = sorted.iter().sum();
        Some(Self {
            count: sorted.len(),
            avg: sum / sorted.len() as u32,
            p50: sorted[percentile_index(sorted.len(), 50.0)],
            p95: sorted[percentile_index(sorted.len(), 95.0)],
            p99: sorted[percentile_index(sorted.len(), 99.0)],
            min,
            max,
        })
    }
}

/// Timer for measuring operation duration
pub struct MetricsTimer<'a> {
    metrics: &'a BufferMetrics,
    operation: &'static str,
    start: Instant,
}

impl<'a> MetricsTimer<'a> {
    /// Create a new timer
    pub fn new(metrics: &'a BufferMetrics, operation: &'static str) -> Self {
        Self {
            metrics,
            operation,
            start: Instant::now(),
        }
    }

    /// Record the duration and increment the `<operation>.count` counter
    pub fn record(self) -> Duration {
        let duration = self.start.elapsed();
        self.metrics.record_duration(self.operation, duration);
        self.metrics.increment(&format!("{}.count", self.operation));
        duration
    }

    /// Record as error
    pub fn record_error(self) -> Duration {
        let duration = self.start.elapsed();
        self.metrics.record_duration(self.operation, duration);
        self.metrics.record_error(self.operation);
        duration
    }
}

/// Types that carry a metrics collector
pub trait MetricsInstrumented {
    /// Get metrics collector
    fn metrics(&self) -> &BufferMetrics;

    /// Create a timer for an operation
    fn timer(&self, operation: &'static str) -> MetricsTimer<'_> {
        MetricsTimer::new(self.metrics(), operation)
    }
}

//! Exporter self-metrics
//!
//! Appended to every scrape after the bean metrics.
//!
//! # Metrics
//!
//! - `jmx_scrape_duration_seconds` - Time this scrape took
//! - `jmx_scrape_error` - 1 if the scrape failed at connection level
//! - `jmx_scrape_cached_beans` - Matched-rule cache entries used by this scrape
//! - `jmx_scrape_bean_failures` - Beans skipped after a fetch error
//! - `jmx_config_reload_success_total` - Successful config reloads
//! - `jmx_config_reload_failure_total` - Rejected config reloads
//! - `jmx_exporter_build_info` - Constant 1, labeled with name and version

use std::sync::atomic::{AtomicU64, Ordering};

use crate::transformer::{DataPoint, MetricSnapshot, MetricType};

/// Thread-safe counter using atomic operations
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    /// Create a new counter initialized to 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment the counter by 1
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current value
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Outcome of one scrape, as reported through self-metrics
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScrapeSummary {
    pub duration_seconds: f64,
    /// Connection-level failure
    pub error: bool,
    pub cached_beans: usize,
    pub bean_failures: usize,
}

/// Counters that outlive individual scrapes
#[derive(Debug, Default)]
pub struct ExporterMetrics {
    reload_success: Counter,
    reload_failure: Counter,
}

impl ExporterMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_reload_success(&self) {
        self.reload_success.inc();
    }

    pub fn record_reload_failure(&self) {
        self.reload_failure.inc();
    }

    pub fn reload_success_total(&self) -> u64 {
        self.reload_success.get()
    }

    pub fn reload_failure_total(&self) -> u64 {
        self.reload_failure.get()
    }

    /// Snapshots describing one scrape and the exporter itself
    pub fn snapshots(&self, summary: &ScrapeSummary) -> Vec<MetricSnapshot> {
        vec![
            MetricSnapshot::single(
                "jmx_scrape_duration_seconds",
                "Time this JMX scrape took, in seconds.",
                MetricType::Gauge,
                summary.duration_seconds,
            ),
            MetricSnapshot::single(
                "jmx_scrape_error",
                "Non-zero if this scrape failed.",
                MetricType::Gauge,
                if summary.error { 1.0 } else { 0.0 },
            ),
            MetricSnapshot::single(
                "jmx_scrape_cached_beans",
                "Number of beans with their matching rule cached",
                MetricType::Gauge,
                summary.cached_beans as f64,
            ),
            MetricSnapshot::single(
                "jmx_scrape_bean_failures",
                "Number of beans that could not be read during this scrape.",
                MetricType::Gauge,
                summary.bean_failures as f64,
            ),
            MetricSnapshot::single(
                "jmx_config_reload_success_total",
                "Number of times configuration have successfully been reloaded.",
                MetricType::Counter,
                self.reload_success_total() as f64,
            ),
            MetricSnapshot::single(
                "jmx_config_reload_failure_total",
                "Number of times configuration have failed to be reloaded.",
                MetricType::Counter,
                self.reload_failure_total() as f64,
            ),
            build_info(),
        ]
    }
}

fn build_info() -> MetricSnapshot {
    MetricSnapshot {
        name: "jmx_exporter_build_info".to_string(),
        help: "A metric with a constant '1' value labeled with the version of the JMX exporter."
            .to_string(),
        metric_type: MetricType::Gauge,
        data_points: vec![DataPoint {
            labels: vec![
                ("name".to_string(), env!("CARGO_PKG_NAME").to_string()),
                ("version".to_string(), env!("CARGO_PKG_VERSION").to_string()),
            ],
            value: 1.0,
        }],
    }
}

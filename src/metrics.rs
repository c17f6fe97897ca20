//! Metrics collection and export for resource pools

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Point-in-time metrics for a pool
///
/// # Examples
///
/// ```
/// use elastic_pool::PoolMetrics;
///
/// let metrics = PoolMetrics::default();
/// let exported = metrics.export();
/// assert_eq!(exported["total_acquired"], "0");
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PoolMetrics {
    /// Resources handed to callers, including temporary ones
    pub total_acquired: usize,

    /// Resources that went back into the idle buffer after a release
    pub total_recycled: usize,

    /// Temporary resources created after an acquire wait expired
    pub temporary_created: usize,

    /// Acquire calls whose wait deadline expired
    pub acquire_timeouts: usize,

    /// Completed expand passes
    pub expansions: usize,

    /// Completed shrink passes
    pub shrinks: usize,

    /// Idle resources evicted as stale or unhealthy
    pub evicted: usize,

    /// Resets that failed or timed out
    pub reset_failures: usize,

    /// Resources closed for any reason
    pub total_closed: usize,

    /// Current idle buffer capacity
    pub capacity: usize,

    /// Idle resources right now
    pub idle: usize,

    /// Resources currently lent out
    pub borrowed: usize,

    /// Every live resource: idle, borrowed and in transit
    pub total: usize,

    pub min_capacity: usize,

    pub max_capacity: usize,
}

impl PoolMetrics {
    /// Export metrics as a HashMap
    pub fn export(&self) -> HashMap<String, String> {
        let mut metrics = HashMap::new();
        metrics.insert("total_acquired".to_string(), self.total_acquired.to_string());
        metrics.insert("total_recycled".to_string(), self.total_recycled.to_string());
        metrics.insert("temporary_created".to_string(), self.temporary_created.to_string());
        metrics.insert("acquire_timeouts".to_string(), self.acquire_timeouts.to_string());
        metrics.insert("expansions".to_string(), self.expansions.to_string());
        metrics.insert("shrinks".to_string(), self.shrinks.to_string());
        metrics.insert("evicted".to_string(), self.evicted.to_string());
        metrics.insert("reset_failures".to_string(), self.reset_failures.to_string());
        metrics.insert("total_closed".to_string(), self.total_closed.to_string());
        metrics.insert("capacity".to_string(), self.capacity.to_string());
        metrics.insert("idle".to_string(), self.idle.to_string());
        metrics.insert("borrowed".to_string(), self.borrowed.to_string());
        metrics.insert("total".to_string(), self.total.to_string());
        metrics.insert("min_capacity".to_string(), self.min_capacity.to_string());
        metrics.insert("max_capacity".to_string(), self.max_capacity.to_string());
        metrics
    }
}

/// Metrics exporter for Prometheus format
pub struct MetricsExporter;

impl MetricsExporter {
    /// Export metrics in Prometheus exposition format
    ///
    /// # Examples
    ///
    /// ```
    /// use elastic_pool::{MetricsExporter, PoolMetrics};
    /// use std::collections::HashMap;
    ///
    /// let mut tags = HashMap::new();
    /// tags.insert("service".to_string(), "api".to_string());
    ///
    /// let output = MetricsExporter::export_prometheus(&PoolMetrics::default(), "db", Some(&tags));
    /// assert!(output.contains("elasticpool_resources_idle"));
    /// assert!(output.contains("service=\"api\""));
    /// ```
    pub fn export_prometheus(
        metrics: &PoolMetrics,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> String {
        let mut output = String::new();
        let labels = Self::format_labels(pool_name, tags);

        let gauges = [
            ("elasticpool_capacity", "Current idle buffer capacity", metrics.capacity),
            ("elasticpool_resources_idle", "Current idle resources", metrics.idle),
            ("elasticpool_resources_borrowed", "Current borrowed resources", metrics.borrowed),
            ("elasticpool_resources_total", "Current live resources", metrics.total),
        ];
        for (name, help, value) in gauges {
            Self::push_metric(&mut output, name, help, "gauge", &labels, value);
        }

        let counters = [
            ("elasticpool_acquired_total", "Resources handed out", metrics.total_acquired),
            ("elasticpool_recycled_total", "Resources recycled", metrics.total_recycled),
            (
                "elasticpool_temporary_created_total",
                "Overflow resources created on acquire timeout",
                metrics.temporary_created,
            ),
            (
                "elasticpool_acquire_timeouts_total",
                "Acquire waits that hit their deadline",
                metrics.acquire_timeouts,
            ),
            ("elasticpool_expansions_total", "Expand passes", metrics.expansions),
            ("elasticpool_shrinks_total", "Shrink passes", metrics.shrinks),
            ("elasticpool_evicted_total", "Stale or unhealthy resources evicted", metrics.evicted),
            ("elasticpool_reset_failures_total", "Failed resets", metrics.reset_failures),
            ("elasticpool_closed_total", "Resources closed", metrics.total_closed),
        ];
        for (name, help, value) in counters {
            Self::push_metric(&mut output, name, help, "counter", &labels, value);
        }

        output
    }

    fn push_metric(
        output: &mut String,
        name: &str,
        help: &str,
        kind: &str,
        labels: &str,
        value: usize,
    ) {
        output.push_str(&format!("# HELP {} {}\n", name, help));
        output.push_str(&format!("# TYPE {} {}\n", name, kind));
        output.push_str(&format!("{}{{{}}} {}\n", name, labels, value));
    }

    fn format_labels(pool_name: &str, tags: Option<&HashMap<String, String>>) -> String {
        let mut labels = vec![format!("pool=\"{}\"", pool_name)];

        if let Some(tags) = tags {
            let mut sorted: Vec<_> = tags.iter().collect();
            sorted.sort();
            for (key, value) in sorted {
                labels.push(format!("{}=\"{}\"", key, value));
            }
        }

        labels.join(",")
    }
}

/// Internal metrics tracker
#[derive(Default)]
pub(crate) struct MetricsTracker {
    pub acquired: AtomicUsize,
    pub recycled: AtomicUsize,
    pub temporary_created: AtomicUsize,
    pub acquire_timeouts: AtomicUsize,
    pub expansions: AtomicUsize,
    pub shrinks: AtomicUsize,
    pub evicted: AtomicUsize,
    pub reset_failures: AtomicUsize,
    pub closed: AtomicUsize,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Fill the counter half of a snapshot; the caller supplies the gauges
    pub fn snapshot(&self) -> PoolMetrics {
        PoolMetrics {
            total_acquired: self.acquired.load(Ordering::Relaxed),
            total_recycled: self.recycled.load(Ordering::Relaxed),
            temporary_created: self.temporary_created.load(Ordering::Relaxed),
            acquire_timeouts: self.acquire_timeouts.load(Ordering::Relaxed),
            expansions: self.expansions.load(Ordering::Relaxed),
            shrinks: self.shrinks.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            reset_failures: self.reset_failures.load(Ordering::Relaxed),
            total_closed: self.closed.load(Ordering::Relaxed),
            ..PoolMetrics::default()
        }
    }
}

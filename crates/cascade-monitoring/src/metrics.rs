//! Metric recording for the cascades engine.
//!
//! Each recorder emits one structured `info!` event per metric and returns
//! the records it emitted so callers and tests can inspect them.

use std::collections::BTreeMap;
use tracing::info;

/// A single recorded metric
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRecord {
    /// Metric name, dot separated
    pub name: &'static str,
    /// Observed value
    pub value: f64,
    /// Labels attached to the observation
    pub labels: BTreeMap<&'static str, String>,
}

impl MetricRecord {
    fn new(name: &'static str, value: f64) -> Self {
        Self {
            name,
            value,
            labels: BTreeMap::new(),
        }
    }

    fn label(mut self, key: &'static str, value: impl ToString) -> Self {
        self.labels.insert(key, value.to_string());
        self
    }

    fn emit(self) -> Self {
        info!(
            metric = self.name,
            value = self.value,
            labels = ?self.labels,
            "metric"
        );
        self
    }
}

/// Cascades specific metrics
pub struct CascadeMetrics;

impl CascadeMetrics {
    /// Record a completed profiling run
    pub fn record_profile_run(
        run_id: &str,
        steps: usize,
        repetitions: usize,
        total_secs: f64,
    ) -> Vec<MetricRecord> {
        vec![
            MetricRecord::new("cascades.profile.total_seconds", total_secs)
                .label("run_id", run_id)
                .label("repetitions", repetitions)
                .emit(),
            MetricRecord::new("cascades.profile.steps", steps as f64)
                .label("run_id", run_id)
                .emit(),
        ]
    }

    /// Record the outcome of a cascade selection
    pub fn record_selection(
        cheap_blocks: usize,
        total_blocks: usize,
        threshold: f64,
        expected_cost: f64,
        fell_back: bool,
    ) -> Vec<MetricRecord> {
        vec![
            MetricRecord::new("cascades.selection.expected_cost", expected_cost)
                .label("fell_back", fell_back)
                .emit(),
            MetricRecord::new("cascades.selection.threshold", threshold).emit(),
            MetricRecord::new("cascades.selection.cheap_blocks", cheap_blocks as f64)
                .label("total_blocks", total_blocks)
                .emit(),
        ]
    }

    /// Record one dispatched inference batch
    pub fn record_dispatch(
        rows: usize,
        accepted: usize,
        fallback: usize,
        duration_ms: f64,
    ) -> Vec<MetricRecord> {
        let accept_rate = if rows == 0 {
            0.0
        } else {
            accepted as f64 / rows as f64
        };

        vec![
            MetricRecord::new("cascades.dispatch.duration_ms", duration_ms)
                .label("rows", rows)
                .emit(),
            MetricRecord::new("cascades.dispatch.accept_rate", accept_rate)
                .label("accepted", accepted)
                .label("fallback", fallback)
                .emit(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_dispatch_accept_rate() {
        let records = CascadeMetrics::record_dispatch(1000, 950, 50, 12.5);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].name, "cascades.dispatch.accept_rate");
        assert!((records[1].value - 0.95).abs() < 1e-12);
        assert_eq!(records[1].labels.get("fallback").map(String::as_str), Some("50"));
    }

    #[test]
    fn test_dispatch_empty_batch_has_zero_rate() {
        let records = CascadeMetrics::record_dispatch(0, 0, 0, 0.0);
        assert_eq!(records[1].value, 0.0);
    }

    #[test]
    fn test_selection_labels() {
        let records = CascadeMetrics::record_selection(1, 2, 0.9, 24.173, false);
        assert_eq!(records[0].labels.get("fell_back").map(String::as_str), Some("false"));
        assert_eq!(records[2].value, 1.0);
        assert_eq!(records[2].labels.get("total_blocks").map(String::as_str), Some("2"));
    }

    #[test]
    fn test_profile_run_records() {
        let records = CascadeMetrics::record_profile_run("run-1", 4, 2, 0.25);
        assert_eq!(records[0].labels.get("run_id").map(String::as_str), Some("run-1"));
        assert_eq!(records[1].value, 4.0);
    }
}

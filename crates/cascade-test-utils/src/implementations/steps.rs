//! Instrumented pipeline steps.

use anyhow::Context;
use cascade_core::{DataPacket, FeatureMatrix, Step};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Records the number of rows of every call a step receives
#[derive(Debug, Default)]
pub struct CallLog {
    calls: Mutex<Vec<usize>>,
}

impl CallLog {
    /// Create a shared, empty log
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Record a call over `rows` rows
    pub fn record(&self, rows: usize) {
        self.calls.lock().push(rows);
    }

    /// Row counts of every call so far
    pub fn calls(&self) -> Vec<usize> {
        self.calls.lock().clone()
    }

    /// Number of calls so far
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Rows processed over all calls
    pub fn total_rows(&self) -> usize {
        self.calls.lock().iter().sum()
    }

    /// Forget every recorded call
    pub fn reset(&self) {
        self.calls.lock().clear();
    }
}

fn rows_of<'a>(inputs: &[&'a DataPacket]) -> anyhow::Result<&'a [Value]> {
    inputs
        .first()
        .and_then(|p| p.as_rows())
        .context("expected a row input")
}

/// A step turning each raw row into one feature via `f`
pub fn column_step<F>(id: &str, input: &str, output: &str, f: F) -> Step
where
    F: Fn(&Value) -> f64 + Send + Sync + 'static,
{
    Step::new(id, [input], output, move |inputs| {
        let rows = rows_of(inputs)?;
        Ok(DataPacket::Matrix(FeatureMatrix::column(rows.iter().map(&f).collect())))
    })
}

/// Like [`column_step`], recording every call in `log`
pub fn counting_step<F>(id: &str, input: &str, output: &str, log: Arc<CallLog>, f: F) -> Step
where
    F: Fn(&Value) -> f64 + Send + Sync + 'static,
{
    Step::new(id, [input], output, move |inputs| {
        let rows = rows_of(inputs)?;
        log.record(rows.len());
        Ok(DataPacket::Matrix(FeatureMatrix::column(rows.iter().map(&f).collect())))
    })
}

/// Sleeps for `delay` before emitting one zero column per row
pub fn sleeping_step(id: &str, input: &str, output: &str, delay: Duration) -> Step {
    Step::new(id, [input], output, move |inputs| {
        let rows = inputs.first().and_then(|p| p.num_rows()).unwrap_or(0);
        thread::sleep(delay);
        Ok(DataPacket::Matrix(FeatureMatrix::zeros(rows, 1)))
    })
}

/// Always fails with `message`
pub fn failing_step(id: &str, inputs: &[&str], output: &str, message: &str) -> Step {
    let message = message.to_string();
    Step::new(id, inputs.to_vec(), output, move |_| Err(anyhow::anyhow!(message.clone())))
}

/// Reads a numeric field of a JSON object row, defaulting to 0
pub fn field(name: &'static str) -> impl Fn(&Value) -> f64 + Send + Sync + 'static {
    move |row: &Value| row.get(name).and_then(Value::as_f64).unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_core::PipelineGraph;
    use serde_json::json;
    use std::collections::{HashMap, HashSet};

    fn run_single(step: Step, rows: DataPacket) -> anyhow::Result<DataPacket> {
        let output = step.output().to_string();
        let graph = PipelineGraph::builder().input("rows").step(step).build()?;
        let inputs = HashMap::from([("rows".to_string(), rows)]);
        let mut values = graph.execute(&inputs, &HashSet::new())?;
        values.remove(&output).context("missing output")
    }

    #[test]
    fn test_counting_step_records_rows() {
        let log = CallLog::new();
        let step = counting_step("x", "rows", "x_out", log.clone(), field("x"));
        let rows = DataPacket::rows(vec![json!({"x": 2.0}), json!({"y": 1.0})]);

        let out = run_single(step, rows).unwrap();
        assert_eq!(out.as_matrix().unwrap().row(0), &[2.0]);
        assert_eq!(out.as_matrix().unwrap().row(1), &[0.0]);
        assert_eq!(log.calls(), vec![2]);
        assert_eq!(log.total_rows(), 2);

        log.reset();
        assert_eq!(log.call_count(), 0);
    }

    #[test]
    fn test_failing_step_message() {
        let step = failing_step("boom", &["rows"], "never", "disk on fire");
        let err = run_single(step, DataPacket::rows(vec![json!(1)])).unwrap_err();
        assert!(err.to_string().contains("disk on fire"));
    }

    #[test]
    fn test_sleeping_step_keeps_row_count() {
        let step = sleeping_step("slow", "rows", "slow_out", Duration::from_millis(1));
        let out = run_single(step, DataPacket::rows(vec![json!(1), json!(2), json!(3)])).unwrap();
        assert_eq!(out.num_rows(), Some(3));
    }
}

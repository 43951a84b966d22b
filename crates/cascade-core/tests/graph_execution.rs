//! Graph execution and profiling properties.

use cascade_core::{
    profile, CoreError, DataPacket, FeatureBlock, FeatureMatrix, FeaturePipeline, PipelineGraph, Step,
    StepId,
};
use cascade_monitoring::init_test_tracing;
use cascade_test_utils::{
    column_step, counting_step, failing_step, featurizer_step, field, sleeping_step, CallLog,
    MockFeaturizer,
};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

fn records(n: usize) -> HashMap<String, DataPacket> {
    let rows = (0..n)
        .map(|i| json!({ "a": i as f64 * 0.1, "b": (i % 7) as f64 }))
        .collect();
    HashMap::from([("records".to_string(), DataPacket::Rows(rows))])
}

fn combine(id: &str, left: &str, right: &str, output: &str) -> Step {
    Step::new(id, [left, right], output, |inputs| {
        let l = inputs[0].as_matrix().ok_or_else(|| anyhow::anyhow!("left"))?;
        let r = inputs[1].as_matrix().ok_or_else(|| anyhow::anyhow!("right"))?;
        Ok(DataPacket::Matrix(FeatureMatrix::hstack(&[l, r])?))
    })
}

/// a and b read the records; ab joins them; sink scales ab
fn diamond(log: Arc<CallLog>) -> PipelineGraph {
    PipelineGraph::builder()
        .input("records")
        .step(counting_step("a", "records", "a_out", log, field("a")))
        .step(column_step("b", "records", "b_out", |v: &Value| v["b"].as_f64().unwrap_or(0.0).sqrt()))
        .step(combine("ab", "a_out", "b_out", "ab_out"))
        .step(Step::new("sink", ["ab_out"], "prediction", |inputs| {
            let m = inputs[0].as_matrix().ok_or_else(|| anyhow::anyhow!("matrix"))?;
            let scores = m.iter_rows().map(|r| r.iter().sum::<f64>() / 3.0).collect();
            Ok(DataPacket::Matrix(FeatureMatrix::column(scores)))
        }))
        .sink("sink")
        .build()
        .unwrap()
}

#[test]
fn test_execute_is_deterministic() {
    init_test_tracing();
    let graph = diamond(CallLog::new());
    let inputs = records(64);

    let first = graph.execute(&inputs, &HashSet::new()).unwrap();
    for _ in 0..5 {
        let again = graph.execute(&inputs, &HashSet::new()).unwrap();
        assert_eq!(again.len(), first.len());
        for (name, value) in &first {
            let a = value.as_matrix().unwrap();
            let b = again[name].as_matrix().unwrap();
            let bits_a: Vec<u64> = a.iter_rows().flatten().map(|v| v.to_bits()).collect();
            let bits_b: Vec<u64> = b.iter_rows().flatten().map(|v| v.to_bits()).collect();
            assert_eq!(bits_a, bits_b, "output '{}' differs", name);
        }
    }
}

#[test]
fn test_skipping_never_changes_the_sink_output() {
    let graph = diamond(CallLog::new());
    let inputs = records(16);
    let baseline = graph.execute(&inputs, &HashSet::new()).unwrap();

    let non_sink = ["a", "b", "ab"];
    for mask in 0..(1u32 << non_sink.len()) {
        let skip: HashSet<StepId> = non_sink
            .iter()
            .enumerate()
            .filter(|(bit, _)| mask & (1 << *bit) != 0)
            .map(|(_, id)| StepId::from(*id))
            .collect();
        let out = graph.execute(&inputs, &skip).unwrap();
        assert_eq!(out.get("prediction"), baseline.get("prediction"), "skip set {:?}", skip);
    }
}

#[test]
fn test_unneeded_skipped_step_does_not_run() {
    let log = CallLog::new();
    let graph = PipelineGraph::builder()
        .input("records")
        .step(counting_step("side", "records", "side_out", log.clone(), field("a")))
        .step(column_step("main", "records", "main_out", field("b")))
        .sink("main")
        .build()
        .unwrap();

    let skip = HashSet::from([StepId::from("side")]);
    let out = graph.execute(&records(4), &skip).unwrap();
    assert!(out.contains_key("main_out"));
    assert!(!out.contains_key("side_out"));
    assert_eq!(log.call_count(), 0);
}

#[test]
fn test_doubling_work_does_not_decrease_measured_cost() {
    init_test_tracing();
    let graph = PipelineGraph::builder()
        .input("records")
        .step(sleeping_step("light", "records", "light_out", Duration::from_millis(10)))
        .step(sleeping_step("heavy", "records", "heavy_out", Duration::from_millis(20)))
        .build()
        .unwrap();

    // Sleep only guarantees a lower bound, so allow some scheduling noise
    let noise = 0.005;
    for _ in 0..2 {
        let report = profile(&graph, &records(2), 3).unwrap();
        let light = &report.step_costs["light"];
        let heavy = &report.step_costs["heavy"];
        assert_eq!(heavy.samples, 2);
        assert!(heavy.min_secs >= 0.020);
        assert!(
            heavy.mean_secs + noise >= light.mean_secs,
            "heavy {} < light {}",
            heavy.mean_secs,
            light.mean_secs
        );
    }
}

#[test]
fn test_profiling_failure_names_the_step() {
    let graph = PipelineGraph::builder()
        .input("records")
        .step(column_step("ok", "records", "ok_out", field("a")))
        .step(failing_step("vectorize", &["ok_out"], "vec_out", "vocabulary missing"))
        .build()
        .unwrap();

    let err = profile(&graph, &records(3), 2).unwrap_err();
    match err {
        CoreError::StepExecutionError { step, message } => {
            assert_eq!(step, "vectorize");
            assert!(message.contains("vocabulary missing"));
        }
        other => panic!("Expected StepExecutionError, got {:?}", other),
    }
}

#[test]
fn test_profile_attributes_block_costs() {
    let graph = PipelineGraph::builder()
        .input("records")
        .step(sleeping_step("slow", "records", "slow_out", Duration::from_millis(15)))
        .step(column_step("fast", "records", "fast_out", field("a")))
        .build()
        .unwrap();
    let pipeline = FeaturePipeline::new(
        graph,
        vec![FeatureBlock::new("slow", "slow_out"), FeatureBlock::new("fast", "fast_out")],
    )
    .unwrap();

    let report = profile(pipeline.graph(), &records(8), 2).unwrap();
    let costs = report.feature_block_costs(&pipeline);
    assert_eq!(costs.len(), 2);
    assert!(costs[0] >= 0.015);
    assert!(costs[0] > costs[1]);
}

#[test]
fn test_mocked_featurizer_runs_once_per_pass() {
    let mut embed = MockFeaturizer::new();
    embed
        .expect_featurize()
        .times(3)
        .returning(|rows| Ok(FeatureMatrix::zeros(rows.len(), 4)));

    let graph = PipelineGraph::builder()
        .input("records")
        .step(featurizer_step("embed", "records", "embedding", embed))
        .build()
        .unwrap();

    let report = profile(&graph, &records(5), 3).unwrap();
    assert_eq!(report.step_costs["embed"].samples, 2);
    assert_eq!(report.outputs["embedding"].as_matrix().unwrap().cols(), 4);
}

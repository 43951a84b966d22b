use crate::application::executor::{ExecutionPlan, StepObserver};
use crate::domain::feature_block::FeaturePipeline;
use crate::domain::graph::PipelineGraph;
use crate::domain::step::Step;
use crate::{CoreError, DataPacket};
use cascade_monitoring::CascadeMetrics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::{Duration, Instant};
use tracing::{error, info};
use uuid::Uuid;

/// Wall-clock statistics for one step over the timed passes
///
/// Maintained with Welford's online algorithm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepCost {
    /// Mean elapsed seconds
    pub mean_secs: f64,
    /// Sample standard deviation in seconds
    pub stddev_secs: f64,
    /// Fastest observed pass
    pub min_secs: f64,
    /// Slowest observed pass
    pub max_secs: f64,
    /// Number of timed passes
    pub samples: usize,
    #[serde(skip)]
    m2: f64,
}

impl Default for StepCost {
    fn default() -> Self {
        Self {
            mean_secs: 0.0,
            stddev_secs: 0.0,
            min_secs: f64::MAX,
            max_secs: 0.0,
            samples: 0,
            m2: 0.0,
        }
    }
}

impl StepCost {
    /// Fold in one observation
    pub fn update(&mut self, secs: f64) {
        self.samples += 1;
        self.min_secs = self.min_secs.min(secs);
        self.max_secs = self.max_secs.max(secs);

        let delta = secs - self.mean_secs;
        self.mean_secs += delta / self.samples as f64;
        let delta2 = secs - self.mean_secs;
        self.m2 += delta * delta2;

        if self.samples > 1 {
            self.stddev_secs = (self.m2 / (self.samples - 1) as f64).sqrt();
        }
    }
}

/// Result of one profiling run
#[derive(Debug, Clone)]
pub struct ProfileReport {
    /// Identifier for log correlation
    pub run_id: Uuid,
    /// When profiling started
    pub started_at: DateTime<Utc>,
    /// Passes executed, including the discarded warm-up
    pub repetitions: usize,
    /// Per-step statistics keyed by step ID
    pub step_costs: BTreeMap<String, StepCost>,
    /// Every step output from the last pass
    pub outputs: HashMap<String, DataPacket>,
}

impl ProfileReport {
    /// Mean cost of a step in seconds, zero if it never ran
    pub fn mean_cost(&self, step_id: &str) -> f64 {
        self.step_costs.get(step_id).map(|c| c.mean_secs).unwrap_or(0.0)
    }

    /// Attribute step costs to feature blocks, indexed like `pipeline.blocks()`
    ///
    /// A block pays for its producing step plus any ancestor steps that no
    /// other block's producer depends on. Blocks sharing a producer split that
    /// total evenly. Ancestors shared between producers are charged to no block.
    pub fn feature_block_costs(&self, pipeline: &FeaturePipeline) -> Vec<f64> {
        block_costs(pipeline, |step| self.mean_cost(step.id().as_str()))
    }
}

pub(crate) fn block_costs(pipeline: &FeaturePipeline, cost_of: impl Fn(&Step) -> f64) -> Vec<f64> {
    let graph: &PipelineGraph = pipeline.graph();
    let producers: Vec<usize> = pipeline
        .blocks()
        .iter()
        .filter_map(|b| graph.producer_index(&b.output))
        .collect();
    let distinct: BTreeSet<usize> = producers.iter().copied().collect();

    let lineages: BTreeMap<usize, BTreeSet<usize>> = distinct
        .iter()
        .map(|&p| {
            let output = graph.steps()[p].output();
            (p, graph.required_steps([output]))
        })
        .collect();

    let group_cost: BTreeMap<usize, f64> = lineages
        .iter()
        .map(|(&p, lineage)| {
            let exclusive: f64 = lineage
                .iter()
                .filter(|&&a| a != p && !distinct.contains(&a))
                .filter(|&&a| {
                    lineages
                        .iter()
                        .all(|(&q, other)| q == p || !other.contains(&a))
                })
                .map(|&a| cost_of(&graph.steps()[a]))
                .sum();
            (p, cost_of(&graph.steps()[p]) + exclusive)
        })
        .collect();

    producers
        .iter()
        .map(|p| {
            let share = producers.iter().filter(|&q| q == p).count() as f64;
            group_cost.get(p).copied().unwrap_or(0.0) / share
        })
        .collect()
}

struct TimingObserver<'a> {
    timed: bool,
    costs: &'a mut BTreeMap<String, StepCost>,
}

impl StepObserver for TimingObserver<'_> {
    fn on_step_complete(&mut self, step: &Step, elapsed: Duration) {
        if self.timed {
            self.costs
                .entry(step.id().to_string())
                .or_default()
                .update(elapsed.as_secs_f64());
        }
    }
}

/// Measures per-step cost by running the graph repeatedly
///
/// The first pass is a warm-up and is not timed. The graph is only observed,
/// never modified.
#[derive(Debug, Clone)]
pub struct StepProfiler {
    repetitions: usize,
    batch_rows: Option<usize>,
}

impl StepProfiler {
    /// Create a profiler; at least two repetitions are required
    pub fn new(repetitions: usize) -> Result<Self, CoreError> {
        if repetitions < 2 {
            return Err(CoreError::ValidationError(format!(
                "Profiling needs a warm-up pass and at least one timed pass, got {} repetitions",
                repetitions
            )));
        }
        Ok(Self {
            repetitions,
            batch_rows: None,
        })
    }

    /// Reject row-aligned step outputs that do not have `rows` rows
    pub fn with_batch_rows(mut self, rows: usize) -> Self {
        self.batch_rows = Some(rows);
        self
    }

    /// Number of passes, including the warm-up
    pub fn repetitions(&self) -> usize {
        self.repetitions
    }

    /// Profile `graph` on `inputs`
    pub fn profile(
        &self,
        graph: &PipelineGraph,
        inputs: &HashMap<String, DataPacket>,
    ) -> Result<ProfileReport, CoreError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let clock = Instant::now();
        let mut step_costs = BTreeMap::new();
        let mut outputs = HashMap::new();

        info!(%run_id, repetitions = self.repetitions, steps = graph.len(), "Profiling pipeline");

        for pass in 0..self.repetitions {
            let mut observer = TimingObserver {
                timed: pass > 0,
                costs: &mut step_costs,
            };
            let mut plan = ExecutionPlan::new(graph);
            if let Some(rows) = self.batch_rows {
                plan = plan.batch_rows(rows);
            }
            outputs = plan
                .run(inputs, Some(&mut observer))
                .map_err(|e| {
                    error!(%run_id, pass, error = %e, "Profiling aborted");
                    e
                })?;
        }

        CascadeMetrics::record_profile_run(
            &run_id.to_string(),
            graph.len(),
            self.repetitions,
            clock.elapsed().as_secs_f64(),
        );

        Ok(ProfileReport {
            run_id,
            started_at,
            repetitions: self.repetitions,
            step_costs,
            outputs,
        })
    }
}

/// Profile `graph` with the given number of passes
pub fn profile(
    graph: &PipelineGraph,
    inputs: &HashMap<String, DataPacket>,
    repetitions: usize,
) -> Result<ProfileReport, CoreError> {
    StepProfiler::new(repetitions)?.profile(graph, inputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::feature_block::FeatureBlock;
    use crate::FeatureMatrix;

    fn constant(id: &str, inputs: &[&str], output: &str) -> Step {
        Step::new(id, inputs.to_vec(), output, |_| {
            Ok(DataPacket::Matrix(FeatureMatrix::column(vec![1.0])))
        })
    }

    #[test]
    fn test_welford_matches_direct_computation() {
        let mut cost = StepCost::default();
        for x in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            cost.update(x);
        }
        assert_eq!(cost.samples, 8);
        assert!((cost.mean_secs - 5.0).abs() < 1e-12);
        // sample variance is 32 / 7
        assert!((cost.stddev_secs - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);
        assert_eq!(cost.min_secs, 2.0);
        assert_eq!(cost.max_secs, 9.0);
    }

    #[test]
    fn test_requires_warm_up_pass() {
        assert!(StepProfiler::new(1).is_err());
        assert_eq!(StepProfiler::new(3).unwrap().repetitions(), 3);
    }

    #[test]
    fn test_profile_discards_first_pass() {
        let graph = PipelineGraph::builder()
            .input("x")
            .step(constant("a", &["x"], "a_out"))
            .step(constant("b", &["a_out"], "b_out"))
            .build()
            .unwrap();
        let inputs = HashMap::from([("x".to_string(), DataPacket::rows(vec![1]))]);

        let report = profile(&graph, &inputs, 3).unwrap();
        assert_eq!(report.repetitions, 3);
        assert_eq!(report.step_costs["a"].samples, 2);
        assert_eq!(report.step_costs["b"].samples, 2);
        assert!(report.outputs.contains_key("b_out"));
    }

    #[test]
    fn test_block_cost_attribution() {
        // tokenize feeds only tfidf; clean feeds both producers
        let graph = PipelineGraph::builder()
            .input("text")
            .step(constant("clean", &["text"], "cleaned"))
            .step(constant("tokenize", &["cleaned"], "tokens"))
            .step(constant("tfidf", &["tokens"], "tfidf"))
            .step(constant("length", &["cleaned"], "length"))
            .step(constant("model", &["tfidf", "length"], "model"))
            .build()
            .unwrap();
        let pipeline = FeaturePipeline::new(
            graph,
            vec![
                FeatureBlock::new("tfidf", "tfidf"),
                FeatureBlock::new("length_a", "length").with_columns(0..1),
                FeatureBlock::new("length_b", "length").with_columns(0..1),
            ],
        )
        .unwrap();

        let costs = HashMap::from([
            ("clean", 100.0),
            ("tokenize", 20.0),
            ("tfidf", 70.0),
            ("length", 4.0),
            ("model", 1000.0),
        ]);
        let attributed = block_costs(&pipeline, |s| costs[s.id().as_str()]);
        assert_eq!(attributed, vec![90.0, 2.0, 2.0]);
    }
}

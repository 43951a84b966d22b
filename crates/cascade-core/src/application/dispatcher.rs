use crate::application::evaluation::{self, approximate_label, is_confident};
use crate::application::executor::ExecutionPlan;
use crate::domain::artifact::CascadeArtifact;
use crate::domain::feature_block::FeaturePipeline;
use crate::{CascadeModel, CoreError, DataPacket, FeatureMatrix};
use cascade_monitoring::CascadeMetrics;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, info};

/// Predictions for one batch and how each row was answered
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DispatchOutcome {
    /// One prediction per input row, in input order
    pub predictions: Vec<bool>,
    /// Rows answered by the approximate model
    pub accepted_rows: Vec<usize>,
    /// Rows sent through the full model
    pub fallback_rows: Vec<usize>,
}

/// Dispatcher states for a single batch
enum DispatchState {
    CheapEval,
    ConfidenceCheck {
        cheap_values: HashMap<String, DataPacket>,
        confidence: Vec<f64>,
    },
    Accept {
        cheap_values: HashMap<String, DataPacket>,
        confidence: Vec<f64>,
        confident: Vec<usize>,
        uncertain: Vec<usize>,
    },
    FullEval {
        cheap_values: HashMap<String, DataPacket>,
        uncertain: Vec<usize>,
    },
    Merge,
    Done,
}

impl DispatchState {
    fn name(&self) -> &'static str {
        match self {
            DispatchState::CheapEval => "cheap_eval",
            DispatchState::ConfidenceCheck { .. } => "confidence_check",
            DispatchState::Accept { .. } => "accept",
            DispatchState::FullEval { .. } => "full_eval",
            DispatchState::Merge => "merge",
            DispatchState::Done => "done",
        }
    }
}

/// Two-tier inference over a feature pipeline
///
/// Every row gets the cheap feature blocks and the approximate model. Rows the
/// approximate model is unsure about get the remaining blocks, computed for
/// those rows only, and the full model's prediction. Step outputs computed in
/// the cheap pass are reused, never recomputed: row-aligned values are narrowed
/// to the uncertain rows and scalars are passed through as computed on the
/// whole batch. Every row-aligned step output must have one row per batch row.
///
/// A disabled artifact skips the cheap pass and sends every row to the full
/// model. The artifact is only read, so one dispatcher can serve concurrent
/// batches.
pub struct CascadeDispatcher<'a, M: CascadeModel> {
    pipeline: &'a FeaturePipeline,
    artifact: &'a CascadeArtifact<M::Model>,
    model_ops: &'a M,
}

impl<'a, M: CascadeModel> CascadeDispatcher<'a, M> {
    /// Create a dispatcher, rejecting artifacts that do not fit the pipeline
    pub fn new(
        pipeline: &'a FeaturePipeline,
        artifact: &'a CascadeArtifact<M::Model>,
        model_ops: &'a M,
    ) -> Result<Self, CoreError> {
        artifact.validate_against(pipeline)?;
        Ok(Self {
            pipeline,
            artifact,
            model_ops,
        })
    }

    /// Predict one batch
    pub fn dispatch(&self, inputs: &HashMap<String, DataPacket>) -> Result<DispatchOutcome, CoreError> {
        let rows = self.pipeline.batch_rows(inputs)?;
        if rows == 0 {
            return Ok(DispatchOutcome::default());
        }

        let started = Instant::now();
        let cheap_set = &self.artifact.selected_feature_indices;
        let mut slots: Vec<Option<bool>> = vec![None; rows];
        let mut outcome = DispatchOutcome::default();
        let mut state = if self.artifact.is_disabled(self.pipeline.num_blocks()) {
            DispatchState::FullEval {
                cheap_values: HashMap::new(),
                uncertain: (0..rows).collect(),
            }
        } else {
            DispatchState::CheapEval
        };

        loop {
            debug!(state = state.name(), rows, "Dispatch state");
            state = match state {
                DispatchState::CheapEval => {
                    let cheap_values = ExecutionPlan::new(self.pipeline.graph())
                        .targets(self.pipeline.outputs_for(cheap_set))
                        .batch_rows(rows)
                        .run(inputs, None)?;
                    let cheap_blocks = self.pipeline.extract(&cheap_values, cheap_set)?;
                    let refs: Vec<&FeatureMatrix> = cheap_blocks.iter().collect();
                    let confidence = evaluation::confidence(
                        self.model_ops,
                        &self.artifact.approximate_model,
                        &refs,
                        rows,
                    )?;
                    DispatchState::ConfidenceCheck {
                        cheap_values,
                        confidence,
                    }
                }
                DispatchState::ConfidenceCheck {
                    cheap_values,
                    confidence,
                } => {
                    let threshold = self.artifact.cascade_threshold;
                    let (confident, uncertain): (Vec<usize>, Vec<usize>) =
                        (0..rows).partition(|&i| is_confident(confidence[i], threshold));
                    DispatchState::Accept {
                        cheap_values,
                        confidence,
                        confident,
                        uncertain,
                    }
                }
                DispatchState::Accept {
                    cheap_values,
                    confidence,
                    confident,
                    uncertain,
                } => {
                    for &i in &confident {
                        slots[i] = Some(approximate_label(confidence[i]));
                    }
                    outcome.accepted_rows = confident;
                    if uncertain.is_empty() {
                        DispatchState::Merge
                    } else {
                        DispatchState::FullEval {
                            cheap_values,
                            uncertain,
                        }
                    }
                }
                DispatchState::FullEval {
                    cheap_values,
                    uncertain,
                } => {
                    let predictions = self.full_eval(inputs, &cheap_values, &uncertain)?;
                    for (&i, p) in uncertain.iter().zip(predictions) {
                        slots[i] = Some(p);
                    }
                    outcome.fallback_rows = uncertain;
                    DispatchState::Merge
                }
                DispatchState::Merge => {
                    outcome.predictions = slots
                        .iter()
                        .enumerate()
                        .map(|(i, p)| {
                            p.ok_or_else(|| {
                                CoreError::Other(format!("Row {} was not assigned a prediction", i))
                            })
                        })
                        .collect::<Result<_, _>>()?;
                    DispatchState::Done
                }
                DispatchState::Done => break,
            };
        }

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        info!(
            rows,
            accepted = outcome.accepted_rows.len(),
            fallback = outcome.fallback_rows.len(),
            elapsed_ms,
            "Dispatched batch"
        );
        CascadeMetrics::record_dispatch(
            rows,
            outcome.accepted_rows.len(),
            outcome.fallback_rows.len(),
            elapsed_ms,
        );
        Ok(outcome)
    }

    /// Compute every block for the `uncertain` rows, reusing the cheap pass
    fn full_eval(
        &self,
        inputs: &HashMap<String, DataPacket>,
        cheap_values: &HashMap<String, DataPacket>,
        uncertain: &[usize],
    ) -> Result<Vec<bool>, CoreError> {
        let mut subset = HashMap::with_capacity(inputs.len());
        for (name, packet) in inputs {
            subset.insert(name.clone(), packet.select_rows(uncertain)?);
        }

        let all = self.pipeline.all_indices();
        let mut plan = ExecutionPlan::new(self.pipeline.graph())
            .targets(self.pipeline.outputs_for(&all))
            .batch_rows(uncertain.len());
        for (name, packet) in cheap_values {
            plan = plan.seed(name.clone(), packet.select_rows(uncertain)?);
        }

        let values = plan.run(&subset, None)?;
        let blocks = self.pipeline.extract(&values, &all)?;
        let refs: Vec<&FeatureMatrix> = blocks.iter().collect();
        evaluation::predict(self.model_ops, &self.artifact.full_model, &refs, uncertain.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::feature_block::FeatureBlock;
    use crate::domain::graph::PipelineGraph;
    use crate::domain::step::Step;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Confidence is column 0 of the first block; predictions threshold it
    #[derive(Default)]
    struct FirstColumn {
        confidence_calls: AtomicUsize,
    }

    impl CascadeModel for FirstColumn {
        type Model = ();

        fn train(&self, _labels: &[bool], _blocks: &[&FeatureMatrix]) -> anyhow::Result<()> {
            Ok(())
        }

        fn predict(&self, _model: &(), blocks: &[&FeatureMatrix]) -> anyhow::Result<Vec<bool>> {
            Ok(blocks[0].iter_rows().map(|r| r[0] >= 0.5).collect())
        }

        fn confidence(&self, _model: &(), blocks: &[&FeatureMatrix]) -> anyhow::Result<Vec<f64>> {
            self.confidence_calls.fetch_add(1, Ordering::SeqCst);
            Ok(blocks[0].iter_rows().map(|r| r[0]).collect())
        }

        fn score(&self, truth: &[bool], predicted: &[bool]) -> f64 {
            truth.iter().zip(predicted).filter(|(a, b)| a == b).count() as f64
        }
    }

    /// Block 0 reads an exact score; block 1 is a noisy copy
    fn pipeline(expensive_calls: Arc<AtomicUsize>) -> FeaturePipeline {
        let graph = PipelineGraph::builder()
            .input("score")
            .step(Step::new("exact", ["score"], "exact", move |inputs| {
                let values = inputs[0].as_rows().ok_or_else(|| anyhow::anyhow!("rows"))?;
                expensive_calls.fetch_add(values.len(), Ordering::SeqCst);
                let col = values.iter().map(|v| v.as_f64().unwrap_or(0.0)).collect();
                Ok(DataPacket::Matrix(FeatureMatrix::column(col)))
            }))
            .step(Step::new("rough", ["score"], "rough", |inputs| {
                let values = inputs[0].as_rows().ok_or_else(|| anyhow::anyhow!("rows"))?;
                let col = values
                    .iter()
                    .map(|v| {
                        let s = v.as_f64().unwrap_or(0.0);
                        if s > 0.5 { 0.95 } else if s < 0.5 { 0.05 } else { 0.5 }
                    })
                    .collect();
                Ok(DataPacket::Matrix(FeatureMatrix::column(col)))
            }))
            .build()
            .unwrap();
        FeaturePipeline::new(
            graph,
            vec![FeatureBlock::new("exact", "exact"), FeatureBlock::new("rough", "rough")],
        )
        .unwrap()
    }

    fn artifact() -> CascadeArtifact<()> {
        CascadeArtifact {
            selected_feature_indices: vec![1],
            cascade_threshold: 0.9,
            approximate_model: (),
            full_model: (),
        }
    }

    #[test]
    fn test_uncertain_rows_use_full_model() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pipeline = pipeline(calls.clone());
        let artifact = artifact();
        let model = FirstColumn::default();
        let dispatcher = CascadeDispatcher::new(&pipeline, &artifact, &model).unwrap();

        let inputs = HashMap::from([(
            "score".to_string(),
            DataPacket::rows(vec![0.9, 0.5, 0.1, 0.5]),
        )]);
        let outcome = dispatcher.dispatch(&inputs).unwrap();

        assert_eq!(outcome.accepted_rows, vec![0, 2]);
        assert_eq!(outcome.fallback_rows, vec![1, 3]);
        assert_eq!(outcome.predictions, vec![true, true, false, true]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_zero_rows_short_circuit() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pipeline = pipeline(calls.clone());
        let artifact = artifact();
        let model = FirstColumn::default();
        let dispatcher = CascadeDispatcher::new(&pipeline, &artifact, &model).unwrap();

        let inputs = HashMap::from([("score".to_string(), DataPacket::Rows(Vec::new()))]);
        assert_eq!(dispatcher.dispatch(&inputs).unwrap(), DispatchOutcome::default());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_mismatched_artifact_is_rejected() {
        let pipeline = pipeline(Arc::new(AtomicUsize::new(0)));
        let mut artifact = artifact();
        artifact.selected_feature_indices = vec![4];
        assert!(matches!(
            CascadeDispatcher::new(&pipeline, &artifact, &FirstColumn::default()),
            Err(CoreError::ArtifactMismatchError(_))
        ));
    }

    #[test]
    fn test_disabled_artifact_goes_straight_to_full_model() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pipeline = pipeline(calls.clone());
        let artifact = CascadeArtifact {
            selected_feature_indices: vec![0, 1],
            cascade_threshold: 1.0,
            approximate_model: (),
            full_model: (),
        };
        let model = FirstColumn::default();
        let dispatcher = CascadeDispatcher::new(&pipeline, &artifact, &model).unwrap();

        let inputs = HashMap::from([(
            "score".to_string(),
            DataPacket::rows(vec![0.9, 0.5, 0.1]),
        )]);
        let outcome = dispatcher.dispatch(&inputs).unwrap();

        assert!(outcome.accepted_rows.is_empty());
        assert_eq!(outcome.fallback_rows, vec![0, 1, 2]);
        assert_eq!(outcome.predictions, vec![true, true, false]);
        assert_eq!(model.confidence_calls.load(Ordering::SeqCst), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}

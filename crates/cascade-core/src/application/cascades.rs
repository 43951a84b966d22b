use crate::application::dispatcher::{CascadeDispatcher, DispatchOutcome};
use crate::application::evaluation;
use crate::application::executor::ExecutionPlan;
use crate::application::importance::ImportanceEstimator;
use crate::application::profiler::{StepCost, StepProfiler};
use crate::application::selector::{CascadeSelector, SelectionReport};
use crate::config::CascadeConfig;
use crate::domain::artifact::CascadeArtifact;
use crate::domain::feature_block::FeaturePipeline;
use crate::{CascadeModel, CoreError, DataPacket, FeatureMatrix};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::info;
use uuid::Uuid;

/// Diagnostics from a training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    /// When training finished
    pub trained_at: DateTime<Utc>,
    /// Profiling run identifier
    pub profile_run_id: Uuid,
    /// Per-step cost statistics
    pub step_costs: BTreeMap<String, StepCost>,
    /// Cost attributed to each feature block
    pub block_costs: Vec<f64>,
    /// Importance of each feature block
    pub importances: Vec<f64>,
    /// Selector diagnostics
    pub selection: SelectionReport,
}

/// Artifact and diagnostics returned by [`train_cascades`]
#[derive(Debug, Clone)]
pub struct TrainingOutcome<M> {
    /// The artifact to persist and hand to [`run_cascades`]
    pub artifact: CascadeArtifact<M>,
    /// How it was produced
    pub report: TrainingReport,
}

/// Train a cascade for `pipeline`
///
/// Profiles the graph, attributes step costs to feature blocks, estimates
/// block importance and runs the selector. Feature values come from the last
/// profiling pass.
///
/// A zero-row batch is a `ValidationError` rather than an empty result: there
/// is nothing to train either model on, so no artifact can be produced.
/// Inference over zero rows returns an empty prediction vector.
pub fn train_cascades<M: CascadeModel>(
    pipeline: &FeaturePipeline,
    inputs: &HashMap<String, DataPacket>,
    labels: &[bool],
    model_ops: &M,
    config: &CascadeConfig,
) -> Result<TrainingOutcome<M::Model>, CoreError> {
    config.validate()?;
    let rows = pipeline.batch_rows(inputs)?;
    if rows == 0 {
        return Err(CoreError::ValidationError(
            "Cannot train a cascade on zero rows".to_string(),
        ));
    }
    if labels.len() != rows {
        return Err(CoreError::ValidationError(format!(
            "Got {} labels for {} rows",
            labels.len(),
            rows
        )));
    }

    info!(rows, blocks = pipeline.num_blocks(), "Training cascade");

    let profile = StepProfiler::new(config.profiling_repetitions)?
        .with_batch_rows(rows)
        .profile(pipeline.graph(), inputs)?;
    let block_costs = profile.feature_block_costs(pipeline);
    let blocks = pipeline.extract(&profile.outputs, &pipeline.all_indices())?;

    let importances = ImportanceEstimator::new(model_ops, config).estimate(&blocks, labels)?;
    let selection =
        CascadeSelector::new(model_ops, config).select(&blocks, labels, &block_costs, &importances)?;

    Ok(TrainingOutcome {
        artifact: selection.artifact,
        report: TrainingReport {
            trained_at: Utc::now(),
            profile_run_id: profile.run_id,
            step_costs: profile.step_costs,
            block_costs,
            importances,
            selection: selection.report,
        },
    })
}

/// Predict with a trained cascade
pub fn run_cascades<M: CascadeModel>(
    pipeline: &FeaturePipeline,
    artifact: &CascadeArtifact<M::Model>,
    inputs: &HashMap<String, DataPacket>,
    model_ops: &M,
) -> Result<Vec<bool>, CoreError> {
    dispatch_cascades(pipeline, artifact, inputs, model_ops).map(|outcome| outcome.predictions)
}

/// Predict with a trained cascade, reporting which rows took which path
pub fn dispatch_cascades<M: CascadeModel>(
    pipeline: &FeaturePipeline,
    artifact: &CascadeArtifact<M::Model>,
    inputs: &HashMap<String, DataPacket>,
    model_ops: &M,
) -> Result<DispatchOutcome, CoreError> {
    CascadeDispatcher::new(pipeline, artifact, model_ops)?.dispatch(inputs)
}

/// Predict without cascading: every block, full model
pub fn predict_full<M: CascadeModel>(
    pipeline: &FeaturePipeline,
    full_model: &M::Model,
    inputs: &HashMap<String, DataPacket>,
    model_ops: &M,
) -> Result<Vec<bool>, CoreError> {
    let rows = pipeline.batch_rows(inputs)?;
    if rows == 0 {
        return Ok(Vec::new());
    }
    let all = pipeline.all_indices();
    let values = ExecutionPlan::new(pipeline.graph())
        .targets(pipeline.outputs_for(&all))
        .batch_rows(rows)
        .run(inputs, None)?;
    let blocks = pipeline.extract(&values, &all)?;
    let refs: Vec<&FeatureMatrix> = blocks.iter().collect();
    evaluation::predict(model_ops, full_model, &refs, rows)
}

//!
//! Cascade Core - cost-aware two-tier inference for binary classifiers
//!
//! A pipeline is described as a graph of named steps. Training profiles the
//! graph, estimates how predictive each feature block is and selects a cheap
//! subset of blocks plus a confidence threshold. At inference time the
//! dispatcher computes the cheap blocks for every row and the expensive ones
//! only for rows the approximate model is unsure about.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Domain layer - steps, graphs, feature blocks and artifacts
pub mod domain;

/// Application services - execution, profiling, selection and dispatch
pub mod application;

/// Core types
pub mod types;

/// Error types
pub mod error;

/// Training configuration
pub mod config;

// Re-export key types
pub use error::CoreError;
pub use types::{DataPacket, FeatureMatrix};

pub use config::{CascadeConfig, ImportanceMethod};
pub use domain::artifact::CascadeArtifact;
pub use domain::feature_block::{FeatureBlock, FeaturePipeline};
pub use domain::graph::{GraphBuilder, PipelineGraph};
pub use domain::step::{Step, StepComputation, StepId};

pub use application::cascades::{
    dispatch_cascades, predict_full, run_cascades, train_cascades, TrainingOutcome, TrainingReport,
};
pub use application::dispatcher::{CascadeDispatcher, DispatchOutcome};
pub use application::executor::{ExecutionPlan, StepObserver};
pub use application::importance::{estimate_importance, ImportanceEstimator};
pub use application::profiler::{profile, ProfileReport, StepCost, StepProfiler};
pub use application::selector::{
    CascadeSelector, ConfigurationEvaluation, SelectionOutcome, SelectionReport,
};

/// The four model callbacks a cascade is built from
///
/// Feature blocks are always passed in ascending block-index order. `predict`
/// and `confidence` must return one value per row, and an empty vector for
/// zero-row input. Confidence is interpreted as P(label = true).
pub trait CascadeModel: Send + Sync {
    /// Trained model state
    type Model: Send + Sync;

    /// Train on an arbitrary non-empty subset of feature blocks
    fn train(&self, labels: &[bool], feature_blocks: &[&FeatureMatrix]) -> anyhow::Result<Self::Model>;

    /// Predict one label per row
    fn predict(&self, model: &Self::Model, feature_blocks: &[&FeatureMatrix]) -> anyhow::Result<Vec<bool>>;

    /// Probability of the positive class per row, in [0, 1]
    fn confidence(&self, model: &Self::Model, feature_blocks: &[&FeatureMatrix]) -> anyhow::Result<Vec<f64>>;

    /// Quality of `predicted` against `true_labels`; higher is better
    fn score(&self, true_labels: &[bool], predicted: &[bool]) -> f64;
}

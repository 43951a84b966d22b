//! Holdout splitting and contract-checked model callbacks.

use crate::{CascadeModel, CoreError, FeatureMatrix};

/// Tolerance used when comparing confidences against a threshold
pub const CONFIDENCE_EPSILON: f64 = 1e-9;

/// Whether a row with confidence `c` is answered by the approximate model
///
/// Both tails count. A threshold of 1.0 or more disables the cascade, so no
/// row is confident.
#[inline]
pub fn is_confident(c: f64, threshold: f64) -> bool {
    threshold < 1.0
        && (c >= threshold - CONFIDENCE_EPSILON || c <= 1.0 - threshold + CONFIDENCE_EPSILON)
}

/// The approximate model's answer for a confident row
#[inline]
pub fn approximate_label(c: f64) -> bool {
    c >= 0.5
}

/// Deterministic train/validation split
///
/// Row `i` is held out for validation when `i % stride == 0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoldoutSplit {
    /// Rows used to fit models
    pub train: Vec<usize>,
    /// Rows used to score models
    pub validation: Vec<usize>,
}

impl HoldoutSplit {
    /// Split `rows` rows with the given stride
    pub fn new(rows: usize, stride: usize) -> Result<Self, CoreError> {
        if stride < 2 {
            return Err(CoreError::ConfigurationError(format!(
                "holdout stride must be at least 2, got {}",
                stride
            )));
        }
        let (validation, train): (Vec<usize>, Vec<usize>) = (0..rows).partition(|i| i % stride == 0);
        if train.is_empty() || validation.is_empty() {
            return Err(CoreError::ValidationError(format!(
                "{} rows are too few for a train/validation split",
                rows
            )));
        }
        Ok(Self { train, validation })
    }
}

/// Feature blocks and labels materialized for both sides of a split
#[derive(Debug, Clone)]
pub(crate) struct SplitData {
    pub train_labels: Vec<bool>,
    pub train_blocks: Vec<FeatureMatrix>,
    pub validation_labels: Vec<bool>,
    pub validation_blocks: Vec<FeatureMatrix>,
}

impl SplitData {
    pub fn new(
        blocks: &[FeatureMatrix],
        labels: &[bool],
        split: &HoldoutSplit,
    ) -> Result<Self, CoreError> {
        let pick = |rows: &[usize]| -> Result<Vec<FeatureMatrix>, CoreError> {
            blocks.iter().map(|b| b.select_rows(rows)).collect()
        };
        Ok(Self {
            train_labels: split.train.iter().map(|&i| labels[i]).collect(),
            train_blocks: pick(&split.train)?,
            validation_labels: split.validation.iter().map(|&i| labels[i]).collect(),
            validation_blocks: pick(&split.validation)?,
        })
    }

    pub fn train_view(&self, indices: &[usize]) -> Vec<&FeatureMatrix> {
        indices.iter().map(|&i| &self.train_blocks[i]).collect()
    }

    pub fn validation_view(&self, indices: &[usize]) -> Vec<&FeatureMatrix> {
        indices.iter().map(|&i| &self.validation_blocks[i]).collect()
    }
}

/// Check that every block has the same number of rows as there are labels
pub(crate) fn check_aligned(blocks: &[FeatureMatrix], labels: &[bool]) -> Result<(), CoreError> {
    if let Some((i, block)) = blocks
        .iter()
        .enumerate()
        .find(|(_, b)| b.rows() != labels.len())
    {
        return Err(CoreError::ValidationError(format!(
            "Feature block {} has {} rows but there are {} labels",
            i,
            block.rows(),
            labels.len()
        )));
    }
    Ok(())
}

pub(crate) fn train<M: CascadeModel>(
    ops: &M,
    labels: &[bool],
    blocks: &[&FeatureMatrix],
) -> Result<M::Model, CoreError> {
    ops.train(labels, blocks)
        .map_err(|e| CoreError::model("train failed", e))
}

pub(crate) fn predict<M: CascadeModel>(
    ops: &M,
    model: &M::Model,
    blocks: &[&FeatureMatrix],
    rows: usize,
) -> Result<Vec<bool>, CoreError> {
    let predictions = ops
        .predict(model, blocks)
        .map_err(|e| CoreError::model("predict failed", e))?;
    if predictions.len() != rows {
        return Err(CoreError::ModelError(format!(
            "predict returned {} values for {} rows",
            predictions.len(),
            rows
        )));
    }
    Ok(predictions)
}

pub(crate) fn confidence<M: CascadeModel>(
    ops: &M,
    model: &M::Model,
    blocks: &[&FeatureMatrix],
    rows: usize,
) -> Result<Vec<f64>, CoreError> {
    let confidence = ops
        .confidence(model, blocks)
        .map_err(|e| CoreError::model("confidence failed", e))?;
    if confidence.len() != rows {
        return Err(CoreError::ModelError(format!(
            "confidence returned {} values for {} rows",
            confidence.len(),
            rows
        )));
    }
    if let Some(bad) = confidence.iter().find(|c| !(0.0..=1.0).contains(*c)) {
        return Err(CoreError::ModelError(format!(
            "confidence {} is outside [0, 1]",
            bad
        )));
    }
    Ok(confidence)
}

//! A model whose confidence is read straight from a feature column.

use anyhow::{ensure, Context};
use cascade_core::{CascadeModel, FeatureMatrix};
use serde::{Deserialize, Serialize};

/// Reads confidence from column 0 of the first block it is given
///
/// Training only records how many blocks the model was fitted on, so the
/// outcome of a selection run is fully determined by the feature values.
#[derive(Debug, Clone, Copy, Default)]
pub struct LookupModel;

/// Trained state of a [`LookupModel`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupState {
    /// Number of blocks seen at training time
    pub blocks: usize,
}

impl LookupModel {
    fn lookup(&self, model: &LookupState, blocks: &[&FeatureMatrix]) -> anyhow::Result<Vec<f64>> {
        ensure!(
            blocks.len() == model.blocks,
            "model was trained on {} blocks, got {}",
            model.blocks,
            blocks.len()
        );
        let first = blocks.first().context("no feature blocks")?;
        Ok(first
            .iter_rows()
            .map(|row| row.first().copied().unwrap_or(0.5).clamp(0.0, 1.0))
            .collect())
    }
}

impl CascadeModel for LookupModel {
    type Model = LookupState;

    fn train(&self, labels: &[bool], blocks: &[&FeatureMatrix]) -> anyhow::Result<LookupState> {
        ensure!(!blocks.is_empty(), "cannot train on zero feature blocks");
        for block in blocks {
            ensure!(
                block.rows() == labels.len(),
                "block has {} rows for {} labels",
                block.rows(),
                labels.len()
            );
        }
        Ok(LookupState {
            blocks: blocks.len(),
        })
    }

    fn predict(&self, model: &LookupState, blocks: &[&FeatureMatrix]) -> anyhow::Result<Vec<bool>> {
        Ok(self
            .lookup(model, blocks)?
            .into_iter()
            .map(|c| c >= 0.5)
            .collect())
    }

    fn confidence(&self, model: &LookupState, blocks: &[&FeatureMatrix]) -> anyhow::Result<Vec<f64>> {
        self.lookup(model, blocks)
    }

    fn score(&self, true_labels: &[bool], predicted: &[bool]) -> f64 {
        accuracy(true_labels, predicted)
    }
}

/// Fraction of matching labels; zero for empty input
pub fn accuracy(true_labels: &[bool], predicted: &[bool]) -> f64 {
    if true_labels.is_empty() {
        return 0.0;
    }
    let hits = true_labels
        .iter()
        .zip(predicted)
        .filter(|(truth, guess)| truth == guess)
        .count();
    hits as f64 / true_labels.len() as f64
}

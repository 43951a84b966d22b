use crate::application::evaluation::{self, check_aligned, HoldoutSplit, SplitData};
use crate::config::{CascadeConfig, ImportanceMethod};
use crate::{CascadeModel, CoreError, FeatureMatrix};
use rayon::prelude::*;
use tracing::{debug, info};

/// Estimates how predictive each feature block is
///
/// Blocks are scored independently on a holdout split, so the result is a
/// first-order approximation rather than an exact attribution.
pub struct ImportanceEstimator<'a, M: CascadeModel> {
    model_ops: &'a M,
    method: ImportanceMethod,
    holdout_stride: usize,
    parallel: bool,
}

impl<'a, M: CascadeModel> ImportanceEstimator<'a, M> {
    /// Create an estimator using the method, split and parallelism in `config`
    pub fn new(model_ops: &'a M, config: &CascadeConfig) -> Self {
        Self {
            model_ops,
            method: config.importance_method,
            holdout_stride: config.holdout_stride,
            parallel: config.parallel,
        }
    }

    /// Override the estimation method
    pub fn with_method(mut self, method: ImportanceMethod) -> Self {
        self.method = method;
        self
    }

    /// One score per block, indexed like `blocks`
    pub fn estimate(&self, blocks: &[FeatureMatrix], labels: &[bool]) -> Result<Vec<f64>, CoreError> {
        if blocks.is_empty() {
            return Err(CoreError::ValidationError(
                "No feature blocks to estimate importance for".to_string(),
            ));
        }
        check_aligned(blocks, labels)?;
        let split = HoldoutSplit::new(labels.len(), self.holdout_stride)?;
        let data = SplitData::new(blocks, labels, &split)?;

        let scores = match self.method {
            ImportanceMethod::SingleBlock => self.for_each_block(blocks.len(), |i| {
                self.score_subset(&data, &[i])
            })?,
            ImportanceMethod::LeaveOneOut => {
                let all: Vec<usize> = (0..blocks.len()).collect();
                let full_score = self.score_subset(&data, &all)?;
                self.for_each_block(blocks.len(), |i| {
                    if all.len() == 1 {
                        return Ok(full_score);
                    }
                    let rest: Vec<usize> = all.iter().copied().filter(|&j| j != i).collect();
                    Ok(full_score - self.score_subset(&data, &rest)?)
                })?
            }
        };

        info!(method = ?self.method, importances = ?scores, "Estimated feature block importance");
        Ok(scores)
    }

    fn for_each_block<F>(&self, count: usize, f: F) -> Result<Vec<f64>, CoreError>
    where
        F: Fn(usize) -> Result<f64, CoreError> + Sync + Send,
    {
        if self.parallel {
            (0..count).into_par_iter().map(&f).collect()
        } else {
            (0..count).map(f).collect()
        }
    }

    /// Train on the subset's training rows and score on its validation rows
    fn score_subset(&self, data: &SplitData, indices: &[usize]) -> Result<f64, CoreError> {
        let model = evaluation::train(self.model_ops, &data.train_labels, &data.train_view(indices))?;
        let predicted = evaluation::predict(
            self.model_ops,
            &model,
            &data.validation_view(indices),
            data.validation_labels.len(),
        )?;
        let score = self.model_ops.score(&data.validation_labels, &predicted);
        debug!(blocks = ?indices, score, "Scored feature subset");
        Ok(score)
    }
}

/// Convenience wrapper around [`ImportanceEstimator::estimate`]
pub fn estimate_importance<M: CascadeModel>(
    model_ops: &M,
    blocks: &[FeatureMatrix],
    labels: &[bool],
    config: &CascadeConfig,
) -> Result<Vec<f64>, CoreError> {
    ImportanceEstimator::new(model_ops, config).estimate(blocks, labels)
}

//! Nearest-centroid learner with a logistic confidence.

use anyhow::{bail, ensure};
use cascade_core::{CascadeModel, FeatureMatrix};
use serde::{Deserialize, Serialize};

use super::lookup_model::accuracy;

/// Nearest-centroid classifier over the concatenated feature blocks
///
/// Confidence is `sigmoid(sharpness * (d_neg² - d_pos²))`, so rows near the
/// positive centroid approach 1 and rows between the centroids sit near 0.5.
#[derive(Debug, Clone, Copy)]
pub struct CentroidModel {
    /// Steepness of the logistic confidence
    pub sharpness: f64,
}

impl Default for CentroidModel {
    fn default() -> Self {
        Self { sharpness: 4.0 }
    }
}

/// Trained centroids
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CentroidState {
    /// Mean feature vector of positive rows
    pub positive: Vec<f64>,
    /// Mean feature vector of negative rows
    pub negative: Vec<f64>,
}

fn class_mean(features: &FeatureMatrix, labels: &[bool], wanted: bool) -> Option<Vec<f64>> {
    let mut sum = vec![0.0; features.cols()];
    let mut count = 0usize;
    for (row, _) in features.iter_rows().zip(labels).filter(|(_, &label)| label == wanted) {
        for (s, v) in sum.iter_mut().zip(row) {
            *s += v;
        }
        count += 1;
    }
    if count == 0 {
        return None;
    }
    Some(sum.into_iter().map(|s| s / count as f64).collect())
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

impl CentroidModel {
    fn stacked(blocks: &[&FeatureMatrix]) -> anyhow::Result<FeatureMatrix> {
        ensure!(!blocks.is_empty(), "cannot use zero feature blocks");
        Ok(FeatureMatrix::hstack(blocks)?)
    }
}

impl CascadeModel for CentroidModel {
    type Model = CentroidState;

    fn train(&self, labels: &[bool], blocks: &[&FeatureMatrix]) -> anyhow::Result<CentroidState> {
        let features = Self::stacked(blocks)?;
        ensure!(
            features.rows() == labels.len(),
            "{} rows for {} labels",
            features.rows(),
            labels.len()
        );

        match (
            class_mean(&features, labels, true),
            class_mean(&features, labels, false),
        ) {
            (Some(positive), Some(negative)) => Ok(CentroidState { positive, negative }),
            _ => bail!("training data must contain both classes"),
        }
    }

    fn predict(&self, model: &CentroidState, blocks: &[&FeatureMatrix]) -> anyhow::Result<Vec<bool>> {
        Ok(self
            .confidence(model, blocks)?
            .into_iter()
            .map(|c| c >= 0.5)
            .collect())
    }

    fn confidence(&self, model: &CentroidState, blocks: &[&FeatureMatrix]) -> anyhow::Result<Vec<f64>> {
        let features = Self::stacked(blocks)?;
        ensure!(
            features.cols() == model.positive.len(),
            "model expects {} columns, got {}",
            model.positive.len(),
            features.cols()
        );
        Ok(features
            .iter_rows()
            .map(|row| {
                let margin = squared_distance(row, &model.negative) - squared_distance(row, &model.positive);
                1.0 / (1.0 + (-self.sharpness * margin).exp())
            })
            .collect())
    }

    fn score(&self, true_labels: &[bool], predicted: &[bool]) -> f64 {
        accuracy(true_labels, predicted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_separates_two_clusters() {
        let features =
            FeatureMatrix::from_rows(vec![vec![1.0, 1.0], vec![1.2, 0.8], vec![-1.0, -1.0], vec![-0.8, -1.2]])
                .unwrap();
        let labels = [true, true, false, false];
        let model = CentroidModel::default().train(&labels, &[&features]).unwrap();

        assert!((model.positive[0] - 1.1).abs() < 1e-12);
        assert!((model.negative[1] + 1.1).abs() < 1e-12);
        let predictions = CentroidModel::default().predict(&model, &[&features]).unwrap();
        assert_eq!(predictions, labels.to_vec());

        let midpoint = FeatureMatrix::from_rows(vec![vec![0.0, 0.0]]).unwrap();
        let confidence = CentroidModel::default().confidence(&model, &[&midpoint]).unwrap();
        assert!((confidence[0] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_needs_both_classes() {
        let features = FeatureMatrix::column(vec![1.0, 2.0]);
        assert!(CentroidModel::default().train(&[true, true], &[&features]).is_err());
    }
}

use crate::domain::feature_block::FeaturePipeline;
use crate::CoreError;
use cascade_monitoring::LogExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// The result of cascade training, consumed read-only at inference time
///
/// A flat record: which feature blocks the cheap pass computes, the confidence
/// threshold, and the two trained models. Nothing else crosses from training
/// to inference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CascadeArtifact<M> {
    /// Feature block indices computed for every row, ascending
    pub selected_feature_indices: Vec<usize>,
    /// Rows with confidence at or beyond this value (in either direction) are answered cheaply
    pub cascade_threshold: f64,
    /// Model trained on the selected feature blocks only
    pub approximate_model: M,
    /// Model trained on every feature block
    pub full_model: M,
}

impl<M> CascadeArtifact<M> {
    /// Whether every row falls through to the full model
    pub fn is_disabled(&self, num_blocks: usize) -> bool {
        self.cascade_threshold >= 1.0 && self.selected_feature_indices.len() == num_blocks
    }

    /// Check that the artifact can be applied to `pipeline`
    ///
    /// Indices must be non-empty, strictly ascending and name existing blocks;
    /// the threshold must lie in [0, 1].
    pub fn validate_against(&self, pipeline: &FeaturePipeline) -> Result<(), CoreError> {
        if self.selected_feature_indices.is_empty() {
            return Err(CoreError::ArtifactMismatchError(
                "Artifact selects no feature blocks".to_string(),
            ));
        }
        if let Some(&bad) = self
            .selected_feature_indices
            .iter()
            .find(|&&i| i >= pipeline.num_blocks())
        {
            return Err(CoreError::ArtifactMismatchError(format!(
                "Feature block index {} not present; pipeline has {} blocks",
                bad,
                pipeline.num_blocks()
            )));
        }
        if self
            .selected_feature_indices
            .windows(2)
            .any(|pair| pair[0] >= pair[1])
        {
            return Err(CoreError::ArtifactMismatchError(format!(
                "Feature block indices must be unique and ascending: {:?}",
                self.selected_feature_indices
            )));
        }
        if !(0.0..=1.0).contains(&self.cascade_threshold) {
            return Err(CoreError::ArtifactMismatchError(format!(
                "Cascade threshold {} is outside [0, 1]",
                self.cascade_threshold
            )));
        }
        Ok(())
    }
}

impl<M: Serialize> CascadeArtifact<M> {
    /// Serialize to a JSON string
    pub fn to_json(&self) -> Result<String, CoreError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the artifact as JSON
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<(), CoreError> {
        let path = path.as_ref();
        fs::write(path, self.to_json()?)
            .map_err(CoreError::from)
            .log_err(&format!("Failed to write cascade artifact {}", path.display()))
    }
}

impl<M: DeserializeOwned> CascadeArtifact<M> {
    /// Parse from a JSON string
    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read an artifact previously written by [`CascadeArtifact::save_json`]
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();
        fs::read_to_string(path)
            .map_err(CoreError::from)
            .and_then(|json| Self::from_json(&json))
            .log_err(&format!("Failed to load cascade artifact {}", path.display()))
    }
}

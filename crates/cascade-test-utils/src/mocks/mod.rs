//! Mock implementations for test collaborators.
//!
//! Steps wrap a [`Featurizer`]; with [`MockFeaturizer`] a test can state how
//! often, and on which rows, an expensive feature computation may be invoked.

use cascade_core::{DataPacket, FeatureMatrix, Step};
use mockall::automock;
use serde_json::Value;
use std::sync::Arc;

/// Computes features for a batch of raw rows
#[automock]
pub trait Featurizer: Send + Sync {
    /// One feature row per raw row
    fn featurize(&self, rows: &[Value]) -> anyhow::Result<FeatureMatrix>;
}

/// Wrap a featurizer as a pipeline step over a single row input
pub fn featurizer_step(
    id: &str,
    input: &str,
    output: &str,
    featurizer: impl Featurizer + 'static,
) -> Step {
    let featurizer = Arc::new(featurizer);
    Step::new(id, [input], output, move |inputs| {
        let rows = inputs
            .first()
            .and_then(|p| p.as_rows())
            .ok_or_else(|| anyhow::anyhow!("featurizer step expects a row input"))?;
        Ok(DataPacket::Matrix(featurizer.featurize(rows)?))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_core::PipelineGraph;
    use serde_json::json;
    use std::collections::{HashMap, HashSet};

    #[test]
    fn test_mock_featurizer_step() {
        let mut mock = MockFeaturizer::new();
        mock.expect_featurize()
            .withf(|rows: &[Value]| rows.len() == 2)
            .times(1)
            .returning(|rows| Ok(FeatureMatrix::zeros(rows.len(), 3)));

        let graph = PipelineGraph::builder()
            .input("text")
            .step(featurizer_step("embed", "text", "embedding", mock))
            .build()
            .unwrap();
        let inputs = HashMap::from([("text".to_string(), DataPacket::rows(vec![json!("a"), json!("b")]))]);
        let out = graph.execute(&inputs, &HashSet::new()).unwrap();

        assert_eq!(out["embedding"].as_matrix().unwrap().cols(), 3);
    }
}

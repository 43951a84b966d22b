use crate::domain::graph::PipelineGraph;
use crate::{CoreError, DataPacket, FeatureMatrix};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::ops::Range;

/// A named group of feature columns, the unit a cascade includes or excludes
///
/// A block owns no data. It points at one step output and optionally at a
/// contiguous column range inside that output's matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureBlock {
    /// Display name
    pub name: String,
    /// Name of the step output holding the block's matrix
    pub output: String,
    /// Column range within the output; `None` means every column
    pub columns: Option<Range<usize>>,
}

impl FeatureBlock {
    /// A block covering a whole step output
    pub fn new(name: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            output: output.into(),
            columns: None,
        }
    }

    /// Restrict the block to a column range of its output
    pub fn with_columns(mut self, columns: Range<usize>) -> Self {
        self.columns = Some(columns);
        self
    }

    /// Materialize this block from computed step outputs
    pub fn extract(&self, values: &HashMap<String, DataPacket>) -> Result<FeatureMatrix, CoreError> {
        let packet = values.get(&self.output).ok_or_else(|| {
            CoreError::ValidationError(format!(
                "Feature block '{}' needs output '{}', which was not computed",
                self.name, self.output
            ))
        })?;
        let matrix = packet.as_matrix().ok_or_else(|| {
            CoreError::ValidationError(format!(
                "Feature block '{}' expects a matrix in '{}'",
                self.name, self.output
            ))
        })?;
        match &self.columns {
            Some(range) => matrix.select_columns(range.clone()),
            None => Ok(matrix.clone()),
        }
    }
}

/// A pipeline graph together with the feature blocks a cascade may select from
///
/// A block's position in `blocks` is its identifier in a cascade artifact.
#[derive(Debug, Clone)]
pub struct FeaturePipeline {
    graph: PipelineGraph,
    blocks: Vec<FeatureBlock>,
}

impl FeaturePipeline {
    /// Bind feature blocks to a graph
    pub fn new(graph: PipelineGraph, blocks: Vec<FeatureBlock>) -> Result<Self, CoreError> {
        if blocks.is_empty() {
            return Err(CoreError::ValidationError(
                "A feature pipeline needs at least one feature block".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for block in &blocks {
            if !names.insert(block.name.as_str()) {
                return Err(CoreError::ValidationError(format!(
                    "Duplicate feature block name: {}",
                    block.name
                )));
            }
            if graph.producer_of(&block.output).is_none() {
                return Err(CoreError::ValidationError(format!(
                    "Feature block '{}' refers to '{}', which no step produces",
                    block.name, block.output
                )));
            }
            if let Some(range) = &block.columns {
                if range.start >= range.end {
                    return Err(CoreError::ValidationError(format!(
                        "Feature block '{}' has an empty column range {:?}",
                        block.name, range
                    )));
                }
            }
        }

        Ok(Self { graph, blocks })
    }

    /// The underlying graph
    pub fn graph(&self) -> &PipelineGraph {
        &self.graph
    }

    /// All feature blocks, in identifier order
    pub fn blocks(&self) -> &[FeatureBlock] {
        &self.blocks
    }

    /// Number of feature blocks
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Indices of every block
    pub fn all_indices(&self) -> Vec<usize> {
        (0..self.blocks.len()).collect()
    }

    /// Distinct step outputs needed to materialize the given blocks
    pub fn outputs_for(&self, indices: &[usize]) -> Vec<&str> {
        let mut outputs: Vec<&str> = Vec::new();
        for &i in indices {
            if let Some(block) = self.blocks.get(i) {
                if !outputs.contains(&block.output.as_str()) {
                    outputs.push(block.output.as_str());
                }
            }
        }
        outputs
    }

    /// Materialize the given blocks, in the order given
    pub fn extract(
        &self,
        values: &HashMap<String, DataPacket>,
        indices: &[usize],
    ) -> Result<Vec<FeatureMatrix>, CoreError> {
        indices
            .iter()
            .map(|&i| {
                self.blocks
                    .get(i)
                    .ok_or_else(|| {
                        CoreError::ValidationError(format!("No feature block with index {}", i))
                    })
                    .and_then(|block| block.extract(values))
            })
            .collect()
    }

    /// Number of rows in a batch of graph inputs
    ///
    /// Every row-aligned input must agree; scalars are ignored. A batch with
    /// no row-aligned input is rejected since its size is unknowable.
    pub fn batch_rows(&self, inputs: &HashMap<String, DataPacket>) -> Result<usize, CoreError> {
        let mut rows: Option<(&str, usize)> = None;
        for name in self.graph.inputs() {
            let packet = inputs.get(name).ok_or_else(|| {
                CoreError::ValidationError(format!("Missing graph input: {}", name))
            })?;
            if let Some(n) = packet.num_rows() {
                match rows {
                    Some((first, expected)) if expected != n => {
                        return Err(CoreError::ValidationError(format!(
                            "Input '{}' has {} rows but '{}' has {}",
                            name, n, first, expected
                        )));
                    }
                    Some(_) => {}
                    None => rows = Some((name.as_str(), n)),
                }
            }
        }
        rows.map(|(_, n)| n).ok_or_else(|| {
            CoreError::ValidationError("Graph inputs carry no row-aligned data".to_string())
        })
    }
}

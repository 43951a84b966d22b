use crate::DataPacket;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Value object: Step ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StepId(pub String);

impl StepId {
    /// Borrow the identifier
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StepId {
    fn from(id: &str) -> Self {
        StepId(id.to_string())
    }
}

/// An opaque, pure computation over a step's declared inputs
///
/// Inputs arrive in the order the step declares them. Implementations must not
/// depend on hidden mutable state if repeatable profiling is expected.
pub trait StepComputation: Send + Sync {
    /// Compute the step's single output
    fn compute(&self, inputs: &[&DataPacket]) -> anyhow::Result<DataPacket>;
}

impl<F> StepComputation for F
where
    F: Fn(&[&DataPacket]) -> anyhow::Result<DataPacket> + Send + Sync,
{
    fn compute(&self, inputs: &[&DataPacket]) -> anyhow::Result<DataPacket> {
        self(inputs)
    }
}

/// A named computation step in a pipeline graph
///
/// Immutable once constructed; clones share the computation.
#[derive(Clone)]
pub struct Step {
    id: StepId,
    inputs: Vec<String>,
    output: String,
    computation: Arc<dyn StepComputation>,
}

impl Step {
    /// Create a new step from a closure
    pub fn new<I, S, F>(id: impl Into<String>, inputs: I, output: impl Into<String>, f: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&[&DataPacket]) -> anyhow::Result<DataPacket> + Send + Sync + 'static,
    {
        Self::from_arc(id, inputs, output, Arc::new(f))
    }

    /// Create a new step from any computation
    pub fn with_computation<I, S>(
        id: impl Into<String>,
        inputs: I,
        output: impl Into<String>,
        computation: impl StepComputation + 'static,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_arc(id, inputs, output, Arc::new(computation))
    }

    /// Create a step around an already shared computation
    pub fn from_arc<I, S>(
        id: impl Into<String>,
        inputs: I,
        output: impl Into<String>,
        computation: Arc<dyn StepComputation>,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: StepId(id.into()),
            inputs: inputs.into_iter().map(Into::into).collect(),
            output: output.into(),
            computation,
        }
    }

    /// Step identifier
    #[inline]
    pub fn id(&self) -> &StepId {
        &self.id
    }

    /// Ordered input names
    #[inline]
    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    /// Output name
    #[inline]
    pub fn output(&self) -> &str {
        &self.output
    }

    /// Number of declared inputs
    #[inline]
    pub fn arity(&self) -> usize {
        self.inputs.len()
    }

    pub(crate) fn run(&self, inputs: &[&DataPacket]) -> anyhow::Result<DataPacket> {
        self.computation.compute(inputs)
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("id", &self.id)
            .field("inputs", &self.inputs)
            .field("output", &self.output)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FeatureMatrix;
    use serde_json::json;

    #[test]
    fn test_closure_step() {
        let step = Step::new("length", ["text"], "length_features", |inputs| {
            let texts = inputs[0]
                .as_rows()
                .ok_or_else(|| anyhow::anyhow!("expected rows"))?;
            let lengths = texts
                .iter()
                .map(|t| t.as_str().map(str::len).unwrap_or(0) as f64)
                .collect();
            Ok(DataPacket::Matrix(FeatureMatrix::column(lengths)))
        });

        assert_eq!(step.id(), &StepId::from("length"));
        assert_eq!(step.inputs(), &["text".to_string()]);
        assert_eq!(step.output(), "length_features");
        assert_eq!(step.arity(), 1);

        let input = DataPacket::rows(vec![json!("abc"), json!("")]);
        let out = step.run(&[&input]).unwrap();
        assert_eq!(out.as_matrix().unwrap().row(0), &[3.0]);
        assert_eq!(out.as_matrix().unwrap().row(1), &[0.0]);
    }

    #[test]
    fn test_clone_shares_computation() {
        let step = Step::new("const", Vec::<String>::new(), "c", |_| {
            Ok(DataPacket::Scalar(json!(1)))
        });
        let copy = step.clone();
        assert_eq!(copy.run(&[]).unwrap(), DataPacket::Scalar(json!(1)));
        assert!(format!("{:?}", copy).contains("const"));
    }
}

use crate::domain::step::{Step, StepId};
use crate::CoreError;
use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashMap, HashSet};

/// A validated, acyclic graph of pipeline steps
///
/// Every step input is either a graph-level input or the output of exactly one
/// step. The topological order is computed once at build time and is stable:
/// among steps with no dependency relation, the one declared first runs first.
#[derive(Debug, Clone)]
pub struct PipelineGraph {
    inputs: Vec<String>,
    steps: Vec<Step>,
    order: Vec<usize>,
    producers: HashMap<String, usize>,
    dependents: Vec<Vec<usize>>,
    sink: usize,
}

/// Builder for [`PipelineGraph`]
#[derive(Debug, Default)]
pub struct GraphBuilder {
    inputs: Vec<String>,
    steps: Vec<Step>,
    sink: Option<String>,
}

impl GraphBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a graph-level input
    pub fn input(mut self, name: impl Into<String>) -> Self {
        self.inputs.push(name.into());
        self
    }

    /// Append a step; declaration order breaks ties in execution order
    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Designate the sink step. Defaults to the last declared step.
    pub fn sink(mut self, step_id: impl Into<String>) -> Self {
        self.sink = Some(step_id.into());
        self
    }

    /// Validate and freeze the graph
    pub fn build(self) -> Result<PipelineGraph, CoreError> {
        PipelineGraph::new(self.inputs, self.steps, self.sink)
    }
}

impl PipelineGraph {
    /// Start building a graph
    pub fn builder() -> GraphBuilder {
        GraphBuilder::new()
    }

    fn new(
        inputs: Vec<String>,
        steps: Vec<Step>,
        sink: Option<String>,
    ) -> Result<Self, CoreError> {
        if steps.is_empty() {
            return Err(CoreError::ValidationError(
                "Pipeline graph must contain at least one step".to_string(),
            ));
        }

        let mut seen_inputs = HashSet::new();
        for name in &inputs {
            if !seen_inputs.insert(name.as_str()) {
                return Err(CoreError::ValidationError(format!(
                    "Duplicate graph input: {}",
                    name
                )));
            }
        }

        let mut ids = HashSet::new();
        let mut producers = HashMap::new();
        for (idx, step) in steps.iter().enumerate() {
            if !ids.insert(step.id().as_str()) {
                return Err(CoreError::ValidationError(format!(
                    "Duplicate step ID: {}",
                    step.id()
                )));
            }
            if seen_inputs.contains(step.output()) {
                return Err(CoreError::ValidationError(format!(
                    "Step '{}' writes '{}', which is a graph input",
                    step.id(),
                    step.output()
                )));
            }
            if let Some(&other) = producers.get(step.output()) {
                let other: &Step = &steps[other];
                return Err(CoreError::ValidationError(format!(
                    "Output '{}' is written by both '{}' and '{}'",
                    step.output(),
                    other.id(),
                    step.id()
                )));
            }
            producers.insert(step.output().to_string(), idx);
        }

        // Every consumed name must resolve before cycles can be traced
        for step in &steps {
            for input in step.inputs() {
                if !seen_inputs.contains(input.as_str()) && !producers.contains_key(input) {
                    return Err(CoreError::UnresolvedInputError {
                        step: step.id().to_string(),
                        input: input.clone(),
                    });
                }
            }
        }

        let dependencies: Vec<Vec<usize>> = steps
            .iter()
            .map(|step| {
                let mut deps: Vec<usize> = step
                    .inputs()
                    .iter()
                    .filter_map(|input| producers.get(input).copied())
                    .collect();
                deps.sort_unstable();
                deps.dedup();
                deps
            })
            .collect();

        if let Some(cycle) = find_cycle(&dependencies) {
            let path: Vec<&str> = cycle.iter().map(|&i| steps[i].id().as_str()).collect();
            return Err(CoreError::CycleError(path.join(" → ")));
        }

        let sink = match sink {
            Some(id) => steps
                .iter()
                .position(|s| s.id().as_str() == id)
                .ok_or_else(|| CoreError::ValidationError(format!("Unknown sink step: {}", id)))?,
            None => steps.len() - 1,
        };

        let mut dependents = vec![Vec::new(); steps.len()];
        for (idx, deps) in dependencies.iter().enumerate() {
            for &dep in deps {
                dependents[dep].push(idx);
            }
        }

        let order = topological_order(&dependencies, &dependents);

        Ok(Self {
            inputs,
            steps,
            order,
            producers,
            dependents,
            sink,
        })
    }

    /// Graph-level input names, in declaration order
    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    /// Whether `name` is a graph-level input
    pub fn is_input(&self, name: &str) -> bool {
        self.inputs.iter().any(|i| i == name)
    }

    /// Steps in declaration order
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Number of steps
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Always false for a built graph
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Look up a step by ID
    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id().as_str() == id)
    }

    /// The designated sink step
    pub fn sink(&self) -> &Step {
        &self.steps[self.sink]
    }

    /// Steps in execution order
    pub fn topological_order(&self) -> impl Iterator<Item = &Step> {
        self.order.iter().map(move |&i| &self.steps[i])
    }

    /// The step that writes `output`, if any
    pub fn producer_of(&self, output: &str) -> Option<&Step> {
        self.producers.get(output).map(|&i| &self.steps[i])
    }

    /// IDs of every step that `output` transitively depends on, including its producer
    pub fn lineage_of(&self, output: &str) -> BTreeSet<StepId> {
        self.required_steps([output])
            .into_iter()
            .map(|i| self.steps[i].id().clone())
            .collect()
    }

    pub(crate) fn order_indices(&self) -> &[usize] {
        &self.order
    }

    pub(crate) fn dependents(&self, idx: usize) -> &[usize] {
        &self.dependents[idx]
    }

    pub(crate) fn producer_index(&self, output: &str) -> Option<usize> {
        self.producers.get(output).copied()
    }

    /// Indices of the producers of `outputs` plus all their ancestors
    pub(crate) fn required_steps<'a>(
        &self,
        outputs: impl IntoIterator<Item = &'a str>,
    ) -> BTreeSet<usize> {
        let mut required = BTreeSet::new();
        let mut stack: Vec<usize> = outputs
            .into_iter()
            .filter_map(|o| self.producer_index(o))
            .collect();
        while let Some(idx) = stack.pop() {
            if required.insert(idx) {
                stack.extend(
                    self.steps[idx]
                        .inputs()
                        .iter()
                        .filter_map(|i| self.producer_index(i)),
                );
            }
        }
        required
    }
}

/// Depth-first search with a recursion stack; returns the cycle as a closed path
fn find_cycle(dependencies: &[Vec<usize>]) -> Option<Vec<usize>> {
    fn visit(
        node: usize,
        dependencies: &[Vec<usize>],
        visited: &mut [bool],
        rec_stack: &mut Vec<usize>,
    ) -> Option<Vec<usize>> {
        if let Some(pos) = rec_stack.iter().position(|&n| n == node) {
            let mut cycle = rec_stack[pos..].to_vec();
            cycle.push(node);
            return Some(cycle);
        }
        if visited[node] {
            return None;
        }
        visited[node] = true;
        rec_stack.push(node);
        for &dep in &dependencies[node] {
            if let Some(cycle) = visit(dep, dependencies, visited, rec_stack) {
                return Some(cycle);
            }
        }
        rec_stack.pop();
        None
    }

    let mut visited = vec![false; dependencies.len()];
    let mut rec_stack = Vec::new();
    (0..dependencies.len()).find_map(|start| visit(start, dependencies, &mut visited, &mut rec_stack))
}

/// Kahn's algorithm, always releasing the lowest declaration index first
fn topological_order(dependencies: &[Vec<usize>], dependents: &[Vec<usize>]) -> Vec<usize> {
    let mut in_degree: Vec<usize> = dependencies.iter().map(Vec::len).collect();
    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, &d)| d == 0)
        .map(|(i, _)| Reverse(i))
        .collect();

    let mut order = Vec::with_capacity(dependencies.len());
    while let Some(Reverse(idx)) = ready.pop() {
        order.push(idx);
        for &next in &dependents[idx] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.push(Reverse(next));
            }
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DataPacket;
    use serde_json::json;

    fn passthrough(id: &str, inputs: &[&str], output: &str) -> Step {
        Step::new(id, inputs.to_vec(), output, |inputs| {
            Ok(inputs
                .first()
                .map(|p| (*p).clone())
                .unwrap_or(DataPacket::Scalar(json!(null))))
        })
    }

    fn ids(graph: &PipelineGraph) -> Vec<String> {
        graph.topological_order().map(|s| s.id().to_string()).collect()
    }

    #[test]
    fn test_declaration_order_breaks_ties() {
        // b and c are independent and both feed d, which is declared first
        let graph = PipelineGraph::builder()
            .input("x")
            .step(passthrough("d", &["b_out", "c_out"], "d_out"))
            .step(passthrough("b", &["x"], "b_out"))
            .step(passthrough("c", &["x"], "c_out"))
            .sink("d")
            .build()
            .unwrap();

        assert_eq!(ids(&graph), vec!["b", "c", "d"]);
        assert_eq!(graph.sink().id().as_str(), "d");
    }

    #[test]
    fn test_sink_defaults_to_last_step() {
        let graph = PipelineGraph::builder()
            .input("x")
            .step(passthrough("a", &["x"], "a_out"))
            .step(passthrough("b", &["a_out"], "b_out"))
            .build()
            .unwrap();
        assert_eq!(graph.sink().id().as_str(), "b");
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn test_cycle_is_reported_with_path() {
        let result = PipelineGraph::builder()
            .input("x")
            .step(passthrough("a", &["x", "b_out"], "a_out"))
            .step(passthrough("b", &["a_out"], "b_out"))
            .build();

        match result {
            Err(CoreError::CycleError(path)) => assert_eq!(path, "a → b → a"),
            other => panic!("Expected CycleError, got {:?}", other),
        }
    }

    #[test]
    fn test_self_loop_is_a_cycle() {
        let result = PipelineGraph::builder()
            .step(passthrough("a", &["a_out"], "a_out"))
            .build();
        assert_eq!(result.unwrap_err(), CoreError::CycleError("a → a".to_string()));
    }

    #[test]
    fn test_unresolved_input() {
        let err = PipelineGraph::builder()
            .input("text")
            .step(passthrough("tfidf", &["tokens"], "tfidf_out"))
            .build()
            .unwrap_err();

        assert!(err.is_graph_structure_error());
        assert_eq!(
            err,
            CoreError::UnresolvedInputError {
                step: "tfidf".to_string(),
                input: "tokens".to_string(),
            }
        );
    }

    #[test]
    fn test_single_writer_rule() {
        let err = PipelineGraph::builder()
            .input("x")
            .step(passthrough("a", &["x"], "features"))
            .step(passthrough("b", &["x"], "features"))
            .build()
            .unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(msg) if msg.contains("written by both")));

        let err = PipelineGraph::builder()
            .input("x")
            .step(passthrough("a", &["x"], "x"))
            .build()
            .unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(_)));
    }

    #[test]
    fn test_duplicate_ids_unknown_sink_and_empty_graph() {
        let err = PipelineGraph::builder()
            .input("x")
            .step(passthrough("a", &["x"], "a1"))
            .step(passthrough("a", &["x"], "a2"))
            .build()
            .unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(msg) if msg.contains("Duplicate step ID")));

        let err = PipelineGraph::builder()
            .input("x")
            .step(passthrough("a", &["x"], "a_out"))
            .sink("missing")
            .build()
            .unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(msg) if msg.contains("Unknown sink")));

        assert!(PipelineGraph::builder().input("x").build().is_err());
    }

    #[test]
    fn test_lineage() {
        let graph = PipelineGraph::builder()
            .input("text")
            .step(passthrough("tokenize", &["text"], "tokens"))
            .step(passthrough("length", &["text"], "length"))
            .step(passthrough("tfidf", &["tokens"], "tfidf"))
            .step(passthrough("model", &["tfidf", "length"], "model"))
            .build()
            .unwrap();

        let lineage: Vec<String> = graph
            .lineage_of("tfidf")
            .into_iter()
            .map(|id| id.to_string())
            .collect();
        assert_eq!(lineage, vec!["tfidf", "tokenize"]);
        assert!(graph.lineage_of("text").is_empty());
        assert_eq!(graph.producer_of("length").unwrap().id().as_str(), "length");
        assert!(graph.is_input("text"));
    }
}

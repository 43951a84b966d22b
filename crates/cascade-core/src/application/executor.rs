use crate::domain::graph::PipelineGraph;
use crate::domain::step::{Step, StepId};
use crate::{CoreError, DataPacket};
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use tracing::debug;

/// Hook invoked around every step the executor runs
pub trait StepObserver {
    /// Called before a step's computation starts
    fn on_step_start(&mut self, _step: &Step) {}

    /// Called after a step's computation succeeded
    fn on_step_complete(&mut self, step: &Step, elapsed: Duration);
}

/// A single evaluation of a graph: which outputs to produce, what to skip,
/// and which values are already known
///
/// Steps run in the graph's topological order. A skipped step is still run if
/// a step that does run needs its output. Seeded outputs are never recomputed,
/// and neither are ancestors that only feed them.
#[derive(Debug, Clone)]
pub struct ExecutionPlan<'g> {
    graph: &'g PipelineGraph,
    targets: Option<Vec<String>>,
    skip: HashSet<StepId>,
    seeded: HashMap<String, DataPacket>,
    batch_rows: Option<usize>,
}

impl<'g> ExecutionPlan<'g> {
    /// Plan that evaluates every step
    pub fn new(graph: &'g PipelineGraph) -> Self {
        Self {
            graph,
            targets: None,
            skip: HashSet::new(),
            seeded: HashMap::new(),
            batch_rows: None,
        }
    }

    /// Only produce these outputs and their ancestors
    pub fn targets<I, S>(mut self, outputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.targets = Some(outputs.into_iter().map(Into::into).collect());
        self
    }

    /// Skip these steps unless a running step needs them
    pub fn skip<I>(mut self, steps: I) -> Self
    where
        I: IntoIterator<Item = StepId>,
    {
        self.skip.extend(steps);
        self
    }

    /// Provide an already computed step output; its producer will not run
    pub fn seed(mut self, output: impl Into<String>, value: DataPacket) -> Self {
        self.seeded.insert(output.into(), value);
        self
    }

    /// Require every row-aligned step output to have exactly `rows` rows
    ///
    /// Values that do not follow the batch must be [`DataPacket::Scalar`].
    pub fn batch_rows(mut self, rows: usize) -> Self {
        self.batch_rows = Some(rows);
        self
    }

    /// Decide which steps run, indexed by declaration position
    fn schedule(&self) -> Vec<bool> {
        let steps = self.graph.steps();
        let mut targeted = vec![self.targets.is_none(); steps.len()];
        if let Some(targets) = &self.targets {
            for idx in targets.iter().filter_map(|t| self.graph.producer_index(t)) {
                targeted[idx] = true;
            }
        }

        let mut run = vec![false; steps.len()];
        // Consumers come later in topological order, so walk it backwards.
        // Ancestors are pulled in only by a running consumer.
        for &idx in self.graph.order_indices().iter().rev() {
            let step = &steps[idx];
            if self.seeded.contains_key(step.output()) {
                continue;
            }
            let skipped = self.skip.contains(step.id());
            let wanted = targeted[idx] && !skipped;
            let demanded = self.graph.dependents(idx).iter().any(|&d| run[d]);
            if wanted || demanded {
                if skipped {
                    debug!(step_id = %step.id(), "Re-evaluating skipped step needed downstream");
                }
                run[idx] = true;
            }
        }
        run
    }

    /// Execute the plan, returning every step output that was computed or seeded
    pub fn run(
        &self,
        inputs: &HashMap<String, DataPacket>,
        mut observer: Option<&mut dyn StepObserver>,
    ) -> Result<HashMap<String, DataPacket>, CoreError> {
        let schedule = self.schedule();
        let mut outputs: HashMap<String, DataPacket> = self.seeded.clone();

        for &idx in self.graph.order_indices() {
            if !schedule[idx] {
                continue;
            }
            let step = &self.graph.steps()[idx];

            let (result, elapsed) = {
                let args = step
                    .inputs()
                    .iter()
                    .map(|name| {
                        outputs.get(name).or_else(|| inputs.get(name)).ok_or_else(|| {
                            CoreError::ValidationError(format!(
                                "Missing graph input '{}' for step '{}'",
                                name,
                                step.id()
                            ))
                        })
                    })
                    .collect::<Result<Vec<&DataPacket>, CoreError>>()?;

                if let Some(obs) = observer.as_deref_mut() {
                    obs.on_step_start(step);
                }
                let started = Instant::now();
                let result = step.run(&args);
                (result, started.elapsed())
            };

            let value = result.map_err(|e| CoreError::StepExecutionError {
                step: step.id().to_string(),
                message: format!("{:#}", e),
            })?;
            if let (Some(expected), Some(actual)) = (self.batch_rows, value.num_rows()) {
                if actual != expected {
                    return Err(CoreError::ValidationError(format!(
                        "Step '{}' produced {} rows for a batch of {}; values not tied to rows must be scalars",
                        step.id(),
                        actual,
                        expected
                    )));
                }
            }

            debug!(
                step_id = %step.id(),
                elapsed_us = elapsed.as_micros() as u64,
                "Step completed"
            );
            if let Some(obs) = observer.as_deref_mut() {
                obs.on_step_complete(step, elapsed);
            }
            outputs.insert(step.output().to_string(), value);
        }

        Ok(outputs)
    }
}

impl PipelineGraph {
    /// Evaluate every step not in `skip`, in topological order
    ///
    /// A skipped step whose output a running step consumes is evaluated anyway.
    pub fn execute(
        &self,
        inputs: &HashMap<String, DataPacket>,
        skip: &HashSet<StepId>,
    ) -> Result<HashMap<String, DataPacket>, CoreError> {
        ExecutionPlan::new(self)
            .skip(skip.iter().cloned())
            .run(inputs, None)
    }
}

use crate::application::evaluation::{
    self, approximate_label, check_aligned, is_confident, HoldoutSplit, SplitData,
};
use crate::config::CascadeConfig;
use crate::domain::artifact::CascadeArtifact;
use crate::{CascadeModel, CoreError, FeatureMatrix};
use cascade_monitoring::CascadeMetrics;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::{debug, info, warn};

/// One (cheap set, threshold) configuration scored on the validation rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationEvaluation {
    /// Position of the cheap set in candidate generation order
    pub candidate: usize,
    /// Feature block indices computed for every row, ascending
    pub cheap_set: Vec<usize>,
    /// Confidence threshold
    pub threshold: f64,
    /// Share of validation rows answered by the approximate model
    pub confident_fraction: f64,
    /// Score of the blended predictions
    pub blended_score: f64,
    /// Cheap-set cost plus the expected cost of the remaining blocks
    pub expected_cost: f64,
    /// Whether the blended score is within tolerance of the full model
    pub feasible: bool,
}

/// Everything the selector looked at, for reporting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionReport {
    /// Block indices by importance descending, then cost ascending
    pub ranking: Vec<usize>,
    /// Candidate cheap sets in generation order
    pub candidates: Vec<Vec<usize>>,
    /// Every evaluated configuration
    pub evaluations: Vec<ConfigurationEvaluation>,
    /// The all-blocks, threshold 1.0 configuration
    pub fallback: ConfigurationEvaluation,
    /// Full-model score on the validation rows
    pub full_score: f64,
    /// Cost of computing every block
    pub full_cost: f64,
    /// Expected cost of the chosen configuration
    pub expected_cost: f64,
    /// Whether the cascade was disabled
    pub fell_back: bool,
}

/// Result of a selection run
#[derive(Debug, Clone)]
pub struct SelectionOutcome<M> {
    /// Artifact to persist for inference
    pub artifact: CascadeArtifact<M>,
    /// How it was chosen
    pub report: SelectionReport,
}

/// Chooses the cheap feature set and confidence threshold
///
/// Candidate cheap sets are evaluated independently on a holdout split and
/// reduced with a deterministic arg-min, so running the evaluations in
/// parallel does not change the result.
pub struct CascadeSelector<'a, M: CascadeModel> {
    model_ops: &'a M,
    config: &'a CascadeConfig,
}

impl<'a, M: CascadeModel> CascadeSelector<'a, M> {
    /// Create a selector
    pub fn new(model_ops: &'a M, config: &'a CascadeConfig) -> Self {
        Self { model_ops, config }
    }

    /// Select a cascade for `blocks`, given per-block costs and importances
    pub fn select(
        &self,
        blocks: &[FeatureMatrix],
        labels: &[bool],
        costs: &[f64],
        importances: &[f64],
    ) -> Result<SelectionOutcome<M::Model>, CoreError> {
        self.config.validate()?;
        if blocks.is_empty() {
            return Err(CoreError::ValidationError(
                "Cascade selection needs at least one feature block".to_string(),
            ));
        }
        if costs.len() != blocks.len() || importances.len() != blocks.len() {
            return Err(CoreError::ValidationError(format!(
                "Got {} blocks, {} costs and {} importances",
                blocks.len(),
                costs.len(),
                importances.len()
            )));
        }
        check_aligned(blocks, labels)?;

        let all: Vec<usize> = (0..blocks.len()).collect();
        let full_cost: f64 = costs.iter().sum();
        let ranking = rank_blocks(costs, importances);
        let candidates = candidate_sets(&ranking, costs, &self.config.cost_budget_fractions);
        debug!(?ranking, ?candidates, "Generated candidate cheap sets");

        let split = HoldoutSplit::new(labels.len(), self.config.holdout_stride)?;
        let data = SplitData::new(blocks, labels, &split)?;
        let validation_rows = data.validation_labels.len();

        let full_model = evaluation::train(self.model_ops, &data.train_labels, &data.train_view(&all))?;
        let full_predictions = evaluation::predict(
            self.model_ops,
            &full_model,
            &data.validation_view(&all),
            validation_rows,
        )?;
        let full_score = self.model_ops.score(&data.validation_labels, &full_predictions);

        let context = EvaluationContext {
            data: &data,
            costs,
            full_cost,
            full_score,
            full_predictions: &full_predictions,
        };

        let fallback = self.evaluate_threshold(&context, usize::MAX, &all, &[], 1.0);

        let evaluate = |(i, set): (usize, &Vec<usize>)| self.evaluate_candidate(&context, i, set);
        let per_candidate: Vec<Vec<ConfigurationEvaluation>> = if self.config.parallel {
            candidates
                .par_iter()
                .enumerate()
                .map(evaluate)
                .collect::<Result<_, CoreError>>()?
        } else {
            candidates
                .iter()
                .enumerate()
                .map(evaluate)
                .collect::<Result<_, CoreError>>()?
        };
        let evaluations: Vec<ConfigurationEvaluation> = per_candidate.into_iter().flatten().collect();

        let (cheap_set, threshold, expected_cost, fell_back) =
            match choose(&evaluations, full_cost) {
                Ok(best) => {
                    info!(
                        cheap_set = ?best.cheap_set,
                        threshold = best.threshold,
                        expected_cost = best.expected_cost,
                        full_cost,
                        "Selected cascade"
                    );
                    (best.cheap_set.clone(), best.threshold, best.expected_cost, false)
                }
                Err(e) => {
                    warn!(error = %e, "Falling back to the full feature set");
                    (all.clone(), 1.0, full_cost, true)
                }
            };

        let all_rows: Vec<&FeatureMatrix> = blocks.iter().collect();
        let cheap_rows: Vec<&FeatureMatrix> = cheap_set.iter().map(|&i| &blocks[i]).collect();
        let approximate_model = evaluation::train(self.model_ops, labels, &cheap_rows)?;
        let full_model = evaluation::train(self.model_ops, labels, &all_rows)?;

        CascadeMetrics::record_selection(
            cheap_set.len(),
            blocks.len(),
            threshold,
            expected_cost,
            fell_back,
        );

        Ok(SelectionOutcome {
            artifact: CascadeArtifact {
                selected_feature_indices: cheap_set,
                cascade_threshold: threshold,
                approximate_model,
                full_model,
            },
            report: SelectionReport {
                ranking,
                candidates,
                evaluations,
                fallback,
                full_score,
                full_cost,
                expected_cost,
                fell_back,
            },
        })
    }

    fn evaluate_candidate(
        &self,
        context: &EvaluationContext<'_>,
        candidate: usize,
        cheap_set: &[usize],
    ) -> Result<Vec<ConfigurationEvaluation>, CoreError> {
        let data = context.data;
        let model = evaluation::train(self.model_ops, &data.train_labels, &data.train_view(cheap_set))?;
        let confidence = evaluation::confidence(
            self.model_ops,
            &model,
            &data.validation_view(cheap_set),
            data.validation_labels.len(),
        )?;

        Ok(self
            .config
            .threshold_grid
            .iter()
            .map(|&t| self.evaluate_threshold(context, candidate, cheap_set, &confidence, t))
            .collect())
    }

    /// Score one threshold; an empty confidence vector means no row is confident
    fn evaluate_threshold(
        &self,
        context: &EvaluationContext<'_>,
        candidate: usize,
        cheap_set: &[usize],
        confidence: &[f64],
        threshold: f64,
    ) -> ConfigurationEvaluation {
        let rows = context.full_predictions.len();
        let mut confident = 0usize;
        let blended: Vec<bool> = (0..rows)
            .map(|i| match confidence.get(i) {
                Some(&c) if is_confident(c, threshold) => {
                    confident += 1;
                    approximate_label(c)
                }
                _ => context.full_predictions[i],
            })
            .collect();

        let blended_score = self.model_ops.score(&context.data.validation_labels, &blended);
        let confident_fraction = if rows == 0 {
            0.0
        } else {
            confident as f64 / rows as f64
        };
        let cheap_cost: f64 = cheap_set.iter().map(|&i| context.costs[i]).sum();
        let expected_cost =
            cheap_cost + (1.0 - confident_fraction) * (context.full_cost - cheap_cost);

        ConfigurationEvaluation {
            candidate,
            cheap_set: cheap_set.to_vec(),
            threshold,
            confident_fraction,
            blended_score,
            expected_cost,
            feasible: is_feasible(blended_score, context.full_score, self.config.tolerance),
        }
    }
}

struct EvaluationContext<'d> {
    data: &'d SplitData,
    costs: &'d [f64],
    full_cost: f64,
    full_score: f64,
    full_predictions: &'d [bool],
}

/// The accuracy-retention constraint
#[inline]
pub fn is_feasible(blended_score: f64, full_score: f64, tolerance: f64) -> bool {
    blended_score >= full_score - tolerance
}

/// Order blocks by importance descending, then cost ascending, then index
pub fn rank_blocks(costs: &[f64], importances: &[f64]) -> Vec<usize> {
    let mut ranking: Vec<usize> = (0..costs.len()).collect();
    ranking.sort_by(|&a, &b| {
        importances[b]
            .total_cmp(&importances[a])
            .then(costs[a].total_cmp(&costs[b]))
            .then(a.cmp(&b))
    });
    ranking
}

/// Candidate cheap sets: proper prefixes of the ranking, then greedy sets
/// fitting each cost budget. Sets are sorted and deduplicated; neither the
/// empty set nor the full set is ever a candidate.
pub fn candidate_sets(ranking: &[usize], costs: &[f64], budget_fractions: &[f64]) -> Vec<Vec<usize>> {
    let total: f64 = costs.iter().sum();
    let mut candidates: Vec<Vec<usize>> = Vec::new();
    let mut push = |mut set: Vec<usize>| {
        set.sort_unstable();
        if !set.is_empty() && set.len() < ranking.len() && !candidates.contains(&set) {
            candidates.push(set);
        }
    };

    for k in 1..ranking.len() {
        push(ranking[..k].to_vec());
    }

    for &fraction in budget_fractions {
        let budget = fraction * total;
        let mut spent = 0.0;
        let mut set = Vec::new();
        for &block in ranking {
            if spent + costs[block] <= budget + f64::EPSILON * total.abs() {
                spent += costs[block];
                set.push(block);
            }
        }
        push(set);
    }

    candidates
}

/// Deterministic arg-min over feasible configurations cheaper than the full set
/// that answer at least one row cheaply
fn choose(
    evaluations: &[ConfigurationEvaluation],
    full_cost: f64,
) -> Result<&ConfigurationEvaluation, CoreError> {
    evaluations
        .iter()
        .filter(|e| e.feasible && e.confident_fraction > 0.0 && e.expected_cost < full_cost)
        .min_by(|a, b| compare_configurations(a, b))
        .ok_or_else(|| {
            CoreError::InfeasibleCascadeError(format!(
                "none of {} configurations keeps the score within tolerance at lower cost",
                evaluations.len()
            ))
        })
}

fn compare_configurations(a: &ConfigurationEvaluation, b: &ConfigurationEvaluation) -> Ordering {
    a.expected_cost
        .total_cmp(&b.expected_cost)
        .then(a.cheap_set.len().cmp(&b.cheap_set.len()))
        .then(b.threshold.total_cmp(&a.threshold))
        .then(a.candidate.cmp(&b.candidate))
}

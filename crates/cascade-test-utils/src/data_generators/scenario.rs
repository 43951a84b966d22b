use cascade_core::FeatureMatrix;

/// Block costs of the two-block scenario: an expensive exact block and a cheap hint
pub const SCENARIO_COSTS: [f64; 2] = [99.597, 3.642];

/// Block importances of the two-block scenario
pub const SCENARIO_IMPORTANCES: [f64; 2] = [0.178, 0.130];

/// Rows in the scenario; with a holdout stride of 4 this leaves 228 validation rows
pub const SCENARIO_ROWS: usize = 912;

/// Validation rows on which the cheap block is confidently right
pub const SCENARIO_CONFIDENT_ROWS: usize = 181;

/// Validation rows on which the cheap block is confidently wrong at 0.85/0.15
pub const SCENARIO_MISLEADING_ROWS: usize = 20;

/// Feature blocks and labels reproducing the two-block cost/accuracy trade-off
///
/// Block 0 is the label itself. Block 1 is 0.95/0.05 in the label's direction
/// on the first 181 validation rows (every fourth row), 0.85/0.15 in the wrong
/// direction on the next 20, and 0.5 on the remaining 27. Training rows carry
/// the confident, correct value.
///
/// With a [`LookupModel`](crate::LookupModel), the default threshold grid and a
/// stride of 4, only threshold 0.9 keeps the cheap block accurate, and
/// 47 of 228 validation rows fall through to the expensive block.
pub fn two_block_scenario() -> (Vec<FeatureMatrix>, Vec<bool>) {
    let labels: Vec<bool> = (0..SCENARIO_ROWS).map(|i| (i / 4) % 2 == 0).collect();

    let exact = labels.iter().map(|&l| if l { 1.0 } else { 0.0 }).collect();
    let hint = labels
        .iter()
        .enumerate()
        .map(|(i, &label)| {
            let (right, wrong) = if label { (0.95, 0.15) } else { (0.05, 0.85) };
            if i % 4 != 0 {
                return right;
            }
            let k = i / 4;
            if k < SCENARIO_CONFIDENT_ROWS {
                right
            } else if k < SCENARIO_CONFIDENT_ROWS + SCENARIO_MISLEADING_ROWS {
                wrong
            } else {
                0.5
            }
        })
        .collect();

    (
        vec![FeatureMatrix::column(exact), FeatureMatrix::column(hint)],
        labels,
    )
}

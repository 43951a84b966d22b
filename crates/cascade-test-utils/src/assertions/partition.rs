use cascade_core::DispatchOutcome;
use std::collections::BTreeSet;

/// Assert that accepted and fallback rows partition `0..rows` and that every
/// row has a prediction
pub fn assert_row_partition(outcome: &DispatchOutcome, rows: usize) {
    let accepted: BTreeSet<usize> = outcome.accepted_rows.iter().copied().collect();
    let fallback: BTreeSet<usize> = outcome.fallback_rows.iter().copied().collect();

    assert_eq!(
        accepted.len(),
        outcome.accepted_rows.len(),
        "accepted rows contain duplicates"
    );
    assert_eq!(
        fallback.len(),
        outcome.fallback_rows.len(),
        "fallback rows contain duplicates"
    );
    assert!(
        accepted.is_disjoint(&fallback),
        "rows {:?} were both accepted and sent to the full model",
        accepted.intersection(&fallback).collect::<Vec<_>>()
    );

    let union: BTreeSet<usize> = accepted.union(&fallback).copied().collect();
    let expected: BTreeSet<usize> = (0..rows).collect();
    assert_eq!(union, expected, "accepted and fallback rows do not cover the batch");
    assert_eq!(outcome.predictions.len(), rows, "one prediction per row expected");
}

/// Assert `actual` is within `tolerance` of `expected`
pub fn assert_close(actual: f64, expected: f64, tolerance: f64) {
    assert!(
        (actual - expected).abs() <= tolerance,
        "expected {} within {} of {}",
        actual,
        tolerance,
        expected
    );
}

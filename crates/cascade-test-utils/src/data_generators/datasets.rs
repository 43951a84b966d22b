use cascade_core::DataPacket;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};
use std::collections::HashMap;

/// Graph inputs and labels for one synthetic batch
#[derive(Debug, Clone)]
pub struct SyntheticDataset {
    /// Graph-level inputs keyed by input name
    pub inputs: HashMap<String, DataPacket>,
    /// One label per row
    pub labels: Vec<bool>,
}

impl SyntheticDataset {
    /// Number of rows
    pub fn rows(&self) -> usize {
        self.labels.len()
    }
}

/// Rows of `{"exact", "hint"}` records under the input name `"records"`
///
/// `exact` equals the label (1.0 or 0.0). `hint` is a cheap cue: with
/// probability `confident_share` it is 0.95 or 0.05 in the label's direction,
/// otherwise it is an uninformative 0.5.
pub fn hinted_records(rows: usize, confident_share: f64, seed: u64) -> SyntheticDataset {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut records = Vec::with_capacity(rows);
    let mut labels = Vec::with_capacity(rows);

    for _ in 0..rows {
        let label = rng.gen_bool(0.5);
        let hint = if rng.gen_bool(confident_share) {
            if label {
                0.95
            } else {
                0.05
            }
        } else {
            0.5
        };
        records.push(json!({
            "exact": if label { 1.0 } else { 0.0 },
            "hint": hint,
        }));
        labels.push(label);
    }

    SyntheticDataset {
        inputs: HashMap::from([("records".to_string(), DataPacket::Rows(records))]),
        labels,
    }
}

/// Records with exactly `confident` rows whose hint is 0.95/0.05 and the rest 0.5
///
/// Confident rows come first; labels alternate.
pub fn records_with_confident_rows(rows: usize, confident: usize) -> SyntheticDataset {
    let labels: Vec<bool> = (0..rows).map(|i| i % 2 == 0).collect();
    let records: Vec<Value> = labels
        .iter()
        .enumerate()
        .map(|(i, &label)| {
            let hint = match (i < confident, label) {
                (true, true) => 0.95,
                (true, false) => 0.05,
                (false, _) => 0.5,
            };
            json!({ "exact": if label { 1.0 } else { 0.0 }, "hint": hint })
        })
        .collect();

    SyntheticDataset {
        inputs: HashMap::from([("records".to_string(), DataPacket::Rows(records))]),
        labels,
    }
}

/// Two noisy clusters in `dims` dimensions under the input name `"points"`
///
/// Positive rows centre on +1, negative rows on -1, with uniform noise of
/// half-width `noise` on every coordinate.
pub fn clustered_points(rows: usize, dims: usize, noise: f64, seed: u64) -> SyntheticDataset {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut points = Vec::with_capacity(rows);
    let mut labels = Vec::with_capacity(rows);

    for i in 0..rows {
        let label = i % 2 == 0;
        let centre = if label { 1.0 } else { -1.0 };
        let coords: Vec<f64> = (0..dims)
            .map(|_| centre + rng.gen_range(-noise..=noise))
            .collect();
        points.push(json!(coords));
        labels.push(label);
    }

    SyntheticDataset {
        inputs: HashMap::from([("points".to_string(), DataPacket::Rows(points))]),
        labels,
    }
}

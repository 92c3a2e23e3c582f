//! Actual vs predicted answer position

use serde::{Deserialize, Serialize};

use super::SweepObservation;

/// Counts of predicted position per forced position.
///
/// Predictions outside `0..labels` (unscored rows among them) are kept in a
/// separate column so every row sums to the number of observations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub counts: Vec<Vec<u64>>,
    pub unscored: Vec<u64>,
}

impl ConfusionMatrix {
    pub fn from_observations(rows: &[&SweepObservation], labels: usize) -> Self {
        let mut counts = vec![vec![0u64; labels]; labels];
        let mut unscored = vec![0u64; labels];
        for actual in 0..labels {
            for row in rows {
                let cell = row
                    .predicted(actual)
                    .and_then(|p| usize::try_from(p).ok())
                    .filter(|&p| p < labels);
                match cell {
                    Some(predicted) => counts[actual][predicted] += 1,
                    None => unscored[actual] += 1,
                }
            }
        }
        Self { counts, unscored }
    }

    pub fn labels(&self) -> usize {
        self.counts.len()
    }

    /// All observations for `actual`, label cells plus unscored
    pub fn row_total(&self, actual: usize) -> u64 {
        self.counts[actual].iter().sum::<u64>() + self.unscored[actual]
    }

    /// Each row divided by its label-cell sum; an all-zero row stays zero
    pub fn normalized(&self) -> Vec<Vec<f64>> {
        self.counts
            .iter()
            .map(|row| {
                let total: u64 = row.iter().sum();
                row.iter()
                    .map(|&c| if total == 0 { 0.0 } else { c as f64 / total as f64 })
                    .collect()
            })
            .collect()
    }
}

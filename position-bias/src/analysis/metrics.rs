//! Per-position metrics over sweep observations

use serde::{Deserialize, Serialize};

use super::SweepObservation;

/// Correctness at one position, overall and per certainty subset.
///
/// `None` marks an empty subset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubsetCorrectness {
    pub overall: Option<f64>,
    pub certain: Option<f64>,
    pub uncertain: Option<f64>,
}

/// "Predicted this position" scored as a binary classifier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BinaryMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

/// Fraction of rows whose pick matched the forced answer position
pub fn correctness(rows: &[&SweepObservation], pos: usize) -> Option<f64> {
    if rows.is_empty() {
        return None;
    }
    let correct = rows.iter().filter(|o| o.is_correct(pos)).count();
    Some(correct as f64 / rows.len() as f64)
}

pub fn subset_correctness(rows: &[SweepObservation], pos: usize) -> SubsetCorrectness {
    let all: Vec<&SweepObservation> = rows.iter().collect();
    let (certain, uncertain): (Vec<&SweepObservation>, Vec<&SweepObservation>) =
        rows.iter().partition(|o| o.is_certain);
    SubsetCorrectness {
        overall: correctness(&all, pos),
        certain: correctness(&certain, pos),
        uncertain: correctness(&uncertain, pos),
    }
}

/// Precision, recall and F1 for the binary task "picked `pos`", where every
/// row's true position is `pos`. Undefined ratios are 0.
pub fn binary_metrics(rows: &[&SweepObservation], pos: usize) -> BinaryMetrics {
    let tp = rows.iter().filter(|o| o.predicted(pos) == Some(pos as i64)).count() as u64;
    let fn_ = rows.len() as u64 - tp;
    // every row's true label is `pos`
    let fp = 0u64;

    let ratio = |num: u64, den: u64| if den == 0 { 0.0 } else { num as f64 / den as f64 };
    BinaryMetrics {
        precision: ratio(tp, tp + fp),
        recall: ratio(tp, tp + fn_),
        f1: ratio(2 * tp, 2 * tp + fp + fn_),
    }
}

/// Percentage of rows picking each option index when the answer sat at
/// `pos`, over every row in `rows` (unscored picks included in the
/// denominator), rounded to two decimals
pub fn response_distribution(rows: &[&SweepObservation], pos: usize, option_count: usize) -> Vec<f64> {
    let mut counts = vec![0usize; option_count];
    for row in rows {
        if let Some(idx) = row.predicted(pos).and_then(|p| usize::try_from(p).ok()) {
            if let Some(count) = counts.get_mut(idx) {
                *count += 1;
            }
        }
    }
    if rows.is_empty() {
        return vec![0.0; option_count];
    }
    counts
        .into_iter()
        .map(|c| round2(c as f64 / rows.len() as f64 * 100.0))
        .collect()
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(certain: bool, predicted: [i64; 4]) -> SweepObservation {
        SweepObservation {
            is_certain: certain,
            predicted: predicted.to_vec(),
        }
    }

    fn sample() -> Vec<SweepObservation> {
        vec![
            obs(true, [0, 1, 2, 3]),
            obs(true, [0, 0, 2, 0]),
            obs(false, [0, 0, 0, -1]),
            obs(false, [1, 1, 1, 1]),
        ]
    }

    #[test]
    fn test_subset_correctness() {
        let rows = sample();
        let c0 = subset_correctness(&rows, 0);
        assert_eq!(c0.overall, Some(0.75));
        assert_eq!(c0.certain, Some(1.0));
        assert_eq!(c0.uncertain, Some(0.5));

        let c3 = subset_correctness(&rows, 3);
        assert_eq!(c3.overall, Some(0.25));
        assert_eq!(c3.uncertain, Some(0.0));

        let only_certain = vec![obs(true, [0, 1, 2, 3])];
        assert_eq!(subset_correctness(&only_certain, 1).uncertain, None);
    }

    #[test]
    fn test_binary_metrics() {
        let rows = sample();
        let all: Vec<&SweepObservation> = rows.iter().collect();

        let m1 = binary_metrics(&all, 1);
        assert_eq!(m1.precision, 1.0);
        assert_eq!(m1.recall, 0.5);
        assert!((m1.f1 - 2.0 / 3.0).abs() < 1e-12);

        let none = vec![obs(false, [3, 3, 3, 0])];
        let refs: Vec<&SweepObservation> = none.iter().collect();
        let m0 = binary_metrics(&refs, 0);
        assert_eq!((m0.precision, m0.recall, m0.f1), (0.0, 0.0, 0.0));
    }

    #[test]
    fn test_response_distribution() {
        let rows = sample();
        let all: Vec<&SweepObservation> = rows.iter().collect();
        assert_eq!(response_distribution(&all, 3, 4), vec![25.0, 25.0, 0.0, 25.0]);

        let thirds = vec![obs(true, [0, 0, 0, 0]), obs(true, [1, 0, 0, 0]), obs(true, [2, 0, 0, 0])];
        let refs: Vec<&SweepObservation> = thirds.iter().collect();
        assert_eq!(response_distribution(&refs, 0, 4), vec![33.33, 33.33, 33.33, 0.0]);

        assert_eq!(response_distribution(&[], 0, 4), vec![0.0; 4]);
    }
}

//! Position-bias analysis over position sweep results

pub mod chi_square;
pub mod confusion;
pub mod metrics;

pub use chi_square::{chi_square_independence, contingency_table, ChiSquareOutcome, ChiSquareTest};
pub use confusion::ConfusionMatrix;
pub use metrics::{binary_metrics, correctness, response_distribution, subset_correctness, BinaryMetrics, SubsetCorrectness};

use serde::{Deserialize, Serialize};

use crate::experiments::PositionLockedRow;

/// Significance level for the chi-square test
pub const SIGNIFICANCE: f64 = 0.05;

/// Error type for analysis
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("No observations to analyze")]
    Empty,

    #[error("Invalid contingency table: {0}")]
    InvalidTable(String),

    #[error("zero expected frequency in contingency table")]
    ZeroExpected,

    #[error("Distribution error: {0}")]
    Distribution(String),
}

/// What one question's sweep contributes to the analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepObservation {
    pub is_certain: bool,
    /// Picked index with the answer forced to each position; -1 when unscored
    pub predicted: Vec<i64>,
}

impl SweepObservation {
    pub fn predicted(&self, pos: usize) -> Option<i64> {
        self.predicted.get(pos).copied()
    }

    pub fn is_correct(&self, pos: usize) -> bool {
        self.predicted(pos) == Some(pos as i64)
    }
}

impl From<&PositionLockedRow> for SweepObservation {
    fn from(row: &PositionLockedRow) -> Self {
        Self {
            is_certain: row.is_certain(),
            predicted: row.positions.iter().map(|p| p.response_idx()).collect(),
        }
    }
}

/// Metrics for one forced answer position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionReport {
    pub position: usize,
    pub correctness: SubsetCorrectness,
    pub distribution_certain: Vec<f64>,
    pub distribution_uncertain: Vec<f64>,
    pub metrics: BinaryMetrics,
}

/// Full analysis of one model's sweep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub name: String,
    pub question_count: usize,
    pub certain_count: usize,
    pub option_count: usize,
    pub positions: Vec<PositionReport>,
    pub confusion_certain: ConfusionMatrix,
    pub confusion_uncertain: ConfusionMatrix,
    pub chi_square: ChiSquareOutcome,
}

impl AnalysisReport {
    pub fn is_significant(&self) -> bool {
        self.chi_square.is_significant(SIGNIFICANCE)
    }
}

pub fn analyze_dataset(
    name: impl Into<String>,
    observations: &[SweepObservation],
    option_count: usize,
) -> Result<AnalysisReport, AnalysisError> {
    if observations.is_empty() {
        return Err(AnalysisError::Empty);
    }

    let all: Vec<&SweepObservation> = observations.iter().collect();
    let (certain, uncertain): (Vec<&SweepObservation>, Vec<&SweepObservation>) =
        observations.iter().partition(|o| o.is_certain);

    let positions = (0..option_count)
        .map(|pos| PositionReport {
            position: pos,
            correctness: subset_correctness(observations, pos),
            distribution_certain: response_distribution(&certain, pos, option_count),
            distribution_uncertain: response_distribution(&uncertain, pos, option_count),
            metrics: binary_metrics(&all, pos),
        })
        .collect();

    let table = contingency_table(observations, option_count);
    let chi_square = ChiSquareOutcome::from(chi_square_independence(&table));
    if let ChiSquareOutcome::Undefined { reason } = &chi_square {
        tracing::warn!("Chi-square test skipped: {}", reason);
    }

    Ok(AnalysisReport {
        name: name.into(),
        question_count: observations.len(),
        certain_count: certain.len(),
        option_count,
        positions,
        confusion_certain: ConfusionMatrix::from_observations(&certain, option_count),
        confusion_uncertain: ConfusionMatrix::from_observations(&uncertain, option_count),
        chi_square,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(is_certain: bool, predicted: [i64; 4]) -> SweepObservation {
        SweepObservation {
            is_certain,
            predicted: predicted.to_vec(),
        }
    }

    #[test]
    fn test_analyze_dataset() {
        // A model that prefers the first slot
        let observations = vec![
            obs(true, [0, 1, 2, 3]),
            obs(true, [0, 1, 2, 0]),
            obs(false, [0, 0, 0, 0]),
            obs(false, [0, 0, 2, -1]),
            obs(false, [0, 0, 0, 3]),
        ];
        let report = analyze_dataset("fake", &observations, 4).unwrap();

        assert_eq!(report.question_count, 5);
        assert_eq!(report.certain_count, 2);
        assert_eq!(report.positions.len(), 4);
        assert_eq!(report.positions[0].correctness.overall, Some(1.0));
        assert_eq!(report.positions[1].correctness.uncertain, Some(0.0));
        assert_eq!(report.positions[3].distribution_uncertain, vec![33.33, 0.0, 0.0, 33.33]);

        for actual in 0..4 {
            assert_eq!(report.confusion_certain.row_total(actual), 2);
            assert_eq!(report.confusion_uncertain.row_total(actual), 3);
        }
        let chi = report.chi_square.test().unwrap();
        assert_eq!(chi.dof, 3);
        assert_eq!(chi.expected.len(), 4);
    }

    #[test]
    fn test_empty_and_degenerate() {
        assert!(matches!(analyze_dataset("none", &[], 4), Err(AnalysisError::Empty)));

        // Every slot answered correctly: metrics survive, the test does not
        let all_correct = vec![obs(true, [0, 1, 2, 3]), obs(false, [0, 1, 2, 3])];
        let report = analyze_dataset("perfect", &all_correct, 4).unwrap();
        assert_eq!(report.positions[2].correctness.overall, Some(1.0));
        assert_eq!(report.positions[3].metrics.f1, 1.0);
        assert_eq!(report.confusion_certain.counts[1][1], 1);
        assert!(report.chi_square.test().is_none());
        assert!(!report.is_significant());

        let all_unscored = vec![obs(true, [-1; 4]), obs(false, [-1; 4])];
        let report = analyze_dataset("silent", &all_unscored, 4).unwrap();
        assert_eq!(report.positions[0].correctness.overall, Some(0.0));
        assert_eq!(report.confusion_uncertain.unscored, vec![1, 1, 1, 1]);
        assert!(matches!(report.chi_square, ChiSquareOutcome::Undefined { .. }));
    }
}

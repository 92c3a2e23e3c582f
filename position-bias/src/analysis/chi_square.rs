//! Chi-square test of independence between answer position and correctness

use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF};

use super::{AnalysisError, SweepObservation};

/// Result of a chi-square test on a contingency table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChiSquareTest {
    pub statistic: f64,
    pub dof: usize,
    pub p_value: f64,
    pub expected: Vec<Vec<f64>>,
}

impl ChiSquareTest {
    pub fn is_significant(&self, alpha: f64) -> bool {
        self.p_value < alpha
    }
}

/// A test result, or why the statistic is undefined for this table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChiSquareOutcome {
    Tested(ChiSquareTest),
    Undefined { reason: String },
}

impl ChiSquareOutcome {
    pub fn test(&self) -> Option<&ChiSquareTest> {
        match self {
            Self::Tested(test) => Some(test),
            Self::Undefined { .. } => None,
        }
    }

    pub fn is_significant(&self, alpha: f64) -> bool {
        self.test().is_some_and(|t| t.is_significant(alpha))
    }
}

impl From<Result<ChiSquareTest, AnalysisError>> for ChiSquareOutcome {
    fn from(result: Result<ChiSquareTest, AnalysisError>) -> Self {
        match result {
            Ok(test) => Self::Tested(test),
            Err(e) => Self::Undefined { reason: e.to_string() },
        }
    }
}

/// positions × {correct, incorrect}
pub fn contingency_table(rows: &[SweepObservation], positions: usize) -> Vec<Vec<f64>> {
    (0..positions)
        .map(|pos| {
            let correct = rows.iter().filter(|o| o.is_correct(pos)).count();
            vec![correct as f64, (rows.len() - correct) as f64]
        })
        .collect()
}

/// Pearson's test of independence; Yates' correction applies when there is a
/// single degree of freedom
pub fn chi_square_independence(observed: &[Vec<f64>]) -> Result<ChiSquareTest, AnalysisError> {
    let rows = observed.len();
    let cols = observed.first().map(Vec::len).unwrap_or(0);
    if rows == 0 || cols == 0 || observed.iter().any(|r| r.len() != cols) {
        return Err(AnalysisError::InvalidTable(format!(
            "expected a non-empty rectangular table, got {} rows",
            rows
        )));
    }

    let row_sums: Vec<f64> = observed.iter().map(|r| r.iter().sum()).collect();
    let col_sums: Vec<f64> = (0..cols).map(|c| observed.iter().map(|r| r[c]).sum()).collect();
    let total: f64 = row_sums.iter().sum();

    let expected: Vec<Vec<f64>> = row_sums
        .iter()
        .map(|rs| col_sums.iter().map(|cs| rs * cs / total).collect())
        .collect();
    if expected.iter().flatten().any(|&e| e.is_nan() || e <= 0.0) {
        return Err(AnalysisError::ZeroExpected);
    }

    let dof = (rows - 1) * (cols - 1);
    if dof == 0 {
        return Ok(ChiSquareTest {
            statistic: 0.0,
            dof,
            p_value: 1.0,
            expected,
        });
    }

    let mut statistic = 0.0;
    for (obs_row, exp_row) in observed.iter().zip(&expected) {
        for (&o, &e) in obs_row.iter().zip(exp_row) {
            let mut diff = (o - e).abs();
            if dof == 1 {
                diff = (diff - 0.5).max(0.0);
            }
            statistic += diff * diff / e;
        }
    }

    let distribution = ChiSquared::new(dof as f64).map_err(|e| AnalysisError::Distribution(e.to_string()))?;
    let p_value = 1.0 - distribution.cdf(statistic);

    Ok(ChiSquareTest {
        statistic,
        dof,
        p_value,
        expected,
    })
}

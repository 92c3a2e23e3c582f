//! Certainty measurement: repeated shuffled runs per question

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::dataset::{relocate_all, QuestionRow};
use crate::runner::{DatasetScorer, ScoredRow, ScoringError};

/// How stable a model's answer to one question is across runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CertaintySummary {
    /// Fraction of runs answered correctly
    pub correctness: f64,
    /// Distinct answer texts; an unscored run contributes `None`
    pub response_set: BTreeSet<Option<String>>,
    pub consistency: f64,
    pub is_certain: bool,
}

impl CertaintySummary {
    /// Summarize the runs of a single question
    pub fn from_runs<'a>(runs: impl IntoIterator<Item = &'a ScoredRow>) -> Self {
        let mut total = 0usize;
        let mut correct = 0usize;
        let mut response_set = BTreeSet::new();
        for run in runs {
            total += 1;
            if run.is_correct() {
                correct += 1;
            }
            response_set.insert(run.response_text().map(str::to_string));
        }

        if total == 0 {
            return Self {
                correctness: 0.0,
                response_set,
                consistency: 0.0,
                is_certain: false,
            };
        }

        let correctness = correct as f64 / total as f64;
        let consistency = 1.0 - (response_set.len() as f64 - 1.0) / total as f64;
        Self {
            correctness,
            response_set,
            consistency,
            is_certain: correctness == 1.0 && consistency == 1.0,
        }
    }
}

/// A question with its certainty summary, as persisted between experiments
#[derive(Debug, Clone, PartialEq)]
pub struct CertaintyRecord {
    pub row: QuestionRow,
    pub summary: CertaintySummary,
}

/// A question with its certainty summary and every run behind it
#[derive(Debug, Clone, PartialEq)]
pub struct CertaintyRow {
    pub row: QuestionRow,
    pub summary: CertaintySummary,
    pub runs: Vec<ScoredRow>,
}

impl CertaintyRow {
    pub fn record(&self) -> CertaintyRecord {
        CertaintyRecord {
            row: self.row.clone(),
            summary: self.summary.clone(),
        }
    }
}

/// Move every answer to the front, then score `runs` times with the options
/// reshuffled before each run.
pub async fn score_certainty<R: Rng>(
    scorer: &DatasetScorer,
    rows: &[QuestionRow],
    runs: usize,
    shuffle_distractors: bool,
    rng: &mut R,
) -> Result<Vec<CertaintyRow>, ScoringError> {
    let base = relocate_all(rows, 0, shuffle_distractors, rng)?;
    let mut passes = scorer.score_runs(&base, runs, true, rng).await?;

    let mut per_row: Vec<Vec<ScoredRow>> = base.iter().map(|_| Vec::with_capacity(runs)).collect();
    for pass in passes.drain(..) {
        for (slot, scored) in per_row.iter_mut().zip(pass) {
            slot.push(scored);
        }
    }

    let annotated: Vec<CertaintyRow> = base
        .into_iter()
        .zip(per_row)
        .map(|(row, runs)| CertaintyRow {
            summary: CertaintySummary::from_runs(&runs),
            row,
            runs,
        })
        .collect();

    let certain = annotated.iter().filter(|r| r.summary.is_certain).count();
    tracing::info!(
        "Certain: {}, uncertain: {} ({} runs with {})",
        certain,
        annotated.len() - certain,
        runs,
        scorer.model_name()
    );
    Ok(annotated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::ModelResponse;
    use crate::runner::runs::tests::PicksText;
    use crate::runner::BatchScheduler;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::Arc;

    fn row() -> QuestionRow {
        QuestionRow::new(
            "Q",
            vec!["A".into(), "B".into(), "C".into(), "D".into()],
            "B",
        )
        .unwrap()
    }

    fn answered(idx: Option<usize>) -> ScoredRow {
        ScoredRow {
            row: row(),
            response: idx.map(|response_idx| ModelResponse {
                proba: vec![0.25; 4],
                response_idx,
            }),
        }
    }

    #[test]
    fn test_all_runs_agree_and_correct() {
        let runs: Vec<ScoredRow> = [1, 1, 1, 1].iter().map(|&i| answered(Some(i))).collect();
        let summary = CertaintySummary::from_runs(&runs);
        assert_eq!(summary.correctness, 1.0);
        assert_eq!(summary.consistency, 1.0);
        assert!(summary.is_certain);
        assert_eq!(summary.response_set.len(), 1);
    }

    #[test]
    fn test_three_of_four_is_never_certain() {
        let runs: Vec<ScoredRow> = [1, 1, 1, 2].iter().map(|&i| answered(Some(i))).collect();
        let summary = CertaintySummary::from_runs(&runs);
        assert_eq!(summary.correctness, 0.75);
        assert_eq!(summary.consistency, 0.75);
        assert!(!summary.is_certain);
    }

    #[test]
    fn test_consistently_wrong_is_not_certain() {
        let runs: Vec<ScoredRow> = [3, 3, 3, 3].iter().map(|&i| answered(Some(i))).collect();
        let summary = CertaintySummary::from_runs(&runs);
        assert_eq!(summary.correctness, 0.0);
        assert_eq!(summary.consistency, 1.0);
        assert!(!summary.is_certain);
    }

    #[test]
    fn test_unscored_run_counts_as_absent_answer() {
        let runs = vec![answered(Some(1)), answered(None), answered(Some(1)), answered(None)];
        let summary = CertaintySummary::from_runs(&runs);
        assert_eq!(summary.correctness, 0.5);
        assert!(summary.response_set.contains(&None));
        assert!(summary.response_set.contains(&Some("B".to_string())));
        assert_eq!(summary.consistency, 0.75);
    }

    #[tokio::test]
    async fn test_score_certainty() {
        let rows = vec![
            row(),
            QuestionRow::new("R", vec!["w".into(), "x".into(), "y".into(), "B".into()], "x").unwrap(),
        ];
        let scorer = DatasetScorer::new(Arc::new(PicksText("B".into())), BatchScheduler::new(2), "fake");
        let mut rng = StdRng::seed_from_u64(5);

        let annotated = score_certainty(&scorer, &rows, 4, true, &mut rng).await.unwrap();
        assert_eq!(annotated.len(), 2);

        assert_eq!(annotated[0].row.answer_idx, 0);
        assert_eq!(annotated[0].row.options[0], "B");
        assert_eq!(annotated[0].runs.len(), 4);
        assert!(annotated[0].summary.is_certain);

        assert!(!annotated[1].summary.is_certain);
        assert_eq!(annotated[1].summary.correctness, 0.0);
        assert_eq!(annotated[1].record().row.answer, "x");
    }
}

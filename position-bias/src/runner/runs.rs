//! Repeated scoring passes over a dataset

use rand::Rng;
use std::sync::Arc;

use super::executor::BatchScheduler;
use super::scorer::RowScorer;
use super::ScoringError;
use crate::dataset::QuestionRow;
use crate::response::{ModelResponse, ScoreOutcome};

/// A question row as it was presented in one run, with the model's answer
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRow {
    pub row: QuestionRow,
    pub response: Option<ModelResponse>,
}

impl ScoredRow {
    pub fn new(row: QuestionRow, outcome: ScoreOutcome) -> Self {
        Self {
            row,
            response: outcome.into_response(),
        }
    }

    /// Chosen index, or -1 when unscored
    pub fn response_idx(&self) -> i64 {
        self.response.as_ref().map(|r| r.response_idx as i64).unwrap_or(-1)
    }

    /// Text of the chosen option
    pub fn response_text(&self) -> Option<&str> {
        let response = self.response.as_ref()?;
        self.row.options.get(response.response_idx).map(String::as_str)
    }

    pub fn response_proba(&self) -> Option<&[f64]> {
        self.response.as_ref().map(|r| r.proba.as_slice())
    }

    pub fn is_correct(&self) -> bool {
        self.response
            .as_ref()
            .map(|r| r.response_idx == self.row.answer_idx)
            .unwrap_or(false)
    }
}

/// Fraction of rows answered correctly; `None` for an empty run
pub fn run_correctness(rows: &[ScoredRow]) -> Option<f64> {
    if rows.is_empty() {
        return None;
    }
    let correct = rows.iter().filter(|r| r.is_correct()).count();
    Some(correct as f64 / rows.len() as f64)
}

/// Runs a row scorer over whole datasets
#[derive(Clone)]
pub struct DatasetScorer {
    scorer: Arc<dyn RowScorer>,
    scheduler: BatchScheduler,
    model_name: String,
}

impl DatasetScorer {
    pub fn new(scorer: Arc<dyn RowScorer>, scheduler: BatchScheduler, model_name: impl Into<String>) -> Self {
        Self {
            scorer,
            scheduler,
            model_name: model_name.into(),
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Score `rows` `times` times, optionally shuffling every row's options
    /// before each run. Each run is returned separately.
    pub async fn score_runs<R: Rng>(
        &self,
        rows: &[QuestionRow],
        times: usize,
        randomize: bool,
        rng: &mut R,
    ) -> Result<Vec<Vec<ScoredRow>>, ScoringError> {
        let mut runs = Vec::with_capacity(times);
        for run in 0..times {
            let mut working = rows.to_vec();
            if randomize {
                for row in &mut working {
                    row.shuffle_options(rng);
                }
            }

            tracing::info!(
                "Run {}/{}: scoring {} rows with {} ({} workers)",
                run + 1,
                times,
                working.len(),
                self.model_name,
                self.scheduler.workers()
            );
            let outcomes = self.scheduler.score_batch(self.scorer.clone(), &working).await?;
            let scored: Vec<ScoredRow> = working
                .into_iter()
                .zip(outcomes)
                .map(|(row, outcome)| ScoredRow::new(row, outcome))
                .collect();

            match run_correctness(&scored) {
                Some(c) => tracing::info!("Run {}/{} correctness: {:.4}", run + 1, times, c),
                None => tracing::info!("Run {}/{} had no rows", run + 1, times),
            }
            runs.push(scored);
        }
        Ok(runs)
    }

    /// Single pass without shuffling
    pub async fn score_once(&self, rows: &[QuestionRow]) -> Result<Vec<ScoredRow>, ScoringError> {
        let outcomes = self.scheduler.score_batch(self.scorer.clone(), rows).await?;
        let scored: Vec<ScoredRow> = rows
            .iter()
            .cloned()
            .zip(outcomes)
            .map(|(row, outcome)| ScoredRow::new(row, outcome))
            .collect();
        if let Some(c) = run_correctness(&scored) {
            tracing::info!("Correctness: {:.4}", c);
        }
        Ok(scored)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::providers::ProviderResult;
    use async_trait::async_trait;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// Always picks the option with the given text, unscored when absent
    pub(crate) struct PicksText(pub(crate) String);

    #[async_trait]
    impl RowScorer for PicksText {
        async fn score(&self, row: &QuestionRow) -> ProviderResult<ScoreOutcome> {
            Ok(match row.options.iter().position(|o| *o == self.0) {
                Some(response_idx) => ScoreOutcome::Scored(ModelResponse {
                    proba: vec![0.25; row.options.len()],
                    response_idx,
                }),
                None => ScoreOutcome::Unscored,
            })
        }
    }

    fn rows() -> Vec<QuestionRow> {
        let opts = |v: [&str; 4]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        vec![
            QuestionRow::new("q1", opts(["a", "b", "c", "d"]), "a").unwrap(),
            QuestionRow::new("q2", opts(["a", "e", "f", "g"]), "e").unwrap(),
            QuestionRow::new("q3", opts(["h", "i", "j", "k"]), "k").unwrap(),
        ]
    }

    fn dataset_scorer(text: &str) -> DatasetScorer {
        DatasetScorer::new(Arc::new(PicksText(text.into())), BatchScheduler::new(2), "fake")
    }

    #[tokio::test]
    async fn test_score_runs_shape() {
        let mut rng = StdRng::seed_from_u64(3);
        let runs = dataset_scorer("a").score_runs(&rows(), 3, true, &mut rng).await.unwrap();
        assert_eq!(runs.len(), 3);
        for run in &runs {
            assert_eq!(run.len(), 3);
            for scored in run {
                assert_eq!(scored.row.options[scored.row.answer_idx], scored.row.answer);
            }
            // q1 correct, q2 wrong, q3 unscored
            assert!(run[0].is_correct());
            assert!(!run[1].is_correct());
            assert_eq!(run[1].response_text(), Some("a"));
            assert_eq!(run[2].response_idx(), -1);
            assert_eq!(run[2].response_text(), None);
            assert!((run_correctness(run).unwrap() - 1.0 / 3.0).abs() < 1e-12);
        }
    }

    #[tokio::test]
    async fn test_score_runs_without_randomize_keeps_order() {
        let mut rng = StdRng::seed_from_u64(3);
        let input = rows();
        let runs = dataset_scorer("c").score_runs(&input, 2, false, &mut rng).await.unwrap();
        for run in runs {
            let presented: Vec<QuestionRow> = run.into_iter().map(|s| s.row).collect();
            assert_eq!(presented, input);
        }
    }

    #[tokio::test]
    async fn test_score_once() {
        let scored = dataset_scorer("k").score_once(&rows()).await.unwrap();
        assert_eq!(scored.iter().map(ScoredRow::response_idx).collect::<Vec<_>>(), vec![-1, -1, 3]);
        assert_eq!(scored[2].response_proba(), Some(&[0.25; 4][..]));
        assert_eq!(run_correctness(&[]), None);
    }
}

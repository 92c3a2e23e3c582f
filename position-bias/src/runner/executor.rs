//! Bounded-concurrency batch scoring

use std::sync::Arc;
use tokio::sync::Semaphore;

use super::scorer::RowScorer;
use super::ScoringError;
use crate::dataset::QuestionRow;
use crate::response::ScoreOutcome;

/// Scores batches of rows with at most `workers` requests in flight
#[derive(Clone)]
pub struct BatchScheduler {
    workers: usize,
    semaphore: Arc<Semaphore>,
}

impl BatchScheduler {
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            workers,
            semaphore: Arc::new(Semaphore::new(workers)),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Score every row, returning outcomes in input order.
    ///
    /// The first provider error or failed task fails the whole batch and
    /// cancels the rows still pending.
    pub async fn score_batch(
        &self,
        scorer: Arc<dyn RowScorer>,
        rows: &[QuestionRow],
    ) -> Result<Vec<ScoreOutcome>, ScoringError> {
        let mut handles = Vec::with_capacity(rows.len());
        for row in rows {
            let row = row.clone();
            let scorer = scorer.clone();
            let semaphore = self.semaphore.clone();

            handles.push(tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| ScoringError::TaskFailed(e.to_string()))?;
                scorer.score(&row).await.map_err(ScoringError::from)
            }));
        }

        let total = handles.len();
        let mut outcomes = Vec::with_capacity(total);
        let mut pending = handles.into_iter();
        while let Some(handle) = pending.next() {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(ScoringError::TaskFailed(e.to_string())),
            };
            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    tracing::error!("Batch failed after {}/{} rows: {}", outcomes.len(), total, e);
                    for rest in pending.by_ref() {
                        rest.abort();
                    }
                    return Err(e);
                }
            }
        }

        tracing::debug!(
            "Scored {} rows, {} unscored",
            total,
            outcomes.iter().filter(|o| !o.is_scored()).count()
        );
        Ok(outcomes)
    }
}

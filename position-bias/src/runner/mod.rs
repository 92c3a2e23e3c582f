//! Scoring engine: prompt, row scorer, retries, batches and runs

pub mod executor;
pub mod prompt;
pub mod retry;
pub mod runs;
pub mod scorer;

pub use executor::BatchScheduler;
pub use prompt::PromptTemplate;
pub use retry::{RetryPolicy, RetryingScorer};
pub use runs::{run_correctness, DatasetScorer, ScoredRow};
pub use scorer::{interpret_reply, interpret_response, Jitter, ModelRowScorer, RowScorer, SamplingParams};

use crate::dataset::DatasetError;
use crate::providers::ProviderError;

/// Error type for scoring passes
#[derive(Debug, thiserror::Error)]
pub enum ScoringError {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),

    #[error("Scoring task failed: {0}")]
    TaskFailed(String),
}

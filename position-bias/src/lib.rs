//! Positional Bias Harness for Multiple-Choice LLM Evaluation
//!
//! This crate measures whether a language model's answers to multiple-choice
//! questions depend on where the correct option sits in the option list.
//!
//! # Features
//!
//! - Assembly of a combined MCQ dataset from RACE, ARC, CommonsenseQA and TriviaQA exports
//! - Certainty measurement: repeated runs with shuffled options per question
//! - Position sweep: the answer forced into every slot and scored once per slot
//! - Bounded-concurrency scoring with rate-limit retries
//! - Correctness, confusion matrices, precision/recall/F1, choice distribution
//!   and a chi-square test of independence
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use position_bias::{
//!     config::Config,
//!     dataset::load_questions,
//!     experiments::score_certainty,
//!     providers::create_model,
//!     runner::{BatchScheduler, DatasetScorer, ModelRowScorer, PromptTemplate, RetryingScorer},
//! };
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_or_default();
//!     let model = create_model(&config, "openai")?;
//!
//!     let row_scorer = ModelRowScorer::new(model, PromptTemplate::new(4));
//!     let scorer = RetryingScorer::new(Arc::new(row_scorer), config.retry.policy());
//!     let dataset = DatasetScorer::new(Arc::new(scorer), BatchScheduler::new(10), "gpt-4o-mini");
//!
//!     let rows = load_questions("data/mcq.csv.gz")?;
//!     let mut rng = StdRng::seed_from_u64(7);
//!     let annotated = score_certainty(&dataset, &rows, 4, true, &mut rng).await?;
//!     println!("{} questions annotated", annotated.len());
//!     Ok(())
//! }
//! ```

pub mod analysis;
pub mod config;
pub mod dataset;
pub mod experiments;
pub mod providers;
pub mod reporting;
pub mod response;
pub mod runner;

pub use config::Config;

/// Prelude module for common imports
pub mod prelude {
    pub use crate::analysis::{analyze_dataset, AnalysisReport, SweepObservation};
    pub use crate::config::Config;
    pub use crate::dataset::{load_questions, save_questions, QuestionRow};
    pub use crate::experiments::{position_sweep, score_certainty, CertaintyRow, PositionLockedRow};
    pub use crate::providers::{
        create_model, ChatModel, CompletionRequest, CompletionResponse, Message, ProviderError, ProviderResult,
    };
    pub use crate::reporting::{print_console_report, JsonSummary};
    pub use crate::response::{ModelResponse, ScoreOutcome};
    pub use crate::runner::{
        BatchScheduler, DatasetScorer, ModelRowScorer, PromptTemplate, RetryPolicy, RetryingScorer, RowScorer,
        ScoredRow,
    };
}

//! Model response types and extraction of JSON embedded in free text
//!
//! Chat models are asked for JSON only, yet routinely wrap it in prose or
//! markdown fences. [`parse_json`] recovers the first array or object from
//! such text.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A structured answer to one multiple-choice question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    /// Probability the model assigns to each option, parallel to the options
    pub proba: Vec<f64>,
    /// Index of the chosen option
    pub response_idx: usize,
}

/// Outcome of scoring a single row
#[derive(Debug, Clone, PartialEq)]
pub enum ScoreOutcome {
    Scored(ModelResponse),
    /// The model's reply could not be turned into a valid response
    Unscored,
}

impl ScoreOutcome {
    pub fn response(&self) -> Option<&ModelResponse> {
        match self {
            ScoreOutcome::Scored(r) => Some(r),
            ScoreOutcome::Unscored => None,
        }
    }

    pub fn into_response(self) -> Option<ModelResponse> {
        match self {
            ScoreOutcome::Scored(r) => Some(r),
            ScoreOutcome::Unscored => None,
        }
    }

    pub fn is_scored(&self) -> bool {
        matches!(self, ScoreOutcome::Scored(_))
    }
}

/// Failure to recover JSON from model text
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("no JSON object or array found")]
    NoDelimiter,

    #[error("unterminated JSON: no '{close}' after position {start}")]
    Unclosed { close: char, start: usize },

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Locate the JSON slice inside `text`.
///
/// Whichever of `[` or `{` appears first opens the slice, which then runs to
/// the last matching closing delimiter at or after it.
pub fn locate_json(text: &str) -> Result<&str, ParseError> {
    let (start, close) = match (text.find('['), text.find('{')) {
        (None, None) => return Err(ParseError::NoDelimiter),
        (Some(a), None) => (a, ']'),
        (None, Some(o)) => (o, '}'),
        (Some(a), Some(o)) if a < o => (a, ']'),
        (_, Some(o)) => (o, '}'),
    };

    let end = text[start..]
        .rfind(close)
        .map(|offset| start + offset)
        .ok_or(ParseError::Unclosed { close, start })?;

    Ok(&text[start..=end])
}

/// Parse the JSON embedded in `text`, returning the value and its compact
/// serialization.
pub fn parse_json(text: &str) -> Result<(Value, String), ParseError> {
    let slice = locate_json(text)?;
    let value: Value = serde_json::from_str(slice)?;
    let compact = serde_json::to_string(&value)?;
    Ok((value, compact))
}

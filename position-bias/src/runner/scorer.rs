//! Row scoring: one question in, one structured model answer out

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::prompt::PromptTemplate;
use crate::dataset::QuestionRow;
use crate::providers::{ChatModel, CompletionRequest, ProviderResult};
use crate::response::{parse_json, ModelResponse, ScoreOutcome};

/// Anything that can score a single question row.
///
/// Reply problems (unparseable text, bad indices) come back as
/// [`ScoreOutcome::Unscored`]; provider failures are returned as errors so the
/// caller can decide whether to retry.
#[async_trait]
pub trait RowScorer: Send + Sync {
    async fn score(&self, row: &QuestionRow) -> ProviderResult<ScoreOutcome>;
}

/// Random pre-request delay that spreads bursts of requests
pub struct Jitter {
    min_ms: u64,
    max_ms: u64,
    rng: Mutex<StdRng>,
}

impl Jitter {
    pub fn new(min_ms: u64, max_ms: u64, seed: u64) -> Self {
        Self {
            min_ms: min_ms.min(max_ms),
            max_ms,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// No delay at all
    pub fn none() -> Self {
        Self::new(0, 0, 0)
    }

    pub fn draw(&self) -> Duration {
        if self.max_ms == 0 {
            return Duration::ZERO;
        }
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Duration::from_millis(rng.gen_range(self.min_ms..=self.max_ms))
    }
}

/// Sampling settings sent with every request
#[derive(Debug, Clone)]
pub struct SamplingParams {
    pub model: Option<String>,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            model: None,
            temperature: 0.5,
            top_p: 1.0,
            max_tokens: 256,
        }
    }
}

/// Scores rows against a chat model
pub struct ModelRowScorer {
    model: Arc<dyn ChatModel>,
    template: PromptTemplate,
    sampling: SamplingParams,
    jitter: Jitter,
}

impl ModelRowScorer {
    pub fn new(model: Arc<dyn ChatModel>, template: PromptTemplate) -> Self {
        Self {
            model,
            template,
            sampling: SamplingParams::default(),
            jitter: Jitter::none(),
        }
    }

    pub fn with_sampling(mut self, sampling: SamplingParams) -> Self {
        self.sampling = sampling;
        self
    }

    pub fn with_jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    fn request(&self, row: &QuestionRow) -> Option<CompletionRequest> {
        let messages = match self.template.messages(row) {
            Ok(messages) => messages,
            Err(e) => {
                tracing::warn!("Cannot format question '{}': {}", row.question, e);
                return None;
            }
        };
        let mut request = CompletionRequest::new(messages, self.sampling.max_tokens)
            .with_temperature(self.sampling.temperature)
            .with_top_p(self.sampling.top_p);
        if let Some(model) = &self.sampling.model {
            request = request.with_model(model);
        }
        Some(request)
    }
}

#[async_trait]
impl RowScorer for ModelRowScorer {
    async fn score(&self, row: &QuestionRow) -> ProviderResult<ScoreOutcome> {
        tokio::time::sleep(self.jitter.draw()).await;

        let Some(request) = self.request(row) else {
            return Ok(ScoreOutcome::Unscored);
        };
        let response = self.model.complete(&request).await?;
        tracing::debug!("{} replied: {}", self.model.name(), response.content);
        Ok(interpret_reply(&response.content, &row.options))
    }
}

/// Turn raw model text into a score outcome for a row with `options`
pub fn interpret_reply(text: &str, options: &[String]) -> ScoreOutcome {
    match parse_json(text.trim()) {
        Ok((value, _)) => interpret_response(value, options),
        Err(e) => {
            tracing::debug!("Unparseable reply ({}): {}", e, text);
            ScoreOutcome::Unscored
        }
    }
}

/// Validate a parsed reply.
///
/// `response_idx` must render as one character no greater than `'3'`;
/// anything else is taken to be the answer text itself and looked up among
/// the options. The resolved index must then fall inside the options.
pub fn interpret_response(value: Value, options: &[String]) -> ScoreOutcome {
    let value = match value {
        Value::Array(items) => match items.into_iter().next() {
            Some(first) => first,
            None => return ScoreOutcome::Unscored,
        },
        other => other,
    };

    let (Some(raw_idx), Some(proba)) = (value.get("response_idx"), value.get("proba").and_then(parse_proba)) else {
        return ScoreOutcome::Unscored;
    };

    let rendered = match raw_idx {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let mut chars = rendered.chars();
    let idx = match (chars.next(), chars.next()) {
        (None, _) => None,
        (Some(c), None) if c <= '3' => rendered.parse::<usize>().ok(),
        _ => {
            tracing::warn!("Broken response_idx {}, resolving against options", raw_idx);
            raw_idx
                .as_str()
                .and_then(|text| options.iter().position(|o| o == text))
        }
    };

    match idx {
        Some(response_idx) if response_idx < options.len() => {
            ScoreOutcome::Scored(ModelResponse { proba, response_idx })
        }
        _ => ScoreOutcome::Unscored,
    }
}

/// Probabilities as numbers or numeric strings
fn parse_proba(value: &Value) -> Option<Vec<f64>> {
    value
        .as_array()?
        .iter()
        .map(|p| match p {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        })
        .collect()
}

//! Anthropic (Claude) messages client

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::openai::retry_after_ms;
use super::traits::{
    ChatModel, CompletionRequest, CompletionResponse, Message, ProviderError, ProviderResult,
};

const DEFAULT_MODEL: &str = "claude-3-5-haiku-latest";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";

/// Anthropic API client
pub struct AnthropicClient {
    api_key: String,
    base_url: String,
    http_client: Client,
    default_model: String,
}

impl AnthropicClient {
    /// Create a new client from an already loaded API key
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            http_client: Client::new(),
            default_model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Set custom base URL
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set default model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// The system instruction travels outside the message list
    fn build_request(&self, request: &CompletionRequest) -> AnthropicRequest {
        AnthropicRequest {
            model: request
                .model
                .clone()
                .unwrap_or_else(|| self.default_model.clone()),
            max_tokens: request.max_tokens,
            messages: request
                .messages
                .iter()
                .filter(|m| m.role != "system")
                .map(AnthropicMessage::from)
                .collect(),
            system: request.system_prompt().map(str::to_string),
            temperature: request.temperature,
            top_p: request.top_p,
        }
    }
}

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[derive(Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

impl From<&Message> for AnthropicMessage {
    fn from(msg: &Message) -> Self {
        Self {
            role: msg.role.clone(),
            content: msg.content.clone(),
        }
    }
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    model: String,
    stop_reason: Option<String>,
    usage: Usage,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    text: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Deserialize)]
struct AnthropicError {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[serde(rename = "type")]
    error_type: Option<String>,
    message: String,
}

impl AnthropicResponse {
    /// Concatenated text blocks; tool and other blocks are skipped
    fn text(&self) -> String {
        self.content
            .iter()
            .filter(|block| block.content_type == "text")
            .filter_map(|block| block.text.as_deref())
            .collect()
    }
}

/// Map a non-success response onto the provider error taxonomy.
///
/// Only 429 is transient. A 529 `overloaded_error` is reported as an API error.
fn classify_error(status: StatusCode, retry_after_ms: u64, body: &str) -> ProviderError {
    let parsed = serde_json::from_str::<AnthropicError>(body).ok();

    if status == StatusCode::TOO_MANY_REQUESTS {
        if let Some(error) = &parsed {
            tracing::debug!(
                "Rate limited (type={}): {}",
                error.error.error_type.as_deref().unwrap_or(""),
                error.error.message
            );
        }
        return ProviderError::RateLimited { retry_after_ms };
    }

    let message = match parsed {
        Some(error) => error.error.message,
        None => format!("HTTP {}: {}", status.as_u16(), body),
    };

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return ProviderError::Config(format!(
            "Anthropic auth error ({}): {}",
            status.as_u16(),
            message
        ));
    }

    ProviderError::Api {
        status: status.as_u16(),
        message,
    }
}

#[async_trait]
impl ChatModel for AnthropicClient {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn complete(&self, request: &CompletionRequest) -> ProviderResult<CompletionResponse> {
        let start = Instant::now();
        let body = self.build_request(request);

        let response = self
            .http_client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let latency_ms = start.elapsed().as_millis() as u64;
        let status = response.status();

        if !status.is_success() {
            let retry_after = retry_after_ms(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(classify_error(status, retry_after, &body));
        }

        let api_response: AnthropicResponse = response.json().await?;

        Ok(CompletionResponse {
            content: api_response.text(),
            model: api_response.model,
            input_tokens: api_response.usage.input_tokens,
            output_tokens: api_response.usage.output_tokens,
            finish_reason: api_response.stop_reason.unwrap_or_else(|| "unknown".to_string()),
            latency_ms,
        })
    }
}

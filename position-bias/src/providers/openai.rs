//! OpenAI chat-completions client

use async_trait::async_trait;
use reqwest::{header::HeaderMap, Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::traits::{
    ChatModel, CompletionRequest, CompletionResponse, Message, ProviderError, ProviderResult,
};

const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI API client
pub struct OpenAIClient {
    api_key: String,
    base_url: String,
    http_client: Client,
    default_model: String,
}

impl OpenAIClient {
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
}

#[derive(Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[derive(Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

impl From<&Message> for OpenAIMessage {
    fn from(msg: &Message) -> Self {
        Self {
            role: msg.role.clone(),
            content: Some(msg.content.clone()),
        }
    }
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<Choice>,
    model: String,
    usage: OpenAIUsage,
}

#[derive(Deserialize)]
struct Choice {
    message: OpenAIMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Deserialize)]
struct OpenAIError {
    error: OpenAIErrorDetail,
}

#[derive(Deserialize)]
struct OpenAIErrorDetail {
    message: String,
    #[serde(rename = "type")]
    error_type: Option<String>,
}

/// Seconds from a `retry-after` header, in milliseconds
pub(crate) fn retry_after_ms(headers: &HeaderMap) -> u64 {
    headers
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(60)
        * 1000
}

/// Map a non-success response onto the provider error taxonomy.
///
/// OpenAI answers 429 both for rate limiting and for an exhausted quota; only
/// the former is transient.
fn classify_error(status: StatusCode, retry_after_ms: u64, body: &str) -> ProviderError {
    let parsed = serde_json::from_str::<OpenAIError>(body).ok();

    if status == StatusCode::TOO_MANY_REQUESTS {
        if let Some(error) = &parsed {
            let error_type = error.error.error_type.as_deref().unwrap_or("");
            if error_type == "insufficient_quota"
                || error.error.message.contains("exceeded your current quota")
            {
                return ProviderError::Config(format!(
                    "OpenAI quota exceeded: {}",
                    error.error.message
                ));
            }
            tracing::debug!("Rate limited (type={}): {}", error_type, error.error.message);
        }
        return ProviderError::RateLimited { retry_after_ms };
    }

    let message = match parsed {
        Some(error) => error.error.message,
        None => format!("HTTP {}: {}", status.as_u16(), body),
    };

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return ProviderError::Config(format!(
            "OpenAI auth error ({}): {}",
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
impl ChatModel for OpenAIClient {
    fn name(&self) -> &str {
        "openai"
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn complete(&self, request: &CompletionRequest) -> ProviderResult<CompletionResponse> {
        let start = Instant::now();

        let body = OpenAIRequest {
            model: request
                .model
                .clone()
                .unwrap_or_else(|| self.default_model.clone()),
            messages: request.messages.iter().map(|m| m.into()).collect(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            top_p: request.top_p,
        };

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
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

        let api_response: OpenAIResponse = response.json().await?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Parse("No choices in response".to_string()))?;

        Ok(CompletionResponse {
            content: choice.message.content.unwrap_or_default(),
            model: api_response.model,
            input_tokens: api_response.usage.prompt_tokens,
            output_tokens: api_response.usage.completion_tokens,
            finish_reason: choice.finish_reason.unwrap_or_else(|| "unknown".to_string()),
            latency_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_is_transient() {
        let body = r#"{"error":{"message":"Rate limit reached for requests","type":"requests"}}"#;
        let err = classify_error(StatusCode::TOO_MANY_REQUESTS, 2000, body);
        assert!(matches!(err, ProviderError::RateLimited { retry_after_ms: 2000 }));
    }

    #[test]
    fn test_quota_is_not_retried() {
        let body = r#"{"error":{"message":"You exceeded your current quota","type":"insufficient_quota"}}"#;
        let err = classify_error(StatusCode::TOO_MANY_REQUESTS, 2000, body);
        assert!(matches!(err, ProviderError::Config(_)));
    }

    #[test]
    fn test_auth_and_server_errors() {
        let body = r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error"}}"#;
        let err = classify_error(StatusCode::UNAUTHORIZED, 0, body);
        assert!(matches!(err, ProviderError::Config(ref m) if m.contains("Incorrect API key")));

        let err = classify_error(StatusCode::BAD_GATEWAY, 0, "<html>bad gateway</html>");
        match err {
            ProviderError::Api { status, message } => {
                assert_eq!(status, 502);
                assert!(message.starts_with("HTTP 502"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_request_serialization_skips_unset_sampling() {
        let body = OpenAIRequest {
            model: "gpt-4o-mini".into(),
            messages: vec![(&Message::user("hi")).into()],
            max_tokens: 64,
            temperature: Some(0.5),
            top_p: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["temperature"], 0.5);
        assert!(json.get("top_p").is_none());
        assert_eq!(json["messages"][0]["role"], "user");
    }
}

//! Chat model providers

pub mod anthropic;
pub mod openai;
pub mod traits;

pub use anthropic::AnthropicClient;
pub use openai::OpenAIClient;
pub use traits::{
    ChatModel, CompletionRequest, CompletionResponse, Message, ProviderError, ProviderResult,
};

use crate::config::{Config, ProviderConfig};
use std::sync::Arc;

/// API credential read once at process start
#[derive(Clone)]
pub struct Credentials {
    api_key: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
        }
    }

    /// Read the key from the environment variable the provider config names
    pub fn from_env(var: &str) -> ProviderResult<Self> {
        match std::env::var(var) {
            Ok(key) if !key.trim().is_empty() => Ok(Self::new(key.trim())),
            _ => Err(ProviderError::Config(format!("{} not set", var))),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credentials(***)")
    }
}

/// Enum to hold any provider type
pub enum Provider {
    Anthropic(AnthropicClient),
    OpenAI(OpenAIClient),
}

impl Provider {
    /// Build a provider from its config section and explicit credentials
    pub fn from_config(pc: &ProviderConfig, credentials: Credentials) -> ProviderResult<Self> {
        match pc.name.to_lowercase().as_str() {
            "anthropic" | "claude" => {
                let mut client = AnthropicClient::new(credentials.api_key).with_model(&pc.default_model);
                if let Some(url) = &pc.base_url {
                    client = client.with_base_url(url);
                }
                Ok(Provider::Anthropic(client))
            }
            "openai" | "gpt" => Ok(Provider::OpenAI(openai_client(pc, credentials))),
            // Any OpenAI-compatible endpoint is reachable through base_url
            _ if pc.base_url.is_some() => Ok(Provider::OpenAI(openai_client(pc, credentials))),
            _ => Err(ProviderError::Config(format!("Unknown provider: {}", pc.name))),
        }
    }

    pub fn into_model(self) -> Arc<dyn ChatModel> {
        match self {
            Provider::Anthropic(c) => Arc::new(c),
            Provider::OpenAI(c) => Arc::new(c),
        }
    }
}

fn openai_client(pc: &ProviderConfig, credentials: Credentials) -> OpenAIClient {
    let client = OpenAIClient::new(credentials.api_key).with_model(&pc.default_model);
    match &pc.base_url {
        Some(url) => client.with_base_url(url),
        None => client,
    }
}

/// Create the named provider, loading its credentials from the environment.
///
/// Called once at startup; the returned handle is immutable afterwards.
pub fn create_model(config: &Config, name: &str) -> ProviderResult<Arc<dyn ChatModel>> {
    let pc = config
        .get_provider(name)
        .ok_or_else(|| ProviderError::Config(format!("No provider configured as '{}'", name)))?;
    if !pc.enabled {
        return Err(ProviderError::Config(format!("Provider '{}' is disabled", name)));
    }
    let credentials = Credentials::from_env(&pc.api_key_env)?;
    Ok(Provider::from_config(pc, credentials)?.into_model())
}

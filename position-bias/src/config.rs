//! Configuration management for the position-bias pipeline
//!
//! Loads provider, scoring, retry and path settings from a TOML file and
//! provides runtime access. Every field has a default, so a partial file (or
//! no file at all) is a valid configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::runner::RetryPolicy;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

/// Provider-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub default_model: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    /// Override for the API base URL
    #[serde(default)]
    pub base_url: Option<String>,
}

/// Scoring harness settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Size of the worker pool fanning out row requests
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Repetitions used by the certainty driver
    #[serde(default = "default_certainty_runs")]
    pub certainty_runs: usize,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Pre-request delay is drawn uniformly from `[jitter_min_ms, jitter_max_ms]`
    #[serde(default = "default_jitter_min_ms")]
    pub jitter_min_ms: u64,
    #[serde(default = "default_jitter_max_ms")]
    pub jitter_max_ms: u64,
    /// Number of answer options every question carries
    #[serde(default = "default_option_count")]
    pub option_count: usize,
    /// Shuffle the distractors when the answer is relocated
    #[serde(default = "default_true")]
    pub shuffle_distractors: bool,
    /// Seed for shuffling and jitter; random when absent
    #[serde(default)]
    pub seed: Option<u64>,
}

/// Backoff settings for rate-limited requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_multiplier_ms")]
    pub multiplier_ms: u64,
    #[serde(default = "default_min_wait_ms")]
    pub min_wait_ms: u64,
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,
}

/// Well-known artifact locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Assembled and certainty-scored datasets
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Final position-sweep results
    #[serde(default = "default_dist_dir")]
    pub dist_dir: PathBuf,
    /// Intermediate per-run artifacts
    #[serde(default = "default_tmp_dir")]
    pub tmp_dir: PathBuf,
}

// Default value functions
fn default_true() -> bool { true }
fn default_workers() -> usize { 10 }
fn default_certainty_runs() -> usize { 4 }
fn default_temperature() -> f32 { 0.5 }
fn default_top_p() -> f32 { 1.0 }
fn default_max_tokens() -> u32 { 256 }
fn default_jitter_min_ms() -> u64 { 50 }
fn default_jitter_max_ms() -> u64 { 500 }
fn default_option_count() -> usize { 4 }
fn default_max_attempts() -> u32 { 5 }
fn default_multiplier_ms() -> u64 { 1_000 }
fn default_min_wait_ms() -> u64 { 4_000 }
fn default_max_wait_ms() -> u64 { 10_000 }
fn default_data_dir() -> PathBuf { PathBuf::from("data") }
fn default_dist_dir() -> PathBuf { PathBuf::from("dist") }
fn default_tmp_dir() -> PathBuf { PathBuf::from("tmp") }

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            certainty_runs: default_certainty_runs(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            max_tokens: default_max_tokens(),
            jitter_min_ms: default_jitter_min_ms(),
            jitter_max_ms: default_jitter_max_ms(),
            option_count: default_option_count(),
            shuffle_distractors: true,
            seed: None,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            multiplier_ms: default_multiplier_ms(),
            min_wait_ms: default_min_wait_ms(),
            max_wait_ms: default_max_wait_ms(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            dist_dir: default_dist_dir(),
            tmp_dir: default_tmp_dir(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            multiplier: Duration::from_millis(self.multiplier_ms),
            min_wait: Duration::from_millis(self.min_wait_ms),
            max_wait: Duration::from_millis(self.max_wait_ms),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from default config location or return defaults
    pub fn load_or_default() -> Self {
        let config_paths = [
            "config/position-bias.toml",
            "../config/position-bias.toml",
            "position-bias/config/position-bias.toml",
        ];

        for path in &config_paths {
            match Self::from_file(path) {
                Ok(config) => {
                    tracing::info!("Loaded configuration from {}", path);
                    return config;
                }
                Err(ConfigError::Io(_)) => continue,
                Err(e) => tracing::warn!("Ignoring {}: {}", path, e),
            }
        }

        tracing::info!("Using default configuration");
        Self::default()
    }

    /// Save configuration to a TOML file
    pub fn save_toml<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Reject settings the harness cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.scoring;
        if s.workers == 0 {
            return Err(ConfigError::Invalid("scoring.workers must be at least 1".into()));
        }
        if s.certainty_runs == 0 {
            return Err(ConfigError::Invalid("scoring.certainty_runs must be at least 1".into()));
        }
        if s.option_count < 2 {
            return Err(ConfigError::Invalid("scoring.option_count must be at least 2".into()));
        }
        if s.jitter_min_ms > s.jitter_max_ms {
            return Err(ConfigError::Invalid(format!(
                "scoring.jitter_min_ms ({}) exceeds jitter_max_ms ({})",
                s.jitter_min_ms, s.jitter_max_ms
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be at least 1".into()));
        }
        if self.retry.min_wait_ms > self.retry.max_wait_ms {
            return Err(ConfigError::Invalid("retry.min_wait_ms exceeds retry.max_wait_ms".into()));
        }
        Ok(())
    }

    /// Get a specific provider config
    pub fn get_provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.get(name)
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut providers = HashMap::new();

        providers.insert("openai".to_string(), ProviderConfig {
            name: "openai".to_string(),
            enabled: true,
            default_model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            base_url: None,
        });

        providers.insert("anthropic".to_string(), ProviderConfig {
            name: "anthropic".to_string(),
            enabled: false,
            default_model: "claude-3-5-haiku-latest".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            base_url: None,
        });

        Self {
            providers,
            scoring: ScoringConfig::default(),
            retry: RetryConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.providers.contains_key("openai"));
        assert_eq!(config.scoring.workers, 10);
        assert_eq!(config.scoring.option_count, 4);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.providers.values().filter(|p| p.enabled).count(), 1);
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_partial_toml_config() {
        let toml = r#"
[providers.local]
name = "local"
default_model = "llama-3"
api_key_env = "LOCAL_KEY"
base_url = "http://localhost:8080/v1"

[scoring]
workers = 4
seed = 7
"#;
        let config = Config::from_toml(toml).unwrap();
        let local = config.get_provider("local").unwrap();
        assert!(local.enabled);
        assert_eq!(local.base_url.as_deref(), Some("http://localhost:8080/v1"));
        assert_eq!(config.scoring.workers, 4);
        assert_eq!(config.scoring.seed, Some(7));
        assert_eq!(config.scoring.jitter_max_ms, 500);
        assert_eq!(config.retry.min_wait_ms, 4_000);
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let err = Config::from_toml("[scoring]\nworkers = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = Config::from_toml("[scoring]\njitter_min_ms = 900\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("position-bias.toml");
        Config::default().save_toml(&path).unwrap();

        let reloaded = Config::from_file(&path).unwrap();
        assert_eq!(reloaded.scoring.certainty_runs, 4);
        assert_eq!(reloaded.paths.dist_dir, PathBuf::from("dist"));
    }

    #[test]
    fn test_retry_policy_conversion() {
        let policy = RetryConfig::default().policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.min_wait, Duration::from_secs(4));
        assert_eq!(policy.max_wait, Duration::from_secs(10));
    }
}

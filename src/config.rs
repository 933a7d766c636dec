use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default = "default_chat_temperature")]
    pub chat_temperature: f32,
    #[serde(default = "default_chat_top_p")]
    pub chat_top_p: f32,
    #[serde(default = "default_chat_top_k")]
    pub chat_top_k: u32,
    #[serde(default = "default_chat_max_output_tokens")]
    pub chat_max_output_tokens: u32,
    #[serde(default = "default_chat_timeout_ms")]
    pub chat_timeout_ms: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            endpoint: default_endpoint(),
            api_key_env: default_api_key_env(),
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            temperature: default_temperature(),
            max_output_tokens: default_max_output_tokens(),
            chat_temperature: default_chat_temperature(),
            chat_top_p: default_chat_top_p(),
            chat_top_k: default_chat_top_k(),
            chat_max_output_tokens: default_chat_max_output_tokens(),
            chat_timeout_ms: default_chat_timeout_ms(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_endpoint() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}
fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}
fn default_timeout_ms() -> u64 {
    10_000
}
fn default_max_retries() -> u32 {
    2
}
fn default_retry_delay_ms() -> u64 {
    1_000
}
fn default_temperature() -> f32 {
    0.4
}
fn default_max_output_tokens() -> u32 {
    1500
}
fn default_chat_temperature() -> f32 {
    0.9
}
fn default_chat_top_p() -> f32 {
    0.9
}
fn default_chat_top_k() -> u32 {
    60
}
fn default_chat_max_output_tokens() -> u32 {
    1000
}
fn default_chat_timeout_ms() -> u64 {
    30_000
}

impl ModelConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn chat_timeout(&self) -> Duration {
        Duration::from_millis(self.chat_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitConfig {
    #[serde(default = "default_bucket_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_bucket_tokens")]
    pub refill_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_bucket_tokens(),
            refill_per_minute: default_bucket_tokens(),
        }
    }
}

fn default_bucket_tokens() -> u32 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
    /// Entries never expire when unset.
    #[serde(default)]
    pub ttl_secs: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
            ttl_secs: None,
        }
    }
}

fn default_cache_capacity() -> usize {
    512
}

impl CacheConfig {
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
    #[serde(default = "default_catalog_context_limit")]
    pub catalog_context_limit: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            max_sessions: default_max_sessions(),
            max_input_chars: default_max_input_chars(),
            catalog_context_limit: default_catalog_context_limit(),
        }
    }
}

fn default_history_limit() -> usize {
    20
}
fn default_max_sessions() -> usize {
    256
}
fn default_max_input_chars() -> usize {
    300
}
fn default_catalog_context_limit() -> usize {
    3000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.rate_limit.max_tokens == 0 {
        anyhow::bail!("rate_limit.max_tokens must be > 0");
    }
    if config.rate_limit.refill_per_minute == 0 {
        anyhow::bail!("rate_limit.refill_per_minute must be > 0");
    }

    if config.cache.capacity == 0 {
        anyhow::bail!("cache.capacity must be > 0");
    }

    if config.chat.history_limit < 2 {
        anyhow::bail!("chat.history_limit must be >= 2");
    }
    if config.chat.max_sessions == 0 {
        anyhow::bail!("chat.max_sessions must be > 0");
    }

    match config.model.provider.as_str() {
        "disabled" => {}
        "gemini" => {
            if config.model.model.is_none() {
                anyhow::bail!(
                    "model.model must be specified when provider is '{}'",
                    config.model.provider
                );
            }
        }
        other => anyhow::bail!(
            "Unknown model provider: '{}'. Must be disabled or gemini.",
            other
        ),
    }

    Ok(())
}

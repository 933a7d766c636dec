//! Generative model client.
//!
//! Defines the [`ModelBackend`] trait, a single-attempt "complete these turns"
//! primitive, with two implementations:
//! - **[`GeminiBackend`]**: calls the Gemini `generateContent` REST endpoint.
//! - **[`DisabledBackend`]**: always fails; used when no provider is
//!   configured, which routes every request through the fallback engine.
//!
//! [`ModelClient`] wraps a backend with retry and exponential backoff.
//! Caching and rate limiting are not done here; the
//! [`assistant`](crate::assistant) composes them around this client.
//!
//! # Retry Strategy
//!
//! - Timeout, HTTP 429, HTTP 5xx, connection errors → retry
//! - HTTP 4xx (not 429), malformed response body → fail immediately
//! - Delay before retry `n` (0-based) is `base_delay * 2^n`
//! - After `max_retries` retries the last error is returned

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::ModelConfig;
use crate::error::AssistError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Model,
    System,
}

/// One conversation turn.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatTurn {
    pub role: Role,
    pub text: String,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationConfig {
    pub temperature: f32,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
    pub max_output_tokens: u32,
}

/// A single model call as seen by a backend.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub turns: Vec<ChatTurn>,
    pub generation: GenerationConfig,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Delay slept after failed attempt `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << attempt.min(16))
    }
}

/// Per-call knobs for [`ModelClient::complete`].
#[derive(Debug, Clone)]
pub struct CompletionOptions {
    pub generation: GenerationConfig,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl CompletionOptions {
    /// Single-prompt JSON tasks (recommendation, suggestions).
    pub fn for_prompt(config: &ModelConfig) -> Self {
        Self {
            generation: GenerationConfig {
                temperature: config.temperature,
                top_p: None,
                top_k: None,
                max_output_tokens: config.max_output_tokens,
            },
            timeout: config.timeout(),
            retry: RetryPolicy {
                max_retries: config.max_retries,
                base_delay: config.retry_delay(),
            },
        }
    }

    /// Multi-turn conversational replies.
    pub fn for_chat(config: &ModelConfig) -> Self {
        Self {
            generation: GenerationConfig {
                temperature: config.chat_temperature,
                top_p: Some(config.chat_top_p),
                top_k: Some(config.chat_top_k),
                max_output_tokens: config.chat_max_output_tokens,
            },
            timeout: config.chat_timeout(),
            retry: RetryPolicy {
                max_retries: config.max_retries,
                base_delay: config.retry_delay(),
            },
        }
    }
}

/// Single-attempt access to a remote generative model.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Returns the model identifier (e.g. `"gemini-2.0-flash"`).
    fn model_name(&self) -> &str;

    /// Perform exactly one network call and return the generated text.
    async fn send(&self, request: &CompletionRequest) -> Result<String, AssistError>;
}

/// Build the backend selected by `[model].provider`.
pub fn create_backend(config: &ModelConfig) -> Result<Arc<dyn ModelBackend>> {
    match config.provider.as_str() {
        "gemini" => Ok(Arc::new(GeminiBackend::new(config)?)),
        "disabled" => Ok(Arc::new(DisabledBackend)),
        other => bail!("Unknown model provider: {}", other),
    }
}

// ============ Retry wrapper ============

#[derive(Clone)]
pub struct ModelClient {
    backend: Arc<dyn ModelBackend>,
}

impl ModelClient {
    pub fn new(backend: Arc<dyn ModelBackend>) -> Self {
        Self { backend }
    }

    pub fn model_name(&self) -> &str {
        self.backend.model_name()
    }

    /// Complete a single user prompt.
    pub async fn complete_prompt(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<String, AssistError> {
        self.complete(vec![ChatTurn::user(prompt)], options).await
    }

    /// Complete a conversation, retrying transient failures with
    /// exponential backoff.
    pub async fn complete(
        &self,
        turns: Vec<ChatTurn>,
        options: &CompletionOptions,
    ) -> Result<String, AssistError> {
        let request = CompletionRequest {
            turns,
            generation: options.generation.clone(),
            timeout: options.timeout,
        };

        let mut attempt = 0u32;
        loop {
            match self.backend.send(&request).await {
                Ok(text) => {
                    debug!(attempt = attempt + 1, chars = text.len(), "Model call succeeded");
                    return Ok(text);
                }
                Err(err) if err.is_retryable() && attempt < options.retry.max_retries => {
                    let delay = options.retry.delay_for(attempt);
                    warn!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Model call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    warn!(attempt = attempt + 1, error = %err, "Model call failed");
                    return Err(err);
                }
            }
        }
    }
}

// ============ Disabled Backend ============

/// A backend that never answers. Every request takes the fallback path.
pub struct DisabledBackend;

#[async_trait]
impl ModelBackend for DisabledBackend {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn send(&self, _request: &CompletionRequest) -> Result<String, AssistError> {
        Err(AssistError::Disabled)
    }
}

// ============ Gemini Backend ============

/// Backend for the Gemini `generateContent` API.
///
/// The API key is read once from the environment variable named by
/// `model.api_key_env` and sent as the `x-goog-api-key` header so it never
/// appears in request URLs or error messages.
pub struct GeminiBackend {
    model: String,
    endpoint: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiBackend {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("model.model required for Gemini provider"))?;

        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            anyhow::anyhow!("{} environment variable not set", config.api_key_env)
        })?;

        let client = reqwest::Client::builder().build()?;

        Ok(Self {
            model,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }
}

#[async_trait]
impl ModelBackend for GeminiBackend {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn send(&self, request: &CompletionRequest) -> Result<String, AssistError> {
        let url = format!("{}/models/{}:generateContent", self.endpoint, self.model);

        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", &self.api_key)
            .timeout(request.timeout)
            .json(&gemini_body(request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AssistError::from_status(status.as_u16(), body));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| AssistError::MalformedUpstreamResponse(e.to_string()))?;
        parse_gemini_response(&json)
    }
}

/// Request body for `generateContent`. System turns are sent as user turns
/// prefixed with `System: `.
pub fn gemini_body(request: &CompletionRequest) -> Value {
    let contents: Vec<Value> = request
        .turns
        .iter()
        .map(|turn| {
            let (role, text) = match turn.role {
                Role::User => ("user", turn.text.clone()),
                Role::Model => ("model", turn.text.clone()),
                Role::System => ("user", format!("System: {}", turn.text)),
            };
            json!({ "role": role, "parts": [{ "text": text }] })
        })
        .collect();

    let mut generation = json!({
        "temperature": request.generation.temperature,
        "maxOutputTokens": request.generation.max_output_tokens,
    });
    if let Some(top_p) = request.generation.top_p {
        generation["topP"] = json!(top_p);
    }
    if let Some(top_k) = request.generation.top_k {
        generation["topK"] = json!(top_k);
    }

    json!({
        "contents": contents,
        "generationConfig": generation,
    })
}

/// Pull `candidates[0].content.parts[0].text` out of the response envelope.
pub fn parse_gemini_response(json: &Value) -> Result<String, AssistError> {
    let text = json
        .pointer("/candidates/0/content/parts/0/text")
        .and_then(|t| t.as_str())
        .ok_or_else(|| {
            AssistError::MalformedUpstreamResponse("no text in model output".to_string())
        })?;

    if text.trim().is_empty() {
        return Err(AssistError::MalformedUpstreamResponse(
            "empty text in model output".to_string(),
        ));
    }

    Ok(text.to_string())
}

mod anthropic;
mod gemini;
mod openai;
pub mod types;

use std::future::Future;
use std::pin::Pin;

use courtroom_common::config::LlmRoleConfig;

pub use types::{LlmResponse, StopReason, TokenUsage};

/// Reasoning-service client with provider dispatch. Makes exactly one attempt
/// per call; retry, pacing and fallback live in [`crate::invoke::Invoker`].
pub struct LlmClient {
    http: reqwest::Client,
    config: LlmRoleConfig,
    api_key: String,
    label: String,
}

/// Errors from reasoning-service calls.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("LLM HTTP error: {0}")]
    Http(String),

    #[error("LLM auth error: {0}")]
    Auth(String),

    #[error("LLM rate limited (retry after {retry_after:?}s)")]
    RateLimited { retry_after: Option<u64> },

    #[error("LLM context window exceeded: {0}")]
    ContextWindowExceeded(String),

    #[error("LLM call timed out after {0}s")]
    Timeout(u64),

    #[error("LLM API error: {0}")]
    Api(String),

    #[error("LLM response parse error: {0}")]
    Parse(String),
}

impl LlmError {
    /// Whether this error should not be retried.
    pub fn is_non_retryable(&self) -> bool {
        matches!(self, LlmError::Auth(_) | LlmError::ContextWindowExceeded(_))
    }

    /// Quota or rate exhaustion, as opposed to any other transient failure.
    pub fn is_quota(&self) -> bool {
        match self {
            LlmError::RateLimited { .. } => true,
            LlmError::Api(msg) | LlmError::Http(msg) => {
                msg.contains("RESOURCE_EXHAUSTED") || msg.contains("429")
            }
            _ => false,
        }
    }

    /// Seconds the provider asked us to wait, if it said.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            LlmError::RateLimited { retry_after } => *retry_after,
            LlmError::Api(msg) | LlmError::Http(msg) => retry_hint_seconds(msg),
            _ => None,
        }
    }
}

impl From<LlmError> for courtroom_common::CourtroomError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::Timeout(secs) => {
                courtroom_common::CourtroomError::Timeout(format!("LLM call after {}s", secs))
            }
            other => courtroom_common::CourtroomError::LlmApi(other.to_string()),
        }
    }
}

impl LlmClient {
    /// Create a new LLM client.
    /// Reads the API key from the appropriate env var based on provider.
    /// Returns None if the key is not set.
    pub fn new(config: LlmRoleConfig) -> Option<Self> {
        let env_var = match config.provider.as_str() {
            "gemini" => "GEMINI_API_KEY",
            "anthropic" => "ANTHROPIC_API_KEY",
            "openai" => "OPENAI_API_KEY",
            other => {
                tracing::warn!(provider = other, "Unknown LLM provider");
                return None;
            }
        };

        let api_key = match std::env::var(env_var) {
            Ok(key) if !key.is_empty() => key,
            _ => {
                tracing::warn!(
                    env_var = env_var,
                    provider = config.provider.as_str(),
                    "API key not set, LLM client disabled for this role"
                );
                return None;
            }
        };

        Some(Self {
            http: reqwest::Client::new(),
            label: format!("{}/{}", config.provider, config.model),
            config,
            api_key,
        })
    }

    /// Single attempt, routed to the provider-specific implementation.
    pub async fn generate(&self, system: &str, prompt: &str) -> Result<LlmResponse, LlmError> {
        let response = match self.config.provider.as_str() {
            "gemini" => {
                gemini::generate_content(
                    &self.http,
                    &self.api_key,
                    &self.config.model,
                    self.config.max_tokens,
                    self.config.temperature,
                    system,
                    prompt,
                )
                .await
            }
            "anthropic" => {
                anthropic::send_messages(
                    &self.http,
                    &self.api_key,
                    &self.config.model,
                    self.config.max_tokens,
                    self.config.temperature,
                    system,
                    prompt,
                )
                .await
            }
            "openai" => {
                openai::send_chat_completion(
                    &self.http,
                    &self.api_key,
                    &self.config.model,
                    self.config.max_tokens,
                    self.config.temperature,
                    system,
                    prompt,
                )
                .await
            }
            other => Err(LlmError::Api(format!("Unknown provider: {}", other))),
        }?;

        if response.stop_reason == StopReason::MaxTokens {
            tracing::warn!(model = %self.label, "Response truncated at max_tokens");
        }
        Ok(response)
    }
}

/// Extract a provider retry hint in whole seconds (rounded up).
///
/// Understands "retry in 17.4s", `"retryDelay": "17s"` and `Retry-After: 17`.
pub fn retry_hint_seconds(text: &str) -> Option<u64> {
    const MARKERS: [&str; 3] = ["retry in ", "retrydelay", "retry-after"];

    let lower = text.to_lowercase();

    for marker in MARKERS {
        let Some(pos) = lower.find(marker) else {
            continue;
        };
        let rest = &lower[pos + marker.len()..];
        let number: String = rest
            .trim_start_matches(|c: char| !c.is_ascii_digit())
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect();
        if let Ok(secs) = number.parse::<f64>() {
            return Some(secs.ceil() as u64);
        }
    }
    None
}

/// Object-safe seam over the reasoning service (dyn dispatch).
/// Tests provide scripted mocks; production uses LlmClient.
pub trait ReasoningService: Send + Sync {
    /// Provider/model label for logs and metrics.
    fn label(&self) -> &str;

    fn generate<'a>(
        &'a self,
        system: &'a str,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, LlmError>> + Send + 'a>>;
}

impl ReasoningService for LlmClient {
    fn label(&self) -> &str {
        &self.label
    }

    fn generate<'a>(
        &'a self,
        system: &'a str,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, LlmError>> + Send + 'a>> {
        Box::pin(async move { Ok(LlmClient::generate(self, system, prompt).await?.text) })
    }
}

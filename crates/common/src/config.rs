use serde::{Deserialize, Serialize};

/// Top-level system configuration, deserialized from system.toml.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SystemConfig {
    pub pipeline: PipelineConfig,
    pub llm: LlmConfig,
    pub retry: RetryDefaults,
    pub rate_limit: RateLimitConfig,
    pub timeouts: TimeoutConfig,
    pub search: SearchConfig,
    pub registry: RegistryConfig,
}

/// Sizing knobs for the claim-verification stages.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Max sub-claims the decomposer may emit.
    pub max_claims: usize,
    /// Floor the lead promoter tops the claim list up to.
    pub min_claims: usize,
    /// Search results requested per adversarial query.
    pub results_per_side: usize,
    /// Max characters of each search snippet shown to the extractor.
    pub snippet_chars: usize,
    /// Tangential facts requested per claim on the enrichment path.
    pub extras_per_claim: usize,
    /// Search results requested for a Tier 3 consensus vote.
    pub consensus_results: usize,
    /// Characters of the fact text used in the consensus query.
    pub consensus_query_chars: usize,
    /// Facts judged per consensus invocation.
    pub consensus_batch_size: usize,
    /// Characters of the lowercased fact used as the extras dedup key.
    pub dedup_key_chars: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_claims: 5,
            min_claims: 5,
            results_per_side: 5,
            snippet_chars: 2000,
            extras_per_claim: 2,
            consensus_results: 10,
            consensus_query_chars: 100,
            consensus_batch_size: 4,
            dedup_key_chars: 100,
        }
    }
}

/// LLM provider and model configuration per task role.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Fast, low-effort role: decomposition, extraction, promotion.
    pub decomposer: LlmRoleConfig,
    /// Balanced role: consensus voting.
    pub analyzer: LlmRoleConfig,
    /// Deep-reasoning role: final verdict.
    pub judge: LlmRoleConfig,
    /// Lower-capability instance tried once a primary is quota-exhausted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<LlmRoleConfig>,
}

/// Configuration for a single LLM role.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LlmRoleConfig {
    /// Provider name ("gemini", "anthropic" or "openai").
    pub provider: String,
    /// Model identifier (e.g. "gemini-2.5-flash").
    pub model: String,
    /// Max tokens in the response.
    pub max_tokens: u32,
    /// Temperature (0.0–2.0).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

/// Retry parameters for reasoning-service calls.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryDefaults {
    pub llm_api: RetryConfig,
    /// Wait used when a quota error carries no retry hint.
    pub quota_fallback_wait_seconds: u64,
    /// Added on top of a provider-supplied retry hint.
    pub quota_hint_padding_seconds: u64,
    /// Re-asks allowed when a response fails repair/validation.
    pub validation_retries: u32,
}

impl Default for RetryDefaults {
    fn default() -> Self {
        Self {
            llm_api: RetryConfig::default(),
            quota_fallback_wait_seconds: 30,
            quota_hint_padding_seconds: 2,
            validation_retries: 1,
        }
    }
}

/// Retry configuration for a specific target.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 2000,
            max_backoff_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Pacing applied before every reasoning-service call.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Sustained calls per second (0.5 = one call every 2 s).
    pub requests_per_second: f64,
    /// Calls allowed back to back before pacing kicks in.
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 0.5,
            burst: 1,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Window for any single external call before it counts as transient failure.
    pub call_timeout_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            call_timeout_seconds: 120,
        }
    }
}

/// Web search collaborator.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchConfig {
    pub base_url: String,
    /// Results scored below this are discarded.
    pub min_relevance: f64,
    /// Hard cap on results requested from the provider.
    pub max_results: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.tavily.com".into(),
            min_relevance: 0.5,
            max_results: 10,
        }
    }
}

/// Fact-check registry collaborator.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegistryConfig {
    pub base_url: String,
    pub language_code: String,
    /// Minimum Jaro-Winkler similarity between the fact and a registry claim.
    pub min_similarity: f64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_url: "https://factchecktools.googleapis.com".into(),
            language_code: "en".into(),
            min_similarity: 0.6,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_config_from_toml() {
        let raw = r#"
            [pipeline]
            max_claims = 5
            min_claims = 5
            results_per_side = 5
            snippet_chars = 2000
            extras_per_claim = 2
            consensus_results = 10
            consensus_query_chars = 100
            consensus_batch_size = 4
            dedup_key_chars = 100

            [llm.decomposer]
            provider = "gemini"
            model = "gemini-2.5-flash"
            max_tokens = 4096
            temperature = 0.0

            [llm.analyzer]
            provider = "gemini"
            model = "gemini-2.5-flash"
            max_tokens = 4096

            [llm.judge]
            provider = "anthropic"
            model = "claude-sonnet-4-20250514"
            max_tokens = 8192

            [retry]
            quota_fallback_wait_seconds = 30
            quota_hint_padding_seconds = 2
            validation_retries = 1

            [retry.llm_api]
            max_attempts = 3
            initial_backoff_ms = 2000
            max_backoff_ms = 30000
            backoff_multiplier = 2.0
            jitter = true

            [rate_limit]
            requests_per_second = 0.5
            burst = 1

            [timeouts]
            call_timeout_seconds = 120

            [search]
            base_url = "https://api.tavily.com"
            min_relevance = 0.5
            max_results = 10

            [registry]
            base_url = "https://factchecktools.googleapis.com"
            language_code = "en"
            min_similarity = 0.6
        "#;

        let config: SystemConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.pipeline.consensus_batch_size, 4);
        assert_eq!(config.llm.judge.provider, "anthropic");
        assert!(config.llm.fallback.is_none());
        assert_eq!(config.llm.analyzer.temperature, None);
        assert_eq!(config.retry.llm_api.max_attempts, 3);
    }
}

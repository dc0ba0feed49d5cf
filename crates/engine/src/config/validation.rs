use courtroom_common::config::{LlmRoleConfig, RetryConfig};
use courtroom_common::trust::UNTRUSTED_CATEGORY;

use super::loader::{ConfigError, EngineConfig};

const PROVIDERS: [&str; 3] = ["gemini", "anthropic", "openai"];

/// Validate the complete engine configuration.
///
/// Checks sane ranges on numeric parameters. All problems are collected and
/// reported together.
pub fn validate(config: &EngineConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    validate_pipeline(config, &mut errors);
    validate_llm(config, &mut errors);
    validate_retry(config, &mut errors);
    validate_pacing(config, &mut errors);
    validate_collaborators(config, &mut errors);
    validate_catalog(config, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Validation(errors.join("; ")))
    }
}

fn validate_pipeline(config: &EngineConfig, errors: &mut Vec<String>) {
    let p = &config.system.pipeline;

    if p.max_claims == 0 {
        errors.push("pipeline.max_claims must be > 0".into());
    }
    if p.min_claims > p.max_claims {
        errors.push("pipeline.min_claims must be <= max_claims".into());
    }
    if p.results_per_side == 0 {
        errors.push("pipeline.results_per_side must be > 0".into());
    }
    if p.snippet_chars == 0 {
        errors.push("pipeline.snippet_chars must be > 0".into());
    }
    if p.consensus_results == 0 {
        errors.push("pipeline.consensus_results must be > 0".into());
    }
    if p.consensus_query_chars == 0 {
        errors.push("pipeline.consensus_query_chars must be > 0".into());
    }
    if p.consensus_batch_size == 0 {
        errors.push("pipeline.consensus_batch_size must be > 0".into());
    }
    if p.dedup_key_chars == 0 {
        errors.push("pipeline.dedup_key_chars must be > 0".into());
    }
}

fn validate_llm(config: &EngineConfig, errors: &mut Vec<String>) {
    let validate_role = |role: &LlmRoleConfig, name: &str, errors: &mut Vec<String>| {
        if !PROVIDERS.contains(&role.provider.as_str()) {
            errors.push(format!(
                "llm.{}.provider must be one of {}",
                name,
                PROVIDERS.join(", ")
            ));
        }
        if role.model.is_empty() {
            errors.push(format!("llm.{}.model must not be empty", name));
        }
        if role.max_tokens == 0 {
            errors.push(format!("llm.{}.max_tokens must be > 0", name));
        }
        if let Some(temp) = role.temperature {
            if !(0.0..=2.0).contains(&temp) {
                errors.push(format!(
                    "llm.{}.temperature must be between 0.0 and 2.0",
                    name
                ));
            }
        }
    };

    let llm = &config.system.llm;
    validate_role(&llm.decomposer, "decomposer", errors);
    validate_role(&llm.analyzer, "analyzer", errors);
    validate_role(&llm.judge, "judge", errors);
    if let Some(fallback) = &llm.fallback {
        validate_role(fallback, "fallback", errors);
    }
}

fn validate_retry(config: &EngineConfig, errors: &mut Vec<String>) {
    let validate_one = |rc: &RetryConfig, name: &str, errors: &mut Vec<String>| {
        if rc.max_attempts == 0 {
            errors.push(format!("retry.{}.max_attempts must be > 0", name));
        }
        if rc.initial_backoff_ms == 0 {
            errors.push(format!("retry.{}.initial_backoff_ms must be > 0", name));
        }
        if rc.max_backoff_ms < rc.initial_backoff_ms {
            errors.push(format!(
                "retry.{}.max_backoff_ms must be >= initial_backoff_ms",
                name
            ));
        }
        if rc.backoff_multiplier < 1.0 {
            errors.push(format!("retry.{}.backoff_multiplier must be >= 1.0", name));
        }
    };

    let r = &config.system.retry;
    validate_one(&r.llm_api, "llm_api", errors);
    if r.quota_fallback_wait_seconds == 0 {
        errors.push("retry.quota_fallback_wait_seconds must be > 0".into());
    }
}

fn validate_pacing(config: &EngineConfig, errors: &mut Vec<String>) {
    let rl = &config.system.rate_limit;

    if !(rl.requests_per_second > 0.0) {
        errors.push("rate_limit.requests_per_second must be > 0".into());
    }
    if rl.burst == 0 {
        errors.push("rate_limit.burst must be > 0".into());
    }
    if config.system.timeouts.call_timeout_seconds == 0 {
        errors.push("timeouts.call_timeout_seconds must be > 0".into());
    }
}

fn validate_collaborators(config: &EngineConfig, errors: &mut Vec<String>) {
    let s = &config.system.search;
    if s.base_url.is_empty() {
        errors.push("search.base_url must not be empty".into());
    }
    if !(0.0..=1.0).contains(&s.min_relevance) {
        errors.push("search.min_relevance must be between 0.0 and 1.0".into());
    }
    if s.max_results == 0 {
        errors.push("search.max_results must be > 0".into());
    }

    let r = &config.system.registry;
    if r.base_url.is_empty() {
        errors.push("registry.base_url must not be empty".into());
    }
    if !(0.0..=1.0).contains(&r.min_similarity) {
        errors.push("registry.min_similarity must be between 0.0 and 1.0".into());
    }
}

fn validate_catalog(config: &EngineConfig, errors: &mut Vec<String>) {
    let catalog = &config.trust_catalog;

    if !catalog.categories.contains_key(UNTRUSTED_CATEGORY) {
        errors.push(format!(
            "trust_catalog must define an '{}' category",
            UNTRUSTED_CATEGORY
        ));
    }
    for (name, patterns) in &catalog.categories {
        if patterns.iter().any(|p| p.trim().is_empty()) {
            errors.push(format!("trust_catalog.{} contains an empty domain", name));
        }
    }
}

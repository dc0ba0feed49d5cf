use std::time::Duration;

use courtroom_common::config::RetryDefaults;

/// Bounded retry schedule for reasoning-service calls.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Transport attempts per invocation, across all service instances.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
    pub jitter: bool,
    /// Wait after a quota error that carried no hint.
    pub quota_default_wait: Duration,
    /// Added on top of a provider hint.
    pub quota_hint_padding: Duration,
    /// Re-asks on the same instance after a response fails repair/validation.
    pub validation_retries: u32,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryDefaults) -> Self {
        Self {
            max_attempts: config.llm_api.max_attempts,
            initial_backoff: Duration::from_millis(config.llm_api.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.llm_api.max_backoff_ms),
            backoff_multiplier: config.llm_api.backoff_multiplier,
            jitter: config.llm_api.jitter,
            quota_default_wait: Duration::from_secs(config.quota_fallback_wait_seconds),
            quota_hint_padding: Duration::from_secs(config.quota_hint_padding_seconds),
            validation_retries: config.validation_retries,
        }
    }

    /// Delay before retry number `failures` (1-based) after a transient error.
    pub fn backoff(&self, failures: u32) -> Duration {
        let exp = self
            .backoff_multiplier
            .powi(failures.saturating_sub(1) as i32);
        let base_ms = (self.initial_backoff.as_millis() as f64 * exp) as u64;
        let base_ms = base_ms.min(self.max_backoff.as_millis() as u64);
        let jitter = if self.jitter {
            compute_jitter(failures, base_ms)
        } else {
            0
        };
        Duration::from_millis(base_ms + jitter)
    }

    /// Delay after a quota error: the hint plus padding, or the default wait.
    pub fn quota_wait(&self, hint_seconds: Option<u64>) -> Duration {
        match hint_seconds {
            Some(secs) => Duration::from_secs(secs) + self.quota_hint_padding,
            None => self.quota_default_wait,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryDefaults::default())
    }
}

/// Compute jitter for retry backoff using simple hash-based approach.
fn compute_jitter(attempt: u32, backoff_ms: u64) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::hash::DefaultHasher::new();
    attempt.hash(&mut hasher);
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos()
        .hash(&mut hasher);
    hasher.finish() % (backoff_ms / 2 + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(jitter: bool) -> RetryPolicy {
        RetryPolicy {
            jitter,
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn test_exponential_backoff_capped() {
        let p = policy(false);
        assert_eq!(p.backoff(1), Duration::from_millis(2000));
        assert_eq!(p.backoff(2), Duration::from_millis(4000));
        assert_eq!(p.backoff(3), Duration::from_millis(8000));
        assert_eq!(p.backoff(10), Duration::from_millis(30_000));
    }

    #[test]
    fn test_jitter_bounded_by_half() {
        let p = policy(true);
        for n in 1..5 {
            let base = policy(false).backoff(n);
            let with = p.backoff(n);
            assert!(with >= base);
            assert!(with <= base + base / 2);
        }
    }

    #[test]
    fn test_quota_wait() {
        let p = policy(false);
        assert_eq!(p.quota_wait(Some(17)), Duration::from_secs(19));
        assert_eq!(p.quota_wait(None), Duration::from_secs(30));
    }
}

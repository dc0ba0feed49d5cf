//! Resilient invocation layer: every reasoning-service call goes through an
//! [`Invoker`], which paces, retries, falls back and repairs.

pub mod rate_limit;
pub mod repair;
pub mod retry;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use courtroom_common::output::schema_text;
use courtroom_common::ModelOutput;

use crate::llm::{LlmError, ReasoningService};

pub use rate_limit::RateLimiter;
pub use repair::{repair_and_validate, repair_and_validate_array, ParseError};
pub use retry::RetryPolicy;

/// Process-wide count of reasoning-service calls. Diagnostics only.
#[derive(Debug, Default)]
pub struct CallCounter(AtomicU64);

impl CallCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one call and return the running total.
    pub fn increment(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Wraps an ordered list of service instances (primary first) with one retry
/// policy, a shared rate limiter and a shared call counter.
///
/// Failures never escape: `invoke` yields `None` and `invoke_array` an empty
/// vector once the retry budget is spent.
pub struct Invoker {
    role: &'static str,
    instances: Vec<Arc<dyn ReasoningService>>,
    policy: RetryPolicy,
    limiter: Arc<RateLimiter>,
    counter: Arc<CallCounter>,
    call_timeout: Duration,
}

impl Invoker {
    pub fn new(
        role: &'static str,
        instances: Vec<Arc<dyn ReasoningService>>,
        policy: RetryPolicy,
        limiter: Arc<RateLimiter>,
        counter: Arc<CallCounter>,
        call_timeout: Duration,
    ) -> Self {
        if instances.is_empty() {
            tracing::warn!(role, "No reasoning service configured, every call will degrade");
        }
        Self {
            role,
            instances,
            policy,
            limiter,
            counter,
            call_timeout,
        }
    }

    pub fn role(&self) -> &'static str {
        self.role
    }

    /// Ask for a single `T`. `None` means "unusable", never an error to unwind.
    pub async fn invoke<T: ModelOutput>(&self, system: &str, prompt: &str) -> Option<T> {
        let full = with_schema(prompt, &schema_text::<T>());
        self.run(system, &full, repair_and_validate::<T>).await
    }

    /// Ask for an array of `T`; invalid items are dropped individually.
    pub async fn invoke_array<T: ModelOutput>(&self, system: &str, prompt: &str) -> Vec<T> {
        let full = with_schema(prompt, &schema_text::<Vec<T>>());
        self.run(system, &full, repair_and_validate_array::<T>)
            .await
            .unwrap_or_default()
    }

    async fn run<R>(
        &self,
        system: &str,
        prompt: &str,
        parse: impl Fn(&str) -> Result<R, ParseError>,
    ) -> Option<R> {
        let mut active = 0usize;
        let mut failures = 0u32;
        let mut reasks = 0u32;

        while let Some(instance) = self.instances.get(active) {
            self.limiter.acquire().await;
            let total = self.counter.increment();
            metrics::counter!("llm.api.calls", "role" => self.role).increment(1);
            tracing::debug!(role = self.role, model = instance.label(), call = total, "Invoking");

            let result = match tokio::time::timeout(
                self.call_timeout,
                instance.generate(system, prompt),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(LlmError::Timeout(self.call_timeout.as_secs())),
            };

            let error = match result {
                Ok(text) => match parse(&text) {
                    Ok(record) => return Some(record),
                    Err(e) if reasks < self.policy.validation_retries => {
                        reasks += 1;
                        tracing::warn!(
                            role = self.role,
                            model = instance.label(),
                            error = %e,
                            "Response failed validation, re-asking"
                        );
                        continue;
                    }
                    Err(e) => {
                        metrics::counter!("llm.api.errors", "role" => self.role, "kind" => "validation")
                            .increment(1);
                        tracing::warn!(role = self.role, error = %e, "Response unusable after re-ask");
                        return None;
                    }
                },
                Err(e) => e,
            };

            metrics::counter!("llm.api.errors", "role" => self.role, "kind" => error_kind(&error))
                .increment(1);

            if error.is_non_retryable() {
                tracing::error!(role = self.role, model = instance.label(), error = %error, "Non-retryable LLM error");
                return None;
            }

            failures += 1;
            if failures >= self.policy.max_attempts {
                tracing::warn!(role = self.role, attempts = failures, error = %error, "Retry budget exhausted");
                return None;
            }

            if error.is_quota() && active + 1 < self.instances.len() {
                active += 1;
                metrics::counter!("llm.fallback.switches", "role" => self.role).increment(1);
                tracing::warn!(
                    role = self.role,
                    from = instance.label(),
                    to = self.instances[active].label(),
                    "Quota exhausted, switching to fallback instance"
                );
                continue;
            }

            let wait = if error.is_quota() {
                self.policy.quota_wait(error.retry_after())
            } else {
                self.policy.backoff(failures)
            };
            tracing::warn!(
                role = self.role,
                attempt = failures,
                wait_ms = wait.as_millis() as u64,
                error = %error,
                "LLM call failed, retrying"
            );
            tokio::time::sleep(wait).await;
        }

        None
    }
}

/// Suffix the prompt with the exact target schema.
fn with_schema(prompt: &str, schema: &str) -> String {
    format!(
        "{}\n\nIMPORTANT: Return ONLY valid JSON matching this schema:\n{}",
        prompt, schema
    )
}

fn error_kind(e: &LlmError) -> &'static str {
    match e {
        LlmError::Http(_) => "http",
        LlmError::Auth(_) => "auth",
        LlmError::RateLimited { .. } => "rate_limited",
        LlmError::ContextWindowExceeded(_) => "context_window",
        LlmError::Timeout(_) => "timeout",
        LlmError::Api(_) => "api",
        LlmError::Parse(_) => "parse",
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Mutex;

    use super::*;

    /// Scripted reasoning service: pops one canned result per call and
    /// records every prompt it was given.
    pub struct MockService {
        label: String,
        responses: Mutex<Vec<Result<String, LlmError>>>,
        pub prompts: Mutex<Vec<String>>,
    }

    impl MockService {
        pub fn new(label: &str, mut responses: Vec<Result<String, LlmError>>) -> Self {
            responses.reverse();
            Self {
                label: label.into(),
                responses: Mutex::new(responses),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }
    }

    impl ReasoningService for MockService {
        fn label(&self) -> &str {
            &self.label
        }

        fn generate<'a>(
            &'a self,
            _system: &'a str,
            prompt: &'a str,
        ) -> Pin<Box<dyn Future<Output = Result<String, LlmError>> + Send + 'a>> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            let next = self
                .responses
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(LlmError::Api("mock exhausted".into())));
            Box::pin(async move { next })
        }
    }

    pub fn invoker(instances: Vec<Arc<dyn ReasoningService>>) -> Invoker {
        Invoker::new(
            "test",
            instances,
            RetryPolicy::default(),
            Arc::new(RateLimiter::new(0.5, 1)),
            Arc::new(CallCounter::new()),
            Duration::from_secs(120),
        )
    }
}

//! Pipeline controller: decompose, optionally enrich, extract, verify,
//! judge and archive, strictly in sequence.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::Instrument;

use courtroom_common::config::LlmRoleConfig;
use courtroom_common::ids::{CaseId, RunId};
use courtroom_common::types::{FinalVerdict, RunState, RunStatus};

use crate::circuit_breaker::CircuitBreakerRegistry;
use crate::config::EngineConfig;
use crate::invoke::{CallCounter, Invoker, RateLimiter, RetryPolicy};
use crate::llm::{LlmClient, ReasoningService};
use crate::registry::FactCheckRegistry;
use crate::search::SearchService;
use crate::stages::{self, ExtractMode, StageContext};
use crate::store::CaseStore;

/// Runs claims through the full pipeline. One `Pipeline` serves many
/// concurrent runs; each run owns its own [`RunState`].
pub struct Pipeline {
    ctx: StageContext,
    store: Option<Arc<dyn CaseStore>>,
    counter: Arc<CallCounter>,
}

impl Pipeline {
    pub fn new(ctx: StageContext, store: Option<Arc<dyn CaseStore>>, counter: Arc<CallCounter>) -> Self {
        Self { ctx, store, counter }
    }

    /// Wire LLM clients from the loaded config. Roles whose key is missing
    /// get no instances and degrade to their fallbacks.
    pub fn from_config(
        config: &EngineConfig,
        search: Arc<dyn SearchService>,
        registry: Option<Arc<dyn FactCheckRegistry>>,
        store: Option<Arc<dyn CaseStore>>,
    ) -> Self {
        let system = &config.system;
        let policy = RetryPolicy::from_config(&system.retry);
        let limiter = Arc::new(RateLimiter::new(
            system.rate_limit.requests_per_second,
            system.rate_limit.burst,
        ));
        let counter = Arc::new(CallCounter::new());
        let call_timeout = Duration::from_secs(system.timeouts.call_timeout_seconds);

        let fallback: Option<Arc<dyn ReasoningService>> = system
            .llm
            .fallback
            .clone()
            .and_then(LlmClient::new)
            .map(|c| Arc::new(c) as Arc<dyn ReasoningService>);

        let invoker = |role: &'static str, primary: &LlmRoleConfig| {
            let mut instances: Vec<Arc<dyn ReasoningService>> = Vec::new();
            if let Some(client) = LlmClient::new(primary.clone()) {
                instances.push(Arc::new(client));
            }
            if let Some(fb) = &fallback {
                instances.push(Arc::clone(fb));
            }
            Invoker::new(
                role,
                instances,
                policy.clone(),
                Arc::clone(&limiter),
                Arc::clone(&counter),
                call_timeout,
            )
        };

        let ctx = StageContext {
            pipeline: system.pipeline.clone(),
            catalog: Arc::new(config.trust_catalog.clone()),
            decomposer: invoker("decomposer", &system.llm.decomposer),
            analyzer: invoker("analyzer", &system.llm.analyzer),
            judge: invoker("judge", &system.llm.judge),
            search,
            registry,
            breakers: Arc::new(CircuitBreakerRegistry::new()),
            call_timeout,
        };

        Self::new(ctx, store, counter)
    }

    pub fn context(&self) -> &StageContext {
        &self.ctx
    }

    /// Reasoning-service calls made so far by every run on this pipeline.
    pub fn call_count(&self) -> u64 {
        self.counter.get()
    }

    /// Run one transcript to a verdict. Never fails: the worst case is an
    /// `Unverified` verdict with explanatory text.
    pub async fn run_pipeline(&self, transcript: &str, case_id: Option<CaseId>) -> FinalVerdict {
        let (status, _rx) = watch::channel(RunStatus::Pending);
        let mut state = RunState::new(transcript, case_id);
        self.drive(&mut state, &status).await
    }

    /// Start a run on the runtime and return a handle to poll or abort it.
    pub fn spawn_run(self: &Arc<Self>, transcript: String, case_id: Option<CaseId>) -> RunHandle {
        let run_id = RunId::new();
        let (tx, rx) = watch::channel(RunStatus::Pending);
        let status = Arc::new(tx);

        let pipeline = Arc::clone(self);
        let task_status = Arc::clone(&status);
        let span = tracing::info_span!("run", run_id = %run_id);
        let task = tokio::spawn(
            async move {
                let mut state = RunState::new(transcript, case_id);
                pipeline.drive(&mut state, &task_status).await
            }
            .instrument(span),
        );

        RunHandle {
            run_id,
            status: rx,
            sender: status,
            task,
        }
    }

    async fn drive(&self, state: &mut RunState, status: &watch::Sender<RunStatus>) -> FinalVerdict {
        let started = tokio::time::Instant::now();
        let calls_before = self.counter.get();
        let ctx = &self.ctx;

        publish(status, RunStatus::Decomposing);
        let decomposed = state
            .decomposed
            .insert(stages::decompose(ctx, &state.transcript).await);

        let original = decomposed.claims.len();
        if original < ctx.pipeline.min_claims {
            tracing::info!(claims = original, "Too few claims, taking enrichment path");
            metrics::counter!("pipeline.enrichment.triggered").increment(1);

            publish(status, RunStatus::Extracting);
            stages::extract(ctx, decomposed, &mut state.claim_evidence, ExtractMode::WithExtras).await;

            publish(status, RunStatus::Promoting);
            stages::promote(ctx, decomposed, &state.claim_evidence).await;
        }

        publish(status, RunStatus::Extracting);
        stages::extract(ctx, decomposed, &mut state.claim_evidence, ExtractMode::Standard).await;

        publish(status, RunStatus::Verifying);
        state.verified = stages::verify(ctx, decomposed, &state.claim_evidence).await;

        publish(status, RunStatus::Judging);
        let verdict = stages::judge(ctx, decomposed, &state.verified).await;
        state.final_verdict = Some(verdict.clone());

        if let Some(store) = &self.store {
            publish(status, RunStatus::Archiving);
            let case_id = state.case_id.unwrap_or_default();
            match tokio::time::timeout(ctx.call_timeout, store.save(case_id, &verdict)).await {
                Ok(Ok(saved)) => state.case_id = Some(saved),
                Ok(Err(e)) => tracing::warn!(error = %e, "Failed to archive case"),
                Err(_) => tracing::warn!("Archiving case timed out"),
            }
        }

        ctx.breakers.report_metrics();
        metrics::counter!("pipeline.runs.completed").increment(1);
        metrics::histogram!("pipeline.run.duration_seconds").record(started.elapsed().as_secs_f64());
        tracing::info!(
            verdict = %verdict.overall_verdict,
            claims = verdict.claim_analyses.len(),
            llm_calls = self.counter.get() - calls_before,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Run completed"
        );

        publish(status, RunStatus::Completed);
        verdict
    }
}

/// Move to `next` unless the run already reached a terminal state.
fn publish(status: &watch::Sender<RunStatus>, next: RunStatus) {
    status.send_if_modified(|current| {
        if current.is_terminal() || *current == next {
            return false;
        }
        tracing::debug!(from = current.as_str(), to = next.as_str(), "Run status");
        *current = next;
        true
    });
}

/// Handle to a spawned run.
pub struct RunHandle {
    run_id: RunId,
    status: watch::Receiver<RunStatus>,
    sender: Arc<watch::Sender<RunStatus>>,
    task: JoinHandle<FinalVerdict>,
}

impl RunHandle {
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn status(&self) -> RunStatus {
        *self.status.borrow()
    }

    /// Receiver for status changes; `Completed` arrives only after the judge.
    pub fn subscribe(&self) -> watch::Receiver<RunStatus> {
        self.status.clone()
    }

    /// Abandon the run. Has no effect once it completed.
    pub fn abort(&self) {
        self.task.abort();
        publish(&self.sender, RunStatus::Abandoned);
        tracing::info!(run_id = %self.run_id, status = self.status().as_str(), "Run abort requested");
    }

    /// Wait for the verdict. `None` if the run was abandoned.
    pub async fn verdict(self) -> Option<FinalVerdict> {
        let result = self.task.await;
        if *self.status.borrow() == RunStatus::Abandoned {
            return None;
        }
        match result {
            Ok(verdict) => Some(verdict),
            Err(e) => {
                if e.is_panic() {
                    tracing::error!(run_id = %self.run_id, error = %e, "Run panicked");
                }
                publish(&self.sender, RunStatus::Abandoned);
                None
            }
        }
    }
}

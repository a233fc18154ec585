//! `DurableContext`: the handle a durable task body runs with. Every
//! operation either replays a memoized result or performs the side effect
//! once and persists it, so re-entering the same execution after a restart
//! or a suspension reproduces the same sequence of decisions.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::instrument;

use crate::durable::store::{DurableError, DurableStore};
use crate::durable::types::{AuditEntry, StepResult, Timer, TimerStatus, TimerType};
use crate::error::RunnerError;
use crate::model::deps::TaskInvoker;
use crate::model::id::Id;

const SLEEP_PREFIX: &str = "__sleep:";
const SIGNAL_PREFIX: &str = "__signal:";
const EMIT_PREFIX: &str = "__emit:";
const NOTE_PREFIX: &str = "__note:";
const ROLLBACK_PREFIX: &str = "rollback:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspensionReason {
    Sleep,
    Yield,
    Timeout,
}

/// Raised instead of panicking/unwinding when a durable task needs to
/// suspend; the worker loop matches on this rather than treating it as a
/// task failure.
#[derive(Debug, Clone, thiserror::Error)]
#[error("execution suspended ({reason:?})")]
pub struct SuspensionSignal {
    pub reason: SuspensionReason,
}

/// Governs what happens when a step is used without an explicit
/// `step_id` and the engine must mint one of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImplicitStepIdPolicy {
    Allow,
    Warn,
    Error,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StepOptions {
    pub timeout: Option<Duration>,
    pub max_attempts: Option<u32>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SignalOptions {
    pub timeout_ms: Option<u64>,
}

type CompensateFn = Arc<dyn Fn(Value) -> crate::model::deps::BoxFuture<'static, Result<(), RunnerError>> + Send + Sync>;

struct Compensation {
    step_id: String,
    value: Value,
    run: CompensateFn,
}

/// Holds everything a single execution attempt needs: the backing store,
/// identity, the saga compensation stack built up this attempt, and
/// counters for minting implicit step ids.
pub struct DurableContext {
    store: Arc<dyn DurableStore>,
    runtime: Weak<dyn TaskInvoker>,
    execution_id: String,
    implicit_policy: ImplicitStepIdPolicy,
    seen_step_ids: Mutex<HashSet<String>>,
    compensations: Mutex<Vec<Compensation>>,
    anon_counter: AtomicU32,
}

impl DurableContext {
    pub fn new(
        store: Arc<dyn DurableStore>,
        runtime: Weak<dyn TaskInvoker>,
        execution_id: impl Into<String>,
        implicit_policy: ImplicitStepIdPolicy,
    ) -> Self {
        Self {
            store,
            runtime,
            execution_id: execution_id.into(),
            implicit_policy,
            seen_step_ids: Mutex::new(HashSet::new()),
            compensations: Mutex::new(Vec::new()),
            anon_counter: AtomicU32::new(0),
        }
    }

    pub fn execution_id(&self) -> &str {
        &self.execution_id
    }

    fn reject_reserved(step_id: &str) -> Result<(), RunnerError> {
        let reserved = [SLEEP_PREFIX, SIGNAL_PREFIX, EMIT_PREFIX, NOTE_PREFIX, ROLLBACK_PREFIX];
        if reserved.iter().any(|p| step_id.starts_with(p)) {
            return Err(DurableError::ReservedStepId(step_id.to_string()).into());
        }
        Ok(())
    }

    async fn claim(&self, step_id: &str) -> Result<(), RunnerError> {
        let mut seen = self.seen_step_ids.lock().await;
        if !seen.insert(step_id.to_string()) {
            return Err(DurableError::DuplicateStepId(step_id.to_string()).into());
        }
        Ok(())
    }

    fn anon_id(&self, prefix: &str) -> String {
        let n = self.anon_counter.fetch_add(1, Ordering::SeqCst);
        match self.implicit_policy {
            ImplicitStepIdPolicy::Error => {
                tracing::error!(prefix, "implicit step id minted under an error policy");
            }
            ImplicitStepIdPolicy::Warn => {
                tracing::warn!(prefix, n, "minting an implicit step id; pass an explicit step_id to make replay robust to reordering");
            }
            ImplicitStepIdPolicy::Allow => {}
        }
        format!("{prefix}{n}")
    }

    /// Runs `f` at most once for this execution; a replayed attempt that
    /// already has a recorded result for `step_id` gets it back without
    /// calling `f` again. Retries `f` with exponential backoff (100ms base,
    /// doubling) up to `opts.max_attempts`, bounded by `opts.timeout`.
    #[instrument(skip(self, f, opts), fields(execution_id = %self.execution_id, step_id))]
    pub async fn step<T, F, Fut>(&self, step_id: &str, opts: StepOptions, f: F) -> Result<T, RunnerError>
    where
        T: Serialize + DeserializeOwned,
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, RunnerError>>,
    {
        Self::reject_reserved(step_id)?;
        self.claim(step_id).await?;

        if let Some(existing) = self.store.get_step_result(&self.execution_id, step_id).await? {
            return Ok(serde_json::from_value(existing.result)?);
        }

        let value = self.run_with_backoff(step_id, opts, f).await?;
        self.persist_step(step_id, &value).await?;
        Ok(value)
    }

    /// A saga step: `up` runs (memoized like [`step`]); on success its
    /// result is kept so [`rollback`] can later call `down` with it, in
    /// last-in-first-out order against every saga step that has committed
    /// so far in this attempt.
    pub async fn step_saga<T, Fup, FutUp, Fdown, FutDown>(
        &self,
        step_id: &str,
        opts: StepOptions,
        up: Fup,
        down: Fdown,
    ) -> Result<T, RunnerError>
    where
        T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
        Fup: Fn() -> FutUp,
        FutUp: std::future::Future<Output = Result<T, RunnerError>>,
        Fdown: Fn(T) -> FutDown + Send + Sync + 'static,
        FutDown: std::future::Future<Output = Result<(), RunnerError>> + Send + 'static,
    {
        let value = self.step(step_id, opts, up).await?;
        let compensated = value.clone();
        let down = Arc::new(down);
        let run: CompensateFn = Arc::new(move |v: Value| {
            let down = down.clone();
            Box::pin(async move {
                let typed: T = serde_json::from_value(v)?;
                down(typed).await
            })
        });
        self.compensations.lock().await.push(Compensation {
            step_id: step_id.to_string(),
            value: serde_json::to_value(compensated)?,
            run,
        });
        Ok(value)
    }

    /// Unwinds every committed saga step in this attempt, most recent
    /// first, each run as its own memoized internal step.
    #[instrument(skip(self), fields(execution_id = %self.execution_id))]
    pub async fn rollback(&self) -> Result<(), RunnerError> {
        let mut compensations = self.compensations.lock().await;
        while let Some(c) = compensations.pop() {
            let internal_id = format!("{ROLLBACK_PREFIX}{}", c.step_id);
            if self.store.get_step_result(&self.execution_id, &internal_id).await?.is_some() {
                continue;
            }
            match (c.run)(c.value.clone()).await {
                Ok(()) => {
                    self.persist_step(&internal_id, &Value::Bool(true)).await?;
                }
                Err(err) => {
                    return Err(DurableError::CompensationFailed(self.execution_id.clone(), err.to_string()).into());
                }
            }
        }
        Ok(())
    }

    /// Suspends the execution for `duration_ms`. Replaying after the timer
    /// fires observes a completed step and returns immediately instead of
    /// sleeping again.
    pub async fn sleep(&self, duration_ms: u64, step_id: Option<&str>) -> Result<(), RunnerError> {
        let key = step_id.map(str::to_string).unwrap_or_else(|| self.anon_id(SLEEP_PREFIX));
        let full_key = format!("{SLEEP_PREFIX}{key}");
        if self.store.get_step_result(&self.execution_id, &full_key).await?.is_some() {
            return Ok(());
        }

        let fire_at = chrono::Utc::now() + chrono::Duration::milliseconds(duration_ms as i64);
        let timer = Timer {
            id: format!("{}:{full_key}", self.execution_id),
            execution_id: Some(self.execution_id.clone()),
            schedule_id: None,
            step_id: Some(full_key.clone()),
            task_id: None,
            input: None,
            timer_type: TimerType::Sleep,
            fire_at,
            status: TimerStatus::Pending,
        };
        self.store.create_timer(&timer).await?;
        self.persist_step(&full_key, &Value::Bool(true)).await?;
        Err(SuspensionSignal { reason: SuspensionReason::Sleep }.into())
    }

    /// Suspends until `signal` is delivered via [`DurableService::signal`],
    /// or until `opts.timeout_ms` elapses if set. Once the worker has fired
    /// the timeout timer (persisting the `:timed_out` marker below), a
    /// replay that still finds no signal resolves to
    /// [`DurableError::SignalTimedOut`] instead of suspending again.
    pub async fn wait_for_signal(&self, signal: &str, opts: SignalOptions, step_id: Option<&str>) -> Result<Value, RunnerError> {
        let key = step_id.map(str::to_string).unwrap_or_else(|| signal.to_string());
        let full_key = format!("{SIGNAL_PREFIX}{key}");
        let timeout_marker = format!("{full_key}:timed_out");

        if let Some(existing) = self.store.get_step_result(&self.execution_id, &full_key).await? {
            return Ok(existing.result);
        }

        if self.store.get_step_result(&self.execution_id, &timeout_marker).await?.is_some() {
            return Err(DurableError::SignalTimedOut { execution_id: self.execution_id.clone(), signal: signal.to_string() }.into());
        }

        if let Some(timeout_ms) = opts.timeout_ms {
            let fire_at = chrono::Utc::now() + chrono::Duration::milliseconds(timeout_ms as i64);
            let timer = Timer {
                id: format!("{}:{full_key}:timeout", self.execution_id),
                execution_id: Some(self.execution_id.clone()),
                schedule_id: None,
                step_id: Some(full_key.clone()),
                task_id: None,
                input: None,
                timer_type: TimerType::SignalTimeout,
                fire_at,
                status: TimerStatus::Pending,
            };
            self.store.create_timer(&timer).await?;
        }

        Err(SuspensionSignal { reason: SuspensionReason::Yield }.into())
    }

    /// Emits an event exactly once for this execution, memoized the same
    /// way as [`step`].
    pub async fn emit(&self, event_id: impl Into<Id>, payload: Value, step_id: Option<&str>) -> Result<(), RunnerError> {
        let event_id = event_id.into();
        let key = step_id.map(str::to_string).unwrap_or_else(|| self.anon_id(EMIT_PREFIX));
        let full_key = format!("{EMIT_PREFIX}{key}");
        if self.store.get_step_result(&self.execution_id, &full_key).await?.is_some() {
            return Ok(());
        }
        let runtime = self.runtime.upgrade().ok_or_else(|| RunnerError::runtime_disposed(&event_id))?;
        runtime.emit_event(&event_id, payload, None).await?;
        self.persist_step(&full_key, &Value::Bool(true)).await?;
        Ok(())
    }

    /// Appends a free-form audit note. Not memoized - notes are a debugging
    /// trail, not a decision replay depends on.
    pub async fn note(&self, message: &str, meta: Option<Value>) -> Result<(), RunnerError> {
        let entry = AuditEntry {
            id: format!("{NOTE_PREFIX}{}", uuid::Uuid::new_v4()),
            execution_id: self.execution_id.clone(),
            attempt: 0,
            at: chrono::Utc::now(),
            kind: "note".to_string(),
            detail: Some(serde_json::json!({"message": message, "meta": meta})),
        };
        self.store.append_audit_entry(&entry).await?;
        Ok(())
    }

    async fn persist_step<T: Serialize>(&self, step_id: &str, value: &T) -> Result<(), RunnerError> {
        let result = StepResult {
            execution_id: self.execution_id.clone(),
            step_id: step_id.to_string(),
            result: serde_json::to_value(value)?,
            completed_at: chrono::Utc::now(),
        };
        self.store.save_step_result(&result).await?;
        Ok(())
    }

    async fn run_with_backoff<T, F, Fut>(&self, step_id: &str, opts: StepOptions, f: F) -> Result<T, RunnerError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, RunnerError>>,
    {
        let attempts = async move {
            let max_attempts = opts.max_attempts.unwrap_or(1).max(1);
            let mut delay = Duration::from_millis(100);
            let mut attempt = 0;
            loop {
                attempt += 1;
                match f().await {
                    Ok(v) => return Ok(v),
                    Err(err) if attempt < max_attempts && err.is_transient() => {
                        tracing::warn!(attempt, error = %err, "durable step failed transiently, retrying");
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    }
                    Err(err) => return Err(err),
                }
            }
        };

        match opts.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, attempts).await {
                Ok(result) => result,
                Err(_) => Err(DurableError::StepTimedOut {
                    execution_id: self.execution_id.clone(),
                    step_id: step_id.to_string(),
                }
                .into()),
            },
            None => attempts.await,
        }
    }
}

tokio::task_local! {
    static CURRENT: Arc<DurableContext>;
}

impl DurableContext {
    /// Runs `f` with `self` installed as the ambient durable context, so a
    /// task body nested arbitrarily deep can reach it via [`current`]
    /// without threading it through every call signature.
    pub async fn scope<F, Fut, T>(self: Arc<Self>, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        CURRENT.scope(self, f()).await
    }
}

/// The durable context for the execution currently running on this task,
/// if the task is running inside [`DurableContext::scope`].
pub fn current() -> Option<Arc<DurableContext>> {
    CURRENT.try_with(Arc::clone).ok()
}

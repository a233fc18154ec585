//! `DurableService`: starts, resumes, signals and schedules durable
//! executions on top of a [`DurableStore`] and the regular task graph.

use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::instrument;

use crate::durable::context::{DurableContext, ImplicitStepIdPolicy};
use crate::durable::store::{DurableError, DurableStore};
use crate::durable::types::{Execution, ExecutionStatus, Schedule, ScheduleStatus, ScheduleType, StepResult};
use crate::error::RunnerError;
use crate::model::deps::TaskInvoker;
use crate::model::id::Id;

#[derive(Debug, Clone)]
pub enum SchedulePattern {
    Cron(String),
    IntervalMs(i64),
}

pub struct DurableService {
    store: Arc<dyn DurableStore>,
    runtime: Weak<dyn TaskInvoker>,
    implicit_policy: ImplicitStepIdPolicy,
}

impl DurableService {
    pub fn new(store: Arc<dyn DurableStore>, runtime: Weak<dyn TaskInvoker>) -> Self {
        Self { store, runtime, implicit_policy: ImplicitStepIdPolicy::Warn }
    }

    #[must_use]
    pub fn with_implicit_step_id_policy(mut self, policy: ImplicitStepIdPolicy) -> Self {
        self.implicit_policy = policy;
        self
    }

    pub fn store(&self) -> &Arc<dyn DurableStore> {
        &self.store
    }

    /// Persists a new pending execution and returns its id; does not run it.
    #[instrument(skip(self, input))]
    pub async fn start_execution(
        &self,
        task_id: impl Into<Id>,
        input: Value,
        max_attempts: u32,
    ) -> Result<String, RunnerError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let execution = Execution::new(id.clone(), task_id.into().to_string(), input, max_attempts, now);
        self.store.save_execution(&execution).await?;
        Ok(id)
    }

    /// Runs (or resumes) an execution to completion, suspension, or
    /// failure. Suspension is not an error: the execution is left in a
    /// `suspended*` status for a timer or signal to resume later.
    #[instrument(skip(self))]
    pub async fn execute(&self, execution_id: &str) -> Result<Value, RunnerError> {
        let mut execution = self
            .store
            .get_execution(execution_id)
            .await?
            .ok_or_else(|| DurableError::ExecutionNotFound(execution_id.to_string()))?;

        execution.status = ExecutionStatus::Running;
        execution.attempt += 1;
        execution.updated_at = Utc::now();
        self.store.update_execution(&execution).await?;

        let ctx = Arc::new(DurableContext::new(
            self.store.clone(),
            self.runtime.clone(),
            execution_id.to_string(),
            self.implicit_policy,
        ));

        let task_id = Id::from(execution.task_id.as_str());
        let input = execution.input.clone();
        let runtime = self.runtime.clone();
        let result = ctx
            .clone()
            .scope(move || async move {
                let runtime = runtime.upgrade().ok_or_else(|| RunnerError::runtime_disposed(&task_id))?;
                runtime.invoke_task(&task_id, input).await
            })
            .await;

        match result {
            Ok(output) => {
                execution.status = ExecutionStatus::Completed;
                execution.error = None;
                execution.updated_at = Utc::now();
                self.store.update_execution(&execution).await?;
                Ok(output)
            }
            Err(RunnerError::Suspended(signal)) => {
                execution.status = match signal.reason {
                    crate::durable::context::SuspensionReason::Sleep => ExecutionStatus::SuspendedSleeping,
                    crate::durable::context::SuspensionReason::Yield => ExecutionStatus::SuspendedAwaitingSignal,
                    crate::durable::context::SuspensionReason::Timeout => ExecutionStatus::SuspendedAwaitingTimeout,
                };
                execution.updated_at = Utc::now();
                self.store.update_execution(&execution).await?;
                Err(RunnerError::Suspended(signal))
            }
            Err(err) => {
                if let Err(rollback_err) = ctx.rollback().await {
                    execution.status = ExecutionStatus::CompensationFailed;
                    execution.error = Some(format!("{err}; rollback also failed: {rollback_err}"));
                } else if execution.attempt >= execution.max_attempts {
                    execution.status = ExecutionStatus::Failed;
                    execution.error = Some(err.to_string());
                } else {
                    execution.status = ExecutionStatus::Pending;
                    execution.error = Some(err.to_string());
                }
                execution.updated_at = Utc::now();
                self.store.update_execution(&execution).await?;
                Err(err)
            }
        }
    }

    /// Polls until the execution reaches a terminal status or `timeout`
    /// elapses.
    pub async fn wait(&self, execution_id: &str, timeout: std::time::Duration) -> Result<Execution, RunnerError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let execution = self
                .store
                .get_execution(execution_id)
                .await?
                .ok_or_else(|| DurableError::ExecutionNotFound(execution_id.to_string()))?;
            if execution.status.is_terminal() {
                return Ok(execution);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(execution);
            }
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
    }

    /// Delivers `payload` to an execution waiting on `key` (the `signal`
    /// name, or the explicit `step_id` a `wait_for_signal` call used).
    /// Acquires a per-`(execution_id, key)` lock so concurrent deliveries
    /// can't double-complete the same wait, then enqueues an immediately-due
    /// timer so a worker polling timers resumes the execution without
    /// waiting on an unrelated tick.
    #[instrument(skip(self, payload))]
    pub async fn signal(&self, execution_id: &str, key: &str, payload: Value) -> Result<(), RunnerError> {
        let lock_name = format!("signal:{execution_id}:{key}");
        if !self.store.acquire_lock(&lock_name).await? {
            return Err(DurableError::SignalLockAcquire(lock_name).into());
        }
        let full_key = format!("__signal:{key}");
        let result = crate::durable::types::StepResult {
            execution_id: execution_id.to_string(),
            step_id: full_key.clone(),
            result: payload,
            completed_at: Utc::now(),
        };
        self.store.save_step_result(&result).await?;

        let timer = crate::durable::types::Timer {
            id: format!("{execution_id}:{full_key}:delivered"),
            execution_id: Some(execution_id.to_string()),
            schedule_id: None,
            step_id: Some(full_key),
            task_id: None,
            input: None,
            timer_type: crate::durable::types::TimerType::SignalDelivered,
            fire_at: Utc::now(),
            status: crate::durable::types::TimerStatus::Pending,
        };
        self.store.create_timer(&timer).await?;

        self.store.release_lock(&lock_name).await?;
        Ok(())
    }

    pub async fn cancel_execution(&self, execution_id: &str) -> Result<(), RunnerError> {
        let mut execution = self
            .store
            .get_execution(execution_id)
            .await?
            .ok_or_else(|| DurableError::ExecutionNotFound(execution_id.to_string()))?;
        execution.status = ExecutionStatus::Cancelled;
        execution.updated_at = Utc::now();
        self.store.update_execution(&execution).await?;
        Ok(())
    }

    /// Idempotently upserts a schedule under `schedule:<id>`: a second call
    /// with the same id and pattern is a no-op.
    #[instrument(skip(self, input))]
    pub async fn ensure_schedule(
        &self,
        id: &str,
        task_id: impl Into<Id>,
        input: Option<Value>,
        pattern: SchedulePattern,
    ) -> Result<(), RunnerError> {
        let lock_name = format!("schedule:{id}");
        if !self.store.acquire_lock(&lock_name).await? {
            return Err(DurableError::SignalLockAcquire(lock_name).into());
        }

        let now = Utc::now();
        let (schedule_type, sched_pattern) = match &pattern {
            SchedulePattern::Cron(expr) => (ScheduleType::Cron, expr.clone()),
            SchedulePattern::IntervalMs(ms) => (ScheduleType::Interval, ms.to_string()),
        };
        let next_run = crate::durable::cron::next_fire(&schedule_type, &sched_pattern, now)?;

        let existing = self.store.get_schedule(id).await?;
        let schedule = Schedule {
            id: id.to_string(),
            task_id: task_id.into().to_string(),
            input,
            pattern: sched_pattern,
            schedule_type,
            status: ScheduleStatus::Active,
            created_at: existing.as_ref().map_or(now, |s| s.created_at),
            updated_at: now,
            last_run: existing.as_ref().and_then(|s| s.last_run),
            next_run: Some(next_run),
        };

        if existing.is_some() {
            self.store.update_schedule(&schedule).await?;
        } else {
            self.store.create_schedule(&schedule).await?;
        }
        self.store.release_lock(&lock_name).await?;
        Ok(())
    }

    /// Forces a stuck execution to a failed status without running
    /// compensation - an operator escape hatch, not part of normal flow.
    pub async fn force_fail(&self, execution_id: &str, reason: &str) -> Result<(), RunnerError> {
        let mut execution = self
            .store
            .get_execution(execution_id)
            .await?
            .ok_or_else(|| DurableError::ExecutionNotFound(execution_id.to_string()))?;
        execution.status = ExecutionStatus::Failed;
        execution.error = Some(reason.to_string());
        execution.updated_at = Utc::now();
        self.store.update_execution(&execution).await?;
        Ok(())
    }

    pub async fn list_stuck_executions(&self, older_than: DateTime<Utc>) -> Result<Vec<Execution>, RunnerError> {
        Ok(self.store.list_stuck_executions(older_than).await?)
    }

    pub async fn list_dead_letters(&self) -> Result<Vec<Execution>, RunnerError> {
        Ok(self.store.list_dead_letters().await?)
    }

    pub async fn requeue_dead_letter(&self, execution_id: &str) -> Result<(), RunnerError> {
        Ok(self.store.requeue_dead_letter(execution_id).await?)
    }

    pub async fn edit_step_result(&self, result: &StepResult) -> Result<(), RunnerError> {
        Ok(self.store.edit_step_result(result).await?)
    }

    pub async fn skip_step(&self, execution_id: &str, step_id: &str, result: Value) -> Result<(), RunnerError> {
        Ok(self.store.skip_step(execution_id, step_id, result).await?)
    }

    pub async fn retry_rollback(&self, execution_id: &str) -> Result<(), RunnerError> {
        Ok(self.store.retry_rollback(execution_id).await?)
    }
}

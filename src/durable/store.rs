//! The durable store port: every operation a `DurableContext`/`DurableService`
//! needs from persistence, independent of backend. One `#[async_trait]` with
//! a narrow `thiserror` enum alongside it.

use async_trait::async_trait;
use thiserror::Error;

use crate::durable::types::{AuditEntry, Execution, Schedule, StepResult, Timer};

#[derive(Debug, Error)]
pub enum DurableError {
    #[error("step id `{0}` was already recorded for this execution")]
    DuplicateStepId(String),

    #[error("could not acquire signal lock for `{0}`")]
    SignalLockAcquire(String),

    #[error("saga compensation failed for execution `{0}`: {1}")]
    CompensationFailed(String, String),

    #[error("signal `{signal}` timed out waiting on execution `{execution_id}`")]
    SignalTimedOut { execution_id: String, signal: String },

    #[error("operator operation `{0}` is not supported by this durable store")]
    OperatorUnsupported(&'static str),

    #[error("step id `{0}` uses a reserved internal prefix")]
    ReservedStepId(String),

    #[error("execution `{0}` not found")]
    ExecutionNotFound(String),

    #[error("schedule `{0}` not found")]
    ScheduleNotFound(String),

    #[error("durable backend error: {0}")]
    Backend(String),

    #[error("invalid schedule pattern `{0}`: {1}")]
    InvalidSchedulePattern(String, String),

    #[error("step `{step_id}` on execution `{execution_id}` exceeded its timeout")]
    StepTimedOut { execution_id: String, step_id: String },
}

impl DurableError {
    /// Lock contention and backend hiccups are worth a retry; everything
    /// else (a duplicate/reserved step id, a failed compensation, an
    /// unsupported operator capability, a step that already exhausted its
    /// own deadline) reflects a mistake that retrying won't fix.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::SignalLockAcquire(_) | Self::Backend(_))
    }
}

impl From<sqlx::Error> for DurableError {
    fn from(err: sqlx::Error) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Everything the durable engine needs from a storage backend. `memory_store`
/// and `sqlite_store` each implement this once.
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn save_execution(&self, execution: &Execution) -> Result<(), DurableError>;
    async fn get_execution(&self, id: &str) -> Result<Option<Execution>, DurableError>;
    async fn update_execution(&self, execution: &Execution) -> Result<(), DurableError>;
    async fn list_incomplete_executions(&self) -> Result<Vec<Execution>, DurableError>;

    async fn get_step_result(&self, execution_id: &str, step_id: &str) -> Result<Option<StepResult>, DurableError>;
    async fn save_step_result(&self, result: &StepResult) -> Result<(), DurableError>;
    async fn list_step_results(&self, execution_id: &str) -> Result<Vec<StepResult>, DurableError>;

    async fn create_timer(&self, timer: &Timer) -> Result<(), DurableError>;
    async fn get_ready_timers(&self, now: chrono::DateTime<chrono::Utc>) -> Result<Vec<Timer>, DurableError>;
    async fn mark_timer_fired(&self, id: &str) -> Result<(), DurableError>;
    async fn delete_timer(&self, id: &str) -> Result<(), DurableError>;

    async fn create_schedule(&self, schedule: &Schedule) -> Result<(), DurableError>;
    async fn get_schedule(&self, id: &str) -> Result<Option<Schedule>, DurableError>;
    async fn update_schedule(&self, schedule: &Schedule) -> Result<(), DurableError>;
    async fn delete_schedule(&self, id: &str) -> Result<(), DurableError>;
    async fn list_schedules(&self) -> Result<Vec<Schedule>, DurableError>;
    async fn list_active_schedules(&self) -> Result<Vec<Schedule>, DurableError>;

    /// Acquires a named lock (signal delivery, idempotent schedule upserts).
    /// Returns `Ok(false)` without blocking if the lock is already held.
    async fn acquire_lock(&self, key: &str) -> Result<bool, DurableError>;
    async fn release_lock(&self, key: &str) -> Result<(), DurableError>;

    async fn append_audit_entry(&self, entry: &AuditEntry) -> Result<(), DurableError>;
    async fn list_audit_entries(&self, execution_id: &str) -> Result<Vec<AuditEntry>, DurableError>;

    /// Operator recovery surface (§11). Backends that can't support one of
    /// these return `DurableError::OperatorUnsupported` rather than panic.
    async fn list_stuck_executions(
        &self,
        older_than: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<Execution>, DurableError> {
        let _ = older_than;
        Err(DurableError::OperatorUnsupported("list_stuck_executions"))
    }

    async fn list_dead_letters(&self) -> Result<Vec<Execution>, DurableError> {
        Err(DurableError::OperatorUnsupported("list_dead_letters"))
    }

    /// Re-queues a dead-lettered execution for another attempt.
    async fn requeue_dead_letter(&self, execution_id: &str) -> Result<(), DurableError> {
        let _ = execution_id;
        Err(DurableError::OperatorUnsupported("requeue_dead_letter"))
    }

    /// Overwrites a persisted step result, e.g. to patch a replay after an
    /// external side effect is confirmed to have actually happened.
    async fn edit_step_result(&self, result: &StepResult) -> Result<(), DurableError> {
        let _ = result;
        Err(DurableError::OperatorUnsupported("edit_step_result"))
    }

    /// Marks a step as complete with an operator-supplied result without
    /// running its body - for skipping a step that can never succeed.
    async fn skip_step(&self, execution_id: &str, step_id: &str, result: serde_json::Value) -> Result<(), DurableError> {
        let _ = (execution_id, step_id, result);
        Err(DurableError::OperatorUnsupported("skip_step"))
    }

    /// Retries saga compensation for an execution whose rollback previously
    /// failed.
    async fn retry_rollback(&self, execution_id: &str) -> Result<(), DurableError> {
        let _ = execution_id;
        Err(DurableError::OperatorUnsupported("retry_rollback"))
    }
}

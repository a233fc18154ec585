//! Persistence-shaped records for the durable execution engine: plain data
//! structs with a status enum stringified at the storage boundary, not a
//! port trait - the port trait lives in `store`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    CompensationFailed,
    Cancelled,
    SuspendedSleeping,
    SuspendedAwaitingSignal,
    SuspendedAwaitingTimeout,
}

impl ExecutionStatus {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::CompensationFailed | Self::Cancelled)
    }

    pub const fn is_suspended(self) -> bool {
        matches!(self, Self::SuspendedSleeping | Self::SuspendedAwaitingSignal | Self::SuspendedAwaitingTimeout)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: String,
    pub task_id: String,
    pub input: Value,
    pub status: ExecutionStatus,
    pub attempt: u32,
    pub max_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub error: Option<String>,
}

impl Execution {
    pub fn new(id: String, task_id: String, input: Value, max_attempts: u32, now: DateTime<Utc>) -> Self {
        Self {
            id,
            task_id,
            input,
            status: ExecutionStatus::Pending,
            attempt: 0,
            max_attempts,
            created_at: now,
            updated_at: now,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub execution_id: String,
    pub step_id: String,
    pub result: Value,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TimerType {
    Sleep,
    SignalTimeout,
    Scheduled,
    SignalDelivered,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TimerStatus {
    Pending,
    Fired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timer {
    pub id: String,
    pub execution_id: Option<String>,
    pub schedule_id: Option<String>,
    pub step_id: Option<String>,
    pub task_id: Option<String>,
    pub input: Option<Value>,
    pub timer_type: TimerType,
    pub fire_at: DateTime<Utc>,
    pub status: TimerStatus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleType {
    Cron,
    Interval,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Active,
    Paused,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub id: String,
    pub task_id: String,
    pub input: Option<Value>,
    pub pattern: String,
    pub schedule_type: ScheduleType,
    pub status: ScheduleStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub execution_id: String,
    pub attempt: u32,
    pub at: DateTime<Utc>,
    pub kind: String,
    pub detail: Option<Value>,
}

//! Durable execution: tasks that resume after a process restart, sleep
//! without holding a thread, wait on external signals, and roll back via
//! saga compensation when a later step fails.
//!
//! A storage port (`store`) behind a sqlite adapter (`sqlite_store`) and an
//! in-memory one (`memory_store`), with a service layer (`service`)
//! orchestrating executions on top and a `worker` driving timers and
//! schedules forward.

pub mod context;
pub mod cron;
pub mod memory_store;
pub mod service;
pub mod sqlite_store;
pub mod store;
pub mod types;
pub mod worker;

pub use context::{
    DurableContext, ImplicitStepIdPolicy, SignalOptions, StepOptions, SuspensionReason, SuspensionSignal,
};
pub use memory_store::InMemoryDurableStore;
pub use service::{DurableService, SchedulePattern};
pub use sqlite_store::SqliteDurableStore;
pub use store::{DurableError, DurableStore};
pub use types::{AuditEntry, Execution, ExecutionStatus, Schedule, ScheduleStatus, ScheduleType, StepResult, Timer, TimerStatus, TimerType};
pub use worker::Worker;

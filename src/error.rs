//! Crate-wide error aggregation.
//!
//! Each subsystem defines its own narrow `thiserror` enum next to the code
//! that raises it (`store::GraphError`, `validation::ValidationError`,
//! `runtime::RuntimeError`, `durable::DurableError`). Internal call sites
//! keep using those narrow types; `RunnerError` exists for the few call
//! sites - the runtime handle's public API chief among them - that must
//! return a single error type to callers who don't care which subsystem
//! failed.

use thiserror::Error;

use crate::async_ctx::AsyncContextError;
use crate::durable::context::SuspensionSignal;
use crate::durable::DurableError;
use crate::model::id::Id;
use crate::runtime::RuntimeError;
use crate::store::GraphError;
use crate::validation::ValidationError;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Durable(#[from] DurableError),

    #[error(transparent)]
    AsyncContext(#[from] AsyncContextError),

    /// Not a failure: a durable task body asking to suspend. The worker
    /// loop matches this variant directly rather than treating it as an
    /// error to report or retry.
    #[error(transparent)]
    Suspended(#[from] SuspensionSignal),

    /// A task's own `run` body returned an error. Opaque to the runner;
    /// surfaced to `on_error` and rethrown unless suppressed.
    #[error("task execution failed: {0}")]
    Task(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("value (de)serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

impl RunnerError {
    pub fn task(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Task(Box::new(err))
    }

    pub fn runtime_disposed(id: &Id) -> Self {
        Self::Runtime(RuntimeError::RuntimeDisposed(id.clone()))
    }

    pub fn missing_dependency(key: &str) -> Self {
        Self::Runtime(RuntimeError::DependencyUnavailable(key.to_string()))
    }

    pub fn dependency_type_mismatch(key: &str) -> Self {
        Self::Runtime(RuntimeError::DependencyTypeMismatch(key.to_string()))
    }

    /// Graph and validation errors fail fast and are never retried; task
    /// and durable errors may be transient depending on their own kind.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Graph(_) | Self::Validation(_) | Self::Json(_) | Self::Suspended(_) => false,
            Self::Runtime(e) => e.is_transient(),
            Self::Durable(e) => e.is_transient(),
            Self::AsyncContext(e) => e.is_transient(),
            Self::Task(_) => true,
        }
    }

    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }
}

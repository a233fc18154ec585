//! Shared fixtures for integration tests: an in-memory durable store and a
//! small recorder resource tests can inspect after a run completes.

use std::sync::{Arc, Mutex};

use serde_json::Value;

use runcore::durable::memory_store::InMemoryDurableStore;
use runcore::durable::service::DurableService;
use runcore::error::RunnerError;
use runcore::model::deps::{BoxFuture, TaskInvoker};
use runcore::model::id::Id;

/// A `Vec<String>` behind a mutex, registered as a resource so task/hook
/// bodies can record what ran and in what order without a channel.
#[derive(Default)]
pub struct Recorder(Mutex<Vec<String>>);

impl Recorder {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().unwrap_or_else(std::sync::PoisonError::into_inner).push(event.into());
    }

    pub fn snapshot(&self) -> Vec<String> {
        self.0.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone()
    }
}

pub fn durable_service(runtime: std::sync::Weak<dyn TaskInvoker>) -> Arc<DurableService> {
    Arc::new(DurableService::new(Arc::new(InMemoryDurableStore::new()), runtime))
}

/// A [`TaskInvoker`] for durable-engine tests that don't need a full node
/// graph: invoking the one task id it was built for runs the given async
/// closure directly, with no event emission.
pub struct SingleTaskInvoker {
    task_id: String,
    f: Box<dyn Fn(Value) -> BoxFuture<'static, Result<Value, RunnerError>> + Send + Sync>,
}

impl SingleTaskInvoker {
    pub fn new<F, Fut>(task_id: impl Into<String>, f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Value, RunnerError>> + Send + 'static,
    {
        Self { task_id: task_id.into(), f: Box::new(move |v| Box::pin(f(v))) }
    }
}

impl TaskInvoker for SingleTaskInvoker {
    fn invoke_task<'a>(&'a self, id: &'a Id, input: Value) -> BoxFuture<'a, Result<Value, RunnerError>> {
        assert_eq!(id.as_str(), self.task_id, "SingleTaskInvoker invoked for an unexpected task id");
        (self.f)(input)
    }

    fn emit_event<'a>(&'a self, _id: &'a Id, _data: Value, _source: Option<Id>) -> BoxFuture<'a, Result<(), RunnerError>> {
        Box::pin(async { Ok(()) })
    }
}

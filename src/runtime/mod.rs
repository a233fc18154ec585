//! Runtime bootstrap and handle: apply overrides, build the graph, init
//! resources, return a handle exposing `run_task`/`emit_event`/
//! `get_resource_value`/`dispose`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::instrument;

use crate::error::RunnerError;
use crate::infrastructure::config::RuntimeConfig;
use crate::model::deps::{BoxFuture, DependencyMap, ResourceCell, TaskInvoker};
use crate::model::id::Id;
use crate::model::resource::{ResourceScratch, ResourceWithConfig};
use crate::runner::{self, TunnelRouter, GLOBAL_TUNNEL_TAG};
use crate::store::Store;
use crate::{events, lifecycle};

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime disposed; `{0}` can no longer be invoked")]
    RuntimeDisposed(Id),

    #[error("dependency `{0}` is not available in this scope")]
    DependencyUnavailable(String),

    #[error("dependency `{0}` was requested with an incompatible type")]
    DependencyTypeMismatch(String),

    #[error("resource `{0}` has not been initialized")]
    ResourceNotInitialized(Id),

    #[error("platform does not support this operation: {0}")]
    PlatformUnsupported(String),

    #[error("one or more resources failed to dispose: {0:?}")]
    DisposalFailed(Vec<String>),
}

impl RuntimeError {
    /// Every variant here is a wiring or lifecycle-state mistake; none are
    /// worth retrying without the caller changing something first.
    pub const fn is_transient(&self) -> bool {
        false
    }
}

struct RuntimeInner {
    self_ref: Weak<RuntimeInner>,
    store: Store,
    resources: RwLock<HashMap<Id, ResourceCell>>,
    scratches: RwLock<HashMap<Id, ResourceScratch>>,
    disposed: AtomicBool,
    config: RuntimeConfig,
}

impl RuntimeInner {
    fn invoker(&self) -> Weak<dyn TaskInvoker> {
        self.self_ref.clone()
    }

    async fn tunnels(&self) -> Vec<Arc<dyn TunnelRouter>> {
        let resources = self.resources.read().await;
        self.store
            .tags_index()
            .nodes_with_tag(GLOBAL_TUNNEL_TAG)
            .iter()
            .filter_map(|id| resources.get(id))
            .filter_map(|cell| cell.clone().downcast::<Arc<dyn TunnelRouter>>().ok())
            .map(|boxed| (*boxed).clone())
            .collect()
    }
}

impl TaskInvoker for RuntimeInner {
    fn invoke_task<'a>(&'a self, id: &'a Id, input: Value) -> BoxFuture<'a, Result<Value, RunnerError>> {
        Box::pin(async move {
            if self.disposed.load(Ordering::SeqCst) {
                return Err(RunnerError::runtime_disposed(id));
            }
            let resources = self.resources.read().await;
            let tunnels = self.tunnels().await;
            runner::run_task(&self.store, &resources, self.invoker(), &tunnels, id, input, None).await
        })
    }

    fn emit_event<'a>(
        &'a self,
        id: &'a Id,
        data: Value,
        source: Option<Id>,
    ) -> BoxFuture<'a, Result<(), RunnerError>> {
        Box::pin(async move {
            if self.disposed.load(Ordering::SeqCst) {
                return Err(RunnerError::runtime_disposed(id));
            }
            let resources = self.resources.read().await;
            events::emit(&self.store, &resources, self.invoker(), id, data, source).await
        })
    }
}

/// Builds a runtime from a root resource, its config, and optional
/// ambient tunables (see `infrastructure::config::RuntimeConfig`).
pub struct RuntimeBuilder {
    root: Option<ResourceWithConfig>,
    config: RuntimeConfig,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self { root: None, config: RuntimeConfig::default() }
    }

    #[must_use]
    pub fn root(mut self, root: ResourceWithConfig) -> Self {
        self.root = Some(root);
        self
    }

    /// Overrides the ambient tunables (default task timeout, durable retry
    /// delays, worker poll interval, namespace prefix, audit on/off).
    /// Defaults to [`RuntimeConfig::default()`] if never called.
    #[must_use]
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Registers the graph, applies overrides, computes the resource
    /// initialization order, and initializes every resource in order.
    #[instrument(skip(self))]
    pub async fn build(self) -> Result<RuntimeHandle, RunnerError> {
        let root = self.root.ok_or_else(|| {
            RunnerError::task(MissingRoot)
        })?;

        let mut store = Store::new();
        store.register_root(root)?;

        let inner = Arc::new_cyclic(|weak| RuntimeInner {
            self_ref: weak.clone(),
            store,
            resources: RwLock::new(HashMap::new()),
            scratches: RwLock::new(HashMap::new()),
            disposed: AtomicBool::new(false),
            config: self.config,
        });

        let (resources, scratches) = lifecycle::initialize_all(&inner.store, inner.invoker()).await?;
        *inner.resources.write().await = resources;
        *inner.scratches.write().await = scratches;

        Ok(RuntimeHandle { inner })
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, thiserror::Error)]
#[error("a runtime must be built with a root resource")]
struct MissingRoot;

/// The live, bootstrapped runtime. Cloning is cheap (an `Arc` bump) and all
/// clones observe the same underlying graph.
#[derive(Clone)]
pub struct RuntimeHandle {
    inner: Arc<RuntimeInner>,
}

impl RuntimeHandle {
    pub async fn run_task<I: Serialize, O: DeserializeOwned>(
        &self,
        task_id: impl Into<Id>,
        input: I,
    ) -> Result<O, RunnerError> {
        let task_id = task_id.into();
        let input = serde_json::to_value(input)?;
        let output = self.run_task_raw(&task_id, input, None).await?;
        Ok(serde_json::from_value(output)?)
    }

    pub async fn run_task_raw(
        &self,
        task_id: &Id,
        input: Value,
        deps_override: Option<DependencyMap>,
    ) -> Result<Value, RunnerError> {
        if self.inner.disposed.load(Ordering::SeqCst) {
            return Err(RunnerError::runtime_disposed(task_id));
        }
        let resources = self.inner.resources.read().await;
        let tunnels = self.inner.tunnels().await;
        runner::run_task(&self.inner.store, &resources, self.inner.invoker(), &tunnels, task_id, input, deps_override)
            .await
    }

    pub async fn emit_event<P: Serialize>(
        &self,
        event_id: impl Into<Id>,
        data: P,
        source: Option<Id>,
    ) -> Result<(), RunnerError> {
        let event_id = event_id.into();
        if self.inner.disposed.load(Ordering::SeqCst) {
            return Err(RunnerError::runtime_disposed(&event_id));
        }
        let data = serde_json::to_value(data)?;
        let resources = self.inner.resources.read().await;
        events::emit(&self.inner.store, &resources, self.inner.invoker(), &event_id, data, source).await
    }

    pub async fn get_resource_value<T: Send + Sync + 'static>(
        &self,
        resource_id: impl Into<Id>,
    ) -> Result<Arc<T>, RunnerError> {
        let resource_id = resource_id.into();
        let resources = self.inner.resources.read().await;
        resources
            .get(&resource_id)
            .cloned()
            .ok_or_else(|| RunnerError::Runtime(RuntimeError::ResourceNotInitialized(resource_id.clone())))?
            .downcast::<T>()
            .map_err(|_| RunnerError::dependency_type_mismatch(resource_id.as_str()))
    }

    pub fn store(&self) -> &Store {
        &self.inner.store
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// Disposes every initialized resource in reverse order. The runtime is
    /// unusable afterward regardless of whether disposal fully succeeded.
    pub async fn dispose(&self) -> Result<(), RunnerError> {
        self.inner.disposed.store(true, Ordering::SeqCst);
        let resources = self.inner.resources.read().await;
        let scratches = self.inner.scratches.read().await;
        lifecycle::dispose_all(&self.inner.store, &resources, &scratches, self.inner.invoker()).await
    }
}

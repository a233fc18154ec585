//! Dependency declarations and resolved dependency handles.
//!
//! A node *declares* dependencies as a [`DependencySpecMap`] (static or a
//! function of config); the resolver turns that declaration into a
//! [`DependencyMap`] of live [`DependencyHandle`]s before the node's
//! `run`/`init` ever executes. Task and event handles hold only a weak
//! reference to the runtime and the target id - invoking them looks the
//! target up in the store on every call, so mutually recursive tasks never
//! require a fixed point at construction time (see design note "Cyclic
//! graphs").

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::RunnerError;
use crate::model::id::Id;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What a node needs looked up in the store to build its [`DependencyMap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyKind {
    Task,
    Resource,
    Event,
}

/// A single declared dependency: a target node id, its kind, and whether
/// a missing target should resolve to an absent handle instead of failing
/// boot (invariant I2).
#[derive(Debug, Clone)]
pub struct DependencyRef {
    pub target: Id,
    pub kind: DependencyKind,
    pub optional: bool,
}

impl DependencyRef {
    pub fn task(target: impl Into<Id>) -> Self {
        Self { target: target.into(), kind: DependencyKind::Task, optional: false }
    }

    pub fn resource(target: impl Into<Id>) -> Self {
        Self { target: target.into(), kind: DependencyKind::Resource, optional: false }
    }

    pub fn event(target: impl Into<Id>) -> Self {
        Self { target: target.into(), kind: DependencyKind::Event, optional: false }
    }

    /// `optional(dep)`: absent targets resolve to `None` instead of a boot error.
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

pub type DependencySpecMap = HashMap<String, DependencyRef>;

/// A node's declared dependencies: a fixed map, or a function evaluated
/// once (for resources: after config validation, before init; for tasks:
/// as a lazy thunk, evaluated once at boot).
#[derive(Clone)]
pub enum DependenciesDecl<C> {
    Static(DependencySpecMap),
    Dynamic(Arc<dyn Fn(&C) -> DependencySpecMap + Send + Sync>),
}

impl<C> Default for DependenciesDecl<C> {
    fn default() -> Self {
        Self::Static(DependencySpecMap::new())
    }
}

impl<C> DependenciesDecl<C> {
    pub fn resolve(&self, config: &C) -> DependencySpecMap {
        match self {
            Self::Static(map) => map.clone(),
            Self::Dynamic(f) => f(config),
        }
    }
}

/// Capability the resolver needs from the runtime to build callable
/// handles without `model` depending on `runtime` directly.
pub trait TaskInvoker: Send + Sync {
    fn invoke_task<'a>(&'a self, id: &'a Id, input: Value) -> BoxFuture<'a, Result<Value, RunnerError>>;
    fn emit_event<'a>(&'a self, id: &'a Id, data: Value, source: Option<Id>) -> BoxFuture<'a, Result<(), RunnerError>>;
}

/// A callable handle to a task, resolved lazily through the owning runtime.
#[derive(Clone)]
pub struct TaskHandle {
    runtime: Weak<dyn TaskInvoker>,
    pub id: Id,
}

impl TaskHandle {
    pub fn new(runtime: Weak<dyn TaskInvoker>, id: Id) -> Self {
        Self { runtime, id }
    }

    pub async fn invoke_raw(&self, input: Value) -> Result<Value, RunnerError> {
        let runtime = self
            .runtime
            .upgrade()
            .ok_or_else(|| RunnerError::runtime_disposed(&self.id))?;
        runtime.invoke_task(&self.id, input).await
    }

    pub async fn invoke<I: Serialize, O: DeserializeOwned>(&self, input: I) -> Result<O, RunnerError> {
        let input = serde_json::to_value(input)?;
        let output = self.invoke_raw(input).await?;
        Ok(serde_json::from_value(output)?)
    }
}

/// A callable handle to an event, resolved lazily through the owning runtime.
#[derive(Clone)]
pub struct EventHandle {
    runtime: Weak<dyn TaskInvoker>,
    pub id: Id,
}

impl EventHandle {
    pub fn new(runtime: Weak<dyn TaskInvoker>, id: Id) -> Self {
        Self { runtime, id }
    }

    pub async fn emit_raw(&self, data: Value, source: Option<Id>) -> Result<(), RunnerError> {
        let runtime = self
            .runtime
            .upgrade()
            .ok_or_else(|| RunnerError::runtime_disposed(&self.id))?;
        runtime.emit_event(&self.id, data, source).await
    }

    pub async fn emit<P: Serialize>(&self, data: P) -> Result<(), RunnerError> {
        self.emit_raw(serde_json::to_value(data)?, None).await
    }
}

/// A resource's initialized value, type-erased until the caller downcasts it.
pub type ResourceCell = Arc<dyn std::any::Any + Send + Sync>;

#[derive(Clone)]
pub enum DependencyHandle {
    Task(TaskHandle),
    Resource(ResourceCell),
    Event(EventHandle),
}

/// The resolved dependency record a node's `run`/`init` observes.
#[derive(Clone, Default)]
pub struct DependencyMap(HashMap<String, DependencyHandle>);

impl DependencyMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, handle: DependencyHandle) {
        self.0.insert(key.into(), handle);
    }

    pub fn get(&self, key: &str) -> Option<&DependencyHandle> {
        self.0.get(key)
    }

    pub fn task(&self, key: &str) -> Result<&TaskHandle, RunnerError> {
        match self.0.get(key) {
            Some(DependencyHandle::Task(h)) => Ok(h),
            _ => Err(RunnerError::missing_dependency(key)),
        }
    }

    pub fn optional_task(&self, key: &str) -> Option<&TaskHandle> {
        match self.0.get(key) {
            Some(DependencyHandle::Task(h)) => Some(h),
            _ => None,
        }
    }

    pub fn event(&self, key: &str) -> Result<&EventHandle, RunnerError> {
        match self.0.get(key) {
            Some(DependencyHandle::Event(h)) => Ok(h),
            _ => Err(RunnerError::missing_dependency(key)),
        }
    }

    pub fn resource<T: Send + Sync + 'static>(&self, key: &str) -> Result<Arc<T>, RunnerError> {
        match self.0.get(key) {
            Some(DependencyHandle::Resource(cell)) => cell
                .clone()
                .downcast::<T>()
                .map_err(|_| RunnerError::dependency_type_mismatch(key)),
            _ => Err(RunnerError::missing_dependency(key)),
        }
    }

    pub fn optional_resource<T: Send + Sync + 'static>(&self, key: &str) -> Option<Arc<T>> {
        match self.0.get(key) {
            Some(DependencyHandle::Resource(cell)) => cell.clone().downcast::<T>().ok(),
            _ => None,
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

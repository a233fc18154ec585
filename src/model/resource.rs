//! Resource node: an initialized, disposable, configured singleton.

use std::any::Any;
use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::RunnerError;
use crate::model::deps::{BoxFuture, DependenciesDecl, DependencyMap, ResourceCell};
use crate::model::event::EventDefinition;
use crate::model::hook::HookDefinition;
use crate::model::id::Id;
use crate::model::middleware::{AttachedMiddleware, MiddlewareDefinition};
use crate::model::node::{NodeInfo, NodeKind, TagAttachment};
use crate::model::overrides::OverrideDecl;
use crate::model::tag::TagDefinition;
use crate::model::task::TaskDefinition;
use crate::validation::Validator;

/// Per-resource scratch value produced once by `context()` and threaded
/// through `init` and `dispose`.
pub type ResourceScratch = Arc<dyn Any + Send + Sync>;

pub type ResourceInitFn =
    Arc<dyn Fn(Value, DependencyMap, ResourceScratch) -> BoxFuture<'static, Result<ResourceCell, RunnerError>> + Send + Sync>;
pub type ResourceDisposeFn =
    Arc<dyn Fn(ResourceCell, Value, DependencyMap, ResourceScratch) -> BoxFuture<'static, Result<(), RunnerError>> + Send + Sync>;
type ResourceContextFn = Arc<dyn Fn() -> ResourceScratch + Send + Sync>;

/// Any node kind, or a resource pre-bound to a config, that can appear in a
/// resource's `register` list.
#[derive(Clone)]
pub enum Registerable {
    Task(Arc<TaskDefinition>),
    Resource(ResourceWithConfig),
    Event(Arc<EventDefinition>),
    Hook(Arc<HookDefinition>),
    Middleware(Arc<MiddlewareDefinition>),
    Tag(Arc<TagDefinition>),
    Override(Arc<OverrideDecl>),
}

/// `register` as either a fixed list or a function of the owning
/// resource's bound config, evaluated once before that resource's own
/// dependencies are resolved (enables per-instance fanout).
#[derive(Clone)]
pub enum RegisterDecl {
    Static(Vec<Registerable>),
    Dynamic(Arc<dyn Fn(&Value) -> Vec<Registerable> + Send + Sync>),
}

impl Default for RegisterDecl {
    fn default() -> Self {
        Self::Static(Vec::new())
    }
}

impl RegisterDecl {
    pub fn resolve(&self, config: &Value) -> Vec<Registerable> {
        match self {
            Self::Static(items) => items.clone(),
            Self::Dynamic(f) => f(config),
        }
    }
}

pub struct ResourceDefinition {
    pub id: Id,
    pub file_path: Option<String>,
    pub meta: Option<Value>,
    pub tags: Vec<TagAttachment>,
    pub dependencies: DependenciesDecl<Value>,
    pub register: RegisterDecl,
    pub middleware: Vec<AttachedMiddleware>,
    pub config_schema: Option<Arc<dyn Validator>>,
    pub result_schema: Option<Arc<dyn Validator>>,
    context: Option<ResourceContextFn>,
    init: ResourceInitFn,
    dispose: Option<ResourceDisposeFn>,
}

impl NodeInfo for ResourceDefinition {
    fn id(&self) -> &Id {
        &self.id
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Resource
    }

    fn file_path(&self) -> Option<&str> {
        self.file_path.as_deref()
    }

    fn tags(&self) -> &[TagAttachment] {
        &self.tags
    }

    fn meta(&self) -> Option<&Value> {
        self.meta.as_ref()
    }
}

impl ResourceDefinition {
    pub fn scratch(&self) -> ResourceScratch {
        match &self.context {
            Some(f) => f(),
            None => Arc::new(()),
        }
    }

    pub async fn init(
        &self,
        config: Value,
        deps: DependencyMap,
        scratch: ResourceScratch,
    ) -> Result<ResourceCell, RunnerError> {
        (self.init)(config, deps, scratch).await
    }

    pub async fn dispose(
        &self,
        value: ResourceCell,
        config: Value,
        deps: DependencyMap,
        scratch: ResourceScratch,
    ) -> Result<(), RunnerError> {
        match &self.dispose {
            Some(d) => d(value, config, deps, scratch).await,
            None => Ok(()),
        }
    }

    pub fn has_dispose(&self) -> bool {
        self.dispose.is_some()
    }

    /// `resource.with(cfg)`: binds a config, producing a `Registerable`.
    pub fn with<C: Serialize>(self: &Arc<Self>, config: C) -> Result<ResourceWithConfig, RunnerError> {
        Ok(ResourceWithConfig { resource: self.clone(), config: serde_json::to_value(config)? })
    }

    /// Applies an override against this resource, mirroring
    /// `TaskDefinition::with_override`.
    pub(crate) fn with_override(self: &Arc<Self>, o: &crate::model::overrides::ResourceOverride) -> Arc<ResourceDefinition> {
        let mut tags = self.tags.clone();
        tags.extend(o.extra_tags.clone());
        let mut middleware = self.middleware.clone();
        middleware.extend(o.extra_middleware.clone());
        let dependencies = match o.extra_dependencies.clone() {
            None => self.dependencies.clone(),
            Some(extra) => {
                let base = self.dependencies.clone();
                DependenciesDecl::Dynamic(Arc::new(move |c: &Value| {
                    let mut merged = base.resolve(c);
                    merged.extend(extra.clone());
                    merged
                }))
            }
        };
        Arc::new(ResourceDefinition {
            id: self.id.clone(),
            file_path: self.file_path.clone(),
            meta: o.meta.clone().or_else(|| self.meta.clone()),
            tags,
            dependencies,
            register: self.register.clone(),
            middleware,
            config_schema: self.config_schema.clone(),
            result_schema: self.result_schema.clone(),
            context: self.context.clone(),
            init: o.init.clone().unwrap_or_else(|| self.init.clone()),
            dispose: o.dispose.clone().or_else(|| self.dispose.clone()),
        })
    }
}

/// A resource paired with a bound config, attachable to another resource's
/// `register` list.
#[derive(Clone)]
pub struct ResourceWithConfig {
    pub resource: Arc<ResourceDefinition>,
    pub config: Value,
}

pub struct ResourceBuilder {
    id: Id,
    file_path: Option<String>,
    meta: Option<Value>,
    tags: Vec<TagAttachment>,
    dependencies: DependenciesDecl<Value>,
    register: RegisterDecl,
    middleware: Vec<AttachedMiddleware>,
    config_schema: Option<Arc<dyn Validator>>,
    result_schema: Option<Arc<dyn Validator>>,
    context: Option<ResourceContextFn>,
    init: Option<ResourceInitFn>,
    dispose: Option<ResourceDisposeFn>,
}

impl ResourceBuilder {
    pub fn new(id: impl Into<Id>) -> Self {
        Self {
            id: id.into(),
            file_path: None,
            meta: None,
            tags: Vec::new(),
            dependencies: DependenciesDecl::default(),
            register: RegisterDecl::default(),
            middleware: Vec::new(),
            config_schema: None,
            result_schema: None,
            context: None,
            init: None,
            dispose: None,
        }
    }

    #[must_use]
    pub fn dependencies(mut self, deps: DependenciesDecl<Value>) -> Self {
        self.dependencies = deps;
        self
    }

    #[must_use]
    pub fn register(mut self, register: RegisterDecl) -> Self {
        self.register = register;
        self
    }

    #[must_use]
    pub fn middleware(mut self, mw: AttachedMiddleware) -> Self {
        self.middleware.push(mw);
        self
    }

    #[must_use]
    pub fn config_schema(mut self, schema: Arc<dyn Validator>) -> Self {
        self.config_schema = Some(schema);
        self
    }

    #[must_use]
    pub fn result_schema(mut self, schema: Arc<dyn Validator>) -> Self {
        self.result_schema = Some(schema);
        self
    }

    #[must_use]
    pub fn context<T: Send + Sync + 'static>(mut self, f: impl Fn() -> T + Send + Sync + 'static) -> Self {
        self.context = Some(Arc::new(move || Arc::new(f()) as ResourceScratch));
        self
    }

    #[must_use]
    pub fn tag(mut self, tag: TagAttachment) -> Self {
        self.tags.push(tag);
        self
    }

    #[must_use]
    pub fn meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Sets `init`. `C` is the config type, `V` the resource's resulting
    /// value type (stored type-erased, downcast by dependents via
    /// `DependencyMap::resource`).
    #[must_use]
    pub fn init<C, V, S, F, Fut>(mut self, f: F) -> Self
    where
        C: DeserializeOwned + Send + 'static,
        V: Send + Sync + 'static,
        S: Send + Sync + 'static,
        F: Fn(C, DependencyMap, Arc<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, RunnerError>> + Send + 'static,
    {
        let f = Arc::new(f);
        self.init = Some(Arc::new(move |config: Value, deps: DependencyMap, scratch: ResourceScratch| {
            let f = f.clone();
            Box::pin(async move {
                let config: C = serde_json::from_value(config)?;
                let scratch = scratch
                    .downcast::<S>()
                    .map_err(|_| RunnerError::task(ScratchTypeMismatch))?;
                let value = f(config, deps, scratch).await?;
                Ok(Arc::new(value) as ResourceCell)
            })
        }));
        self
    }

    #[must_use]
    pub fn dispose<C, V, S, F, Fut>(mut self, f: F) -> Self
    where
        C: DeserializeOwned + Send + 'static,
        V: Send + Sync + 'static,
        S: Send + Sync + 'static,
        F: Fn(Arc<V>, C, DependencyMap, Arc<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), RunnerError>> + Send + 'static,
    {
        let f = Arc::new(f);
        self.dispose = Some(Arc::new(move |value: ResourceCell, config: Value, deps: DependencyMap, scratch: ResourceScratch| {
            let f = f.clone();
            Box::pin(async move {
                let config: C = serde_json::from_value(config)?;
                let value = value
                    .downcast::<V>()
                    .map_err(|_| RunnerError::task(ScratchTypeMismatch))?;
                let scratch = scratch
                    .downcast::<S>()
                    .map_err(|_| RunnerError::task(ScratchTypeMismatch))?;
                f(value, config, deps, scratch).await
            })
        }));
        self
    }

    pub fn build(self) -> Result<Arc<ResourceDefinition>, RunnerError> {
        let init = self
            .init
            .ok_or_else(|| RunnerError::task(InvalidResource(format!("resource `{}` has no init body", self.id))))?;
        Ok(Arc::new(ResourceDefinition {
            id: self.id,
            file_path: self.file_path,
            meta: self.meta,
            tags: self.tags,
            dependencies: self.dependencies,
            register: self.register,
            middleware: self.middleware,
            config_schema: self.config_schema,
            result_schema: self.result_schema,
            context: self.context,
            init,
            dispose: self.dispose,
        }))
    }
}

#[derive(Debug, thiserror::Error)]
#[error("resource scratch or value downcast failed")]
struct ScratchTypeMismatch;

#[derive(Debug, thiserror::Error)]
#[error("invalid resource: {0}")]
struct InvalidResource(String);

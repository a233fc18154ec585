//! Middleware node: the interceptor brand wrapped around tasks and resources.

use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::RunnerError;
use crate::model::deps::{BoxFuture, DependenciesDecl, DependencyMap};
use crate::model::id::Id;
use crate::model::node::{NodeInfo, NodeKind, TagAttachment};
use crate::validation::Validator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MiddlewareKind {
    Task,
    Resource,
}

/// The continuation a middleware calls to proceed down the chain. Calling
/// it with a substituted value changes what downstream middleware (and
/// ultimately the terminal `run`/`init`) observes.
pub type NextFn = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value, RunnerError>> + Send + Sync>;

/// What a middleware's `run` body sees.
pub struct MiddlewareArgs {
    pub next: NextFn,
    pub target_id: Id,
    /// The task input, or the resource config, depending on `kind`.
    pub value: Value,
}

type MiddlewareRunFn =
    Arc<dyn Fn(MiddlewareArgs, DependencyMap, Option<Value>) -> BoxFuture<'static, Result<Value, RunnerError>> + Send + Sync>;

/// Selects automatic attachment of a middleware to every task or resource
/// (`everywhere`), optionally filtered by a predicate over the target node.
#[derive(Clone)]
pub enum Everywhere {
    Off,
    All,
    Filter(Arc<dyn Fn(&dyn NodeInfo) -> bool + Send + Sync>),
}

impl Default for Everywhere {
    fn default() -> Self {
        Self::Off
    }
}

impl Everywhere {
    pub fn applies_to(&self, target: &dyn NodeInfo) -> bool {
        match self {
            Self::Off => false,
            Self::All => true,
            Self::Filter(f) => f(target),
        }
    }
}

pub struct MiddlewareDefinition {
    pub id: Id,
    pub kind: MiddlewareKind,
    pub file_path: Option<String>,
    pub meta: Option<Value>,
    pub tags: Vec<TagAttachment>,
    pub dependencies: DependenciesDecl<Value>,
    pub config_schema: Option<Arc<dyn Validator>>,
    pub everywhere: Everywhere,
    run: MiddlewareRunFn,
}

impl NodeInfo for MiddlewareDefinition {
    fn id(&self) -> &Id {
        &self.id
    }

    fn kind(&self) -> NodeKind {
        match self.kind {
            MiddlewareKind::Task => NodeKind::TaskMiddleware,
            MiddlewareKind::Resource => NodeKind::ResourceMiddleware,
        }
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

impl MiddlewareDefinition {
    pub async fn run(
        &self,
        args: MiddlewareArgs,
        deps: DependencyMap,
        config: Option<Value>,
    ) -> Result<Value, RunnerError> {
        (self.run)(args, deps, config).await
    }

    /// Attaches this middleware to a task/resource with bound configuration.
    pub fn with(self: &Arc<Self>, config: Value) -> AttachedMiddleware {
        AttachedMiddleware { middleware_id: self.id.clone(), config: Some(config) }
    }

    /// Attaches this middleware with no configuration.
    pub fn attach(self: &Arc<Self>) -> AttachedMiddleware {
        AttachedMiddleware { middleware_id: self.id.clone(), config: None }
    }
}

/// A middleware id bound to a target (task/resource), with the config that
/// attachment carried, if any.
#[derive(Debug, Clone)]
pub struct AttachedMiddleware {
    pub middleware_id: Id,
    pub config: Option<Value>,
}

impl From<&Arc<MiddlewareDefinition>> for AttachedMiddleware {
    fn from(mw: &Arc<MiddlewareDefinition>) -> Self {
        mw.attach()
    }
}

pub struct MiddlewareBuilder {
    id: Id,
    kind: MiddlewareKind,
    file_path: Option<String>,
    meta: Option<Value>,
    tags: Vec<TagAttachment>,
    dependencies: DependenciesDecl<Value>,
    config_schema: Option<Arc<dyn Validator>>,
    everywhere: Everywhere,
    run: Option<MiddlewareRunFn>,
}

impl MiddlewareBuilder {
    pub fn new(id: impl Into<Id>, kind: MiddlewareKind) -> Self {
        Self {
            id: id.into(),
            kind,
            file_path: None,
            meta: None,
            tags: Vec::new(),
            dependencies: DependenciesDecl::default(),
            config_schema: None,
            everywhere: Everywhere::Off,
            run: None,
        }
    }

    #[must_use]
    pub fn dependencies(mut self, deps: DependenciesDecl<Value>) -> Self {
        self.dependencies = deps;
        self
    }

    #[must_use]
    pub fn config_schema(mut self, schema: Arc<dyn Validator>) -> Self {
        self.config_schema = Some(schema);
        self
    }

    #[must_use]
    pub fn everywhere(mut self, everywhere: Everywhere) -> Self {
        self.everywhere = everywhere;
        self
    }

    #[must_use]
    pub fn tag(mut self, tag: TagAttachment) -> Self {
        self.tags.push(tag);
        self
    }

    /// Sets the middleware body. `C` is the bound config type; pass `()` for
    /// unconfigured middleware.
    #[must_use]
    pub fn run<C, F, Fut>(mut self, f: F) -> Self
    where
        C: DeserializeOwned + Send + 'static,
        F: Fn(MiddlewareArgs, DependencyMap, C) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, RunnerError>> + Send + 'static,
    {
        let f = Arc::new(f);
        self.run = Some(Arc::new(move |args, deps, config| {
            let f = f.clone();
            Box::pin(async move {
                let config: C = match config {
                    Some(v) => serde_json::from_value(v)?,
                    None => serde_json::from_value(Value::Null)?,
                };
                f(args, deps, config).await
            })
        }));
        self
    }

    pub fn build(self) -> Result<Arc<MiddlewareDefinition>, RunnerError> {
        let run = self.run.ok_or_else(|| {
            RunnerError::task(InvalidMiddleware(format!("middleware `{}` has no run body", self.id)))
        })?;
        Ok(Arc::new(MiddlewareDefinition {
            id: self.id,
            kind: self.kind,
            file_path: self.file_path,
            meta: self.meta,
            tags: self.tags,
            dependencies: self.dependencies,
            config_schema: self.config_schema,
            everywhere: self.everywhere,
            run,
        }))
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid middleware: {0}")]
struct InvalidMiddleware(String);

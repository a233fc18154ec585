//! Hook node: a listener attached to one or more events (or every event).

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;

use crate::error::RunnerError;
use crate::model::deps::{BoxFuture, DependenciesDecl, DependencyMap};
use crate::model::event::Emission;
use crate::model::id::Id;
use crate::model::node::{NodeInfo, NodeKind, TagAttachment};

/// What a hook listens to.
#[derive(Debug, Clone)]
pub enum HookTarget {
    Events(Vec<Id>),
    /// Listens to every event registered in the store (`"*"` in the
    /// original vocabulary).
    Wildcard,
}

type HookRunFn = Arc<dyn Fn(Emission, DependencyMap) -> BoxFuture<'static, Result<(), RunnerError>> + Send + Sync>;

pub struct HookDefinition {
    pub id: Id,
    pub file_path: Option<String>,
    pub meta: Option<Value>,
    pub tags: Vec<TagAttachment>,
    pub target: HookTarget,
    pub dependencies: DependenciesDecl<()>,
    /// Lower runs first; ties broken by registration order. Defaults to 0.
    pub order: i32,
    run: HookRunFn,
}

impl NodeInfo for HookDefinition {
    fn id(&self) -> &Id {
        &self.id
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Hook
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

impl HookDefinition {
    pub fn listens_to(&self, event_id: &Id) -> bool {
        match &self.target {
            HookTarget::Wildcard => true,
            HookTarget::Events(ids) => ids.iter().any(|id| id == event_id),
        }
    }

    pub async fn run(&self, emission: Emission, deps: DependencyMap) -> Result<(), RunnerError> {
        (self.run)(emission, deps).await
    }
}

pub struct HookBuilder {
    id: Id,
    file_path: Option<String>,
    meta: Option<Value>,
    tags: Vec<TagAttachment>,
    target: HookTarget,
    dependencies: DependenciesDecl<()>,
    order: i32,
    run: Option<HookRunFn>,
}

impl HookBuilder {
    pub fn new(id: impl Into<Id>, target: HookTarget) -> Self {
        Self {
            id: id.into(),
            file_path: None,
            meta: None,
            tags: Vec::new(),
            target,
            dependencies: DependenciesDecl::default(),
            order: 0,
            run: None,
        }
    }

    #[must_use]
    pub fn dependencies(mut self, deps: DependenciesDecl<()>) -> Self {
        self.dependencies = deps;
        self
    }

    #[must_use]
    pub fn order(mut self, order: i32) -> Self {
        self.order = order;
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

    #[must_use]
    pub fn run<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Emission, DependencyMap) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), RunnerError>> + Send + 'static,
    {
        self.run = Some(Arc::new(move |emission, deps| Box::pin(f(emission, deps))));
        self
    }

    pub fn build(self) -> Result<Arc<HookDefinition>, RunnerError> {
        let run = self
            .run
            .ok_or_else(|| RunnerError::task(InvalidHook(format!("hook `{}` has no run body", self.id))))?;
        Ok(Arc::new(HookDefinition {
            id: self.id,
            file_path: self.file_path,
            meta: self.meta,
            tags: self.tags,
            target: self.target,
            dependencies: self.dependencies,
            order: self.order,
            run,
        }))
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid hook: {0}")]
struct InvalidHook(String);

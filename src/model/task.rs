//! Task node: a callable, dependency-injected, middleware-wrapped unit of work.

use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::RunnerError;
use crate::model::deps::{BoxFuture, DependenciesDecl, DependencyMap};
use crate::model::id::Id;
use crate::model::middleware::AttachedMiddleware;
use crate::model::node::{NodeInfo, NodeKind, TagAttachment};
use crate::model::overrides::TaskOverride;
use crate::validation::Validator;

pub type TaskRunFn =
    Arc<dyn Fn(Value, DependencyMap) -> BoxFuture<'static, Result<Value, RunnerError>> + Send + Sync>;

/// The three lifecycle events every task automatically carries, emitted by
/// the task runner around `run` (see `runner::TaskRunner`).
pub struct TaskEvents {
    pub before_run: Id,
    pub after_run: Id,
    pub on_error: Id,
}

impl TaskEvents {
    fn for_task(task_id: &Id) -> Self {
        Self {
            before_run: task_id.namespaced("beforeRun"),
            after_run: task_id.namespaced("afterRun"),
            on_error: task_id.namespaced("onError"),
        }
    }
}

pub struct TaskDefinition {
    pub id: Id,
    pub file_path: Option<String>,
    pub meta: Option<Value>,
    pub tags: Vec<TagAttachment>,
    pub dependencies: DependenciesDecl<()>,
    pub middleware: Vec<AttachedMiddleware>,
    pub input_schema: Option<Arc<dyn Validator>>,
    pub result_schema: Option<Arc<dyn Validator>>,
    pub throws: Vec<Id>,
    pub events: TaskEvents,
    /// `None` for a phantom task: a type contract awaiting an override to
    /// supply the real body.
    run: Option<TaskRunFn>,
    pub is_phantom: bool,
}

impl NodeInfo for TaskDefinition {
    fn id(&self) -> &Id {
        &self.id
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Task
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

impl TaskDefinition {
    pub async fn run(&self, input: Value, deps: DependencyMap) -> Result<Value, RunnerError> {
        match &self.run {
            Some(run) => run(input, deps).await,
            None => Err(RunnerError::task(PhantomTaskNotOverridden(self.id.clone()))),
        }
    }

    /// Applies an override against this task, producing the definition the
    /// store keeps in place of the original. Fields the override left unset
    /// fall back to this definition's own.
    pub(crate) fn with_override(self: &Arc<Self>, o: &TaskOverride) -> Arc<TaskDefinition> {
        let mut tags = self.tags.clone();
        tags.extend(o.extra_tags.clone());
        let mut middleware = self.middleware.clone();
        middleware.extend(o.extra_middleware.clone());
        let dependencies = match o.extra_dependencies.clone() {
            None => self.dependencies.clone(),
            Some(extra) => {
                let base = self.dependencies.clone();
                DependenciesDecl::Dynamic(Arc::new(move |_: &()| {
                    let mut merged = base.resolve(&());
                    merged.extend(extra.clone());
                    merged
                }))
            }
        };
        let run = o.run.clone().or_else(|| self.run.clone());
        Arc::new(TaskDefinition {
            events: TaskEvents::for_task(&self.id),
            id: self.id.clone(),
            file_path: self.file_path.clone(),
            meta: o.meta.clone().or_else(|| self.meta.clone()),
            tags,
            dependencies,
            middleware,
            input_schema: self.input_schema.clone(),
            result_schema: self.result_schema.clone(),
            throws: self.throws.clone(),
            is_phantom: run.is_none(),
            run,
        })
    }
}

#[derive(Debug, thiserror::Error)]
#[error("phantom task `{0}` was never overridden with a run body")]
pub struct PhantomTaskNotOverridden(Id);

pub struct TaskBuilder {
    id: Id,
    file_path: Option<String>,
    meta: Option<Value>,
    tags: Vec<TagAttachment>,
    dependencies: DependenciesDecl<()>,
    middleware: Vec<AttachedMiddleware>,
    input_schema: Option<Arc<dyn Validator>>,
    result_schema: Option<Arc<dyn Validator>>,
    throws: Vec<Id>,
    run: Option<TaskRunFn>,
}

impl TaskBuilder {
    pub fn new(id: impl Into<Id>) -> Self {
        Self {
            id: id.into(),
            file_path: None,
            meta: None,
            tags: Vec::new(),
            dependencies: DependenciesDecl::default(),
            middleware: Vec::new(),
            input_schema: None,
            result_schema: None,
            throws: Vec::new(),
            run: None,
        }
    }

    #[must_use]
    pub fn dependencies(mut self, deps: DependenciesDecl<()>) -> Self {
        self.dependencies = deps;
        self
    }

    #[must_use]
    pub fn middleware(mut self, mw: AttachedMiddleware) -> Self {
        self.middleware.push(mw);
        self
    }

    #[must_use]
    pub fn input_schema(mut self, schema: Arc<dyn Validator>) -> Self {
        self.input_schema = Some(schema);
        self
    }

    #[must_use]
    pub fn result_schema(mut self, schema: Arc<dyn Validator>) -> Self {
        self.result_schema = Some(schema);
        self
    }

    #[must_use]
    pub fn tag(mut self, tag: TagAttachment) -> Self {
        self.tags.push(tag);
        self
    }

    #[must_use]
    pub fn throws(mut self, error_tag: impl Into<Id>) -> Self {
        self.throws.push(error_tag.into());
        self
    }

    #[must_use]
    pub fn meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }

    #[must_use]
    pub fn file_path(mut self, path: impl Into<String>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    /// Sets the task body. `I`/`O` are the statically-typed input/output;
    /// they're serialized to/from the dynamic `Value` the store carries so
    /// heterogeneous tasks share one registry.
    #[must_use]
    pub fn run<I, O, F, Fut>(mut self, f: F) -> Self
    where
        I: DeserializeOwned + Send + 'static,
        O: Serialize + Send + 'static,
        F: Fn(I, DependencyMap) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, RunnerError>> + Send + 'static,
    {
        let f = Arc::new(f);
        self.run = Some(Arc::new(move |input: Value, deps: DependencyMap| {
            let f = f.clone();
            Box::pin(async move {
                let input: I = serde_json::from_value(input)?;
                let output = f(input, deps).await?;
                Ok(serde_json::to_value(output)?)
            })
        }));
        self
    }

    pub fn build(self) -> Result<Arc<TaskDefinition>, RunnerError> {
        let is_phantom = self.run.is_none();
        Ok(Arc::new(TaskDefinition {
            events: TaskEvents::for_task(&self.id),
            id: self.id,
            file_path: self.file_path,
            meta: self.meta,
            tags: self.tags,
            dependencies: self.dependencies,
            middleware: self.middleware,
            input_schema: self.input_schema,
            result_schema: self.result_schema,
            throws: self.throws,
            run: self.run,
            is_phantom,
        }))
    }

    /// Builds a phantom task: a type contract with no body, expecting an
    /// override to supply `run` before it is ever called.
    pub fn build_phantom(self) -> Result<Arc<TaskDefinition>, RunnerError> {
        self.build()
    }
}

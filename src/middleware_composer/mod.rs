//! Builds the `next`-chained middleware pipeline around a task's `run` or a
//! resource's `init`.
//!
//! Composition is a right fold: the terminal (the task body, or the next
//! resource's init) is wrapped by the last middleware in the chain first, so
//! that invoking the fully-composed chain executes the *first* attached
//! middleware outermost - it sees the raw input/config and calls `next` to
//! reach everything after it, exactly like a conventional HTTP middleware
//! stack.

use std::sync::Arc;

use serde_json::Value;

use std::collections::HashMap;

use crate::error::RunnerError;
use crate::model::deps::{DependencyMap, ResourceCell};
use crate::model::id::Id;
use crate::model::middleware::{AttachedMiddleware, MiddlewareArgs, MiddlewareDefinition, MiddlewareKind, NextFn};
use crate::model::node::NodeInfo;
use crate::resolver::DependencyResolver;
use crate::store::{GraphError, NodeEntry, Store};

/// One link in the chain: the middleware definition, its bound config (if
/// `with(cfg)` was used), and its own resolved dependencies.
pub struct ComposedMiddleware {
    pub middleware: Arc<MiddlewareDefinition>,
    pub config: Option<Value>,
    pub deps: DependencyMap,
}

/// Folds `chain` around `terminal`, returning a single callable that runs
/// the whole pipeline for `target_id`.
pub fn compose(chain: Vec<ComposedMiddleware>, target_id: Id, terminal: NextFn) -> NextFn {
    chain.into_iter().rev().fold(terminal, |next, link| {
        let ComposedMiddleware { middleware, config, deps } = link;
        let target_id = target_id.clone();
        Arc::new(move |value: Value| {
            let middleware = middleware.clone();
            let config = config.clone();
            let deps = deps.clone();
            let next = next.clone();
            let target_id = target_id.clone();
            Box::pin(async move {
                let args = MiddlewareArgs { next, target_id, value };
                middleware.run(args, deps, config).await
            })
        })
    })
}

/// Wraps a plain async terminal function (a task's `run`, or a resource's
/// `init`) as a `NextFn`, the shape `compose` expects as its innermost link.
pub fn terminal<F, Fut>(f: F) -> NextFn
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<Value, RunnerError>> + Send + 'static,
{
    Arc::new(move |value| Box::pin(f(value)))
}

/// A chain's middleware never returns a transformed value at all.
pub fn identity_terminal() -> NextFn {
    terminal(|value| async move { Ok(value) })
}

/// This node's explicitly attached middleware plus every registered
/// `everywhere`-matching middleware of the right kind, explicit attachments
/// first and de-duplicated by id.
pub fn gather_middleware(
    store: &Store,
    own: &[AttachedMiddleware],
    node: &dyn NodeInfo,
    kind: MiddlewareKind,
) -> Vec<AttachedMiddleware> {
    let mut attached = own.to_vec();
    for (_, entry) in store.iter() {
        let Some(mw) = entry.as_middleware() else { continue };
        if mw.kind != kind {
            continue;
        }
        if attached.iter().any(|a| a.middleware_id == mw.id) {
            continue;
        }
        if mw.everywhere.applies_to(node) {
            attached.push(mw.attach());
        }
    }
    attached
}

/// Resolves each attached middleware's own dependencies, producing the
/// chain links `compose` expects.
pub fn resolve_links(
    store: &Store,
    resolver: &DependencyResolver<'_>,
    resources: &HashMap<Id, ResourceCell>,
    attached: &[AttachedMiddleware],
) -> Result<Vec<ComposedMiddleware>, RunnerError> {
    attached
        .iter()
        .map(|am| {
            let mw = store
                .get(am.middleware_id.as_str())
                .and_then(NodeEntry::as_middleware)
                .ok_or_else(|| GraphError::UnknownNode(am.middleware_id.clone()))?
                .clone();
            let spec = mw.dependencies.resolve(&am.config.clone().unwrap_or(Value::Null));
            let deps = resolver.resolve(&am.middleware_id, &spec, resources)?;
            Ok(ComposedMiddleware { middleware: mw, config: am.config.clone(), deps })
        })
        .collect()
}

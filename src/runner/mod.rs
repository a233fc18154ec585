//! Task runner: the eight-step `run_task` pipeline (§4.4 in spirit) -
//! locate, validate input, `before_run`, middleware chain, the task body,
//! validate result, `after_run`, return - with `on_error` on any failure.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use serde_json::Value;
use tracing::instrument;

use crate::error::RunnerError;
use crate::events;
use crate::middleware_composer::{self, ComposedMiddleware};
use crate::model::deps::{DependencyMap, ResourceCell, TaskInvoker};
use crate::model::id::Id;
use crate::model::middleware::MiddlewareKind;
use crate::model::task::TaskDefinition;
use crate::resolver::DependencyResolver;
use crate::store::{NodeEntry, Store};
use crate::validation::ValidationError;

/// A resource tagged with this id and implementing [`TunnelRouter`] may
/// intercept `run_task` calls that match it, routing them to an external
/// executor instead of running the task body locally.
pub const GLOBAL_TUNNEL_TAG: &str = "global.tunnel";

pub trait TunnelRouter: Send + Sync {
    fn matches(&self, task_id: &Id) -> bool;

    fn route<'a>(
        &'a self,
        task_id: &'a Id,
        input: Value,
        deps: DependencyMap,
    ) -> crate::model::deps::BoxFuture<'a, Result<Value, RunnerError>>;
}

#[instrument(skip(store, resources, runtime, tunnels, input, deps_override), fields(task_id = %task_id))]
#[allow(clippy::too_many_arguments)]
pub async fn run_task(
    store: &Store,
    resources: &HashMap<Id, ResourceCell>,
    runtime: Weak<dyn TaskInvoker>,
    tunnels: &[Arc<dyn TunnelRouter>],
    task_id: &Id,
    input: Value,
    deps_override: Option<DependencyMap>,
) -> Result<Value, RunnerError> {
    let task = store
        .get(task_id.as_str())
        .and_then(NodeEntry::as_task)
        .ok_or_else(|| crate::store::GraphError::UnknownNode(task_id.clone()))?
        .clone();

    if let Some(schema) = &task.input_schema {
        schema.validate(&input).map_err(|reason| ValidationError::task_input(task_id, reason))?;
    }

    if let Some(tunnel) = tunnels.iter().find(|t| t.matches(task_id)) {
        let spec = task.dependencies.resolve(&());
        let resolver = DependencyResolver::new(store, runtime);
        let deps = match deps_override {
            Some(d) => d,
            None => resolver.resolve(task_id, &spec, resources)?,
        };
        return tunnel.route(task_id, input, deps).await;
    }

    let result = run_local(store, resources, runtime.clone(), &task, task_id, input.clone(), deps_override).await;

    match result {
        Ok(output) => {
            events::emit(
                store,
                resources,
                runtime,
                &task.events.after_run,
                serde_json::json!({"input": input, "output": output}),
                Some(task_id.clone()),
            )
            .await?;
            Ok(output)
        }
        Err(err) => {
            let emission = crate::model::event::Emission::new(
                task.events.on_error.clone(),
                serde_json::json!({"error": err.to_string()}),
                Some(task_id.clone()),
                chrono::Utc::now(),
            );
            events::dispatch_emission(store, resources, runtime, &emission).await.ok();
            if emission.is_suppressed() {
                Ok(Value::Null)
            } else {
                Err(err)
            }
        }
    }
}

async fn run_local(
    store: &Store,
    resources: &HashMap<Id, ResourceCell>,
    runtime: Weak<dyn TaskInvoker>,
    task: &Arc<TaskDefinition>,
    task_id: &Id,
    input: Value,
    deps_override: Option<DependencyMap>,
) -> Result<Value, RunnerError> {
    events::emit(
        store,
        resources,
        runtime.clone(),
        &task.events.before_run,
        serde_json::json!({"input": input}),
        Some(task_id.clone()),
    )
    .await?;

    let resolver = DependencyResolver::new(store, runtime);
    let deps = match deps_override {
        Some(d) => d,
        None => {
            let spec = task.dependencies.resolve(&());
            resolver.resolve(task_id, &spec, resources)?
        }
    };

    let attached = middleware_composer::gather_middleware(store, &task.middleware, task.as_ref(), MiddlewareKind::Task);
    let links: Vec<ComposedMiddleware> = middleware_composer::resolve_links(store, &resolver, resources, &attached)?;

    let task_for_terminal = task.clone();
    let deps_for_terminal = deps;
    let terminal = middleware_composer::terminal(move |value| {
        let task = task_for_terminal.clone();
        let deps = deps_for_terminal.clone();
        async move { task.run(value, deps).await }
    });

    let chain = middleware_composer::compose(links, task_id.clone(), terminal);
    let output = chain(input).await?;

    if let Some(schema) = &task.result_schema {
        schema.validate(&output).map_err(|reason| ValidationError::task_result(task_id, reason))?;
    }

    Ok(output)
}

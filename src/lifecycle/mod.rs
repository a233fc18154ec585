//! Resource lifecycle: topological initialization and reverse-order
//! disposal.
//!
//! Resource middleware only ever wraps the *config* a resource's `init`
//! receives - unlike a task's result, a resource's initialized value is an
//! arbitrary Rust type, not a `serde_json::Value`, so it cannot flow back
//! through the `Value`-typed middleware chain the way a task's output does.
//! The chain's terminal is therefore the identity function; `init` itself
//! is always called directly, outside the chain, once the effective config
//! is known.

use std::collections::HashMap;
use std::sync::Weak;

use serde_json::Value;
use tracing::instrument;

use crate::error::RunnerError;
use crate::middleware_composer;
use crate::model::deps::{DependencyMap, ResourceCell, TaskInvoker};
use crate::model::id::Id;
use crate::model::middleware::MiddlewareKind;
use crate::model::resource::{ResourceDefinition, ResourceScratch};
use crate::resolver::{self, DependencyResolver};
use crate::store::{GraphError, NodeEntry, Store};
use crate::validation::ValidationError;

/// Initializes every resource in the store in dependency order, returning
/// the id-to-value map the rest of the runtime reads from, plus the
/// per-resource scratch `context()` produced - the same scratch value
/// `dispose_all` must later hand back to that resource's `dispose`.
#[instrument(skip(store, runtime))]
pub async fn initialize_all(
    store: &Store,
    runtime: Weak<dyn TaskInvoker>,
) -> Result<(HashMap<Id, ResourceCell>, HashMap<Id, ResourceScratch>), RunnerError> {
    let order = resolver::topological_order(store)?;
    let mut resources: HashMap<Id, ResourceCell> = HashMap::new();
    let mut scratches: HashMap<Id, ResourceScratch> = HashMap::new();
    let resolver = DependencyResolver::new(store, runtime);

    for id in order {
        let resource = store
            .get(id.as_str())
            .and_then(NodeEntry::as_resource)
            .ok_or_else(|| GraphError::UnknownNode(id.clone()))?
            .clone();
        let config = store.resource_config(id.as_str()).cloned().unwrap_or(Value::Null);

        let spec = resource.dependencies.resolve(&config);
        let deps = resolver.resolve(&id, &spec, &resources)?;

        let effective_config = run_config_middleware(store, &resolver, &resources, &resource, &config).await?;

        if let Some(schema) = &resource.config_schema {
            schema
                .validate(&effective_config)
                .map_err(|reason| ValidationError::resource_config(&id, reason))?;
        }

        let scratch = resource.scratch();
        let cell = resource.init(effective_config, deps, scratch.clone()).await?;

        // `result_schema` is accepted for API symmetry with tasks (see
        // `model::task`) but cannot be enforced generically here: a
        // resource's initialized value is an opaque `Arc<dyn Any>` (its
        // whole point is letting dependents hold a live Rust object - a
        // connection pool, a client - rather than a JSON value), so there
        // is no value to hand a `Validator` without forcing every resource
        // to additionally implement `Serialize`. See DESIGN.md.

        resources.insert(id.clone(), cell);
        scratches.insert(id, scratch);
    }

    Ok((resources, scratches))
}

async fn run_config_middleware(
    store: &Store,
    resolver: &DependencyResolver<'_>,
    resources: &HashMap<Id, ResourceCell>,
    resource: &std::sync::Arc<ResourceDefinition>,
    config: &Value,
) -> Result<Value, RunnerError> {
    let attached =
        middleware_composer::gather_middleware(store, &resource.middleware, resource.as_ref(), MiddlewareKind::Resource);
    if attached.is_empty() {
        return Ok(config.clone());
    }
    let links = middleware_composer::resolve_links(store, resolver, resources, &attached)?;
    let chain = middleware_composer::compose(links, resource.id.clone(), middleware_composer::identity_terminal());
    chain(config.clone()).await
}

/// Disposes every initialized resource in reverse initialization order,
/// collecting individual failures into a single aggregate error rather than
/// stopping at the first one (I4: dispose runs exactly once per
/// successfully-initialized resource).
#[instrument(skip(store, resources, scratches, runtime))]
pub async fn dispose_all(
    store: &Store,
    resources: &HashMap<Id, ResourceCell>,
    scratches: &HashMap<Id, ResourceScratch>,
    runtime: Weak<dyn TaskInvoker>,
) -> Result<(), RunnerError> {
    let order = resolver::topological_order(store)?;
    let resolver = DependencyResolver::new(store, runtime);
    let mut errors = Vec::new();

    for id in order.into_iter().rev() {
        let Some(cell) = resources.get(&id).cloned() else { continue };
        let Some(resource) = store.get(id.as_str()).and_then(NodeEntry::as_resource) else { continue };
        let config = store.resource_config(id.as_str()).cloned().unwrap_or(Value::Null);
        let spec = resource.dependencies.resolve(&config);
        let deps = match resolver.resolve(&id, &spec, resources) {
            Ok(d) => d,
            Err(err) => {
                errors.push(format!("{id}: {err}"));
                continue;
            }
        };
        // The same scratch `initialize_all` produced for this resource's
        // `init`, not a fresh `context()` evaluation - `context()` is
        // evaluated once per resource, not once per lifecycle call.
        let scratch = scratches.get(&id).cloned().unwrap_or_else(|| resource.scratch());
        if let Err(err) = resource.dispose(cell, config, deps, scratch).await {
            errors.push(format!("{id}: {err}"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(RunnerError::Runtime(crate::runtime::RuntimeError::DisposalFailed(errors)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reverse_order_is_correct() {
        let order = vec![Id::from("a"), Id::from("b"), Id::from("c")];
        let reversed: Vec<_> = order.into_iter().rev().collect();
        assert_eq!(reversed, vec![Id::from("c"), Id::from("b"), Id::from("a")]);
    }
}

//! Event manager: two-pass hook dispatch with ordering, parallel batches,
//! wildcard fan-out and propagation control.

use std::collections::HashMap;

use chrono::Utc;
use futures::future::join_all;
use serde_json::Value;
use tracing::instrument;

use crate::error::RunnerError;
use crate::model::deps::{ResourceCell, TaskInvoker};
use crate::model::event::Emission;
use crate::model::hook::HookTarget;
use crate::model::id::Id;
use crate::resolver::DependencyResolver;
use crate::store::{GraphError, NodeEntry, Store};
use crate::validation::ValidationError;

/// One hook with the ordering key it was scheduled under, computed once
/// per dispatch so sorting doesn't need to re-read the store.
struct Scheduled<'a> {
    id: &'a Id,
    order: i32,
    registration_index: usize,
}

#[instrument(skip(store, resources, runtime, data), fields(event_id = %event_id))]
pub async fn emit(
    store: &Store,
    resources: &HashMap<Id, ResourceCell>,
    runtime: std::sync::Weak<dyn TaskInvoker>,
    event_id: &Id,
    data: Value,
    source: Option<Id>,
) -> Result<(), RunnerError> {
    if let Some(event) = store.get(event_id.as_str()).and_then(NodeEntry::as_event) {
        if let Some(schema) = &event.payload_schema {
            schema.validate(&data).map_err(|reason| ValidationError::event_payload(event_id, reason))?;
        }
    }

    let emission = Emission::new(event_id.clone(), data, source, Utc::now());
    dispatch_emission(store, resources, runtime, &emission).await
}

/// Dispatches an already-constructed emission. Exposed separately from
/// [`emit`] so callers that need the emission's control flags afterward
/// (the task runner's `on_error`, checking `is_suppressed()`) can hold onto
/// it themselves.
pub async fn dispatch_emission(
    store: &Store,
    resources: &HashMap<Id, ResourceCell>,
    runtime: std::sync::Weak<dyn TaskInvoker>,
    emission: &Emission,
) -> Result<(), RunnerError> {
    let event_id = &emission.event_id;
    let fail_fast = store.get(event_id.as_str()).and_then(NodeEntry::as_event).is_some_and(|e| e.fail_fast());
    let parallel = store.get(event_id.as_str()).and_then(NodeEntry::as_event).is_some_and(|e| e.parallel);

    let reg_index: HashMap<&Id, usize> =
        store.registration_order().iter().enumerate().map(|(i, id)| (id, i)).collect();

    let mut explicit = Vec::new();
    let mut wildcard = Vec::new();
    for (id, entry) in store.iter() {
        let Some(hook) = entry.as_hook() else { continue };
        if !hook.listens_to(event_id) {
            continue;
        }
        let scheduled = Scheduled { id, order: hook.order, registration_index: reg_index.get(id).copied().unwrap_or(0) };
        match hook.target {
            HookTarget::Wildcard => wildcard.push(scheduled),
            HookTarget::Events(_) => explicit.push(scheduled),
        }
    }

    dispatch_pass(store, resources, runtime.clone(), emission, explicit, parallel, fail_fast).await?;
    if emission.is_propagation_stopped() {
        return Ok(());
    }
    dispatch_pass(store, resources, runtime, emission, wildcard, parallel, fail_fast).await
}

async fn dispatch_pass(
    store: &Store,
    resources: &HashMap<Id, ResourceCell>,
    runtime: std::sync::Weak<dyn TaskInvoker>,
    emission: &Emission,
    mut hooks: Vec<Scheduled<'_>>,
    parallel: bool,
    fail_fast: bool,
) -> Result<(), RunnerError> {
    hooks.sort_by_key(|h| (h.order, h.registration_index));
    let resolver = DependencyResolver::new(store, runtime);

    let mut i = 0;
    while i < hooks.len() {
        let mut j = i + 1;
        while j < hooks.len() && hooks[j].order == hooks[i].order {
            j += 1;
        }
        let batch = &hooks[i..j];

        if parallel && batch.len() > 1 {
            let futures = batch.iter().map(|s| run_one(store, &resolver, resources, emission, s.id));
            for result in join_all(futures).await {
                handle_hook_result(result, fail_fast)?;
            }
        } else {
            for s in batch {
                let result = run_one(store, &resolver, resources, emission, s.id).await;
                handle_hook_result(result, fail_fast)?;
            }
        }

        if emission.is_propagation_stopped() {
            return Ok(());
        }
        i = j;
    }
    Ok(())
}

fn handle_hook_result(result: Result<(), RunnerError>, fail_fast: bool) -> Result<(), RunnerError> {
    match result {
        Ok(()) => Ok(()),
        Err(err) if fail_fast => Err(err),
        Err(err) => {
            tracing::error!(error = %err, "hook execution failed; continuing dispatch (fail_fast disabled)");
            Ok(())
        }
    }
}

async fn run_one(
    store: &Store,
    resolver: &DependencyResolver<'_>,
    resources: &HashMap<Id, ResourceCell>,
    emission: &Emission,
    hook_id: &Id,
) -> Result<(), RunnerError> {
    let Some(hook) = store.get(hook_id.as_str()).and_then(NodeEntry::as_hook) else {
        return Err(GraphError::UnknownNode(hook_id.clone()).into());
    };
    let spec = hook.dependencies.resolve(&());
    let deps = resolver.resolve(hook_id, &spec, resources)?;
    hook.run(emission.clone(), deps).await
}

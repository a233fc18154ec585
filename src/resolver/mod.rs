//! Turns declared dependency specs into resolved [`DependencyMap`]s, and
//! computes the resource initialization order.
//!
//! The initialization order only concerns resources: tasks and events are
//! resolved lazily through [`TaskHandle`]/[`EventHandle`] and never need a
//! fixed point, so only resource-to-resource edges can deadlock the graph.
//! A Kahn's-algorithm topological sort produces the order; a separate DFS
//! with a `visiting` set reports the cycle path when one exists.

use std::collections::{HashMap, VecDeque};
use std::sync::Weak;

use serde_json::Value;

use crate::error::RunnerError;
use crate::model::deps::{
    DependencyHandle, DependencyKind, DependencyMap, DependencySpecMap, EventHandle, ResourceCell, TaskHandle,
    TaskInvoker,
};
use crate::model::id::Id;
use crate::store::{GraphError, Store};

pub struct DependencyResolver<'a> {
    store: &'a Store,
    runtime: Weak<dyn TaskInvoker>,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(store: &'a Store, runtime: Weak<dyn TaskInvoker>) -> Self {
        Self { store, runtime }
    }

    /// Resolves one node's declared dependency spec into a [`DependencyMap`].
    /// `initialized_resources` must already hold every resource this spec
    /// can reference - the caller is expected to have walked resources in
    /// [`topological_order`] first.
    pub fn resolve(
        &self,
        owner: &Id,
        spec: &DependencySpecMap,
        initialized_resources: &HashMap<Id, ResourceCell>,
    ) -> Result<DependencyMap, RunnerError> {
        let mut map = DependencyMap::new();
        for (key, dep) in spec {
            let handle = match dep.kind {
                DependencyKind::Task => {
                    if self.store.get(dep.target.as_str()).and_then(|e| e.as_task()).is_some() {
                        Some(DependencyHandle::Task(TaskHandle::new(self.runtime.clone(), dep.target.clone())))
                    } else {
                        None
                    }
                }
                DependencyKind::Event => {
                    if self.store.get(dep.target.as_str()).and_then(|e| e.as_event()).is_some() {
                        Some(DependencyHandle::Event(EventHandle::new(self.runtime.clone(), dep.target.clone())))
                    } else {
                        None
                    }
                }
                DependencyKind::Resource => {
                    initialized_resources.get(&dep.target).cloned().map(DependencyHandle::Resource)
                }
            };

            match handle {
                Some(h) => map.insert(key.clone(), h),
                None if dep.optional => {}
                None => {
                    return Err(GraphError::UnknownDependency { from: owner.clone(), to: dep.target.clone() }.into());
                }
            }
        }
        Ok(map)
    }
}

/// Resource initialization order via Kahn's algorithm over resource-kind
/// dependency edges; reports the first node still unresolved as the cycle
/// witness on failure.
pub fn topological_order(store: &Store) -> Result<Vec<Id>, GraphError> {
    let mut in_degree: HashMap<Id, usize> = HashMap::new();
    let mut dependents: HashMap<Id, Vec<Id>> = HashMap::new();
    let mut resource_ids = Vec::new();

    for (id, entry) in store.iter() {
        let Some(resource) = entry.as_resource() else { continue };
        resource_ids.push(id.clone());
        in_degree.entry(id.clone()).or_insert(0);

        let config = store.resource_config(id.as_str()).cloned().unwrap_or(Value::Null);
        for dep in resource.dependencies.resolve(&config).values() {
            if dep.kind != DependencyKind::Resource {
                continue;
            }
            let target_is_resource = store.get(dep.target.as_str()).and_then(|e| e.as_resource()).is_some();
            if !target_is_resource {
                if dep.optional {
                    continue;
                }
                return Err(GraphError::UnknownDependency { from: id.clone(), to: dep.target.clone() });
            }
            dependents.entry(dep.target.clone()).or_default().push(id.clone());
            *in_degree.entry(id.clone()).or_insert(0) += 1;
        }
    }

    let mut queue: VecDeque<Id> =
        resource_ids.iter().filter(|id| in_degree.get(*id).copied().unwrap_or(0) == 0).cloned().collect();
    let mut order = Vec::with_capacity(resource_ids.len());

    while let Some(id) = queue.pop_front() {
        order.push(id.clone());
        if let Some(ds) = dependents.get(&id) {
            for d in ds {
                let deg = in_degree.get_mut(d).expect("dependent tracked in in_degree");
                *deg -= 1;
                if *deg == 0 {
                    queue.push_back(d.clone());
                }
            }
        }
    }

    if order.len() != resource_ids.len() {
        let stuck = resource_ids
            .into_iter()
            .find(|id| in_degree.get(id).copied().unwrap_or(0) > 0)
            .expect("order short of resource_ids implies a stuck node exists");
        return Err(GraphError::CyclicDependency(stuck));
    }

    Ok(order)
}

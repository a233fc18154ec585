//! The node registry: a flat map from id to definition, built by walking a
//! root resource's `register` tree and applying collected overrides. A
//! per-subsystem `thiserror` enum (`GraphError`) covers duplicate-id, cycle,
//! and unknown-reference failures during registration.

mod tags_index;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::model::event::EventDefinition;
use crate::model::hook::HookDefinition;
use crate::model::id::Id;
use crate::model::middleware::MiddlewareDefinition;
use crate::model::node::{NodeInfo, NodeKind};
use crate::model::overrides::OverrideDecl;
use crate::model::resource::{Registerable, ResourceDefinition, ResourceWithConfig};
use crate::model::tag::TagDefinition;
use crate::model::task::TaskDefinition;

pub use tags_index::TagsIndex;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("duplicate node id `{0}`")]
    DuplicateId(Id),

    #[error("node `{from}` depends on unknown node `{to}`")]
    UnknownDependency { from: Id, to: Id },

    #[error("cyclic registration detected at resource `{0}`")]
    CyclicRegistration(Id),

    #[error("cyclic dependency graph detected, involving `{0}`")]
    CyclicDependency(Id),

    #[error("override targets unknown node `{0}`")]
    UnknownOverrideTarget(Id),

    #[error("unknown node `{0}`")]
    UnknownNode(Id),

    #[error("override target `{id}` is a {actual}, not a {expected}")]
    OverrideKindMismatch { id: Id, expected: &'static str, actual: &'static str },
}

impl GraphError {
    /// Graph errors are structural mistakes in the wiring, never the
    /// environment; none are worth retrying.
    pub const fn is_transient(&self) -> bool {
        false
    }
}

#[derive(Clone)]
pub enum NodeEntry {
    Task(Arc<TaskDefinition>),
    Resource(Arc<ResourceDefinition>),
    Event(Arc<EventDefinition>),
    TaskMiddleware(Arc<MiddlewareDefinition>),
    ResourceMiddleware(Arc<MiddlewareDefinition>),
    Hook(Arc<HookDefinition>),
    Tag(Arc<TagDefinition>),
}

impl NodeEntry {
    pub fn info(&self) -> &dyn NodeInfo {
        match self {
            Self::Task(d) => d.as_ref(),
            Self::Resource(d) => d.as_ref(),
            Self::Event(d) => d.as_ref(),
            Self::TaskMiddleware(d) | Self::ResourceMiddleware(d) => d.as_ref(),
            Self::Hook(d) => d.as_ref(),
            Self::Tag(d) => d.as_ref(),
        }
    }

    pub fn as_task(&self) -> Option<&Arc<TaskDefinition>> {
        match self {
            Self::Task(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_resource(&self) -> Option<&Arc<ResourceDefinition>> {
        match self {
            Self::Resource(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_event(&self) -> Option<&Arc<EventDefinition>> {
        match self {
            Self::Event(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_middleware(&self) -> Option<&Arc<MiddlewareDefinition>> {
        match self {
            Self::TaskMiddleware(d) | Self::ResourceMiddleware(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_hook(&self) -> Option<&Arc<HookDefinition>> {
        match self {
            Self::Hook(d) => Some(d),
            _ => None,
        }
    }
}

/// The registered graph: every node by id, plus each resource's bound
/// config (needed again at lifecycle init time) and a reverse tag index.
pub struct Store {
    nodes: HashMap<Id, NodeEntry>,
    resource_configs: HashMap<Id, Value>,
    registration_order: Vec<Id>,
    tags_index: TagsIndex,
}

impl Store {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            resource_configs: HashMap::new(),
            registration_order: Vec::new(),
            tags_index: TagsIndex::new(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&NodeEntry> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn resource_config(&self, id: &str) -> Option<&Value> {
        self.resource_configs.get(id)
    }

    pub fn registration_order(&self) -> &[Id] {
        &self.registration_order
    }

    pub fn tags_index(&self) -> &TagsIndex {
        &self.tags_index
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Id, &NodeEntry)> {
        self.nodes.iter()
    }

    /// Registers the root resource and its whole `register` tree, then
    /// applies any overrides collected along the way (outermost wins).
    pub fn register_root(&mut self, root: ResourceWithConfig) -> Result<(), GraphError> {
        let mut visiting = HashSet::new();
        let mut overrides = Vec::new();
        self.walk_resource(root, &mut visiting, &mut overrides)?;
        self.apply_overrides(overrides)
    }

    fn insert(&mut self, id: Id, entry: NodeEntry) -> Result<(), GraphError> {
        if self.nodes.contains_key(&id) {
            return Err(GraphError::DuplicateId(id));
        }
        self.tags_index.index(entry.info());
        self.registration_order.push(id.clone());
        self.nodes.insert(id, entry);
        Ok(())
    }

    fn walk_resource(
        &mut self,
        rwc: ResourceWithConfig,
        visiting: &mut HashSet<Id>,
        overrides: &mut Vec<Arc<OverrideDecl>>,
    ) -> Result<(), GraphError> {
        let ResourceWithConfig { resource, config } = rwc;
        if !visiting.insert(resource.id.clone()) {
            return Err(GraphError::CyclicRegistration(resource.id.clone()));
        }
        self.resource_configs.insert(resource.id.clone(), config.clone());
        self.insert(resource.id.clone(), NodeEntry::Resource(resource.clone()))?;

        for item in resource.register.resolve(&config) {
            match item {
                Registerable::Task(t) => self.insert(t.id.clone(), NodeEntry::Task(t))?,
                Registerable::Event(e) => self.insert(e.id.clone(), NodeEntry::Event(e))?,
                Registerable::Hook(h) => self.insert(h.id.clone(), NodeEntry::Hook(h))?,
                Registerable::Tag(t) => self.insert(t.id.clone(), NodeEntry::Tag(t))?,
                Registerable::Middleware(m) => {
                    let entry = match m.kind {
                        crate::model::middleware::MiddlewareKind::Task => NodeEntry::TaskMiddleware(m.clone()),
                        crate::model::middleware::MiddlewareKind::Resource => NodeEntry::ResourceMiddleware(m.clone()),
                    };
                    self.insert(m.id.clone(), entry)?;
                }
                Registerable::Resource(child) => self.walk_resource(child, visiting, overrides)?,
                Registerable::Override(o) => overrides.push(o),
            }
        }

        visiting.remove(&resource.id);
        Ok(())
    }

    fn apply_overrides(&mut self, overrides: Vec<Arc<OverrideDecl>>) -> Result<(), GraphError> {
        let mut applied = HashSet::new();
        for o in overrides {
            match o.as_ref() {
                OverrideDecl::Task(t) => {
                    if !applied.insert(t.target.clone()) {
                        continue;
                    }
                    let current = self
                        .nodes
                        .get(&t.target)
                        .ok_or_else(|| GraphError::UnknownOverrideTarget(t.target.clone()))?;
                    let task = current.as_task().ok_or_else(|| GraphError::OverrideKindMismatch {
                        id: t.target.clone(),
                        expected: NodeKind::Task.as_str(),
                        actual: current.info().kind().as_str(),
                    })?;
                    let updated = task.with_override(t);
                    self.nodes.insert(t.target.clone(), NodeEntry::Task(updated));
                }
                OverrideDecl::Resource(r) => {
                    if !applied.insert(r.target.clone()) {
                        continue;
                    }
                    let current = self
                        .nodes
                        .get(&r.target)
                        .ok_or_else(|| GraphError::UnknownOverrideTarget(r.target.clone()))?;
                    let resource = current.as_resource().ok_or_else(|| GraphError::OverrideKindMismatch {
                        id: r.target.clone(),
                        expected: NodeKind::Resource.as_str(),
                        actual: current.info().kind().as_str(),
                    })?;
                    let updated = resource.with_override(r);
                    self.nodes.insert(r.target.clone(), NodeEntry::Resource(updated));
                }
            }
        }
        Ok(())
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

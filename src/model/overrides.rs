//! Override records: patches against an already-registered task or resource.
//!
//! An override never changes a node's id; it rebinds a subset of fields on
//! the node the store already holds. The store applies overrides outermost
//! (the override nearest the root of the registration tree) wins - see
//! `store::apply_overrides`.

use std::sync::Arc;

use serde_json::Value;

use crate::model::deps::DependencySpecMap;
use crate::model::id::Id;
use crate::model::middleware::AttachedMiddleware;
use crate::model::node::TagAttachment;
use crate::model::resource::{ResourceDisposeFn, ResourceInitFn};
use crate::model::task::TaskRunFn;

pub struct TaskOverride {
    pub target: Id,
    pub run: Option<TaskRunFn>,
    pub extra_dependencies: Option<DependencySpecMap>,
    pub extra_middleware: Vec<AttachedMiddleware>,
    pub extra_tags: Vec<TagAttachment>,
    pub meta: Option<Value>,
}

impl TaskOverride {
    pub fn new(target: impl Into<Id>) -> Self {
        Self {
            target: target.into(),
            run: None,
            extra_dependencies: None,
            extra_middleware: Vec::new(),
            extra_tags: Vec::new(),
            meta: None,
        }
    }
}

pub struct ResourceOverride {
    pub target: Id,
    pub init: Option<ResourceInitFn>,
    pub dispose: Option<ResourceDisposeFn>,
    pub extra_dependencies: Option<DependencySpecMap>,
    pub extra_middleware: Vec<AttachedMiddleware>,
    pub extra_tags: Vec<TagAttachment>,
    pub meta: Option<Value>,
}

impl ResourceOverride {
    pub fn new(target: impl Into<Id>) -> Self {
        Self {
            target: target.into(),
            init: None,
            dispose: None,
            extra_dependencies: None,
            extra_middleware: Vec::new(),
            extra_tags: Vec::new(),
            meta: None,
        }
    }
}

/// Any override kind, attachable to a resource's `register` list the same
/// way a `Registerable` is.
pub enum OverrideDecl {
    Task(TaskOverride),
    Resource(ResourceOverride),
}

impl From<TaskOverride> for OverrideDecl {
    fn from(o: TaskOverride) -> Self {
        Self::Task(o)
    }
}

impl From<ResourceOverride> for OverrideDecl {
    fn from(o: ResourceOverride) -> Self {
        Self::Resource(o)
    }
}

pub(crate) type SharedOverride = Arc<OverrideDecl>;

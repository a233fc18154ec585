//! Async-context node: the definition of an ambient value propagated through
//! a call tree without threading it through every dependency map.
//!
//! This module only carries the node's shape (id, schema, tags). Actual
//! propagation - providing a value for the duration of a future and reading
//! it back out deep in the call stack - is `async_ctx::AsyncContext`, which
//! wraps a `tokio::task_local!` keyed by this definition's id.

use std::sync::Arc;

use serde_json::Value;

use crate::model::id::Id;
use crate::model::node::{NodeInfo, NodeKind, TagAttachment};
use crate::validation::Validator;

pub struct AsyncContextDefinition {
    pub id: Id,
    pub file_path: Option<String>,
    pub meta: Option<Value>,
    pub tags: Vec<TagAttachment>,
    pub value_schema: Option<Arc<dyn Validator>>,
}

impl NodeInfo for AsyncContextDefinition {
    fn id(&self) -> &Id {
        &self.id
    }

    fn kind(&self) -> NodeKind {
        NodeKind::AsyncContext
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

pub struct AsyncContextBuilder {
    id: Id,
    file_path: Option<String>,
    meta: Option<Value>,
    tags: Vec<TagAttachment>,
    value_schema: Option<Arc<dyn Validator>>,
}

impl AsyncContextBuilder {
    pub fn new(id: impl Into<Id>) -> Self {
        Self { id: id.into(), file_path: None, meta: None, tags: Vec::new(), value_schema: None }
    }

    #[must_use]
    pub fn value_schema(mut self, schema: Arc<dyn Validator>) -> Self {
        self.value_schema = Some(schema);
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

    pub fn build(self) -> Arc<AsyncContextDefinition> {
        Arc::new(AsyncContextDefinition {
            id: self.id,
            file_path: self.file_path,
            meta: self.meta,
            tags: self.tags,
            value_schema: self.value_schema,
        })
    }
}

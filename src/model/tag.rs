//! Tag node: metadata attachable to any other node, with optional config and
//! an optional contract the tagged node's own config must satisfy.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::RunnerError;
use crate::model::id::Id;
use crate::model::node::{NodeInfo, NodeKind, TagAttachment};
use crate::validation::Validator;

pub struct TagDefinition {
    pub id: Id,
    pub file_path: Option<String>,
    pub meta: Option<Value>,
    pub tags: Vec<TagAttachment>,
    pub config_schema: Option<Arc<dyn Validator>>,
}

impl NodeInfo for TagDefinition {
    fn id(&self) -> &Id {
        &self.id
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Tag
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

impl TagDefinition {
    /// `tag.with(cfg)`: attaches this tag to a task/resource/etc with bound
    /// configuration.
    pub fn with(self: &Arc<Self>, config: Value) -> TagAttachment {
        TagAttachment::new(&self.id).with_config(config)
    }

    /// `tag.attach()`: attaches this tag with no configuration.
    pub fn attach(self: &Arc<Self>) -> TagAttachment {
        TagAttachment::new(&self.id)
    }

    /// Finds this tag among a node's attachments and deserializes its bound
    /// config, if present. Used by middleware/hooks that key behavior off a
    /// tag (e.g. `global.tunnel` in the task runner).
    pub fn extract<C: DeserializeOwned>(&self, node: &dyn NodeInfo) -> Result<Option<C>, RunnerError> {
        match node.tag_config(self.id.as_str()) {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => {
                if node.has_tag(self.id.as_str()) {
                    Ok(Some(serde_json::from_value(Value::Null)?))
                } else {
                    Ok(None)
                }
            }
        }
    }
}

pub struct TagBuilder {
    id: Id,
    file_path: Option<String>,
    meta: Option<Value>,
    tags: Vec<TagAttachment>,
    config_schema: Option<Arc<dyn Validator>>,
}

impl TagBuilder {
    pub fn new(id: impl Into<Id>) -> Self {
        Self { id: id.into(), file_path: None, meta: None, tags: Vec::new(), config_schema: None }
    }

    #[must_use]
    pub fn config_schema(mut self, schema: Arc<dyn Validator>) -> Self {
        self.config_schema = Some(schema);
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

    pub fn build(self) -> Arc<TagDefinition> {
        Arc::new(TagDefinition {
            id: self.id,
            file_path: self.file_path,
            meta: self.meta,
            tags: self.tags,
            config_schema: self.config_schema,
        })
    }
}

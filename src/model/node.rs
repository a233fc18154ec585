//! Common node shape shared by every brand.

use serde_json::Value;

use crate::model::id::Id;

/// The brand discriminant carried by every node, preserved at runtime so
/// the store and lifecycle code can treat nodes uniformly without deep
/// inheritance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Task,
    Resource,
    Event,
    TaskMiddleware,
    ResourceMiddleware,
    Hook,
    Tag,
    AsyncContext,
    Error,
}

impl NodeKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Resource => "resource",
            Self::Event => "event",
            Self::TaskMiddleware => "task_middleware",
            Self::ResourceMiddleware => "resource_middleware",
            Self::Hook => "hook",
            Self::Tag => "tag",
            Self::AsyncContext => "async_context",
            Self::Error => "error",
        }
    }
}

/// A tag attached to a node, with its bound configuration if any
/// (`tag.with(cfg)`).
#[derive(Debug, Clone)]
pub struct TagAttachment {
    pub tag_id: Id,
    pub config: Option<Value>,
}

impl TagAttachment {
    pub fn new(tag_id: impl Into<Id>) -> Self {
        Self { tag_id: tag_id.into(), config: None }
    }

    #[must_use]
    pub fn with_config(mut self, config: Value) -> Self {
        self.config = Some(config);
        self
    }
}

/// Capability every node kind implements, used by the store, resolver and
/// lifecycle code to operate on nodes without matching on the concrete type.
pub trait NodeInfo {
    fn id(&self) -> &Id;
    fn kind(&self) -> NodeKind;
    fn file_path(&self) -> Option<&str>;
    fn tags(&self) -> &[TagAttachment];
    fn meta(&self) -> Option<&Value>;

    fn has_tag(&self, tag_id: &str) -> bool {
        self.tags().iter().any(|t| t.tag_id.as_str() == tag_id)
    }

    fn tag_config(&self, tag_id: &str) -> Option<&Value> {
        self.tags()
            .iter()
            .find(|t| t.tag_id.as_str() == tag_id)
            .and_then(|t| t.config.as_ref())
    }
}

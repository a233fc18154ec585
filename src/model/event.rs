//! Event node: a named, typed signal other nodes can emit and listen for.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::model::id::Id;
use crate::model::node::{NodeInfo, NodeKind, TagAttachment};
use crate::validation::Validator;

pub struct EventDefinition {
    pub id: Id,
    pub file_path: Option<String>,
    pub meta: Option<Value>,
    pub tags: Vec<TagAttachment>,
    pub payload_schema: Option<Arc<dyn Validator>>,
    /// Hooks of equal `order` run concurrently instead of sequentially.
    pub parallel: bool,
}

impl EventDefinition {
    /// `meta.fail_fast: true` stops dispatch on the first hook error instead
    /// of routing it to the error sink and continuing.
    pub fn fail_fast(&self) -> bool {
        self.meta.as_ref().and_then(|m| m.get("fail_fast")).and_then(Value::as_bool).unwrap_or(false)
    }
}

impl NodeInfo for EventDefinition {
    fn id(&self) -> &Id {
        &self.id
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Event
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

/// Shared, interior-mutable control flags a hook can flip on the emission
/// it was handed, observed by the dispatcher for the rest of that pass.
#[derive(Debug, Default)]
pub struct EmissionControl {
    stop_propagation: AtomicBool,
    suppress: AtomicBool,
}

impl EmissionControl {
    pub fn stop_propagation(&self) {
        self.stop_propagation.store(true, Ordering::SeqCst);
    }

    pub fn is_propagation_stopped(&self) -> bool {
        self.stop_propagation.load(Ordering::SeqCst)
    }

    /// Only meaningful on the synthetic `on_error` emission the task runner
    /// raises; swallows the error instead of rethrowing it to the caller.
    pub fn suppress(&self) {
        self.suppress.store(true, Ordering::SeqCst);
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppress.load(Ordering::SeqCst)
    }
}

/// A concrete occurrence of an event, as handed to hooks and subscribers.
#[derive(Debug, Clone)]
pub struct Emission {
    pub event_id: Id,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
    /// The id of the task/resource/event that raised this emission, if any
    /// (absent for the three automatic lifecycle events raised by bootstrap).
    pub source: Option<Id>,
    pub control: Arc<EmissionControl>,
}

impl Emission {
    pub fn new(event_id: impl Into<Id>, data: Value, source: Option<Id>, now: DateTime<Utc>) -> Self {
        Self { event_id: event_id.into(), data, timestamp: now, source, control: Arc::new(EmissionControl::default()) }
    }

    pub fn stop_propagation(&self) {
        self.control.stop_propagation();
    }

    pub fn is_propagation_stopped(&self) -> bool {
        self.control.is_propagation_stopped()
    }

    pub fn suppress(&self) {
        self.control.suppress();
    }

    pub fn is_suppressed(&self) -> bool {
        self.control.is_suppressed()
    }
}

pub struct EventBuilder {
    id: Id,
    file_path: Option<String>,
    meta: Option<Value>,
    tags: Vec<TagAttachment>,
    payload_schema: Option<Arc<dyn Validator>>,
    parallel: bool,
}

impl EventBuilder {
    pub fn new(id: impl Into<Id>) -> Self {
        Self { id: id.into(), file_path: None, meta: None, tags: Vec::new(), payload_schema: None, parallel: false }
    }

    #[must_use]
    pub fn payload_schema(mut self, schema: Arc<dyn Validator>) -> Self {
        self.payload_schema = Some(schema);
        self
    }

    #[must_use]
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
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

    #[must_use]
    pub fn file_path(mut self, path: impl Into<String>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    pub fn build(self) -> Arc<EventDefinition> {
        Arc::new(EventDefinition {
            id: self.id,
            file_path: self.file_path,
            meta: self.meta,
            tags: self.tags,
            payload_schema: self.payload_schema,
            parallel: self.parallel,
        })
    }
}

//! The node model: the seven brands (task, resource, event, task/resource
//! middleware, hook, tag, async-context) plus the dependency and override
//! machinery shared across them.
//!
//! Every brand follows the same shape: a `*Definition` (immutable, built
//! once, stored behind an `Arc`), a `*Builder` (fluent, consumed by
//! `.build()`), and an implementation of [`node::NodeInfo`] so the store,
//! resolver and lifecycle code can operate on nodes without matching on the
//! concrete brand.

pub mod async_context;
pub mod deps;
pub mod event;
pub mod hook;
pub mod id;
pub mod middleware;
pub mod node;
pub mod overrides;
pub mod resource;
pub mod tag;
pub mod task;

pub use async_context::{AsyncContextBuilder, AsyncContextDefinition};
pub use deps::{
    DependenciesDecl, DependencyHandle, DependencyKind, DependencyMap, DependencyRef, DependencySpecMap,
    EventHandle, ResourceCell, TaskHandle, TaskInvoker,
};
pub use event::{Emission, EventBuilder, EventDefinition};
pub use hook::{HookBuilder, HookDefinition, HookTarget};
pub use id::Id;
pub use middleware::{
    AttachedMiddleware, Everywhere, MiddlewareArgs, MiddlewareBuilder, MiddlewareDefinition, MiddlewareKind,
};
pub use node::{NodeInfo, NodeKind, TagAttachment};
pub use overrides::{OverrideDecl, ResourceOverride, TaskOverride};
pub use resource::{Registerable, RegisterDecl, ResourceBuilder, ResourceDefinition, ResourceWithConfig};
pub use tag::{TagBuilder, TagDefinition};
pub use task::{TaskBuilder, TaskDefinition, TaskEvents};

//! Runcore - an application runtime.
//!
//! A dependency-injection, middleware and event/hook framework with a
//! layered durable-workflow engine on top. Applications are declared as
//! graphs of four primitive node kinds - tasks, resources, events and
//! middlewares - plus tags, hooks and async contexts. The runtime turns
//! that declarative graph into a live, dependency-injected,
//! middleware-wrapped, event-driven running application.

pub mod model;
pub mod validation;
pub mod store;
pub mod resolver;
pub mod middleware_composer;
pub mod runner;
pub mod events;
pub mod lifecycle;
pub mod async_ctx;
pub mod runtime;
pub mod durable;
pub mod bus;
pub mod queue;
pub mod infrastructure;
pub mod error;

pub use error::RunnerError;
pub use runtime::{RuntimeBuilder, RuntimeHandle};

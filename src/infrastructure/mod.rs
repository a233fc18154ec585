//! Ambient infrastructure: structured logging (with secret scrubbing and a
//! durable-execution audit trail) and layered runtime configuration. Neither
//! is a graph node; both back the `RuntimeBuilder` and the durable engine.

pub mod config;
pub mod logging;

pub use config::{ConfigError, ConfigLoader, RuntimeConfig};
pub use logging::audit::AuditSink;
pub use logging::secret_scrubbing::SecretScrubbingLayer;

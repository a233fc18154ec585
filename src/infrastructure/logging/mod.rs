//! Structured logging: a JSON/env-filter `tracing-subscriber` stack, secret
//! scrubbing before either sink sees a message, and the durable-execution
//! audit trail.

pub mod audit;
pub mod secret_scrubbing;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

/// Installs the process-wide `tracing` subscriber: an env-filter layer plus
/// a JSON-formatting layer writing to `writer` (typically a
/// `tracing_appender::non_blocking` handle for non-blocking file output).
///
/// Call once at process startup; subsequent calls would panic on the global
/// subscriber already being set, so this is left to the caller to guard.
pub fn init_subscriber<W>(writer: W)
where
    W: for<'a> tracing_subscriber::fmt::MakeWriter<'a> + Send + Sync + 'static,
{
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json_layer = tracing_subscriber::fmt::layer().json().with_writer(writer);

    Registry::default().with(filter).with(json_layer).init();
}

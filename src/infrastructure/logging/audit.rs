//! Durable-execution audit trail.
//!
//! Distinct from operational tracing: this persists the lifecycle of a
//! durable execution (`step_completed`, `sleep_started`, `signal_received`,
//! `rollback_started`, ...) through the configured [`DurableStore`], so it
//! survives process restarts and can be replayed for a postmortem. Every
//! entry is also mirrored as a `tracing::info!` event, and any JSON detail is
//! scrubbed before either sink sees it.

use std::sync::Arc;

use chrono::Utc;

use crate::durable::store::{DurableError, DurableStore};
use crate::durable::types::AuditEntry;
use crate::infrastructure::logging::secret_scrubbing::SecretScrubbingLayer;

pub struct AuditSink {
    store: Arc<dyn DurableStore>,
    scrubber: SecretScrubbingLayer,
}

impl AuditSink {
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        Self { store, scrubber: SecretScrubbingLayer::default() }
    }

    /// Records one lifecycle event for `execution_id`. `detail`, if given, is
    /// scrubbed before it reaches the store or the tracing event.
    pub async fn record(
        &self,
        execution_id: &str,
        attempt: u32,
        kind: &str,
        detail: Option<serde_json::Value>,
    ) -> Result<(), DurableError> {
        let detail = detail.map(|d| self.scrubber.scrub_json(&d));

        tracing::info!(execution_id, attempt, kind, detail = ?detail, "durable audit event");

        let entry = AuditEntry {
            id: uuid::Uuid::new_v4().to_string(),
            execution_id: execution_id.to_string(),
            attempt,
            at: Utc::now(),
            kind: kind.to_string(),
            detail,
        };
        self.store.append_audit_entry(&entry).await
    }

    pub async fn history(&self, execution_id: &str) -> Result<Vec<AuditEntry>, DurableError> {
        self.store.list_audit_entries(execution_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::durable::memory_store::InMemoryDurableStore;

    #[tokio::test]
    async fn recorded_entries_round_trip_through_the_store() {
        let store: Arc<dyn DurableStore> = Arc::new(InMemoryDurableStore::default());
        let sink = AuditSink::new(store);

        sink.record("exec-1", 0, "step_completed", Some(serde_json::json!({"step": "fetch"})))
            .await
            .unwrap();
        sink.record("exec-1", 1, "sleep_started", None).await.unwrap();

        let history = sink.history("exec-1").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].kind, "step_completed");
        assert_eq!(history[1].kind, "sleep_started");
    }

    #[tokio::test]
    async fn secrets_in_detail_are_scrubbed_before_persisting() {
        let store: Arc<dyn DurableStore> = Arc::new(InMemoryDurableStore::default());
        let sink = AuditSink::new(store);

        sink.record(
            "exec-2",
            0,
            "step_completed",
            Some(serde_json::json!({"api_key": "abcdefghijklmnopqrstuvwx0123456789"})),
        )
        .await
        .unwrap();

        let history = sink.history("exec-2").await.unwrap();
        let detail = history[0].detail.as_ref().unwrap();
        assert_eq!(detail["api_key"], "[REDACTED]");
    }
}

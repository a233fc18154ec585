//! Scenario 5: a workflow waiting on a signal either times out (no delivery
//! before its deadline) or observes the delivered payload, depending on
//! which happens first.

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use runcore::durable::context::{current, SignalOptions};
use runcore::durable::store::DurableError;
use runcore::durable::worker::Worker;
use runcore::error::RunnerError;
use runcore::model::deps::TaskInvoker;

use common::{durable_service, SingleTaskInvoker};

fn wait_for_paid_workflow(timeout_ms: u64) -> Arc<dyn TaskInvoker> {
    Arc::new(SingleTaskInvoker::new("workflow", move |_input| async move {
        let ctx = current().expect("durable context installed by DurableService::execute");
        match ctx.wait_for_signal("Paid", SignalOptions { timeout_ms: Some(timeout_ms) }, None).await {
            Ok(payload) => Ok(json!({"kind": "signal", "payload": payload})),
            Err(RunnerError::Durable(DurableError::SignalTimedOut { .. })) => Ok(json!({"kind": "timeout"})),
            Err(err) => Err(err),
        }
    }))
}

#[tokio::test]
async fn times_out_when_no_signal_arrives_before_the_deadline() {
    let invoker = wait_for_paid_workflow(10);
    let weak = Arc::downgrade(&invoker);
    let service = durable_service(weak);

    let execution_id = service.start_execution("workflow", json!({}), 3).await.unwrap();
    let first = service.execute(&execution_id).await;
    assert!(matches!(first, Err(RunnerError::Suspended(_))));

    tokio::time::sleep(Duration::from_millis(30)).await;

    let worker = Worker::new(service.clone(), Duration::from_millis(10));
    worker.tick().await.unwrap();

    // The worker's resume already ran the replay that observes the timeout;
    // calling `execute` once more replays the same (now-memoized) outcome.
    let result = service.execute(&execution_id).await.unwrap();
    assert_eq!(result, json!({"kind": "timeout"}));
}

#[tokio::test]
async fn returns_the_delivered_payload_when_the_signal_beats_the_deadline() {
    let invoker = wait_for_paid_workflow(10_000);
    let weak = Arc::downgrade(&invoker);
    let service = durable_service(weak);

    let execution_id = service.start_execution("workflow", json!({}), 3).await.unwrap();
    let first = service.execute(&execution_id).await;
    assert!(matches!(first, Err(RunnerError::Suspended(_))));

    service.signal(&execution_id, "Paid", json!({"paid_at": 1})).await.unwrap();

    let result = service.execute(&execution_id).await.unwrap();
    assert_eq!(result, json!({"kind": "signal", "payload": {"paid_at": 1}}));
}

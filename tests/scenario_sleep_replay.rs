//! Scenario 4: a workflow that sleeps observes its "before" side effect once
//! on the suspending pass and its "after" side effect once on replay, never
//! repeating either.

mod common;

use std::sync::Arc;

use serde_json::json;

use runcore::durable::context::{current, StepOptions};
use runcore::error::RunnerError;
use runcore::model::deps::TaskInvoker;

use common::{durable_service, Recorder, SingleTaskInvoker};

#[tokio::test]
async fn sleep_suspends_once_and_resumes_exactly_once() {
    let recorder = Arc::new(Recorder::default());

    let invoker: Arc<dyn TaskInvoker> = Arc::new(SingleTaskInvoker::new("workflow", {
        let recorder = recorder.clone();
        move |_input| {
            let recorder = recorder.clone();
            async move {
                let ctx = current().expect("durable context installed by DurableService::execute");
                // Memoized so replay after the sleep doesn't re-run it.
                let recorder_before = recorder.clone();
                ctx.step("before", StepOptions::default(), move || {
                    let recorder = recorder_before.clone();
                    async move {
                        recorder.push("before");
                        Ok(())
                    }
                })
                .await?;
                ctx.sleep(1000, Some("nap")).await?;
                recorder.push("after");
                Ok(json!({"done": true}))
            }
        }
    }));

    let weak = Arc::downgrade(&invoker);
    let service = durable_service(weak);

    let execution_id = service.start_execution("workflow", json!({}), 3).await.unwrap();

    let first = service.execute(&execution_id).await;
    assert!(matches!(first, Err(RunnerError::Suspended(_))));
    assert_eq!(recorder.snapshot(), vec!["before"]);

    // The worker resumes a sleeping execution by calling `execute` again
    // once its timer is due; replaying finds the sleep step already
    // recorded and returns immediately instead of sleeping a second time.
    let second = service.execute(&execution_id).await.unwrap();
    assert_eq!(second, json!({"done": true}));
    assert_eq!(recorder.snapshot(), vec!["before", "after"]);
}

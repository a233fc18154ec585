//! Scenario 3: a durable workflow commits two saga steps then fails;
//! compensation unwinds them in reverse order and the execution lands in
//! `failed` (compensation itself never fails here).

mod common;

use std::sync::Arc;

use serde_json::json;

use runcore::durable::context::{current, StepOptions};
use runcore::durable::types::ExecutionStatus;
use runcore::error::RunnerError;
use runcore::model::deps::TaskInvoker;

use common::{durable_service, Recorder, SingleTaskInvoker};

#[derive(Debug, thiserror::Error)]
#[error("workflow failed after committing its saga steps")]
struct WorkflowFailed;

#[tokio::test]
async fn rollback_unwinds_committed_steps_in_reverse_order() {
    let recorder = Arc::new(Recorder::default());

    let invoker: Arc<dyn TaskInvoker> = Arc::new(SingleTaskInvoker::new("workflow", {
        let recorder = recorder.clone();
        move |_input| {
            let recorder = recorder.clone();
            async move {
                let ctx = current().expect("durable context installed by DurableService::execute");

                ctx.step_saga::<(), _, _, _, _>(
                    "A",
                    StepOptions::default(),
                    {
                        let recorder = recorder.clone();
                        move || {
                            let recorder = recorder.clone();
                            async move {
                                recorder.push("A.up");
                                Ok::<(), RunnerError>(())
                            }
                        }
                    },
                    {
                        let recorder = recorder.clone();
                        move |_: ()| {
                            let recorder = recorder.clone();
                            async move {
                                recorder.push("A.down");
                                Ok::<(), RunnerError>(())
                            }
                        }
                    },
                )
                .await?;

                ctx.step_saga::<(), _, _, _, _>(
                    "B",
                    StepOptions::default(),
                    {
                        let recorder = recorder.clone();
                        move || {
                            let recorder = recorder.clone();
                            async move {
                                recorder.push("B.up");
                                Ok::<(), RunnerError>(())
                            }
                        }
                    },
                    {
                        let recorder = recorder.clone();
                        move |_: ()| {
                            let recorder = recorder.clone();
                            async move {
                                recorder.push("B.down");
                                Ok::<(), RunnerError>(())
                            }
                        }
                    },
                )
                .await?;

                Err(RunnerError::task(WorkflowFailed))
            }
        }
    }));

    let weak = Arc::downgrade(&invoker);
    let service = durable_service(weak);

    let execution_id = service.start_execution("workflow", json!({}), 1).await.unwrap();
    let result = service.execute(&execution_id).await;
    assert!(result.is_err());

    let execution = service.store().get_execution(&execution_id).await.unwrap().unwrap();
    assert_eq!(execution.status, ExecutionStatus::Failed);

    assert_eq!(recorder.snapshot(), vec!["A.up", "B.up", "B.down", "A.down"]);
}

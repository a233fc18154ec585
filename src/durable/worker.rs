//! Timer/worker loop: fires due timers, resumes suspended executions, and
//! reconciles active schedules into pending timers.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tracing::instrument;

use crate::durable::service::DurableService;
use crate::durable::types::{StepResult, Timer, TimerStatus, TimerType};
use crate::error::RunnerError;

pub struct Worker {
    service: Arc<DurableService>,
    poll_interval: Duration,
}

impl Worker {
    pub fn new(service: Arc<DurableService>, poll_interval: Duration) -> Self {
        Self { service, poll_interval }
    }

    /// Runs one poll cycle: fires ready timers, then seeds the next timer
    /// for every active schedule whose `next_run` has arrived.
    #[instrument(skip(self))]
    pub async fn tick(&self) -> Result<(), RunnerError> {
        self.fire_ready_timers().await?;
        self.reconcile_schedules().await?;
        Ok(())
    }

    pub async fn run_forever(self: Arc<Self>) -> ! {
        loop {
            if let Err(err) = self.tick().await {
                tracing::error!(error = %err, "worker tick failed");
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn fire_ready_timers(&self) -> Result<(), RunnerError> {
        let now = Utc::now();
        let timers = self.service.store().get_ready_timers(now).await?;
        for timer in timers {
            self.service.store().mark_timer_fired(&timer.id).await?;

            match timer.timer_type {
                TimerType::Sleep | TimerType::SignalDelivered => {
                    if let Some(execution_id) = timer.execution_id.clone() {
                        self.resume(execution_id).await;
                    }
                }
                TimerType::SignalTimeout => {
                    if let Some(execution_id) = timer.execution_id.clone() {
                        if let Some(step_id) = &timer.step_id {
                            let marker = StepResult {
                                execution_id: execution_id.clone(),
                                step_id: format!("{step_id}:timed_out"),
                                result: Value::Bool(true),
                                completed_at: Utc::now(),
                            };
                            if let Err(err) = self.service.store().save_step_result(&marker).await {
                                tracing::error!(execution_id, error = %err, "failed to persist signal-timeout marker");
                            }
                        }
                        self.resume(execution_id).await;
                    }
                }
                TimerType::Scheduled => {
                    self.fire_scheduled(&timer).await?;
                }
            }

            self.service.store().delete_timer(&timer.id).await?;
        }
        Ok(())
    }

    fn resume(&self, execution_id: String) -> futures::future::BoxFuture<'_, ()> {
        Box::pin(async move {
            match self.service.execute(&execution_id).await {
                Ok(_) | Err(RunnerError::Suspended(_)) => {}
                Err(err) => tracing::error!(execution_id, error = %err, "resumed execution failed"),
            }
        })
    }

    async fn fire_scheduled(&self, timer: &Timer) -> Result<(), RunnerError> {
        let (Some(task_id), Some(schedule_id)) = (&timer.task_id, &timer.schedule_id) else { return Ok(()) };
        let input = timer.input.clone().unwrap_or(Value::Null);
        let execution_id = self.service.start_execution(task_id.as_str(), input, 3).await?;

        let service = self.service.clone();
        let execution_id_for_spawn = execution_id.clone();
        tokio::spawn(async move {
            if let Err(err) = service.execute(&execution_id_for_spawn).await {
                if !matches!(err, RunnerError::Suspended(_)) {
                    tracing::error!(execution_id = %execution_id_for_spawn, error = %err, "scheduled execution failed");
                }
            }
        });

        if let Some(mut schedule) = self.service.store().get_schedule(schedule_id).await? {
            schedule.last_run = Some(Utc::now());
            if let Ok(next) = crate::durable::cron::next_fire(&schedule.schedule_type, &schedule.pattern, Utc::now()) {
                schedule.next_run = Some(next);
            }
            self.service.store().update_schedule(&schedule).await?;
        }

        Ok(())
    }

    async fn reconcile_schedules(&self) -> Result<(), RunnerError> {
        let now = Utc::now();
        let schedules = self.service.store().list_active_schedules().await?;
        for schedule in schedules {
            let Some(next_run) = schedule.next_run else { continue };
            if next_run > now {
                continue;
            }
            let timer = Timer {
                id: format!("schedule:{}:{}", schedule.id, next_run.timestamp_millis()),
                execution_id: None,
                schedule_id: Some(schedule.id.clone()),
                step_id: None,
                task_id: Some(schedule.task_id.clone()),
                input: schedule.input.clone(),
                timer_type: TimerType::Scheduled,
                fire_at: next_run,
                status: TimerStatus::Pending,
            };
            // Best-effort: a backend that rejects the duplicate id on a
            // re-reconcile before the previous timer fired just skips it.
            let _ = self.service.store().create_timer(&timer).await;
        }
        Ok(())
    }
}

//! In-memory `DurableStore` for tests and single-process demos.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::durable::store::{DurableError, DurableStore};
use crate::durable::types::{AuditEntry, Execution, ExecutionStatus, Schedule, ScheduleStatus, StepResult, Timer, TimerStatus};

#[derive(Default)]
struct State {
    executions: HashMap<String, Execution>,
    step_results: HashMap<(String, String), StepResult>,
    timers: HashMap<String, Timer>,
    schedules: HashMap<String, Schedule>,
    locks: HashSet<String>,
    audit: Vec<AuditEntry>,
}

#[derive(Default)]
pub struct InMemoryDurableStore {
    state: Mutex<State>,
}

impl InMemoryDurableStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl DurableStore for InMemoryDurableStore {
    async fn save_execution(&self, execution: &Execution) -> Result<(), DurableError> {
        self.lock().executions.insert(execution.id.clone(), execution.clone());
        Ok(())
    }

    async fn get_execution(&self, id: &str) -> Result<Option<Execution>, DurableError> {
        Ok(self.lock().executions.get(id).cloned())
    }

    async fn update_execution(&self, execution: &Execution) -> Result<(), DurableError> {
        self.lock().executions.insert(execution.id.clone(), execution.clone());
        Ok(())
    }

    async fn list_incomplete_executions(&self) -> Result<Vec<Execution>, DurableError> {
        Ok(self.lock().executions.values().filter(|e| !e.status.is_terminal()).cloned().collect())
    }

    async fn get_step_result(&self, execution_id: &str, step_id: &str) -> Result<Option<StepResult>, DurableError> {
        Ok(self.lock().step_results.get(&(execution_id.to_string(), step_id.to_string())).cloned())
    }

    async fn save_step_result(&self, result: &StepResult) -> Result<(), DurableError> {
        self.lock()
            .step_results
            .insert((result.execution_id.clone(), result.step_id.clone()), result.clone());
        Ok(())
    }

    async fn list_step_results(&self, execution_id: &str) -> Result<Vec<StepResult>, DurableError> {
        Ok(self.lock().step_results.values().filter(|r| r.execution_id == execution_id).cloned().collect())
    }

    async fn create_timer(&self, timer: &Timer) -> Result<(), DurableError> {
        let mut state = self.lock();
        if state.timers.contains_key(&timer.id) {
            return Err(DurableError::Backend(format!("timer `{}` already exists", timer.id)));
        }
        state.timers.insert(timer.id.clone(), timer.clone());
        Ok(())
    }

    async fn get_ready_timers(&self, now: DateTime<Utc>) -> Result<Vec<Timer>, DurableError> {
        Ok(self
            .lock()
            .timers
            .values()
            .filter(|t| t.status == TimerStatus::Pending && t.fire_at <= now)
            .cloned()
            .collect())
    }

    async fn mark_timer_fired(&self, id: &str) -> Result<(), DurableError> {
        if let Some(timer) = self.lock().timers.get_mut(id) {
            timer.status = TimerStatus::Fired;
        }
        Ok(())
    }

    async fn delete_timer(&self, id: &str) -> Result<(), DurableError> {
        self.lock().timers.remove(id);
        Ok(())
    }

    async fn create_schedule(&self, schedule: &Schedule) -> Result<(), DurableError> {
        self.lock().schedules.insert(schedule.id.clone(), schedule.clone());
        Ok(())
    }

    async fn get_schedule(&self, id: &str) -> Result<Option<Schedule>, DurableError> {
        Ok(self.lock().schedules.get(id).cloned())
    }

    async fn update_schedule(&self, schedule: &Schedule) -> Result<(), DurableError> {
        self.lock().schedules.insert(schedule.id.clone(), schedule.clone());
        Ok(())
    }

    async fn delete_schedule(&self, id: &str) -> Result<(), DurableError> {
        self.lock().schedules.remove(id);
        Ok(())
    }

    async fn list_schedules(&self) -> Result<Vec<Schedule>, DurableError> {
        Ok(self.lock().schedules.values().cloned().collect())
    }

    async fn list_active_schedules(&self) -> Result<Vec<Schedule>, DurableError> {
        Ok(self.lock().schedules.values().filter(|s| s.status == ScheduleStatus::Active).cloned().collect())
    }

    async fn acquire_lock(&self, key: &str) -> Result<bool, DurableError> {
        Ok(self.lock().locks.insert(key.to_string()))
    }

    async fn release_lock(&self, key: &str) -> Result<(), DurableError> {
        self.lock().locks.remove(key);
        Ok(())
    }

    async fn append_audit_entry(&self, entry: &AuditEntry) -> Result<(), DurableError> {
        self.lock().audit.push(entry.clone());
        Ok(())
    }

    async fn list_audit_entries(&self, execution_id: &str) -> Result<Vec<AuditEntry>, DurableError> {
        Ok(self.lock().audit.iter().filter(|a| a.execution_id == execution_id).cloned().collect())
    }

    async fn list_stuck_executions(&self, older_than: DateTime<Utc>) -> Result<Vec<Execution>, DurableError> {
        Ok(self
            .lock()
            .executions
            .values()
            .filter(|e| matches!(e.status, ExecutionStatus::Running) && e.updated_at < older_than)
            .cloned()
            .collect())
    }

    async fn list_dead_letters(&self) -> Result<Vec<Execution>, DurableError> {
        Ok(self.lock().executions.values().filter(|e| e.status == ExecutionStatus::Failed).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn round_trips_an_execution() {
        let store = InMemoryDurableStore::new();
        let execution = Execution::new("exec-1".into(), "task-a".into(), json!({"x": 1}), 3, Utc::now());
        store.save_execution(&execution).await.unwrap();
        let fetched = store.get_execution("exec-1").await.unwrap().unwrap();
        assert_eq!(fetched.task_id, "task-a");
    }

    #[tokio::test]
    async fn lock_is_exclusive_until_released() {
        let store = InMemoryDurableStore::new();
        assert!(store.acquire_lock("k").await.unwrap());
        assert!(!store.acquire_lock("k").await.unwrap());
        store.release_lock("k").await.unwrap();
        assert!(store.acquire_lock("k").await.unwrap());
    }

    #[tokio::test]
    async fn ready_timers_only_include_due_ones() {
        let store = InMemoryDurableStore::new();
        let now = Utc::now();
        store
            .create_timer(&Timer {
                id: "t1".into(),
                execution_id: None,
                schedule_id: None,
                step_id: None,
                task_id: None,
                input: None,
                timer_type: crate::durable::types::TimerType::Sleep,
                fire_at: now - chrono::Duration::seconds(1),
                status: TimerStatus::Pending,
            })
            .await
            .unwrap();
        store
            .create_timer(&Timer {
                id: "t2".into(),
                execution_id: None,
                schedule_id: None,
                step_id: None,
                task_id: None,
                input: None,
                timer_type: crate::durable::types::TimerType::Sleep,
                fire_at: now + chrono::Duration::seconds(60),
                status: TimerStatus::Pending,
            })
            .await
            .unwrap();

        let ready = store.get_ready_timers(now).await.unwrap();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].id, "t1");
    }
}

//! SQLite-backed `DurableStore`.
//!
//! A thin `#[derive(sqlx::FromRow)]` row type per table, hand-written SQL
//! bound positionally, `SqlitePool` cloned cheaply wherever it's needed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::durable::store::{DurableError, DurableStore};
use crate::durable::types::{AuditEntry, Execution, Schedule, StepResult, Timer};

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), DurableError> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS durable_executions (
            id TEXT PRIMARY KEY,
            task_id TEXT NOT NULL,
            input TEXT NOT NULL,
            status TEXT NOT NULL,
            attempt INTEGER NOT NULL,
            max_attempts INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            error TEXT
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS durable_step_results (
            execution_id TEXT NOT NULL,
            step_id TEXT NOT NULL,
            result TEXT NOT NULL,
            completed_at TEXT NOT NULL,
            PRIMARY KEY (execution_id, step_id)
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS durable_timers (
            id TEXT PRIMARY KEY,
            execution_id TEXT,
            schedule_id TEXT,
            step_id TEXT,
            task_id TEXT,
            input TEXT,
            timer_type TEXT NOT NULL,
            fire_at TEXT NOT NULL,
            status TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS durable_schedules (
            id TEXT PRIMARY KEY,
            task_id TEXT NOT NULL,
            input TEXT,
            pattern TEXT NOT NULL,
            schedule_type TEXT NOT NULL,
            status TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            last_run TEXT,
            next_run TEXT
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE TABLE IF NOT EXISTS durable_locks (key TEXT PRIMARY KEY)").execute(pool).await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS durable_audit (
            id TEXT PRIMARY KEY,
            execution_id TEXT NOT NULL,
            attempt INTEGER NOT NULL,
            at TEXT NOT NULL,
            kind TEXT NOT NULL,
            detail TEXT
        )",
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[derive(Clone)]
pub struct SqliteDurableStore {
    pool: SqlitePool,
}

impl SqliteDurableStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ExecutionRow {
    id: String,
    task_id: String,
    input: String,
    status: String,
    attempt: i64,
    max_attempts: i64,
    created_at: String,
    updated_at: String,
    error: Option<String>,
}

fn row_to_execution(row: ExecutionRow) -> Result<Execution, DurableError> {
    Ok(Execution {
        id: row.id,
        task_id: row.task_id,
        input: serde_json::from_str(&row.input).map_err(|e| DurableError::Backend(e.to_string()))?,
        status: serde_json::from_str(&row.status).map_err(|e| DurableError::Backend(e.to_string()))?,
        attempt: row.attempt as u32,
        max_attempts: row.max_attempts as u32,
        created_at: parse_dt(&row.created_at)?,
        updated_at: parse_dt(&row.updated_at)?,
        error: row.error,
    })
}

fn parse_dt(s: &str) -> Result<DateTime<Utc>, DurableError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc)).map_err(|e| DurableError::Backend(e.to_string()))
}

fn to_json_str<T: serde::Serialize>(value: &T) -> Result<String, DurableError> {
    serde_json::to_string(value).map_err(|e| DurableError::Backend(e.to_string()))
}

#[async_trait]
impl DurableStore for SqliteDurableStore {
    async fn save_execution(&self, execution: &Execution) -> Result<(), DurableError> {
        sqlx::query(
            "INSERT INTO durable_executions
             (id, task_id, input, status, attempt, max_attempts, created_at, updated_at, error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(id) DO UPDATE SET
               task_id = excluded.task_id, input = excluded.input, status = excluded.status,
               attempt = excluded.attempt, max_attempts = excluded.max_attempts,
               updated_at = excluded.updated_at, error = excluded.error",
        )
        .bind(&execution.id)
        .bind(&execution.task_id)
        .bind(to_json_str(&execution.input)?)
        .bind(to_json_str(&execution.status)?)
        .bind(i64::from(execution.attempt))
        .bind(i64::from(execution.max_attempts))
        .bind(execution.created_at.to_rfc3339())
        .bind(execution.updated_at.to_rfc3339())
        .bind(&execution.error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_execution(&self, id: &str) -> Result<Option<Execution>, DurableError> {
        let row: Option<ExecutionRow> =
            sqlx::query_as("SELECT * FROM durable_executions WHERE id = ?1").bind(id).fetch_optional(&self.pool).await?;
        row.map(row_to_execution).transpose()
    }

    async fn update_execution(&self, execution: &Execution) -> Result<(), DurableError> {
        self.save_execution(execution).await
    }

    async fn list_incomplete_executions(&self) -> Result<Vec<Execution>, DurableError> {
        let rows: Vec<ExecutionRow> = sqlx::query_as(
            "SELECT * FROM durable_executions WHERE status NOT IN ('\"completed\"', '\"failed\"', '\"compensation_failed\"', '\"cancelled\"')",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_execution).collect()
    }

    async fn get_step_result(&self, execution_id: &str, step_id: &str) -> Result<Option<StepResult>, DurableError> {
        #[derive(sqlx::FromRow)]
        struct Row {
            execution_id: String,
            step_id: String,
            result: String,
            completed_at: String,
        }
        let row: Option<Row> = sqlx::query_as("SELECT * FROM durable_step_results WHERE execution_id = ?1 AND step_id = ?2")
            .bind(execution_id)
            .bind(step_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| {
            Ok(StepResult {
                execution_id: r.execution_id,
                step_id: r.step_id,
                result: serde_json::from_str(&r.result).map_err(|e| DurableError::Backend(e.to_string()))?,
                completed_at: parse_dt(&r.completed_at)?,
            })
        })
        .transpose()
    }

    async fn save_step_result(&self, result: &StepResult) -> Result<(), DurableError> {
        sqlx::query(
            "INSERT INTO durable_step_results (execution_id, step_id, result, completed_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(execution_id, step_id) DO UPDATE SET result = excluded.result, completed_at = excluded.completed_at",
        )
        .bind(&result.execution_id)
        .bind(&result.step_id)
        .bind(to_json_str(&result.result)?)
        .bind(result.completed_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_step_results(&self, execution_id: &str) -> Result<Vec<StepResult>, DurableError> {
        #[derive(sqlx::FromRow)]
        struct Row {
            execution_id: String,
            step_id: String,
            result: String,
            completed_at: String,
        }
        let rows: Vec<Row> = sqlx::query_as("SELECT * FROM durable_step_results WHERE execution_id = ?1")
            .bind(execution_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|r| {
                Ok(StepResult {
                    execution_id: r.execution_id,
                    step_id: r.step_id,
                    result: serde_json::from_str(&r.result).map_err(|e| DurableError::Backend(e.to_string()))?,
                    completed_at: parse_dt(&r.completed_at)?,
                })
            })
            .collect()
    }

    async fn create_timer(&self, timer: &Timer) -> Result<(), DurableError> {
        sqlx::query(
            "INSERT INTO durable_timers
             (id, execution_id, schedule_id, step_id, task_id, input, timer_type, fire_at, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .bind(&timer.id)
        .bind(&timer.execution_id)
        .bind(&timer.schedule_id)
        .bind(&timer.step_id)
        .bind(&timer.task_id)
        .bind(timer.input.as_ref().map(serde_json::to_string).transpose().map_err(|e| DurableError::Backend(e.to_string()))?)
        .bind(to_json_str(&timer.timer_type)?)
        .bind(timer.fire_at.to_rfc3339())
        .bind(to_json_str(&timer.status)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_ready_timers(&self, now: DateTime<Utc>) -> Result<Vec<Timer>, DurableError> {
        #[derive(sqlx::FromRow)]
        struct Row {
            id: String,
            execution_id: Option<String>,
            schedule_id: Option<String>,
            step_id: Option<String>,
            task_id: Option<String>,
            input: Option<String>,
            timer_type: String,
            fire_at: String,
            status: String,
        }
        let rows: Vec<Row> = sqlx::query_as("SELECT * FROM durable_timers WHERE status = '\"pending\"' AND fire_at <= ?1")
            .bind(now.to_rfc3339())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|r| {
                Ok(Timer {
                    id: r.id,
                    execution_id: r.execution_id,
                    schedule_id: r.schedule_id,
                    step_id: r.step_id,
                    task_id: r.task_id,
                    input: r.input.map(|s| serde_json::from_str(&s)).transpose().map_err(|e| DurableError::Backend(e.to_string()))?,
                    timer_type: serde_json::from_str(&r.timer_type).map_err(|e| DurableError::Backend(e.to_string()))?,
                    fire_at: parse_dt(&r.fire_at)?,
                    status: serde_json::from_str(&r.status).map_err(|e| DurableError::Backend(e.to_string()))?,
                })
            })
            .collect()
    }

    async fn mark_timer_fired(&self, id: &str) -> Result<(), DurableError> {
        sqlx::query("UPDATE durable_timers SET status = '\"fired\"' WHERE id = ?1").bind(id).execute(&self.pool).await?;
        Ok(())
    }

    async fn delete_timer(&self, id: &str) -> Result<(), DurableError> {
        sqlx::query("DELETE FROM durable_timers WHERE id = ?1").bind(id).execute(&self.pool).await?;
        Ok(())
    }

    async fn create_schedule(&self, schedule: &Schedule) -> Result<(), DurableError> {
        sqlx::query(
            "INSERT INTO durable_schedules
             (id, task_id, input, pattern, schedule_type, status, created_at, updated_at, last_run, next_run)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )
        .bind(&schedule.id)
        .bind(&schedule.task_id)
        .bind(schedule.input.as_ref().map(serde_json::to_string).transpose().map_err(|e| DurableError::Backend(e.to_string()))?)
        .bind(&schedule.pattern)
        .bind(to_json_str(&schedule.schedule_type)?)
        .bind(to_json_str(&schedule.status)?)
        .bind(schedule.created_at.to_rfc3339())
        .bind(schedule.updated_at.to_rfc3339())
        .bind(schedule.last_run.map(|dt| dt.to_rfc3339()))
        .bind(schedule.next_run.map(|dt| dt.to_rfc3339()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_schedule(&self, id: &str) -> Result<Option<Schedule>, DurableError> {
        self.list_schedules().await.map(|schedules| schedules.into_iter().find(|s| s.id == id))
    }

    async fn update_schedule(&self, schedule: &Schedule) -> Result<(), DurableError> {
        sqlx::query(
            "UPDATE durable_schedules SET
               task_id = ?2, input = ?3, pattern = ?4, schedule_type = ?5, status = ?6,
               updated_at = ?7, last_run = ?8, next_run = ?9
             WHERE id = ?1",
        )
        .bind(&schedule.id)
        .bind(&schedule.task_id)
        .bind(schedule.input.as_ref().map(serde_json::to_string).transpose().map_err(|e| DurableError::Backend(e.to_string()))?)
        .bind(&schedule.pattern)
        .bind(to_json_str(&schedule.schedule_type)?)
        .bind(to_json_str(&schedule.status)?)
        .bind(schedule.updated_at.to_rfc3339())
        .bind(schedule.last_run.map(|dt| dt.to_rfc3339()))
        .bind(schedule.next_run.map(|dt| dt.to_rfc3339()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_schedule(&self, id: &str) -> Result<(), DurableError> {
        sqlx::query("DELETE FROM durable_schedules WHERE id = ?1").bind(id).execute(&self.pool).await?;
        Ok(())
    }

    async fn list_schedules(&self) -> Result<Vec<Schedule>, DurableError> {
        #[derive(sqlx::FromRow)]
        struct Row {
            id: String,
            task_id: String,
            input: Option<String>,
            pattern: String,
            schedule_type: String,
            status: String,
            created_at: String,
            updated_at: String,
            last_run: Option<String>,
            next_run: Option<String>,
        }
        let rows: Vec<Row> = sqlx::query_as("SELECT * FROM durable_schedules").fetch_all(&self.pool).await?;
        rows.into_iter()
            .map(|r| {
                Ok(Schedule {
                    id: r.id,
                    task_id: r.task_id,
                    input: r.input.map(|s| serde_json::from_str(&s)).transpose().map_err(|e| DurableError::Backend(e.to_string()))?,
                    pattern: r.pattern,
                    schedule_type: serde_json::from_str(&r.schedule_type).map_err(|e| DurableError::Backend(e.to_string()))?,
                    status: serde_json::from_str(&r.status).map_err(|e| DurableError::Backend(e.to_string()))?,
                    created_at: parse_dt(&r.created_at)?,
                    updated_at: parse_dt(&r.updated_at)?,
                    last_run: r.last_run.map(|s| parse_dt(&s)).transpose()?,
                    next_run: r.next_run.map(|s| parse_dt(&s)).transpose()?,
                })
            })
            .collect()
    }

    async fn list_active_schedules(&self) -> Result<Vec<Schedule>, DurableError> {
        Ok(self
            .list_schedules()
            .await?
            .into_iter()
            .filter(|s| s.status == crate::durable::types::ScheduleStatus::Active)
            .collect())
    }

    async fn acquire_lock(&self, key: &str) -> Result<bool, DurableError> {
        let result = sqlx::query("INSERT INTO durable_locks (key) VALUES (?1) ON CONFLICT(key) DO NOTHING")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn release_lock(&self, key: &str) -> Result<(), DurableError> {
        sqlx::query("DELETE FROM durable_locks WHERE key = ?1").bind(key).execute(&self.pool).await?;
        Ok(())
    }

    async fn append_audit_entry(&self, entry: &AuditEntry) -> Result<(), DurableError> {
        sqlx::query(
            "INSERT INTO durable_audit (id, execution_id, attempt, at, kind, detail) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&entry.id)
        .bind(&entry.execution_id)
        .bind(i64::from(entry.attempt))
        .bind(entry.at.to_rfc3339())
        .bind(&entry.kind)
        .bind(entry.detail.as_ref().map(serde_json::to_string).transpose().map_err(|e| DurableError::Backend(e.to_string()))?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_audit_entries(&self, execution_id: &str) -> Result<Vec<AuditEntry>, DurableError> {
        #[derive(sqlx::FromRow)]
        struct Row {
            id: String,
            execution_id: String,
            attempt: i64,
            at: String,
            kind: String,
            detail: Option<String>,
        }
        let rows: Vec<Row> = sqlx::query_as("SELECT * FROM durable_audit WHERE execution_id = ?1 ORDER BY at ASC")
            .bind(execution_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|r| {
                Ok(AuditEntry {
                    id: r.id,
                    execution_id: r.execution_id,
                    attempt: r.attempt as u32,
                    at: parse_dt(&r.at)?,
                    kind: r.kind,
                    detail: r.detail.map(|s| serde_json::from_str(&s)).transpose().map_err(|e| DurableError::Backend(e.to_string()))?,
                })
            })
            .collect()
    }

    async fn list_stuck_executions(&self, older_than: DateTime<Utc>) -> Result<Vec<Execution>, DurableError> {
        let rows: Vec<ExecutionRow> = sqlx::query_as("SELECT * FROM durable_executions WHERE status = '\"running\"' AND updated_at < ?1")
            .bind(older_than.to_rfc3339())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(row_to_execution).collect()
    }

    async fn list_dead_letters(&self) -> Result<Vec<Execution>, DurableError> {
        let rows: Vec<ExecutionRow> =
            sqlx::query_as("SELECT * FROM durable_executions WHERE status = '\"failed\"'").fetch_all(&self.pool).await?;
        rows.into_iter().map(row_to_execution).collect()
    }
}

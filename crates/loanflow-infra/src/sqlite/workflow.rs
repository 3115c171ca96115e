//! SQLite workflow repository implementation.
//!
//! Implements `WorkflowRepository` from `loanflow-core` using sqlx with split
//! read/write pools. Runs carry their suspension state inline; step records are
//! keyed by `(run_id, step_name, seq)` and written first-wins.

use loanflow_core::repository::workflow::{CreateRunOutcome, WorkflowRepository};
use loanflow_types::error::RepositoryError;
use loanflow_types::workflow::{RunStatus, StepRecord, Suspension, WorkflowRun};
use sqlx::Row;
use uuid::Uuid;

use super::convert::{format_datetime, parse_datetime, parse_json, parse_uuid, query_err, to_json};
use super::pool::DatabasePool;

const RUN_COLUMNS: &str = "id, workflow_name, status, input, output, error, \
    suspend_seq, suspend_topic, suspend_deadline, created_at, updated_at";

/// SQLite-backed implementation of `WorkflowRepository`.
#[derive(Clone)]
pub struct SqliteWorkflowRepository {
    pool: DatabasePool,
}

impl SqliteWorkflowRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Explain why a guarded update touched no rows.
    async fn rejected_update(&self, run_id: &Uuid, target: &str) -> RepositoryError {
        let row = sqlx::query("SELECT status FROM workflow_runs WHERE id = ?")
            .bind(run_id.to_string())
            .fetch_optional(&self.pool.writer)
            .await;
        match row {
            Ok(None) => RepositoryError::NotFound,
            Ok(Some(row)) => {
                let status: String = row.try_get("status").unwrap_or_default();
                RepositoryError::InvalidTransition(format!(
                    "run {run_id} is {status}, cannot move to {target}"
                ))
            }
            Err(e) => query_err(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Internal row types
// ---------------------------------------------------------------------------

struct WorkflowRunRow {
    id: String,
    workflow_name: String,
    status: String,
    input: String,
    output: Option<String>,
    error: Option<String>,
    suspend_seq: Option<i64>,
    suspend_topic: Option<String>,
    suspend_deadline: Option<String>,
    created_at: String,
    updated_at: String,
}

impl WorkflowRunRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            workflow_name: row.try_get("workflow_name")?,
            status: row.try_get("status")?,
            input: row.try_get("input")?,
            output: row.try_get("output")?,
            error: row.try_get("error")?,
            suspend_seq: row.try_get("suspend_seq")?,
            suspend_topic: row.try_get("suspend_topic")?,
            suspend_deadline: row.try_get("suspend_deadline")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_run(self) -> Result<WorkflowRun, RepositoryError> {
        let status: RunStatus = self.status.parse().map_err(RepositoryError::Query)?;
        let output = self
            .output
            .as_deref()
            .map(|s| parse_json(s, "output"))
            .transpose()?;

        // All three columns are written together; a partial set is treated as no suspension.
        let suspension = match (self.suspend_seq, self.suspend_topic, self.suspend_deadline) {
            (Some(seq), Some(topic), Some(deadline)) => Some(Suspension {
                seq: u32::try_from(seq)
                    .map_err(|_| RepositoryError::Query(format!("invalid suspend_seq: {seq}")))?,
                topic,
                deadline: parse_datetime(&deadline)?,
            }),
            _ => None,
        };

        Ok(WorkflowRun {
            id: parse_uuid(&self.id)?,
            workflow_name: self.workflow_name,
            status,
            input: parse_json(&self.input, "input")?,
            output,
            error: self.error,
            suspension,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

struct StepRecordRow {
    run_id: String,
    step_name: String,
    seq: i64,
    output: String,
    completed_at: String,
}

impl StepRecordRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            run_id: row.try_get("run_id")?,
            step_name: row.try_get("step_name")?,
            seq: row.try_get("seq")?,
            output: row.try_get("output")?,
            completed_at: row.try_get("completed_at")?,
        })
    }

    fn into_record(self) -> Result<StepRecord, RepositoryError> {
        Ok(StepRecord {
            run_id: parse_uuid(&self.run_id)?,
            step_name: self.step_name,
            seq: u32::try_from(self.seq)
                .map_err(|_| RepositoryError::Query(format!("invalid step seq: {}", self.seq)))?,
            output: parse_json(&self.output, "step output")?,
            completed_at: parse_datetime(&self.completed_at)?,
        })
    }
}

fn run_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<WorkflowRun, RepositoryError> {
    WorkflowRunRow::from_row(row).map_err(query_err)?.into_run()
}

fn record_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<StepRecord, RepositoryError> {
    StepRecordRow::from_row(row).map_err(query_err)?.into_record()
}

// ---------------------------------------------------------------------------
// WorkflowRepository implementation
// ---------------------------------------------------------------------------

impl WorkflowRepository for SqliteWorkflowRepository {
    async fn create_run(&self, run: &WorkflowRun) -> Result<CreateRunOutcome, RepositoryError> {
        let result = sqlx::query(
            r#"INSERT INTO workflow_runs (id, workflow_name, status, input, output, error,
                   suspend_seq, suspend_topic, suspend_deadline, created_at, updated_at)
               VALUES (?, ?, ?, ?, NULL, NULL, NULL, NULL, NULL, ?, ?)
               ON CONFLICT(id) DO NOTHING"#,
        )
        .bind(run.id.to_string())
        .bind(&run.workflow_name)
        .bind(run.status.as_str())
        .bind(to_json(&run.input)?)
        .bind(format_datetime(&run.created_at))
        .bind(format_datetime(&run.updated_at))
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        if result.rows_affected() > 0 {
            return Ok(CreateRunOutcome::Created);
        }

        let sql = format!("SELECT {RUN_COLUMNS} FROM workflow_runs WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(run.id.to_string())
            .fetch_one(&self.pool.writer)
            .await
            .map_err(query_err)?;
        Ok(CreateRunOutcome::Existing(run_from_row(&row)?))
    }

    async fn get_run(&self, run_id: &Uuid) -> Result<Option<WorkflowRun>, RepositoryError> {
        let sql = format!("SELECT {RUN_COLUMNS} FROM workflow_runs WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(run_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(query_err)?;

        row.as_ref().map(run_from_row).transpose()
    }

    async fn update_run_status(
        &self,
        run_id: &Uuid,
        status: RunStatus,
        output: Option<&serde_json::Value>,
        error: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let output = output.map(to_json).transpose()?;
        let terminal = status.is_terminal();

        let result = sqlx::query(
            r#"UPDATE workflow_runs
               SET status = ?,
                   output = COALESCE(?, output),
                   error = COALESCE(?, error),
                   suspend_seq = CASE WHEN ? THEN NULL ELSE suspend_seq END,
                   suspend_topic = CASE WHEN ? THEN NULL ELSE suspend_topic END,
                   suspend_deadline = CASE WHEN ? THEN NULL ELSE suspend_deadline END,
                   updated_at = ?
               WHERE id = ? AND status NOT IN ('succeeded', 'failed')"#,
        )
        .bind(status.as_str())
        .bind(output)
        .bind(error)
        .bind(terminal)
        .bind(terminal)
        .bind(terminal)
        .bind(format_datetime(&chrono::Utc::now()))
        .bind(run_id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        if result.rows_affected() == 0 {
            return Err(self.rejected_update(run_id, status.as_str()).await);
        }
        Ok(())
    }

    async fn suspend_run(
        &self,
        run_id: &Uuid,
        suspension: &Suspension,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"UPDATE workflow_runs
               SET status = 'suspended_on_recv', suspend_seq = ?, suspend_topic = ?,
                   suspend_deadline = ?, updated_at = ?
               WHERE id = ? AND status NOT IN ('succeeded', 'failed')"#,
        )
        .bind(i64::from(suspension.seq))
        .bind(&suspension.topic)
        .bind(format_datetime(&suspension.deadline))
        .bind(format_datetime(&chrono::Utc::now()))
        .bind(run_id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        if result.rows_affected() == 0 {
            return Err(self
                .rejected_update(run_id, RunStatus::SuspendedOnRecv.as_str())
                .await);
        }
        Ok(())
    }

    async fn clear_suspension(&self, run_id: &Uuid) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"UPDATE workflow_runs
               SET status = 'running', suspend_seq = NULL, suspend_topic = NULL,
                   suspend_deadline = NULL, updated_at = ?
               WHERE id = ? AND status NOT IN ('succeeded', 'failed')"#,
        )
        .bind(format_datetime(&chrono::Utc::now()))
        .bind(run_id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        if result.rows_affected() == 0 {
            return Err(self.rejected_update(run_id, RunStatus::Running.as_str()).await);
        }
        Ok(())
    }

    async fn list_incomplete_runs(&self) -> Result<Vec<WorkflowRun>, RepositoryError> {
        let sql = format!(
            "SELECT {RUN_COLUMNS} FROM workflow_runs \
             WHERE status NOT IN ('succeeded', 'failed') ORDER BY created_at ASC"
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_err)?;

        rows.iter().map(run_from_row).collect()
    }

    async fn list_runs(&self, limit: u32) -> Result<Vec<WorkflowRun>, RepositoryError> {
        let sql = format!("SELECT {RUN_COLUMNS} FROM workflow_runs ORDER BY created_at DESC LIMIT ?");
        let rows = sqlx::query(&sql)
            .bind(i64::from(limit))
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_err)?;

        rows.iter().map(run_from_row).collect()
    }

    async fn put_step_result(&self, record: &StepRecord) -> Result<StepRecord, RepositoryError> {
        sqlx::query(
            r#"INSERT INTO step_records (run_id, step_name, seq, output, completed_at)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT(run_id, step_name, seq) DO NOTHING"#,
        )
        .bind(record.run_id.to_string())
        .bind(&record.step_name)
        .bind(i64::from(record.seq))
        .bind(to_json(&record.output)?)
        .bind(format_datetime(&record.completed_at))
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        // Read back through the writer so the first stored record wins.
        let row = sqlx::query(
            "SELECT run_id, step_name, seq, output, completed_at FROM step_records \
             WHERE run_id = ? AND step_name = ? AND seq = ?",
        )
        .bind(record.run_id.to_string())
        .bind(&record.step_name)
        .bind(i64::from(record.seq))
        .fetch_one(&self.pool.writer)
        .await
        .map_err(query_err)?;

        record_from_row(&row)
    }

    async fn get_step_result(
        &self,
        run_id: &Uuid,
        step_name: &str,
        seq: u32,
    ) -> Result<Option<StepRecord>, RepositoryError> {
        let row = sqlx::query(
            "SELECT run_id, step_name, seq, output, completed_at FROM step_records \
             WHERE run_id = ? AND step_name = ? AND seq = ?",
        )
        .bind(run_id.to_string())
        .bind(step_name)
        .bind(i64::from(seq))
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(query_err)?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn list_step_records(&self, run_id: &Uuid) -> Result<Vec<StepRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT run_id, step_name, seq, output, completed_at FROM step_records \
             WHERE run_id = ? ORDER BY seq ASC",
        )
        .bind(run_id.to_string())
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_err)?;

        rows.iter().map(record_from_row).collect()
    }
}

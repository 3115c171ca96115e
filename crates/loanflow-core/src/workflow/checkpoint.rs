//! Durable checkpoint manager for workflow execution state.
//!
//! Wraps the workflow repository to provide a higher-level API for recording
//! run transitions and step results. Every transition is persisted before the
//! engine moves forward, so a crashed run can resume from its last completed
//! step.

use std::time::Duration;

use chrono::Utc;
use loanflow_types::error::RepositoryError;
use loanflow_types::workflow::{RunStatus, StepKey, StepRecord, Suspension, WorkflowRun};
use serde_json::Value;
use uuid::Uuid;

use super::store::BoxWorkflowRepository;
use crate::repository::workflow::CreateRunOutcome;

// ---------------------------------------------------------------------------
// CheckpointManager
// ---------------------------------------------------------------------------

/// Manages durable execution checkpoints for workflow runs.
///
/// Enforces the forward-only run state machine before any write reaches
/// the store; the store additionally refuses writes to terminal runs.
pub struct CheckpointManager {
    repo: BoxWorkflowRepository,
}

impl CheckpointManager {
    /// Create a new checkpoint manager backed by the given repository.
    pub fn new(repo: BoxWorkflowRepository) -> Self {
        Self { repo }
    }

    // -----------------------------------------------------------------------
    // Run-level checkpoints
    // -----------------------------------------------------------------------

    /// Create a run, or return the existing one when the same run ID was
    /// already started with the same workflow and input.
    pub async fn create_run(&self, run: &WorkflowRun) -> Result<WorkflowRun, CheckpointError> {
        match self.repo.create_run(run).await.map_err(repo_err)? {
            CreateRunOutcome::Created => {
                tracing::debug!(
                    run_id = %run.id,
                    workflow = %run.workflow_name,
                    "checkpointed new run"
                );
                Ok(run.clone())
            }
            CreateRunOutcome::Existing(existing) => {
                if existing.workflow_name != run.workflow_name || existing.input != run.input {
                    return Err(CheckpointError::DuplicateRun(run.id));
                }
                tracing::debug!(
                    run_id = %run.id,
                    status = %existing.status,
                    "run already exists, reusing"
                );
                Ok(existing)
            }
        }
    }

    pub async fn get_run(&self, run_id: Uuid) -> Result<Option<WorkflowRun>, CheckpointError> {
        self.repo.get_run(&run_id).await.map_err(repo_err)
    }

    /// Like [`get_run`](Self::get_run), failing with `RunNotFound` when absent.
    pub async fn require_run(&self, run_id: Uuid) -> Result<WorkflowRun, CheckpointError> {
        self.get_run(run_id)
            .await?
            .ok_or(CheckpointError::RunNotFound(run_id))
    }

    /// Mark a run `Running` at the start of an execution attempt.
    ///
    /// A stored suspension is kept so that a resumed receive re-enters the
    /// same wait.
    pub async fn mark_running(&self, run_id: Uuid) -> Result<(), CheckpointError> {
        self.transition(run_id, RunStatus::Running, None, None).await
    }

    /// Mark a run `Succeeded` with its final output.
    pub async fn mark_succeeded(&self, run_id: Uuid, output: &Value) -> Result<(), CheckpointError> {
        self.transition(run_id, RunStatus::Succeeded, Some(output), None)
            .await
    }

    /// Mark a run `Failed` with an error message.
    pub async fn mark_failed(&self, run_id: Uuid, error: &str) -> Result<(), CheckpointError> {
        self.transition(run_id, RunStatus::Failed, None, Some(error))
            .await
    }

    async fn transition(
        &self,
        run_id: Uuid,
        next: RunStatus,
        output: Option<&Value>,
        error: Option<&str>,
    ) -> Result<(), CheckpointError> {
        let run = self.require_run(run_id).await?;
        if !run.status.can_transition_to(next) {
            return Err(CheckpointError::InvalidTransition {
                run_id,
                from: run.status,
                to: next,
            });
        }

        self.repo
            .update_run_status(&run_id, next, output, error)
            .await
            .map_err(repo_err)?;

        tracing::debug!(
            run_id = %run_id,
            from = %run.status,
            to = %next,
            "checkpointed run status"
        );
        Ok(())
    }

    /// Persist `SuspendedOnRecv` for the receive `(seq, topic)`.
    ///
    /// When the run already carries a suspension for the same receive (a
    /// resumed wait), its original deadline is kept. Otherwise the deadline
    /// is `now + timeout`.
    pub async fn suspend(
        &self,
        run_id: Uuid,
        seq: u32,
        topic: &str,
        timeout: Duration,
    ) -> Result<Suspension, CheckpointError> {
        let run = self.require_run(run_id).await?;
        if !run.status.can_transition_to(RunStatus::SuspendedOnRecv) {
            return Err(CheckpointError::InvalidTransition {
                run_id,
                from: run.status,
                to: RunStatus::SuspendedOnRecv,
            });
        }

        let suspension = match run.suspension {
            Some(existing) if existing.seq == seq && existing.topic == topic => existing,
            _ => {
                let delta = chrono::Duration::from_std(timeout)
                    .map_err(|_| CheckpointError::InvalidDeadline(timeout))?;
                let deadline = Utc::now()
                    .checked_add_signed(delta)
                    .ok_or(CheckpointError::InvalidDeadline(timeout))?;
                Suspension {
                    seq,
                    topic: topic.to_string(),
                    deadline,
                }
            }
        };

        self.repo
            .suspend_run(&run_id, &suspension)
            .await
            .map_err(repo_err)?;

        tracing::debug!(
            run_id = %run_id,
            seq,
            topic,
            deadline = %suspension.deadline,
            "checkpointed suspension"
        );
        Ok(suspension)
    }

    /// Drop the wait state after a receive completes and mark the run `Running`.
    pub async fn resume(&self, run_id: Uuid) -> Result<(), CheckpointError> {
        self.repo
            .clear_suspension(&run_id)
            .await
            .map_err(repo_err)?;
        tracing::debug!(run_id = %run_id, "cleared suspension");
        Ok(())
    }

    pub async fn list_incomplete_runs(&self) -> Result<Vec<WorkflowRun>, CheckpointError> {
        self.repo.list_incomplete_runs().await.map_err(repo_err)
    }

    pub async fn list_runs(&self, limit: u32) -> Result<Vec<WorkflowRun>, CheckpointError> {
        self.repo.list_runs(limit).await.map_err(repo_err)
    }

    // -----------------------------------------------------------------------
    // Step-level checkpoints
    // -----------------------------------------------------------------------

    /// Look up the checkpointed result of a step, if it completed before.
    pub async fn lookup_step(&self, key: &StepKey) -> Result<Option<StepRecord>, CheckpointError> {
        self.repo
            .get_step_result(&key.run_id, &key.step_name, key.seq)
            .await
            .map_err(repo_err)
    }

    /// Persist a completed step and return the record actually stored.
    ///
    /// If another attempt already wrote the same key, the earlier record
    /// wins and is returned.
    pub async fn record_step(&self, record: &StepRecord) -> Result<StepRecord, CheckpointError> {
        let stored = self.repo.put_step_result(record).await.map_err(repo_err)?;
        tracing::debug!(
            run_id = %stored.run_id,
            step = %stored.step_name,
            seq = stored.seq,
            "checkpointed step result"
        );
        Ok(stored)
    }

    /// All step records of a run, in sequence order.
    pub async fn list_steps(&self, run_id: Uuid) -> Result<Vec<StepRecord>, CheckpointError> {
        self.repo.list_step_records(&run_id).await.map_err(repo_err)
    }
}

fn repo_err(err: RepositoryError) -> CheckpointError {
    CheckpointError::from(err)
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur during checkpoint operations.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// Underlying repository operation failed.
    #[error("checkpoint repository error: {0}")]
    Repository(String),

    #[error("workflow run not found: {0}")]
    RunNotFound(Uuid),

    /// Same run ID, different workflow or input.
    #[error("workflow run {0} already exists with different input")]
    DuplicateRun(Uuid),

    #[error("invalid status transition for run {run_id}: {from} -> {to}")]
    InvalidTransition {
        run_id: Uuid,
        from: RunStatus,
        to: RunStatus,
    },

    #[error("receive timeout {0:?} is out of range")]
    InvalidDeadline(Duration),
}

impl From<RepositoryError> for CheckpointError {
    fn from(err: RepositoryError) -> Self {
        CheckpointError::Repository(err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemoryWorkflowRepository;
    use serde_json::json;

    fn manager() -> CheckpointManager {
        CheckpointManager::new(BoxWorkflowRepository::new(
            InMemoryWorkflowRepository::default(),
        ))
    }

    #[test]
    fn checkpoint_error_display() {
        let err = CheckpointError::Repository("connection lost".to_string());
        assert!(err.to_string().contains("connection lost"));

        let err = CheckpointError::RunNotFound(Uuid::nil());
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn create_run_is_idempotent_for_same_input() {
        let cp = manager();
        let run = WorkflowRun::new(Uuid::now_v7(), "loan-process", json!({"a": 1}));

        cp.create_run(&run).await.unwrap();
        let again = cp.create_run(&run).await.unwrap();
        assert_eq!(again.id, run.id);

        let different = WorkflowRun::new(run.id, "loan-process", json!({"a": 2}));
        let err = cp.create_run(&different).await.unwrap_err();
        assert!(matches!(err, CheckpointError::DuplicateRun(id) if id == run.id));
    }

    #[tokio::test]
    async fn terminal_runs_reject_further_transitions() {
        let cp = manager();
        let run = WorkflowRun::new(Uuid::now_v7(), "wf", json!(null));
        cp.create_run(&run).await.unwrap();

        cp.mark_running(run.id).await.unwrap();
        cp.mark_succeeded(run.id, &json!("done")).await.unwrap();

        let err = cp.mark_failed(run.id, "late").await.unwrap_err();
        assert!(matches!(err, CheckpointError::InvalidTransition { .. }));

        let stored = cp.require_run(run.id).await.unwrap();
        assert_eq!(stored.status, RunStatus::Succeeded);
        assert_eq!(stored.output, Some(json!("done")));
    }

    #[tokio::test]
    async fn suspension_keeps_original_deadline_for_same_receive() {
        let cp = manager();
        let run = WorkflowRun::new(Uuid::now_v7(), "wf", json!(null));
        cp.create_run(&run).await.unwrap();
        cp.mark_running(run.id).await.unwrap();

        let first = cp
            .suspend(run.id, 3, "review-request", Duration::from_secs(60))
            .await
            .unwrap();

        // Simulate a restart: the attempt marks the run running again.
        cp.mark_running(run.id).await.unwrap();
        let second = cp
            .suspend(run.id, 3, "review-request", Duration::from_secs(600))
            .await
            .unwrap();
        assert_eq!(first.deadline, second.deadline);

        cp.resume(run.id).await.unwrap();
        let stored = cp.require_run(run.id).await.unwrap();
        assert_eq!(stored.status, RunStatus::Running);
        assert!(stored.suspension.is_none());
    }

    #[tokio::test]
    async fn record_step_keeps_first_write() {
        let cp = manager();
        let key = StepKey::new(Uuid::now_v7(), "creditCheck", 0);

        cp.record_step(&StepRecord::new(&key, json!(1))).await.unwrap();
        let stored = cp.record_step(&StepRecord::new(&key, json!(2))).await.unwrap();
        assert_eq!(stored.output, json!(1));

        let found = cp.lookup_step(&key).await.unwrap().unwrap();
        assert_eq!(found.output, json!(1));
    }
}

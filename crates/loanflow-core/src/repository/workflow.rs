//! Workflow repository trait definition.
//!
//! Defines the storage interface for execution runs and checkpointed step
//! records. The infrastructure layer (loanflow-infra) implements this trait
//! with SQLite persistence.

use loanflow_types::error::RepositoryError;
use loanflow_types::workflow::{RunStatus, StepRecord, Suspension, WorkflowRun};
use uuid::Uuid;

/// Result of an idempotent run insert.
#[derive(Debug, Clone)]
pub enum CreateRunOutcome {
    /// The run did not exist and was inserted.
    Created,
    /// A run with the same ID already existed; the stored row is returned
    /// untouched.
    Existing(WorkflowRun),
}

/// Repository trait for workflow persistence.
///
/// Covers two entity families:
/// - **Runs:** Create/update/query workflow execution instances.
/// - **Step records:** Write-once checkpoints of completed steps.
///
/// Every write must be durable before the returned future resolves. Writes
/// to terminal runs are rejected with `RepositoryError::InvalidTransition`.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait WorkflowRepository: Send + Sync {
    // -----------------------------------------------------------------------
    // Runs
    // -----------------------------------------------------------------------

    /// Insert a run unless one with the same ID exists.
    fn create_run(
        &self,
        run: &WorkflowRun,
    ) -> impl std::future::Future<Output = Result<CreateRunOutcome, RepositoryError>> + Send;

    /// Get a workflow run by its UUID.
    fn get_run(
        &self,
        run_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<WorkflowRun>, RepositoryError>> + Send;

    /// Update a run's status and, for terminal statuses, its output or error.
    ///
    /// A terminal status clears any stored suspension.
    fn update_run_status(
        &self,
        run_id: &Uuid,
        status: RunStatus,
        output: Option<&serde_json::Value>,
        error: Option<&str>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Mark a run `SuspendedOnRecv` and store its wait state.
    fn suspend_run(
        &self,
        run_id: &Uuid,
        suspension: &Suspension,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Drop a run's wait state and mark it `Running` again.
    fn clear_suspension(
        &self,
        run_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// List runs that have not reached a terminal status, oldest first.
    fn list_incomplete_runs(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<WorkflowRun>, RepositoryError>> + Send;

    /// List the most recent runs, newest first.
    fn list_runs(
        &self,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<WorkflowRun>, RepositoryError>> + Send;

    // -----------------------------------------------------------------------
    // Step records
    // -----------------------------------------------------------------------

    /// Insert a step record unless its key already exists.
    ///
    /// Returns the record actually stored under the key, which is the
    /// earlier record when the key was already present.
    fn put_step_result(
        &self,
        record: &StepRecord,
    ) -> impl std::future::Future<Output = Result<StepRecord, RepositoryError>> + Send;

    /// Look up a step record by `(run_id, step_name, seq)`.
    fn get_step_result(
        &self,
        run_id: &Uuid,
        step_name: &str,
        seq: u32,
    ) -> impl std::future::Future<Output = Result<Option<StepRecord>, RepositoryError>> + Send;

    /// List all step records of a run, ordered by sequence number.
    fn list_step_records(
        &self,
        run_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<StepRecord>, RepositoryError>> + Send;
}

//! Engine error taxonomy.

use uuid::Uuid;

use super::checkpoint::CheckpointError;

/// The error a step function returned, kept intact for the workflow.
pub type StepError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by the workflow runtime, step executor, and mailbox.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// A run with this ID already exists with a different workflow or input.
    #[error("workflow run {0} already exists with different input")]
    DuplicateRun(Uuid),

    #[error("no workflow registered under '{0}'")]
    UnknownWorkflow(String),

    #[error("workflow '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("workflow run not found: {0}")]
    RunNotFound(Uuid),

    /// The step function failed on every allowed attempt. Never checkpointed.
    ///
    /// `source` is the step's own error; workflow code recovers the typed
    /// value with `downcast_ref`.
    #[error("step '{step}' failed after {attempts} attempt(s): {source}")]
    Step {
        step: String,
        attempts: u32,
        #[source]
        source: StepError,
    },

    #[error("invalid status transition for run {run_id}: {from} -> {to}")]
    InvalidTransition {
        run_id: Uuid,
        from: String,
        to: String,
    },

    /// The checkpoint store failed. Fatal to the current attempt only.
    #[error("persistence error: {0}")]
    Persistence(CheckpointError),

    #[error("serialization error: {0}")]
    Serialization(String),

    /// The run reached `Failed`; carries the stored error message.
    #[error("workflow failed: {0}")]
    Failed(String),

    /// The current attempt of a run was aborted without a terminal status.
    #[error("workflow attempt aborted: {0}")]
    Aborted(String),

    #[error("timed out waiting for result of run {0}")]
    ResultTimeout(Uuid),

    /// The runtime shut down while the run was executing.
    #[error("workflow runtime is shutting down")]
    Interrupted,
}

impl WorkflowError {
    /// Whether this error aborts the attempt but leaves the run resumable.
    pub fn aborts_attempt(&self) -> bool {
        matches!(
            self,
            WorkflowError::Persistence(_) | WorkflowError::Interrupted
        )
    }
}

impl From<CheckpointError> for WorkflowError {
    fn from(err: CheckpointError) -> Self {
        match err {
            CheckpointError::RunNotFound(id) => WorkflowError::RunNotFound(id),
            CheckpointError::DuplicateRun(id) => WorkflowError::DuplicateRun(id),
            CheckpointError::InvalidTransition { run_id, from, to } => {
                WorkflowError::InvalidTransition {
                    run_id,
                    from: from.to_string(),
                    to: to.to_string(),
                }
            }
            other => WorkflowError::Persistence(other),
        }
    }
}

impl From<serde_json::Error> for WorkflowError {
    fn from(err: serde_json::Error) -> Self {
        WorkflowError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkpoint_errors_map_to_specific_variants() {
        let id = Uuid::now_v7();
        assert!(matches!(
            WorkflowError::from(CheckpointError::DuplicateRun(id)),
            WorkflowError::DuplicateRun(x) if x == id
        ));
        assert!(matches!(
            WorkflowError::from(CheckpointError::RunNotFound(id)),
            WorkflowError::RunNotFound(_)
        ));

        let err = WorkflowError::from(CheckpointError::Repository("disk full".into()));
        assert!(err.aborts_attempt());
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn step_error_display() {
        let err = WorkflowError::Step {
            step: "creditCheck".into(),
            attempts: 3,
            source: "bureau offline".into(),
        };
        assert_eq!(
            err.to_string(),
            "step 'creditCheck' failed after 3 attempt(s): bureau offline"
        );
        assert!(!err.aborts_attempt());
        assert_eq!(
            std::error::Error::source(&err).map(|s| s.to_string()),
            Some("bureau offline".to_string())
        );
    }
}

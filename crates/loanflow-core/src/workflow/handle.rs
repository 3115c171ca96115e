//! Result handles for workflow runs.

use std::sync::Arc;
use std::time::Duration;

use loanflow_types::workflow::{RunStatus, WorkflowRun};
use serde::de::DeserializeOwned;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;
use uuid::Uuid;

use super::checkpoint::CheckpointManager;
use super::error::WorkflowError;
use super::events::{RunEvent, RunEventBus};

/// Handle to a run started in this or another process.
///
/// Any number of handles may observe the same run; all of them see the same
/// terminal result because it is read back from the store.
#[derive(Clone)]
pub struct WorkflowHandle {
    run_id: Uuid,
    checkpoint: Arc<CheckpointManager>,
    events: RunEventBus,
    poll_interval: Duration,
}

impl WorkflowHandle {
    pub(crate) fn new(
        run_id: Uuid,
        checkpoint: Arc<CheckpointManager>,
        events: RunEventBus,
        poll_interval: Duration,
    ) -> Self {
        Self {
            run_id,
            checkpoint,
            events,
            poll_interval,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub async fn status(&self) -> Result<RunStatus, WorkflowError> {
        Ok(self.checkpoint.require_run(self.run_id).await?.status)
    }

    /// Wait for the run to reach a terminal status and decode its output.
    ///
    /// `None` waits indefinitely. A `Failed` run yields `WorkflowError::Failed`
    /// with the stored message; an aborted attempt in this process yields
    /// `WorkflowError::Aborted`.
    pub async fn get_result<O: DeserializeOwned>(
        &self,
        timeout: Option<Duration>,
    ) -> Result<O, WorkflowError> {
        let mut events = self.events.subscribe();
        let deadline = timeout.map(|t| Instant::now() + t);

        loop {
            let run = self.checkpoint.require_run(self.run_id).await?;
            if let Some(result) = terminal_result(&run) {
                return result;
            }

            let mut wait = self.poll_interval;
            if let Some(deadline) = deadline {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Err(WorkflowError::ResultTimeout(self.run_id));
                }
                wait = wait.min(remaining);
            }

            tokio::select! {
                event = events.recv() => match event {
                    Ok(RunEvent::AttemptAborted { run_id, error }) if run_id == self.run_id => {
                        return Err(WorkflowError::Aborted(error));
                    }
                    Ok(_) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => tokio::time::sleep(wait).await,
                },
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }
}

fn terminal_result<O: DeserializeOwned>(run: &WorkflowRun) -> Option<Result<O, WorkflowError>> {
    match run.status {
        RunStatus::Succeeded => {
            let output = run.output.clone().unwrap_or(serde_json::Value::Null);
            Some(serde_json::from_value(output).map_err(WorkflowError::from))
        }
        RunStatus::Failed => Some(Err(WorkflowError::Failed(
            run.error.clone().unwrap_or_else(|| "unknown error".to_string()),
        ))),
        _ => None,
    }
}

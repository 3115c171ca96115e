//! The workflow runtime: start, resume, and drive registered workflows.
//!
//! Each run executes on its own tokio task. Within one process a run is
//! driven by at most one task at a time; across processes the idempotent
//! checkpoint contract makes a double start harmless.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashSet;
use loanflow_types::config::EngineSettings;
use loanflow_types::message::Message;
use loanflow_types::workflow::{RunStatus, StepRecord, WorkflowRun};
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::checkpoint::CheckpointManager;
use super::context::WorkflowContext;
use super::error::WorkflowError;
use super::events::{RunEvent, RunEventBus};
use super::handle::WorkflowHandle;
use super::mailbox::Mailbox;
use super::registry::{ErasedWorkflow, WorkflowRegistry};
use super::step::StepExecutor;
use super::store::{BoxMessageRepository, BoxWorkflowRepository};
use crate::repository::message::MessageRepository;
use crate::repository::workflow::WorkflowRepository;

/// Polling cadence for the runtime.
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    /// How often a suspended receive re-checks the store.
    pub recv_poll_interval: Duration,
    /// How often a result handle re-checks the store.
    pub result_poll_interval: Duration,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self::from(&EngineSettings::default())
    }
}

impl From<&EngineSettings> for RuntimeOptions {
    fn from(settings: &EngineSettings) -> Self {
        Self {
            recv_poll_interval: Duration::from_millis(settings.recv_poll_interval_ms),
            result_poll_interval: Duration::from_millis(settings.result_poll_interval_ms),
        }
    }
}

/// Cheaply cloneable entry point to the engine.
#[derive(Clone)]
pub struct WorkflowRuntime {
    inner: Arc<RuntimeInner>,
}

struct RuntimeInner {
    registry: WorkflowRegistry,
    checkpoint: Arc<CheckpointManager>,
    steps: StepExecutor,
    mailbox: Arc<Mailbox>,
    events: RunEventBus,
    active: DashSet<Uuid>,
    cancel: CancellationToken,
    options: RuntimeOptions,
}

/// Removes a run from the active set when its task ends, panics included.
struct ActiveGuard {
    runtime: Arc<RuntimeInner>,
    run_id: Uuid,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.runtime.active.remove(&self.run_id);
    }
}

impl WorkflowRuntime {
    pub fn new<W, M>(
        registry: WorkflowRegistry,
        runs: W,
        messages: M,
        options: RuntimeOptions,
    ) -> Self
    where
        W: WorkflowRepository + 'static,
        M: MessageRepository + 'static,
    {
        let cancel = CancellationToken::new();
        let events = RunEventBus::default();
        let checkpoint = Arc::new(CheckpointManager::new(BoxWorkflowRepository::new(runs)));
        let steps = StepExecutor::new(checkpoint.clone(), cancel.clone());
        let mailbox = Arc::new(Mailbox::new(
            BoxMessageRepository::new(messages),
            checkpoint.clone(),
            events.clone(),
            options.recv_poll_interval,
            cancel.clone(),
        ));

        Self {
            inner: Arc::new(RuntimeInner {
                registry,
                checkpoint,
                steps,
                mailbox,
                events,
                active: DashSet::new(),
                cancel,
                options,
            }),
        }
    }

    pub fn registry(&self) -> &WorkflowRegistry {
        &self.inner.registry
    }

    /// Start a new run of `workflow_name` under a fresh UUIDv7.
    pub async fn start<I: Serialize>(
        &self,
        workflow_name: &str,
        input: &I,
    ) -> Result<WorkflowHandle, WorkflowError> {
        self.start_with_id(Uuid::now_v7(), workflow_name, input).await
    }

    /// Start a run under a caller-chosen ID.
    ///
    /// Starting an existing ID with the same workflow and input returns a
    /// handle to that run (resuming it if it is incomplete and not already
    /// executing here). A different input fails with `DuplicateRun`.
    pub async fn start_with_id<I: Serialize>(
        &self,
        run_id: Uuid,
        workflow_name: &str,
        input: &I,
    ) -> Result<WorkflowHandle, WorkflowError> {
        let workflow = self
            .inner
            .registry
            .get(workflow_name)
            .ok_or_else(|| WorkflowError::UnknownWorkflow(workflow_name.to_string()))?;

        let run = WorkflowRun::new(run_id, workflow_name, serde_json::to_value(input)?);
        let stored = self.inner.checkpoint.create_run(&run).await?;

        if !stored.status.is_terminal() {
            self.spawn_run(stored, workflow);
        }
        Ok(self.handle(run_id))
    }

    /// Deliver a message to a run's mailbox from outside any workflow.
    pub async fn send<T: Serialize>(
        &self,
        destination_run_id: Uuid,
        topic: &str,
        payload: &T,
    ) -> Result<Message, WorkflowError> {
        self.inner
            .mailbox
            .send(destination_run_id, topic, serde_json::to_value(payload)?)
            .await
    }

    /// Handle for an existing run. The run's existence is checked lazily.
    pub fn handle(&self, run_id: Uuid) -> WorkflowHandle {
        WorkflowHandle::new(
            run_id,
            self.inner.checkpoint.clone(),
            self.inner.events.clone(),
            self.inner.options.result_poll_interval,
        )
    }

    pub async fn get_run(&self, run_id: Uuid) -> Result<Option<WorkflowRun>, WorkflowError> {
        Ok(self.inner.checkpoint.get_run(run_id).await?)
    }

    pub async fn list_runs(&self, limit: u32) -> Result<Vec<WorkflowRun>, WorkflowError> {
        Ok(self.inner.checkpoint.list_runs(limit).await?)
    }

    /// Runs not yet `Succeeded` or `Failed`, oldest first.
    pub async fn incomplete_runs(&self) -> Result<Vec<WorkflowRun>, WorkflowError> {
        Ok(self.inner.checkpoint.list_incomplete_runs().await?)
    }

    pub async fn list_steps(&self, run_id: Uuid) -> Result<Vec<StepRecord>, WorkflowError> {
        Ok(self.inner.checkpoint.list_steps(run_id).await?)
    }

    pub async fn list_messages(&self, run_id: Uuid) -> Result<Vec<Message>, WorkflowError> {
        self.inner.mailbox.list_messages(run_id).await
    }

    /// Re-enter every non-terminal run whose workflow is registered.
    ///
    /// Returns the number of runs handed to a task. Runs of unknown
    /// workflows are skipped with a warning.
    pub async fn resume_incomplete(&self) -> Result<usize, WorkflowError> {
        let runs = self.inner.checkpoint.list_incomplete_runs().await?;
        let mut resumed = 0;

        for run in runs {
            match self.inner.registry.get(&run.workflow_name) {
                Some(workflow) => {
                    tracing::info!(
                        run_id = %run.id,
                        workflow = %run.workflow_name,
                        status = %run.status,
                        "resuming incomplete run"
                    );
                    if self.spawn_run(run, workflow) {
                        resumed += 1;
                    }
                }
                None => {
                    tracing::warn!(
                        run_id = %run.id,
                        workflow = %run.workflow_name,
                        "skipping incomplete run of unregistered workflow"
                    );
                }
            }
        }

        Ok(resumed)
    }

    /// Stop driving runs. Suspended and in-flight runs abort their current
    /// attempt and stay resumable. Waits up to `grace` for tasks to finish.
    pub async fn shutdown(&self, grace: Duration) {
        self.inner.cancel.cancel();
        let deadline = tokio::time::Instant::now() + grace;
        while !self.inner.active.is_empty() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        if !self.inner.active.is_empty() {
            tracing::warn!(
                remaining = self.inner.active.len(),
                "workflow runtime shut down with runs still executing"
            );
        }
    }

    /// Spawn a task for `run` unless one is already driving it here.
    fn spawn_run(&self, run: WorkflowRun, workflow: ErasedWorkflow) -> bool {
        if self.inner.cancel.is_cancelled() {
            tracing::debug!(run_id = %run.id, "runtime shutting down, not starting run");
            return false;
        }
        if !self.inner.active.insert(run.id) {
            tracing::debug!(run_id = %run.id, "run already executing in this process");
            return false;
        }

        let guard = ActiveGuard {
            runtime: self.inner.clone(),
            run_id: run.id,
        };
        let runtime = self.clone();
        tokio::spawn(async move {
            let _guard = guard;
            runtime.execute(run, workflow).await;
        });
        true
    }

    async fn execute(&self, run: WorkflowRun, workflow: ErasedWorkflow) {
        let run_id = run.id;
        let inner = &self.inner;

        if let Err(e) = inner.checkpoint.mark_running(run_id).await {
            self.abort_attempt(run_id, WorkflowError::from(e));
            return;
        }

        tracing::info!(run_id = %run_id, workflow = %run.workflow_name, "workflow run started");
        inner.events.publish(RunEvent::Started {
            run_id,
            workflow_name: run.workflow_name.clone(),
        });

        let ctx = WorkflowContext::new(
            run_id,
            run.workflow_name.clone(),
            inner.steps.clone(),
            inner.mailbox.clone(),
        );
        let result = workflow(ctx, run.input).await;

        match result {
            Ok(output) => self.finish_succeeded(run_id, &output).await,
            Err(e) if e.aborts_attempt() => self.abort_attempt(run_id, e),
            Err(e) => self.finish_failed(run_id, &e.to_string()).await,
        }
    }

    async fn finish_succeeded(&self, run_id: Uuid, output: &Value) {
        match self.inner.checkpoint.mark_succeeded(run_id, output).await {
            Ok(()) => {
                tracing::info!(run_id = %run_id, "workflow run succeeded");
                self.inner.events.publish(RunEvent::Finished {
                    run_id,
                    status: RunStatus::Succeeded,
                });
            }
            Err(e) => self.abort_attempt(run_id, e.into()),
        }
    }

    async fn finish_failed(&self, run_id: Uuid, error: &str) {
        match self.inner.checkpoint.mark_failed(run_id, error).await {
            Ok(()) => {
                tracing::info!(run_id = %run_id, error, "workflow run failed");
                self.inner.events.publish(RunEvent::Finished {
                    run_id,
                    status: RunStatus::Failed,
                });
            }
            Err(e) => self.abort_attempt(run_id, e.into()),
        }
    }

    fn abort_attempt(&self, run_id: Uuid, error: WorkflowError) {
        tracing::warn!(
            run_id = %run_id,
            error = %error,
            "workflow attempt aborted, run left resumable"
        );
        self.inner.events.publish(RunEvent::AttemptAborted {
            run_id,
            error: error.to_string(),
        });
    }
}

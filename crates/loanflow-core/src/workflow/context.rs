//! Per-run execution context handed to every workflow function.
//!
//! The context owns the run's step counter. Every `run_step`, `recv` and
//! `send` call takes the next sequence number, so a deterministic workflow
//! produces the same `(step_name, seq)` keys on every replay.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use loanflow_types::workflow::StepKey;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use uuid::Uuid;

use super::error::{StepError, WorkflowError};
use super::mailbox::{Mailbox, RecvOutcome};
use super::retry::RetryPolicy;
use super::step::StepExecutor;

/// Result of a receive: a typed message or an elapsed timeout.
#[derive(Debug, Clone, PartialEq)]
pub enum Received<T> {
    Message(T),
    TimedOut,
}

impl<T> Received<T> {
    pub fn message(self) -> Option<T> {
        match self {
            Received::Message(m) => Some(m),
            Received::TimedOut => None,
        }
    }
}

/// Explicit handle to the engine for one run attempt.
///
/// Cheap to clone; clones share the step counter.
#[derive(Clone)]
pub struct WorkflowContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    run_id: Uuid,
    workflow_name: String,
    next_seq: AtomicU32,
    steps: StepExecutor,
    mailbox: Arc<Mailbox>,
}

impl WorkflowContext {
    pub(crate) fn new(
        run_id: Uuid,
        workflow_name: impl Into<String>,
        steps: StepExecutor,
        mailbox: Arc<Mailbox>,
    ) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                run_id,
                workflow_name: workflow_name.into(),
                next_seq: AtomicU32::new(0),
                steps,
                mailbox,
            }),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.inner.run_id
    }

    fn next_key(&self, step_name: impl Into<String>) -> StepKey {
        let seq = self.inner.next_seq.fetch_add(1, Ordering::SeqCst);
        StepKey::new(self.inner.run_id, step_name, seq)
    }

    /// Run a side-effecting step at most once per run.
    ///
    /// On replay the checkpointed output is returned and `f` is not called.
    /// A failure is returned as `WorkflowError::Step` carrying `f`'s error
    /// as its source, and is not recorded.
    pub async fn run_step<T, E, F, Fut>(&self, name: &str, f: F) -> Result<T, WorkflowError>
    where
        T: Serialize + DeserializeOwned,
        E: Into<StepError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let key = self.next_key(name);
        if let Some(value) = self.inner.steps.replay(&key).await? {
            return Ok(value);
        }

        match f().await {
            Ok(output) => self.inner.steps.commit(&key, &output).await,
            Err(err) => {
                let err: StepError = err.into();
                tracing::warn!(
                    run_id = %key.run_id,
                    workflow = %self.inner.workflow_name,
                    step = %key.step_name,
                    seq = key.seq,
                    error = %err,
                    "step failed"
                );
                Err(WorkflowError::Step {
                    step: key.step_name,
                    attempts: 1,
                    source: err,
                })
            }
        }
    }

    /// Like [`run_step`](Self::run_step), re-invoking `f` on failure as
    /// allowed by `policy`.
    pub async fn run_step_with_retry<T, E, F, Fut>(
        &self,
        name: &str,
        policy: &RetryPolicy,
        f: F,
    ) -> Result<T, WorkflowError>
    where
        T: Serialize + DeserializeOwned,
        E: Into<StepError>,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let key = self.next_key(name);
        self.inner.steps.run(key, policy, f).await
    }

    /// Wait for the next message on `topic` addressed to this run.
    ///
    /// A timeout is a normal outcome (`Received::TimedOut`), not an error.
    pub async fn recv<T: DeserializeOwned>(
        &self,
        topic: &str,
        timeout: Duration,
    ) -> Result<Received<T>, WorkflowError> {
        let seq = self.inner.next_seq.fetch_add(1, Ordering::SeqCst);
        let outcome = self
            .inner
            .mailbox
            .receive(self.inner.run_id, seq, topic, timeout)
            .await?;

        match outcome {
            RecvOutcome::Received(payload) => Ok(Received::Message(serde_json::from_value(payload)?)),
            RecvOutcome::TimedOut(_) => Ok(Received::TimedOut),
        }
    }

    /// Send a message to another run, checkpointed as the step `send:<topic>`.
    pub async fn send<T: Serialize>(
        &self,
        destination_run_id: Uuid,
        topic: &str,
        payload: &T,
    ) -> Result<(), WorkflowError> {
        let key = self.next_key(format!("send:{topic}"));
        if self
            .inner
            .steps
            .replay::<serde_json::Value>(&key)
            .await?
            .is_some()
        {
            return Ok(());
        }

        let message = self
            .inner
            .mailbox
            .send(destination_run_id, topic, serde_json::to_value(payload)?)
            .await?;
        self.inner
            .steps
            .commit(
                &key,
                &json!({
                    "message_id": message.id,
                    "destination_run_id": destination_run_id,
                }),
            )
            .await?;
        Ok(())
    }
}

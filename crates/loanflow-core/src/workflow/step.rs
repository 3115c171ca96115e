//! At-most-once step execution with replay.
//!
//! A step is identified by `(run_id, step_name, seq)`. If a record exists for
//! the key the stored output is returned and the step function is not
//! invoked. Otherwise the function runs, and only a successful result is
//! checkpointed. Failures are returned without a record so a later attempt
//! re-executes the step.

use std::future::Future;
use std::sync::Arc;

use loanflow_types::workflow::{StepKey, StepRecord};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use super::checkpoint::CheckpointManager;
use super::error::{StepError, WorkflowError};
use super::retry::RetryPolicy;

/// Runs step functions against the checkpoint store.
#[derive(Clone)]
pub struct StepExecutor {
    checkpoint: Arc<CheckpointManager>,
    cancel: CancellationToken,
}

impl StepExecutor {
    pub fn new(checkpoint: Arc<CheckpointManager>, cancel: CancellationToken) -> Self {
        Self { checkpoint, cancel }
    }

    /// Return the checkpointed output for `key`, if the step completed before.
    pub async fn replay<T: DeserializeOwned>(
        &self,
        key: &StepKey,
    ) -> Result<Option<T>, WorkflowError> {
        match self.checkpoint.lookup_step(key).await? {
            Some(record) => {
                tracing::debug!(
                    run_id = %key.run_id,
                    step = %key.step_name,
                    seq = key.seq,
                    "replaying checkpointed step"
                );
                Ok(Some(serde_json::from_value(record.output)?))
            }
            None => Ok(None),
        }
    }

    /// Checkpoint a step output and return the value actually stored.
    pub async fn commit<T: Serialize + DeserializeOwned>(
        &self,
        key: &StepKey,
        output: &T,
    ) -> Result<T, WorkflowError> {
        let record = StepRecord::new(key, serde_json::to_value(output)?);
        let stored = self.checkpoint.record_step(&record).await?;
        Ok(serde_json::from_value(stored.output)?)
    }

    /// Execute a step under `policy`, replaying a stored result if present.
    ///
    /// Between attempts the executor sleeps for the policy's backoff; a
    /// runtime shutdown during that sleep aborts with `Interrupted`.
    pub async fn run<T, E, F, Fut>(
        &self,
        key: StepKey,
        policy: &RetryPolicy,
        mut f: F,
    ) -> Result<T, WorkflowError>
    where
        T: Serialize + DeserializeOwned,
        E: Into<StepError>,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.replay(&key).await? {
            return Ok(value);
        }

        let mut attempt = 1;
        loop {
            match f().await {
                Ok(output) => return self.commit(&key, &output).await,
                Err(err) => {
                    let err: StepError = err.into();
                    if !policy.should_retry(attempt) {
                        tracing::warn!(
                            run_id = %key.run_id,
                            step = %key.step_name,
                            seq = key.seq,
                            attempt,
                            error = %err,
                            "step failed"
                        );
                        return Err(WorkflowError::Step {
                            step: key.step_name,
                            attempts: attempt,
                            source: err,
                        });
                    }

                    let delay = policy.backoff(attempt);
                    tracing::info!(
                        run_id = %key.run_id,
                        step = %key.step_name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying step"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.cancel.cancelled() => return Err(WorkflowError::Interrupted),
                    }
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use uuid::Uuid;

    use crate::testing::InMemoryWorkflowRepository;
    use crate::workflow::store::BoxWorkflowRepository;

    fn executor() -> StepExecutor {
        let checkpoint = Arc::new(CheckpointManager::new(BoxWorkflowRepository::new(
            InMemoryWorkflowRepository::default(),
        )));
        StepExecutor::new(checkpoint, CancellationToken::new())
    }

    #[tokio::test]
    async fn completed_step_is_not_invoked_again() {
        let exec = executor();
        let key = StepKey::new(Uuid::now_v7(), "charge", 0);
        let calls = AtomicU32::new(0);

        for _ in 0..3 {
            let out: u32 = exec
                .run(key.clone(), &RetryPolicy::default(), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(42)
                })
                .await
                .unwrap();
            assert_eq!(out, 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[derive(Debug, PartialEq, thiserror::Error)]
    enum ChargeError {
        #[error("card declined")]
        Declined,
    }

    #[tokio::test]
    async fn failed_step_is_not_checkpointed() {
        let exec = executor();
        let key = StepKey::new(Uuid::now_v7(), "charge", 0);

        let err = exec
            .run::<u32, _, _, _>(key.clone(), &RetryPolicy::default(), || async {
                Err(ChargeError::Declined)
            })
            .await
            .unwrap_err();
        match err {
            WorkflowError::Step {
                attempts, source, ..
            } => {
                assert_eq!(attempts, 1);
                assert_eq!(
                    source.downcast_ref::<ChargeError>(),
                    Some(&ChargeError::Declined)
                );
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(exec.replay::<u32>(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn retry_policy_reinvokes_until_success() {
        let exec = executor();
        let key = StepKey::new(Uuid::now_v7(), "flaky", 0);
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(5),
            ..RetryPolicy::default()
        };

        let out: String = exec
            .run(key, &policy, || async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(format!("attempt {n} failed"))
                } else {
                    Ok("ok".to_string())
                }
            })
            .await
            .unwrap();
        assert_eq!(out, "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}

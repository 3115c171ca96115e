//! Durable topic-addressed mailbox between runs.
//!
//! Messages live in the message store until a receive in the destination run
//! consumes them. A receive waiting in this process registers a `Notify`
//! under `(run, topic)` for the duration of the wait; sends from other
//! processes sharing the store are picked up by polling at `poll_interval`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use loanflow_types::message::Message;
use loanflow_types::workflow::{StepKey, StepRecord};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::checkpoint::{CheckpointError, CheckpointManager};
use super::error::WorkflowError;
use super::events::{RunEvent, RunEventBus};
use super::store::BoxMessageRepository;

/// Checkpointed outcome of a receive, stored under the step `recv:<topic>`.
///
/// Serializes as `{"received": <payload>}` or `{"timed_out": true}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecvOutcome {
    Received(Value),
    TimedOut(bool),
}

/// Step name under which a receive on `topic` is checkpointed.
pub fn recv_step_name(topic: &str) -> String {
    format!("recv:{topic}")
}

pub struct Mailbox {
    messages: BoxMessageRepository,
    checkpoint: Arc<CheckpointManager>,
    events: RunEventBus,
    wakers: DashMap<(Uuid, String), Arc<Notify>>,
    poll_interval: Duration,
    cancel: CancellationToken,
}

impl Mailbox {
    pub fn new(
        messages: BoxMessageRepository,
        checkpoint: Arc<CheckpointManager>,
        events: RunEventBus,
        poll_interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            messages,
            checkpoint,
            events,
            wakers: DashMap::new(),
            poll_interval,
            cancel,
        }
    }

    fn register_waker(&self, run_id: Uuid, topic: &str) -> Arc<Notify> {
        self.wakers
            .entry((run_id, topic.to_string()))
            .or_insert_with(|| Arc::new(Notify::new()))
            .clone()
    }

    /// Durably enqueue a message for `destination_run_id` on `topic`.
    ///
    /// Fails with `RunNotFound` if the destination run does not exist.
    pub async fn send(
        &self,
        destination_run_id: Uuid,
        topic: &str,
        payload: Value,
    ) -> Result<Message, WorkflowError> {
        self.checkpoint.require_run(destination_run_id).await?;

        let message = Message::new(destination_run_id, topic, payload);
        self.messages
            .enqueue(&message)
            .await
            .map_err(CheckpointError::from)?;

        tracing::debug!(
            run_id = %destination_run_id,
            topic,
            message_id = %message.id,
            "enqueued message"
        );

        // Without a registered waker the receive has not started consuming
        // yet and will find the message on its first attempt.
        if let Some(waker) = self.wakers.get(&(destination_run_id, topic.to_string())) {
            waker.notify_one();
        }
        Ok(message)
    }

    /// Block until a message on `topic` arrives for `run_id` or the timeout
    /// elapses.
    ///
    /// `seq` is the receive's position in the run's step counter. The
    /// outcome is checkpointed, so replaying the same `(run_id, seq)` returns
    /// the same result without consuming another message.
    pub async fn receive(
        &self,
        run_id: Uuid,
        seq: u32,
        topic: &str,
        timeout: Duration,
    ) -> Result<RecvOutcome, WorkflowError> {
        let key = StepKey::new(run_id, recv_step_name(topic), seq);

        if let Some(record) = self.checkpoint.lookup_step(&key).await? {
            tracing::debug!(run_id = %run_id, seq, topic, "replaying checkpointed receive");
            return Ok(serde_json::from_value(record.output)?);
        }

        // Consumed before a crash but never checkpointed.
        if let Some(message) = self
            .messages
            .find_consumed(&run_id, topic, seq)
            .await
            .map_err(CheckpointError::from)?
        {
            return self
                .finish(&key, topic, RecvOutcome::Received(message.payload), false)
                .await;
        }

        let suspension = self.checkpoint.suspend(run_id, seq, topic, timeout).await?;
        self.events.publish(RunEvent::Suspended {
            run_id,
            topic: topic.to_string(),
        });
        tracing::info!(
            run_id = %run_id,
            seq,
            topic,
            deadline = %suspension.deadline,
            "waiting for message"
        );

        let waker = self.register_waker(run_id, topic);
        let waited = self
            .wait_for_message(run_id, seq, topic, suspension.deadline, &waker)
            .await;
        self.wakers.remove(&(run_id, topic.to_string()));
        self.finish(&key, topic, waited?, true).await
    }

    async fn wait_for_message(
        &self,
        run_id: Uuid,
        seq: u32,
        topic: &str,
        deadline: DateTime<Utc>,
        waker: &Notify,
    ) -> Result<RecvOutcome, WorkflowError> {
        loop {
            if let Some(message) = self.claim(run_id, seq, topic).await? {
                tracing::debug!(
                    run_id = %run_id,
                    topic,
                    message_id = %message.id,
                    "consumed message"
                );
                return Ok(RecvOutcome::Received(message.payload));
            }

            let remaining = (deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            if remaining.is_zero() {
                tracing::info!(run_id = %run_id, topic, "receive timed out");
                return Ok(RecvOutcome::TimedOut(true));
            }

            tokio::select! {
                _ = waker.notified() => {}
                _ = tokio::time::sleep(self.poll_interval.min(remaining)) => {}
                _ = self.cancel.cancelled() => return Err(WorkflowError::Interrupted),
            }
        }
    }

    /// Take the next message for this receive, or the one a concurrent
    /// attempt of the same run already bound to `seq`.
    async fn claim(
        &self,
        run_id: Uuid,
        seq: u32,
        topic: &str,
    ) -> Result<Option<Message>, WorkflowError> {
        if let Some(message) = self
            .messages
            .consume_next(&run_id, topic, seq)
            .await
            .map_err(CheckpointError::from)?
        {
            return Ok(Some(message));
        }
        Ok(self
            .messages
            .find_consumed(&run_id, topic, seq)
            .await
            .map_err(CheckpointError::from)?)
    }

    async fn finish(
        &self,
        key: &StepKey,
        topic: &str,
        outcome: RecvOutcome,
        suspended: bool,
    ) -> Result<RecvOutcome, WorkflowError> {
        let record = StepRecord::new(key, serde_json::to_value(&outcome)?);
        let stored = self.checkpoint.record_step(&record).await?;
        let run = self.checkpoint.require_run(key.run_id).await?;
        if suspended || run.suspension.is_some() {
            self.checkpoint.resume(key.run_id).await?;
            self.events.publish(RunEvent::Resumed {
                run_id: key.run_id,
                topic: topic.to_string(),
            });
        }
        Ok(serde_json::from_value(stored.output)?)
    }

    /// All messages addressed to a run, consumed or not.
    pub async fn list_messages(&self, run_id: Uuid) -> Result<Vec<Message>, WorkflowError> {
        self.messages
            .list_messages(&run_id)
            .await
            .map_err(|e| CheckpointError::from(e).into())
    }
}

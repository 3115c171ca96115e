//! Mailbox message types for Loanflow.
//!
//! A `Message` is addressed to a run and a topic. Messages are consumed
//! exactly once by a receive inside the destination run and are retained
//! afterwards for audit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A durable message waiting for (or consumed by) a receive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// UUIDv7 message ID.
    pub id: Uuid,
    /// Run that will receive this message.
    pub destination_run_id: Uuid,
    /// Topic the destination receives on (e.g. "review-request").
    pub topic: String,
    /// Flexible JSON payload.
    pub payload: serde_json::Value,
    pub enqueued_at: DateTime<Utc>,
    /// Whether a receive has taken this message.
    pub consumed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumed_at: Option<DateTime<Utc>>,
    /// Sequence number of the receive call that consumed this message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumed_by_seq: Option<u32>,
}

impl Message {
    /// Build a new unconsumed message.
    pub fn new(
        destination_run_id: Uuid,
        topic: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            destination_run_id,
            topic: topic.into(),
            payload,
            enqueued_at: Utc::now(),
            consumed: false,
            consumed_at: None,
            consumed_by_seq: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_message_is_unconsumed() {
        let msg = Message::new(Uuid::now_v7(), "review-request", json!("APPROVED"));
        assert!(!msg.consumed);
        assert!(msg.consumed_at.is_none());

        let json_str = serde_json::to_string(&msg).unwrap();
        assert!(json_str.contains("\"topic\":\"review-request\""));
        assert!(!json_str.contains("consumed_by_seq"));
    }
}

//! Message repository trait definition.
//!
//! Durable storage for topic-addressed mailbox messages. Messages are
//! consumed exactly once, in enqueue order per `(destination, topic)`, and
//! are never physically deleted.

use loanflow_types::error::RepositoryError;
use loanflow_types::message::Message;
use uuid::Uuid;

/// Repository trait for mailbox persistence.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait MessageRepository: Send + Sync {
    /// Append a message to its destination's queue.
    fn enqueue(
        &self,
        message: &Message,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Atomically take the oldest unconsumed message for `(destination, topic)`
    /// and mark it consumed by the receive with sequence number `seq`.
    ///
    /// Selection and marking must happen in one atomic operation so that two
    /// concurrent receivers never take the same message. Returns `None` when
    /// a message is already consumed by `seq`; at most one message is ever
    /// bound to a receive.
    fn consume_next(
        &self,
        destination_run_id: &Uuid,
        topic: &str,
        seq: u32,
    ) -> impl std::future::Future<Output = Result<Option<Message>, RepositoryError>> + Send;

    /// Find the message already consumed by the receive `(destination, topic, seq)`.
    ///
    /// Covers a crash between consuming a message and checkpointing it.
    fn find_consumed(
        &self,
        destination_run_id: &Uuid,
        topic: &str,
        seq: u32,
    ) -> impl std::future::Future<Output = Result<Option<Message>, RepositoryError>> + Send;

    /// List every message addressed to a run, in enqueue order.
    fn list_messages(
        &self,
        destination_run_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Vec<Message>, RepositoryError>> + Send;
}

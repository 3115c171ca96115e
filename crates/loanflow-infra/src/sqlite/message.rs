//! SQLite message repository implementation.
//!
//! Implements `MessageRepository` from `loanflow-core`. The autoincrement
//! `seq` column gives each `(destination_run_id, topic)` queue its FIFO order,
//! and consumption is a single `UPDATE ... RETURNING` on the writer so two
//! receivers can never take the same message, and one receive position never
//! takes two.

use loanflow_core::repository::message::MessageRepository;
use loanflow_types::error::RepositoryError;
use loanflow_types::message::Message;
use sqlx::Row;
use uuid::Uuid;

use super::convert::{format_datetime, parse_datetime, parse_json, parse_uuid, query_err, to_json};
use super::pool::DatabasePool;

const MESSAGE_COLUMNS: &str =
    "id, destination_run_id, topic, payload, enqueued_at, consumed, consumed_at, consumed_by_seq";

/// SQLite-backed implementation of `MessageRepository`.
#[derive(Clone)]
pub struct SqliteMessageRepository {
    pool: DatabasePool,
}

impl SqliteMessageRepository {
    /// Create a new repository backed by the given database pool.
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

struct MessageRow {
    id: String,
    destination_run_id: String,
    topic: String,
    payload: String,
    enqueued_at: String,
    consumed: bool,
    consumed_at: Option<String>,
    consumed_by_seq: Option<i64>,
}

impl MessageRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            destination_run_id: row.try_get("destination_run_id")?,
            topic: row.try_get("topic")?,
            payload: row.try_get("payload")?,
            enqueued_at: row.try_get("enqueued_at")?,
            consumed: row.try_get("consumed")?,
            consumed_at: row.try_get("consumed_at")?,
            consumed_by_seq: row.try_get("consumed_by_seq")?,
        })
    }

    fn into_message(self) -> Result<Message, RepositoryError> {
        let consumed_by_seq = self
            .consumed_by_seq
            .map(|seq| {
                u32::try_from(seq)
                    .map_err(|_| RepositoryError::Query(format!("invalid consumed_by_seq: {seq}")))
            })
            .transpose()?;

        Ok(Message {
            id: parse_uuid(&self.id)?,
            destination_run_id: parse_uuid(&self.destination_run_id)?,
            topic: self.topic,
            payload: parse_json(&self.payload, "payload")?,
            enqueued_at: parse_datetime(&self.enqueued_at)?,
            consumed: self.consumed,
            consumed_at: self.consumed_at.as_deref().map(parse_datetime).transpose()?,
            consumed_by_seq,
        })
    }
}

fn message_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Message, RepositoryError> {
    MessageRow::from_row(row).map_err(query_err)?.into_message()
}

impl MessageRepository for SqliteMessageRepository {
    async fn enqueue(&self, message: &Message) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO messages (id, destination_run_id, topic, payload, enqueued_at, consumed)
               VALUES (?, ?, ?, ?, ?, 0)"#,
        )
        .bind(message.id.to_string())
        .bind(message.destination_run_id.to_string())
        .bind(&message.topic)
        .bind(to_json(&message.payload)?)
        .bind(format_datetime(&message.enqueued_at))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db_err) if db_err.message().contains("FOREIGN KEY") => {
                RepositoryError::NotFound
            }
            sqlx::Error::Database(db_err) if db_err.message().contains("UNIQUE") => {
                RepositoryError::Conflict(format!("message {} already enqueued", message.id))
            }
            other => query_err(other),
        })?;

        Ok(())
    }

    async fn consume_next(
        &self,
        destination_run_id: &Uuid,
        topic: &str,
        seq: u32,
    ) -> Result<Option<Message>, RepositoryError> {
        let sql = format!(
            r#"UPDATE messages
               SET consumed = 1, consumed_at = ?, consumed_by_seq = ?
               WHERE seq = (
                   SELECT seq FROM messages
                   WHERE destination_run_id = ? AND topic = ? AND consumed = 0
                   ORDER BY seq ASC LIMIT 1
               )
               AND NOT EXISTS (
                   SELECT 1 FROM messages
                   WHERE destination_run_id = ? AND topic = ? AND consumed_by_seq = ?
               )
               RETURNING {MESSAGE_COLUMNS}"#
        );
        let row = sqlx::query(&sql)
            .bind(format_datetime(&chrono::Utc::now()))
            .bind(i64::from(seq))
            .bind(destination_run_id.to_string())
            .bind(topic)
            .bind(destination_run_id.to_string())
            .bind(topic)
            .bind(i64::from(seq))
            .fetch_optional(&self.pool.writer)
            .await
            .map_err(query_err)?;

        row.as_ref().map(message_from_row).transpose()
    }

    async fn find_consumed(
        &self,
        destination_run_id: &Uuid,
        topic: &str,
        seq: u32,
    ) -> Result<Option<Message>, RepositoryError> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages \
             WHERE destination_run_id = ? AND topic = ? AND consumed = 1 AND consumed_by_seq = ? \
             ORDER BY seq ASC LIMIT 1"
        );
        // Writer, so a consume that just committed is always visible.
        let row = sqlx::query(&sql)
            .bind(destination_run_id.to_string())
            .bind(topic)
            .bind(i64::from(seq))
            .fetch_optional(&self.pool.writer)
            .await
            .map_err(query_err)?;

        row.as_ref().map(message_from_row).transpose()
    }

    async fn list_messages(&self, destination_run_id: &Uuid) -> Result<Vec<Message>, RepositoryError> {
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE destination_run_id = ? ORDER BY seq ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(destination_run_id.to_string())
            .fetch_all(&self.pool.reader)
            .await
            .map_err(query_err)?;

        rows.iter().map(message_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::workflow::SqliteWorkflowRepository;
    use loanflow_core::repository::workflow::WorkflowRepository;
    use loanflow_types::workflow::WorkflowRun;
    use serde_json::json;

    async fn test_pool() -> DatabasePool {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        std::mem::forget(dir);
        DatabasePool::new(&url).await.unwrap()
    }

    async fn create_run(pool: &DatabasePool) -> Uuid {
        let runs = SqliteWorkflowRepository::new(pool.clone());
        let run = WorkflowRun::new(Uuid::now_v7(), "loan-process", json!({}));
        runs.create_run(&run).await.unwrap();
        run.id
    }

    #[tokio::test]
    async fn test_consume_in_fifo_order() {
        let pool = test_pool().await;
        let repo = SqliteMessageRepository::new(pool.clone());
        let run_id = create_run(&pool).await;

        repo.enqueue(&Message::new(run_id, "review-request", json!("A")))
            .await
            .unwrap();
        repo.enqueue(&Message::new(run_id, "review-request", json!("B")))
            .await
            .unwrap();

        let first = repo.consume_next(&run_id, "review-request", 0).await.unwrap().unwrap();
        let second = repo.consume_next(&run_id, "review-request", 1).await.unwrap().unwrap();
        assert_eq!(first.payload, json!("A"));
        assert_eq!(first.consumed_by_seq, Some(0));
        assert!(first.consumed && first.consumed_at.is_some());
        assert_eq!(second.payload, json!("B"));
        assert_eq!(second.consumed_by_seq, Some(1));

        assert!(repo
            .consume_next(&run_id, "review-request", 2)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_consume_filters_by_topic_and_destination() {
        let pool = test_pool().await;
        let repo = SqliteMessageRepository::new(pool.clone());
        let run_a = create_run(&pool).await;
        let run_b = create_run(&pool).await;

        repo.enqueue(&Message::new(run_a, "other", json!(1))).await.unwrap();
        repo.enqueue(&Message::new(run_b, "review-request", json!(2)))
            .await
            .unwrap();

        assert!(repo
            .consume_next(&run_a, "review-request", 0)
            .await
            .unwrap()
            .is_none());
        let taken = repo.consume_next(&run_b, "review-request", 0).await.unwrap().unwrap();
        assert_eq!(taken.payload, json!(2));
    }

    #[tokio::test]
    async fn test_find_consumed_by_receive_seq() {
        let pool = test_pool().await;
        let repo = SqliteMessageRepository::new(pool.clone());
        let run_id = create_run(&pool).await;

        repo.enqueue(&Message::new(run_id, "review-request", json!("APPROVED")))
            .await
            .unwrap();
        assert!(repo
            .find_consumed(&run_id, "review-request", 5)
            .await
            .unwrap()
            .is_none());

        repo.consume_next(&run_id, "review-request", 5).await.unwrap();
        let found = repo.find_consumed(&run_id, "review-request", 5).await.unwrap().unwrap();
        assert_eq!(found.payload, json!("APPROVED"));
    }

    #[tokio::test]
    async fn test_receive_seq_consumes_at_most_one_message_across_pools() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("shared.db").display());
        let pool_a = DatabasePool::new(&url).await.unwrap();
        let pool_b = DatabasePool::new(&url).await.unwrap();
        let repo_a = SqliteMessageRepository::new(pool_a.clone());
        let repo_b = SqliteMessageRepository::new(pool_b.clone());
        let run_id = create_run(&pool_a).await;

        repo_a
            .enqueue(&Message::new(run_id, "review-request", json!("M1")))
            .await
            .unwrap();
        repo_a
            .enqueue(&Message::new(run_id, "review-request", json!("M2")))
            .await
            .unwrap();

        // Two attempts of the same run racing on receive position 3.
        let taken = repo_a.consume_next(&run_id, "review-request", 3).await.unwrap().unwrap();
        assert_eq!(taken.payload, json!("M1"));
        assert!(repo_b
            .consume_next(&run_id, "review-request", 3)
            .await
            .unwrap()
            .is_none());
        let bound = repo_b.find_consumed(&run_id, "review-request", 3).await.unwrap().unwrap();
        assert_eq!(bound.id, taken.id);

        // The second message stays available for the next receive.
        let next = repo_b.consume_next(&run_id, "review-request", 4).await.unwrap().unwrap();
        assert_eq!(next.payload, json!("M2"));

        pool_a.close().await;
        pool_b.close().await;
    }

    #[tokio::test]
    async fn test_enqueue_for_missing_run_is_not_found() {
        let repo = SqliteMessageRepository::new(test_pool().await);
        let err = repo
            .enqueue(&Message::new(Uuid::now_v7(), "review-request", json!(null)))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound));
    }

    #[tokio::test]
    async fn test_list_messages_retains_consumed() {
        let pool = test_pool().await;
        let repo = SqliteMessageRepository::new(pool.clone());
        let run_id = create_run(&pool).await;

        repo.enqueue(&Message::new(run_id, "t", json!(1))).await.unwrap();
        repo.enqueue(&Message::new(run_id, "t", json!(2))).await.unwrap();
        repo.consume_next(&run_id, "t", 0).await.unwrap();

        let all = repo.list_messages(&run_id).await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all[0].consumed);
        assert!(!all[1].consumed);
    }
}

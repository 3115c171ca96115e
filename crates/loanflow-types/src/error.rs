use thiserror::Error;

/// Errors from repository operations (used by trait definitions in loanflow-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    /// A uniqueness constraint rejected the write.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The write would move a run backwards or out of a terminal status.
    #[error("invalid status transition: {0}")]
    InvalidTransition(String),
}

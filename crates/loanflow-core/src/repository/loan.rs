//! Loan application repository trait definition.

use chrono::{DateTime, Utc};
use loanflow_types::error::RepositoryError;
use loanflow_types::loan::{ApplicationStatus, LoanApplication, LoanApplicationRecord};
use uuid::Uuid;

/// Repository trait for loan application persistence.
///
/// `application_id` is unique at the storage layer; inserting it twice
/// fails with `RepositoryError::Conflict`.
pub trait LoanRepository: Send + Sync {
    /// Look up an application by its natural key.
    fn find_application(
        &self,
        application_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<LoanApplicationRecord>, RepositoryError>> + Send;

    /// Insert a new application with status `Submitted`, owned by the run
    /// `owner_run_id`.
    fn insert_application(
        &self,
        application: &LoanApplication,
        owner_run_id: Uuid,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Record the final decision for an application.
    fn update_status(
        &self,
        application_id: &str,
        status: ApplicationStatus,
        decided_at: DateTime<Utc>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;
}

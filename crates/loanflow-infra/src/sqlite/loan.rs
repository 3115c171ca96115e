//! SQLite loan application repository.

use chrono::{DateTime, Utc};
use loanflow_core::repository::loan::LoanRepository;
use loanflow_types::error::RepositoryError;
use loanflow_types::loan::{ApplicationStatus, LoanApplication, LoanApplicationRecord};
use sqlx::Row;
use uuid::Uuid;

use super::convert::{format_datetime, parse_datetime, parse_uuid, query_err};
use super::pool::DatabasePool;

/// SQLite-backed implementation of `LoanRepository`.
#[derive(Clone)]
pub struct SqliteLoanRepository {
    pool: DatabasePool,
}

impl SqliteLoanRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

struct LoanApplicationRow {
    application_id: String,
    applicant_name: String,
    email: String,
    phone: String,
    loan_amount: f64,
    loan_purpose: String,
    annual_income: f64,
    status: String,
    submitted_at: String,
    decided_at: Option<String>,
    owner_run_id: Option<String>,
}

impl LoanApplicationRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            application_id: row.try_get("application_id")?,
            applicant_name: row.try_get("applicant_name")?,
            email: row.try_get("email")?,
            phone: row.try_get("phone")?,
            loan_amount: row.try_get("loan_amount")?,
            loan_purpose: row.try_get("loan_purpose")?,
            annual_income: row.try_get("annual_income")?,
            status: row.try_get("status")?,
            submitted_at: row.try_get("submitted_at")?,
            decided_at: row.try_get("decided_at")?,
            owner_run_id: row.try_get("owner_run_id")?,
        })
    }

    fn into_record(self) -> Result<LoanApplicationRecord, RepositoryError> {
        Ok(LoanApplicationRecord {
            application: LoanApplication {
                application_id: self.application_id,
                applicant_name: self.applicant_name,
                email: self.email,
                phone: self.phone,
                loan_amount: self.loan_amount,
                loan_purpose: self.loan_purpose.parse().map_err(RepositoryError::Query)?,
                annual_income: self.annual_income,
                submitted_at: parse_datetime(&self.submitted_at)?,
            },
            status: self.status.parse().map_err(RepositoryError::Query)?,
            decided_at: self.decided_at.as_deref().map(parse_datetime).transpose()?,
            owner_run_id: self.owner_run_id.as_deref().map(parse_uuid).transpose()?,
        })
    }
}

impl LoanRepository for SqliteLoanRepository {
    async fn find_application(
        &self,
        application_id: &str,
    ) -> Result<Option<LoanApplicationRecord>, RepositoryError> {
        let row = sqlx::query(
            r#"SELECT application_id, applicant_name, email, phone, loan_amount, loan_purpose,
                      annual_income, status, submitted_at, decided_at, owner_run_id
               FROM loan_applications WHERE application_id = ?"#,
        )
        .bind(application_id)
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(query_err)?;

        match row {
            Some(row) => Ok(Some(
                LoanApplicationRow::from_row(&row)
                    .map_err(query_err)?
                    .into_record()?,
            )),
            None => Ok(None),
        }
    }

    async fn insert_application(
        &self,
        application: &LoanApplication,
        owner_run_id: Uuid,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"INSERT INTO loan_applications (application_id, applicant_name, email, phone,
                   loan_amount, loan_purpose, annual_income, status, submitted_at, owner_run_id)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&application.application_id)
        .bind(&application.applicant_name)
        .bind(&application.email)
        .bind(&application.phone)
        .bind(application.loan_amount)
        .bind(application.loan_purpose.as_str())
        .bind(application.annual_income)
        .bind(ApplicationStatus::Submitted.as_str())
        .bind(format_datetime(&application.submitted_at))
        .bind(owner_run_id.to_string())
        .execute(&self.pool.writer)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.message().contains("UNIQUE") => {
                Err(RepositoryError::Conflict(format!(
                    "application '{}' already exists",
                    application.application_id
                )))
            }
            Err(e) => Err(query_err(e)),
        }
    }

    async fn update_status(
        &self,
        application_id: &str,
        status: ApplicationStatus,
        decided_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE loan_applications SET status = ?, decided_at = ? WHERE application_id = ?",
        )
        .bind(status.as_str())
        .bind(format_datetime(&decided_at))
        .bind(application_id)
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loanflow_types::loan::LoanPurpose;

    async fn test_pool() -> DatabasePool {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let url = format!("sqlite://{}?mode=rwc", db_path.display());
        std::mem::forget(dir);
        DatabasePool::new(&url).await.unwrap()
    }

    fn application(id: &str) -> LoanApplication {
        LoanApplication {
            application_id: id.to_string(),
            applicant_name: "Ada Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            phone: String::new(),
            loan_amount: 2500.0,
            loan_purpose: LoanPurpose::Auto,
            annual_income: 48000.0,
            submitted_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let repo = SqliteLoanRepository::new(test_pool().await);
        let app = application("APP-1");
        let run_id = Uuid::now_v7();
        repo.insert_application(&app, run_id).await.unwrap();

        let record = repo.find_application("APP-1").await.unwrap().unwrap();
        assert_eq!(record.status, ApplicationStatus::Submitted);
        assert_eq!(record.owner_run_id, Some(run_id));
        assert_eq!(record.application.loan_purpose, LoanPurpose::Auto);
        assert_eq!(record.application.phone, "");
        assert_eq!(record.application.submitted_at, app.submitted_at);
        assert!(record.decided_at.is_none());

        assert!(repo.find_application("APP-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_insert_conflicts() {
        let repo = SqliteLoanRepository::new(test_pool().await);
        let owner = Uuid::now_v7();
        repo.insert_application(&application("APP-1"), owner)
            .await
            .unwrap();

        let err = repo
            .insert_application(&application("APP-1"), Uuid::now_v7())
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));

        // The first insert keeps ownership.
        let record = repo.find_application("APP-1").await.unwrap().unwrap();
        assert_eq!(record.owner_run_id, Some(owner));

        let err = repo
            .insert_application(&application("APP-1"), owner)
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_update_status_records_decision() {
        let repo = SqliteLoanRepository::new(test_pool().await);
        repo.insert_application(&application("APP-1"), Uuid::now_v7())
            .await
            .unwrap();

        repo.update_status("APP-1", ApplicationStatus::Approved, Utc::now())
            .await
            .unwrap();
        let record = repo.find_application("APP-1").await.unwrap().unwrap();
        assert_eq!(record.status, ApplicationStatus::Approved);
        assert!(record.decided_at.is_some());

        let err = repo
            .update_status("missing", ApplicationStatus::Rejected, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound));
    }
}

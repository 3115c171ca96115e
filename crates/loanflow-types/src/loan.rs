//! Loan application domain types.
//!
//! `LoanApplication` is the workflow input; `LoanApplicationRecord` is the
//! persisted row. The remaining structs are the checkpointed outputs of the
//! individual loan workflow steps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Decision value sent by a reviewer to approve a loan.
pub const DECISION_APPROVED: &str = "APPROVED";

/// What the loan is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanPurpose {
    Home,
    Auto,
    Personal,
}

impl LoanPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanPurpose::Home => "home",
            LoanPurpose::Auto => "auto",
            LoanPurpose::Personal => "personal",
        }
    }
}

impl std::str::FromStr for LoanPurpose {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "home" => Ok(LoanPurpose::Home),
            "auto" => Ok(LoanPurpose::Auto),
            "personal" => Ok(LoanPurpose::Personal),
            other => Err(format!("invalid loan purpose: '{other}'")),
        }
    }
}

/// Lifecycle status of a persisted application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationStatus {
    Submitted,
    Approved,
    Rejected,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Submitted => "SUBMITTED",
            ApplicationStatus::Approved => "APPROVED",
            ApplicationStatus::Rejected => "REJECTED",
        }
    }
}

impl std::fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ApplicationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUBMITTED" => Ok(ApplicationStatus::Submitted),
            "APPROVED" => Ok(ApplicationStatus::Approved),
            "REJECTED" => Ok(ApplicationStatus::Rejected),
            other => Err(format!("invalid application status: '{other}'")),
        }
    }
}

/// A loan application as submitted by the applicant (workflow input).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanApplication {
    /// Natural key, used for deduplication.
    pub application_id: String,
    pub applicant_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    pub loan_amount: f64,
    pub loan_purpose: LoanPurpose,
    pub annual_income: f64,
    pub submitted_at: DateTime<Utc>,
}

impl LoanApplication {
    /// Check the fields a submission must carry before a run is started.
    pub fn validate(&self) -> Result<(), String> {
        if self.application_id.trim().is_empty() {
            return Err("application_id must not be empty".to_string());
        }
        if self.applicant_name.trim().is_empty() {
            return Err("applicant_name must not be empty".to_string());
        }
        if !self.loan_amount.is_finite() || self.loan_amount <= 0.0 {
            return Err(format!("loan_amount must be positive, got {}", self.loan_amount));
        }
        if !self.annual_income.is_finite() || self.annual_income < 0.0 {
            return Err(format!(
                "annual_income must not be negative, got {}",
                self.annual_income
            ));
        }
        Ok(())
    }
}

/// A persisted loan application row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanApplicationRecord {
    #[serde(flatten)]
    pub application: LoanApplication,
    pub status: ApplicationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<DateTime<Utc>>,
    /// The `loan-process` run that stored the row.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_run_id: Option<Uuid>,
}

// ---------------------------------------------------------------------------
// Step outputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateCheckResult {
    pub is_duplicate: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveResult {
    pub application_id: String,
    /// `false` when the storage layer rejected the row as a duplicate.
    pub saved: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditCheckResult {
    /// Creditworthiness score on a 1-100 scale.
    pub credit_score: u32,
    pub approved: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Complete,
    Pending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentVerificationResult {
    pub status: DocumentStatus,
    pub verified: bool,
}

/// Output of the decision-recording step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub application_id: String,
    pub status: ApplicationStatus,
}

/// Output of the applicant notification step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationReceipt {
    pub channel: String,
    pub recipient: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn application_status_uses_uppercase_storage_names() {
        let s = serde_json::to_string(&ApplicationStatus::Submitted).unwrap();
        assert_eq!(s, "\"SUBMITTED\"");
        assert_eq!(
            "REJECTED".parse::<ApplicationStatus>().unwrap(),
            ApplicationStatus::Rejected
        );
    }

    #[test]
    fn loan_application_defaults_contact_fields() {
        let raw = r#"{
            "application_id": "LOAN-2024-001",
            "applicant_name": "John Doe",
            "loan_amount": 50000.0,
            "loan_purpose": "personal",
            "annual_income": 75000.0,
            "submitted_at": "2024-05-01T10:00:00Z"
        }"#;
        let app: LoanApplication = serde_json::from_str(raw).unwrap();
        assert_eq!(app.loan_purpose, LoanPurpose::Personal);
        assert!(app.email.is_empty());
        assert!(app.phone.is_empty());
    }

    #[test]
    fn validate_rejects_missing_id_and_non_positive_amount() {
        let mut app = LoanApplication {
            application_id: "LOAN-9".to_string(),
            applicant_name: "Ada".to_string(),
            email: String::new(),
            phone: String::new(),
            loan_amount: 100.0,
            loan_purpose: LoanPurpose::Home,
            annual_income: 0.0,
            submitted_at: Utc::now(),
        };
        assert!(app.validate().is_ok());

        app.loan_amount = 0.0;
        assert!(app.validate().unwrap_err().contains("loan_amount"));

        app.loan_amount = 10.0;
        app.application_id = "  ".to_string();
        assert!(app.validate().unwrap_err().contains("application_id"));
    }

    #[test]
    fn record_flattens_application_fields() {
        let record = LoanApplicationRecord {
            application: LoanApplication {
                application_id: "LOAN-1".to_string(),
                applicant_name: "Ada".to_string(),
                email: "ada@example.com".to_string(),
                phone: "+1-555-0100".to_string(),
                loan_amount: 1200.0,
                loan_purpose: LoanPurpose::Auto,
                annual_income: 90000.0,
                submitted_at: Utc::now(),
            },
            status: ApplicationStatus::Submitted,
            decided_at: None,
            owner_run_id: Some(Uuid::nil()),
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["application_id"], "LOAN-1");
        assert_eq!(value["status"], "SUBMITTED");
        assert_eq!(value["owner_run_id"], Uuid::nil().to_string());
        assert!(value.get("decided_at").is_none());
    }
}

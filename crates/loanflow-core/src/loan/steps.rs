//! Step bodies of the loan workflow.
//!
//! Each method is one side-effecting unit that the workflow wraps in a
//! checkpointed step. None of them know about the engine.

use std::sync::Arc;

use chrono::Utc;
use loanflow_types::config::LoanPolicy;
use loanflow_types::error::RepositoryError;
use loanflow_types::loan::{
    ApplicationStatus, CreditCheckResult, DecisionRecord, DocumentStatus,
    DocumentVerificationResult, DuplicateCheckResult, LoanApplication, NotificationReceipt,
    SaveResult,
};
use uuid::Uuid;

use super::scoring::CreditScorer;
use crate::repository::loan::LoanRepository;

pub struct LoanSteps<L: LoanRepository> {
    repo: L,
    scorer: Arc<dyn CreditScorer>,
    policy: LoanPolicy,
}

impl<L: LoanRepository> LoanSteps<L> {
    pub fn new(repo: L, scorer: Arc<dyn CreditScorer>, policy: LoanPolicy) -> Self {
        Self {
            repo,
            scorer,
            policy,
        }
    }

    pub fn policy(&self) -> &LoanPolicy {
        &self.policy
    }

    /// Whether an application with this ID was already stored by another run.
    pub async fn check_duplicate(
        &self,
        application_id: &str,
        run_id: Uuid,
    ) -> Result<DuplicateCheckResult, RepositoryError> {
        let existing = self.repo.find_application(application_id).await?;
        Ok(DuplicateCheckResult {
            is_duplicate: existing.is_some_and(|r| r.owner_run_id != Some(run_id)),
        })
    }

    /// Store the application as `Submitted`, owned by `run_id`.
    ///
    /// A uniqueness conflict on a row owned by another run means a concurrent
    /// submission won the race and is reported as `saved: false`. A row owned
    /// by `run_id` itself is an insert from an earlier attempt of this run
    /// that never reached its checkpoint, and counts as saved.
    pub async fn save_application(
        &self,
        application: &LoanApplication,
        run_id: Uuid,
    ) -> Result<SaveResult, RepositoryError> {
        let saved = match self.repo.insert_application(application, run_id).await {
            Ok(()) => true,
            Err(RepositoryError::Conflict(_)) => {
                let owned = self
                    .repo
                    .find_application(&application.application_id)
                    .await?
                    .is_some_and(|r| r.owner_run_id == Some(run_id));
                tracing::info!(
                    application_id = %application.application_id,
                    run_id = %run_id,
                    owned,
                    "application already stored"
                );
                owned
            }
            Err(e) => return Err(e),
        };
        Ok(SaveResult {
            application_id: application.application_id.clone(),
            saved,
        })
    }

    pub fn credit_check(&self, application: &LoanApplication) -> CreditCheckResult {
        let credit_score = self.scorer.score(application);
        let approved = credit_score > self.policy.min_credit_score;
        tracing::info!(
            application_id = %application.application_id,
            credit_score,
            approved,
            "credit check"
        );
        CreditCheckResult {
            credit_score,
            approved,
        }
    }

    /// Documents count as verified when the applicant left both an email
    /// address and a phone number.
    pub fn document_verification(&self, application: &LoanApplication) -> DocumentVerificationResult {
        let verified =
            !application.email.trim().is_empty() && !application.phone.trim().is_empty();
        DocumentVerificationResult {
            status: if verified {
                DocumentStatus::Complete
            } else {
                DocumentStatus::Pending
            },
            verified,
        }
    }

    /// Whether this amount needs a manual review before approval.
    pub fn requires_review(&self, application: &LoanApplication) -> bool {
        application.loan_amount > self.policy.review_threshold
    }

    pub async fn record_decision(
        &self,
        application_id: &str,
        status: ApplicationStatus,
    ) -> Result<DecisionRecord, RepositoryError> {
        self.repo
            .update_status(application_id, status, Utc::now())
            .await?;
        Ok(DecisionRecord {
            application_id: application_id.to_string(),
            status,
        })
    }

    pub fn notify_applicant(
        &self,
        application: &LoanApplication,
        status: ApplicationStatus,
    ) -> NotificationReceipt {
        let (channel, recipient) = if application.email.trim().is_empty() {
            ("sms", application.phone.clone())
        } else {
            ("email", application.email.clone())
        };
        tracing::info!(
            application_id = %application.application_id,
            applicant = %application.applicant_name,
            channel,
            decision = %status,
            "sending decision notification"
        );
        NotificationReceipt {
            channel: channel.to_string(),
            recipient,
        }
    }
}

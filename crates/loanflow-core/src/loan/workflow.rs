//! The loan approval workflows.
//!
//! `loan-process` takes a `LoanApplication` through duplicate detection,
//! persistence, credit check, and document verification. Amounts above the
//! review threshold wait for a reviewer decision on `review-request`.
//! `loan-approval` sends the approval to a waiting `loan-process` run.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use loanflow_types::loan::{
    ApplicationStatus, DECISION_APPROVED, DecisionRecord, LoanApplication, NotificationReceipt,
};
use serde_json::Value;
use uuid::Uuid;

use super::steps::LoanSteps;
use crate::repository::loan::LoanRepository;
use crate::workflow::{Received, WorkflowContext, WorkflowError, WorkflowRegistry};

pub const LOAN_PROCESS: &str = "loan-process";
pub const LOAN_APPROVAL: &str = "loan-approval";
pub const REVIEW_TOPIC: &str = "review-request";

pub const ALREADY_PROCESSED: &str = "already processed";
pub const DOCUMENTS_PENDING: &str = "Application pending - documents need verification";
pub const LOAN_REJECTED: &str = "Loan application: Rejected";
pub const LOAN_APPROVED: &str = "Loan application: Approved";

/// Register `loan-process` and `loan-approval` in `registry`.
pub fn register_loan_workflows<L>(
    registry: &mut WorkflowRegistry,
    steps: Arc<LoanSteps<L>>,
) -> Result<(), WorkflowError>
where
    L: LoanRepository + 'static,
{
    registry.register(LOAN_PROCESS, move |ctx: WorkflowContext, app: LoanApplication| {
        let steps = steps.clone();
        async move { process_loan(ctx, steps, app).await }
    })?;
    registry.register(LOAN_APPROVAL, |ctx: WorkflowContext, target: Uuid| async move {
        approve_loan(ctx, target).await
    })?;
    Ok(())
}

async fn process_loan<L: LoanRepository>(
    ctx: WorkflowContext,
    steps: Arc<LoanSteps<L>>,
    app: LoanApplication,
) -> Result<String, WorkflowError> {
    tracing::info!(
        run_id = %ctx.run_id(),
        application_id = %app.application_id,
        amount = app.loan_amount,
        "processing loan application"
    );

    let duplicate = ctx
        .run_step("checkDuplicate", || {
            steps.check_duplicate(&app.application_id, ctx.run_id())
        })
        .await?;
    if duplicate.is_duplicate {
        return Ok(ALREADY_PROCESSED.to_string());
    }

    let saved = ctx
        .run_step("saveApplication", || steps.save_application(&app, ctx.run_id()))
        .await?;
    if !saved.saved {
        return Ok(ALREADY_PROCESSED.to_string());
    }

    let credit = ctx
        .run_step("creditCheck", || async {
            Ok::<_, Infallible>(steps.credit_check(&app))
        })
        .await?;
    if !credit.approved {
        let message = format!(
            "Your loan application was rejected when checking your credit score. Your credit score was: {}",
            credit.credit_score
        );
        decide(&ctx, &steps, &app, ApplicationStatus::Rejected).await?;
        return Ok(message);
    }

    let documents = ctx
        .run_step("documentVerification", || async {
            Ok::<_, Infallible>(steps.document_verification(&app))
        })
        .await?;
    if !documents.verified {
        return Ok(DOCUMENTS_PENDING.to_string());
    }

    if steps.requires_review(&app) {
        let timeout = Duration::from_secs(steps.policy().review_timeout_secs);
        let approved = match ctx.recv::<Value>(REVIEW_TOPIC, timeout).await? {
            Received::Message(decision) => decision.as_str() == Some(DECISION_APPROVED),
            Received::TimedOut => {
                tracing::info!(
                    run_id = %ctx.run_id(),
                    application_id = %app.application_id,
                    "review timed out"
                );
                false
            }
        };
        if !approved {
            decide(&ctx, &steps, &app, ApplicationStatus::Rejected).await?;
            return Ok(LOAN_REJECTED.to_string());
        }
    }

    decide(&ctx, &steps, &app, ApplicationStatus::Approved).await?;
    Ok(LOAN_APPROVED.to_string())
}

/// Persist the decision and notify the applicant, both as checkpointed steps.
async fn decide<L: LoanRepository>(
    ctx: &WorkflowContext,
    steps: &LoanSteps<L>,
    app: &LoanApplication,
    status: ApplicationStatus,
) -> Result<(), WorkflowError> {
    let _: DecisionRecord = ctx
        .run_step("recordDecision", || {
            steps.record_decision(&app.application_id, status)
        })
        .await?;
    let _: NotificationReceipt = ctx
        .run_step("notifyApplicant", || async {
            Ok::<_, Infallible>(steps.notify_applicant(app, status))
        })
        .await?;
    Ok(())
}

async fn approve_loan(ctx: WorkflowContext, target: Uuid) -> Result<String, WorkflowError> {
    ctx.send(target, REVIEW_TOPIC, &DECISION_APPROVED).await?;
    Ok(format!("Approval sent to {target}"))
}

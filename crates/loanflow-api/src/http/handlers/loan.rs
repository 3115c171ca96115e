//! Loan submission, approval, and lookup handlers.

use std::time::Duration;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use loanflow_core::loan::{LOAN_APPROVAL, LOAN_PROCESS};
use loanflow_core::repository::loan::LoanRepository;
use loanflow_core::workflow::WorkflowError;
use loanflow_types::loan::{LoanApplication, LoanApplicationRecord, LoanPurpose};

use crate::http::error::AppError;
use crate::http::response::{ApiResponse, RequestClock};
use crate::state::AppState;

/// How long the approve endpoint waits for the approval run to deliver its message.
const APPROVAL_WAIT: Duration = Duration::from_secs(30);

/// Body of `POST /api/v1/loans`.
#[derive(Debug, Deserialize)]
pub struct SubmitLoanRequest {
    pub application_id: String,
    pub applicant_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    pub loan_amount: f64,
    pub loan_purpose: LoanPurpose,
    pub annual_income: f64,
    /// Defaults to the time the request is received.
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
    /// Caller-chosen run ID; resubmitting the same body under it is idempotent.
    #[serde(default)]
    pub run_id: Option<Uuid>,
}

impl SubmitLoanRequest {
    fn into_parts(self) -> (Option<Uuid>, LoanApplication) {
        let application = LoanApplication {
            application_id: self.application_id,
            applicant_name: self.applicant_name,
            email: self.email,
            phone: self.phone,
            loan_amount: self.loan_amount,
            loan_purpose: self.loan_purpose,
            annual_income: self.annual_income,
            submitted_at: self.submitted_at.unwrap_or_else(Utc::now),
        };
        (self.run_id, application)
    }
}

#[derive(Debug, Serialize)]
pub struct SubmittedLoan {
    pub run_id: Uuid,
    pub workflow: &'static str,
    pub application_id: String,
}

#[derive(Debug, Serialize)]
pub struct ApprovalSent {
    pub approval_run_id: Uuid,
    pub target_run_id: Uuid,
    pub message: String,
}

/// POST /api/v1/loans - Start a `loan-process` run for an application.
pub async fn submit_loan(
    State(state): State<AppState>,
    Json(body): Json<SubmitLoanRequest>,
) -> Result<(StatusCode, Json<ApiResponse<SubmittedLoan>>), AppError> {
    let clock = RequestClock::start();
    let (run_id, application) = body.into_parts();
    application.validate().map_err(AppError::Validation)?;

    let handle = match run_id {
        Some(id) => {
            state
                .runtime
                .start_with_id(id, LOAN_PROCESS, &application)
                .await?
        }
        None => state.runtime.start(LOAN_PROCESS, &application).await?,
    };
    let run_id = handle.run_id();

    tracing::info!(
        run_id = %run_id,
        application_id = %application.application_id,
        "loan application submitted"
    );

    let resp = clock
        .respond(SubmittedLoan {
            run_id,
            workflow: LOAN_PROCESS,
            application_id: application.application_id.clone(),
        })
        .with_link("run", &format!("/api/v1/runs/{run_id}"))
        .with_link("result", &format!("/api/v1/runs/{run_id}/result"))
        .with_link(
            "application",
            &format!("/api/v1/loans/{}", application.application_id),
        );

    Ok((StatusCode::ACCEPTED, Json(resp)))
}

/// POST /api/v1/loans/{run_id}/approve - Send a reviewer approval to a waiting run.
pub async fn approve_loan(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> Result<Json<ApiResponse<ApprovalSent>>, AppError> {
    let clock = RequestClock::start();

    if state.runtime.get_run(run_id).await?.is_none() {
        return Err(WorkflowError::RunNotFound(run_id).into());
    }

    let handle = state.runtime.start(LOAN_APPROVAL, &run_id).await?;
    let message: String = handle.get_result(Some(APPROVAL_WAIT)).await?;

    let resp = clock
        .respond(ApprovalSent {
            approval_run_id: handle.run_id(),
            target_run_id: run_id,
            message,
        })
        .with_link("target", &format!("/api/v1/runs/{run_id}"));

    Ok(Json(resp))
}

/// GET /api/v1/loans/{application_id} - Fetch a stored application and its decision.
pub async fn get_loan(
    State(state): State<AppState>,
    Path(application_id): Path<String>,
) -> Result<Json<ApiResponse<LoanApplicationRecord>>, AppError> {
    let clock = RequestClock::start();

    let record = state
        .loans
        .find_application(&application_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("loan application '{application_id}' not found")))?;

    Ok(Json(clock.respond(record)))
}

//! Workflow run inspection, result, and messaging handlers.

use std::time::Duration;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use loanflow_core::workflow::WorkflowError;
use loanflow_types::message::Message;
use loanflow_types::workflow::{StepRecord, WorkflowRun};

use crate::http::error::AppError;
use crate::http::response::{ApiResponse, RequestClock};
use crate::state::AppState;

/// Upper bound on how long a result request may block.
const MAX_RESULT_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Deserialize)]
pub struct ListRunsQuery {
    /// Maximum number of runs to return (default 20).
    #[serde(default = "default_run_limit")]
    pub limit: u32,
}

fn default_run_limit() -> u32 {
    20
}

#[derive(Debug, Deserialize)]
pub struct ResultQuery {
    #[serde(default = "default_result_timeout")]
    pub timeout_secs: u64,
}

fn default_result_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub topic: String,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Serialize)]
pub struct RunResult {
    pub run_id: Uuid,
    pub output: Value,
}

async fn require_run(state: &AppState, run_id: Uuid) -> Result<WorkflowRun, AppError> {
    state
        .runtime
        .get_run(run_id)
        .await?
        .ok_or(AppError::Workflow(WorkflowError::RunNotFound(run_id)))
}

/// GET /api/v1/runs - Most recent runs, newest first.
pub async fn list_runs(
    State(state): State<AppState>,
    Query(query): Query<ListRunsQuery>,
) -> Result<Json<ApiResponse<Vec<WorkflowRun>>>, AppError> {
    let clock = RequestClock::start();
    let runs = state.runtime.list_runs(query.limit).await?;
    Ok(Json(clock.respond(runs).with_link("self", "/api/v1/runs")))
}

/// GET /api/v1/runs/{run_id}
pub async fn get_run(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> Result<Json<ApiResponse<WorkflowRun>>, AppError> {
    let clock = RequestClock::start();
    let run = require_run(&state, run_id).await?;

    let resp = clock
        .respond(run)
        .with_link("steps", &format!("/api/v1/runs/{run_id}/steps"))
        .with_link("messages", &format!("/api/v1/runs/{run_id}/messages"))
        .with_link("result", &format!("/api/v1/runs/{run_id}/result"));
    Ok(Json(resp))
}

/// GET /api/v1/runs/{run_id}/steps - Checkpointed step records in execution order.
pub async fn list_steps(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<StepRecord>>>, AppError> {
    let clock = RequestClock::start();
    require_run(&state, run_id).await?;
    let steps = state.runtime.list_steps(run_id).await?;
    Ok(Json(clock.respond(steps)))
}

/// GET /api/v1/runs/{run_id}/messages - Mailbox contents, consumed ones included.
pub async fn list_messages(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<Message>>>, AppError> {
    let clock = RequestClock::start();
    require_run(&state, run_id).await?;
    let messages = state.runtime.list_messages(run_id).await?;
    Ok(Json(clock.respond(messages)))
}

/// POST /api/v1/runs/{run_id}/messages - Deliver a message to a run's mailbox.
pub async fn send_message(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
    Json(body): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<ApiResponse<Message>>), AppError> {
    let clock = RequestClock::start();
    if body.topic.trim().is_empty() {
        return Err(AppError::Validation("topic must not be empty".to_string()));
    }

    let message = state.runtime.send(run_id, &body.topic, &body.payload).await?;
    Ok((StatusCode::ACCEPTED, Json(clock.respond(message))))
}

/// GET /api/v1/runs/{run_id}/result?timeout_secs= - Block until the run is terminal.
pub async fn get_result(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
    Query(query): Query<ResultQuery>,
) -> Result<Json<ApiResponse<RunResult>>, AppError> {
    let clock = RequestClock::start();
    require_run(&state, run_id).await?;

    let timeout = Duration::from_secs(query.timeout_secs.min(MAX_RESULT_TIMEOUT_SECS));
    let output: Value = state.runtime.handle(run_id).get_result(Some(timeout)).await?;

    Ok(Json(clock.respond(RunResult { run_id, output })))
}

//! Axum router configuration with middleware.
//!
//! All routes are under `/api/v1/`.
//! Middleware: CORS, tracing.

use axum::Router;
use axum::extract::State;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

/// Build the complete API router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        // Loans
        .route("/loans", post(handlers::loan::submit_loan))
        .route("/loans/{id}/approve", post(handlers::loan::approve_loan))
        .route("/loans/{id}", get(handlers::loan::get_loan))
        // Runs
        .route("/runs", get(handlers::run::list_runs))
        .route("/runs/{run_id}", get(handlers::run::get_run))
        .route("/runs/{run_id}/steps", get(handlers::run::list_steps))
        .route("/runs/{run_id}/result", get(handlers::run::get_result))
        .route(
            "/runs/{run_id}/messages",
            get(handlers::run::list_messages).post(handlers::run::send_message),
        );

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/health", get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health - Liveness plus the registered workflows.
async fn health_check(State(state): State<AppState>) -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "application": state.config.application_name,
        "version": env!("CARGO_PKG_VERSION"),
        "workflows": state.runtime.registry().names(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use loanflow_infra::sqlite::pool::DatabasePool;
    use loanflow_types::config::GlobalConfig;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    async fn test_state() -> AppState {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("api.db").display());
        std::mem::forget(dir);

        let mut config = GlobalConfig::default();
        config.engine.recv_poll_interval_ms = 20;
        config.engine.result_poll_interval_ms = 10;
        let pool = DatabasePool::new(&url).await.unwrap();
        AppState::from_parts(config, pool).unwrap()
    }

    async fn call(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    fn loan_body(id: &str, amount: f64) -> Value {
        json!({
            "application_id": id,
            "applicant_name": "Katherine Johnson",
            "email": "kj@example.com",
            "phone": "+1-555-0142",
            "loan_amount": amount,
            "loan_purpose": "home",
            "annual_income": 85000.0
        })
    }

    #[tokio::test]
    async fn health_lists_registered_workflows() {
        let router = build_router(test_state().await);
        let (status, body) = call(&router, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["application"], "loanflow");
        assert_eq!(body["workflows"], json!(["loan-approval", "loan-process"]));
    }

    #[tokio::test]
    async fn submitted_loan_completes_and_is_queryable() {
        let router = build_router(test_state().await);

        let (status, body) = call(&router, "POST", "/api/v1/loans", Some(loan_body("L-1", 1000.0))).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let run_id = body["data"]["run_id"].as_str().unwrap().to_string();
        assert_eq!(body["_links"]["result"], format!("/api/v1/runs/{run_id}/result"));

        let (status, body) = call(
            &router,
            "GET",
            &format!("/api/v1/runs/{run_id}/result?timeout_secs=10"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["output"], "Loan application: Approved");

        let (status, body) = call(&router, "GET", "/api/v1/loans/L-1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "APPROVED");

        let (_, body) = call(&router, "GET", &format!("/api/v1/runs/{run_id}/steps"), None).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 6);
    }

    #[tokio::test]
    async fn large_loan_waits_for_approval() {
        let router = build_router(test_state().await);

        let (_, body) = call(&router, "POST", "/api/v1/loans", Some(loan_body("L-2", 9000.0))).await;
        let run_id = body["data"]["run_id"].as_str().unwrap().to_string();

        let (status, body) = call(&router, "POST", &format!("/api/v1/loans/{run_id}/approve"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["message"], format!("Approval sent to {run_id}"));

        let (status, body) = call(
            &router,
            "GET",
            &format!("/api/v1/runs/{run_id}/result?timeout_secs=10"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["output"], "Loan application: Approved");

        let (_, body) = call(&router, "GET", &format!("/api/v1/runs/{run_id}/messages"), None).await;
        assert_eq!(body["data"][0]["topic"], "review-request");
        assert_eq!(body["data"][0]["consumed"], true);
    }

    #[tokio::test]
    async fn raw_message_rejects_a_waiting_loan() {
        let router = build_router(test_state().await);

        let (_, body) = call(&router, "POST", "/api/v1/loans", Some(loan_body("L-3", 4000.0))).await;
        let run_id = body["data"]["run_id"].as_str().unwrap().to_string();

        let (status, _) = call(
            &router,
            "POST",
            &format!("/api/v1/runs/{run_id}/messages"),
            Some(json!({"topic": "review-request", "payload": "REJECTED"})),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);

        let (_, body) = call(
            &router,
            "GET",
            &format!("/api/v1/runs/{run_id}/result?timeout_secs=10"),
            None,
        )
        .await;
        assert_eq!(body["data"]["output"], "Loan application: Rejected");
    }

    #[tokio::test]
    async fn invalid_submission_is_rejected() {
        let router = build_router(test_state().await);
        let (status, body) = call(&router, "POST", "/api/v1/loans", Some(loan_body("L-4", -5.0))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errors"][0]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn unknown_run_is_not_found() {
        let router = build_router(test_state().await);
        let missing = uuid::Uuid::now_v7();

        let (status, body) = call(&router, "GET", &format!("/api/v1/runs/{missing}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["errors"][0]["code"], "RUN_NOT_FOUND");

        let (status, _) = call(&router, "POST", &format!("/api/v1/loans/{missing}/approve"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(
            &router,
            "POST",
            &format!("/api/v1/runs/{missing}/messages"),
            Some(json!({"topic": "review-request", "payload": "APPROVED"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}

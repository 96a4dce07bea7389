// REST boundary for the payment simulator

use axum::{
    extract::rejection::JsonRejection,
    extract::{MatchedPath, Path, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::sim::errors::SimError;
use crate::sim::metrics::SimMetrics;
use crate::sim::service::IntentService;
use crate::sim::types::{CreatePaymentIntentRequest, WebhookType};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<IntentService>,
    pub metrics: Arc<SimMetrics>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/sim/intent", post(create_intent))
        .route("/v1/sim/intents/:payment_intent_id", get(get_intent))
        .route("/v1/sim/webhook/test", post(test_webhook))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .layer(middleware::from_fn_with_state(state.clone(), track_request))
        .with_state(state)
}

pub async fn run_http_server(
    port: u16,
    state: AppState,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Starting HTTP server on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn track_request(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    let start = Instant::now();

    let resp = next.run(req).await;

    let status = resp.status().as_u16();
    state.metrics.record_http_request(&route, status);
    info!(
        method = %method,
        route = %route,
        status,
        latency_ms = start.elapsed().as_millis() as u64,
        "HTTP request"
    );
    resp
}

async fn create_intent(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<CreatePaymentIntentRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(json) => json,
        Err(rejection) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "VALIDATION_FAILED",
                &format!("Invalid JSON payload: {rejection}"),
            );
        }
    };

    let idempotency_key = headers
        .get("Idempotency-Key")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    match state.service.create(req, idempotency_key).await {
        Ok(intent) => (
            StatusCode::OK,
            Json(json!({
                "payment_intent_id": intent.id,
                "status": intent.status,
                "next": "webhook",
            })),
        )
            .into_response(),
        Err(err) => sim_error_response(&err),
    }
}

async fn get_intent(
    State(state): State<AppState>,
    Path(payment_intent_id): Path<String>,
) -> Response {
    match state.service.get(&payment_intent_id).await {
        Ok(intent) => (StatusCode::OK, Json(intent)).into_response(),
        Err(err) => sim_error_response(&err),
    }
}

#[derive(Debug, Deserialize)]
struct TestWebhookRequest {
    payment_intent_id: String,
    #[serde(rename = "type")]
    kind: String,
    webhook_url: String,
}

async fn test_webhook(
    State(state): State<AppState>,
    payload: Result<Json<TestWebhookRequest>, JsonRejection>,
) -> Response {
    let Json(req) = match payload {
        Ok(json) => json,
        Err(rejection) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "VALIDATION_FAILED",
                &format!("Invalid JSON payload: {rejection}"),
            );
        }
    };

    if req.payment_intent_id.is_empty() || req.webhook_url.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "Missing required fields",
        );
    }
    let Some(kind) = WebhookType::parse(&req.kind) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "Invalid webhook type",
        );
    };

    match state
        .service
        .test_webhook(&req.payment_intent_id, kind, &req.webhook_url)
        .await
    {
        Ok(()) => (StatusCode::ACCEPTED, Json(json!({"sent": true}))).into_response(),
        Err(err) => sim_error_response(&err),
    }
}

async fn healthz() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

async fn readyz() -> impl IntoResponse {
    Json(json!({"status": "ready"}))
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics.render()
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

fn sim_error_response(err: &SimError) -> Response {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    error_response(status, err.code(), &err.to_string())
}

fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    (
        status,
        Json(ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message: message.to_string(),
            },
        }),
    )
        .into_response()
}

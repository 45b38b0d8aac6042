//! HTTP surface for the optimizer

use crate::auth::{bearer_token, AuthError};
use crate::metrics::MetricsSummary;
use crate::orchestrator::{Orchestrator, OrchestratorError};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

pub const OPTIMIZER_PATH: &str = "/blueprint-optimizer";

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route(OPTIMIZER_PATH, post(optimize_blueprint).options(preflight))
        .route(
            &format!("/functions/v1{}", OPTIMIZER_PATH),
            post(optimize_blueprint).options(preflight),
        )
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn stats(State(state): State<AppState>) -> Json<MetricsSummary> {
    Json(state.orchestrator.metrics().summary())
}

async fn preflight() -> StatusCode {
    StatusCode::OK
}

async fn optimize_blueprint(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let token = bearer_token(&headers);

    match state.orchestrator.handle(token, &body).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => error_response(e),
    }
}

fn error_response(err: OrchestratorError) -> Response {
    let status = match &err {
        OrchestratorError::Auth(AuthError::MissingToken | AuthError::InvalidToken) => {
            StatusCode::UNAUTHORIZED
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!("Optimization request failed: {}", err);
    }

    let body = json!({
        "success": false,
        "error": err.to_string(),
    });
    (status, Json(body)).into_response()
}

//! HTTP surface
//!
//! Handlers only translate between HTTP and the payment services. Ignored notifications answer
//! 200 so gateways stop redelivering them; genuine failures answer with the error's status so the
//! gateway retries later.

pub mod notifications;
pub mod payments;

use crate::error::{ErrorKind, ReconcileError};
use crate::health::HealthChecker;
use crate::services::{AppStoreService, PlayStoreService};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

#[derive(Clone)]
pub struct AppState {
    pub app_store: Arc<AppStoreService>,
    pub play_store: Arc<PlayStoreService>,
    pub health: HealthChecker,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/payments/appstore", post(payments::confirm_app_store))
        .route("/payments/playstore", post(payments::confirm_play_store))
        .route(
            "/notifications/appstore",
            post(notifications::app_store_notification),
        )
        .route(
            "/notifications/playstore",
            post(notifications::play_store_notification),
        )
        .with_state(state)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

/// Standardized error body
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub code: ErrorKind,
    pub message: String,
    pub retryable: bool,
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn from_error(error: &ReconcileError) -> Self {
        Self {
            code: error.kind(),
            message: error.user_message(),
            retryable: error.is_retryable(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl IntoResponse for ReconcileError {
    fn into_response(self) -> Response {
        let status_code =
            StatusCode::from_u16(self.http_status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status_code.is_server_error() {
            error!(error = %self, kind = %self.kind(), status = status_code.as_u16(), "Server error occurred");
        } else {
            warn!(error = %self, kind = %self.kind(), status = status_code.as_u16(), "Client error occurred");
        }

        (status_code, Json(ErrorResponse::from_error(&self))).into_response()
    }
}

/// Success envelope shared by every payment endpoint
pub(crate) fn ok<T: Serialize>(outcome: T) -> Response {
    (
        StatusCode::OK,
        Json(serde_json::json!({"status": "ok", "outcome": outcome})),
    )
        .into_response()
}

pub(crate) fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

async fn health(State(state): State<AppState>) -> Response {
    let status = state.health.check_health().await;
    let code = if status.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(status)).into_response()
}

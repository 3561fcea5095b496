use axum::{extract::State, response::Response, Json};
use tracing::info;

use super::{ok, AppState};
use crate::error::ReconcileError;
use crate::payments::appstore::types::AppStoreNotification;
use crate::payments::playstore::types::RtdnEnvelope;
use crate::payments::types::{PayWay, PaymentContext};

/// POST /notifications/appstore
pub async fn app_store_notification(
    State(state): State<AppState>,
    Json(notification): Json<AppStoreNotification>,
) -> Result<Response, ReconcileError> {
    let mut ctx = PaymentContext::for_pay_way(PayWay::AppStore);
    let outcome = state
        .app_store
        .handle_notification(&mut ctx, &notification, &[])
        .await?;

    info!(outcome = ?outcome, "App Store notification handled");
    Ok(ok(outcome))
}

/// POST /notifications/playstore
pub async fn play_store_notification(
    State(state): State<AppState>,
    Json(envelope): Json<RtdnEnvelope>,
) -> Result<Response, ReconcileError> {
    let mut ctx = PaymentContext::for_pay_way(PayWay::PlayStore);
    let outcome = state
        .play_store
        .handle_notification(&mut ctx, &envelope, &[])
        .await?;

    info!(outcome = ?outcome, "Play Store notification handled");
    Ok(ok(outcome))
}

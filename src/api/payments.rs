use axum::{extract::State, http::HeaderMap, response::Response, Json};
use tracing::info;

use super::{header, ok, AppState};
use crate::error::ReconcileError;
use crate::payments::types::{PayWay, PaymentContext, PaymentRequest};

fn context(mut request: PaymentRequest, pay_way: PayWay, headers: &HeaderMap) -> PaymentContext {
    // The route decides the gateway, not the body.
    request.pay_way = pay_way;
    let mut ctx = PaymentContext::new(request);
    ctx.uid = header(headers, "x-user-id");
    ctx.client_ip = header(headers, "x-forwarded-for")
        .and_then(|ips| ips.split(',').next().map(|ip| ip.trim().to_string()));
    ctx
}

/// POST /payments/appstore
pub async fn confirm_app_store(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<PaymentRequest>,
) -> Result<Response, ReconcileError> {
    let mut ctx = context(request, PayWay::AppStore, &headers);
    info!(transaction_id = %ctx.request.transaction_id, "App Store payment confirmation");

    let outcome = state.app_store.confirm_payment(&mut ctx).await?;
    Ok(ok(outcome))
}

/// POST /payments/playstore
pub async fn confirm_play_store(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<PaymentRequest>,
) -> Result<Response, ReconcileError> {
    let mut ctx = context(request, PayWay::PlayStore, &headers);
    info!(
        subscription = ctx.request.play_store.subscription,
        "Play Store payment confirmation"
    );

    let outcome = state.play_store.confirm_payment(&mut ctx).await?;
    Ok(ok(outcome))
}

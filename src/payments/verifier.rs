//! Bounded-retry trust verification
//!
//! The retry only absorbs transient failures of the trust authority. A semantically rejected
//! receipt is returned on the first attempt.

use crate::error::{ReconcileError, ReconcileResult};
use crate::payments::appstore::types::IapResponse;
use crate::payments::types::{AppStoreIapRequest, PayWay};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Receipt validated successfully
pub const STATUS_OK: i64 = 0;
/// Sandbox receipt sent to the production endpoint
pub const STATUS_SANDBOX_RECEIPT: i64 = 21007;

/// Run `call` until it succeeds, fails permanently, or `max_attempts` is used up.
///
/// Always makes at least one attempt. Retries fire immediately.
pub async fn verify_with_retry<T, F, Fut>(
    label: &str,
    max_attempts: u32,
    mut call: F,
) -> ReconcileResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ReconcileResult<T>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match call().await {
            Ok(value) => {
                if attempt > 1 {
                    info!(label = %label, attempt, "verification succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if !err.is_retryable() => {
                warn!(label = %label, attempt, error = %err, "verification rejected");
                return Err(err);
            }
            Err(err) if attempt >= max_attempts => {
                error!(
                    label = %label,
                    attempts = attempt,
                    error = %err,
                    "verification attempts exhausted"
                );
                return Err(err);
            }
            Err(err) => {
                warn!(
                    label = %label,
                    attempt,
                    max_attempts,
                    error = %err,
                    "transient verification failure, retrying"
                );
            }
        }
    }
}

/// Transient `verifyReceipt` statuses worth another attempt
pub fn is_transient_status(status: i64) -> bool {
    matches!(status, 21005 | 21009 | 21100..=21199)
}

fn status_message(status: i64) -> &'static str {
    match status {
        21000 => "request to the App Store was malformed",
        21002 => "receipt data was malformed",
        21003 => "receipt could not be authenticated",
        21004 => "shared secret does not match",
        21005 => "receipt server is temporarily unavailable",
        21006 => "subscription has expired",
        21007 => "sandbox receipt sent to production",
        21008 => "production receipt sent to sandbox",
        21009 => "internal data access error",
        21010 => "user account cannot be found or has been deleted",
        21100..=21199 => "internal data access error",
        _ => "unknown receipt status",
    }
}

/// Map a `verifyReceipt` status to success or a typed verification failure
pub fn check_status(response: IapResponse) -> ReconcileResult<IapResponse> {
    if response.status == STATUS_OK {
        return Ok(response);
    }

    Err(ReconcileError::TrustVerificationFailed {
        gateway: PayWay::AppStore,
        status: Some(response.status),
        message: status_message(response.status).to_string(),
        retryable: is_transient_status(response.status) || response.is_retryable,
    })
}

/// The App Store's receipt validation endpoint
#[async_trait]
pub trait ReceiptAuthority: Send + Sync {
    /// One round-trip; the status inside the response is not interpreted
    async fn verify_receipt(&self, request: &AppStoreIapRequest) -> ReconcileResult<IapResponse>;
}

pub struct ReceiptVerifier {
    authority: Arc<dyn ReceiptAuthority>,
    bundle_id: String,
}

impl ReceiptVerifier {
    pub fn new(authority: Arc<dyn ReceiptAuthority>, bundle_id: impl Into<String>) -> Self {
        Self {
            authority,
            bundle_id: bundle_id.into(),
        }
    }

    pub fn bundle_id(&self) -> &str {
        &self.bundle_id
    }

    /// Verify a receipt with bounded retry, then bind it to the configured bundle
    pub async fn verify(
        &self,
        request: &AppStoreIapRequest,
        max_attempts: u32,
    ) -> ReconcileResult<IapResponse> {
        let authority = &self.authority;
        let response = verify_with_retry("app_store.verify_receipt", max_attempts, || async move {
            check_status(authority.verify_receipt(request).await?)
        })
        .await?;

        bind_identity("bundle_id", &self.bundle_id, &response.receipt.bundle_id)?;
        Ok(response)
    }
}

/// Reject records issued to another app
pub fn bind_identity(field: &str, expected: &str, actual: &str) -> ReconcileResult<()> {
    if expected != actual {
        error!(
            target: "iap_reconciler::security",
            field = %field,
            expected = %expected,
            actual = %actual,
            "verified purchase does not match the claimed identity"
        );
        return Err(ReconcileError::IdentityMismatch {
            field: field.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        });
    }
    Ok(())
}

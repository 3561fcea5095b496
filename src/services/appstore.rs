//! App Store payment flows
//!
//! Client-confirmed receipts go through bounded-retry verification before reaching the engine.
//! Server notifications are authenticated by the shared secret, and their embedded receipt is
//! re-verified; the notification body itself is only a signal.

use crate::config::{AppStoreConfig, GatewayConfig};
use crate::error::{ReconcileError, ReconcileResult};
use crate::payments::appstore::types::{latest_transaction, AppStoreInApp, AppStoreNotification};
use crate::payments::classifier::{app_store_event, LifecycleEvent, ReconcileAction};
use crate::payments::http::secure_eq;
use crate::payments::types::{AppStoreIapRequest, PaymentContext, PurchaseRecord};
use crate::payments::verifier::{bind_identity, ReceiptVerifier};
use crate::services::attach_recovery::AttachRecovery;
use crate::services::reconciler::{ReconcileOutcome, ReconciliationEngine};
use crate::services::NotificationOutcome;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Caller-supplied predicate; returning `false` drops the notification
pub type AppStoreFilter = dyn Fn(&AppStoreInApp) -> bool + Send + Sync;

pub struct AppStoreService {
    engine: Arc<ReconciliationEngine>,
    verifier: ReceiptVerifier,
    attach: AttachRecovery,
    shared_secret: String,
    max_attempts: u32,
}

impl AppStoreService {
    pub fn new(
        engine: Arc<ReconciliationEngine>,
        verifier: ReceiptVerifier,
        attach: AttachRecovery,
        config: &AppStoreConfig,
        gateway: &GatewayConfig,
    ) -> Self {
        Self {
            engine,
            verifier,
            attach,
            shared_secret: config.shared_secret.clone(),
            max_attempts: gateway.verify_max_attempts,
        }
    }

    /// Verify a client-submitted receipt and apply the transaction it names
    pub async fn confirm_payment(
        &self,
        ctx: &mut PaymentContext,
    ) -> ReconcileResult<ReconcileOutcome> {
        let transaction_id = ctx.request.transaction_id.clone();
        self.attach.prepare(ctx, &transaction_id).await;

        let mut request = ctx.request.app_store.clone();
        request.password = self.shared_secret.clone();
        let response = self.verifier.verify(&request, self.max_attempts).await?;

        let inapp = response
            .find_transaction(&transaction_id)
            .cloned()
            .ok_or_else(|| ReconcileError::TransactionNotFound {
                transaction_id: transaction_id.clone(),
            })?;

        let outcome = self
            .engine
            .invoke(ctx, &PurchaseRecord::AppStore(inapp))
            .await?;
        self.attach.release(&transaction_id).await;
        Ok(outcome)
    }

    pub async fn handle_notification(
        &self,
        ctx: &mut PaymentContext,
        notification: &AppStoreNotification,
        filters: &[&AppStoreFilter],
    ) -> ReconcileResult<NotificationOutcome> {
        self.authenticate(notification)?;

        let event = app_store_event(&notification.notification_type);
        info!(
            notification_type = %notification.notification_type,
            event = %event,
            environment = %notification.environment,
            "app store notification received"
        );

        let action = event.action();
        // First purchases are applied by the client path, which carries the attach.
        if action == ReconcileAction::Ignore || event == LifecycleEvent::InitialPurchase {
            return Ok(NotificationOutcome::Ignored { event });
        }

        let transactions = self.authoritative_transactions(notification).await?;
        let inapp = latest_transaction(&transactions).cloned().ok_or_else(|| {
            ReconcileError::TransactionNotFound {
                transaction_id: notification.original_transaction_id.clone(),
            }
        })?;

        if !filters.iter().all(|filter| filter(&inapp)) {
            return Ok(NotificationOutcome::Filtered);
        }

        let purchase = PurchaseRecord::AppStore(inapp);
        let outcome = match action {
            ReconcileAction::Invoke => self.engine.invoke(ctx, &purchase).await?,
            ReconcileAction::Revoke => self.engine.revoke(ctx, &purchase).await?,
            ReconcileAction::Ignore => return Ok(NotificationOutcome::Ignored { event }),
        };
        Ok(NotificationOutcome::Applied(outcome))
    }

    fn authenticate(&self, notification: &AppStoreNotification) -> ReconcileResult<()> {
        if !secure_eq(
            notification.password.as_bytes(),
            self.shared_secret.as_bytes(),
        ) {
            error!(
                target: "iap_reconciler::security",
                bid = %notification.bid,
                "app store notification carries a wrong shared secret"
            );
            return Err(ReconcileError::IdentityMismatch {
                field: "password".to_string(),
                expected: "<shared secret>".to_string(),
                actual: "<redacted>".to_string(),
            });
        }
        bind_identity("bid", self.verifier.bundle_id(), &notification.bid)
    }

    /// Transactions from a fresh verification of the notification's latest receipt
    async fn authoritative_transactions(
        &self,
        notification: &AppStoreNotification,
    ) -> ReconcileResult<Vec<AppStoreInApp>> {
        let unified = &notification.unified_receipt;
        if unified.latest_receipt.is_empty() {
            warn!("notification carries no receipt, using embedded transactions");
            return Ok(unified.latest_receipt_info.clone());
        }

        let request = AppStoreIapRequest {
            receipt_data: unified.latest_receipt.clone(),
            password: self.shared_secret.clone(),
            exclude_old_transactions: false,
        };
        let response = self.verifier.verify(&request, self.max_attempts).await?;
        if response.latest_receipt_info.is_empty() {
            Ok(response.receipt.in_app)
        } else {
            Ok(response.latest_receipt_info)
        }
    }
}

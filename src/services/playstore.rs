//! Google Play payment flows
//!
//! Purchase state always comes from a publisher re-query. Acknowledgement is sent only after the
//! engine has applied the purchase; an unacknowledged purchase is redelivered by Play, an
//! acknowledged but unapplied one is lost.

use crate::config::{GatewayConfig, PlayStoreConfig};
use crate::error::{ReconcileError, ReconcileResult};
use crate::logging::mask_token;
use crate::payments::classifier::{
    play_product_event, play_subscription_event, subscription_action, LifecycleEvent,
    ReconcileAction,
};
use crate::payments::playstore::publisher::PublisherService;
use crate::payments::playstore::types::{
    DeveloperNotification, OneTimeProductNotification, PlayStorePurchase, ProductPurchase,
    RtdnEnvelope, SubscriptionNotification, SubscriptionPurchase, PAYMENT_STATE_FREE_TRIAL,
    PAYMENT_STATE_RECEIVED,
};
use crate::payments::types::{PayWay, PaymentContext, PurchaseRecord};
use crate::payments::verifier::{bind_identity, verify_with_retry};
use crate::services::attach_recovery::AttachRecovery;
use crate::services::reconciler::{ReconcileOutcome, ReconciliationEngine};
use crate::services::NotificationOutcome;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Caller-supplied predicate; returning `false` drops the notification
pub type PlayStoreFilter = dyn Fn(&DeveloperNotification) -> bool + Send + Sync;

pub struct PlayStoreService {
    engine: Arc<ReconciliationEngine>,
    publisher: Arc<dyn PublisherService>,
    attach: AttachRecovery,
    package_name: String,
    max_attempts: u32,
}

impl PlayStoreService {
    pub fn new(
        engine: Arc<ReconciliationEngine>,
        publisher: Arc<dyn PublisherService>,
        attach: AttachRecovery,
        config: &PlayStoreConfig,
        gateway: &GatewayConfig,
    ) -> Self {
        Self {
            engine,
            publisher,
            attach,
            package_name: config.package_name.clone(),
            max_attempts: gateway.verify_max_attempts,
        }
    }

    /// Confirm a purchase reported by the client and apply it
    pub async fn confirm_payment(
        &self,
        ctx: &mut PaymentContext,
    ) -> ReconcileResult<ReconcileOutcome> {
        let mut purchase = PlayStorePurchase::from_json(&ctx.request.play_store.purchase_data)?;
        bind_identity("package_name", &self.package_name, &purchase.package_name)?;

        let trade_no = purchase.order_id.clone();
        self.attach.prepare(ctx, &trade_no).await;

        let is_subscription = ctx.request.play_store.subscription;
        let (needs_ack, developer_payload) = if is_subscription {
            let state = self
                .query_subscription(&purchase.product_id, &purchase.purchase_token)
                .await?;
            if !matches!(
                state.payment_state,
                Some(PAYMENT_STATE_RECEIVED | PAYMENT_STATE_FREE_TRIAL)
            ) {
                return Err(ReconcileError::TrustVerificationFailed {
                    gateway: PayWay::PlayStore,
                    status: state.payment_state.map(i64::from),
                    message: "subscription payment has not been received".to_string(),
                    retryable: false,
                });
            }
            // The publisher is queried by token; the order id in purchase_data is only a claim.
            bind_identity("order_id", &state.order_id, &purchase.order_id)?;
            let ack = (state.needs_acknowledgement(), state.developer_payload.clone());
            purchase.subscription = Some(state);
            ack
        } else {
            let product = self
                .query_product(&purchase.product_id, &purchase.purchase_token)
                .await?;
            if !product.is_purchased() {
                return Err(ReconcileError::TrustVerificationFailed {
                    gateway: PayWay::PlayStore,
                    status: Some(i64::from(product.purchase_state)),
                    message: "product purchase is not completed".to_string(),
                    retryable: false,
                });
            }
            bind_identity("order_id", &product.order_id, &purchase.order_id)?;
            (product.needs_acknowledgement(), product.developer_payload)
        };

        let product_id = purchase.product_id.clone();
        let token = purchase.purchase_token.clone();
        let outcome = self
            .engine
            .invoke(ctx, &PurchaseRecord::PlayStore(purchase))
            .await?;

        if needs_ack {
            self.acknowledge(is_subscription, &product_id, &token, &developer_payload)
                .await?;
        }
        self.attach.release(&trade_no).await;
        Ok(outcome)
    }

    pub async fn handle_notification(
        &self,
        ctx: &mut PaymentContext,
        envelope: &RtdnEnvelope,
        filters: &[&PlayStoreFilter],
    ) -> ReconcileResult<NotificationOutcome> {
        let notification = envelope.developer_notification()?;
        let event = classify(&notification);
        info!(
            package_name = %notification.package_name,
            message_id = %envelope.message.message_id,
            event = %event,
            "play store notification received"
        );

        if notification.package_name != self.package_name {
            warn!(
                package_name = %notification.package_name,
                expected = %self.package_name,
                "notification for a foreign package ignored"
            );
            return Ok(NotificationOutcome::Ignored { event });
        }

        if !filters.iter().all(|filter| filter(&notification)) {
            return Ok(NotificationOutcome::Filtered);
        }

        if let Some(product) = &notification.one_time_product_notification {
            return self.handle_product(ctx, product, event).await;
        }
        if let Some(subscription) = &notification.subscription_notification {
            return self.handle_subscription(ctx, subscription, event).await;
        }
        Ok(NotificationOutcome::Ignored { event })
    }

    async fn handle_product(
        &self,
        ctx: &mut PaymentContext,
        notification: &OneTimeProductNotification,
        event: LifecycleEvent,
    ) -> ReconcileResult<NotificationOutcome> {
        if event != LifecycleEvent::InitialPurchase {
            return Ok(NotificationOutcome::Ignored { event });
        }

        let product = self
            .query_product(&notification.sku, &notification.purchase_token)
            .await?;
        if !product.is_purchased() || !product.needs_acknowledgement() {
            debug!(
                order_id = %product.order_id,
                purchase_state = product.purchase_state,
                acknowledgement_state = product.acknowledgement_state,
                "product purchase needs no processing"
            );
            return Ok(NotificationOutcome::Ignored { event });
        }

        let record = self.product_record(notification, &product);
        let outcome = self
            .engine
            .invoke(ctx, &PurchaseRecord::PlayStore(record))
            .await?;

        self.acknowledge(
            false,
            &notification.sku,
            &notification.purchase_token,
            &product.developer_payload,
        )
        .await?;
        Ok(NotificationOutcome::Applied(outcome))
    }

    async fn handle_subscription(
        &self,
        ctx: &mut PaymentContext,
        notification: &SubscriptionNotification,
        event: LifecycleEvent,
    ) -> ReconcileResult<NotificationOutcome> {
        if event.action() == ReconcileAction::Ignore {
            return Ok(NotificationOutcome::Ignored { event });
        }

        let state = self
            .query_subscription(&notification.subscription_id, &notification.purchase_token)
            .await?;
        let action = subscription_action(event, state.payment_state);
        let needs_ack = state.needs_acknowledgement();
        let developer_payload = state.developer_payload.clone();

        let purchase = PurchaseRecord::PlayStore(self.subscription_record(notification, state));
        let outcome = match action {
            ReconcileAction::Invoke => self.engine.invoke(ctx, &purchase).await?,
            ReconcileAction::Revoke => self.engine.revoke(ctx, &purchase).await?,
            ReconcileAction::Ignore => {
                debug!(event = %event, "subscription state is not eligible for action");
                return Ok(NotificationOutcome::Ignored { event });
            }
        };

        if needs_ack {
            self.acknowledge(
                true,
                &notification.subscription_id,
                &notification.purchase_token,
                &developer_payload,
            )
            .await?;
        }
        Ok(NotificationOutcome::Applied(outcome))
    }

    async fn query_subscription(
        &self,
        subscription_id: &str,
        token: &str,
    ) -> ReconcileResult<SubscriptionPurchase> {
        let publisher = &self.publisher;
        let package_name = self.package_name.as_str();
        verify_with_retry("play_store.verify_subscription", self.max_attempts, || {
            publisher.verify_subscription(package_name, subscription_id, token)
        })
        .await
    }

    async fn query_product(&self, product_id: &str, token: &str) -> ReconcileResult<ProductPurchase> {
        let publisher = &self.publisher;
        let package_name = self.package_name.as_str();
        verify_with_retry("play_store.verify_product", self.max_attempts, || {
            publisher.verify_product(package_name, product_id, token)
        })
        .await
    }

    async fn acknowledge(
        &self,
        subscription: bool,
        id: &str,
        token: &str,
        developer_payload: &str,
    ) -> ReconcileResult<()> {
        let result = if subscription {
            self.publisher
                .acknowledge_subscription(&self.package_name, id, token, developer_payload)
                .await
        } else {
            self.publisher
                .acknowledge_product(&self.package_name, id, token, developer_payload)
                .await
        };

        match &result {
            Ok(()) => debug!(id = %id, token = %mask_token(token), "purchase acknowledged"),
            Err(e) => warn!(
                id = %id,
                token = %mask_token(token),
                error = %e,
                "acknowledgement failed after purchase was applied"
            ),
        }
        result
    }

    fn product_record(
        &self,
        notification: &OneTimeProductNotification,
        product: &ProductPurchase,
    ) -> PlayStorePurchase {
        let product_id = if product.product_id.is_empty() {
            notification.sku.clone()
        } else {
            product.product_id.clone()
        };

        PlayStorePurchase {
            auto_renewing: false,
            order_id: product.order_id.clone(),
            package_name: self.package_name.clone(),
            product_id,
            purchase_time: product.purchase_time_millis.parse().unwrap_or(0),
            purchase_state: product.purchase_state,
            developer_payload: product.developer_payload.clone(),
            purchase_token: notification.purchase_token.clone(),
            acknowledged: !product.needs_acknowledgement(),
            subscription: None,
        }
    }

    fn subscription_record(
        &self,
        notification: &SubscriptionNotification,
        state: SubscriptionPurchase,
    ) -> PlayStorePurchase {
        PlayStorePurchase {
            auto_renewing: state.auto_renewing,
            order_id: state.order_id.clone(),
            package_name: self.package_name.clone(),
            product_id: notification.subscription_id.clone(),
            purchase_time: state.start_time_millis.parse().unwrap_or(0),
            purchase_state: 0,
            developer_payload: state.developer_payload.clone(),
            purchase_token: notification.purchase_token.clone(),
            acknowledged: !state.needs_acknowledgement(),
            subscription: Some(state),
        }
    }
}

fn classify(notification: &DeveloperNotification) -> LifecycleEvent {
    if notification.test_notification.is_some() {
        return LifecycleEvent::Test;
    }
    if let Some(product) = &notification.one_time_product_notification {
        return play_product_event(product.notification_type);
    }
    if let Some(subscription) = &notification.subscription_notification {
        return play_subscription_event(subscription.notification_type);
    }
    LifecycleEvent::Unrecognized
}

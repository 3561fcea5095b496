//! Notification classification
//!
//! Gateway notification codes map to a closed set of lifecycle events, and events map to the
//! action the engine takes. Both mappings are pure.

use crate::payments::playstore::types::{PAYMENT_STATE_FREE_TRIAL, PAYMENT_STATE_RECEIVED};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    InitialPurchase,
    Renewed,
    Recovered,
    Restarted,
    Canceled,
    Revoked,
    Refunded,
    Expired,
    OnHold,
    GracePeriod,
    Deferred,
    Paused,
    /// Plan, price or renewal-preference change
    Changed,
    Test,
    Unrecognized,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileAction {
    Invoke,
    Revoke,
    Ignore,
}

impl LifecycleEvent {
    pub fn action(&self) -> ReconcileAction {
        match self {
            LifecycleEvent::InitialPurchase
            | LifecycleEvent::Renewed
            | LifecycleEvent::Recovered
            | LifecycleEvent::Restarted => ReconcileAction::Invoke,
            LifecycleEvent::Revoked => ReconcileAction::Revoke,
            _ => ReconcileAction::Ignore,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleEvent::InitialPurchase => "initial_purchase",
            LifecycleEvent::Renewed => "renewed",
            LifecycleEvent::Recovered => "recovered",
            LifecycleEvent::Restarted => "restarted",
            LifecycleEvent::Canceled => "canceled",
            LifecycleEvent::Revoked => "revoked",
            LifecycleEvent::Refunded => "refunded",
            LifecycleEvent::Expired => "expired",
            LifecycleEvent::OnHold => "on_hold",
            LifecycleEvent::GracePeriod => "grace_period",
            LifecycleEvent::Deferred => "deferred",
            LifecycleEvent::Paused => "paused",
            LifecycleEvent::Changed => "changed",
            LifecycleEvent::Test => "test",
            LifecycleEvent::Unrecognized => "unrecognized",
        }
    }
}

impl std::fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Action for a Play subscription event given the authoritative `paymentState`.
///
/// Only a received payment (state 1) grants entitlement. Revocation applies to paid and trial
/// subscriptions.
pub fn subscription_action(event: LifecycleEvent, payment_state: Option<i32>) -> ReconcileAction {
    match (event.action(), payment_state) {
        (ReconcileAction::Invoke, Some(PAYMENT_STATE_RECEIVED)) => ReconcileAction::Invoke,
        (ReconcileAction::Revoke, Some(PAYMENT_STATE_RECEIVED | PAYMENT_STATE_FREE_TRIAL)) => {
            ReconcileAction::Revoke
        }
        _ => ReconcileAction::Ignore,
    }
}

/// Play real-time developer notification, `subscriptionNotification.notificationType`
pub fn play_subscription_event(notification_type: i32) -> LifecycleEvent {
    match notification_type {
        1 => LifecycleEvent::Recovered,
        2 => LifecycleEvent::Renewed,
        3 => LifecycleEvent::Canceled,
        4 => LifecycleEvent::InitialPurchase,
        5 => LifecycleEvent::OnHold,
        6 => LifecycleEvent::GracePeriod,
        7 => LifecycleEvent::Restarted,
        8 => LifecycleEvent::Changed,
        9 => LifecycleEvent::Deferred,
        10 => LifecycleEvent::Paused,
        11 => LifecycleEvent::Changed,
        12 => LifecycleEvent::Revoked,
        13 => LifecycleEvent::Expired,
        _ => LifecycleEvent::Unrecognized,
    }
}

/// Play real-time developer notification, `oneTimeProductNotification.notificationType`
pub fn play_product_event(notification_type: i32) -> LifecycleEvent {
    match notification_type {
        1 => LifecycleEvent::InitialPurchase,
        2 => LifecycleEvent::Canceled,
        _ => LifecycleEvent::Unrecognized,
    }
}

/// App Store server notification (v1) `notification_type`
pub fn app_store_event(notification_type: &str) -> LifecycleEvent {
    match notification_type {
        "INITIAL_BUY" => LifecycleEvent::InitialPurchase,
        "DID_RENEW" => LifecycleEvent::Renewed,
        // RENEWAL is no longer sent but older sandboxes still replay it.
        "DID_RECOVER" | "RENEWAL" => LifecycleEvent::Recovered,
        "INTERACTIVE_RENEWAL" => LifecycleEvent::Restarted,
        "CANCEL" => LifecycleEvent::Canceled,
        "REFUND" => LifecycleEvent::Refunded,
        "REVOKE" => LifecycleEvent::Revoked,
        "DID_FAIL_TO_RENEW" => LifecycleEvent::OnHold,
        "DID_CHANGE_RENEWAL_PREF" | "DID_CHANGE_RENEWAL_STATUS" | "PRICE_INCREASE_CONSENT" => {
            LifecycleEvent::Changed
        }
        _ => LifecycleEvent::Unrecognized,
    }
}

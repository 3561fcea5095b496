use crate::error::{ReconcileError, ReconcileResult};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

/// `paymentState` of a subscription that has been paid
pub const PAYMENT_STATE_RECEIVED: i32 = 1;
/// `paymentState` of a subscription in its free trial
pub const PAYMENT_STATE_FREE_TRIAL: i32 = 2;
/// `purchaseState` of a completed one-time purchase
pub const PURCHASE_STATE_PURCHASED: i32 = 0;
/// `acknowledgementState` before the developer acknowledged the purchase
pub const ACK_STATE_PENDING: i32 = 0;

/// Purchase data as produced by the Play billing library on the device
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct PlayStorePurchase {
    pub auto_renewing: bool,
    pub order_id: String,
    pub package_name: String,
    pub product_id: String,
    /// Milliseconds since epoch
    pub purchase_time: i64,
    pub purchase_state: i32,
    pub developer_payload: String,
    pub purchase_token: String,
    pub acknowledged: bool,
    /// Authoritative subscription state from the publisher API, never taken from the client
    #[serde(skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub subscription: Option<SubscriptionPurchase>,
}

impl PlayStorePurchase {
    pub fn from_json(data: &str) -> ReconcileResult<Self> {
        serde_json::from_str(data).map_err(|e| ReconcileError::InvalidNotification {
            message: format!("invalid purchase data: {}", e),
        })
    }
}

/// Publisher API `purchases.subscriptions` resource
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct SubscriptionPurchase {
    pub kind: String,
    pub start_time_millis: String,
    pub expiry_time_millis: String,
    pub auto_renewing: bool,
    pub price_currency_code: String,
    pub price_amount_micros: String,
    pub country_code: String,
    pub developer_payload: String,
    pub payment_state: Option<i32>,
    pub cancel_reason: Option<i32>,
    pub order_id: String,
    pub linked_purchase_token: String,
    pub purchase_type: Option<i32>,
    pub acknowledgement_state: i32,
    pub obfuscated_external_account_id: String,
}

impl SubscriptionPurchase {
    pub fn needs_acknowledgement(&self) -> bool {
        self.acknowledgement_state == ACK_STATE_PENDING
    }
}

/// Publisher API `purchases.products` resource
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ProductPurchase {
    pub kind: String,
    pub purchase_time_millis: String,
    pub purchase_state: i32,
    pub consumption_state: i32,
    pub developer_payload: String,
    pub order_id: String,
    pub purchase_type: Option<i32>,
    pub acknowledgement_state: i32,
    pub purchase_token: String,
    pub product_id: String,
    pub quantity: Option<i32>,
    pub region_code: String,
}

impl ProductPurchase {
    pub fn needs_acknowledgement(&self) -> bool {
        self.acknowledgement_state == ACK_STATE_PENDING
    }

    pub fn is_purchased(&self) -> bool {
        self.purchase_state == PURCHASE_STATE_PURCHASED
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct OneTimeProductNotification {
    pub version: String,
    pub notification_type: i32,
    pub purchase_token: String,
    pub sku: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct SubscriptionNotification {
    pub version: String,
    pub notification_type: i32,
    pub purchase_token: String,
    pub subscription_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TestNotification {
    pub version: String,
}

/// Real-time developer notification, as carried inside the Pub/Sub message
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct DeveloperNotification {
    pub version: String,
    pub package_name: String,
    pub event_time_millis: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub one_time_product_notification: Option<OneTimeProductNotification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription_notification: Option<SubscriptionNotification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_notification: Option<TestNotification>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct RtdnMessage {
    /// Base64-encoded JSON [`DeveloperNotification`]
    pub data: String,
    pub message_id: String,
}

/// Pub/Sub push envelope
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RtdnEnvelope {
    pub subscription: String,
    pub message: RtdnMessage,
}

impl RtdnEnvelope {
    pub fn from_notification(
        subscription: impl Into<String>,
        notification: &DeveloperNotification,
    ) -> ReconcileResult<Self> {
        let json = serde_json::to_vec(notification).map_err(|e| {
            ReconcileError::InvalidNotification {
                message: format!("failed to encode developer notification: {}", e),
            }
        })?;

        Ok(Self {
            subscription: subscription.into(),
            message: RtdnMessage {
                data: STANDARD.encode(json),
                message_id: String::new(),
            },
        })
    }

    pub fn developer_notification(&self) -> ReconcileResult<DeveloperNotification> {
        let raw = STANDARD
            .decode(self.message.data.trim())
            .map_err(|e| ReconcileError::InvalidNotification {
                message: format!("notification data is not base64: {}", e),
            })?;

        serde_json::from_slice(&raw).map_err(|e| ReconcileError::InvalidNotification {
            message: format!("notification data is not a developer notification: {}", e),
        })
    }
}

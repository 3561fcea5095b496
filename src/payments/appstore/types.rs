use serde::{Deserialize, Serialize};

/// One transaction inside a verified App Store receipt.
///
/// Apple encodes every numeric field as a string; they are kept as-is so records round-trip into
/// the ledger unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppStoreInApp {
    pub quantity: String,
    pub product_id: String,
    pub transaction_id: String,
    pub original_transaction_id: String,
    pub web_order_line_item_id: String,
    pub purchase_date_ms: String,
    pub original_purchase_date_ms: String,
    pub expires_date_ms: String,
    pub cancellation_date_ms: String,
    pub is_trial_period: String,
    pub is_in_intro_offer_period: String,
}

impl AppStoreInApp {
    /// Purchase time in milliseconds; unparsable values sort first
    pub fn purchase_time_ms(&self) -> i64 {
        self.purchase_date_ms.parse().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Receipt {
    pub receipt_type: String,
    pub bundle_id: String,
    pub application_version: String,
    pub in_app: Vec<AppStoreInApp>,
}

/// `verifyReceipt` response body
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IapResponse {
    pub status: i64,
    pub environment: String,
    pub receipt: Receipt,
    pub latest_receipt_info: Vec<AppStoreInApp>,
    pub latest_receipt: String,
    #[serde(rename = "is-retryable")]
    pub is_retryable: bool,
}

impl IapResponse {
    /// Look up a transaction, preferring the renewal history over the receipt body
    pub fn find_transaction(&self, transaction_id: &str) -> Option<&AppStoreInApp> {
        self.latest_receipt_info
            .iter()
            .find(|inapp| inapp.transaction_id == transaction_id)
            .or_else(|| {
                self.receipt
                    .in_app
                    .iter()
                    .find(|inapp| inapp.transaction_id == transaction_id)
            })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct UnifiedReceipt {
    pub environment: String,
    pub latest_receipt: String,
    pub latest_receipt_info: Vec<AppStoreInApp>,
    pub status: i64,
}

/// App Store server-to-server notification (version 1)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppStoreNotification {
    pub environment: String,
    pub notification_type: String,
    /// Shared secret echoed back by Apple
    pub password: String,
    /// Bundle id
    pub bid: String,
    /// Bundle version
    pub bvrs: String,
    pub original_transaction_id: String,
    pub auto_renew_status: String,
    pub auto_renew_product_id: String,
    pub unified_receipt: UnifiedReceipt,
}

/// Most recent transaction by purchase time
pub fn latest_transaction(transactions: &[AppStoreInApp]) -> Option<&AppStoreInApp> {
    transactions
        .iter()
        .filter(|inapp| inapp.purchase_time_ms() > 0)
        .max_by_key(|inapp| inapp.purchase_time_ms())
}

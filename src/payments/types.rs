use crate::error::{ReconcileError, ReconcileResult};
use crate::payments::appstore::types::AppStoreInApp;
use crate::payments::identity::TransactionIdentity;
use crate::payments::playstore::types::{PlayStorePurchase, PAYMENT_STATE_FREE_TRIAL};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PayWay {
    AppStore,
    PlayStore,
    Alipay,
    #[serde(rename = "wechat")]
    WeChat,
    #[serde(rename = "paypal")]
    PayPal,
}

impl PayWay {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayWay::AppStore => "app_store",
            PayWay::PlayStore => "play_store",
            PayWay::Alipay => "alipay",
            PayWay::WeChat => "wechat",
            PayWay::PayPal => "paypal",
        }
    }

    /// Numeric code used by client SDKs in the `pay_way` request field
    pub fn code(&self) -> u8 {
        match self {
            PayWay::Alipay => 1,
            PayWay::WeChat => 2,
            PayWay::AppStore => 3,
            PayWay::PlayStore => 4,
            PayWay::PayPal => 5,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(PayWay::Alipay),
            2 => Some(PayWay::WeChat),
            3 => Some(PayWay::AppStore),
            4 => Some(PayWay::PlayStore),
            5 => Some(PayWay::PayPal),
            _ => None,
        }
    }
}

impl std::fmt::Display for PayWay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PayWay {
    type Err = ReconcileError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_lowercase();
        if let Ok(code) = normalized.parse::<u8>() {
            if let Some(pay_way) = PayWay::from_code(code) {
                return Ok(pay_way);
            }
        }
        match normalized.as_str() {
            "app_store" | "appstore" | "apple" => Ok(PayWay::AppStore),
            "play_store" | "playstore" | "google" => Ok(PayWay::PlayStore),
            "alipay" => Ok(PayWay::Alipay),
            "wechat" | "wxpay" => Ok(PayWay::WeChat),
            "paypal" => Ok(PayWay::PayPal),
            _ => Err(ReconcileError::Configuration {
                message: format!("unsupported pay way: {}", value),
            }),
        }
    }
}

/// Apple `verifyReceipt` request body
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppStoreIapRequest {
    #[serde(rename = "receipt-data", default)]
    pub receipt_data: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,
    #[serde(rename = "exclude-old-transactions", default)]
    pub exclude_old_transactions: bool,
}

/// Google Play purchase as reported by the client billing library
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayStoreIapRequest {
    #[serde(default)]
    pub purchase_data: String,
    #[serde(default)]
    pub purchase_data_sign: String,
    /// Whether `purchase_data` describes a subscription rather than a one-time product
    #[serde(default)]
    pub subscription: bool,
}

/// Client-confirmed payment request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentRequest {
    pub pay_way: PayWay,
    #[serde(flatten)]
    pub app_store: AppStoreIapRequest,
    #[serde(flatten)]
    pub play_store: PlayStoreIapRequest,
    #[serde(default)]
    pub transaction_id: String,
    #[serde(rename = "goods_sn", default)]
    pub product_id: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub sign: String,
    /// Opaque caller payload carried to the ledger with the order
    #[serde(default)]
    pub attach: String,
}

impl PaymentRequest {
    pub fn new(pay_way: PayWay) -> Self {
        Self {
            pay_way,
            app_store: AppStoreIapRequest::default(),
            play_store: PlayStoreIapRequest::default(),
            transaction_id: String::new(),
            product_id: String::new(),
            timestamp: String::new(),
            currency: String::new(),
            sign: String::new(),
            attach: String::new(),
        }
    }
}

/// Trust-verified purchase, tagged by the gateway that produced it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PurchaseRecord {
    AppStore(AppStoreInApp),
    PlayStore(PlayStorePurchase),
}

impl PurchaseRecord {
    pub fn pay_way(&self) -> PayWay {
        match self {
            PurchaseRecord::AppStore(_) => PayWay::AppStore,
            PurchaseRecord::PlayStore(_) => PayWay::PlayStore,
        }
    }

    pub fn trade_no(&self) -> &str {
        match self {
            PurchaseRecord::AppStore(inapp) => &inapp.transaction_id,
            PurchaseRecord::PlayStore(purchase) => &purchase.order_id,
        }
    }

    pub fn product_id(&self) -> &str {
        match self {
            PurchaseRecord::AppStore(inapp) => &inapp.product_id,
            PurchaseRecord::PlayStore(purchase) => &purchase.product_id,
        }
    }

    pub fn identity(&self) -> ReconcileResult<TransactionIdentity> {
        match self {
            PurchaseRecord::AppStore(inapp) => TransactionIdentity::from_app_store(inapp),
            PurchaseRecord::PlayStore(purchase) => TransactionIdentity::from_play_store(purchase),
        }
    }

    pub fn is_free_trial(&self) -> bool {
        match self {
            PurchaseRecord::AppStore(inapp) => inapp.is_trial_period == "true",
            // One-time products carry no subscription state and are never trials.
            PurchaseRecord::PlayStore(purchase) => purchase
                .subscription
                .as_ref()
                .is_some_and(|state| state.payment_state == Some(PAYMENT_STATE_FREE_TRIAL)),
        }
    }
}

/// Per-call processing context handed to the order ledger
#[derive(Debug, Clone)]
pub struct PaymentContext {
    pub request: PaymentRequest,
    pub uid: Option<String>,
    pub client_ip: Option<String>,
    pub params: HashMap<String, String>,
    /// Set by the engine right before it asks the ledger to create an order
    pub purchase: Option<PurchaseRecord>,
}

impl PaymentContext {
    pub fn new(request: PaymentRequest) -> Self {
        Self {
            request,
            uid: None,
            client_ip: None,
            params: HashMap::new(),
            purchase: None,
        }
    }

    /// Context for a gateway-initiated notification, which carries no client request
    pub fn for_pay_way(pay_way: PayWay) -> Self {
        Self::new(PaymentRequest::new(pay_way))
    }

    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = Some(uid.into());
        self
    }

    pub fn pay_way(&self) -> PayWay {
        self.request.pay_way
    }

    pub fn attach(&self) -> &str {
        &self.request.attach
    }
}

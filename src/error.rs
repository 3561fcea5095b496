//! Error handling for the reconciliation core
//!
//! Every operation returns [`ReconcileError`], which carries a stable [`ErrorKind`] so callers can
//! tell retriable infrastructure failures apart from permanent rejections.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::error::CacheError;
use crate::payments::types::PayWay;

pub type ReconcileResult<T> = Result<T, ReconcileError>;

/// Stable error codes for programmatic handling
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorKind {
    #[serde(rename = "TRUST_VERIFICATION_FAILED")]
    TrustVerificationFailed,
    #[serde(rename = "IDENTITY_MISMATCH")]
    IdentityMismatch,
    #[serde(rename = "CONCURRENT_CONFLICT")]
    ConcurrentConflict,
    #[serde(rename = "SUBSCRIBER_MISMATCH")]
    SubscriberMismatch,
    #[serde(rename = "ORDER_NOT_FOUND")]
    OrderNotFound,
    #[serde(rename = "TRANSACTION_NOT_FOUND")]
    TransactionNotFound,
    #[serde(rename = "INVALID_TRADE_NO")]
    InvalidTradeNo,
    #[serde(rename = "INVALID_NOTIFICATION")]
    InvalidNotification,
    #[serde(rename = "LEDGER_ERROR")]
    Ledger,
    #[serde(rename = "PUBLISHER_ERROR")]
    Publisher,
    #[serde(rename = "LOCK_ERROR")]
    Lock,
    #[serde(rename = "CONFIGURATION_ERROR")]
    Configuration,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::TrustVerificationFailed => "TRUST_VERIFICATION_FAILED",
            ErrorKind::IdentityMismatch => "IDENTITY_MISMATCH",
            ErrorKind::ConcurrentConflict => "CONCURRENT_CONFLICT",
            ErrorKind::SubscriberMismatch => "SUBSCRIBER_MISMATCH",
            ErrorKind::OrderNotFound => "ORDER_NOT_FOUND",
            ErrorKind::TransactionNotFound => "TRANSACTION_NOT_FOUND",
            ErrorKind::InvalidTradeNo => "INVALID_TRADE_NO",
            ErrorKind::InvalidNotification => "INVALID_NOTIFICATION",
            ErrorKind::Ledger => "LEDGER_ERROR",
            ErrorKind::Publisher => "PUBLISHER_ERROR",
            ErrorKind::Lock => "LOCK_ERROR",
            ErrorKind::Configuration => "CONFIGURATION_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
pub enum ReconcileError {
    /// The gateway's trust authority rejected or could not check the purchase
    #[error("Trust verification failed: gateway={gateway}, status={status:?}, message={message}")]
    TrustVerificationFailed {
        gateway: PayWay,
        status: Option<i64>,
        message: String,
        retryable: bool,
    },

    /// A verified purchase disagrees with the configured app or with what the client claimed
    #[error("Identity mismatch on {field}: expected={expected}, actual={actual}")]
    IdentityMismatch {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Concurrent processing of transaction {trade_no}")]
    ConcurrentConflict { trade_no: String },

    #[error("Subscriber mismatch: original={original_trade_no}, current={trade_no}")]
    SubscriberMismatch {
        original_trade_no: String,
        trade_no: String,
    },

    #[error("Order not found for transaction {trade_no}")]
    OrderNotFound { trade_no: String },

    #[error("Transaction {transaction_id} not present in verified receipt")]
    TransactionNotFound { transaction_id: String },

    #[error("Invalid trade number {trade_no:?}: {reason}")]
    InvalidTradeNo { trade_no: String, reason: String },

    #[error("Invalid notification: {message}")]
    InvalidNotification { message: String },

    #[error("Order ledger error: {message}")]
    Ledger { message: String, retryable: bool },

    #[error("Publisher API error: {message}")]
    Publisher { message: String, retryable: bool },

    #[error("Lock backend error: {message}")]
    Lock { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl ReconcileError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReconcileError::TrustVerificationFailed { .. } => ErrorKind::TrustVerificationFailed,
            ReconcileError::IdentityMismatch { .. } => ErrorKind::IdentityMismatch,
            ReconcileError::ConcurrentConflict { .. } => ErrorKind::ConcurrentConflict,
            ReconcileError::SubscriberMismatch { .. } => ErrorKind::SubscriberMismatch,
            ReconcileError::OrderNotFound { .. } => ErrorKind::OrderNotFound,
            ReconcileError::TransactionNotFound { .. } => ErrorKind::TransactionNotFound,
            ReconcileError::InvalidTradeNo { .. } => ErrorKind::InvalidTradeNo,
            ReconcileError::InvalidNotification { .. } => ErrorKind::InvalidNotification,
            ReconcileError::Ledger { .. } => ErrorKind::Ledger,
            ReconcileError::Publisher { .. } => ErrorKind::Publisher,
            ReconcileError::Lock { .. } => ErrorKind::Lock,
            ReconcileError::Configuration { .. } => ErrorKind::Configuration,
        }
    }

    /// Whether the same request may succeed if the caller tries again later.
    ///
    /// `ConcurrentConflict` is retryable for the caller; the engine itself never retries it.
    pub fn is_retryable(&self) -> bool {
        match self {
            ReconcileError::TrustVerificationFailed { retryable, .. } => *retryable,
            ReconcileError::IdentityMismatch { .. } => false,
            ReconcileError::ConcurrentConflict { .. } => true,
            ReconcileError::SubscriberMismatch { .. } => false,
            ReconcileError::OrderNotFound { .. } => false,
            ReconcileError::TransactionNotFound { .. } => false,
            ReconcileError::InvalidTradeNo { .. } => false,
            ReconcileError::InvalidNotification { .. } => false,
            ReconcileError::Ledger { retryable, .. } => *retryable,
            ReconcileError::Publisher { retryable, .. } => *retryable,
            ReconcileError::Lock { .. } => true,
            ReconcileError::Configuration { .. } => false,
        }
    }

    pub fn http_status_code(&self) -> u16 {
        match self {
            ReconcileError::TrustVerificationFailed { retryable, .. } => {
                if *retryable {
                    503
                } else {
                    402
                }
            }
            ReconcileError::IdentityMismatch { .. } => 403,
            ReconcileError::ConcurrentConflict { .. } => 409,
            ReconcileError::SubscriberMismatch { .. } => 403,
            ReconcileError::OrderNotFound { .. } => 404,
            ReconcileError::TransactionNotFound { .. } => 404,
            ReconcileError::InvalidTradeNo { .. } => 422,
            ReconcileError::InvalidNotification { .. } => 400,
            ReconcileError::Ledger { .. } => 502,
            ReconcileError::Publisher { .. } => 502,
            ReconcileError::Lock { .. } => 503,
            ReconcileError::Configuration { .. } => 500,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            ReconcileError::TrustVerificationFailed { retryable, .. } => {
                if *retryable {
                    "Payment gateway is temporarily unavailable".to_string()
                } else {
                    "Purchase could not be verified".to_string()
                }
            }
            ReconcileError::IdentityMismatch { .. } => {
                "Purchase details do not match the verified purchase".to_string()
            }
            ReconcileError::ConcurrentConflict { .. } => {
                "Transaction is already being processed".to_string()
            }
            ReconcileError::SubscriberMismatch { .. } => {
                "Subscription belongs to a different account".to_string()
            }
            ReconcileError::OrderNotFound { .. } => "Order not found".to_string(),
            ReconcileError::TransactionNotFound { .. } => {
                "Transaction not found in receipt".to_string()
            }
            ReconcileError::InvalidTradeNo { .. } => "Malformed transaction identifier".to_string(),
            ReconcileError::InvalidNotification { message } => message.clone(),
            ReconcileError::Ledger { .. } => "Order service returned an error".to_string(),
            ReconcileError::Publisher { .. } => "Payment gateway returned an error".to_string(),
            ReconcileError::Lock { .. } | ReconcileError::Configuration { .. } => {
                "Internal error".to_string()
            }
        }
    }
}

impl From<CacheError> for ReconcileError {
    fn from(err: CacheError) -> Self {
        ReconcileError::Lock {
            message: err.to_string(),
        }
    }
}

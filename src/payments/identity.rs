//! Canonical transaction identity
//!
//! Gateways identify a purchase by the *current* trade number. Subscription renewals also carry, or
//! encode, the trade number of the first purchase in their chain; the engine locks on the former and
//! runs the continuity check on the latter.

use crate::error::{ReconcileError, ReconcileResult};
use crate::payments::appstore::types::AppStoreInApp;
use crate::payments::playstore::types::PlayStorePurchase;
use crate::payments::types::PayWay;
use serde::{Deserialize, Serialize};

/// Separator Google Play uses to append the renewal generation to an order id
pub const PLAY_RENEWAL_SEPARATOR: &str = "..";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransactionIdentity {
    pub trade_no: String,
    pub original_trade_no: String,
    pub product_id: String,
    pub pay_way: PayWay,
}

impl TransactionIdentity {
    pub fn from_app_store(inapp: &AppStoreInApp) -> ReconcileResult<Self> {
        let trade_no = checked_trade_no(&inapp.transaction_id)?;
        let original_trade_no = if inapp.original_transaction_id.trim().is_empty() {
            trade_no.clone()
        } else {
            checked_trade_no(&inapp.original_transaction_id)?
        };

        Ok(Self {
            trade_no,
            original_trade_no,
            product_id: inapp.product_id.clone(),
            pay_way: PayWay::AppStore,
        })
    }

    pub fn from_play_store(purchase: &PlayStorePurchase) -> ReconcileResult<Self> {
        let trade_no = checked_trade_no(&purchase.order_id)?;
        let original_trade_no = parse_play_order_id(&trade_no)?;

        Ok(Self {
            trade_no,
            original_trade_no,
            product_id: purchase.product_id.clone(),
            pay_way: PayWay::PlayStore,
        })
    }

    /// First event of a subscription chain, or a one-time purchase
    pub fn is_first_purchase(&self) -> bool {
        self.trade_no == self.original_trade_no
    }
}

/// Derive the original order id from a Google Play order id.
///
/// `GPA.1234-5678-9012-34567` is a first purchase; `GPA.1234-5678-9012-34567..0` is its first renewal.
/// Ids with more than one separator have never been issued by Play and are rejected.
pub fn parse_play_order_id(order_id: &str) -> ReconcileResult<String> {
    let segments: Vec<&str> = order_id.split(PLAY_RENEWAL_SEPARATOR).collect();

    if segments.iter().any(|segment| segment.is_empty()) {
        return Err(ReconcileError::InvalidTradeNo {
            trade_no: order_id.to_string(),
            reason: "empty order id segment".to_string(),
        });
    }

    match segments.as_slice() {
        [single] => Ok(single.to_string()),
        [original, _generation] => Ok(original.to_string()),
        _ => Err(ReconcileError::InvalidTradeNo {
            trade_no: order_id.to_string(),
            reason: format!(
                "expected at most one '{}' separator, found {}",
                PLAY_RENEWAL_SEPARATOR,
                segments.len() - 1
            ),
        }),
    }
}

/// Trade numbers end up in ledger URLs and store keys; only plain tokens are accepted.
fn checked_trade_no(trade_no: &str) -> ReconcileResult<String> {
    let invalid = |reason: &str| ReconcileError::InvalidTradeNo {
        trade_no: trade_no.to_string(),
        reason: reason.to_string(),
    };

    if trade_no.trim().is_empty() {
        return Err(invalid("trade number is empty"));
    }
    if trade_no
        .chars()
        .any(|c| c.is_whitespace() || c.is_control() || matches!(c, '/' | '\\' | '?' | '#' | '%'))
    {
        return Err(invalid("trade number contains a reserved character"));
    }
    if trade_no.chars().all(|c| c == '.') {
        return Err(invalid("trade number is a relative path"));
    }
    Ok(trade_no.to_string())
}

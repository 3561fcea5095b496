use crate::error::ReconcileError;
use crate::payments::types::{PayWay, PaymentContext};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderInfo {
    pub subject: String,
    /// Amount in minor units
    pub total_fee: i64,
    /// Ledger-side order number
    pub out_trade_no: String,
    /// Gateway trade number
    pub trade_no: String,
    pub attach: String,
    pub currency: String,
}

/// Order as held by the external ledger
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Order {
    pub order_id: String,
    pub info: OrderInfo,
    pub paid: bool,
}

impl Order {
    /// The single idempotency checkpoint: a paid order is never invoked again.
    pub fn payed(&self) -> bool {
        self.paid
    }
}

#[derive(Debug, Clone, Error)]
pub enum OrderServiceError {
    #[error("order not found")]
    NotFound,
    #[error("order service failure: {message}")]
    Backend { message: String, retryable: bool },
}

impl OrderServiceError {
    pub fn into_reconcile(self, trade_no: &str) -> ReconcileError {
        match self {
            OrderServiceError::NotFound => ReconcileError::OrderNotFound {
                trade_no: trade_no.to_string(),
            },
            OrderServiceError::Backend { message, retryable } => {
                ReconcileError::Ledger { message, retryable }
            }
        }
    }
}

/// The downstream order ledger.
///
/// `invoke` must only ever be called once per order; the reconciliation engine guarantees that by
/// checking [`Order::payed`] while holding the transaction lock.
#[async_trait]
pub trait OrderService: Send + Sync {
    /// Create an order from `ctx`, whose `purchase` field holds the verified record
    async fn post_order(&self, ctx: &PaymentContext) -> Result<Order, OrderServiceError>;

    /// Look up an order by gateway trade number; absent orders are `OrderServiceError::NotFound`
    async fn get_order_by_trade_no(
        &self,
        trade_no: &str,
        pay_way: PayWay,
    ) -> Result<Order, OrderServiceError>;

    /// Apply the payment effect
    async fn invoke(&self, order: &Order) -> Result<(), OrderServiceError>;

    /// Undo the payment effect
    async fn revoke(&self, order: &Order) -> Result<(), OrderServiceError>;

    /// Whether `original_trade_no` and `trade_no` were bought by the same subscriber
    async fn check_sub_user(
        &self,
        ctx: &PaymentContext,
        original_trade_no: &str,
        trade_no: &str,
    ) -> Result<bool, OrderServiceError>;
}

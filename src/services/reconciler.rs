//! Reconciliation engine
//!
//! Turns a trust-verified purchase record into at most one payment effect on the order ledger.
//! Every ledger mutation happens while holding the lock on the record's current trade number.

use crate::error::{ReconcileError, ReconcileResult};
use crate::payments::identity::TransactionIdentity;
use crate::payments::lock::Locker;
use crate::payments::order::{OrderService, OrderServiceError};
use crate::payments::types::{PaymentContext, PurchaseRecord};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// The payment effect was applied by this call
    Invoked { order_id: String },
    /// The order had already been paid; nothing was applied
    AlreadyPaid { order_id: String },
    Revoked { order_id: String },
}

impl ReconcileOutcome {
    pub fn order_id(&self) -> &str {
        match self {
            ReconcileOutcome::Invoked { order_id }
            | ReconcileOutcome::AlreadyPaid { order_id }
            | ReconcileOutcome::Revoked { order_id } => order_id,
        }
    }
}

pub struct ReconciliationEngine {
    orders: Arc<dyn OrderService>,
    locker: Arc<dyn Locker>,
}

impl ReconciliationEngine {
    pub fn new(orders: Arc<dyn OrderService>, locker: Arc<dyn Locker>) -> Self {
        Self { orders, locker }
    }

    /// Apply a verified payment exactly once.
    ///
    /// An existing paid order short-circuits to [`ReconcileOutcome::AlreadyPaid`]. A missing order
    /// is created after the continuity check, with `ctx.purchase` set to `purchase`.
    pub async fn invoke(
        &self,
        ctx: &mut PaymentContext,
        purchase: &PurchaseRecord,
    ) -> ReconcileResult<ReconcileOutcome> {
        let identity = purchase.identity()?;
        self.guarded(&identity, self.apply_invoke(ctx, purchase, &identity))
            .await
    }

    /// Undo a payment. The order must already exist.
    pub async fn revoke(
        &self,
        _ctx: &mut PaymentContext,
        purchase: &PurchaseRecord,
    ) -> ReconcileResult<ReconcileOutcome> {
        let identity = purchase.identity()?;
        self.guarded(&identity, self.apply_revoke(&identity)).await
    }

    async fn guarded<T, F>(&self, identity: &TransactionIdentity, body: F) -> ReconcileResult<T>
    where
        F: Future<Output = ReconcileResult<T>>,
    {
        let trade_no = identity.trade_no.as_str();
        let Some(lease) = self.locker.lock(trade_no).await? else {
            warn!(
                trade_no = %trade_no,
                pay_way = %identity.pay_way,
                "transaction is being processed concurrently"
            );
            return Err(ReconcileError::ConcurrentConflict {
                trade_no: trade_no.to_string(),
            });
        };

        let result = body.await;

        if let Err(e) = self.locker.unlock(&lease).await {
            warn!(trade_no = %trade_no, error = %e, "failed to release transaction lock");
        }
        result
    }

    async fn apply_invoke(
        &self,
        ctx: &mut PaymentContext,
        purchase: &PurchaseRecord,
        identity: &TransactionIdentity,
    ) -> ReconcileResult<ReconcileOutcome> {
        let order = match self
            .orders
            .get_order_by_trade_no(&identity.trade_no, identity.pay_way)
            .await
        {
            Ok(order) => order,
            Err(OrderServiceError::NotFound) => {
                self.check_continuity(ctx, identity).await?;
                ctx.purchase = Some(purchase.clone());
                let order = self
                    .orders
                    .post_order(ctx)
                    .await
                    .map_err(|e| e.into_reconcile(&identity.trade_no))?;
                debug!(
                    trade_no = %identity.trade_no,
                    order_id = %order.order_id,
                    "order created for new transaction"
                );
                order
            }
            Err(e) => return Err(e.into_reconcile(&identity.trade_no)),
        };

        if order.payed() {
            info!(
                trade_no = %identity.trade_no,
                order_id = %order.order_id,
                "order already paid, skipping"
            );
            return Ok(ReconcileOutcome::AlreadyPaid {
                order_id: order.order_id,
            });
        }

        self.orders
            .invoke(&order)
            .await
            .map_err(|e| e.into_reconcile(&identity.trade_no))?;
        info!(
            trade_no = %identity.trade_no,
            original_trade_no = %identity.original_trade_no,
            pay_way = %identity.pay_way,
            order_id = %order.order_id,
            "payment applied"
        );
        Ok(ReconcileOutcome::Invoked {
            order_id: order.order_id,
        })
    }

    async fn apply_revoke(&self, identity: &TransactionIdentity) -> ReconcileResult<ReconcileOutcome> {
        let order = self
            .orders
            .get_order_by_trade_no(&identity.trade_no, identity.pay_way)
            .await
            .map_err(|e| e.into_reconcile(&identity.trade_no))?;

        self.orders
            .revoke(&order)
            .await
            .map_err(|e| e.into_reconcile(&identity.trade_no))?;
        info!(
            trade_no = %identity.trade_no,
            pay_way = %identity.pay_way,
            order_id = %order.order_id,
            "payment revoked"
        );
        Ok(ReconcileOutcome::Revoked {
            order_id: order.order_id,
        })
    }

    /// Renewals must belong to the subscriber of the original purchase
    async fn check_continuity(
        &self,
        ctx: &PaymentContext,
        identity: &TransactionIdentity,
    ) -> ReconcileResult<()> {
        if identity.is_first_purchase() {
            return Ok(());
        }

        let matched = self
            .orders
            .check_sub_user(ctx, &identity.original_trade_no, &identity.trade_no)
            .await
            .map_err(|e| e.into_reconcile(&identity.trade_no))?;

        if !matched {
            error!(
                target: "iap_reconciler::security",
                trade_no = %identity.trade_no,
                original_trade_no = %identity.original_trade_no,
                pay_way = %identity.pay_way,
                uid = ?ctx.uid,
                "renewal does not belong to the original subscriber"
            );
            return Err(ReconcileError::SubscriberMismatch {
                original_trade_no: identity.original_trade_no.clone(),
                trade_no: identity.trade_no.clone(),
            });
        }
        Ok(())
    }
}

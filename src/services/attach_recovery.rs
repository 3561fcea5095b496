use crate::payments::attach::AttachService;
use crate::payments::types::PaymentContext;
use std::sync::Arc;
use tracing::{debug, warn};

/// Best-effort attach bookkeeping for client-confirmed payments.
///
/// No method here ever fails the payment: store errors are logged and swallowed.
#[derive(Clone)]
pub struct AttachRecovery {
    store: Arc<dyn AttachService>,
}

impl AttachRecovery {
    pub fn new(store: Arc<dyn AttachService>) -> Self {
        Self { store }
    }

    /// Fill in a missing attach from an earlier attempt, then persist it for later ones
    pub async fn prepare(&self, ctx: &mut PaymentContext, trade_no: &str) {
        if trade_no.is_empty() {
            return;
        }

        if ctx.request.attach.is_empty() {
            match self.store.get(trade_no).await {
                Ok(Some(attach)) => {
                    debug!(trade_no = %trade_no, "recovered attach from earlier attempt");
                    ctx.request.attach = attach;
                }
                Ok(None) => {}
                Err(e) => warn!(trade_no = %trade_no, error = %e, "failed to read attach"),
            }
        }

        if ctx.request.attach.is_empty() {
            return;
        }
        if let Err(e) = self.store.create(trade_no, &ctx.request.attach).await {
            warn!(trade_no = %trade_no, error = %e, "failed to store attach");
        }
    }

    /// Drop the attach once the order carrying it exists
    pub async fn release(&self, trade_no: &str) {
        if trade_no.is_empty() {
            return;
        }
        if let Err(e) = self.store.delete(trade_no).await {
            warn!(trade_no = %trade_no, error = %e, "failed to delete attach");
        }
    }
}

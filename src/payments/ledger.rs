//! REST client for the external order ledger

use crate::config::{GatewayConfig, LedgerConfig};
use crate::error::{ReconcileError, ReconcileResult};
use crate::payments::http::{GatewayHttpClient, HttpFailure};
use crate::payments::order::{Order, OrderService, OrderServiceError};
use crate::payments::types::{PayWay, PaymentContext};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use tracing::{debug, info};

pub struct RemoteOrderService {
    http: GatewayHttpClient,
    base_url: String,
    api_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SubscriberCheck {
    matched: bool,
}

impl RemoteOrderService {
    pub fn new(config: &LedgerConfig, gateway: &GatewayConfig) -> ReconcileResult<Self> {
        let http = GatewayHttpClient::new(gateway.http_timeout()).map_err(|e| {
            ReconcileError::Configuration {
                message: e.message,
            }
        })?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
        })
    }

    async fn send<T: serde::de::DeserializeOwned>(
        &self,
        method: reqwest::Method,
        segments: &[&str],
        body: Option<&JsonValue>,
    ) -> Result<T, OrderServiceError> {
        let url = endpoint(&self.base_url, segments)?;
        self.http
            .request_json::<T>(method, &url, self.api_token.as_deref(), body)
            .await
            .map_err(ledger_failure)
    }
}

/// Append `segments` to the ledger base URL, percent-encoding each one
fn endpoint(base_url: &str, segments: &[&str]) -> Result<String, OrderServiceError> {
    let invalid = |message: String| OrderServiceError::Backend {
        message,
        retryable: false,
    };

    let mut url = reqwest::Url::parse(base_url)
        .map_err(|e| invalid(format!("invalid ledger url {}: {}", base_url, e)))?;
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|_| invalid(format!("ledger url {} cannot carry a path", base_url)))?;
        path.pop_if_empty().extend(segments);
    }
    Ok(url.to_string())
}

fn ledger_failure(failure: HttpFailure) -> OrderServiceError {
    if failure.is_not_found() {
        return OrderServiceError::NotFound;
    }
    OrderServiceError::Backend {
        message: failure.message,
        retryable: failure.retryable,
    }
}

#[async_trait]
impl OrderService for RemoteOrderService {
    async fn post_order(&self, ctx: &PaymentContext) -> Result<Order, OrderServiceError> {
        let purchase = ctx.purchase.as_ref().ok_or_else(|| OrderServiceError::Backend {
            message: "order creation requires a verified purchase".to_string(),
            retryable: false,
        })?;
        let identity = purchase.identity().map_err(|e| OrderServiceError::Backend {
            message: e.to_string(),
            retryable: false,
        })?;

        let body = json!({
            "pay_way": ctx.pay_way(),
            "trade_no": identity.trade_no,
            "original_trade_no": identity.original_trade_no,
            "product_id": identity.product_id,
            "free_trial": purchase.is_free_trial(),
            "attach": ctx.attach(),
            "currency": ctx.request.currency,
            "uid": ctx.uid,
            "client_ip": ctx.client_ip,
            "params": ctx.params,
            "purchase": purchase,
        });

        let order: Order = self
            .send(reqwest::Method::POST, &["orders"], Some(&body))
            .await?;
        info!(order_id = %order.order_id, trade_no = %identity.trade_no, "order created");
        Ok(order)
    }

    async fn get_order_by_trade_no(
        &self,
        trade_no: &str,
        pay_way: PayWay,
    ) -> Result<Order, OrderServiceError> {
        debug!(trade_no = %trade_no, pay_way = %pay_way, "looking up order");
        self.send(
            reqwest::Method::GET,
            &["orders", pay_way.as_str(), trade_no],
            None,
        )
        .await
    }

    async fn invoke(&self, order: &Order) -> Result<(), OrderServiceError> {
        let _: JsonValue = self
            .send(
                reqwest::Method::POST,
                &["orders", order.order_id.as_str(), "invoke"],
                None,
            )
            .await?;
        Ok(())
    }

    async fn revoke(&self, order: &Order) -> Result<(), OrderServiceError> {
        let _: JsonValue = self
            .send(
                reqwest::Method::POST,
                &["orders", order.order_id.as_str(), "revoke"],
                None,
            )
            .await?;
        Ok(())
    }

    async fn check_sub_user(
        &self,
        ctx: &PaymentContext,
        original_trade_no: &str,
        trade_no: &str,
    ) -> Result<bool, OrderServiceError> {
        let body = json!({
            "pay_way": ctx.pay_way(),
            "original_trade_no": original_trade_no,
            "trade_no": trade_no,
            "uid": ctx.uid,
        });

        match self
            .send::<SubscriberCheck>(
                reqwest::Method::POST,
                &["subscriptions", "check"],
                Some(&body),
            )
            .await
        {
            Ok(check) => Ok(check.matched),
            // Unknown original order: nothing ties the renewal to this subscriber.
            Err(OrderServiceError::NotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

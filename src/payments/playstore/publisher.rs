//! Google Play publisher API collaborator
//!
//! Production deployments usually cannot reach the publisher API directly, so the remote
//! implementation talks to a relay that exposes it over plain JSON endpoints.

use crate::config::{GatewayConfig, PlayStoreConfig, PublisherApis};
use crate::error::{ReconcileError, ReconcileResult};
use crate::logging::mask_token;
use crate::payments::http::{GatewayHttpClient, HttpFailure};
use crate::payments::playstore::types::{ProductPurchase, SubscriptionPurchase};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value as JsonValue};
use tracing::debug;

#[async_trait]
pub trait PublisherService: Send + Sync {
    async fn verify_subscription(
        &self,
        package_name: &str,
        subscription_id: &str,
        token: &str,
    ) -> ReconcileResult<SubscriptionPurchase>;

    async fn verify_product(
        &self,
        package_name: &str,
        product_id: &str,
        token: &str,
    ) -> ReconcileResult<ProductPurchase>;

    /// Must only be called after the purchase has been applied locally
    async fn acknowledge_subscription(
        &self,
        package_name: &str,
        subscription_id: &str,
        token: &str,
        developer_payload: &str,
    ) -> ReconcileResult<()>;

    /// Must only be called after the purchase has been applied locally
    async fn acknowledge_product(
        &self,
        package_name: &str,
        product_id: &str,
        token: &str,
        developer_payload: &str,
    ) -> ReconcileResult<()>;
}

pub struct RemotePublisherService {
    http: GatewayHttpClient,
    endpoint: String,
    apis: PublisherApis,
    api_token: Option<String>,
}

impl RemotePublisherService {
    pub fn new(config: &PlayStoreConfig, gateway: &GatewayConfig) -> ReconcileResult<Self> {
        let http = GatewayHttpClient::new(gateway.http_timeout()).map_err(|e| {
            ReconcileError::Configuration {
                message: e.message,
            }
        })?;

        Ok(Self {
            http,
            endpoint: config.publisher_endpoint.trim_end_matches('/').to_string(),
            apis: config.publisher_apis.clone(),
            api_token: config.publisher_token.clone(),
        })
    }

    async fn call<T: DeserializeOwned>(&self, path: &str, body: JsonValue) -> ReconcileResult<T> {
        let url = format!("{}{}", self.endpoint, path);
        self.http
            .request_json::<T>(
                reqwest::Method::POST,
                &url,
                self.api_token.as_deref(),
                Some(&body),
            )
            .await
            .map_err(publisher_failure)
    }
}

fn publisher_failure(failure: HttpFailure) -> ReconcileError {
    ReconcileError::Publisher {
        message: failure.message,
        retryable: failure.retryable,
    }
}

fn request_body(package_name: &str, id: &str, token: &str) -> JsonValue {
    json!({
        "packageName": package_name,
        "subscriptionID": id,
        "purchaseToken": token,
    })
}

#[async_trait]
impl PublisherService for RemotePublisherService {
    async fn verify_subscription(
        &self,
        package_name: &str,
        subscription_id: &str,
        token: &str,
    ) -> ReconcileResult<SubscriptionPurchase> {
        debug!(
            subscription_id = %subscription_id,
            token = %mask_token(token),
            "querying subscription state"
        );
        self.call(
            &self.apis.verify_subscription,
            request_body(package_name, subscription_id, token),
        )
        .await
    }

    async fn verify_product(
        &self,
        package_name: &str,
        product_id: &str,
        token: &str,
    ) -> ReconcileResult<ProductPurchase> {
        debug!(
            product_id = %product_id,
            token = %mask_token(token),
            "querying product purchase state"
        );
        self.call(
            &self.apis.verify_product,
            request_body(package_name, product_id, token),
        )
        .await
    }

    async fn acknowledge_subscription(
        &self,
        package_name: &str,
        subscription_id: &str,
        token: &str,
        developer_payload: &str,
    ) -> ReconcileResult<()> {
        let mut body = request_body(package_name, subscription_id, token);
        if !developer_payload.is_empty() {
            body["developerPayload"] = json!(developer_payload);
        }
        let _: JsonValue = self.call(&self.apis.ack_subscription, body).await?;
        Ok(())
    }

    async fn acknowledge_product(
        &self,
        package_name: &str,
        product_id: &str,
        token: &str,
        developer_payload: &str,
    ) -> ReconcileResult<()> {
        let mut body = request_body(package_name, product_id, token);
        body["developerPayload"] = json!(developer_payload);
        let _: JsonValue = self.call(&self.apis.ack_product, body).await?;
        Ok(())
    }
}

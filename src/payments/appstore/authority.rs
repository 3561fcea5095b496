use crate::config::{AppStoreConfig, GatewayConfig};
use crate::error::{ReconcileError, ReconcileResult};
use crate::payments::appstore::types::IapResponse;
use crate::payments::http::{GatewayHttpClient, HttpFailure};
use crate::payments::types::{AppStoreIapRequest, PayWay};
use crate::payments::verifier::{ReceiptAuthority, STATUS_SANDBOX_RECEIPT};
use async_trait::async_trait;
use tracing::info;

/// `verifyReceipt` over HTTPS
pub struct HttpReceiptAuthority {
    http: GatewayHttpClient,
    production_url: String,
    sandbox_url: String,
}

impl HttpReceiptAuthority {
    pub fn new(config: &AppStoreConfig, gateway: &GatewayConfig) -> ReconcileResult<Self> {
        let http = GatewayHttpClient::new(gateway.http_timeout()).map_err(|e| {
            ReconcileError::Configuration {
                message: e.message,
            }
        })?;

        Ok(Self {
            http,
            production_url: config.production_url.clone(),
            sandbox_url: config.sandbox_url.clone(),
        })
    }

    async fn post(&self, url: &str, request: &AppStoreIapRequest) -> ReconcileResult<IapResponse> {
        let body = serde_json::to_value(request).map_err(|e| ReconcileError::TrustVerificationFailed {
            gateway: PayWay::AppStore,
            status: None,
            message: format!("failed to encode receipt request: {}", e),
            retryable: false,
        })?;

        self.http
            .request_json::<IapResponse>(reqwest::Method::POST, url, None, Some(&body))
            .await
            .map_err(trust_failure)
    }
}

fn trust_failure(failure: HttpFailure) -> ReconcileError {
    ReconcileError::TrustVerificationFailed {
        gateway: PayWay::AppStore,
        status: failure.status.map(i64::from),
        message: failure.message,
        retryable: failure.retryable,
    }
}

#[async_trait]
impl ReceiptAuthority for HttpReceiptAuthority {
    async fn verify_receipt(&self, request: &AppStoreIapRequest) -> ReconcileResult<IapResponse> {
        let response = self.post(&self.production_url, request).await?;
        if response.status != STATUS_SANDBOX_RECEIPT {
            return Ok(response);
        }

        info!("sandbox receipt received, re-verifying against sandbox endpoint");
        self.post(&self.sandbox_url, request).await
    }
}

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Failure of a single gateway round-trip
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct HttpFailure {
    /// HTTP status when the gateway answered at all
    pub status: Option<u16>,
    pub message: String,
    pub retryable: bool,
}

impl HttpFailure {
    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }
}

/// Shared JSON client for gateway and ledger calls.
///
/// Performs exactly one attempt per call; retries belong to the bounded verification loop.
#[derive(Clone)]
pub struct GatewayHttpClient {
    client: Client,
    timeout: Duration,
}

impl GatewayHttpClient {
    pub fn new(timeout: Duration) -> Result<Self, HttpFailure> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HttpFailure {
                status: None,
                message: format!("failed to initialize HTTP client: {}", e),
                retryable: false,
            })?;

        Ok(Self { client, timeout })
    }

    pub async fn request_json<T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        url: &str,
        bearer_token: Option<&str>,
        body: Option<&JsonValue>,
    ) -> Result<T, HttpFailure> {
        let mut request = self.client.request(method.clone(), url);
        request = request.timeout(self.timeout);

        if let Some(token) = bearer_token {
            request = request.bearer_auth(token);
        }
        if let Some(payload) = body {
            request = request.json(payload);
        }

        let resp = request.send().await.map_err(|e| HttpFailure {
            status: None,
            message: format!("request failed: {}", e),
            retryable: true,
        })?;

        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        debug!(method = %method, url = %url, status = %status, "gateway response");

        if status.is_success() {
            // Acknowledgement endpoints answer with an empty body.
            let text = if text.trim().is_empty() { "null" } else { &text };
            return serde_json::from_str::<T>(text).map_err(|e| HttpFailure {
                status: Some(status.as_u16()),
                message: format!("invalid JSON response: {}", e),
                retryable: false,
            });
        }

        Err(HttpFailure {
            status: Some(status.as_u16()),
            message: format!("HTTP {}: {}", status, text),
            retryable: status.is_server_error() || status.as_u16() == 429,
        })
    }
}

/// Constant-time comparison for shared secrets
pub fn secure_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter()
        .zip(b.iter())
        .fold(0_u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

//! HTTP client utilities and the JSON-RPC HTTP transport.

use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, RETRY_AFTER};
use reqwest::{Client, ClientBuilder, StatusCode};
use serde_json::Value;

use super::rpc::{RpcRequest, RpcResponse, RpcTransport};
use crate::error::{AssetError, Result};

/// Default timeout for HTTP requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Query parameter some providers use to carry the API key.
const API_KEY_PARAM: &str = "api-key";
const API_KEY_HEADER: &str = "x-api-key";

/// Build a configured HTTP client.
///
/// # Errors
///
/// Returns error if client construction fails.
pub fn build_client(timeout: Duration) -> Result<Client> {
    ClientBuilder::new()
        .timeout(timeout)
        .user_agent(format!("realm-assets/{}", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| AssetError::Network(e.to_string()))
}

/// An RPC URL split into its base and optional API key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcEndpoint {
    /// URL without query string.
    pub base_url: String,
    /// Value of the `api-key` query parameter, if present.
    pub api_key: Option<String>,
}

impl RpcEndpoint {
    /// Split `url` at the query string and pull out the `api-key` parameter.
    #[must_use]
    pub fn parse(url: &str) -> Self {
        let (base, query) = url.split_once('?').unwrap_or((url, ""));
        let api_key = query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(name, _)| *name == API_KEY_PARAM)
            .map(|(_, value)| value.to_string())
            .filter(|value| !value.is_empty());
        Self {
            base_url: base.to_string(),
            api_key,
        }
    }

    /// `Authorization` and `x-api-key` headers carrying the key.
    ///
    /// # Errors
    ///
    /// Returns a config error if the key is not a valid header value.
    pub fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(key) = &self.api_key {
            let value = HeaderValue::from_str(key).map_err(|_| AssetError::ConfigInvalid {
                key: "rpc.endpoint".to_string(),
                value: "<api-key>".to_string(),
                message: "API key contains characters not allowed in a header".to_string(),
            })?;
            headers.insert(AUTHORIZATION, value.clone());
            headers.insert(API_KEY_HEADER, value);
        }
        Ok(headers)
    }

    /// Base URL safe to print in logs and errors.
    #[must_use]
    pub fn redacted(&self) -> &str {
        &self.base_url
    }
}

/// POSTs JSON arrays of requests to an RPC endpoint.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    endpoint: RpcEndpoint,
    headers: HeaderMap,
    timeout: Duration,
}

impl HttpTransport {
    /// # Errors
    ///
    /// Returns error if the client cannot be built or the API key is unusable.
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let endpoint = RpcEndpoint::parse(url);
        let headers = endpoint.headers()?;
        tracing::debug!(
            endpoint = endpoint.redacted(),
            api_key = endpoint.api_key.is_some(),
            "Configured RPC transport"
        );
        Ok(Self {
            client: build_client(timeout)?,
            endpoint,
            headers,
            timeout,
        })
    }

    #[must_use]
    pub const fn endpoint(&self) -> &RpcEndpoint {
        &self.endpoint
    }

    async fn post(&self, requests: Vec<RpcRequest>) -> Result<Vec<RpcResponse>> {
        let response = self
            .client
            .post(&self.endpoint.base_url)
            .headers(self.headers.clone())
            .json(&requests)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AssetError::Timeout(self.timeout.as_secs())
                } else {
                    AssetError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &self.endpoint, retry_after, body));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AssetError::ParseResponse(e.to_string()))?;
        parse_batch_body(body)
    }
}

impl RpcTransport for HttpTransport {
    fn send_batch(&self, requests: Vec<RpcRequest>) -> BoxFuture<'_, Result<Vec<RpcResponse>>> {
        Box::pin(self.post(requests))
    }
}

fn status_error(
    status: StatusCode,
    endpoint: &RpcEndpoint,
    retry_after: Option<Duration>,
    body: String,
) -> AssetError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            tracing::error!(status = status.as_u16(), body = %body, "RPC endpoint rejected credentials");
            AssetError::AuthFailed {
                status: status.as_u16(),
                endpoint: endpoint.redacted().to_string(),
            }
        }
        StatusCode::TOO_MANY_REQUESTS => AssetError::RateLimited {
            retry_after,
            message: if body.is_empty() {
                "HTTP 429".to_string()
            } else {
                body
            },
        },
        _ => AssetError::HttpStatus {
            status: status.as_u16(),
            message: body,
        },
    }
}

/// Accept either a JSON array of responses or a single response object.
fn parse_batch_body(body: Value) -> Result<Vec<RpcResponse>> {
    let items = match body {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        single => vec![single],
    };
    items
        .into_iter()
        .map(|item| serde_json::from_value(item).map_err(|e| AssetError::ParseResponse(e.to_string())))
        .collect()
}

//! HTTP transport used by the Civitai client.
//!
//! The client only needs "GET this URL" with an optional bearer token, a
//! status code, an optional `Retry-After`, and a streamed body. Keeping that
//! behind a trait lets tests script the remote service.

use crate::config::NetworkConfig;
use crate::{Result, SyncError};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream};
use futures::{StreamExt, TryStreamExt};
use reqwest::{header, Client};
use std::time::Duration;
use tracing::debug;

/// Streamed response body.
pub type BodyStream = BoxStream<'static, Result<Bytes>>;

/// Response to a GET request.
pub struct TransportResponse {
    pub status: u16,
    /// Server-requested wait from `Retry-After`, in whole seconds.
    pub retry_after: Option<Duration>,
    pub body: BodyStream,
}

impl std::fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .field("retry_after", &self.retry_after)
            .finish_non_exhaustive()
    }
}

impl TransportResponse {
    /// Build a response with an in-memory body.
    pub fn from_bytes(status: u16, body: impl Into<Bytes>) -> Self {
        let body: Bytes = body.into();
        Self {
            status,
            retry_after: None,
            body: stream::once(async move { Ok(body) }).boxed(),
        }
    }

    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    /// Collect the whole body.
    pub async fn bytes(self) -> Result<Bytes> {
        let mut buffer = BytesMut::new();
        let mut body = self.body;
        while let Some(chunk) = body.next().await {
            buffer.extend_from_slice(&chunk?);
        }
        Ok(buffer.freeze())
    }
}

/// Minimal GET transport.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue a GET request. Errors are transport-level failures (connect,
    /// timeout); HTTP error statuses are returned as responses.
    async fn get(&self, url: &str, bearer: Option<&str>) -> Result<TransportResponse>;
}

/// Production transport backed by reqwest.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Create a transport with the default request timeout.
    pub fn new() -> Result<Self> {
        Self::with_timeout(NetworkConfig::REQUEST_TIMEOUT)
    }

    /// Create a transport with a custom request timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(NetworkConfig::CONNECT_TIMEOUT)
            .user_agent(NetworkConfig::USER_AGENT)
            .build()
            .map_err(|e| SyncError::Network {
                message: format!("Failed to create HTTP client: {}", e),
                cause: None,
            })?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &str, bearer: Option<&str>) -> Result<TransportResponse> {
        let mut request = self.client.get(url);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                SyncError::Timeout(format!("GET {}", url))
            } else {
                SyncError::Network {
                    message: format!("GET {} failed: {}", url, e),
                    cause: std::error::Error::source(&e).map(|s| s.to_string()),
                }
            }
        })?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_secs);

        debug!("GET {} -> {}", url, status);

        let body = response.bytes_stream().map_err(SyncError::from).boxed();
        Ok(TransportResponse {
            status,
            retry_after,
            body,
        })
    }
}

/// Extract domain from a URL.
pub fn extract_domain(url: &str) -> String {
    url::Url::parse(url)
        .map(|u| u.host_str().unwrap_or("unknown").to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

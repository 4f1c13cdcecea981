//! HTTP JSON-RPC client backed by `reqwest`.
//!
//! Failures are returned to the caller as-is; there is no retry or
//! reconnect policy at this layer.

use async_trait::async_trait;
use std::time::Duration;

use super::error::TransportError;
use super::request::{JsonRpcRequest, JsonRpcResponse};
use super::transport::RpcTransport;

/// HTTP JSON-RPC client.
pub struct HttpRpcClient {
    url: String,
    http: reqwest::Client,
}

impl HttpRpcClient {
    /// Create a new client for the given JSON-RPC endpoint URL.
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| TransportError::Http(format!("build client: {e}")))?;

        Ok(Self {
            url: url.into(),
            http,
        })
    }
}

#[async_trait]
impl RpcTransport for HttpRpcClient {
    async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
        tracing::trace!(method = %req.method, id = %req.id, "rpc request");
        let resp = self
            .http
            .post(&self.url)
            .json(&req)
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Http(format!("HTTP {status}: {body}")));
        }

        resp.json::<JsonRpcResponse>()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))
    }

    fn url(&self) -> &str {
        &self.url
    }
}

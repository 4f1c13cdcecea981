//! The `RpcTransport` trait: request/response access to a chain node.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::error::TransportError;
use super::request::{JsonRpcRequest, JsonRpcResponse};

/// An async JSON-RPC transport.
///
/// Implementations must be `Send + Sync` for use across Tokio tasks.
#[async_trait]
pub trait RpcTransport: Send + Sync + 'static {
    /// Send a single JSON-RPC request and return the response.
    async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError>;

    /// Return the transport's identifier (URL or name).
    fn url(&self) -> &str;

    /// Convenience: call a method and deserialize the result.
    async fn call<T: DeserializeOwned + Send>(
        &self,
        id: u64,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, TransportError> {
        let req = JsonRpcRequest::new(id, method, params);
        let resp = self.send(req).await?;
        let result = resp.into_result().map_err(TransportError::Rpc)?;
        serde_json::from_value(result).map_err(TransportError::Deserialization)
    }
}

//! JSON-RPC plumbing: wire types, the transport trait, HTTP requests and
//! WebSocket log subscriptions.

pub mod error;
pub mod http;
pub mod request;
pub mod transport;
pub mod ws;

pub use error::TransportError;
pub use http::HttpRpcClient;
pub use request::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RpcId};
pub use transport::RpcTransport;

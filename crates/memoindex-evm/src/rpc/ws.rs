//! WebSocket log subscriptions (`eth_subscribe("logs", filter)`).
//!
//! The connection is owned by a background task that forwards each
//! notification's `result` object. When the socket closes the channel is
//! dropped and the subscription stream ends; it is not re-established.

use futures::channel::mpsc;
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde_json::Value;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, info, warn};

use super::error::TransportError;
use super::request::{JsonRpcRequest, JsonRpcResponse, RpcId};

const SUBSCRIBE_ID: u64 = 1;

/// An active `logs` subscription.
pub struct WsLogSubscription {
    /// Subscription id assigned by the node.
    pub id: String,
    /// Raw log objects, one per notification.
    pub logs: mpsc::Receiver<Value>,
}

/// Connect to `url` and subscribe to logs matching `filter`.
///
/// Returns once the node has confirmed the subscription.
pub async fn subscribe_logs(url: &str, filter: Value) -> Result<WsLogSubscription, TransportError> {
    info!(url = %url, "connecting via WebSocket");
    let (ws, _) = tokio_tungstenite::connect_async(url)
        .await
        .map_err(|e| TransportError::WebSocket(format!("connect {url}: {e}")))?;
    let (mut write, mut read) = ws.split();

    let req = JsonRpcRequest::new(SUBSCRIBE_ID, "eth_subscribe", vec![Value::from("logs"), filter]);
    write
        .send(Message::Text(serde_json::to_string(&req)?))
        .await
        .map_err(|e| TransportError::WebSocket(format!("send eth_subscribe: {e}")))?;

    let id = loop {
        match read.next().await {
            None => {
                return Err(TransportError::WebSocket(
                    "socket closed before subscription was confirmed".into(),
                ))
            }
            Some(Err(e)) => return Err(TransportError::WebSocket(e.to_string())),
            Some(Ok(Message::Text(text))) => {
                let Ok(resp) = serde_json::from_str::<JsonRpcResponse>(&text) else {
                    continue;
                };
                if resp.id != RpcId::Number(SUBSCRIBE_ID) {
                    continue;
                }
                let result = resp.into_result().map_err(TransportError::Rpc)?;
                break serde_json::from_value::<String>(result)?;
            }
            Some(Ok(_)) => continue,
        }
    };
    info!(subscription = %id, "log subscription confirmed");

    let (tx, rx) = mpsc::channel(512);
    tokio::spawn(forward_notifications(id.clone(), write, read, tx));

    Ok(WsLogSubscription { id, logs: rx })
}

async fn forward_notifications<W, R>(
    sub_id: String,
    mut write: W,
    mut read: R,
    mut tx: mpsc::Sender<Value>,
) where
    W: Sink<Message> + Unpin,
    R: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    while let Some(msg) = read.next().await {
        match msg {
            Err(e) => {
                warn!(error = %e, "WebSocket receive error");
                break;
            }
            Ok(Message::Text(text)) => {
                let Some(log) = notification_result(&text, &sub_id) else {
                    debug!("ignoring non-notification WebSocket message");
                    continue;
                };
                if tx.send(log).await.is_err() {
                    // Receiver dropped
                    break;
                }
            }
            Ok(Message::Ping(data)) => {
                let _ = write.send(Message::Pong(data)).await;
            }
            Ok(Message::Close(_)) => {
                info!("WebSocket closed by server");
                break;
            }
            Ok(_) => {}
        }
    }
    warn!(subscription = %sub_id, "log subscription ended");
}

/// Extract `params.result` from an `eth_subscription` notification for `sub_id`.
fn notification_result(text: &str, sub_id: &str) -> Option<Value> {
    let v: Value = serde_json::from_str(text).ok()?;
    if v.get("method")?.as_str()? != "eth_subscription" {
        return None;
    }
    let params = v.get("params")?;
    if params.get("subscription")?.as_str()? != sub_id {
        return None;
    }
    params.get("result").cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_matching_notification() {
        let msg = r#"{
            "jsonrpc":"2.0","method":"eth_subscription",
            "params":{"subscription":"0xabc","result":{"blockNumber":"0x6a","transactionHash":"0x01"}}
        }"#;
        let log = notification_result(msg, "0xabc").unwrap();
        assert_eq!(log["blockNumber"], "0x6a");
    }

    #[test]
    fn skips_other_subscriptions_and_responses() {
        let other = r#"{"jsonrpc":"2.0","method":"eth_subscription","params":{"subscription":"0xdef","result":{}}}"#;
        assert!(notification_result(other, "0xabc").is_none());

        let confirmation = r#"{"jsonrpc":"2.0","id":1,"result":"0xabc"}"#;
        assert!(notification_result(confirmation, "0xabc").is_none());
        assert!(notification_result("not json", "0xabc").is_none());
    }

    #[tokio::test]
    async fn unreachable_socket_is_websocket_error() {
        let err = subscribe_logs("ws://127.0.0.1:1", serde_json::json!({}))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, TransportError::WebSocket(_)));
    }
}

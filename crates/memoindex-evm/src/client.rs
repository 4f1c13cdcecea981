//! EVM chain client: head tracking, historical log queries and live
//! subscriptions for a single contract event.
//!
//! Uses `eth_getLogs` for backfill. Live delivery uses
//! `eth_subscribe("logs")` when a WebSocket URL is configured, otherwise an
//! installed log filter polled with `eth_getFilterChanges`.

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy_json_abi::Event;
use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use futures::channel::mpsc;
use futures::{SinkExt, Stream, StreamExt};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use memoindex_core::config::IngestConfig;
use memoindex_core::descriptor::Descriptor;
use memoindex_core::error::IngestError;
use memoindex_core::types::RawEvent;

use crate::decode::{parse_hex_u64, to_hex_quantity, RpcLog};
use crate::rpc::{ws, HttpRpcClient, RpcTransport};

/// A raw event, or the reason a single log could not be decoded.
pub type DecodedLog = Result<RawEvent, IngestError>;

/// An endless stream of live events.
pub type RawEventStream = Pin<Box<dyn Stream<Item = DecodedLog> + Send>>;

// ─── LogFilter ───────────────────────────────────────────────────────────────

/// Which logs to fetch: one event of one contract.
#[derive(Debug, Clone)]
pub struct LogFilter {
    pub address: Address,
    pub event: Event,
    /// Event signature hash (`topics[0]`).
    pub topic0: B256,
}

impl LogFilter {
    pub fn new(address: Address, event: Event) -> Self {
        let topic0 = event.selector();
        Self {
            address,
            event,
            topic0,
        }
    }

    /// Build the filter for `event_name` of the descriptor's contract.
    pub fn from_descriptor(descriptor: &Descriptor, event_name: &str) -> Result<Self, IngestError> {
        let event = descriptor.event(event_name)?.clone();
        Ok(Self::new(descriptor.address, event))
    }

    /// JSON-RPC filter object.
    pub fn to_json(&self, from: Option<u64>, to: Option<u64>) -> Value {
        let mut filter = json!({
            "address": self.address.to_string(),
            "topics": [self.topic0.to_string()],
        });
        if let Some(from) = from {
            filter["fromBlock"] = Value::from(to_hex_quantity(from));
        }
        if let Some(to) = to {
            filter["toBlock"] = Value::from(to_hex_quantity(to));
        }
        filter
    }
}

// ─── ChainClient ─────────────────────────────────────────────────────────────

/// Access to a chain node for one contract event.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Current head block number.
    async fn head_block_number(&self) -> Result<u64, IngestError>;

    /// All matching events in `[from, to]`, in chain order.
    ///
    /// Fails with [`IngestError::Rpc`] if the node cannot be queried; a log
    /// that cannot be decoded is returned as an `Err` item instead.
    async fn query_historical(
        &self,
        filter: &LogFilter,
        from: u64,
        to: u64,
    ) -> Result<Vec<DecodedLog>, IngestError>;

    /// Subscribe to new matching events. `from_block` is a hint: logs mined
    /// before the subscription is installed are not guaranteed to be
    /// delivered. The stream does not end on its own.
    async fn subscribe(&self, filter: &LogFilter, from_block: u64) -> Result<RawEventStream, IngestError>;
}

// ─── EvmChainClient ──────────────────────────────────────────────────────────

/// Options for [`EvmChainClient`].
#[derive(Debug, Clone)]
pub struct EvmClientOptions {
    /// Maximum blocks per `eth_getLogs` call. `None` = single range query.
    pub max_block_range: Option<u64>,
    /// Interval between `eth_getFilterChanges` polls.
    pub poll_interval: Duration,
    /// HTTP request timeout.
    pub request_timeout: Duration,
}

impl Default for EvmClientOptions {
    fn default() -> Self {
        Self {
            max_block_range: None,
            poll_interval: Duration::from_millis(4000),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl EvmClientOptions {
    /// Take the chain-facing settings from an ingestion config.
    pub fn from_config(config: &IngestConfig) -> Self {
        Self {
            max_block_range: config.max_block_range,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            ..Default::default()
        }
    }
}

/// JSON-RPC backed [`ChainClient`].
pub struct EvmChainClient<T: RpcTransport = HttpRpcClient> {
    transport: Arc<T>,
    ws_url: Option<String>,
    options: EvmClientOptions,
    next_id: Arc<AtomicU64>,
}

impl EvmChainClient<HttpRpcClient> {
    /// Connect to an HTTP endpoint and verify it answers `eth_chainId`.
    pub async fn connect(
        http_url: &str,
        ws_url: Option<String>,
        options: EvmClientOptions,
    ) -> Result<Self, IngestError> {
        info!(url = %http_url, "Connecting to chain node");
        let transport = HttpRpcClient::new(http_url, options.request_timeout)?;
        let client = Self::with_transport(transport, ws_url, options);
        let chain_id = client.chain_id().await?;
        info!(url = %http_url, chain_id, "Connected to chain node");
        Ok(client)
    }
}

impl<T: RpcTransport> EvmChainClient<T> {
    pub fn with_transport(transport: T, ws_url: Option<String>, options: EvmClientOptions) -> Self {
        Self {
            transport: Arc::new(transport),
            ws_url,
            options,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// `eth_chainId`.
    pub async fn chain_id(&self) -> Result<u64, IngestError> {
        let hex: String = self.transport.call(self.next_id(), "eth_chainId", vec![]).await?;
        parse_hex_u64(&hex).ok_or_else(|| IngestError::Rpc(format!("invalid chain id {hex}")))
    }

    async fn get_logs(&self, filter: &LogFilter, from: u64, to: u64) -> Result<Vec<RpcLog>, IngestError> {
        let logs: Vec<RpcLog> = self
            .transport
            .call(self.next_id(), "eth_getLogs", vec![filter.to_json(Some(from), Some(to))])
            .await?;
        debug!(from, to, logs = logs.len(), "eth_getLogs");
        Ok(logs)
    }

    async fn subscribe_polling(&self, filter: &LogFilter, from_block: u64) -> Result<RawEventStream, IngestError> {
        let filter_id: String = self
            .transport
            .call(self.next_id(), "eth_newFilter", vec![filter.to_json(Some(from_block), None)])
            .await?;
        info!(filter = %filter_id, from_block, "Installed log filter");

        let (tx, rx) = mpsc::channel(512);
        tokio::spawn(poll_filter_changes(
            Arc::clone(&self.transport),
            Arc::clone(&self.next_id),
            filter_id,
            filter.event.clone(),
            self.options.poll_interval,
            tx,
        ));
        Ok(Box::pin(rx))
    }

    async fn subscribe_ws(&self, url: &str, filter: &LogFilter) -> Result<RawEventStream, IngestError> {
        let sub = ws::subscribe_logs(url, filter.to_json(None, None)).await?;
        let event = filter.event.clone();
        let stream = sub
            .logs
            .filter_map(move |value| futures::future::ready(live_item(value, &event)));
        Ok(Box::pin(stream))
    }
}

/// Map one `eth_subscription` log object to a live event. Removed logs are
/// skipped.
fn live_item(value: Value, event: &Event) -> Option<DecodedLog> {
    match serde_json::from_value::<RpcLog>(value) {
        Ok(log) if log.removed => {
            warn!(tx = ?log.transaction_hash, "skipping removed log");
            None
        }
        Ok(log) => Some(log.to_live(event)),
        Err(e) => Some(Err(IngestError::Normalize(format!("invalid log object: {e}")))),
    }
}

#[async_trait]
impl<T: RpcTransport> ChainClient for EvmChainClient<T> {
    async fn head_block_number(&self) -> Result<u64, IngestError> {
        let hex: String = self.transport.call(self.next_id(), "eth_blockNumber", vec![]).await?;
        parse_hex_u64(&hex).ok_or_else(|| IngestError::Rpc(format!("invalid block number {hex}")))
    }

    async fn query_historical(
        &self,
        filter: &LogFilter,
        from: u64,
        to: u64,
    ) -> Result<Vec<DecodedLog>, IngestError> {
        if to < from {
            return Ok(vec![]);
        }

        let mut logs = Vec::new();
        match self.options.max_block_range {
            Some(range) if range > 0 && to - from >= range => {
                let mut start = from;
                while start <= to {
                    let end = start.saturating_add(range - 1).min(to);
                    logs.extend(self.get_logs(filter, start, end).await?);
                    if end == u64::MAX {
                        break;
                    }
                    start = end + 1;
                }
            }
            _ => logs = self.get_logs(filter, from, to).await?,
        }

        Ok(logs
            .iter()
            .filter(|log| {
                if log.removed {
                    warn!(tx = ?log.transaction_hash, "skipping removed log");
                }
                !log.removed
            })
            .map(|log| log.to_historical(&filter.event))
            .collect())
    }

    async fn subscribe(&self, filter: &LogFilter, from_block: u64) -> Result<RawEventStream, IngestError> {
        match &self.ws_url {
            Some(url) => self.subscribe_ws(url, filter).await,
            None => self.subscribe_polling(filter, from_block).await,
        }
    }
}

async fn poll_filter_changes<T: RpcTransport>(
    transport: Arc<T>,
    next_id: Arc<AtomicU64>,
    filter_id: String,
    event: Event,
    interval: Duration,
    mut tx: mpsc::Sender<DecodedLog>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    while !tx.is_closed() {
        ticker.tick().await;
        let id = next_id.fetch_add(1, Ordering::Relaxed);
        let logs: Vec<RpcLog> = match transport
            .call(id, "eth_getFilterChanges", vec![Value::from(filter_id.clone())])
            .await
        {
            Ok(logs) => logs,
            Err(e) => {
                warn!(filter = %filter_id, error = %e, "eth_getFilterChanges failed");
                continue;
            }
        };

        for log in logs {
            if log.removed {
                warn!(tx = ?log.transaction_hash, "skipping removed log");
                continue;
            }
            if tx.send(log.to_live(&event)).await.is_err() {
                // Receiver dropped
                return;
            }
        }
    }
    debug!(filter = %filter_id, "filter polling stopped");
}

//! Log decoding: `eth_getLogs` / `eth_subscribe` log objects → [`RawEvent`].

use alloy_dyn_abi::EventExt;
use alloy_json_abi::Event;
use alloy_primitives::B256;
use serde::{Deserialize, Serialize};

use memoindex_core::error::IngestError;
use memoindex_core::types::{EventArgs, HistoricalEvent, LiveEvent, LogLocation, RawEvent};

/// A log object as returned by the node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcLog {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    /// `None` for pending logs.
    pub block_number: Option<String>,
    pub transaction_hash: Option<String>,
    pub log_index: Option<String>,
    #[serde(default)]
    pub removed: bool,
}

impl RpcLog {
    fn location(&self) -> Result<LogLocation, IngestError> {
        let block_number = self
            .block_number
            .as_deref()
            .and_then(parse_hex_u64)
            .ok_or_else(|| IngestError::Normalize("log has no block number".into()))?;
        let transaction_hash = self
            .transaction_hash
            .clone()
            .ok_or_else(|| IngestError::Normalize("log has no transaction hash".into()))?;
        Ok(LogLocation {
            block_number,
            transaction_hash,
        })
    }

    /// Decode into the historical envelope.
    pub fn to_historical(&self, event: &Event) -> Result<RawEvent, IngestError> {
        let args = decode_args(event, self)?;
        let loc = self.location()?;
        Ok(RawEvent::Historical(HistoricalEvent {
            args,
            block_number: loc.block_number,
            transaction_hash: loc.transaction_hash,
        }))
    }

    /// Decode into the live envelope.
    pub fn to_live(&self, event: &Event) -> Result<RawEvent, IngestError> {
        let args = decode_args(event, self)?;
        let log = self.location()?;
        Ok(RawEvent::Live(LiveEvent { args, log }))
    }
}

/// Decode a log's topics and data into positional arguments, in ABI
/// declaration order (indexed and non-indexed inputs interleaved).
pub fn decode_args(event: &Event, log: &RpcLog) -> Result<EventArgs, IngestError> {
    let topics = log
        .topics
        .iter()
        .map(|t| t.parse::<B256>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| IngestError::Normalize(format!("invalid topic: {e}")))?;
    let data = hex::decode(log.data.strip_prefix("0x").unwrap_or(&log.data))
        .map_err(|e| IngestError::Normalize(format!("invalid log data: {e}")))?;

    let decoded = event
        .decode_log_parts(topics, &data, false)
        .map_err(|e| IngestError::Normalize(format!("decode {}: {e}", event.name)))?;

    let mut indexed = decoded.indexed.into_iter();
    let mut body = decoded.body.into_iter();
    event
        .inputs
        .iter()
        .map(|input| {
            let value = if input.indexed { indexed.next() } else { body.next() };
            value.ok_or_else(|| IngestError::Normalize(format!("missing value for {}", input.name)))
        })
        .collect()
}

/// Parse a hex-encoded quantity (with or without `0x`) to u64.
pub fn parse_hex_u64(s: &str) -> Option<u64> {
    u64::from_str_radix(s.strip_prefix("0x").unwrap_or(s), 16).ok()
}

/// Format a block number as a JSON-RPC quantity.
pub fn to_hex_quantity(n: u64) -> String {
    format!("{n:#x}")
}

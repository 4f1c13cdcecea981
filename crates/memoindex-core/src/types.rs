//! Shared types for the ingestion pipeline.

use alloy_dyn_abi::DynSolValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─── Memo ────────────────────────────────────────────────────────────────────

/// A normalized `NewMemo` event, ready to be persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Memo {
    /// Sender address (`0x` + 40 hex chars, EIP-55 checksummed).
    pub sender_address: String,
    /// Name supplied by the sender.
    pub name: String,
    /// Message supplied by the sender.
    pub message: String,
    /// On-chain timestamp of the purchase.
    pub timestamp: DateTime<Utc>,
    /// Block that included the originating event.
    pub block_number: u64,
    /// Transaction hash (`0x` + 64 hex chars). Unique per memo.
    pub tx_hash: String,
}

/// A memo as stored, with its surrogate key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoRow {
    /// Store-assigned id, monotonically increasing.
    pub id: i64,
    #[serde(flatten)]
    pub memo: Memo,
}

// ─── RawEvent ────────────────────────────────────────────────────────────────

/// Positional event arguments in ABI declaration order.
///
/// For `NewMemo` this is `[from, timestamp, name, message]`.
pub type EventArgs = Vec<DynSolValue>;

/// Where a live event was included on chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLocation {
    pub block_number: u64,
    pub transaction_hash: String,
}

/// An event delivered by a historical range query.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoricalEvent {
    pub args: EventArgs,
    pub block_number: u64,
    pub transaction_hash: String,
}

/// An event delivered by the live subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveEvent {
    pub args: EventArgs,
    pub log: LogLocation,
}

/// A raw contract event in one of the two delivery envelopes.
#[derive(Debug, Clone, PartialEq)]
pub enum RawEvent {
    Historical(HistoricalEvent),
    Live(LiveEvent),
}

impl RawEvent {
    /// Positional arguments, whichever the envelope.
    pub fn args(&self) -> &[DynSolValue] {
        match self {
            Self::Historical(e) => &e.args,
            Self::Live(e) => &e.args,
        }
    }

    /// Block number, whichever the envelope.
    pub fn block_number(&self) -> u64 {
        match self {
            Self::Historical(e) => e.block_number,
            Self::Live(e) => e.log.block_number,
        }
    }

    /// Transaction hash, whichever the envelope.
    pub fn transaction_hash(&self) -> &str {
        match self {
            Self::Historical(e) => &e.transaction_hash,
            Self::Live(e) => &e.log.transaction_hash,
        }
    }

    /// The phase this envelope belongs to.
    pub fn phase(&self) -> IngestPhase {
        match self {
            Self::Historical(_) => IngestPhase::Backfill,
            Self::Live(_) => IngestPhase::Live,
        }
    }
}

// ─── IngestPhase ─────────────────────────────────────────────────────────────

/// The phase in which an event was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestPhase {
    /// Catching up from the start block to the head seen at startup.
    Backfill,
    /// Following new events via the subscription.
    Live,
}

impl std::fmt::Display for IngestPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Backfill => write!(f, "backfill"),
            Self::Live => write!(f, "live"),
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

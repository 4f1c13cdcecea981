//! Ingestion configuration and state types.

use serde::{Deserialize, Serialize};

/// Configuration for an ingestion run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Name of the contract event to ingest.
    pub event_name: String,
    /// First block to scan when the descriptor has no `deploymentBlock`.
    pub default_from_block: u64,
    /// Split the historical query into chunks of at most this many blocks.
    /// `None` = one range query from start block to head.
    pub max_block_range: Option<u64>,
    /// Filter polling interval for HTTP-only live mode (milliseconds).
    pub poll_interval_ms: u64,
    /// Upper bound on concurrently running live handlers. `None` = unbounded.
    pub live_concurrency: Option<usize>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            event_name: "NewMemo".into(),
            default_from_block: 0,
            max_block_range: None,
            poll_interval_ms: 4000,
            live_concurrency: None,
        }
    }
}

/// Runtime state of the ingestor.
///
/// Transitions are one-directional: `Idle → Backfilling → Live`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IngestState {
    /// Not yet started.
    Idle,
    /// Replaying historical events up to the head seen at startup.
    Backfilling,
    /// Consuming the live subscription.
    Live,
}

impl std::fmt::Display for IngestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Backfilling => write!(f, "backfilling"),
            Self::Live => write!(f, "live"),
        }
    }
}

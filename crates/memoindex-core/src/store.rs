//! The `MemoStore` trait: the persistence seam for ingested memos.

use async_trait::async_trait;

use crate::error::IngestError;
use crate::types::{Memo, MemoRow};

/// Result of a conditional insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// A new row was created with this id.
    Inserted { id: i64 },
    /// A row with the same `tx_hash` already existed; nothing was written.
    Duplicate,
}

impl UpsertOutcome {
    /// Returns `true` if a new row was created.
    pub fn is_inserted(&self) -> bool {
        matches!(self, Self::Inserted { .. })
    }
}

/// Durable storage for memos, keyed uniquely by transaction hash.
///
/// Implementations must be safe to call concurrently: live handlers may
/// overlap in time.
#[async_trait]
pub trait MemoStore: Send + Sync {
    /// Create the `memos` table if it does not exist.
    ///
    /// Fails with [`IngestError::StorageInit`].
    async fn init_schema(&self) -> Result<(), IngestError>;

    /// Insert `memo` unless a row with the same `tx_hash` exists.
    ///
    /// A duplicate is not an error. Fails with [`IngestError::Write`].
    async fn upsert_memo(&self, memo: &Memo) -> Result<UpsertOutcome, IngestError>;

    /// The newest `limit` rows, highest id first.
    async fn recent_memos(&self, limit: u32) -> Result<Vec<MemoRow>, IngestError>;

    /// Total number of stored memos.
    async fn memo_count(&self) -> Result<u64, IngestError>;
}

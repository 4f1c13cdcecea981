//! In-memory storage backend.
//!
//! Mirrors the Postgres semantics: unique `tx_hash`, ids assigned in insert
//! order and never reused. All data is lost when the process exits.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use memoindex_core::error::IngestError;
use memoindex_core::store::{MemoStore, UpsertOutcome};
use memoindex_core::types::{Memo, MemoRow};

#[derive(Default)]
struct State {
    rows: Vec<MemoRow>,
    by_tx_hash: HashMap<String, i64>,
    last_id: i64,
}

/// In-memory memo storage.
#[derive(Default)]
pub struct InMemoryMemoStore {
    state: Mutex<State>,
}

impl InMemoryMemoStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// All rows in id order.
    pub fn rows(&self) -> Vec<MemoRow> {
        self.state().rows.clone()
    }

    /// Look up a row by transaction hash.
    pub fn by_tx_hash(&self, tx_hash: &str) -> Option<MemoRow> {
        let state = self.state();
        let id = *state.by_tx_hash.get(tx_hash)?;
        state.rows.iter().find(|r| r.id == id).cloned()
    }

    /// Number of stored rows.
    pub fn len(&self) -> usize {
        self.state().rows.len()
    }

    /// Returns `true` if nothing has been stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl MemoStore for InMemoryMemoStore {
    async fn init_schema(&self) -> Result<(), IngestError> {
        tracing::debug!("in-memory memo store ready");
        Ok(())
    }

    async fn upsert_memo(&self, memo: &Memo) -> Result<UpsertOutcome, IngestError> {
        let mut state = self.state();
        if state.by_tx_hash.contains_key(&memo.tx_hash) {
            return Ok(UpsertOutcome::Duplicate);
        }
        state.last_id += 1;
        let id = state.last_id;
        state.by_tx_hash.insert(memo.tx_hash.clone(), id);
        state.rows.push(MemoRow {
            id,
            memo: memo.clone(),
        });
        Ok(UpsertOutcome::Inserted { id })
    }

    async fn recent_memos(&self, limit: u32) -> Result<Vec<MemoRow>, IngestError> {
        Ok(self
            .state()
            .rows
            .iter()
            .rev()
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn memo_count(&self) -> Result<u64, IngestError> {
        Ok(self.state().rows.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    fn memo(tx: u8, name: &str, block: u64) -> Memo {
        Memo {
            sender_address: "0x0000000000000000000000000000000000000001".into(),
            name: name.into(),
            message: "gm".into(),
            timestamp: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            block_number: block,
            tx_hash: format!("0x{}", hex_byte(tx).repeat(32)),
        }
    }

    fn hex_byte(b: u8) -> String {
        format!("{b:02x}")
    }

    #[tokio::test]
    async fn duplicate_tx_hash_keeps_first_write() {
        let store = InMemoryMemoStore::new();
        store.init_schema().await.unwrap();

        let first = store.upsert_memo(&memo(1, "alice", 10)).await.unwrap();
        assert_eq!(first, UpsertOutcome::Inserted { id: 1 });

        let again = store.upsert_memo(&memo(1, "alice", 10)).await.unwrap();
        let changed = store.upsert_memo(&memo(1, "mallory", 11)).await.unwrap();
        assert_eq!(again, UpsertOutcome::Duplicate);
        assert!(!changed.is_inserted());

        assert_eq!(store.len(), 1);
        let row = store.by_tx_hash(&memo(1, "", 0).tx_hash).unwrap();
        assert_eq!(row.memo.name, "alice");
        assert_eq!(row.memo.block_number, 10);
    }

    #[tokio::test]
    async fn ids_increase_and_recent_is_newest_first() {
        let store = InMemoryMemoStore::new();
        for (i, block) in [101u64, 103, 104].iter().enumerate() {
            store.upsert_memo(&memo(i as u8, "n", *block)).await.unwrap();
        }

        let ids: Vec<i64> = store.rows().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        let recent = store.recent_memos(2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].memo.block_number, 104);
        assert_eq!(recent[1].memo.block_number, 103);
        assert_eq!(store.memo_count().await.unwrap(), 3);
    }
}

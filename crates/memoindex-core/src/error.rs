//! Error types for the ingestion pipeline.

use thiserror::Error;

/// Errors that can occur while ingesting memos.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The deployment descriptor is missing or invalid.
    #[error("Config error: {0}")]
    Config(String),

    /// The `memos` schema could not be created.
    #[error("Storage init error: {0}")]
    StorageInit(String),

    /// The chain node could not be reached or returned an error.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// A read against the store failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A single memo could not be persisted.
    #[error("Write error for tx {tx_hash}: {reason}")]
    Write { tx_hash: String, reason: String },

    /// A raw event did not carry the expected positional arguments.
    #[error("Normalize error: {0}")]
    Normalize(String),

    /// A live event failed inside the subscription handler.
    #[error("Subscription handler error: {0}")]
    SubscriptionHandler(String),

    /// The live subscription stream ended.
    #[error("Subscription closed: {0}")]
    SubscriptionClosed(String),
}

impl IngestError {
    /// Returns `true` if the error must terminate the process.
    ///
    /// Errors scoped to a single event are isolated and never escalate.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::Write { .. } | Self::Normalize(_) | Self::SubscriptionHandler(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_errors_are_fatal() {
        assert!(IngestError::Config("missing abi".into()).is_fatal());
        assert!(IngestError::StorageInit("refused".into()).is_fatal());
        assert!(IngestError::Rpc("unreachable".into()).is_fatal());
        assert!(IngestError::SubscriptionClosed("eof".into()).is_fatal());
    }

    #[test]
    fn per_event_errors_are_isolated() {
        let write = IngestError::Write {
            tx_hash: "0xabc".into(),
            reason: "value too long".into(),
        };
        assert!(!write.is_fatal());
        assert!(!IngestError::Normalize("arg 1".into()).is_fatal());
        assert!(!IngestError::SubscriptionHandler("boom".into()).is_fatal());
        assert_eq!(
            write.to_string(),
            "Write error for tx 0xabc: value too long"
        );
    }
}

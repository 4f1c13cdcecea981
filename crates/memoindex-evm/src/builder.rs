//! Fluent builder API for ingestion configs.
//!
//! # Example
//!
//! ```rust
//! use memoindex_evm::IngestBuilder;
//!
//! let config = IngestBuilder::new()
//!     .event("NewMemo")
//!     .from_block(100)
//!     .max_block_range(2_000)
//!     .live_concurrency(16)
//!     .build_config();
//! assert_eq!(config.default_from_block, 100);
//! ```

use memoindex_core::config::IngestConfig;

/// Fluent builder for `IngestConfig`.
#[derive(Default)]
pub struct IngestBuilder {
    config: IngestConfig,
}

impl IngestBuilder {
    pub fn new() -> Self {
        Self {
            config: IngestConfig::default(),
        }
    }

    /// Set the contract event to ingest.
    pub fn event(mut self, name: impl Into<String>) -> Self {
        self.config.event_name = name.into();
        self
    }

    /// Set the start block used when the descriptor has no `deploymentBlock`.
    pub fn from_block(mut self, block: u64) -> Self {
        self.config.default_from_block = block;
        self
    }

    /// Split historical queries into ranges of at most `blocks` blocks.
    pub fn max_block_range(mut self, blocks: u64) -> Self {
        self.config.max_block_range = Some(blocks);
        self
    }

    /// Set the filter polling interval in milliseconds.
    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    /// Cap the number of live events handled at once.
    pub fn live_concurrency(mut self, limit: usize) -> Self {
        self.config.live_concurrency = Some(limit);
        self
    }

    /// Build the `IngestConfig`.
    pub fn build_config(self) -> IngestConfig {
        self.config
    }
}

//! memoindex-core: foundation for the memo ingestion service.
//!
//! # Architecture
//!
//! ```text
//! Ingestor (memoindex-evm)
//!     ├── DescriptorLoader  (contract address + ABI + start block)
//!     ├── ChainClient       (historical logs, live subscription)
//!     ├── normalize()       (RawEvent → Memo)
//!     └── MemoStore         (init_schema, upsert_memo)
//! ```

pub mod config;
pub mod descriptor;
pub mod error;
pub mod normalizer;
pub mod store;
pub mod types;

pub use config::{IngestConfig, IngestState};
pub use descriptor::{Descriptor, DescriptorLoader};
pub use error::IngestError;
pub use normalizer::normalize;
pub use store::{MemoStore, UpsertOutcome};
pub use types::{EventArgs, HistoricalEvent, IngestPhase, LiveEvent, LogLocation, Memo, MemoRow, RawEvent};

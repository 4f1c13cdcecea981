//! memoindex-evm: EVM chain access and the ingestion loop.
//!
//! Provides:
//! - [`EvmChainClient`]: `eth_getLogs` backfill queries and live delivery
//!   over `eth_subscribe` or polled log filters
//! - [`Ingestor`]: backfill to the startup head, then live from `head + 1`
//! - [`IngestBuilder`]: fluent construction of an [`IngestConfig`]
//!
//! [`IngestConfig`]: memoindex_core::IngestConfig

pub mod builder;
pub mod client;
pub mod decode;
pub mod ingest;
pub mod rpc;

pub use builder::IngestBuilder;
pub use client::{ChainClient, DecodedLog, EvmChainClient, EvmClientOptions, LogFilter, RawEventStream};
pub use decode::RpcLog;
pub use ingest::{ingest_one, start, BackfillReport, EventOutcome, Ingestor};

//! memoindex-storage: [`MemoStore`](memoindex_core::MemoStore) backends.
//!
//! Backends:
//! - [`memory`]: in-memory (tests and dry runs, no persistence)
//! - `postgres`: PostgreSQL via `sqlx` (feature: `postgres`)

pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::InMemoryMemoStore;

#[cfg(feature = "postgres")]
pub use postgres::{DatabaseConfig, PostgresMemoStore, PostgresOptions};

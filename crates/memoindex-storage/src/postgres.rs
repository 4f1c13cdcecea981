//! PostgreSQL storage backend.
//!
//! Persists memos into a single `memos` table, deduplicated by transaction
//! hash. Uses a bounded `sqlx` connection pool; every unit of work (schema
//! init, one upsert) holds one pooled connection for its own duration.
//!
//! # Feature Flag
//! Requires the `postgres` feature:
//! ```toml
//! memoindex-storage = { version = "0.1", features = ["postgres"] }
//! ```
//!
//! # Schema
//! ```sql
//! CREATE TABLE IF NOT EXISTS memos (
//!     id SERIAL PRIMARY KEY,
//!     sender_address VARCHAR(42) NOT NULL,
//!     name VARCHAR(255) NOT NULL,
//!     message TEXT NOT NULL,
//!     timestamp TIMESTAMPTZ NOT NULL,
//!     block_number BIGINT NOT NULL,
//!     tx_hash VARCHAR(66) NOT NULL UNIQUE
//! );
//! ```

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::{debug, info};

use memoindex_core::error::IngestError;
use memoindex_core::store::{MemoStore, UpsertOutcome};
use memoindex_core::types::{Memo, MemoRow};

// ─── Connection options ────────────────────────────────────────────────────────

/// Database connection parameters (`DB_HOST`, `DB_PORT`, `DB_USER`,
/// `DB_PASSWORD`, `DB_NAME`).
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
    pub database: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 5432,
            user: "postgres".into(),
            password: None,
            database: "postgres".into(),
        }
    }
}

impl DatabaseConfig {
    fn connect_options(&self) -> PgConnectOptions {
        let opts = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .database(&self.database);
        match &self.password {
            Some(password) => opts.password(password),
            None => opts,
        }
    }
}

/// Pool options for the Postgres storage backend.
#[derive(Debug, Clone)]
pub struct PostgresOptions {
    /// Maximum number of connections in the pool (default: 10)
    pub max_connections: u32,
    /// Minimum number of idle connections to keep open (default: 0)
    pub min_connections: u32,
    /// Seconds to wait for a free connection (default: 30)
    pub acquire_timeout_secs: u64,
}

impl Default for PostgresOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 0,
            acquire_timeout_secs: 30,
        }
    }
}

// ─── PostgresMemoStore ────────────────────────────────────────────────────────

/// PostgreSQL-backed memo storage.
///
/// Cheaply cloneable: wraps a connection pool internally.
#[derive(Clone)]
pub struct PostgresMemoStore {
    pool: PgPool,
}

impl PostgresMemoStore {
    /// Build a lazily-connecting pool.
    ///
    /// No connection is opened until the first unit of work, so connectivity
    /// problems surface from [`MemoStore::init_schema`].
    pub fn connect_lazy(db: &DatabaseConfig, opts: PostgresOptions) -> Self {
        let pool = PgPoolOptions::new()
            .max_connections(opts.max_connections)
            .min_connections(opts.min_connections)
            .acquire_timeout(Duration::from_secs(opts.acquire_timeout_secs))
            .connect_lazy_with(db.connect_options());
        info!(
            host = %db.host,
            port = db.port,
            database = %db.database,
            max_connections = opts.max_connections,
            "Postgres pool configured"
        );
        Self { pool }
    }

    /// Connect eagerly using a libpq-style URL.
    pub async fn connect(database_url: &str) -> Result<Self, IngestError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| IngestError::StorageInit(format!("postgres connect: {e}")))?;
        Ok(Self { pool })
    }

    /// Get the underlying connection pool (for custom queries).
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn row_to_memo(row: &PgRow) -> Result<MemoRow, sqlx::Error> {
    Ok(MemoRow {
        id: i64::from(row.try_get::<i32, _>("id")?),
        memo: Memo {
            sender_address: row.try_get("sender_address")?,
            name: row.try_get("name")?,
            message: row.try_get("message")?,
            timestamp: row.try_get::<DateTime<Utc>, _>("timestamp")?,
            block_number: row.try_get::<i64, _>("block_number")? as u64,
            tx_hash: row.try_get("tx_hash")?,
        },
    })
}

#[async_trait]
impl MemoStore for PostgresMemoStore {
    async fn init_schema(&self) -> Result<(), IngestError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| IngestError::StorageInit(e.to_string()))?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS memos (
                id             SERIAL       PRIMARY KEY,
                sender_address VARCHAR(42)  NOT NULL,
                name           VARCHAR(255) NOT NULL,
                message        TEXT         NOT NULL,
                timestamp      TIMESTAMPTZ  NOT NULL,
                block_number   BIGINT       NOT NULL,
                tx_hash        VARCHAR(66)  NOT NULL UNIQUE
            )",
        )
        .execute(&mut *conn)
        .await
        .map_err(|e| IngestError::StorageInit(e.to_string()))?;

        debug!("memos schema initialized");
        Ok(())
    }

    async fn upsert_memo(&self, memo: &Memo) -> Result<UpsertOutcome, IngestError> {
        let write_err = |reason: String| IngestError::Write {
            tx_hash: memo.tx_hash.clone(),
            reason,
        };
        let block_number = i64::try_from(memo.block_number)
            .map_err(|_| write_err(format!("block number {} exceeds BIGINT", memo.block_number)))?;

        let id: Option<i32> = sqlx::query_scalar(
            "INSERT INTO memos (sender_address, name, message, timestamp, block_number, tx_hash)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (tx_hash) DO NOTHING
             RETURNING id",
        )
        .bind(&memo.sender_address)
        .bind(&memo.name)
        .bind(&memo.message)
        .bind(memo.timestamp)
        .bind(block_number)
        .bind(&memo.tx_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| write_err(e.to_string()))?;

        Ok(match id {
            Some(id) => UpsertOutcome::Inserted { id: i64::from(id) },
            None => UpsertOutcome::Duplicate,
        })
    }

    async fn recent_memos(&self, limit: u32) -> Result<Vec<MemoRow>, IngestError> {
        let rows = sqlx::query(
            "SELECT id, sender_address, name, message, timestamp, block_number, tx_hash
             FROM memos
             ORDER BY id DESC
             LIMIT $1",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| IngestError::Storage(format!("query memos: {e}")))?;

        rows.iter()
            .map(row_to_memo)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| IngestError::Storage(format!("decode memo row: {e}")))
    }

    async fn memo_count(&self) -> Result<u64, IngestError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM memos")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| IngestError::Storage(format!("count memos: {e}")))?;
        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    // Integration tests require a running PostgreSQL instance.
    // Set DATABASE_URL environment variable to enable.
    // Example: DATABASE_URL=postgresql://localhost/memoindex_test cargo test --features postgres -- --ignored

    use super::*;

    fn memo(tx_hash: &str, name: &str, block_number: u64) -> Memo {
        Memo {
            sender_address: "0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045".into(),
            name: name.into(),
            message: "integration".into(),
            timestamp: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            block_number,
            tx_hash: tx_hash.into(),
        }
    }

    async fn store() -> PostgresMemoStore {
        let url = std::env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set for integration tests");
        let store = PostgresMemoStore::connect(&url).await.unwrap();
        store.init_schema().await.unwrap();
        // Idempotent
        store.init_schema().await.unwrap();
        store
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL (set DATABASE_URL to enable)"]
    async fn test_postgres_upsert_is_idempotent() {
        let store = store().await;
        let tx = format!("0x{:064x}", std::process::id());
        sqlx::query("DELETE FROM memos WHERE tx_hash = $1")
            .bind(&tx)
            .execute(store.pool())
            .await
            .unwrap();

        let first = store.upsert_memo(&memo(&tx, "alice", 101)).await.unwrap();
        assert!(first.is_inserted());
        let second = store.upsert_memo(&memo(&tx, "mallory", 999)).await.unwrap();
        assert_eq!(second, UpsertOutcome::Duplicate);

        let name: String = sqlx::query_scalar("SELECT name FROM memos WHERE tx_hash = $1")
            .bind(&tx)
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(name, "alice");

        let recent = store.recent_memos(1).await.unwrap();
        assert_eq!(recent[0].memo.tx_hash, tx);
        assert!(store.memo_count().await.unwrap() >= 1);
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL (set DATABASE_URL to enable)"]
    async fn test_postgres_constraint_violation_is_write_error() {
        let store = store().await;
        let too_long = "x".repeat(300);
        let tx = format!("0x{:064x}", u64::from(std::process::id()) + 1);
        let err = store
            .upsert_memo(&memo(&tx, &too_long, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Write { .. }));
    }

    #[tokio::test]
    async fn unreachable_database_fails_init() {
        let db = DatabaseConfig {
            host: "127.0.0.1".into(),
            port: 1,
            ..Default::default()
        };
        let store = PostgresMemoStore::connect_lazy(
            &db,
            PostgresOptions {
                acquire_timeout_secs: 2,
                ..Default::default()
            },
        );
        let err = store.init_schema().await.unwrap_err();
        assert!(matches!(err, IngestError::StorageInit(_)));
    }
}

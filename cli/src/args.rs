//! Command-line arguments. Every option can also be set from the
//! environment (or a `.env` file).

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use memoindex_core::config::IngestConfig;
use memoindex_evm::IngestBuilder;
use memoindex_storage::{DatabaseConfig, PostgresOptions};

use crate::logging::LogConfig;

#[derive(Debug, Parser)]
#[command(
    name = "memoindex",
    about = "Backfill and live-tail BuyMeACoffee NewMemo events into Postgres",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Deployment descriptor (contract address, ABI, deploymentBlock)
    #[arg(long, env = "DESCRIPTOR_PATH", default_value = "contract-data.json", global = true)]
    pub descriptor: PathBuf,

    #[command(flatten)]
    pub chain: ChainArgs,

    #[command(flatten)]
    pub db: DbArgs,

    /// Log level: trace | debug | info | warn | error
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    pub log_level: String,

    /// Emit JSON structured logs
    #[arg(long, env = "LOG_JSON", global = true)]
    pub log_json: bool,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Backfill history, then ingest live events (default)
    Run,
    /// Print the newest stored memos
    Memos {
        /// Number of memos to show
        #[arg(long, default_value_t = 10)]
        limit: u32,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Load and validate the deployment descriptor
    Descriptor,
}

#[derive(Debug, Args)]
pub struct ChainArgs {
    /// HTTP JSON-RPC endpoint
    #[arg(long, env = "RPC_URL", default_value = "http://127.0.0.1:7545", global = true)]
    pub rpc_url: String,

    /// WebSocket endpoint for live subscriptions; filter polling over HTTP
    /// is used when unset
    #[arg(long, env = "RPC_WS_URL", global = true)]
    pub ws_url: Option<String>,

    /// Start block when the descriptor has no deploymentBlock
    #[arg(long, env = "FROM_BLOCK", default_value_t = 0, global = true)]
    pub from_block: u64,

    /// Split the historical query into ranges of at most this many blocks
    #[arg(long, env = "MAX_BLOCK_RANGE", global = true)]
    pub max_block_range: Option<u64>,

    /// Filter polling interval in milliseconds (HTTP live mode)
    #[arg(long, env = "POLL_INTERVAL_MS", default_value_t = 4000, global = true)]
    pub poll_interval_ms: u64,

    /// Maximum live events handled at once (unbounded when unset)
    #[arg(long, env = "LIVE_CONCURRENCY", global = true)]
    pub live_concurrency: Option<usize>,
}

#[derive(Debug, Args)]
pub struct DbArgs {
    #[arg(long, env = "DB_HOST", default_value = "localhost", global = true)]
    pub db_host: String,

    #[arg(long, env = "DB_PORT", default_value_t = 5432, global = true)]
    pub db_port: u16,

    #[arg(long, env = "DB_USER", default_value = "postgres", global = true)]
    pub db_user: String,

    #[arg(long, env = "DB_PASSWORD", hide_env_values = true, global = true)]
    pub db_password: Option<String>,

    #[arg(long, env = "DB_NAME", default_value = "postgres", global = true)]
    pub db_name: String,

    /// Connection pool ceiling
    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value_t = 10, global = true)]
    pub db_max_connections: u32,
}

impl Cli {
    pub fn ingest_config(&self) -> IngestConfig {
        let mut builder = IngestBuilder::new()
            .from_block(self.chain.from_block)
            .poll_interval_ms(self.chain.poll_interval_ms);
        if let Some(range) = self.chain.max_block_range {
            builder = builder.max_block_range(range);
        }
        if let Some(limit) = self.chain.live_concurrency {
            builder = builder.live_concurrency(limit);
        }
        builder.build_config()
    }

    pub fn log_config(&self) -> LogConfig {
        LogConfig {
            level: self.log_level.clone(),
            json: self.log_json,
            ..Default::default()
        }
    }
}

impl DbArgs {
    pub fn database_config(&self) -> DatabaseConfig {
        DatabaseConfig {
            host: self.db_host.clone(),
            port: self.db_port,
            user: self.db_user.clone(),
            password: self.db_password.clone(),
            database: self.db_name.clone(),
        }
    }

    pub fn postgres_options(&self) -> PostgresOptions {
        PostgresOptions {
            max_connections: self.db_max_connections,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_local_ganache_and_postgres() {
        let cli = Cli::try_parse_from(["memoindex"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.descriptor, PathBuf::from("contract-data.json"));
        assert_eq!(cli.chain.rpc_url, "http://127.0.0.1:7545");
        assert_eq!(cli.db.postgres_options().max_connections, 10);

        let config = cli.ingest_config();
        assert_eq!(config.event_name, "NewMemo");
        assert_eq!(config.default_from_block, 0);
        assert_eq!(config.max_block_range, None);
    }

    #[test]
    fn flags_flow_into_configs() {
        let cli = Cli::try_parse_from([
            "memoindex",
            "memos",
            "--limit",
            "3",
            "--from-block",
            "100",
            "--max-block-range",
            "2000",
            "--db-host",
            "db.internal",
            "--db-password",
            "secret",
        ])
        .unwrap();
        assert!(matches!(cli.command, Some(Command::Memos { limit: 3, json: false })));

        let config = cli.ingest_config();
        assert_eq!(config.default_from_block, 100);
        assert_eq!(config.max_block_range, Some(2000));

        let db = cli.db.database_config();
        assert_eq!(db.host, "db.internal");
        assert_eq!(db.password.as_deref(), Some("secret"));
    }
}

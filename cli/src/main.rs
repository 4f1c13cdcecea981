//! memoindex: BuyMeACoffee `NewMemo` ingestion service.
//!
//! Usage:
//! ```bash
//! memoindex                       # same as `memoindex run`
//! memoindex run --rpc-url http://127.0.0.1:7545 --descriptor contract-data.json
//! memoindex memos --limit 20
//! memoindex descriptor
//! ```
//!
//! Configuration comes from flags, the environment, or a `.env` file.

mod args;
mod logging;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use memoindex_core::descriptor::DescriptorLoader;
use memoindex_core::store::MemoStore;
use memoindex_evm::{EvmChainClient, EvmClientOptions};
use memoindex_storage::PostgresMemoStore;

use crate::args::{Cli, Command};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    logging::init_tracing(&cli.log_config());

    match dispatch(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "memoindex exiting");
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: &Cli) -> Result<()> {
    match cli.command.clone().unwrap_or(Command::Run) {
        Command::Run => cmd_run(cli).await,
        Command::Memos { limit, json } => cmd_memos(cli, limit, json).await,
        Command::Descriptor => cmd_descriptor(cli),
    }
}

fn postgres_store(cli: &Cli) -> PostgresMemoStore {
    PostgresMemoStore::connect_lazy(&cli.db.database_config(), cli.db.postgres_options())
}

async fn cmd_run(cli: &Cli) -> Result<()> {
    let config = cli.ingest_config();
    let options = EvmClientOptions::from_config(&config);
    let store = Arc::new(postgres_store(cli));
    let loader = DescriptorLoader::new(&cli.descriptor);
    let rpc_url = cli.chain.rpc_url.as_str();
    let ws_url = cli.chain.ws_url.clone();

    let ingestor = memoindex_evm::start(config, store, &loader, || {
        EvmChainClient::connect(rpc_url, ws_url, options)
    })
    .await
    .context("startup failed")?;

    tokio::select! {
        result = ingestor.run() => result.context("ingestion stopped"),
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl-C")?;
            info!("Received Ctrl-C, shutting down");
            Ok(())
        }
    }
}

async fn cmd_memos(cli: &Cli, limit: u32, json: bool) -> Result<()> {
    let store = postgres_store(cli);
    let rows = store.recent_memos(limit).await.context("failed to read memos")?;
    let total = store.memo_count().await.context("failed to count memos")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    for row in &rows {
        let memo = &row.memo;
        println!(
            "#{:<5} block {:<10} {}  {}  {}: {}",
            row.id,
            memo.block_number,
            memo.timestamp.to_rfc3339(),
            memo.sender_address,
            memo.name,
            memo.message
        );
        println!("       tx {}", memo.tx_hash);
    }
    println!("{} of {} memos shown", rows.len(), total);
    Ok(())
}

fn cmd_descriptor(cli: &Cli) -> Result<()> {
    let config = cli.ingest_config();
    let loader = DescriptorLoader::new(&cli.descriptor);
    let descriptor = loader
        .load()
        .with_context(|| format!("invalid descriptor {}", loader.path().display()))?;
    let event = descriptor.event(&config.event_name)?;

    println!("Descriptor   {}", loader.path().display());
    println!("  Address      {}", descriptor.address);
    println!("  Start block  {}", descriptor.start_block(config.default_from_block));
    println!("  Event        {}", event.signature());
    println!("  Topic0       {}", event.selector());
    Ok(())
}

//! The ingestion loop: backfill, then live.
//!
//! # Phase 1: BACKFILL
//! Query every `NewMemo` log from the descriptor's start block to the head
//! observed at startup, and ingest them one at a time in chain order.
//!
//! # Phase 2: LIVE
//! Subscribe from `head + 1`, then re-read the head and ingest the blocks
//! mined while the backfill ran, since a subscription only reports logs
//! produced after it is installed. Then ingest each delivered event.
//! Handlers may overlap; the store's uniqueness on `tx_hash` keeps writes
//! exactly-once.
//! A failing event is logged and dropped. The loop only returns when the
//! subscription stream ends, which is fatal.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::{FutureExt, StreamExt};
use tracing::{debug, error, info, warn};

use memoindex_core::config::{IngestConfig, IngestState};
use memoindex_core::descriptor::{Descriptor, DescriptorLoader};
use memoindex_core::error::IngestError;
use memoindex_core::normalizer::normalize;
use memoindex_core::store::{MemoStore, UpsertOutcome};
use memoindex_core::types::RawEvent;

use crate::client::{ChainClient, DecodedLog, LogFilter};

/// What happened to a single event.
#[derive(Debug)]
pub enum EventOutcome {
    /// Stored as a new row.
    Inserted { id: i64 },
    /// Already stored by an earlier delivery.
    Duplicate,
    /// Dropped; the error has been logged.
    Failed(IngestError),
}

/// Summary of a completed backfill.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillReport {
    /// First block scanned.
    pub from: u64,
    /// Head block observed at startup (last block scanned).
    pub head: u64,
    /// Events returned by the node.
    pub scanned: usize,
    pub inserted: usize,
    pub duplicates: usize,
    pub failed: usize,
}

/// Runs the two ingestion phases against one chain client and one store.
pub struct Ingestor<C: ChainClient, S: MemoStore + ?Sized> {
    config: IngestConfig,
    descriptor: Descriptor,
    filter: LogFilter,
    client: C,
    store: Arc<S>,
    state: IngestState,
    backfill_head: Option<u64>,
}

/// Prepare an [`Ingestor`] in startup order.
///
/// The schema is created before the descriptor is read, and the chain
/// connection is only attempted once both have succeeded. Any failure is
/// returned before the next step runs.
pub async fn start<C, S, F, Fut>(
    config: IngestConfig,
    store: Arc<S>,
    loader: &DescriptorLoader,
    connect: F,
) -> Result<Ingestor<C, S>, IngestError>
where
    C: ChainClient,
    S: MemoStore + ?Sized,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<C, IngestError>>,
{
    store.init_schema().await?;
    info!("Database schema ready");

    let descriptor = loader.load()?;
    info!(
        path = %loader.path().display(),
        address = %descriptor.address,
        deployment_block = ?descriptor.deployment_block,
        "Loaded contract descriptor"
    );

    let client = connect().await?;
    Ingestor::new(config, descriptor, client, store)
}

impl<C: ChainClient, S: MemoStore + ?Sized> Ingestor<C, S> {
    /// Fails with [`IngestError::Config`] if the descriptor's ABI has no
    /// event named `config.event_name`.
    pub fn new(config: IngestConfig, descriptor: Descriptor, client: C, store: Arc<S>) -> Result<Self, IngestError> {
        let filter = LogFilter::from_descriptor(&descriptor, &config.event_name)?;
        Ok(Self {
            config,
            descriptor,
            filter,
            client,
            store,
            state: IngestState::Idle,
            backfill_head: None,
        })
    }

    pub fn state(&self) -> IngestState {
        self.state
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    /// Head block observed by the backfill, once it has run.
    pub fn backfill_head(&self) -> Option<u64> {
        self.backfill_head
    }

    /// Run both phases. Only returns on a fatal error.
    pub async fn run(mut self) -> Result<(), IngestError> {
        self.backfill().await?;
        self.live().await
    }

    /// Ingest every historical event from the start block to the current
    /// head, inclusive, sequentially in the order the node returned them.
    ///
    /// Per-event failures are counted in the report. A failed range query
    /// or head lookup is returned as [`IngestError::Rpc`].
    pub async fn backfill(&mut self) -> Result<BackfillReport, IngestError> {
        if self.state != IngestState::Idle {
            return Err(IngestError::Config(format!("backfill cannot start while {}", self.state)));
        }
        self.state = IngestState::Backfilling;

        let from = self.descriptor.start_block(self.config.default_from_block);
        let head = self.client.head_block_number().await?;
        info!(from, head, event = %self.config.event_name, "Starting backfill phase");

        let mut report = BackfillReport {
            from,
            head,
            ..Default::default()
        };

        if from <= head {
            self.ingest_range(&mut report).await?;
        } else {
            warn!(from, head, "Start block is past the chain head, nothing to backfill");
        }

        self.backfill_head = Some(head);
        info!(
            head,
            scanned = report.scanned,
            inserted = report.inserted,
            duplicates = report.duplicates,
            failed = report.failed,
            "Backfill complete"
        );
        Ok(report)
    }

    /// Query `[report.from, report.head]` and ingest each event in order.
    async fn ingest_range(&self, report: &mut BackfillReport) -> Result<(), IngestError> {
        let events = self.client.query_historical(&self.filter, report.from, report.head).await?;
        report.scanned += events.len();
        for item in events {
            match item {
                Ok(raw) => match ingest_one(self.store.as_ref(), &raw).await {
                    EventOutcome::Inserted { .. } => report.inserted += 1,
                    EventOutcome::Duplicate => report.duplicates += 1,
                    EventOutcome::Failed(_) => report.failed += 1,
                },
                Err(e) => {
                    error!(phase = "backfill", error = %e, "Error storing memo");
                    report.failed += 1;
                }
            }
        }
        Ok(())
    }

    /// Ingest the blocks after `head` that were mined before the
    /// subscription was installed.
    async fn catch_up(&self, head: u64) -> Result<BackfillReport, IngestError> {
        let new_head = self.client.head_block_number().await?;
        let mut report = BackfillReport {
            from: head + 1,
            head: new_head,
            ..Default::default()
        };
        if new_head <= head {
            return Ok(report);
        }

        info!(from = report.from, to = new_head, "Catching up blocks mined during backfill");
        self.ingest_range(&mut report).await?;
        info!(
            head = new_head,
            scanned = report.scanned,
            inserted = report.inserted,
            duplicates = report.duplicates,
            failed = report.failed,
            "Catch-up complete"
        );
        Ok(report)
    }

    /// Consume the live subscription, starting right after the backfill
    /// head.
    ///
    /// Once the subscription is installed, events in blocks mined since the
    /// backfill head are queried and ingested before the stream is drained.
    /// Deliveries in both are deduplicated by the store. A failed catch-up
    /// query is returned as [`IngestError::Rpc`].
    ///
    /// Never returns `Ok`: the end of the stream is reported as
    /// [`IngestError::SubscriptionClosed`].
    pub async fn live(mut self) -> Result<(), IngestError> {
        let Some(head) = self.backfill_head else {
            return Err(IngestError::Config("live ingestion requires a completed backfill".into()));
        };
        self.state = IngestState::Live;

        let from_block = head + 1;
        let stream = self.client.subscribe(&self.filter, from_block).await?;
        info!(from_block, event = %self.config.event_name, "Live subscription started");

        self.catch_up(head).await?;

        let store = Arc::clone(&self.store);
        stream
            .for_each_concurrent(self.config.live_concurrency, |item| {
                let store = Arc::clone(&store);
                async move {
                    let handled = AssertUnwindSafe(handle_live(store.as_ref(), item))
                        .catch_unwind()
                        .await;
                    if let Err(panic) = handled {
                        let err = IngestError::SubscriptionHandler(panic_message(panic.as_ref()));
                        error!(phase = "live", error = %err, "Live event handler panicked");
                    }
                }
            })
            .await;

        let err = IngestError::SubscriptionClosed(format!("{} event stream ended", self.config.event_name));
        error!(error = %err, "Live subscription ended");
        Err(err)
    }
}

async fn handle_live<S: MemoStore + ?Sized>(store: &S, item: DecodedLog) {
    match item {
        Ok(raw) => {
            ingest_one(store, &raw).await;
        }
        Err(e) => {
            let err = IngestError::SubscriptionHandler(e.to_string());
            error!(phase = "live", error = %err, "Error storing memo");
        }
    }
}

/// Normalize one raw event and persist it. Never fails: errors are logged
/// and returned as [`EventOutcome::Failed`].
pub async fn ingest_one<S: MemoStore + ?Sized>(store: &S, raw: &RawEvent) -> EventOutcome {
    let phase = raw.phase();
    let memo = match normalize(raw) {
        Ok(memo) => memo,
        Err(e) => {
            error!(%phase, tx = %raw.transaction_hash(), error = %e, "Error storing memo");
            return EventOutcome::Failed(e);
        }
    };

    match store.upsert_memo(&memo).await {
        Ok(UpsertOutcome::Inserted { id }) => {
            info!(
                %phase,
                id,
                tx = %memo.tx_hash,
                block = memo.block_number,
                sender = %memo.sender_address,
                name = %memo.name,
                "New memo stored"
            );
            EventOutcome::Inserted { id }
        }
        Ok(UpsertOutcome::Duplicate) => {
            debug!(%phase, tx = %memo.tx_hash, "Memo already stored");
            EventOutcome::Duplicate
        }
        Err(e) => {
            error!(%phase, tx = %memo.tx_hash, error = %e, "Error storing memo");
            EventOutcome::Failed(e)
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

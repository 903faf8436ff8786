//! The public store handle.
//!
//! [`BlockchainStore`] is a cloneable handle onto a single worker thread that
//! owns the tables, the orphan pool and the reorganization subscribers. Every
//! operation is queued at call time and runs in submission order; the
//! returned [`Completion`] resolves when the worker has finished it.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::thread;

use tokio::sync::{mpsc, oneshot};

use chainkeep_core::address::{PaymentAddress, PaymentType};
use chainkeep_core::error::StoreError;
use chainkeep_core::types::{Block, BlockHeader, Hash256, InputPoint, OutPoint, Transaction};

use crate::config::StoreConfig;
use crate::index::{BlockLocator, ChainIndex};
use crate::orphans::OrphanPool;
use crate::organizer::organize;
use crate::publisher::{ReorgPublisher, ReorgSubscription};
use crate::records::TxPosition;

type Job = Box<dyn FnOnce(&mut ChainContext) + Send>;

enum Command {
    Run(Job),
    Stop(oneshot::Sender<Result<(), StoreError>>),
}

/// How a stored block was received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreStatus {
    /// Already confirmed, or already pending.
    Duplicate,
    /// Parent not on the chain; held pending.
    Orphan,
    /// On the chain.
    Accepted,
}

/// Result of [`BlockchainStore::store`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreOutcome {
    pub status: StoreStatus,
    /// Confirmed depth, when the block is on the chain.
    pub depth: Option<u64>,
}

impl StoreOutcome {
    pub fn accepted(depth: u64) -> Self {
        Self {
            status: StoreStatus::Accepted,
            depth: Some(depth),
        }
    }

    pub fn orphan() -> Self {
        Self {
            status: StoreStatus::Orphan,
            depth: None,
        }
    }

    pub fn duplicate(depth: Option<u64>) -> Self {
        Self {
            status: StoreStatus::Duplicate,
            depth,
        }
    }
}

/// Counts confirmed blocks between forced flushes.
#[derive(Debug)]
struct Checkpoint {
    interval: u64,
    since_flush: u64,
    /// Flushes taken since open.
    flushes: u64,
}

impl Checkpoint {
    fn new(interval: u64) -> Self {
        Self {
            interval,
            since_flush: 0,
            flushes: 0,
        }
    }

    /// Record `blocks` confirmations; true when a flush is due.
    fn record(&mut self, blocks: u64) -> bool {
        if self.interval == 0 {
            return false;
        }
        self.since_flush += blocks;
        if self.since_flush >= self.interval {
            self.since_flush = 0;
            true
        } else {
            false
        }
    }
}

/// State owned by the worker thread.
struct ChainContext {
    index: ChainIndex,
    orphans: OrphanPool,
    publisher: ReorgPublisher,
    checkpoint: Checkpoint,
}

impl ChainContext {
    fn new(index: ChainIndex, config: &StoreConfig) -> Self {
        Self {
            index,
            orphans: OrphanPool::new(config.orphan_capacity),
            publisher: ReorgPublisher::new(),
            checkpoint: Checkpoint::new(config.checkpoint_interval),
        }
    }

    fn store(&mut self, block: Block) -> Result<StoreOutcome, StoreError> {
        let hash = block.hash();
        if let Some(depth) = self.index.block_depth(&hash)? {
            tracing::debug!(depth, %hash, "block already confirmed");
            return Ok(StoreOutcome::duplicate(Some(depth)));
        }
        if !self.orphans.add(block) {
            tracing::debug!(%hash, "block already pending");
            return Ok(StoreOutcome::duplicate(None));
        }

        if let Some(event) = organize(&mut self.index, &mut self.orphans, &hash)? {
            let notified = self.publisher.publish(&event);
            tracing::debug!(fork_depth = event.fork_depth, notified, "published chain change");
            self.confirmed(event.added.len() as u64)?;
        }

        match self.index.block_depth(&hash)? {
            Some(depth) => Ok(StoreOutcome::accepted(depth)),
            None => {
                tracing::debug!(%hash, pending = self.orphans.len(), "holding orphan");
                Ok(StoreOutcome::orphan())
            }
        }
    }

    fn import(&mut self, block: Block, depth: u64) -> Result<(), StoreError> {
        self.index.import(depth, &block)?;
        if self.orphans.remove(&block.hash()).is_some() {
            tracing::debug!(depth, hash = %block.hash(), "imported block was pending");
        }
        self.confirmed(1)
    }

    fn confirmed(&mut self, blocks: u64) -> Result<(), StoreError> {
        if self.checkpoint.record(blocks) {
            self.index.flush()?;
            self.checkpoint.flushes += 1;
            tracing::info!(
                interval = self.checkpoint.interval,
                flushes = self.checkpoint.flushes,
                "checkpoint flushed tables"
            );
        }
        Ok(())
    }

    fn shutdown(&mut self) {
        let notified = self.publisher.relay_stopped();
        if let Err(e) = self.index.flush() {
            tracing::warn!("flush on shutdown failed: {e}");
        }
        tracing::info!(notified, "store stopped");
    }
}

fn run_worker(mut context: ChainContext, mut queue: mpsc::UnboundedReceiver<Command>) {
    tracing::debug!("store worker started");
    while let Some(command) = queue.blocking_recv() {
        match command {
            Command::Run(job) => job(&mut context),
            Command::Stop(done) => {
                queue.close();
                context.shutdown();
                // Tables and the directory lock go before the caller hears back.
                drop(context);
                let _ = done.send(Ok(()));
                return;
            }
        }
    }
    tracing::debug!("all store handles dropped");
    context.shutdown();
}

/// Completion of a queued operation.
///
/// The operation was queued when this value was created and runs whether or
/// not it is awaited.
#[must_use = "the result is only observed by awaiting"]
pub struct Completion<T> {
    state: CompletionState<T>,
}

enum CompletionState<T> {
    Queued(oneshot::Receiver<Result<T, StoreError>>),
    Ready(Option<Result<T, StoreError>>),
}

impl<T> Completion<T> {
    fn queued(rx: oneshot::Receiver<Result<T, StoreError>>) -> Self {
        Self {
            state: CompletionState::Queued(rx),
        }
    }

    fn ready(result: Result<T, StoreError>) -> Self {
        Self {
            state: CompletionState::Ready(Some(result)),
        }
    }
}

// No field is structurally pinned.
impl<T> Unpin for Completion<T> {}

impl<T> Future for Completion<T> {
    type Output = Result<T, StoreError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.state {
            CompletionState::Queued(rx) => Pin::new(rx)
                .poll(cx)
                .map(|r| r.unwrap_or(Err(StoreError::ServiceStopped))),
            CompletionState::Ready(result) => {
                Poll::Ready(result.take().unwrap_or(Err(StoreError::ServiceStopped)))
            }
        }
    }
}

/// Handle to an open store. Cheap to clone; the store shuts down on
/// [`stop`](Self::stop) or when the last handle is dropped.
#[derive(Clone)]
pub struct BlockchainStore {
    queue: mpsc::UnboundedSender<Command>,
}

impl BlockchainStore {
    /// Lock the data directory, open the tables and start the worker.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Io`] if the directory is locked or cannot be opened
    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        let index = ChainIndex::open(config)?;
        let context = ChainContext::new(index, config);
        let (queue, rx) = mpsc::unbounded_channel();
        thread::Builder::new()
            .name("chainkeep-store".into())
            .spawn(move || run_worker(context, rx))
            .map_err(|e| StoreError::Io(e.to_string()))?;
        Ok(Self { queue })
    }

    fn submit<T, F>(&self, op: F) -> Completion<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut ChainContext) -> Result<T, StoreError> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::new(move |context: &mut ChainContext| {
            let _ = tx.send(op(context));
        });
        match self.queue.send(Command::Run(job)) {
            Ok(()) => Completion::queued(rx),
            Err(_) => Completion::ready(Err(StoreError::ServiceStopped)),
        }
    }

    /// Store a block, attaching it and any pending descendants to the chain
    /// when its parent is known.
    pub fn store(&self, block: Block) -> Completion<StoreOutcome> {
        self.submit(move |context| context.store(block))
    }

    /// Write a trusted block straight to `depth`, skipping organization.
    pub fn import(&self, block: Block, depth: u64) -> Completion<()> {
        self.submit(move |context| context.import(block, depth))
    }

    pub fn fetch_block_header(&self, at: impl Into<BlockLocator>) -> Completion<BlockHeader> {
        let at = at.into();
        self.submit(move |context| Ok(context.index.block_record(at)?.header))
    }

    pub fn fetch_block_transaction_hashes(
        &self,
        at: impl Into<BlockLocator>,
    ) -> Completion<Vec<Hash256>> {
        let at = at.into();
        self.submit(move |context| Ok(context.index.block_record(at)?.tx_hashes))
    }

    pub fn fetch_block(&self, at: impl Into<BlockLocator>) -> Completion<Block> {
        let at = at.into();
        self.submit(move |context| context.index.block(at))
    }

    pub fn fetch_block_depth(&self, hash: Hash256) -> Completion<u64> {
        self.submit(move |context| context.index.block_depth(&hash)?.ok_or(StoreError::NotFound))
    }

    /// Depth of the tip; `NotFound` while the chain is empty.
    pub fn fetch_last_depth(&self) -> Completion<u64> {
        self.submit(|context| context.index.last_depth()?.ok_or(StoreError::NotFound))
    }

    pub fn fetch_transaction(&self, hash: Hash256) -> Completion<Transaction> {
        self.submit(move |context| Ok(context.index.transaction(&hash)?.tx))
    }

    /// Depth of the containing block and position within it.
    pub fn fetch_transaction_index(&self, hash: Hash256) -> Completion<TxPosition> {
        self.submit(move |context| Ok(context.index.transaction(&hash)?.position))
    }

    /// The input that spent `outpoint`, or `UnspentOutput`.
    pub fn fetch_spend(&self, outpoint: OutPoint) -> Completion<InputPoint> {
        self.submit(move |context| context.index.spend(&outpoint))
    }

    /// Outpoints paid to a pay-to-pubkey-hash address. Other address kinds
    /// fail with `UnsupportedPaymentType` without being queued.
    pub fn fetch_outputs(&self, address: PaymentAddress) -> Completion<Vec<OutPoint>> {
        if address.payment_type() != PaymentType::PubkeyHash {
            return Completion::ready(Err(StoreError::UnsupportedPaymentType));
        }
        self.submit(move |context| context.index.outputs(&address))
    }

    /// Listen for the next chain change.
    pub fn subscribe_reorganize(&self) -> ReorgSubscription {
        let (tx, subscription) = ReorgPublisher::pending();
        let job: Job = Box::new(move |context: &mut ChainContext| context.publisher.register(tx));
        // A closed queue drops the sender, which the subscription reads as stopped.
        let _ = self.queue.send(Command::Run(job));
        subscription
    }

    /// Notify subscribers, flush and close the tables, and release the
    /// directory lock. Later calls on any handle fail with `ServiceStopped`.
    pub fn stop(&self) -> Completion<()> {
        let (tx, rx) = oneshot::channel();
        match self.queue.send(Command::Stop(tx)) {
            Ok(()) => Completion::queued(rx),
            Err(_) => Completion::ready(Err(StoreError::ServiceStopped)),
        }
    }
}

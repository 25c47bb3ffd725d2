//! Background ledger writer
//!
//! Ledger mutations hand full-ledger snapshots to a [`WriterHandle`]; a
//! single background task owns the durable file and flushes on a fixed
//! tick. Three triggers drive the task:
//!
//! - **Receive**: the mailbox was written to. The highest-generation
//!   snapshot becomes the pending batch if it is newer than anything seen.
//! - **Tick**: a pending batch is saved, retried a bounded number of times,
//!   then dropped. The ledger stays authoritative, so the next mutation
//!   produces a fresher snapshot to try again.
//! - **Shutdown**: the mailbox is drained and a final flush runs before the
//!   task exits. [`AsyncWriter::close`] awaits this.
//!
//! The mailbox is bounded and never blocks producers: when it is full the
//! snapshot with the lowest generation is discarded. Snapshots are taken
//! under the ledger lock but submitted after it is released, so they can
//! arrive out of order; the writer never moves backwards in generation.

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::codec::LedgerStore;
use super::ledger::LedgerSnapshot;
use sdk::errors::MemoryError;

/// Background writer settings
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Interval between flushes of the pending batch
    pub flush_interval: Duration,

    /// Save attempts per batch
    pub max_attempts: u32,

    /// Delay between save attempts
    pub retry_delay: Duration,

    /// Snapshots held in the mailbox between wake-ups
    pub queue_capacity: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_secs(1),
            max_attempts: 3,
            retry_delay: Duration::from_millis(100),
            queue_capacity: 1,
        }
    }
}

/// What happened to a submitted snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The mailbox had room
    Queued,
    /// The mailbox was full; the oldest-generation snapshot was discarded
    Replaced,
    /// The mailbox was full of newer snapshots; this one was discarded
    Stale,
}

/// Items ordered by the mutation that produced them
pub trait Generational {
    fn generation(&self) -> u64;
}

impl Generational for LedgerSnapshot {
    fn generation(&self) -> u64 {
        self.generation
    }
}

/// Bounded, non-blocking queue with wake-up notification.
///
/// Items may arrive out of generation order; whatever is evicted or taken,
/// the newest generation always survives.
#[derive(Debug)]
pub struct Mailbox<T> {
    queue: Mutex<VecDeque<T>>,
    capacity: usize,
    notify: Notify,
}

impl<T: Generational> Mailbox<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            notify: Notify::new(),
        }
    }

    /// Enqueue without blocking. When full, the lowest generation among the
    /// queued items and `item` is discarded.
    pub fn push(&self, item: T) -> SubmitOutcome {
        let outcome = {
            let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
            if queue.len() < self.capacity {
                queue.push_back(item);
                SubmitOutcome::Queued
            } else {
                let oldest = queue
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, queued)| queued.generation())
                    .map(|(i, queued)| (i, queued.generation()));

                match oldest {
                    Some((i, generation)) if generation <= item.generation() => {
                        queue.remove(i);
                        queue.push_back(item);
                        SubmitOutcome::Replaced
                    }
                    _ => SubmitOutcome::Stale,
                }
            }
        };
        self.notify.notify_one();
        outcome
    }

    /// Take the highest-generation item and discard everything else.
    ///
    /// Returns the item and how many other items were discarded.
    pub fn take_latest(&self) -> Option<(T, usize)> {
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        // Last wins among equal generations
        let newest = queue
            .iter()
            .enumerate()
            .max_by_key(|(i, queued)| (queued.generation(), *i))
            .map(|(i, _)| i)?;
        let latest = queue.remove(newest)?;
        let discarded = queue.len();
        queue.clear();
        Some((latest, discarded))
    }

    pub fn len(&self) -> usize {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    async fn notified(&self) {
        self.notify.notified().await
    }
}

#[derive(Debug, Default)]
struct WriterCounters {
    snapshots_received: AtomicU64,
    snapshots_replaced: AtomicU64,
    flushes_ok: AtomicU64,
    flushes_failed: AtomicU64,
    batches_dropped: AtomicU64,
}

impl WriterCounters {
    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    fn stats(&self) -> WriterStats {
        WriterStats {
            snapshots_received: self.snapshots_received.load(Ordering::Relaxed),
            snapshots_replaced: self.snapshots_replaced.load(Ordering::Relaxed),
            flushes_ok: self.flushes_ok.load(Ordering::Relaxed),
            flushes_failed: self.flushes_failed.load(Ordering::Relaxed),
            batches_dropped: self.batches_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time writer counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriterStats {
    /// Snapshots submitted by the ledger
    pub snapshots_received: u64,
    /// Snapshots superseded before they were flushed
    pub snapshots_replaced: u64,
    /// Successful saves
    pub flushes_ok: u64,
    /// Failed save attempts, retries included
    pub flushes_failed: u64,
    /// Batches given up on after exhausting retries
    pub batches_dropped: u64,
}

/// Producer side of the writer, cheap to clone
#[derive(Debug, Clone)]
pub struct WriterHandle {
    mailbox: Arc<Mailbox<LedgerSnapshot>>,
    counters: Arc<WriterCounters>,
}

impl WriterHandle {
    /// Hand a snapshot to the writer. Never blocks.
    pub fn submit(&self, snapshot: LedgerSnapshot) -> SubmitOutcome {
        WriterCounters::bump(&self.counters.snapshots_received, 1);
        let outcome = self.mailbox.push(snapshot);
        if outcome != SubmitOutcome::Queued {
            WriterCounters::bump(&self.counters.snapshots_replaced, 1);
            debug!(?outcome, "Writer mailbox full, dropped oldest snapshot");
        }
        outcome
    }

    /// Snapshots waiting in the mailbox
    pub fn queued(&self) -> usize {
        self.mailbox.len()
    }
}

/// Owner of the background flush task
pub struct AsyncWriter {
    handle: WriterHandle,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl AsyncWriter {
    /// Spawn the flush task on the current tokio runtime
    pub fn spawn(store: Arc<dyn LedgerStore>, config: WriterConfig) -> Self {
        let mailbox = Arc::new(Mailbox::new(config.queue_capacity));
        let counters = Arc::new(WriterCounters::default());
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(run(
            store,
            Arc::clone(&mailbox),
            Arc::clone(&counters),
            config,
            shutdown_rx,
        ));

        Self {
            handle: WriterHandle { mailbox, counters },
            shutdown: Some(shutdown_tx),
            task,
        }
    }

    /// A producer handle for the ledger
    pub fn handle(&self) -> WriterHandle {
        self.handle.clone()
    }

    pub fn stats(&self) -> WriterStats {
        self.handle.counters.stats()
    }

    /// Signal shutdown and wait for the final flush
    pub async fn close(mut self) -> Result<WriterStats, MemoryError> {
        if let Some(shutdown) = self.shutdown.take() {
            // The task may already be gone; joining below reports that.
            let _ = shutdown.send(());
        }

        (&mut self.task)
            .await
            .map_err(|e| MemoryError::Task(e.to_string()))?;

        Ok(self.handle.counters.stats())
    }
}

async fn run(
    store: Arc<dyn LedgerStore>,
    mailbox: Arc<Mailbox<LedgerSnapshot>>,
    counters: Arc<WriterCounters>,
    config: WriterConfig,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut ticker = interval(config.flush_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut pending: Option<LedgerSnapshot> = None;
    let mut newest_seen: Option<u64> = None;

    info!(
        interval_ms = config.flush_interval.as_millis() as u64,
        "Ledger writer started"
    );

    loop {
        tokio::select! {
            biased;

            // A dropped AsyncWriter also lands here
            _ = &mut shutdown => {
                absorb_latest(&mailbox, &counters, &mut pending, &mut newest_seen);
                if let Some(snapshot) = pending.take() {
                    flush_with_retry(store.as_ref(), &snapshot, &config, &counters).await;
                }
                info!("Ledger writer stopped");
                return;
            }

            _ = mailbox.notified() => {
                absorb_latest(&mailbox, &counters, &mut pending, &mut newest_seen);
            }

            _ = ticker.tick() => {
                if let Some(snapshot) = pending.take() {
                    flush_with_retry(store.as_ref(), &snapshot, &config, &counters).await;
                }
            }
        }
    }
}

/// Move the newest mailbox snapshot into the pending slot, unless a newer
/// generation has already been pending or flushed.
fn absorb_latest(
    mailbox: &Mailbox<LedgerSnapshot>,
    counters: &WriterCounters,
    pending: &mut Option<LedgerSnapshot>,
    newest_seen: &mut Option<u64>,
) {
    let Some((latest, discarded)) = mailbox.take_latest() else {
        return;
    };

    let is_newer = newest_seen.map_or(true, |seen| latest.generation >= seen);
    let superseded = if is_newer {
        let replaced = u64::from(pending.is_some());
        *newest_seen = Some(latest.generation);
        *pending = Some(latest);
        discarded as u64 + replaced
    } else {
        debug!(
            generation = latest.generation,
            newest = ?newest_seen,
            "Ignoring out-of-order snapshot"
        );
        discarded as u64 + 1
    };

    if superseded > 0 {
        WriterCounters::bump(&counters.snapshots_replaced, superseded);
    }
}

/// Save one batch, retrying up to `max_attempts` times. Returns whether it
/// was persisted; a batch that keeps failing is logged and dropped.
async fn flush_with_retry(
    store: &dyn LedgerStore,
    snapshot: &LedgerSnapshot,
    config: &WriterConfig,
    counters: &WriterCounters,
) -> bool {
    for attempt in 1..=config.max_attempts {
        match store.save(snapshot).await {
            Ok(()) => {
                WriterCounters::bump(&counters.flushes_ok, 1);
                debug!(users = snapshot.len(), attempt, "Ledger flushed");
                return true;
            }
            Err(e) => {
                WriterCounters::bump(&counters.flushes_failed, 1);
                warn!(attempt, max_attempts = config.max_attempts, error = %e, "Ledger flush failed");
                if attempt < config.max_attempts {
                    sleep(config.retry_delay).await;
                }
            }
        }
    }

    WriterCounters::bump(&counters.batches_dropped, 1);
    error!(
        users = snapshot.len(),
        "Dropping ledger batch after {} failed attempts", config.max_attempts
    );
    false
}

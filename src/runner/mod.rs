pub mod progress;

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::{mpsc, Semaphore};
use tracing::{error, info, warn};

use crate::aggregator::AddressAggregator;
use crate::config::{Config, PROGRESS_INTERVAL_SECS};
use crate::stats::GlobalStats;
use crate::types::{AddressInput, AddressRecord, ProviderKind};

pub use progress::RunProgress;

/// Input position paired with the address, so results can be put back in input order.
pub type IndexedInput = (usize, AddressInput);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardState {
    /// Spawned, waiting for a worker permit.
    Pending,
    Running,
    Completed,
    /// The worker task died; its addresses were replaced by empty records.
    Failed,
}

/// Round-robin split: input `i` goes to shard `i % shard_count`.
pub fn shard_addresses(inputs: Vec<AddressInput>, shard_count: usize) -> Vec<Vec<IndexedInput>> {
    let n = shard_count.max(1);
    let mut shards: Vec<Vec<IndexedInput>> = (0..n).map(|_| Vec::new()).collect();
    for (i, input) in inputs.into_iter().enumerate() {
        shards[i % n].push((i, input));
    }
    shards
}

#[derive(Debug)]
pub struct RunOutcome {
    /// One record per input address, in input order.
    pub records: Vec<AddressRecord>,
    /// Per-shard partial totals merged together.
    pub global: GlobalStats,
    pub shards: Vec<ShardState>,
    pub provider_failures: u64,
    pub address_failures: u64,
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Fans the address list out over shard workers, bounded by a semaphore.
pub struct ConcurrentRunner {
    shard_count: usize,
    max_workers: usize,
    stagger: Duration,
    progress_interval: Duration,
}

impl ConcurrentRunner {
    pub fn new(shard_count: usize, max_workers: usize, stagger: Duration) -> Self {
        Self {
            shard_count: shard_count.max(1),
            max_workers: max_workers.max(1),
            stagger,
            progress_interval: Duration::from_secs(PROGRESS_INTERVAL_SECS),
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.shard_count, cfg.max_workers, cfg.worker_stagger)
    }

    /// Aggregate every input. Always returns exactly one record per input.
    /// `progress` is shared with the caller, which may watch it while the run goes.
    pub async fn run(
        &self,
        inputs: Vec<AddressInput>,
        aggregator: Arc<dyn AddressAggregator>,
        backup_tx: Option<mpsc::Sender<AddressRecord>>,
        progress: Arc<RunProgress>,
    ) -> RunOutcome {
        let total = inputs.len();
        let kinds = aggregator.provider_kinds();
        let shards: Vec<Vec<IndexedInput>> = shard_addresses(inputs, self.shard_count)
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect();
        progress.track_shards(shards.len());

        info!(
            "Starting run: {total} addresses, {} shards, {} workers, providers {:?}",
            shards.len(),
            self.max_workers,
            kinds
        );

        let reporter = tokio::spawn(progress.clone().report_every(self.progress_interval));
        let semaphore = Arc::new(Semaphore::new(self.max_workers));

        let mut handles = Vec::with_capacity(shards.len());
        for (shard_id, shard) in shards.into_iter().enumerate() {
            if shard_id > 0 && !self.stagger.is_zero() {
                tokio::time::sleep(self.stagger).await;
            }
            let fallback = shard.clone();
            let worker = ShardWorker {
                shard_id,
                aggregator: aggregator.clone(),
                backup_tx: backup_tx.clone(),
                progress: progress.clone(),
                kinds: kinds.clone(),
            };
            let semaphore = semaphore.clone();
            let handle = tokio::spawn(async move {
                // The semaphore is never closed, so acquire cannot fail.
                let _permit = semaphore.acquire_owned().await.ok();
                worker.run(shard).await
            });
            handles.push((fallback, handle));
        }
        drop(backup_tx);

        let mut indexed: Vec<(usize, AddressRecord)> = Vec::with_capacity(total);
        let mut global = GlobalStats::with_providers(&kinds);
        for (shard_id, (fallback, handle)) in handles.into_iter().enumerate() {
            match handle.await {
                Ok(done) => {
                    global.merge(done.stats);
                    indexed.extend(done.records);
                }
                Err(e) => {
                    error!(shard = shard_id, "Shard worker died: {e}");
                    progress.set_shard_state(shard_id, ShardState::Failed);
                    for (index, input) in &fallback {
                        progress.inc_address_failures();
                        let record = AddressRecord::empty(input, &kinds);
                        global.absorb(&record);
                        indexed.push((*index, record));
                    }
                }
            }
        }

        reporter.abort();
        progress.log_snapshot();

        indexed.sort_by_key(|(index, _)| *index);
        RunOutcome {
            records: indexed.into_iter().map(|(_, r)| r).collect(),
            global,
            shards: progress.shard_states(),
            provider_failures: progress.provider_failures(),
            address_failures: progress.address_failures(),
        }
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

/// What a shard hands back at the join barrier.
struct ShardResult {
    records: Vec<(usize, AddressRecord)>,
    stats: GlobalStats,
}

struct ShardWorker {
    shard_id: usize,
    aggregator: Arc<dyn AddressAggregator>,
    backup_tx: Option<mpsc::Sender<AddressRecord>>,
    progress: Arc<RunProgress>,
    kinds: Vec<ProviderKind>,
}

impl ShardWorker {
    /// Addresses are processed one after another; a panic in one address is
    /// contained and the worker moves on.
    async fn run(self, shard: Vec<IndexedInput>) -> ShardResult {
        self.progress.set_shard_state(self.shard_id, ShardState::Running);
        info!(shard = self.shard_id, addresses = shard.len(), "Shard started");
        let mut out = Vec::with_capacity(shard.len());
        let mut stats = GlobalStats::with_providers(&self.kinds);

        for (index, input) in shard {
            let record = match AssertUnwindSafe(self.aggregator.aggregate(&input)).catch_unwind().await {
                Ok(record) => record,
                Err(panic) => {
                    error!(
                        address = %input.address,
                        shard = self.shard_id,
                        "Address aggregation panicked, emitting empty record: {}",
                        panic_message(panic.as_ref())
                    );
                    self.progress.inc_address_failures();
                    AddressRecord::empty(&input, &self.kinds)
                }
            };

            self.progress.record_finished(&record);
            stats.absorb(&record);
            if let Some(tx) = &self.backup_tx {
                if let Err(e) = tx.send(record.clone()).await {
                    warn!(address = %record.address, "Backup channel closed: {e}");
                }
            }
            out.push((index, record));
        }

        self.progress.set_shard_state(self.shard_id, ShardState::Completed);
        info!(shard = self.shard_id, "Shard completed");
        ShardResult { records: out, stats }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

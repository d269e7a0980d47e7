//! Shared run counters. Bumped by shard workers, read by the periodic progress log.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::info;

use super::ShardState;
use crate::types::AddressRecord;

#[derive(Debug)]
pub struct RunProgress {
    total_addresses: u64,
    started_at: Instant,
    /// Addresses finished, including ones replaced by an empty record.
    pub addresses_done: AtomicU64,
    /// (address, provider) pairs that ended with partial data.
    pub provider_failures: AtomicU64,
    /// Addresses that panicked and were replaced by an empty record.
    pub address_failures: AtomicU64,
    /// Indexed by shard id. Written a handful of times per shard.
    shards: Mutex<Vec<ShardState>>,
}

impl RunProgress {
    pub fn new(total_addresses: usize) -> Self {
        Self {
            total_addresses: total_addresses as u64,
            started_at: Instant::now(),
            addresses_done: AtomicU64::new(0),
            provider_failures: AtomicU64::new(0),
            address_failures: AtomicU64::new(0),
            shards: Mutex::new(Vec::new()),
        }
    }

    fn shards(&self) -> MutexGuard<'_, Vec<ShardState>> {
        self.shards.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Reset the board to `count` pending shards.
    pub fn track_shards(&self, count: usize) {
        *self.shards() = vec![ShardState::Pending; count];
    }

    pub fn set_shard_state(&self, shard_id: usize, state: ShardState) {
        if let Some(slot) = self.shards().get_mut(shard_id) {
            *slot = state;
        }
    }

    pub fn shard_states(&self) -> Vec<ShardState> {
        self.shards().clone()
    }

    fn count_shards(&self, state: ShardState) -> usize {
        self.shards().iter().filter(|s| **s == state).count()
    }

    pub fn record_finished(&self, record: &AddressRecord) {
        let failed = record.providers.values().filter(|s| s.failed).count() as u64;
        self.provider_failures.fetch_add(failed, Ordering::Relaxed);
        self.addresses_done.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_address_failures(&self) {
        self.address_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn addresses_done(&self) -> u64 {
        self.addresses_done.load(Ordering::Relaxed)
    }

    pub fn provider_failures(&self) -> u64 {
        self.provider_failures.load(Ordering::Relaxed)
    }

    pub fn address_failures(&self) -> u64 {
        self.address_failures.load(Ordering::Relaxed)
    }

    pub fn log_snapshot(&self) {
        let done = self.addresses_done();
        let pct = if self.total_addresses == 0 {
            100.0
        } else {
            done as f64 * 100.0 / self.total_addresses as f64
        };
        info!(
            done,
            total = self.total_addresses,
            provider_failures = self.provider_failures(),
            address_failures = self.address_failures(),
            shards_running = self.count_shards(ShardState::Running),
            shards_done = self.count_shards(ShardState::Completed),
            shards_failed = self.count_shards(ShardState::Failed),
            "[PROGRESS] {done}/{} addresses ({pct:.1}%) after {:.0}s",
            self.total_addresses,
            self.started_at.elapsed().as_secs_f64(),
        );
    }

    /// Logs a snapshot every `every` until the task is aborted.
    pub async fn report_every(self: Arc<Self>, every: Duration) {
        let mut interval = tokio::time::interval(every);
        interval.tick().await; // consume immediate first tick

        loop {
            interval.tick().await;
            self.log_snapshot();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AddressInput, ProviderKind};

    #[test]
    fn counts_failed_providers_per_record() {
        let progress = RunProgress::new(3);
        let input = AddressInput::new("0x1");
        let mut record = AddressRecord::empty(&input, &[ProviderKind::NftPort, ProviderKind::Moralis]);
        progress.record_finished(&record);
        record.providers.values_mut().for_each(|s| s.failed = false);
        progress.record_finished(&record);
        assert_eq!(progress.addresses_done(), 2);
        assert_eq!(progress.provider_failures(), 2);
    }

    #[test]
    fn shard_board_tracks_each_shard() {
        let progress = RunProgress::new(4);
        progress.track_shards(3);
        progress.set_shard_state(1, ShardState::Running);
        progress.set_shard_state(2, ShardState::Failed);
        progress.set_shard_state(9, ShardState::Completed);
        assert_eq!(
            progress.shard_states(),
            vec![ShardState::Pending, ShardState::Running, ShardState::Failed]
        );
        assert_eq!(progress.count_shards(ShardState::Running), 1);
    }
}

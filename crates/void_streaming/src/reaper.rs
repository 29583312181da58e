//! Lifecycle reaper
//!
//! Evicts Loaded chunks nobody has accessed for longer than the staleness
//! threshold, regardless of distance. Eviction uses the controller's normal
//! release path.

use crate::chunk::UnloadReason;
use crate::controller::StreamingController;
use crate::coords::ChunkKey;
use crate::store::ChunkStore;

/// Staleness-based eviction
#[derive(Debug, Clone)]
pub struct LifecycleReaper {
    staleness_threshold: f64,
    interval_ticks: u32,
    tick_counter: u32,
}

impl LifecycleReaper {
    pub fn new(staleness_threshold: f64, interval_ticks: u32) -> Self {
        Self {
            staleness_threshold,
            interval_ticks: interval_ticks.max(1),
            tick_counter: 0,
        }
    }

    pub fn staleness_threshold(&self) -> f64 {
        self.staleness_threshold
    }

    /// Loaded chunks whose age strictly exceeds the threshold
    pub fn stale_keys(&self, store: &ChunkStore, now: f64) -> Vec<ChunkKey> {
        store
            .loaded()
            .filter(|chunk| chunk.age(now) > self.staleness_threshold)
            .map(|chunk| chunk.key())
            .collect()
    }

    /// Count a tick and evict stale chunks when the interval elapses
    ///
    /// Returns the number of chunks evicted.
    pub fn run(&mut self, controller: &mut StreamingController, now: f64) -> usize {
        self.tick_counter += 1;
        if self.tick_counter < self.interval_ticks {
            return 0;
        }
        self.tick_counter = 0;

        let mut reaped = 0;
        for key in self.stale_keys(controller.store(), now) {
            match controller.unload(key, UnloadReason::Stale) {
                Ok(()) => reaped += 1,
                Err(e) => log::warn!("Failed to reap chunk {}: {}", key, e),
            }
        }

        if reaped > 0 {
            log::debug!("Reaped {} stale chunks", reaped);
        }
        reaped
    }
}

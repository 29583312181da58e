//! Streaming Controller
//!
//! The policy core. Each tick it applies finished generation jobs, works out
//! which chunks belong within the load radius, queues the missing ones behind
//! a concurrency budget and unloads whatever drifted past the unload radius.
//!
//! Per-chunk state machine:
//!
//! ```text
//!            request + budget            completion (ok)
//! Unloaded ──────────────────▶ Loading ─────────────────▶ Loaded
//!    ▲                            │                          │
//!    │     completion (failed)    │                          │
//!    ├────────────────────────────┘                          │
//!    │       release handles, then remove from store         │
//!    └───────────────────────────────────────────────────────┘
//! ```
//!
//! `Unloaded` chunks have no record. Loading chunks are never cancelled; once
//! their completion arrives they are subject to the normal unload rules.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use glam::DVec3;

use crate::chunk::{ChunkState, LoadSource, UnloadReason, WorldChunk};
use crate::config::StreamingSettings;
use crate::coords::{ChunkCoord, ChunkKey, ChunkKeyCodec};
use crate::error::{Result, StreamingError};
use crate::stats::{StreamingHealth, StreamingStats};
use crate::store::ChunkStore;
use crate::worker::{GenerationCompletion, GenerationExecutor, GenerationJob};

/// How long shutdown waits for each completion before joining the workers
const SHUTDOWN_WAIT: Duration = Duration::from_secs(30);

#[derive(Clone, Copy, Debug)]
struct PendingLoad {
    key: ChunkKey,
    origin: DVec3,
    source: LoadSource,
}

/// What a single controller tick did
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Generation jobs dispatched
    pub started: usize,
    /// Chunks that became Loaded
    pub completed: usize,
    /// Generation jobs that failed
    pub failed: usize,
    /// Chunks unloaded for being out of range
    pub unloaded: usize,
}

/// Decides which chunks load and unload, within a concurrency budget
pub struct StreamingController {
    codec: ChunkKeyCodec,
    store: ChunkStore,
    executor: GenerationExecutor,
    pending: VecDeque<PendingLoad>,
    pending_keys: HashSet<ChunkKey>,
    in_flight: usize,
    stats: StreamingStats,
    pending_warn_threshold: usize,
    saturation_warned: bool,
    failures_last_tick: u32,
    shutdown_wait: Duration,
}

impl StreamingController {
    pub fn new(codec: ChunkKeyCodec, executor: GenerationExecutor, pending_warn_threshold: usize) -> Self {
        Self {
            codec,
            store: ChunkStore::new(),
            executor,
            pending: VecDeque::new(),
            pending_keys: HashSet::new(),
            in_flight: 0,
            stats: StreamingStats::default(),
            pending_warn_threshold,
            saturation_warned: false,
            failures_last_tick: 0,
            shutdown_wait: SHUTDOWN_WAIT,
        }
    }

    /// How long shutdown polls for each completion before stopping the workers
    pub fn with_shutdown_wait(mut self, wait: Duration) -> Self {
        self.shutdown_wait = wait;
        self
    }

    pub fn codec(&self) -> &ChunkKeyCodec {
        &self.codec
    }

    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    /// Reserve store room for `capacity` chunks
    pub fn reserve(&mut self, capacity: usize) {
        self.store.reserve(capacity);
    }

    /// Generation jobs dispatched and not yet applied
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Load requests waiting for budget
    pub fn pending_depth(&self) -> usize {
        self.pending.len()
    }

    /// Whether a load for this key is queued
    pub fn is_pending(&self, key: ChunkKey) -> bool {
        self.pending_keys.contains(&key)
    }

    /// Run the completion, candidate and unload passes
    pub fn tick(&mut self, observer: DVec3, settings: &StreamingSettings, now: f64) -> Result<TickReport> {
        self.failures_last_tick = 0;
        self.stats.ticks += 1;

        let mut report = self.process_completions(now);

        for coord in self.candidate_coords(observer, settings.load_radius)? {
            let key = self.codec.coord_to_key(coord)?;
            if let Some(chunk) = self.store.get_mut(key) {
                if chunk.is_ready() {
                    chunk.touch(now);
                }
                continue;
            }
            self.enqueue(coord, LoadSource::InRange)?;
        }

        self.prune_pending(observer, settings.unload_radius);
        report.started = self.pump(settings.max_concurrent_loads, now);
        report.unloaded = self.unload_out_of_range(observer, settings.unload_radius);
        self.check_saturation();

        Ok(report)
    }

    /// Origins within `load_radius` of the observer, nearest first
    ///
    /// Scans the cube of chunk offsets covering the radius around the
    /// observer's chunk and keeps those whose origin lies within the radius.
    pub fn candidate_coords(&self, observer: DVec3, load_radius: f64) -> Result<Vec<ChunkCoord>> {
        let center = self.codec.world_to_coord(observer)?;
        let reach = (load_radius / self.codec.edge_length()).ceil() as i64;

        let mut candidates = Vec::new();
        for dx in -reach..=reach {
            for dy in -reach..=reach {
                for dz in -reach..=reach {
                    let coord = match center.offset(dx, dy, dz) {
                        Some(coord) if coord.is_addressable() => coord,
                        _ => continue,
                    };
                    let distance = self.codec.coord_to_origin(coord).distance(observer);
                    if distance <= load_radius {
                        candidates.push((distance, coord));
                    }
                }
            }
        }

        candidates.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        Ok(candidates.into_iter().map(|(_, coord)| coord).collect())
    }

    /// Queue a load and dispatch as much of the queue as the budget allows
    ///
    /// Returns `false` if the chunk is already resident or queued.
    pub fn request_load(
        &mut self,
        coord: ChunkCoord,
        source: LoadSource,
        max_concurrent_loads: usize,
        now: f64,
    ) -> Result<bool> {
        let queued = self.enqueue(coord, source)?;
        self.pump(max_concurrent_loads, now);
        self.check_saturation();
        Ok(queued)
    }

    /// Apply every completion received so far
    pub fn process_completions(&mut self, now: f64) -> TickReport {
        let mut report = TickReport::default();
        for completion in self.executor.try_completions() {
            if self.apply_completion(completion, now) {
                report.completed += 1;
            } else {
                report.failed += 1;
            }
        }
        report
    }

    /// Unload every Loaded chunk farther than `unload_radius`
    pub fn unload_out_of_range(&mut self, observer: DVec3, unload_radius: f64) -> usize {
        let out_of_range: Vec<ChunkKey> = self
            .store
            .loaded()
            .filter(|c| c.distance_to(observer) > unload_radius)
            .map(|c| c.key())
            .collect();

        let mut unloaded = 0;
        for key in out_of_range {
            if self.unload(key, UnloadReason::OutOfRange).is_ok() {
                unloaded += 1;
            }
        }
        unloaded
    }

    /// Release a Loaded chunk's handles, then remove it from the store
    ///
    /// This is the only way a Loaded chunk leaves the store. Release failures
    /// are logged and the chunk is removed regardless.
    pub fn unload(&mut self, key: ChunkKey, reason: UnloadReason) -> Result<()> {
        let chunk = self.store.get_mut(key).ok_or(StreamingError::ChunkNotFound(key))?;
        if chunk.state() != ChunkState::Loaded {
            return Err(StreamingError::InvalidState {
                key,
                state: chunk.state(),
            });
        }

        let origin = chunk.origin();
        let handles = chunk.take_handles();
        let handle_count = handles.len();

        if let Err(e) = self.executor.generator().release(handles) {
            for failure in &e.failures {
                log::warn!("Failed to release handle of chunk at {:?}: {}", origin, failure);
            }
            self.stats.release_failures += e.failures.len() as u64;
        }

        self.store.remove(key);
        self.stats.unloads += 1;
        if reason == UnloadReason::Stale {
            self.stats.reaped += 1;
        }

        log::debug!(
            "Unloaded chunk at {:?} ({}, {} handles)",
            origin,
            reason,
            handle_count
        );
        Ok(())
    }

    /// Refresh a resident chunk's access time
    pub fn touch(&mut self, key: ChunkKey, now: f64) -> bool {
        match self.store.get_mut(key) {
            Some(chunk) => {
                chunk.touch(now);
                true
            }
            None => false,
        }
    }

    /// Wait for outstanding generation, then unload every chunk
    ///
    /// Every dispatched job is applied before the sweep, so content generated
    /// after a slow wait is still released.
    pub fn shutdown(&mut self, now: f64) {
        self.pending.clear();
        self.pending_keys.clear();

        while self.in_flight > 0 {
            match self.executor.wait_completion(self.shutdown_wait) {
                Some(completion) => {
                    self.apply_completion(completion, now);
                }
                None => {
                    log::warn!(
                        "{} generation jobs still running after {:?}; joining workers",
                        self.in_flight,
                        self.shutdown_wait
                    );
                    break;
                }
            }
        }

        // Workers drain their queue before exiting, so every job has posted
        self.executor.shutdown();
        for completion in self.executor.try_completions() {
            self.apply_completion(completion, now);
        }
        if self.in_flight > 0 {
            log::error!(
                "{} generation jobs never reported back; their content may leak",
                self.in_flight
            );
        }

        let resident: Vec<(ChunkKey, ChunkState)> =
            self.store.iter().map(|c| (c.key(), c.state())).collect();
        for (key, state) in resident {
            if state == ChunkState::Loaded {
                let _ = self.unload(key, UnloadReason::Shutdown);
            } else {
                self.store.remove(key);
            }
        }
    }

    /// Snapshot of the streaming counters
    pub fn stats(&self) -> StreamingStats {
        StreamingStats {
            resident_chunks: self.store.len(),
            loaded_chunks: self.store.count_in_state(ChunkState::Loaded),
            loading_chunks: self.store.count_in_state(ChunkState::Loading),
            in_flight: self.in_flight,
            pending_loads: self.pending.len(),
            ..self.stats.clone()
        }
    }

    /// Count a predictive request
    pub(crate) fn record_predictive_request(&mut self) {
        self.stats.predictive_requests += 1;
    }

    /// Get the health status of the streaming system
    pub fn health(&self) -> StreamingHealth {
        if self.pending.len() > self.pending_warn_threshold {
            StreamingHealth::Saturated {
                pending: self.pending.len(),
            }
        } else if self.failures_last_tick > 0 {
            StreamingHealth::Degraded {
                failures_last_tick: self.failures_last_tick,
            }
        } else {
            StreamingHealth::Healthy
        }
    }

    // Helper methods

    fn enqueue(&mut self, coord: ChunkCoord, source: LoadSource) -> Result<bool> {
        let origin = self.codec.coord_to_origin(coord);
        let key = self.codec.verified_key(origin)?;

        if self.store.contains(key) || self.pending_keys.contains(&key) {
            return Ok(false);
        }

        self.pending.push_back(PendingLoad { key, origin, source });
        self.pending_keys.insert(key);
        self.stats.peak_pending = self.stats.peak_pending.max(self.pending.len());
        Ok(true)
    }

    fn prune_pending(&mut self, observer: DVec3, unload_radius: f64) {
        let keys = &mut self.pending_keys;
        self.pending.retain(|request| {
            let keep = request.origin.distance(observer) <= unload_radius;
            if !keep {
                keys.remove(&request.key);
            }
            keep
        });
    }

    fn pump(&mut self, max_concurrent_loads: usize, now: f64) -> usize {
        let mut started = 0;
        while self.in_flight < max_concurrent_loads {
            let Some(request) = self.pending.pop_front() else {
                break;
            };
            self.pending_keys.remove(&request.key);

            let mut chunk = WorldChunk::new(request.key, request.origin, request.source);
            chunk.start_loading(now);
            if let Err(e) = self.store.insert(chunk) {
                log::warn!("Skipping load of chunk at {:?}: {}", request.origin, e);
                continue;
            }

            self.in_flight += 1;
            self.stats.loads_started += 1;
            self.stats.peak_in_flight = self.stats.peak_in_flight.max(self.in_flight);
            started += 1;

            log::debug!("Loading chunk at {:?} ({:?})", request.origin, request.source);
            self.executor.submit(GenerationJob {
                key: request.key,
                origin: request.origin,
            });
        }
        started
    }

    /// Returns whether the chunk became Loaded
    fn apply_completion(&mut self, completion: GenerationCompletion, now: f64) -> bool {
        self.in_flight = self.in_flight.saturating_sub(1);
        let GenerationCompletion { key, origin, result } = completion;

        match result {
            Ok(handles) => {
                let outcome = match self.store.get_mut(key) {
                    Some(chunk) if chunk.state() == ChunkState::Loading => {
                        chunk.finish_loading(handles, now)
                    }
                    _ => Err(handles),
                };

                match outcome {
                    Ok(()) => {
                        self.stats.loads_completed += 1;
                        log::debug!("Loaded chunk at {:?}", origin);
                        true
                    }
                    Err(orphaned) => {
                        log::error!(
                            "Discarding content generated for chunk at {:?}: no chunk awaits it",
                            origin
                        );
                        if let Err(e) = self.executor.generator().release(orphaned) {
                            self.stats.release_failures += e.failures.len() as u64;
                            log::warn!("Failed to discard content at {:?}: {}", origin, e);
                        }
                        false
                    }
                }
            }
            Err(e) => {
                if self
                    .store
                    .get(key)
                    .map_or(false, |c| c.state() == ChunkState::Loading)
                {
                    self.store.remove(key);
                }
                self.stats.generation_failures += 1;
                self.failures_last_tick += 1;
                log::warn!(
                    "Generation failed for chunk at {:?}: {}; retrying while in range",
                    origin,
                    e
                );
                false
            }
        }
    }

    fn check_saturation(&mut self) {
        let depth = self.pending.len();
        if depth > self.pending_warn_threshold {
            if !self.saturation_warned {
                log::warn!(
                    "Chunk load queue saturated: {} pending, {} in flight; observer is outrunning generation",
                    depth,
                    self.in_flight
                );
                self.saturation_warned = true;
            }
        } else if depth <= self.pending_warn_threshold / 2 {
            self.saturation_warned = false;
        }
    }
}

impl Drop for StreamingController {
    fn drop(&mut self) {
        if !self.store.is_empty() {
            log::warn!(
                "Streaming controller dropped with {} resident chunks; shutting down",
                self.store.len()
            );
            self.shutdown(0.0);
        }
    }
}

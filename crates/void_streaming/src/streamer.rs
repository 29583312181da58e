//! World Streamer
//!
//! Engine-facing facade. Owns the codec, the controller, the predictive
//! loader and the reaper, and runs them in that order on a fixed tick driven
//! by [`WorldStreamer::update`].
//!
//! ```ignore
//! let headless = HeadlessSubsystems::new();
//! let mut streamer = WorldStreamer::with_subsystems(StreamerConfig::default(), headless.subsystems())?;
//! streamer.initialize()?;
//!
//! loop {
//!     streamer.set_observer_position(camera_position)?;
//!     streamer.update(frame_dt)?;
//! }
//! ```

use std::sync::Arc;

use glam::DVec3;

use crate::chunk::WorldChunk;
use crate::config::{StreamerConfig, StreamingSettings, WorldConfig};
use crate::content::{ContentGenerator, SubsystemContentGenerator, Subsystems};
use crate::controller::{StreamingController, TickReport};
use crate::coords::ChunkKeyCodec;
use crate::error::{Result, StreamingError};
use crate::observer::ObserverState;
use crate::predictive::PredictiveLoader;
use crate::reaper::LifecycleReaper;
use crate::stats::{StreamingHealth, StreamingStats};
use crate::worker::GenerationExecutor;

/// Streams world chunks around a moving observer
pub struct WorldStreamer {
    config: StreamerConfig,
    codec: ChunkKeyCodec,
    generator: Arc<dyn ContentGenerator>,
    controller: Option<StreamingController>,
    predictive: PredictiveLoader,
    reaper: LifecycleReaper,
    observer: ObserverState,
    settings: StreamingSettings,
    staged_settings: Option<StreamingSettings>,
    world: WorldConfig,
    clock: f64,
    tick_timer: f32,
    last_tick: TickReport,
}

impl WorldStreamer {
    /// Create a streamer around an existing content generator
    pub fn new(config: StreamerConfig, generator: Arc<dyn ContentGenerator>) -> Result<Self> {
        config.validate()?;
        let codec = ChunkKeyCodec::new(config.chunk_edge_length)?;
        codec.check_world_scale(config.world.world_scale)?;

        Ok(Self {
            codec,
            generator,
            controller: None,
            predictive: PredictiveLoader::new(),
            reaper: LifecycleReaper::new(config.staleness_threshold, config.reaper_interval_ticks),
            observer: ObserverState::default(),
            settings: config.streaming.clone(),
            staged_settings: None,
            world: config.world,
            clock: 0.0,
            tick_timer: 0.0,
            last_tick: TickReport::default(),
            config,
        })
    }

    /// Create a streamer that populates chunks through the given subsystems
    pub fn with_subsystems(config: StreamerConfig, subsystems: Subsystems) -> Result<Self> {
        Self::new(config, Arc::new(SubsystemContentGenerator::new(subsystems)))
    }

    /// Reserve storage, reset counters and start generation workers
    pub fn initialize(&mut self) -> Result<()> {
        if self.controller.is_some() {
            return Err(StreamingError::AlreadyInitialized);
        }

        let executor = GenerationExecutor::with_workers(self.generator.clone(), self.config.worker_threads)?;
        let mut controller =
            StreamingController::new(self.codec, executor, self.config.pending_warn_threshold);
        controller.reserve(self.config.initial_capacity);

        self.generator.configure_world(&self.world);
        self.controller = Some(controller);
        self.predictive = PredictiveLoader::new();
        self.reaper = LifecycleReaper::new(self.config.staleness_threshold, self.config.reaper_interval_ticks);
        self.clock = 0.0;
        self.tick_timer = 0.0;
        self.last_tick = TickReport::default();

        log::info!(
            "World streamer initialized: {} unit chunks, load radius {}, {}",
            self.codec.edge_length(),
            self.settings.load_radius,
            if self.config.worker_threads == 0 {
                "inline generation".to_string()
            } else {
                format!("{} generation workers", self.config.worker_threads)
            }
        );
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.controller.is_some()
    }

    /// Advance the clock, running a streaming tick once per tick interval
    ///
    /// Does nothing before [`Self::initialize`] or after [`Self::shutdown`].
    /// Non-finite or negative `dt` is ignored.
    pub fn update(&mut self, dt: f32) -> Result<()> {
        if self.controller.is_none() {
            return Ok(());
        }
        if !dt.is_finite() || dt < 0.0 {
            log::warn!("Ignoring invalid frame delta {}", dt);
            return Ok(());
        }

        self.clock += dt as f64;
        self.tick_timer += dt;
        if self.tick_timer < self.config.tick_interval {
            return Ok(());
        }
        self.tick_timer = 0.0;
        self.tick()
    }

    fn tick(&mut self) -> Result<()> {
        if let Some(settings) = self.staged_settings.take() {
            log::debug!("Applying streaming settings: {:?}", settings);
            self.settings = settings;
        }
        self.observer.commit();

        let now = self.clock;
        let controller = self.controller.as_mut().ok_or(StreamingError::NotInitialized)?;

        let report = controller.tick(self.observer.current(), &self.settings, now);
        let report = match report {
            Ok(report) => report,
            Err(e) => {
                if e.is_fatal() {
                    log::error!("Streaming tick aborted: {}", e);
                }
                return Err(e);
            }
        };

        self.predictive.run(controller, &self.observer, &self.settings, now)?;
        self.reaper.run(controller, now);
        self.last_tick = report;
        Ok(())
    }

    /// Unload every resident chunk and stop the generation workers
    pub fn shutdown(&mut self) {
        if let Some(mut controller) = self.controller.take() {
            controller.shutdown(self.clock);
            let stats = controller.stats();
            log::info!(
                "World streamer shut down: {} loads, {} unloads, {} release failures",
                stats.loads_completed,
                stats.unloads,
                stats.release_failures
            );
        }
    }

    /// Stage the observer position for the next tick
    pub fn set_observer_position(&mut self, position: DVec3) -> Result<()> {
        self.codec.world_to_coord(position)?;
        self.observer.set_position(position);
        Ok(())
    }

    /// Validate and stage new settings for the next tick
    pub fn set_streaming_settings(&mut self, settings: StreamingSettings) -> Result<()> {
        settings.validate_for_edge(self.codec.edge_length())?;
        self.staged_settings = Some(settings);
        Ok(())
    }

    /// Settings in effect as of the last tick
    pub fn streaming_settings(&self) -> &StreamingSettings {
        &self.settings
    }

    /// Resident chunk containing a world position
    pub fn get_chunk(&self, position: DVec3) -> Result<Option<&WorldChunk>> {
        let controller = self.controller.as_ref().ok_or(StreamingError::NotInitialized)?;
        let key = self.codec.world_to_key(position)?;
        Ok(controller.store().get(key))
    }

    /// Every chunk whose content is ready
    pub fn loaded_chunks(&self) -> Vec<&WorldChunk> {
        match &self.controller {
            Some(controller) => controller.store().loaded().collect(),
            None => Vec::new(),
        }
    }

    /// Mark the chunk containing a position as accessed now
    pub fn touch_chunk(&mut self, position: DVec3) -> Result<bool> {
        let key = self.codec.world_to_key(position)?;
        let controller = self.controller.as_mut().ok_or(StreamingError::NotInitialized)?;
        Ok(controller.touch(key, self.clock))
    }

    pub fn enable_infinite_world(&mut self, enabled: bool) {
        self.world.infinite_world = enabled;
        self.generator.configure_world(&self.world);
    }

    /// Set the world half-extent forwarded to the subsystems
    pub fn set_world_scale(&mut self, scale: f64) -> Result<()> {
        if let Err(e) = self.codec.check_world_scale(scale) {
            log::error!("Rejected world scale: {}", e);
            return Err(e);
        }
        self.world.world_scale = scale;
        self.generator.configure_world(&self.world);
        Ok(())
    }

    pub fn world_config(&self) -> WorldConfig {
        self.world
    }

    pub fn codec(&self) -> &ChunkKeyCodec {
        &self.codec
    }

    /// Observer position as of the last tick
    pub fn observer_position(&self) -> DVec3 {
        self.observer.current()
    }

    /// Streamer clock in seconds
    pub fn clock(&self) -> f64 {
        self.clock
    }

    /// What the most recent tick did
    pub fn last_tick(&self) -> TickReport {
        self.last_tick
    }

    pub fn stats(&self) -> StreamingStats {
        self.controller
            .as_ref()
            .map(|c| c.stats())
            .unwrap_or_default()
    }

    pub fn pending_queue_depth(&self) -> usize {
        self.controller.as_ref().map_or(0, |c| c.pending_depth())
    }

    pub fn in_flight(&self) -> usize {
        self.controller.as_ref().map_or(0, |c| c.in_flight())
    }

    pub fn health(&self) -> StreamingHealth {
        self.controller
            .as_ref()
            .map_or(StreamingHealth::Healthy, |c| c.health())
    }
}

impl Drop for WorldStreamer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

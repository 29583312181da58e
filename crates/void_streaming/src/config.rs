//! Streaming Configuration
//!
//! Runtime settings for the streaming policy and the static configuration of
//! a [`WorldStreamer`](crate::WorldStreamer).
//!
//! # Example Config File
//!
//! ```toml
//! chunk_edge_length = 1000.0
//! tick_interval = 0.1
//! staleness_threshold = 300.0
//! worker_threads = 4
//!
//! [streaming]
//! load_radius = 5000.0
//! unload_radius = 8000.0
//! prediction_radius = 7000.0
//! max_concurrent_loads = 4
//! enable_predictive_streaming = true
//!
//! [world]
//! infinite_world = true
//! world_scale = 1e12
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StreamingError};

/// Largest load radius, in chunk edge lengths, the candidate scan accepts
pub const MAX_RADIUS_IN_CHUNKS: f64 = 64.0;

/// Load/unload policy settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingSettings {
    /// Chunks whose origin is within this distance of the observer are loaded
    pub load_radius: f64,

    /// Chunks farther than this are unloaded (must be > load_radius)
    pub unload_radius: f64,

    /// Distance ahead of the observer at which one chunk is prefetched
    pub prediction_radius: f64,

    /// Maximum generation jobs outstanding at once
    pub max_concurrent_loads: usize,

    /// Prefetch along the observer's travel direction
    pub enable_predictive_streaming: bool,
}

impl Default for StreamingSettings {
    fn default() -> Self {
        Self {
            load_radius: 5000.0,
            unload_radius: 8000.0,
            prediction_radius: 7000.0,
            max_concurrent_loads: 4,
            enable_predictive_streaming: true,
        }
    }
}

impl StreamingSettings {
    /// Check every invariant the controller relies on
    pub fn validate(&self) -> Result<()> {
        let radii = [
            ("load_radius", self.load_radius),
            ("unload_radius", self.unload_radius),
            ("prediction_radius", self.prediction_radius),
        ];
        for (name, value) in radii {
            if !value.is_finite() || value <= 0.0 {
                return Err(StreamingError::InvalidSettings(format!(
                    "{} must be a positive finite number, got {}",
                    name, value
                )));
            }
        }

        if self.unload_radius <= self.load_radius {
            return Err(StreamingError::InvalidSettings(format!(
                "unload_radius ({}) must be greater than load_radius ({})",
                self.unload_radius, self.load_radius
            )));
        }

        if self.max_concurrent_loads == 0 {
            return Err(StreamingError::InvalidSettings(
                "max_concurrent_loads must be at least 1".into(),
            ));
        }

        // A prefetched chunk beyond the unload radius is evicted on the next tick
        if self.enable_predictive_streaming && self.prediction_radius >= self.unload_radius {
            return Err(StreamingError::InvalidSettings(format!(
                "prediction_radius ({}) must be less than unload_radius ({})",
                self.prediction_radius, self.unload_radius
            )));
        }

        Ok(())
    }

    /// [`Self::validate`] plus limits that depend on the chunk edge length
    pub fn validate_for_edge(&self, edge_length: f64) -> Result<()> {
        self.validate()?;
        let span = self.load_radius / edge_length;
        if span > MAX_RADIUS_IN_CHUNKS {
            return Err(StreamingError::InvalidSettings(format!(
                "load_radius spans {:.0} chunks of {} units; at most {} are supported",
                span, edge_length, MAX_RADIUS_IN_CHUNKS
            )));
        }
        Ok(())
    }

    pub fn with_radii(mut self, load_radius: f64, unload_radius: f64) -> Self {
        self.load_radius = load_radius;
        self.unload_radius = unload_radius;
        self
    }

    pub fn with_prediction_radius(mut self, prediction_radius: f64) -> Self {
        self.prediction_radius = prediction_radius;
        self
    }

    pub fn with_max_concurrent_loads(mut self, max_concurrent_loads: usize) -> Self {
        self.max_concurrent_loads = max_concurrent_loads;
        self
    }

    pub fn with_predictive_streaming(mut self, enabled: bool) -> Self {
        self.enable_predictive_streaming = enabled;
        self
    }
}

/// World-wide settings forwarded to the content subsystems
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// World has no edge
    pub infinite_world: bool,
    /// Half-extent of the world in world units
    pub world_scale: f64,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            infinite_world: true,
            world_scale: 1e12,
        }
    }
}

/// Complete world streamer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamerConfig {
    /// Chunk edge length in world units
    pub chunk_edge_length: f64,

    /// Seconds between streaming ticks
    pub tick_interval: f32,

    /// Seconds a chunk may go unaccessed before the reaper evicts it
    pub staleness_threshold: f64,

    /// Run the reaper every N ticks
    pub reaper_interval_ticks: u32,

    /// Generation worker threads (0 = generate inline on the tick thread)
    pub worker_threads: usize,

    /// Chunk records to reserve room for on initialize
    pub initial_capacity: usize,

    /// Pending queue depth that triggers a saturation warning
    pub pending_warn_threshold: usize,

    /// Load/unload policy
    pub streaming: StreamingSettings,

    /// World settings forwarded to the subsystems
    pub world: WorldConfig,
}

impl Default for StreamerConfig {
    fn default() -> Self {
        Self {
            chunk_edge_length: 1000.0,
            tick_interval: 0.1,
            staleness_threshold: 300.0,
            reaper_interval_ticks: 1,
            worker_threads: 0,
            initial_capacity: 10_000,
            pending_warn_threshold: 256,
            streaming: StreamingSettings::default(),
            world: WorldConfig::default(),
        }
    }
}

impl StreamerConfig {
    /// Parse from a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: StreamerConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&source)?;
        log::info!("Loaded streamer config from {:?}", path);
        Ok(config)
    }

    /// Check the configuration for values the streamer cannot run with
    pub fn validate(&self) -> Result<()> {
        if !self.chunk_edge_length.is_finite() || self.chunk_edge_length <= 0.0 {
            return Err(StreamingError::InvalidEdgeLength(self.chunk_edge_length));
        }
        if !self.tick_interval.is_finite() || self.tick_interval <= 0.0 {
            return Err(StreamingError::InvalidConfig(format!(
                "tick_interval must be positive, got {}",
                self.tick_interval
            )));
        }
        if !self.staleness_threshold.is_finite() || self.staleness_threshold <= 0.0 {
            return Err(StreamingError::InvalidConfig(format!(
                "staleness_threshold must be positive, got {}",
                self.staleness_threshold
            )));
        }
        if self.reaper_interval_ticks == 0 {
            return Err(StreamingError::InvalidConfig(
                "reaper_interval_ticks must be at least 1".into(),
            ));
        }
        self.streaming.validate_for_edge(self.chunk_edge_length)
    }

    pub fn with_streaming(mut self, streaming: StreamingSettings) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn with_worker_threads(mut self, worker_threads: usize) -> Self {
        self.worker_threads = worker_threads;
        self
    }

    pub fn with_staleness_threshold(mut self, seconds: f64) -> Self {
        self.staleness_threshold = seconds;
        self
    }

    pub fn with_chunk_edge_length(mut self, edge_length: f64) -> Self {
        self.chunk_edge_length = edge_length;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_valid() {
        assert!(StreamingSettings::default().validate().is_ok());
        assert!(StreamerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_hysteresis_band_required() {
        let equal = StreamingSettings::default().with_radii(5000.0, 5000.0);
        assert!(matches!(equal.validate(), Err(StreamingError::InvalidSettings(_))));

        let inverted = StreamingSettings::default().with_radii(5000.0, 4000.0);
        assert!(inverted.validate().is_err());
    }

    #[test]
    fn test_zero_budget_rejected() {
        let settings = StreamingSettings::default().with_max_concurrent_loads(0);
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_prediction_beyond_unload_rejected() {
        let settings = StreamingSettings::default().with_prediction_radius(9000.0);
        assert!(settings.validate().is_err());

        // Irrelevant when prediction is off
        let settings = settings.with_predictive_streaming(false);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_radius_limited_by_edge_length() {
        let settings = StreamingSettings::default();
        assert!(settings.validate_for_edge(1000.0).is_ok());
        // 5000 units of 10 unit chunks is a 500 chunk radius
        assert!(settings.validate_for_edge(10.0).is_err());
    }

    #[test]
    fn test_non_positive_radius_rejected() {
        let settings = StreamingSettings::default().with_radii(-1.0, 10.0);
        assert!(settings.validate().is_err());

        let zero_load = StreamingSettings::default()
            .with_radii(0.0, 10.0)
            .with_prediction_radius(5.0);
        assert!(matches!(zero_load.validate(), Err(StreamingError::InvalidSettings(_))));

        let zero_prediction = StreamingSettings::default().with_prediction_radius(0.0);
        assert!(zero_prediction.validate().is_err());
    }

    #[test]
    fn test_config_from_toml() {
        let source = r#"
            chunk_edge_length = 500.0
            worker_threads = 2

            [streaming]
            load_radius = 1500.0
            unload_radius = 2500.0
            prediction_radius = 2000.0
            max_concurrent_loads = 8

            [world]
            world_scale = 1e9
        "#;

        let config = StreamerConfig::from_toml_str(source).unwrap();
        assert_eq!(config.chunk_edge_length, 500.0);
        assert_eq!(config.worker_threads, 2);
        assert_eq!(config.streaming.max_concurrent_loads, 8);
        assert!(config.streaming.enable_predictive_streaming);
        assert_eq!(config.world.world_scale, 1e9);
        assert!(config.world.infinite_world);
        assert_eq!(config.staleness_threshold, 300.0);
    }

    #[test]
    fn test_config_from_toml_rejects_bad_settings() {
        let source = r#"
            [streaming]
            load_radius = 3000.0
            unload_radius = 1000.0
        "#;
        assert!(matches!(
            StreamerConfig::from_toml_str(source),
            Err(StreamingError::InvalidSettings(_))
        ));

        assert!(matches!(
            StreamerConfig::from_toml_str("tick_interval = \"fast\""),
            Err(StreamingError::ConfigParse(_))
        ));
    }
}

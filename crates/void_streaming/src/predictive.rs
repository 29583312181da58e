//! Predictive prefetch
//!
//! Extrapolates the observer along its last movement and requests the one
//! chunk containing the point `prediction_radius` ahead. The request goes
//! through the controller's pending queue like any other load.

use glam::DVec3;

use crate::chunk::LoadSource;
use crate::config::StreamingSettings;
use crate::controller::StreamingController;
use crate::coords::ChunkCoord;
use crate::error::Result;
use crate::observer::ObserverState;

/// One-chunk-ahead prefetcher
#[derive(Debug, Default)]
pub struct PredictiveLoader {
    last_request: Option<ChunkCoord>,
}

impl PredictiveLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point `prediction_radius` ahead of the observer, `None` when stationary
    pub fn predict(observer: &ObserverState, prediction_radius: f64) -> Option<DVec3> {
        observer
            .direction()
            .map(|direction| observer.current() + direction * prediction_radius)
    }

    /// Request the chunk at the predicted point
    ///
    /// Returns the requested coordinate, or `None` when prediction is disabled,
    /// the observer did not move, or the chunk would be unloaded right away.
    pub fn run(
        &mut self,
        controller: &mut StreamingController,
        observer: &ObserverState,
        settings: &StreamingSettings,
        now: f64,
    ) -> Result<Option<ChunkCoord>> {
        if !settings.enable_predictive_streaming {
            return Ok(None);
        }
        let Some(point) = Self::predict(observer, settings.prediction_radius) else {
            return Ok(None);
        };

        // Looking past the edge of the addressable world is not an error
        let coord = match controller.codec().world_to_coord(point) {
            Ok(coord) => coord,
            Err(e) => {
                log::debug!("Skipping prediction: {}", e);
                return Ok(None);
            }
        };

        // The unload pass measures from the origin, which can sit up to a
        // cube diagonal beyond the predicted point
        let origin = controller.codec().coord_to_origin(coord);
        if origin.distance(observer.current()) > settings.unload_radius {
            log::trace!("Skipping prediction {}: origin beyond unload radius", coord);
            return Ok(None);
        }

        if controller.request_load(coord, LoadSource::Predicted, settings.max_concurrent_loads, now)? {
            controller.record_predictive_request();
            log::trace!("Prefetching chunk {} ahead of observer", coord);
        }

        self.last_request = Some(coord);
        Ok(Some(coord))
    }

    /// Chunk requested by the most recent successful prediction
    pub fn last_request(&self) -> Option<ChunkCoord> {
        self.last_request
    }
}

//! Streaming statistics and health

/// Streaming system statistics
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StreamingStats {
    /// Resident chunks in any state
    pub resident_chunks: usize,
    pub loaded_chunks: usize,
    pub loading_chunks: usize,
    /// Generation jobs outstanding
    pub in_flight: usize,
    /// Highest in-flight count observed
    pub peak_in_flight: usize,
    /// Load requests waiting for budget
    pub pending_loads: usize,
    /// Deepest pending queue observed
    pub peak_pending: usize,
    pub loads_started: u64,
    pub loads_completed: u64,
    pub generation_failures: u64,
    pub unloads: u64,
    pub reaped: u64,
    pub release_failures: u64,
    pub predictive_requests: u64,
    pub ticks: u64,
}

/// Health status of the streaming system
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamingHealth {
    /// All systems normal
    Healthy,
    /// Pending queue beyond the warning threshold; the observer is
    /// outrunning generation throughput
    Saturated { pending: usize },
    /// Generation failed during the last tick
    Degraded { failures_last_tick: u32 },
}

impl StreamingHealth {
    pub fn is_healthy(&self) -> bool {
        *self == StreamingHealth::Healthy
    }
}

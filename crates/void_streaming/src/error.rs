//! Error types for the streaming system

use glam::DVec3;
use thiserror::Error;

use crate::chunk::ChunkState;
use crate::coords::ChunkKey;

/// Streaming system errors
#[derive(Debug, Error)]
pub enum StreamingError {
    /// Position contains NaN or infinity
    #[error("Non-finite world position: {0:?}")]
    NonFinitePosition(DVec3),

    /// Position lies outside the range the chunk key can address
    #[error("Position {position:?} exceeds the supported coordinate range (±{max})")]
    CoordinateOutOfRange { position: DVec3, max: f64 },

    /// Origin handed to the codec is not a multiple of the chunk edge length
    #[error("Origin {origin:?} is not aligned to the {edge_length} unit chunk grid")]
    UnalignedOrigin { origin: DVec3, edge_length: f64 },

    /// Two distinct origins resolved to the same key. Fatal.
    #[error("Chunk key collision: origin {origin:?} decoded back as {decoded:?} (key {key})")]
    KeyCollision {
        origin: DVec3,
        decoded: DVec3,
        key: ChunkKey,
    },

    /// Configured world scale cannot be addressed by the chunk key. Fatal.
    #[error("World scale {scale} exceeds the chunk key range (±{max})")]
    WorldScaleOutOfRange { scale: f64, max: f64 },

    /// Chunk edge length is not a positive finite number
    #[error("Invalid chunk edge length: {0}")]
    InvalidEdgeLength(f64),

    /// Streaming settings violate an invariant
    #[error("Invalid streaming settings: {0}")]
    InvalidSettings(String),

    /// Streamer configuration is unusable
    #[error("Invalid streamer configuration: {0}")]
    InvalidConfig(String),

    /// Store already holds a record for this key
    #[error("Chunk already present: {0}")]
    ChunkAlreadyPresent(ChunkKey),

    /// Store holds no record for this key
    #[error("Chunk not found: {0}")]
    ChunkNotFound(ChunkKey),

    /// Operation not valid in the chunk's current state
    #[error("Chunk {key} in invalid state {state:?}")]
    InvalidState { key: ChunkKey, state: ChunkState },

    /// Streamer used before `initialize`
    #[error("World streamer is not initialized")]
    NotInitialized,

    /// `initialize` called twice
    #[error("World streamer is already initialized")]
    AlreadyInitialized,

    /// Generation worker thread could not be started
    #[error("Failed to spawn generation worker: {0}")]
    WorkerSpawn(String),

    /// Config file could not be read
    #[error("Failed to read streamer config: {0}")]
    ConfigIo(#[from] std::io::Error),

    /// Config file could not be parsed
    #[error("Failed to parse streamer config: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

impl StreamingError {
    /// Whether the error indicates a configuration the streamer must not run with
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            StreamingError::KeyCollision { .. } | StreamingError::WorldScaleOutOfRange { .. }
        )
    }
}

/// Collaborating subsystem that owns a kind of chunk content
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SubsystemKind {
    Render,
    Physics,
    Ai,
}

impl std::fmt::Display for SubsystemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubsystemKind::Render => write!(f, "render"),
            SubsystemKind::Physics => write!(f, "physics"),
            SubsystemKind::Ai => write!(f, "ai"),
        }
    }
}

/// A render, physics or AI subsystem refused a create or destroy call
#[derive(Debug, Clone, Error)]
#[error("{subsystem} subsystem: {message}")]
pub struct SubsystemError {
    pub subsystem: SubsystemKind,
    pub message: String,
}

impl SubsystemError {
    pub fn new(subsystem: SubsystemKind, message: impl Into<String>) -> Self {
        Self {
            subsystem,
            message: message.into(),
        }
    }
}

/// Content generation for a chunk failed
#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    /// A collaborator failed to create content
    #[error(transparent)]
    Subsystem(#[from] SubsystemError),

    /// The generator declined to produce content for this origin
    #[error("Generation rejected: {0}")]
    Rejected(String),

    /// The generation job panicked on its worker
    #[error("Generation panicked: {0}")]
    Panicked(String),
}

/// One or more handles could not be destroyed while unloading
#[derive(Debug, Clone, Default, Error)]
#[error("{} handle(s) failed to release", .failures.len())]
pub struct ReleaseError {
    pub failures: Vec<SubsystemError>,
}

impl ReleaseError {
    /// `Ok` when nothing failed, otherwise the collected failures
    pub fn from_failures(failures: Vec<SubsystemError>) -> std::result::Result<(), Self> {
        if failures.is_empty() {
            Ok(())
        } else {
            Err(Self { failures })
        }
    }
}

/// Result type for streaming operations
pub type Result<T> = std::result::Result<T, StreamingError>;

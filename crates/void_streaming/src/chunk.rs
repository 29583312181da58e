//! World Chunk Definition
//!
//! A chunk is a fixed-size cube of world space and the unit of streaming.
//! Its record tracks load state and the external handles the render, physics
//! and AI subsystems created for it.

use core::fmt;

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::coords::{ChunkCoord, ChunkKey};

/// Handle of a render object owned by the render subsystem
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RenderObjectId(pub u64);

/// Handle of a physics body owned by the physics subsystem
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PhysicsBodyId(pub u64);

/// Handle of an agent owned by the AI subsystem
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AiAgentId(pub u64);

/// External handles a chunk owns
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChunkHandles {
    pub render: Vec<RenderObjectId>,
    pub physics: Vec<PhysicsBodyId>,
    pub ai: Vec<AiAgentId>,
}

impl ChunkHandles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of handles across all subsystems
    pub fn len(&self) -> usize {
        self.render.len() + self.physics.len() + self.ai.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Current state of a world chunk
///
/// `Unloaded` chunks have no record in the store; the variant exists so
/// callers can report the state of a position that is not resident.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChunkState {
    /// Not resident
    #[default]
    Unloaded,
    /// Generation job outstanding
    Loading,
    /// Content generated and handles owned
    Loaded,
}

impl ChunkState {
    /// Check if a generation job is outstanding
    pub fn is_transient(&self) -> bool {
        *self == ChunkState::Loading
    }

    /// Check if chunk content is accessible
    pub fn is_accessible(&self) -> bool {
        *self == ChunkState::Loaded
    }
}

/// Why a load was requested
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadSource {
    /// Chunk lies within the load radius
    InRange,
    /// Chunk lies ahead of the observer's travel direction
    Predicted,
}

/// Why a chunk left the store
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnloadReason {
    /// Farther than the unload radius
    OutOfRange,
    /// Not accessed within the staleness threshold
    Stale,
    /// Streamer shutting down
    Shutdown,
}

impl fmt::Display for UnloadReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnloadReason::OutOfRange => write!(f, "out of range"),
            UnloadReason::Stale => write!(f, "stale"),
            UnloadReason::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// A resident chunk record
#[derive(Clone, Debug)]
pub struct WorldChunk {
    key: ChunkKey,
    coord: ChunkCoord,
    origin: DVec3,
    state: ChunkState,
    generated: bool,
    handles: ChunkHandles,
    last_access: f64,
    source: LoadSource,
}

impl WorldChunk {
    /// Create a record for a chunk that is about to start loading
    pub fn new(key: ChunkKey, origin: DVec3, source: LoadSource) -> Self {
        Self {
            key,
            coord: key.coord(),
            origin,
            state: ChunkState::Unloaded,
            generated: false,
            handles: ChunkHandles::new(),
            last_access: 0.0,
            source,
        }
    }

    pub fn key(&self) -> ChunkKey {
        self.key
    }

    pub fn coord(&self) -> ChunkCoord {
        self.coord
    }

    /// Snapped minimum corner of the chunk
    pub fn origin(&self) -> DVec3 {
        self.origin
    }

    pub fn state(&self) -> ChunkState {
        self.state
    }

    /// Whether content generation already ran for this chunk
    pub fn is_generated(&self) -> bool {
        self.generated
    }

    pub fn handles(&self) -> &ChunkHandles {
        &self.handles
    }

    /// Streamer clock time of the last access, in seconds
    pub fn last_access(&self) -> f64 {
        self.last_access
    }

    /// Seconds since the last access
    pub fn age(&self, now: f64) -> f64 {
        now - self.last_access
    }

    pub fn source(&self) -> LoadSource {
        self.source
    }

    /// Distance from the chunk origin to a world position
    pub fn distance_to(&self, pos: DVec3) -> f64 {
        self.origin.distance(pos)
    }

    /// Check if the chunk is ready for use
    pub fn is_ready(&self) -> bool {
        self.state == ChunkState::Loaded
    }

    /// Mark chunk as loading
    pub fn start_loading(&mut self, now: f64) {
        self.state = ChunkState::Loading;
        self.last_access = now;
    }

    /// Take ownership of generated handles and mark the chunk loaded
    ///
    /// Returns the handles back if the chunk was already generated so the
    /// caller can release them; generation never applies twice.
    pub fn finish_loading(&mut self, handles: ChunkHandles, now: f64) -> Result<(), ChunkHandles> {
        if self.generated {
            return Err(handles);
        }
        self.handles = handles;
        self.generated = true;
        self.state = ChunkState::Loaded;
        self.last_access = now;
        Ok(())
    }

    /// Refresh the access time
    pub fn touch(&mut self, now: f64) {
        self.last_access = now;
    }

    /// Give up every owned handle, leaving the chunk unloaded
    pub fn take_handles(&mut self) -> ChunkHandles {
        self.state = ChunkState::Unloaded;
        core::mem::take(&mut self.handles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk() -> WorldChunk {
        let coord = ChunkCoord::new(1, -2, 3);
        let key = ChunkKey::pack(coord).unwrap();
        WorldChunk::new(key, DVec3::new(1000.0, -2000.0, 3000.0), LoadSource::InRange)
    }

    #[test]
    fn test_chunk_state() {
        assert!(ChunkState::Loading.is_transient());
        assert!(!ChunkState::Loaded.is_transient());
        assert!(ChunkState::Loaded.is_accessible());
        assert!(!ChunkState::Loading.is_accessible());
    }

    #[test]
    fn test_chunk_state_transitions() {
        let mut chunk = chunk();
        assert_eq!(chunk.coord(), ChunkCoord::new(1, -2, 3));
        assert_eq!(chunk.state(), ChunkState::Unloaded);

        chunk.start_loading(1.0);
        assert_eq!(chunk.state(), ChunkState::Loading);

        let handles = ChunkHandles {
            render: vec![RenderObjectId(1)],
            physics: vec![PhysicsBodyId(2)],
            ai: vec![AiAgentId(3)],
        };
        assert!(chunk.finish_loading(handles.clone(), 2.0).is_ok());
        assert!(chunk.is_ready());
        assert!(chunk.is_generated());
        assert_eq!(chunk.handles().len(), 3);
        assert_eq!(chunk.last_access(), 2.0);

        let released = chunk.take_handles();
        assert_eq!(released, handles);
        assert!(chunk.handles().is_empty());
        assert_eq!(chunk.state(), ChunkState::Unloaded);
    }

    #[test]
    fn test_generation_applies_once() {
        let mut chunk = chunk();
        chunk.start_loading(0.0);
        chunk.finish_loading(ChunkHandles::new(), 0.0).unwrap();

        let second = ChunkHandles {
            render: vec![RenderObjectId(9)],
            ..Default::default()
        };
        let rejected = chunk.finish_loading(second.clone(), 1.0).unwrap_err();
        assert_eq!(rejected, second);
        assert!(chunk.handles().is_empty());
    }

    #[test]
    fn test_chunk_age() {
        let mut chunk = chunk();
        chunk.start_loading(0.0);
        chunk.finish_loading(ChunkHandles::new(), 10.0).unwrap();
        assert_eq!(chunk.age(15.0), 5.0);

        chunk.touch(14.0);
        assert_eq!(chunk.age(15.0), 1.0);
    }
}

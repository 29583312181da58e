//! Void Streaming - Observer-Driven World Chunks
//!
//! Keeps the cube-shaped chunks around a moving observer resident in a world
//! far too large to hold in memory, and populates each chunk with render,
//! physics and AI content owned by external subsystems.
//!
//! # Features
//!
//! - 128-bit chunk keys with round-trip checks, covering about ±2.2e15 world
//!   units at the default 1000 unit edge
//! - Load/unload hysteresis band to avoid thrashing at the boundary
//! - Bounded concurrent generation, inline or on a worker pool
//! - One-chunk-ahead prefetch along the observer's travel direction
//! - Staleness eviction of chunks nobody touches
//! - Every unload releases its subsystem handles before the record goes away
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                  WorldStreamer                    │
//! │  ┌──────────────┐ ┌────────────┐ ┌─────────────┐ │
//! │  │  Controller  │▶│ Predictive │▶│   Reaper    │ │
//! │  └──────┬───────┘ └────────────┘ └─────────────┘ │
//! │         │  ┌────────────┐  ┌──────────────────┐  │
//! │         ├─▶│ ChunkStore │  │  ChunkKeyCodec   │  │
//! │         │  └────────────┘  └──────────────────┘  │
//! └─────────┼────────────────────────────────────────┘
//!           ▼
//!   ┌───────────────────┐  jobs   ┌──────────────────┐
//!   │ GenerationExecutor│────────▶│ ContentGenerator │
//!   │ (inline / pool)   │◀────────│ render/physics/ai│
//!   └───────────────────┘ results └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use void_streaming::prelude::*;
//!
//! let headless = HeadlessSubsystems::new();
//! let mut streamer = WorldStreamer::with_subsystems(StreamerConfig::default(), headless.subsystems())?;
//! streamer.initialize()?;
//!
//! streamer.set_observer_position(DVec3::new(1.0e9, 0.0, -4.0e8))?;
//! for _ in 0..60 {
//!     streamer.update(1.0 / 60.0)?;
//! }
//!
//! println!("{} chunks ready", streamer.loaded_chunks().len());
//! streamer.shutdown();
//! ```

pub mod chunk;
pub mod config;
pub mod content;
pub mod controller;
pub mod coords;
pub mod error;
pub mod headless;
pub mod observer;
pub mod predictive;
pub mod reaper;
pub mod stats;
pub mod store;
pub mod streamer;
pub mod worker;

pub mod prelude {
    //! Common imports for world streaming
    pub use crate::chunk::{
        AiAgentId, ChunkHandles, ChunkState, LoadSource, PhysicsBodyId, RenderObjectId,
        UnloadReason, WorldChunk,
    };
    pub use crate::config::{StreamerConfig, StreamingSettings, WorldConfig};
    pub use crate::content::{
        AiSubsystem, ContentGenerator, ContentLayout, PhysicsSubsystem, RenderSubsystem,
        SubsystemContentGenerator, Subsystems,
    };
    pub use crate::controller::{StreamingController, TickReport};
    pub use crate::coords::{ChunkCoord, ChunkKey, ChunkKeyCodec};
    pub use crate::error::{
        GenerationError, ReleaseError, Result, StreamingError, SubsystemError, SubsystemKind,
    };
    pub use crate::headless::HeadlessSubsystems;
    pub use crate::stats::{StreamingHealth, StreamingStats};
    pub use crate::streamer::WorldStreamer;
    pub use glam::DVec3;
}

pub use prelude::*;

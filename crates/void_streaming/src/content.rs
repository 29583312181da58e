//! Content Collaborators
//!
//! The streaming system never builds meshes, bodies or agents itself. It
//! talks to the owning subsystems through the traits in this module, which
//! are handed to the streamer at construction time.
//!
//! ```text
//!        WorldStreamer
//!             │ Arc<dyn ContentGenerator>
//!             ▼
//!   SubsystemContentGenerator ── ContentLayout
//!     │           │          │
//!     ▼           ▼          ▼
//!  Render      Physics       AI
//! Subsystem   Subsystem   Subsystem
//! ```

use std::sync::Arc;

use glam::DVec3;

use crate::chunk::{AiAgentId, ChunkHandles, PhysicsBodyId, RenderObjectId};
use crate::config::WorldConfig;
use crate::error::{GenerationError, ReleaseError, SubsystemError};

/// Render subsystem contract
pub trait RenderSubsystem: Send + Sync {
    fn create_render_object(&self, chunk_origin: DVec3) -> Result<RenderObjectId, SubsystemError>;

    fn destroy_render_object(&self, id: RenderObjectId) -> Result<(), SubsystemError>;

    /// Receive world-wide settings
    fn configure_world(&self, _config: &WorldConfig) {}
}

/// Physics subsystem contract
pub trait PhysicsSubsystem: Send + Sync {
    fn create_physics_body(&self, chunk_origin: DVec3) -> Result<PhysicsBodyId, SubsystemError>;

    fn destroy_physics_body(&self, id: PhysicsBodyId) -> Result<(), SubsystemError>;

    /// Receive world-wide settings
    fn configure_world(&self, _config: &WorldConfig) {}
}

/// AI subsystem contract
pub trait AiSubsystem: Send + Sync {
    fn create_ai_agent(&self, chunk_origin: DVec3) -> Result<AiAgentId, SubsystemError>;

    fn destroy_ai_agent(&self, id: AiAgentId) -> Result<(), SubsystemError>;

    /// Receive world-wide settings
    fn configure_world(&self, _config: &WorldConfig) {}
}

/// Produces and destroys a chunk's external content
///
/// `generate` may run on a worker thread and must be safe to retry for the
/// same origin. `release` always runs on the streamer's tick thread and must
/// attempt every handle even when some fail.
pub trait ContentGenerator: Send + Sync {
    fn generate(&self, chunk_origin: DVec3) -> Result<ChunkHandles, GenerationError>;

    fn release(&self, handles: ChunkHandles) -> Result<(), ReleaseError>;

    /// Forward world-wide settings to the underlying subsystems
    fn configure_world(&self, _config: &WorldConfig) {}
}

/// The three collaborating subsystems
#[derive(Clone)]
pub struct Subsystems {
    pub render: Arc<dyn RenderSubsystem>,
    pub physics: Arc<dyn PhysicsSubsystem>,
    pub ai: Arc<dyn AiSubsystem>,
}

impl Subsystems {
    pub fn new(
        render: Arc<dyn RenderSubsystem>,
        physics: Arc<dyn PhysicsSubsystem>,
        ai: Arc<dyn AiSubsystem>,
    ) -> Self {
        Self { render, physics, ai }
    }
}

/// How much content each chunk receives from each subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentLayout {
    pub render_objects: usize,
    pub physics_bodies: usize,
    pub ai_agents: usize,
}

impl Default for ContentLayout {
    fn default() -> Self {
        Self {
            render_objects: 1,
            physics_bodies: 1,
            ai_agents: 1,
        }
    }
}

/// Generator that asks each subsystem for a fixed amount of content per chunk
pub struct SubsystemContentGenerator {
    subsystems: Subsystems,
    layout: ContentLayout,
}

impl SubsystemContentGenerator {
    pub fn new(subsystems: Subsystems) -> Self {
        Self::with_layout(subsystems, ContentLayout::default())
    }

    pub fn with_layout(subsystems: Subsystems, layout: ContentLayout) -> Self {
        Self { subsystems, layout }
    }

    pub fn layout(&self) -> ContentLayout {
        self.layout
    }

    fn create_all(&self, origin: DVec3, handles: &mut ChunkHandles) -> Result<(), SubsystemError> {
        for _ in 0..self.layout.render_objects {
            handles.render.push(self.subsystems.render.create_render_object(origin)?);
        }
        for _ in 0..self.layout.physics_bodies {
            handles.physics.push(self.subsystems.physics.create_physics_body(origin)?);
        }
        for _ in 0..self.layout.ai_agents {
            handles.ai.push(self.subsystems.ai.create_ai_agent(origin)?);
        }
        Ok(())
    }
}

impl ContentGenerator for SubsystemContentGenerator {
    fn generate(&self, chunk_origin: DVec3) -> Result<ChunkHandles, GenerationError> {
        let mut handles = ChunkHandles::new();
        if let Err(e) = self.create_all(chunk_origin, &mut handles) {
            // Partially built content would otherwise never be destroyed
            if let Err(rollback) = self.release(handles) {
                log::warn!(
                    "Rollback after failed generation at {:?} leaked: {}",
                    chunk_origin,
                    rollback
                );
            }
            return Err(e.into());
        }
        Ok(handles)
    }

    fn release(&self, handles: ChunkHandles) -> Result<(), ReleaseError> {
        let mut failures = Vec::new();

        for id in handles.ai {
            if let Err(e) = self.subsystems.ai.destroy_ai_agent(id) {
                failures.push(e);
            }
        }
        for id in handles.physics {
            if let Err(e) = self.subsystems.physics.destroy_physics_body(id) {
                failures.push(e);
            }
        }
        for id in handles.render {
            if let Err(e) = self.subsystems.render.destroy_render_object(id) {
                failures.push(e);
            }
        }

        ReleaseError::from_failures(failures)
    }

    fn configure_world(&self, config: &WorldConfig) {
        self.subsystems.render.configure_world(config);
        self.subsystems.physics.configure_world(config);
        self.subsystems.ai.configure_world(config);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SubsystemKind;
    use crate::headless::HeadlessSubsystems;

    #[test]
    fn test_generate_follows_layout() {
        let headless = HeadlessSubsystems::new();
        let generator = SubsystemContentGenerator::with_layout(
            headless.subsystems(),
            ContentLayout {
                render_objects: 3,
                physics_bodies: 2,
                ai_agents: 0,
            },
        );

        let handles = generator.generate(DVec3::ZERO).unwrap();
        assert_eq!(handles.render.len(), 3);
        assert_eq!(handles.physics.len(), 2);
        assert!(handles.ai.is_empty());
        assert_eq!(headless.live_handles(), 5);

        generator.release(handles).unwrap();
        assert_eq!(headless.live_handles(), 0);
    }

    #[test]
    fn test_failed_generation_rolls_back() {
        let headless = HeadlessSubsystems::new();
        headless.fail_creates(SubsystemKind::Ai, true);
        let generator = SubsystemContentGenerator::new(headless.subsystems());

        let err = generator.generate(DVec3::new(1000.0, 0.0, 0.0)).unwrap_err();
        assert!(matches!(err, GenerationError::Subsystem(_)));

        // Render object and physics body were created then destroyed
        assert_eq!(headless.created(), 2);
        assert_eq!(headless.destroyed(), 2);
        assert_eq!(headless.live_handles(), 0);
    }

    #[test]
    fn test_release_attempts_every_handle() {
        let headless = HeadlessSubsystems::new();
        let generator = SubsystemContentGenerator::new(headless.subsystems());
        let handles = generator.generate(DVec3::ZERO).unwrap();

        headless.fail_destroys(SubsystemKind::Physics, true);
        let err = generator.release(handles).unwrap_err();
        assert_eq!(err.failures.len(), 1);
        assert_eq!(err.failures[0].subsystem, SubsystemKind::Physics);

        // Render and AI handles were still released
        assert_eq!(headless.destroyed(), 2);
    }

    #[test]
    fn test_configure_world_reaches_all_subsystems() {
        let headless = HeadlessSubsystems::new();
        let generator = SubsystemContentGenerator::new(headless.subsystems());
        let config = WorldConfig {
            infinite_world: false,
            world_scale: 5e6,
        };

        generator.configure_world(&config);
        assert_eq!(headless.world_config_updates(), 3);
        assert_eq!(headless.world_config(), Some(config));
    }
}

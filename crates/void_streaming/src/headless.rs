//! Headless Subsystems
//!
//! In-memory render, physics and AI subsystems that hand out sequential
//! handles and record every create and destroy call. Used by the fly-through
//! tool and by tests to audit handle lifecycles without an engine attached.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use glam::DVec3;
use parking_lot::Mutex;

use crate::chunk::{AiAgentId, PhysicsBodyId, RenderObjectId};
use crate::config::WorldConfig;
use crate::content::{AiSubsystem, PhysicsSubsystem, RenderSubsystem, Subsystems};
use crate::error::{SubsystemError, SubsystemKind};

#[derive(Default)]
struct HeadlessState {
    live: HashMap<(SubsystemKind, u64), DVec3>,
    created: usize,
    destroyed: usize,
    invalid_destroys: usize,
    creates_by_origin: HashMap<[u64; 3], usize>,
    failing_creates: HashSet<SubsystemKind>,
    failing_destroys: HashSet<SubsystemKind>,
    failing_origins: HashSet<[u64; 3]>,
    world_config: Option<WorldConfig>,
    world_config_updates: usize,
}

/// Shared backend behind the three subsystem facades
#[derive(Default)]
pub struct HeadlessBackend {
    next_id: AtomicU64,
    state: Mutex<HeadlessState>,
}

fn origin_bits(origin: DVec3) -> [u64; 3] {
    [origin.x.to_bits(), origin.y.to_bits(), origin.z.to_bits()]
}

impl HeadlessBackend {
    fn create(&self, kind: SubsystemKind, origin: DVec3) -> Result<u64, SubsystemError> {
        let mut state = self.state.lock();
        let bits = origin_bits(origin);

        if state.failing_creates.contains(&kind) || state.failing_origins.contains(&bits) {
            return Err(SubsystemError::new(
                kind,
                format!("create refused at {:?}", origin),
            ));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        state.live.insert((kind, id), origin);
        state.created += 1;
        *state.creates_by_origin.entry(bits).or_insert(0) += 1;
        Ok(id)
    }

    fn destroy(&self, kind: SubsystemKind, id: u64) -> Result<(), SubsystemError> {
        let mut state = self.state.lock();

        if state.failing_destroys.contains(&kind) {
            return Err(SubsystemError::new(kind, format!("destroy refused for {}", id)));
        }
        if state.live.remove(&(kind, id)).is_none() {
            state.invalid_destroys += 1;
            return Err(SubsystemError::new(kind, format!("unknown handle {}", id)));
        }
        state.destroyed += 1;
        Ok(())
    }

    fn configure(&self, config: &WorldConfig) {
        let mut state = self.state.lock();
        state.world_config = Some(*config);
        state.world_config_updates += 1;
    }
}

impl RenderSubsystem for HeadlessBackend {
    fn create_render_object(&self, chunk_origin: DVec3) -> Result<RenderObjectId, SubsystemError> {
        self.create(SubsystemKind::Render, chunk_origin).map(RenderObjectId)
    }

    fn destroy_render_object(&self, id: RenderObjectId) -> Result<(), SubsystemError> {
        self.destroy(SubsystemKind::Render, id.0)
    }

    fn configure_world(&self, config: &WorldConfig) {
        self.configure(config);
    }
}

impl PhysicsSubsystem for HeadlessBackend {
    fn create_physics_body(&self, chunk_origin: DVec3) -> Result<PhysicsBodyId, SubsystemError> {
        self.create(SubsystemKind::Physics, chunk_origin).map(PhysicsBodyId)
    }

    fn destroy_physics_body(&self, id: PhysicsBodyId) -> Result<(), SubsystemError> {
        self.destroy(SubsystemKind::Physics, id.0)
    }

    fn configure_world(&self, config: &WorldConfig) {
        self.configure(config);
    }
}

impl AiSubsystem for HeadlessBackend {
    fn create_ai_agent(&self, chunk_origin: DVec3) -> Result<AiAgentId, SubsystemError> {
        self.create(SubsystemKind::Ai, chunk_origin).map(AiAgentId)
    }

    fn destroy_ai_agent(&self, id: AiAgentId) -> Result<(), SubsystemError> {
        self.destroy(SubsystemKind::Ai, id.0)
    }

    fn configure_world(&self, config: &WorldConfig) {
        self.configure(config);
    }
}

/// Recording stand-ins for the render, physics and AI subsystems
#[derive(Clone, Default)]
pub struct HeadlessSubsystems {
    backend: Arc<HeadlessBackend>,
}

impl HeadlessSubsystems {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subsystem bundle for injection into a streamer
    pub fn subsystems(&self) -> Subsystems {
        Subsystems::new(self.backend.clone(), self.backend.clone(), self.backend.clone())
    }

    /// Successful create calls
    pub fn created(&self) -> usize {
        self.backend.state.lock().created
    }

    /// Successful destroy calls
    pub fn destroyed(&self) -> usize {
        self.backend.state.lock().destroyed
    }

    /// Destroy calls for handles that were never created or already destroyed
    pub fn invalid_destroys(&self) -> usize {
        self.backend.state.lock().invalid_destroys
    }

    /// Handles created and not yet destroyed
    pub fn live_handles(&self) -> usize {
        self.backend.state.lock().live.len()
    }

    /// Successful create calls for content at the given chunk origin
    pub fn creates_at(&self, chunk_origin: DVec3) -> usize {
        let state = self.backend.state.lock();
        state
            .creates_by_origin
            .get(&origin_bits(chunk_origin))
            .copied()
            .unwrap_or(0)
    }

    /// Make every create on a subsystem fail (or succeed again)
    pub fn fail_creates(&self, kind: SubsystemKind, fail: bool) {
        let mut state = self.backend.state.lock();
        if fail {
            state.failing_creates.insert(kind);
        } else {
            state.failing_creates.remove(&kind);
        }
    }

    /// Make every destroy on a subsystem fail (or succeed again)
    pub fn fail_destroys(&self, kind: SubsystemKind, fail: bool) {
        let mut state = self.backend.state.lock();
        if fail {
            state.failing_destroys.insert(kind);
        } else {
            state.failing_destroys.remove(&kind);
        }
    }

    /// Make creates for one chunk origin fail (or succeed again)
    pub fn fail_origin(&self, chunk_origin: DVec3, fail: bool) {
        let mut state = self.backend.state.lock();
        let bits = origin_bits(chunk_origin);
        if fail {
            state.failing_origins.insert(bits);
        } else {
            state.failing_origins.remove(&bits);
        }
    }

    /// Last world configuration received
    pub fn world_config(&self) -> Option<WorldConfig> {
        self.backend.state.lock().world_config
    }

    /// Number of `configure_world` calls across all three subsystems
    pub fn world_config_updates(&self) -> usize {
        self.backend.state.lock().world_config_updates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_destroy_bookkeeping() {
        let headless = HeadlessSubsystems::new();
        let subsystems = headless.subsystems();

        let render = subsystems.render.create_render_object(DVec3::ZERO).unwrap();
        let body = subsystems.physics.create_physics_body(DVec3::ZERO).unwrap();
        assert_ne!(render.0, body.0);
        assert_eq!(headless.live_handles(), 2);
        assert_eq!(headless.creates_at(DVec3::ZERO), 2);

        subsystems.render.destroy_render_object(render).unwrap();
        assert!(subsystems.render.destroy_render_object(render).is_err());
        assert_eq!(headless.invalid_destroys(), 1);
        assert_eq!(headless.destroyed(), 1);
    }

    #[test]
    fn test_handles_are_per_subsystem() {
        let headless = HeadlessSubsystems::new();
        let subsystems = headless.subsystems();

        let body = subsystems.physics.create_physics_body(DVec3::ZERO).unwrap();
        // A physics id is not a render handle
        assert!(subsystems.render.destroy_render_object(RenderObjectId(body.0)).is_err());
        assert!(subsystems.physics.destroy_physics_body(body).is_ok());
    }

    #[test]
    fn test_failing_origin() {
        let headless = HeadlessSubsystems::new();
        let subsystems = headless.subsystems();
        let origin = DVec3::new(2000.0, 0.0, 0.0);

        headless.fail_origin(origin, true);
        assert!(subsystems.ai.create_ai_agent(origin).is_err());
        assert!(subsystems.ai.create_ai_agent(DVec3::ZERO).is_ok());

        headless.fail_origin(origin, false);
        assert!(subsystems.ai.create_ai_agent(origin).is_ok());
    }
}

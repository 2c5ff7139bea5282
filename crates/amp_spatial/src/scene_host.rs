//! The scene-side half of the engine boundary (§6): mesh instance
//! spawn/despawn and per-instance shader parameters for terrain tiles.
//! Paired with [`crate::texture_pool::TextureHost`] for the texture
//! side of the same boundary. A real host implements this against
//! whatever scene graph the embedding engine uses; tests use the
//! recording double below.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use glam::Vec2;

use crate::mesh_catalog::TileMesh;

/// Opaque handle to a spawned mesh instance, scoped to one `SceneHost`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId(pub u64);

/// A typed value for `set_instance_parameter`/`set_global_shader_parameter`.
#[derive(Debug, Clone, Copy)]
pub enum InstanceParam {
    Float(f32),
    UInt(u32),
    Vec2(Vec2),
}

/// §6's scene-graph surface: `spawnMeshInstance`, `despawnMeshInstance`,
/// `setInstanceParameter`, plus the global shader-parameter hook used
/// for engine-wide state (time of day, wind) that isn't per-chunk.
pub trait SceneHost: Send + Sync {
    fn spawn_mesh_instance(&self, mesh: Arc<TileMesh>) -> InstanceId;
    fn despawn_mesh_instance(&self, id: InstanceId);
    fn set_instance_parameter(&self, id: InstanceId, name: &str, value: InstanceParam);

    /// Engine-wide shader state, not tied to any one instance. No-op
    /// default: most hosts implementing this trait for tests don't care.
    fn set_global_shader_parameter(&self, _name: &str, _value: InstanceParam) {}
}

/// Test double that hands out monotonically increasing ids and records
/// which are currently spawned, without touching a renderer.
#[derive(Default)]
pub struct RecordingSceneHost {
    next_id: AtomicU64,
    pub spawned: Mutex<Vec<InstanceId>>,
}

impl RecordingSceneHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawned_count(&self) -> usize {
        self.spawned.lock().expect("recording scene host poisoned").len()
    }
}

impl SceneHost for RecordingSceneHost {
    fn spawn_mesh_instance(&self, _mesh: Arc<TileMesh>) -> InstanceId {
        let id = InstanceId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.spawned.lock().expect("recording scene host poisoned").push(id);
        id
    }

    fn despawn_mesh_instance(&self, id: InstanceId) {
        self.spawned
            .lock()
            .expect("recording scene host poisoned")
            .retain(|&x| x != id);
    }

    fn set_instance_parameter(&self, _id: InstanceId, _name: &str, _value: InstanceParam) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mesh() -> Arc<TileMesh> {
        Arc::new(TileMesh {
            positions: Vec::new(),
            uvs: Vec::new(),
            indices: Vec::new(),
        })
    }

    #[test]
    fn spawn_ids_are_unique_and_tracked() {
        let host = RecordingSceneHost::new();
        let a = host.spawn_mesh_instance(mesh());
        let b = host.spawn_mesh_instance(mesh());
        assert_ne!(a, b);
        assert_eq!(host.spawned_count(), 2);
    }

    #[test]
    fn despawn_removes_the_instance() {
        let host = RecordingSceneHost::new();
        let a = host.spawn_mesh_instance(mesh());
        host.despawn_mesh_instance(a);
        assert_eq!(host.spawned_count(), 0);
    }
}

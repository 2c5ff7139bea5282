//! Per-layer chunk storage (§4.1, C1).
//!
//! Two maps, one lock. `by_key` answers "is this exact (index, LOD)
//! loaded"; `by_index` answers "what is the newest chunk at this
//! index, at any LOD". Invariant 1 requires both to agree on a given
//! chunk's (bounds, LOD), which is why a single `Mutex` guards both
//! rather than two independently-locked maps.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use amp_core::{Result, WorldgenError};
use glam::Vec2;

use crate::chunk::{ChunkArtifact, ChunkIndex, ChunkKey};

struct Inner<C> {
    by_key: HashMap<ChunkKey, Arc<C>>,
    by_index: HashMap<ChunkIndex, Arc<C>>,
}

impl<C> Default for Inner<C> {
    fn default() -> Self {
        Self {
            by_key: HashMap::new(),
            by_index: HashMap::new(),
        }
    }
}

/// Per-layer registry of loaded chunks, keyed both by `ChunkKey` (exact
/// LOD) and by `ChunkIndex` (newest LOD wins).
pub struct ChunkRegistry<C: ChunkArtifact> {
    inner: Mutex<Inner<C>>,
}

impl<C: ChunkArtifact> Default for ChunkRegistry<C> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }
}

impl<C: ChunkArtifact> ChunkRegistry<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a newly-built chunk. Replaces the by-index entry
    /// unconditionally (newest wins) and adds the by-key entry.
    pub fn insert(&self, chunk: Arc<C>) {
        let key = chunk.key();
        let index = key.index;
        let mut inner = self.inner.lock().expect("chunk registry poisoned");
        inner.by_index.insert(index, chunk.clone());
        inner.by_key.insert(key, chunk);
    }

    /// Membership test without loading the chunk.
    pub fn has(&self, key: ChunkKey) -> bool {
        let inner = self.inner.lock().expect("chunk registry poisoned");
        inner.by_key.contains_key(&key)
    }

    /// The most recently inserted chunk at `index`, regardless of LOD.
    pub fn latest_by_index(&self, index: ChunkIndex) -> Option<Arc<C>> {
        let inner = self.inner.lock().expect("chunk registry poisoned");
        inner.by_index.get(&index).cloned()
    }

    /// The exact chunk at `key`, if loaded at that LOD.
    pub fn get(&self, key: ChunkKey) -> Option<Arc<C>> {
        let inner = self.inner.lock().expect("chunk registry poisoned");
        inner.by_key.get(&key).cloned()
    }

    /// The newest chunk whose grid cell contains `world_pos`, per §6's
    /// `getChunkAtWorldPosition`. Surfaces `WorldgenError::MissingChunk`
    /// rather than `None` so callers across the crate's query surface
    /// get one consistent "not yet available" error to match on.
    pub fn chunk_at_world_position(&self, world_pos: Vec2, chunk_size: f32) -> Result<Arc<C>> {
        let index = ChunkIndex::containing(world_pos, chunk_size);
        self.latest_by_index(index).ok_or_else(|| {
            WorldgenError::missing_chunk(format!("no chunk at index {index:?} covering {world_pos:?}")).into()
        })
    }

    /// Snapshot of every loaded (index, lod) key, for cleanup passes
    /// and debug introspection.
    pub fn loaded_keys(&self) -> Vec<ChunkKey> {
        let inner = self.inner.lock().expect("chunk registry poisoned");
        inner.by_key.keys().copied().collect()
    }

    /// Snapshot of every chunk currently reachable from the by-index
    /// map (the "what's actually visible to readers" view).
    pub fn loaded_chunks(&self) -> Vec<Arc<C>> {
        let inner = self.inner.lock().expect("chunk registry poisoned");
        inner.by_index.values().cloned().collect()
    }

    /// Unload the given keys. Per §4.1: each key must already be
    /// present (programmer error otherwise); the by-index entry is
    /// only removed if it still points at the exact instance being
    /// unloaded, preserving a newer-LOD replacement that has already
    /// taken over the by-index slot.
    pub fn unload(&self, keys: &[ChunkKey]) {
        let mut inner = self.inner.lock().expect("chunk registry poisoned");
        for key in keys {
            let removed = inner
                .by_key
                .remove(key)
                .unwrap_or_else(|| panic!("unload of non-loaded chunk key {key:?}"));

            if let Some(current) = inner.by_index.get(&key.index) {
                if Arc::ptr_eq(current, &removed) {
                    inner.by_index.remove(&key.index);
                }
            }
            drop(removed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use amp_math::rect2::Rect2;

    struct TestChunk {
        key: ChunkKey,
    }

    impl ChunkArtifact for TestChunk {
        fn key(&self) -> ChunkKey {
            self.key
        }
        fn bounds(&self) -> Rect2 {
            self.key.index.bounds(100.0)
        }
    }

    #[test]
    fn insert_and_lookup() {
        let registry = ChunkRegistry::<TestChunk>::new();
        let key = ChunkKey::new(ChunkIndex::new(0, 0), 0);
        registry.insert(Arc::new(TestChunk { key }));

        assert!(registry.has(key));
        assert!(registry.latest_by_index(key.index).is_some());
    }

    #[test]
    fn newer_lod_replaces_by_index_but_both_coexist_by_key() {
        let registry = ChunkRegistry::<TestChunk>::new();
        let index = ChunkIndex::new(2, 2);
        let old_key = ChunkKey::new(index, 0);
        let new_key = ChunkKey::new(index, 2);

        registry.insert(Arc::new(TestChunk { key: old_key }));
        registry.insert(Arc::new(TestChunk { key: new_key }));

        assert!(registry.has(old_key));
        assert!(registry.has(new_key));
        assert_eq!(registry.latest_by_index(index).unwrap().key(), new_key);
    }

    #[test]
    fn unload_preserves_newer_by_index_replacement() {
        let registry = ChunkRegistry::<TestChunk>::new();
        let index = ChunkIndex::new(0, 0);
        let old_key = ChunkKey::new(index, 0);
        let new_key = ChunkKey::new(index, 1);

        registry.insert(Arc::new(TestChunk { key: old_key }));
        registry.insert(Arc::new(TestChunk { key: new_key }));

        // Unloading the stale LOD-0 chunk must not evict the LOD-1
        // chunk that has already taken over the by-index slot.
        registry.unload(&[old_key]);

        assert!(!registry.has(old_key));
        assert!(registry.has(new_key));
        assert_eq!(registry.latest_by_index(index).unwrap().key(), new_key);
    }

    #[test]
    fn unload_clears_by_index_when_it_was_the_newest() {
        let registry = ChunkRegistry::<TestChunk>::new();
        let key = ChunkKey::new(ChunkIndex::new(0, 0), 0);
        registry.insert(Arc::new(TestChunk { key }));

        registry.unload(&[key]);

        assert!(!registry.has(key));
        assert!(registry.latest_by_index(key.index).is_none());
    }

    #[test]
    #[should_panic(expected = "unload of non-loaded chunk key")]
    fn unload_asserts_presence() {
        let registry = ChunkRegistry::<TestChunk>::new();
        registry.unload(&[ChunkKey::new(ChunkIndex::new(0, 0), 0)]);
    }

    #[test]
    fn chunk_at_world_position_finds_the_covering_chunk() {
        let registry = ChunkRegistry::<TestChunk>::new();
        let key = ChunkKey::new(ChunkIndex::new(0, 0), 0);
        registry.insert(Arc::new(TestChunk { key }));

        let found = registry
            .chunk_at_world_position(amp_math::Vec2::new(10.0, 10.0), 100.0)
            .unwrap();
        assert_eq!(found.key(), key);
    }

    #[test]
    fn chunk_at_world_position_reports_missing_chunk() {
        let registry = ChunkRegistry::<TestChunk>::new();
        let err = registry
            .chunk_at_world_position(amp_math::Vec2::new(500.0, 500.0), 100.0)
            .unwrap_err();
        assert!(matches!(
            err,
            amp_core::Error::Worldgen(amp_core::WorldgenError::MissingChunk { .. })
        ));
    }
}

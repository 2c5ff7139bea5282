//! The terrain LOD layer (§4.2/§4.3, C2/C3): one adaptive quad-tree per
//! chunk, re-subdivided toward the camera every tick, with its leaves
//! materialized into scene mesh instances and texture-array slots.
//!
//! Unlike the other layers, a terrain chunk's *build* is cheap (an
//! empty quad-tree) and its *refresh* is where the real per-tick work
//! happens: every currently-loaded chunk re-subdivides toward the
//! current reference point regardless of whether it was just built,
//! since the camera moves every tick but chunks are only (re)built
//! when they enter or leave render distance.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use amp_core::Result;
use amp_math::rect2::Rect2;
use async_trait::async_trait;
use glam::Vec2;

use crate::chunk::{ChunkArtifact, ChunkIndex, ChunkKey, Lod};
use crate::layers::heightmap::HeightmapLayer;
use crate::layers::road::RoadLayer;
use crate::manager::LayerNode;
use crate::mesh_catalog::GridMeshCatalog;
use crate::quadtree::{AdaptiveQuadTree, LeafInfo, PowCurve};
use crate::registry::ChunkRegistry;
use crate::scene_host::{InstanceParam, SceneHost};
use crate::texture_pool::{TextureSlotHandle, TextureSlotPool};

pub struct TerrainChunk {
    key: ChunkKey,
    bounds: Rect2,
    tree: Mutex<AdaptiveQuadTree>,
}

impl ChunkArtifact for TerrainChunk {
    fn key(&self) -> ChunkKey {
        self.key
    }
    fn bounds(&self) -> Rect2 {
        self.bounds
    }
}

/// Bit-cast wrapper so a leaf's `Rect2` (all `f32`) can key a
/// `HashMap`. Two leaves with identical bounds are always the same
/// tile, so exact bit equality (rather than an epsilon comparison) is
/// the correct notion of identity here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct RectKey(u32, u32, u32, u32);

impl From<Rect2> for RectKey {
    fn from(r: Rect2) -> Self {
        RectKey(
            r.position.x.to_bits(),
            r.position.y.to_bits(),
            r.size.x.to_bits(),
            r.size.y.to_bits(),
        )
    }
}

struct MaterializedTile {
    instance: crate::scene_host::InstanceId,
    _texture_slot: Option<TextureSlotHandle>,
}

pub struct TerrainLayer {
    pub registry: Arc<ChunkRegistry<TerrainChunk>>,
    pub heightmap: Arc<HeightmapLayer>,
    pub road: Option<Arc<RoadLayer>>,
    pub mesh_catalog: Arc<GridMeshCatalog>,
    pub scene_host: Arc<dyn SceneHost>,
    pub texture_pools: Vec<Arc<TextureSlotPool>>,
    pub chunk_size: f32,
    pub max_lods: u32,
    pub lod_curve_exponent: f32,
    instances: Mutex<HashMap<ChunkKey, HashMap<RectKey, MaterializedTile>>>,
}

impl TerrainLayer {
    pub fn new(
        registry: Arc<ChunkRegistry<TerrainChunk>>,
        heightmap: Arc<HeightmapLayer>,
        road: Option<Arc<RoadLayer>>,
        mesh_catalog: Arc<GridMeshCatalog>,
        scene_host: Arc<dyn SceneHost>,
        texture_pools: Vec<Arc<TextureSlotPool>>,
        chunk_size: f32,
        max_lods: u32,
        lod_curve_exponent: f32,
    ) -> Self {
        Self {
            registry,
            heightmap,
            road,
            mesh_catalog,
            scene_host,
            texture_pools,
            chunk_size,
            max_lods,
            lod_curve_exponent,
            instances: Mutex::new(HashMap::new()),
        }
    }

    fn texture_pool_for(&self, lod: Lod) -> Option<&Arc<TextureSlotPool>> {
        self.texture_pools.get(lod as usize)
    }

    /// Re-subdivide one chunk's tree toward `reference` and bring its
    /// spawned mesh instances in line with the resulting leaf set.
    fn refresh_chunk(&self, chunk: &TerrainChunk, reference: Vec2) {
        let leaves: Vec<LeafInfo> = {
            let mut tree = chunk.tree.lock().expect("terrain quad-tree poisoned");
            tree.reset();
            tree.insert_reference(reference);
            tree.balance();
            tree.leaf_info()
        };

        let mut instances = self.instances.lock().expect("terrain instance map poisoned");
        let existing = instances.entry(chunk.key()).or_default();

        let mut desired: HashMap<RectKey, LeafInfo> = HashMap::new();
        for leaf in &leaves {
            desired.insert(RectKey::from(leaf.bounds), *leaf);
        }

        let stale: Vec<RectKey> = existing.keys().copied().filter(|k| !desired.contains_key(k)).collect();
        for key in stale {
            if let Some(tile) = existing.remove(&key) {
                self.scene_host.despawn_mesh_instance(tile.instance);
            }
        }

        for (key, leaf) in &desired {
            if existing.contains_key(key) {
                continue;
            }
            if let Some(tile) = self.materialize_leaf(*leaf) {
                existing.insert(*key, tile);
            }
        }
    }

    fn materialize_leaf(&self, leaf: LeafInfo) -> Option<MaterializedTile> {
        let flags = GridMeshCatalog::flags_for_neighbors(leaf.lod, leaf.neighbor_lods);
        let mesh = self.mesh_catalog.mesh_for(flags);
        let instance = self.scene_host.spawn_mesh_instance(mesh);

        let texture_slot = self.texture_pool_for(leaf.lod).and_then(|pool| pool.acquire());

        let center = leaf.bounds.center();
        if let Some(height) = self.heightmap.sample(center, self.heightmap.chunk_size) {
            self.scene_host
                .set_instance_parameter(instance, "reference_height", InstanceParam::Float(height));
        }
        if let Some(road) = &self.road {
            if let Some(road_chunk) = road
                .registry
                .get(ChunkKey::new(ChunkIndex::containing(center, road.chunk_size), Lod::default()))
            {
                self.scene_host
                    .set_instance_parameter(instance, "road_slot", InstanceParam::UInt(road_chunk.slot()));
            }
        }

        Some(MaterializedTile {
            instance,
            _texture_slot: texture_slot,
        })
    }
}

#[async_trait]
impl LayerNode for TerrainLayer {
    fn name(&self) -> &'static str {
        "terrain"
    }

    fn chunk_size(&self) -> f32 {
        self.chunk_size
    }

    fn padding(&self) -> f32 {
        0.0
    }

    fn lod_aware(&self) -> bool {
        true
    }

    fn is_loaded(&self, index: ChunkIndex, lod: Lod) -> bool {
        self.registry.has(ChunkKey::new(index, lod))
    }

    /// Allocate an empty chunk at `(index, lod)`. The substantive
    /// per-tick quad-tree work lives in `refresh`, not here: a chunk
    /// that was just built still needs the same reset/insert/balance
    /// pass every other loaded chunk gets this tick.
    async fn build_and_store(&self, index: ChunkIndex, lod: Lod) -> Result<()> {
        let bounds = index.bounds(self.chunk_size);
        let tree = AdaptiveQuadTree::new(
            bounds,
            self.max_lods,
            Box::new(PowCurve {
                exponent: self.lod_curve_exponent,
            }),
        );
        self.registry.insert(Arc::new(TerrainChunk {
            key: ChunkKey::new(index, lod),
            bounds,
            tree: Mutex::new(tree),
        }));
        Ok(())
    }

    fn unload(&self, index: ChunkIndex, lod: Lod) {
        let key = ChunkKey::new(index, lod);
        if let Some(tiles) = self.instances.lock().expect("terrain instance map poisoned").remove(&key) {
            for tile in tiles.into_values() {
                self.scene_host.despawn_mesh_instance(tile.instance);
            }
        }
        self.registry.unload(&[key]);
    }

    fn loaded_keys(&self) -> Vec<ChunkKey> {
        self.registry.loaded_keys()
    }

    fn refresh(&self, reference: Vec2) {
        for chunk in self.registry.loaded_chunks() {
            self.refresh_chunk(&chunk, reference);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh_catalog::GridMeshCatalog;
    use crate::scene_host::RecordingSceneHost;
    use crate::texture_pool::{TextureFormat, TextureHost, TextureImage};

    struct NullHost;
    impl TextureHost for NullHost {
        fn upload_layer(&self, _slot: u32, _image: &TextureImage) {}
    }

    fn heightmap_layer(chunk_size: f32) -> Arc<HeightmapLayer> {
        Arc::new(HeightmapLayer {
            registry: Arc::new(ChunkRegistry::new()),
            triangulation_registry: Arc::new(ChunkRegistry::new()),
            chunk_size,
            dimension: 8,
            triangulation_chunk_size: chunk_size,
            biomes: vec![],
        })
    }

    fn layer() -> TerrainLayer {
        let chunk_size = 256.0;
        let pool = Arc::new(TextureSlotPool::new(64, (64, 64), TextureFormat::Rgba8, Arc::new(NullHost)));
        TerrainLayer::new(
            Arc::new(ChunkRegistry::new()),
            heightmap_layer(chunk_size),
            None,
            Arc::new(GridMeshCatalog::new(4, chunk_size)),
            Arc::new(RecordingSceneHost::new()),
            vec![pool.clone(), pool.clone(), pool.clone(), pool],
            chunk_size,
            3,
            1.0,
        )
    }

    #[tokio::test]
    async fn build_then_refresh_spawns_mesh_instances_for_every_leaf() {
        let layer = layer();
        layer.build_and_store(ChunkIndex::new(0, 0), 0).await.unwrap();
        assert!(layer.is_loaded(ChunkIndex::new(0, 0), 0));

        layer.refresh(Vec2::new(10.0, 10.0));

        let chunk = layer.registry.latest_by_index(ChunkIndex::new(0, 0)).unwrap();
        let leaf_count = chunk.tree.lock().unwrap().leaves().len();
        assert!(leaf_count >= 1);

        let instances = layer.instances.lock().unwrap();
        let tile_count = instances.get(&ChunkKey::new(ChunkIndex::new(0, 0), 0)).unwrap().len();
        assert_eq!(tile_count, leaf_count);
    }

    #[tokio::test]
    async fn unload_despawns_every_materialized_tile() {
        let layer = layer();
        layer.build_and_store(ChunkIndex::new(0, 0), 0).await.unwrap();
        layer.refresh(Vec2::new(10.0, 10.0));

        layer.unload(ChunkIndex::new(0, 0), 0);
        assert!(!layer.is_loaded(ChunkIndex::new(0, 0), 0));
        assert!(layer.instances.lock().unwrap().get(&ChunkKey::new(ChunkIndex::new(0, 0), 0)).is_none());
    }
}

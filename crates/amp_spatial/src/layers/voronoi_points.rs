//! Voronoi site generation, the leaf layer every biome/terrain layer
//! above it ultimately depends on (§4.5.1, C5.1).

use std::sync::Arc;

use amp_core::Result;
use amp_math::rect2::Rect2;
use async_trait::async_trait;
use glam::Vec2;

use crate::chunk::{ChunkArtifact, ChunkIndex, ChunkKey, Lod};
use crate::manager::LayerNode;
use crate::noise_fields::{jittered_point, rng_for_chunk};
use crate::registry::ChunkRegistry;

/// Distinguishes this layer's PRNG stream from other layers that also
/// seed a chunk-indexed PRNG.
const LAYER_SALT: u64 = 0x564F_524F_4E4F_4953; // "VORONOIS"

pub struct VoronoiPointsChunk {
    key: ChunkKey,
    bounds: Rect2,
    pub sites: Vec<Vec2>,
}

impl ChunkArtifact for VoronoiPointsChunk {
    fn key(&self) -> ChunkKey {
        self.key
    }
    fn bounds(&self) -> Rect2 {
        self.bounds
    }
}

/// Build the chunk at `index`: a `points_per_side x points_per_side`
/// grid of cells, one jittered site per cell.
pub fn build(index: ChunkIndex, chunk_size: f32, points_per_side: u32) -> VoronoiPointsChunk {
    let bounds = index.bounds(chunk_size);
    let mut rng = rng_for_chunk(index, LAYER_SALT);
    let cell_size = chunk_size / points_per_side as f32;

    let mut sites = Vec::with_capacity((points_per_side * points_per_side) as usize);
    for cy in 0..points_per_side {
        for cx in 0..points_per_side {
            let cell_center = bounds.position
                + Vec2::new(
                    (cx as f32 + 0.5) * cell_size,
                    (cy as f32 + 0.5) * cell_size,
                );
            sites.push(jittered_point(&mut rng, cell_center, cell_size));
        }
    }

    VoronoiPointsChunk {
        key: ChunkKey::new(index, Lod::default()),
        bounds,
        sites,
    }
}

/// Wraps [`build`] as the DAG's root layer: it has no dependencies of
/// its own, so `padding()` is never consulted by anything above it in
/// the demand propagation pass, but still matters for what it reports
/// to layers that depend on it via its own chunk tiling.
pub struct VoronoiPointsLayer {
    pub registry: Arc<ChunkRegistry<VoronoiPointsChunk>>,
    pub chunk_size: f32,
    pub points_per_chunk_side: u32,
}

#[async_trait]
impl LayerNode for VoronoiPointsLayer {
    fn name(&self) -> &'static str {
        "voronoi_points"
    }

    fn chunk_size(&self) -> f32 {
        self.chunk_size
    }

    fn padding(&self) -> f32 {
        0.0
    }

    fn lod_aware(&self) -> bool {
        false
    }

    fn is_loaded(&self, index: ChunkIndex, lod: Lod) -> bool {
        self.registry.has(ChunkKey::new(index, lod))
    }

    async fn build_and_store(&self, index: ChunkIndex, _lod: Lod) -> Result<()> {
        let chunk_size = self.chunk_size;
        let points_per_side = self.points_per_chunk_side;
        let registry = self.registry.clone();

        let chunk = tokio::task::spawn_blocking(move || build(index, chunk_size, points_per_side))
            .await
            .map_err(|e| amp_core::Error::internal(format!("voronoi-points build task panicked: {e}")))?;

        registry.insert(Arc::new(chunk));
        Ok(())
    }

    fn unload(&self, index: ChunkIndex, lod: Lod) {
        self.registry.unload(&[ChunkKey::new(index, lod)]);
    }

    fn loaded_keys(&self) -> Vec<ChunkKey> {
        self.registry.loaded_keys()
    }
}

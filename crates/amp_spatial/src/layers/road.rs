//! Road-proximity signed-distance-field layer (§4.5.4, C5.4).
//!
//! Builds a per-chunk distance field over the heightmap's slope
//! (steeper terrain reads as "further from buildable road surface"),
//! uploaded into a bounded per-LOD texture-array slot the same way
//! the terrain layer's normal/height textures are. A chunk whose LOD
//! has no free slot this tick is skipped rather than forced: the
//! layer manager will retry it on a later tick once something frees
//! up, same as any other pool-exhaustion stall (§4.4, C4).

use std::sync::Arc;

use amp_core::Result;
use amp_math::rect2::Rect2;
use async_trait::async_trait;
use glam::Vec2;
use rayon::prelude::*;

use crate::bilinear::BilinearField;
use crate::chunk::{ChunkArtifact, ChunkIndex, ChunkKey, Lod};
use crate::layers::heightmap::HeightmapLayer;
use crate::manager::LayerNode;
use crate::registry::ChunkRegistry;
use crate::texture_pool::{TextureFormat, TextureImage, TextureSlotHandle, TextureSlotPool};

pub struct RoadChunk {
    key: ChunkKey,
    bounds: Rect2,
    sdf: BilinearField,
    slot_handle: TextureSlotHandle,
}

impl ChunkArtifact for RoadChunk {
    fn key(&self) -> ChunkKey {
        self.key
    }
    fn bounds(&self) -> Rect2 {
        self.bounds
    }
}

impl RoadChunk {
    pub fn sample(&self, world_pos: Vec2) -> f32 {
        self.sdf.sample(world_pos)
    }

    pub fn slot(&self) -> u32 {
        self.slot_handle.slot()
    }
}

/// Minimal IEEE 754 binary16 encoder (round-to-nearest, no subnormal
/// or infinity handling beyond clamping) so the SDF can be uploaded as
/// `Rg16Float` without pulling in a half-precision-float crate the
/// rest of this workspace has no other use for.
fn f32_to_f16_bits(v: f32) -> u16 {
    let bits = v.to_bits();
    let sign = ((bits >> 16) & 0x8000) as u16;
    let exp = ((bits >> 23) & 0xff) as i32 - 127 + 15;
    let mantissa = bits & 0x7f_ffff;

    if exp <= 0 {
        sign
    } else if exp >= 0x1f {
        sign | 0x7c00
    } else {
        sign | ((exp as u16) << 10) | ((mantissa >> 13) as u16)
    }
}

fn encode_rg16(values: &[f32]) -> Vec<u8> {
    let mut pixels = Vec::with_capacity(values.len() * 4);
    for &v in values {
        let bits = f32_to_f16_bits(v).to_le_bytes();
        pixels.extend_from_slice(&bits);
        pixels.extend_from_slice(&bits);
    }
    pixels
}

/// Build the road SDF chunk at `index`, sampling the heightmap's slope
/// (gradient magnitude) across a `dimension x dimension` grid and
/// uploading it into a slot from `pool`. Returns `Ok(None)` (not an
/// error) if `pool` has no free slot this tick.
pub fn build(
    index: ChunkIndex,
    chunk_size: f32,
    dimension: u32,
    heightmap_chunk_size: f32,
    heightmap: &ChunkRegistry<crate::layers::heightmap::HeightmapChunk>,
    pool: &Arc<TextureSlotPool>,
) -> Result<Option<RoadChunk>> {
    let bounds = index.bounds(chunk_size);

    let Some(slot) = pool.acquire() else {
        log::warn!("road chunk {index:?}: texture slot pool exhausted, deferring build");
        return Ok(None);
    };

    let heightmap_chunks: Vec<Arc<crate::layers::heightmap::HeightmapChunk>> =
        ChunkIndex::covering(bounds, heightmap_chunk_size)
            .into_iter()
            .filter_map(|hm_index| heightmap.get(ChunkKey::new(hm_index, Lod::default())))
            .collect();

    let d = dimension as f32;
    let mut values = vec![0.0f32; (dimension * dimension) as usize];
    values.par_iter_mut().enumerate().for_each(|(i, value)| {
        let x = (i as u32) % dimension;
        let y = (i as u32) / dimension;
        let u = (x as f32 + 0.5) / d;
        let v = (y as f32 + 0.5) / d;
        let world = bounds.position + Vec2::new(u, v) * bounds.size;

        let slope = heightmap_chunks
            .iter()
            .find_map(|chunk| {
                let (_, gradient) = chunk.sample_with_gradient(world, 1.0);
                Some(gradient.length())
            })
            .unwrap_or_else(|| {
                log::warn!("road chunk {index:?}: no heightmap covers pixel at {world:?}, defaulting slope to 0.0");
                0.0
            });

        *value = slope;
    });

    let image = TextureImage {
        width: dimension,
        height: dimension,
        format: TextureFormat::Rg16Float,
        pixels: encode_rg16(&values),
    };
    slot.upload(&image);

    Ok(Some(RoadChunk {
        key: ChunkKey::new(index, Lod::default()),
        bounds,
        sdf: BilinearField::new(dimension, bounds, values),
        slot_handle: slot,
    }))
}

pub struct RoadLayer {
    pub registry: Arc<ChunkRegistry<RoadChunk>>,
    pub heightmap: Arc<HeightmapLayer>,
    pub chunk_size: f32,
    pub dimension: u32,
    pub heightmap_chunk_size: f32,
    pub pool: Arc<TextureSlotPool>,
}

#[async_trait]
impl LayerNode for RoadLayer {
    fn name(&self) -> &'static str {
        "road"
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
        let dimension = self.dimension;
        let heightmap_chunk_size = self.heightmap_chunk_size;
        let heightmap_registry = self.heightmap.registry.clone();
        let pool = self.pool.clone();

        let built = tokio::task::spawn_blocking(move || {
            build(index, chunk_size, dimension, heightmap_chunk_size, &heightmap_registry, &pool)
        })
        .await
        .map_err(|e| amp_core::Error::internal(format!("road build task panicked: {e}")))??;

        if let Some(chunk) = built {
            self.registry.insert(Arc::new(chunk));
        }
        Ok(())
    }

    fn unload(&self, index: ChunkIndex, lod: Lod) {
        self.registry.unload(&[ChunkKey::new(index, lod)]);
    }

    fn loaded_keys(&self) -> Vec<ChunkKey> {
        self.registry.loaded_keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::heightmap::HeightmapChunk;
    use crate::texture_pool::TextureHost;

    struct NullHost;
    impl TextureHost for NullHost {
        fn upload_layer(&self, _slot: u32, _image: &TextureImage) {}
    }

    fn flat_heightmap(index: ChunkIndex, chunk_size: f32) -> Arc<HeightmapChunk> {
        let bounds = index.bounds(chunk_size);
        let field = BilinearField::from_fn(8, bounds, |_| 10.0);
        Arc::new(HeightmapChunk {
            key: ChunkKey::new(index, 0),
            bounds,
            height: field,
        })
    }

    #[test]
    fn build_returns_none_when_pool_is_exhausted() {
        let pool = Arc::new(TextureSlotPool::new(0, (16, 16), TextureFormat::Rg16Float, Arc::new(NullHost)));
        let heightmap = ChunkRegistry::new();
        let result = build(ChunkIndex::new(0, 0), 256.0, 16, 256.0, &heightmap, &pool).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn build_produces_a_chunk_when_a_slot_is_available() {
        let pool = Arc::new(TextureSlotPool::new(1, (16, 16), TextureFormat::Rg16Float, Arc::new(NullHost)));
        let heightmap = ChunkRegistry::new();
        heightmap.insert(flat_heightmap(ChunkIndex::new(0, 0), 256.0));

        let chunk = build(ChunkIndex::new(0, 0), 256.0, 16, 256.0, &heightmap, &pool)
            .unwrap()
            .expect("a slot was available");

        // Flat terrain: slope should read ~0 everywhere.
        assert!(chunk.sample(chunk.bounds().center()).abs() < 1e-2);
        assert_eq!(pool.used_slots(), 1);
    }
}

//! Heightmap synthesis (§4.5.3, C5.3): per-pixel height blended
//! across the biomes a triangulation assigns to that point, weighted
//! by squared barycentric weight so a point deep inside one biome's
//! triangle corner reads almost entirely that biome's height, rather
//! than the roughly-even blend a linear weight would give it.

use std::sync::Arc;

use amp_core::Result;
use amp_math::rect2::Rect2;
use async_trait::async_trait;
use glam::Vec2;
use rayon::prelude::*;

use crate::bilinear::BilinearField;
use crate::chunk::{ChunkArtifact, ChunkIndex, ChunkKey, Lod};
use crate::config::BiomeGeneratorSettings;
use crate::layers::triangulation::TriangulationChunk;
use crate::manager::LayerNode;
use crate::noise_fields::ScalarField2;
use crate::registry::ChunkRegistry;

pub struct HeightmapChunk {
    pub(crate) key: ChunkKey,
    pub(crate) bounds: Rect2,
    pub(crate) height: BilinearField,
}

impl ChunkArtifact for HeightmapChunk {
    fn key(&self) -> ChunkKey {
        self.key
    }
    fn bounds(&self) -> Rect2 {
        self.bounds
    }
}

impl HeightmapChunk {
    pub fn sample(&self, world_pos: Vec2) -> f32 {
        self.height.sample(world_pos)
    }

    pub fn sample_with_gradient(&self, world_pos: Vec2, eps: f32) -> (f32, Vec2) {
        self.height.sample_with_gradient(world_pos, eps)
    }
}

/// Height of a single biome at `point`, per §4.5.3's noise rule:
/// `reference_height + height_multiplier * (noise * 0.5 + 0.5)`.
fn biome_height(biome: &BiomeGeneratorSettings, point: Vec2) -> f32 {
    let field = ScalarField2::new(biome.height_noise_seed, biome.height_noise_frequency);
    biome.reference_height + biome.height_multiplier * field.sample_unit(point)
}

/// Blend the three corner biomes' heights at `point` by squared
/// barycentric weight (partition of unity: the weights sum to 1
/// before squaring, so `sum(w_i^2)` normalizes the blend back to a
/// proper average rather than attenuating it near triangle edges).
fn blend_height(corners: [(crate::config::BiomeId, f32); 3], point: Vec2, biomes: &[BiomeGeneratorSettings]) -> f32 {
    let mut weighted = 0.0f32;
    let mut weight_sum = 0.0f32;
    for (biome_id, weight) in corners {
        let sq = weight * weight;
        weighted += sq * biome_height(&biomes[biome_id.0], point);
        weight_sum += sq;
    }
    if weight_sum < 1e-8 {
        0.0
    } else {
        weighted / weight_sum
    }
}

/// Sample the height at a single world point, searching every
/// triangulation chunk covering `point` for one whose triangulation
/// actually contains it. Returns `None` if no gathered triangulation
/// chunk's triangle set covers the point (a gap the caller should not
/// expect to occur given invariant 3's coverage guarantee, but pixel
/// generation treats it as recoverable rather than fatal).
fn height_at(
    point: Vec2,
    triangulation_chunks: &[Arc<TriangulationChunk>],
    biomes: &[BiomeGeneratorSettings],
) -> Option<f32> {
    for chunk in triangulation_chunks {
        if let Some(corners) = chunk.biomes_at(point) {
            return Some(blend_height(corners, point, biomes));
        }
    }
    None
}

/// Build the heightmap chunk at `index`, gathering every triangulation
/// chunk whose bounds overlap this chunk's bounds (no extra padding:
/// a heightmap pixel only ever needs the triangulation covering its
/// own position, and invariant 3 guarantees that coverage is loaded).
pub fn build(
    index: ChunkIndex,
    chunk_size: f32,
    dimension: u32,
    triangulation_chunk_size: f32,
    triangulation_registry: &ChunkRegistry<TriangulationChunk>,
    biomes: &[BiomeGeneratorSettings],
) -> HeightmapChunk {
    let bounds = index.bounds(chunk_size);

    let triangulation_chunks: Vec<Arc<TriangulationChunk>> = ChunkIndex::covering(bounds, triangulation_chunk_size)
        .into_iter()
        .filter_map(|tri_index| triangulation_registry.get(ChunkKey::new(tri_index, Lod::default())))
        .collect();

    let d = dimension as f32;
    let mut values = vec![0.0f32; (dimension * dimension) as usize];
    values.par_iter_mut().enumerate().for_each(|(i, value)| {
        let x = (i as u32) % dimension;
        let y = (i as u32) / dimension;
        let u = (x as f32 + 0.5) / d;
        let v = (y as f32 + 0.5) / d;
        let world = bounds.position + Vec2::new(u, v) * bounds.size;

        *value = match height_at(world, &triangulation_chunks, biomes) {
            Some(h) => h,
            None => {
                log::warn!("heightmap chunk {index:?}: no triangulation covers pixel at {world:?}, defaulting to 0.0");
                0.0
            }
        };
    });

    HeightmapChunk {
        key: ChunkKey::new(index, Lod::default()),
        bounds,
        height: BilinearField::new(dimension, bounds, values),
    }
}

pub struct HeightmapLayer {
    pub registry: Arc<ChunkRegistry<HeightmapChunk>>,
    pub triangulation_registry: Arc<ChunkRegistry<TriangulationChunk>>,
    pub chunk_size: f32,
    pub dimension: u32,
    pub triangulation_chunk_size: f32,
    pub biomes: Vec<BiomeGeneratorSettings>,
}

impl HeightmapLayer {
    pub fn sample(&self, world_pos: Vec2, chunk_size: f32) -> Option<f32> {
        let index = ChunkIndex::containing(world_pos, chunk_size);
        self.registry
            .get(ChunkKey::new(index, Lod::default()))
            .map(|chunk| chunk.sample(world_pos))
    }

    /// §6's `sampleFieldAtWorldPosition`: like [`Self::sample`], but
    /// surfaces a `MissingChunk` error rather than `None` when no
    /// loaded chunk covers `world_pos`, for callers that want the
    /// crate's uniform error type instead of an optional.
    pub fn sample_field_at_world_position(&self, world_pos: Vec2) -> amp_core::Result<f32> {
        self.registry
            .chunk_at_world_position(world_pos, self.chunk_size)
            .map(|chunk| chunk.sample(world_pos))
    }
}

#[async_trait]
impl LayerNode for HeightmapLayer {
    fn name(&self) -> &'static str {
        "heightmap"
    }

    fn chunk_size(&self) -> f32 {
        self.chunk_size
    }

    /// This layer's pixels only ever query the triangulation directly
    /// under them; no extra margin needed beyond chunk-overlap
    /// detection (handled inside `build` via `ChunkIndex::covering`).
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
        let triangulation_chunk_size = self.triangulation_chunk_size;
        let triangulation_registry = self.triangulation_registry.clone();
        let biomes = self.biomes.clone();

        let chunk = tokio::task::spawn_blocking(move || {
            build(index, chunk_size, dimension, triangulation_chunk_size, &triangulation_registry, &biomes)
        })
        .await
        .map_err(|e| amp_core::Error::internal(format!("heightmap build task panicked: {e}")))?;

        self.registry.insert(Arc::new(chunk));
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
    use crate::layers::{triangulation, voronoi_points};

    fn biomes() -> Vec<BiomeGeneratorSettings> {
        vec![
            BiomeGeneratorSettings {
                name: "plains".to_string(),
                selector_rect: Rect2::new(Vec2::new(0.0, 0.0), Vec2::new(0.5, 1.0)),
                reference_height: 0.0,
                height_multiplier: 8.0,
                height_noise_seed: 1,
                height_noise_frequency: 0.01,
            },
            BiomeGeneratorSettings {
                name: "mountains".to_string(),
                selector_rect: Rect2::new(Vec2::new(0.5, 0.0), Vec2::new(0.5, 1.0)),
                reference_height: 40.0,
                height_multiplier: 120.0,
                height_noise_seed: 4,
                height_noise_frequency: 0.005,
            },
        ]
    }

    fn classification() -> crate::config::BiomeClassificationSettings {
        crate::config::BiomeClassificationSettings {
            x_noise_seed: 2,
            x_noise_frequency: 0.002,
            y_noise_seed: 3,
            y_noise_frequency: 0.002,
        }
    }

    #[test]
    fn blend_of_identical_corner_weights_averages_three_biomes() {
        let biomes = biomes();
        let corners = [
            (crate::config::BiomeId(0), 1.0 / 3.0),
            (crate::config::BiomeId(0), 1.0 / 3.0),
            (crate::config::BiomeId(0), 1.0 / 3.0),
        ];
        let point = Vec2::new(5.0, 5.0);
        let height = blend_height(corners, point, &biomes);
        let expected = biome_height(&biomes[0], point);
        assert!((height - expected).abs() < 1e-3);
    }

    #[test]
    fn sample_field_at_world_position_reports_missing_chunk_cleanly() {
        let layer = HeightmapLayer {
            registry: Arc::new(ChunkRegistry::new()),
            triangulation_registry: Arc::new(ChunkRegistry::new()),
            chunk_size: 2048.0,
            dimension: 16,
            triangulation_chunk_size: 2048.0,
            biomes: biomes(),
        };

        let err = layer
            .sample_field_at_world_position(Vec2::new(10.0, 10.0))
            .unwrap_err();
        assert!(matches!(
            err,
            amp_core::Error::Worldgen(amp_core::WorldgenError::MissingChunk { .. })
        ));
    }

    #[test]
    fn build_produces_a_fully_sampleable_field() {
        let chunk_size = 2048.0;
        let points = ChunkRegistry::new();
        for y in -1..=1 {
            for x in -1..=1 {
                points.insert(Arc::new(voronoi_points::build(ChunkIndex::new(x, y), chunk_size, 4)));
            }
        }

        let tri_registry = ChunkRegistry::new();
        let tri_chunk = triangulation::build(
            ChunkIndex::new(0, 0),
            chunk_size,
            chunk_size / 2.0,
            &points,
            &classification(),
            &biomes(),
        )
        .unwrap();
        tri_registry.insert(Arc::new(tri_chunk));

        let chunk = build(ChunkIndex::new(0, 0), chunk_size, 16, chunk_size, &tri_registry, &biomes());
        let sample = chunk.sample(chunk.bounds().center());
        assert!(sample.is_finite());
    }
}

//! Biome triangulation (§4.5.2, C5.2): classify each Voronoi site into
//! a biome, then Delaunay-triangulate the site set so the heightmap
//! layer can interpolate biome weights across the plane.

use std::sync::Arc;

use amp_core::{Error, Result, WorldgenError};
use amp_math::rect2::Rect2;
use async_trait::async_trait;
use glam::Vec2;

use crate::chunk::{ChunkArtifact, ChunkIndex, ChunkKey, Lod};
use crate::config::{BiomeClassificationSettings, BiomeGeneratorSettings, BiomeId};
use crate::delaunay;
use crate::layers::voronoi_points::VoronoiPointsChunk;
use crate::manager::LayerNode;
use crate::noise_fields::ScalarField2;
use crate::registry::ChunkRegistry;

pub struct TriangulationChunk {
    key: ChunkKey,
    bounds: Rect2,
    sites: Vec<Vec2>,
    biomes: Vec<BiomeId>,
    triangles: Vec<[usize; 3]>,
}

impl ChunkArtifact for TriangulationChunk {
    fn key(&self) -> ChunkKey {
        self.key
    }
    fn bounds(&self) -> Rect2 {
        self.bounds
    }
}

impl TriangulationChunk {
    /// The triangle containing `point`, expressed as the three corner
    /// biomes paired with their barycentric weights, per C5.2's query
    /// contract. `None` if no triangle in this chunk covers the point
    /// (it may belong to a neighboring chunk's triangulation instead).
    pub fn biomes_at(&self, point: Vec2) -> Option<[(BiomeId, f32); 3]> {
        for &[a, b, c] in &self.triangles {
            let Some(weights) = delaunay::barycentric_weights(point, self.sites[a], self.sites[b], self.sites[c])
            else {
                // Degenerate (zero-area) triangle; it can't contain
                // `point` either way, so keep checking the rest.
                continue;
            };
            if delaunay::weights_inside_triangle(weights) {
                return Some([
                    (self.biomes[a], weights.0),
                    (self.biomes[b], weights.1),
                    (self.biomes[c], weights.2),
                ]);
            }
        }
        None
    }

    pub fn sites(&self) -> &[Vec2] {
        &self.sites
    }

    pub fn triangles(&self) -> &[[usize; 3]] {
        &self.triangles
    }
}

fn classify(
    site: Vec2,
    classification: &BiomeClassificationSettings,
    biomes: &[BiomeGeneratorSettings],
) -> BiomeId {
    let x_field = ScalarField2::new(classification.x_noise_seed, classification.x_noise_frequency);
    let y_field = ScalarField2::new(classification.y_noise_seed, classification.y_noise_frequency);
    let uv = Vec2::new(x_field.sample_unit(site), y_field.sample_unit(site));

    for (idx, biome) in biomes.iter().enumerate() {
        if biome.selector_rect.contains_point(uv) {
            return BiomeId(idx);
        }
    }
    // Coverage is validated at config load time (`EngineConfig::validate`);
    // fall back to the last biome rather than panic if a caller bypassed
    // that check.
    BiomeId(biomes.len() - 1)
}

/// Build the triangulation chunk at `index`. `nominal_padding` is half
/// this layer's own chunk side (§4.5.2's stated padding value); the
/// actual site-gather rect grows by `nominal_padding * 2` so a site
/// chunk's triangulation always has a full ring of neighbor sites to
/// triangulate against, avoiding boundary artifacts at the chunk edge.
///
/// `TriangulationLayer::padding()` reports the full chunk side (not
/// `nominal_padding`) to the layer manager, since that's the amount of
/// upstream Voronoi-points coverage this build actually consumes.
///
/// # Panics
/// Panics if a Voronoi-points chunk this build needs has not been
/// loaded by the manager first — invariant 3 guarantees the manager
/// never calls this without that coverage in place.
pub fn build(
    index: ChunkIndex,
    chunk_size: f32,
    nominal_padding: f32,
    points_registry: &ChunkRegistry<VoronoiPointsChunk>,
    classification: &BiomeClassificationSettings,
    biomes: &[BiomeGeneratorSettings],
) -> Result<TriangulationChunk> {
    let bounds = index.bounds(chunk_size);
    let gather_rect = bounds.grow(nominal_padding * 2.0);

    let mut sites = Vec::new();
    for parent_index in ChunkIndex::covering(gather_rect, chunk_size) {
        let parent_key = ChunkKey::new(parent_index, Lod::default());
        let parent = points_registry.get(parent_key).ok_or_else(|| {
            Error::from(WorldgenError::topology(format!(
                "triangulation chunk {index:?} needs voronoi-points chunk {parent_index:?}, which is not loaded"
            )))
        })?;
        sites.extend(parent.sites.iter().copied());
    }

    let site_biomes: Vec<BiomeId> = sites.iter().map(|&s| classify(s, classification, biomes)).collect();
    let triangles = delaunay::triangulate(&sites);

    Ok(TriangulationChunk {
        key: ChunkKey::new(index, Lod::default()),
        bounds,
        sites,
        biomes: site_biomes,
        triangles,
    })
}

/// Wraps [`build`] as a [`LayerNode`], gathering its own config and
/// pulling the parent points registry from the layer manager's
/// dependency wiring.
pub struct TriangulationLayer {
    pub registry: Arc<ChunkRegistry<TriangulationChunk>>,
    pub points_registry: Arc<ChunkRegistry<VoronoiPointsChunk>>,
    pub chunk_size: f32,
    pub classification: BiomeClassificationSettings,
    pub biomes: Vec<BiomeGeneratorSettings>,
}

#[async_trait]
impl LayerNode for TriangulationLayer {
    fn name(&self) -> &'static str {
        "triangulation"
    }

    fn chunk_size(&self) -> f32 {
        self.chunk_size
    }

    /// Full chunk side, per this module's doc comment: the amount of
    /// points-layer coverage a triangulation build actually consumes.
    fn padding(&self) -> f32 {
        self.chunk_size
    }

    fn lod_aware(&self) -> bool {
        false
    }

    fn is_loaded(&self, index: ChunkIndex, lod: Lod) -> bool {
        self.registry.has(ChunkKey::new(index, lod))
    }

    async fn build_and_store(&self, index: ChunkIndex, lod: Lod) -> Result<()> {
        let chunk_size = self.chunk_size;
        let nominal_padding = chunk_size / 2.0;
        let points_registry = self.points_registry.clone();
        let classification = self.classification.clone();
        let biomes = self.biomes.clone();

        let chunk = tokio::task::spawn_blocking(move || {
            build(index, chunk_size, nominal_padding, &points_registry, &classification, &biomes)
        })
        .await
        .map_err(|e| Error::internal(format!("triangulation build task panicked: {e}")))??;

        debug_assert_eq!(chunk.key(), ChunkKey::new(index, lod));
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
    use crate::layers::voronoi_points;

    fn registry_with_chunk(
        index: ChunkIndex,
        chunk_size: f32,
        points_per_side: u32,
    ) -> ChunkRegistry<VoronoiPointsChunk> {
        let registry = ChunkRegistry::new();
        registry.insert(Arc::new(voronoi_points::build(index, chunk_size, points_per_side)));
        registry
    }

    fn classification() -> BiomeClassificationSettings {
        BiomeClassificationSettings {
            x_noise_seed: 2,
            x_noise_frequency: 0.002,
            y_noise_seed: 3,
            y_noise_frequency: 0.002,
        }
    }

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

    #[test]
    fn missing_parent_chunk_is_a_topology_error() {
        let chunk_size = 2048.0;
        let points = ChunkRegistry::new();
        let err = build(
            ChunkIndex::new(0, 0),
            chunk_size,
            chunk_size / 2.0,
            &points,
            &classification(),
            &biomes(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Worldgen(WorldgenError::Topology { .. })));
    }

    #[test]
    fn builds_triangulation_when_all_parent_chunks_present() {
        let chunk_size = 2048.0;
        let points = ChunkRegistry::new();
        for y in -1..=1 {
            for x in -1..=1 {
                points.insert(Arc::new(voronoi_points::build(ChunkIndex::new(x, y), chunk_size, 4)));
            }
        }

        let chunk = build(
            ChunkIndex::new(0, 0),
            chunk_size,
            chunk_size / 2.0,
            &points,
            &classification(),
            &biomes(),
        )
        .unwrap();

        assert!(!chunk.triangles().is_empty());
        assert!(chunk.sites().len() >= 9 * 16);
    }

    #[test]
    fn biomes_at_returns_scenario_e_shaped_weights_inside_a_triangle() {
        // A degenerate 3-site chunk at (0,0),(1,0),(0,1): a classic
        // worked barycentric example, queried at (0.25, 0.25).
        let registry = ChunkRegistry::<VoronoiPointsChunk>::new();
        let _ = registry;

        let chunk = TriangulationChunk {
            key: ChunkKey::new(ChunkIndex::new(0, 0), 0),
            bounds: Rect2::new(Vec2::ZERO, Vec2::splat(1.0)),
            sites: vec![Vec2::ZERO, Vec2::new(1.0, 0.0), Vec2::new(0.0, 1.0)],
            biomes: vec![BiomeId(0), BiomeId(1), BiomeId(1)],
            triangles: vec![[0, 1, 2]],
        };

        let result = chunk.biomes_at(Vec2::new(0.25, 0.25)).unwrap();
        assert_eq!(result[0].0, BiomeId(0));
        assert!((result[0].1 - 0.5).abs() < 1e-4);
        assert!((result[1].1 - 0.25).abs() < 1e-4);
        assert!((result[2].1 - 0.25).abs() < 1e-4);
    }

    #[test]
    fn a_degenerate_triangle_earlier_in_the_list_does_not_hide_a_later_match() {
        // Three collinear sites make triangle [0,1,2] degenerate
        // (zero area); site 3 off the line makes [0,1,3] a real
        // triangle that covers the query point. The degenerate
        // triangle is listed first, so a short-circuiting `biomes_at`
        // would return `None` without ever looking at [0,1,3].
        let chunk = TriangulationChunk {
            key: ChunkKey::new(ChunkIndex::new(0, 0), 0),
            bounds: Rect2::new(Vec2::ZERO, Vec2::splat(2.0)),
            sites: vec![
                Vec2::new(0.0, 0.0),
                Vec2::new(1.0, 0.0),
                Vec2::new(2.0, 0.0),
                Vec2::new(0.0, 1.0),
            ],
            biomes: vec![BiomeId(0), BiomeId(1), BiomeId(2), BiomeId(3)],
            triangles: vec![[0, 1, 2], [0, 1, 3]],
        };

        let result = chunk.biomes_at(Vec2::new(0.25, 0.25));
        assert!(result.is_some(), "degenerate triangle must not short-circuit the search");
    }

    #[test]
    fn point_far_outside_the_chunk_has_no_covering_triangle() {
        let chunk = TriangulationChunk {
            key: ChunkKey::new(ChunkIndex::new(0, 0), 0),
            bounds: Rect2::new(Vec2::ZERO, Vec2::splat(1.0)),
            sites: vec![Vec2::ZERO, Vec2::new(1.0, 0.0), Vec2::new(0.0, 1.0)],
            biomes: vec![BiomeId(0), BiomeId(1), BiomeId(1)],
            triangles: vec![[0, 1, 2]],
        };

        assert!(chunk.biomes_at(Vec2::new(50.0, 50.0)).is_none());
    }
}

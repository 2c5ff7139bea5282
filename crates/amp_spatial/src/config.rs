//! Typed configuration for the worldgen stack (§4.8, C8).
//!
//! Loaded through the same `config_core::Config` + `ConfigLoader`
//! mechanism as the rest of the engine's ambient configuration, or
//! constructed directly for embedding and tests.

use amp_core::{ConfigError, Error, Result};
use amp_math::rect2::Rect2;
use config_core::Config;
use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Index of a biome within `TerrainSettings::biome_settings`, chosen by
/// classification and carried alongside per-site triangulation data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BiomeId(pub usize);

/// One configured biome: where it lives in classification `(u,v)`
/// space and how its heightmap contribution is generated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiomeGeneratorSettings {
    pub name: String,
    /// The `(u,v) in [0,1]^2` rectangle this biome claims during
    /// classification.
    pub selector_rect: Rect2,
    pub reference_height: f32,
    pub height_multiplier: f32,
    pub height_noise_seed: u32,
    pub height_noise_frequency: f32,
}

/// The pair of independent scalar fields every triangulation chunk
/// samples a site through to get its classification `(u,v)`. Shared
/// across all biomes: a site must be classified before anyone knows
/// which biome's settings apply, so this cannot live per-biome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiomeClassificationSettings {
    pub x_noise_seed: u32,
    pub x_noise_frequency: f32,
    pub y_noise_seed: u32,
    pub y_noise_frequency: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerrainSettings {
    pub chunk_size: f32,
    pub normal_height_texture_size: u32,
    pub normal_height_texture_count_per_lod: Vec<usize>,
    pub lod_max_distances: Vec<f32>,
    pub biome_settings: Vec<BiomeGeneratorSettings>,
    pub classification: BiomeClassificationSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuadtreeSettings {
    pub max_lods: u32,
    /// Control points of a monotone piecewise-linear LOD curve,
    /// evaluated at `t in [0,1]`; see [`crate::quadtree::LodCurve`].
    pub lod_curve_exponent: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoronoiSettings {
    pub points_per_chunk_side: u32,
    pub points_chunk_size: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeightmapSettings {
    pub chunk_size: f32,
    pub dimension: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerPoolSettings {
    pub parallelism: usize,
}

/// The root configuration value for the worldgen engine, constructed
/// once and threaded through the `LayerManager`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub terrain: TerrainSettings,
    pub road_sdf_dimensions: u32,
    pub render_distance: f32,
    pub quadtree: QuadtreeSettings,
    pub voronoi: VoronoiSettings,
    pub heightmap: HeightmapSettings,
    pub worker_pool: WorkerPoolSettings,
}

impl Config for EngineConfig {
    const FILE_NAME: &'static str = "worldgen.ron";
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            terrain: TerrainSettings {
                chunk_size: 2048.0,
                normal_height_texture_size: 512,
                normal_height_texture_count_per_lod: vec![64, 32, 16, 8],
                lod_max_distances: vec![256.0, 1024.0, 4096.0, 16384.0],
                biome_settings: default_biomes(),
                classification: BiomeClassificationSettings {
                    x_noise_seed: 2,
                    x_noise_frequency: 0.002,
                    y_noise_seed: 3,
                    y_noise_frequency: 0.002,
                },
            },
            road_sdf_dimensions: 256,
            render_distance: 16384.0,
            quadtree: QuadtreeSettings {
                max_lods: 4,
                lod_curve_exponent: 1.0,
            },
            voronoi: VoronoiSettings {
                points_per_chunk_side: 4,
                points_chunk_size: 2048.0,
            },
            heightmap: HeightmapSettings {
                chunk_size: 1024.0,
                dimension: 64,
            },
            worker_pool: WorkerPoolSettings { parallelism: 4 },
        }
    }
}

fn default_biomes() -> Vec<BiomeGeneratorSettings> {
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

impl EngineConfig {
    /// Validate that `biome_settings` jointly tile `[0,1]^2`, the
    /// precondition the classification rule in §4.5.2 depends on.
    /// This is a coarse coverage check (no gaps along either axis'
    /// projection), not exact-partition geometry.
    pub fn validate(&self) -> Result<()> {
        if self.terrain.biome_settings.is_empty() {
            return Err(Error::from(ConfigError::invalid_format(
                "biome_settings must not be empty".to_string(),
            )));
        }

        let mut xs: Vec<(f32, f32)> = self
            .terrain
            .biome_settings
            .iter()
            .map(|b| {
                let r = b.selector_rect;
                (r.position.x, r.max().x)
            })
            .collect();
        xs.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut cursor = 0.0f32;
        for (lo, hi) in &xs {
            if *lo > cursor + 1e-4 {
                return Err(Error::from(ConfigError::invalid_format(format!(
                    "biome selector rects leave a gap at u={cursor}"
                ))));
            }
            cursor = cursor.max(*hi);
        }
        if cursor < 1.0 - 1e-4 {
            return Err(Error::from(ConfigError::invalid_format(
                "biome selector rects do not cover u up to 1.0".to_string(),
            )));
        }

        for biome in &self.terrain.biome_settings {
            let r = biome.selector_rect;
            if r.position.y < -1e-4 || r.max().y > 1.0 + 1e-4 {
                return Err(Error::from(ConfigError::invalid_format(format!(
                    "biome '{}' selector_rect is outside [0,1] on v",
                    biome.name
                ))));
            }
        }

        Ok(())
    }
}

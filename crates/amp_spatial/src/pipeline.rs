//! Convenience wiring: build a fully-connected [`LayerManager`] for
//! the standard voronoi -> triangulation -> heightmap -> {road,
//! terrain} pipeline from one [`EngineConfig`], so embedders don't
//! have to hand-assemble the dependency graph themselves.

use std::sync::Arc;

use amp_core::Result;

use crate::config::EngineConfig;
use crate::layers::heightmap::HeightmapLayer;
use crate::layers::road::RoadLayer;
use crate::layers::terrain::TerrainLayer;
use crate::layers::triangulation::TriangulationLayer;
use crate::layers::voronoi_points::VoronoiPointsChunk;
use crate::manager::LayerManager;
use crate::mesh_catalog::GridMeshCatalog;
use crate::registry::ChunkRegistry;
use crate::scene_host::SceneHost;
use crate::texture_pool::{TextureFormat, TextureHost, TextureSlotPool};

/// Number of grid cells per side of a terrain tile mesh; not currently
/// exposed in [`EngineConfig`], so fixed at a value matching the
/// teacher's default chunk-mesh resolution.
const TERRAIN_MESH_ELEMENTS: u32 = 16;

pub fn build_standard_pipeline(
    config: &EngineConfig,
    texture_host: Arc<dyn TextureHost>,
    scene_host: Arc<dyn SceneHost>,
) -> Result<LayerManager> {
    config.validate()?;

    let manager = LayerManager::new(config.terrain.lod_max_distances.clone())?;

    let points_registry: Arc<ChunkRegistry<VoronoiPointsChunk>> = Arc::new(ChunkRegistry::new());
    let points_layer = Arc::new(crate::layers::voronoi_points::VoronoiPointsLayer {
        registry: points_registry.clone(),
        chunk_size: config.voronoi.points_chunk_size,
        points_per_chunk_side: config.voronoi.points_per_chunk_side,
    });
    manager.insert_layer(points_layer)?;

    let triangulation_registry = Arc::new(ChunkRegistry::new());
    let triangulation_layer = Arc::new(TriangulationLayer {
        registry: triangulation_registry.clone(),
        points_registry: points_registry.clone(),
        chunk_size: config.voronoi.points_chunk_size,
        classification: config.terrain.classification.clone(),
        biomes: config.terrain.biome_settings.clone(),
    });
    manager.insert_layer(triangulation_layer)?;
    manager.add_dependency("triangulation", "voronoi_points")?;

    let heightmap_layer = Arc::new(HeightmapLayer {
        registry: Arc::new(ChunkRegistry::new()),
        triangulation_registry,
        chunk_size: config.heightmap.chunk_size,
        dimension: config.heightmap.dimension,
        triangulation_chunk_size: config.voronoi.points_chunk_size,
        biomes: config.terrain.biome_settings.clone(),
    });
    manager.insert_layer(heightmap_layer.clone())?;
    manager.add_dependency("heightmap", "triangulation")?;

    let road_pool = Arc::new(TextureSlotPool::new(
        *config.terrain.normal_height_texture_count_per_lod.first().unwrap_or(&16) as u32,
        (config.road_sdf_dimensions, config.road_sdf_dimensions),
        TextureFormat::Rg16Float,
        texture_host.clone(),
    ));
    let road_layer = Arc::new(RoadLayer {
        registry: Arc::new(ChunkRegistry::new()),
        heightmap: heightmap_layer.clone(),
        chunk_size: config.heightmap.chunk_size,
        dimension: config.road_sdf_dimensions,
        heightmap_chunk_size: config.heightmap.chunk_size,
        pool: road_pool,
    });
    manager.insert_layer(road_layer.clone())?;
    manager.add_dependency("road", "heightmap")?;

    let terrain_pools: Vec<Arc<TextureSlotPool>> = config
        .terrain
        .normal_height_texture_count_per_lod
        .iter()
        .map(|&count| {
            Arc::new(TextureSlotPool::new(
                count as u32,
                (config.terrain.normal_height_texture_size, config.terrain.normal_height_texture_size),
                TextureFormat::Rgba8,
                texture_host.clone(),
            ))
        })
        .collect();

    let mesh_catalog = Arc::new(GridMeshCatalog::new(TERRAIN_MESH_ELEMENTS, config.terrain.chunk_size));
    let terrain_layer = Arc::new(TerrainLayer::new(
        Arc::new(ChunkRegistry::new()),
        heightmap_layer,
        Some(road_layer),
        mesh_catalog,
        scene_host,
        terrain_pools,
        config.terrain.chunk_size,
        config.quadtree.max_lods,
        config.quadtree.lod_curve_exponent,
    ));
    manager.insert_layer(terrain_layer)?;
    manager.add_dependency("terrain", "heightmap")?;

    Ok(manager)
}

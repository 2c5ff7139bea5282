//! Streaming procedural world generation for the AMP Game Engine.
//!
//! A dependency-driven layer graph ([`manager::LayerManager`]) streams
//! chunked artifacts around a moving reference point: Voronoi biome
//! sites, a Delaunay triangulation over them, a blended heightmap, a
//! road-proximity SDF, and an adaptive quad-tree terrain mesh on top.
//! Each layer tiles the world at its own chunk size and is wired to
//! the layers it depends on; the manager handles demand propagation,
//! build ordering, and unload, so each [`manager::LayerNode`] only
//! has to know how to build and discard its own chunks.

pub mod bilinear;
pub mod chunk;
pub mod config;
pub mod delaunay;
pub mod layers;
pub mod manager;
pub mod mesh_catalog;
pub mod noise_fields;
pub mod pipeline;
pub mod quadtree;
pub mod registry;
pub mod scene_host;
pub mod texture_pool;

pub use chunk::{ChunkArtifact, ChunkIndex, ChunkKey, Lod};
pub use config::EngineConfig;
pub use manager::{LayerManager, LayerNode};
pub use registry::ChunkRegistry;
pub use scene_host::SceneHost;
pub use texture_pool::TextureHost;

//! The (ChunkIndex, LOD) key space shared by every layer.
//!
//! Every layer tiles the world plane with its own `chunk_size`; the
//! `ChunkIndex` is that tiling's integer coordinate, independent of
//! which layer is asking. `Lod` is not layer-relative either: layers
//! that ignore LOD (the Voronoi-points layer, for instance) always use
//! [`Lod::default`] (`0`).

use amp_math::rect2::Rect2;
use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Level of detail: `0` is finest, increasing values are coarser.
pub type Lod = u32;

/// A 2D integer coordinate in a layer's uniform grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkIndex {
    pub x: i32,
    pub y: i32,
}

impl ChunkIndex {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The world-space bounds of this index under a layer's chunk
    /// side length, per invariant 6: `[x*side, x*side+side) x
    /// [y*side, y*side+side)`.
    pub fn bounds(&self, side: f32) -> Rect2 {
        Rect2::from_chunk_index(self.x, self.y, side)
    }

    /// The chunk index that contains `point`, under the given side
    /// length.
    pub fn containing(point: Vec2, side: f32) -> Self {
        Self::new(
            (point.x / side).floor() as i32,
            (point.y / side).floor() as i32,
        )
    }

    /// All chunk indices whose bounds overlap `rect`, under the given
    /// side length.
    pub fn covering(rect: Rect2, side: f32) -> Vec<Self> {
        let min = rect.position;
        let max = rect.max();
        let min_x = (min.x / side).floor() as i32;
        let min_y = (min.y / side).floor() as i32;
        // max is exclusive on a half-open chunk, so a point exactly on
        // the boundary should not pull in one extra row/column.
        let max_x = ((max.x / side).ceil() as i32 - 1).max(min_x);
        let max_y = ((max.y / side).ceil() as i32 - 1).max(min_y);

        let mut out = Vec::new();
        for iy in min_y..=max_y {
            for ix in min_x..=max_x {
                out.push(Self::new(ix, iy));
            }
        }
        out
    }
}

/// Uniquely identifies a chunk artifact within a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkKey {
    pub index: ChunkIndex,
    pub lod: Lod,
}

impl ChunkKey {
    pub fn new(index: ChunkIndex, lod: Lod) -> Self {
        Self { index, lod }
    }
}

/// Shared contract every per-layer chunk artifact implements so the
/// generic [`crate::registry::ChunkRegistry`] can store it.
///
/// Resource release (texture-pool handles, scene nodes) is handled by
/// `Drop` on the concrete chunk type rather than a virtual `unload()`
/// method — once a chunk's last `Arc` is dropped by the registry, its
/// fields release themselves.
pub trait ChunkArtifact: Send + Sync + 'static {
    fn key(&self) -> ChunkKey;
    fn bounds(&self) -> Rect2;
}

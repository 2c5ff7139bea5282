//! Precomputed terrain tile meshes, keyed by which edges need
//! T-junction stitching against a coarser neighbor (§4.3, C3).
//!
//! Geometry is plain position/UV/index buffers rather than a
//! renderer-specific mesh type; a `SceneHost` implementation is
//! responsible for uploading them to whatever the host engine uses.

use glam::{Vec2, Vec3};

/// Which of the four edges of a grid cell border a coarser neighbor
/// and so need their shared midpoint vertex collapsed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct EdgeFlags {
    pub north: bool,
    pub south: bool,
    pub east: bool,
    pub west: bool,
}

impl EdgeFlags {
    pub const NONE: EdgeFlags = EdgeFlags {
        north: false,
        south: false,
        east: false,
        west: false,
    };

    /// All sixteen flag combinations, in a fixed deterministic order
    /// matching the bits `north=1, south=2, east=4, west=8`.
    pub fn all() -> [EdgeFlags; 16] {
        let mut out = [EdgeFlags::NONE; 16];
        for (bits, slot) in out.iter_mut().enumerate() {
            *slot = EdgeFlags {
                north: bits & 1 != 0,
                south: bits & 2 != 0,
                east: bits & 4 != 0,
                west: bits & 8 != 0,
            };
        }
        out
    }

    fn bits(self) -> u8 {
        (self.north as u8) | (self.south as u8) << 1 | (self.east as u8) << 2 | (self.west as u8) << 3
    }
}

/// Raw renderable geometry for one grid-mesh tile.
#[derive(Debug, Clone)]
pub struct TileMesh {
    pub positions: Vec<Vec3>,
    pub uvs: Vec<Vec2>,
    pub indices: Vec<u32>,
}

/// The 3x3 layout of sub-nodes per grid cell used to generate each
/// tile: corners, edge midpoints, and the center.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum SubNode {
    Nw,
    N,
    Ne,
    W,
    C,
    E,
    Sw,
    S,
    Se,
}

impl SubNode {
    const ORDER: [SubNode; 9] = [
        SubNode::Nw,
        SubNode::N,
        SubNode::Ne,
        SubNode::W,
        SubNode::C,
        SubNode::E,
        SubNode::Sw,
        SubNode::S,
        SubNode::Se,
    ];

    fn grid_pos(self) -> (u32, u32) {
        match self {
            SubNode::Nw => (0, 0),
            SubNode::N => (1, 0),
            SubNode::Ne => (2, 0),
            SubNode::W => (0, 1),
            SubNode::C => (1, 1),
            SubNode::E => (2, 1),
            SubNode::Sw => (0, 2),
            SubNode::S => (1, 2),
            SubNode::Se => (2, 2),
        }
    }
}

/// Builds one `sideLength`-sized, square tile mesh subdivided into
/// `element_count x element_count` grid cells, each rendered via the
/// 3x3 sub-node layout, collapsing the midpoint of any edge flagged in
/// `flags` to avoid a T-junction against a coarser neighbor one LOD
/// down.
fn build_tile(element_count: u32, side_length: f32, flags: EdgeFlags) -> TileMesh {
    assert!(element_count >= 1, "element_count must be at least 1");
    let cell_size = side_length / element_count as f32;

    let mut positions = Vec::new();
    let mut uvs = Vec::new();
    let mut indices = Vec::new();

    // Each grid cell owns a private 3x3 vertex block (no sharing
    // across cells) so that edge collapsing in one cell never
    // perturbs its neighbor's geometry.
    for cy in 0..element_count {
        for cx in 0..element_count {
            let origin = Vec2::new(cx as f32 * cell_size, cy as f32 * cell_size);
            let base_index = positions.len() as u32;

            for sub in SubNode::ORDER {
                let (gx, gy) = sub.grid_pos();
                let local = Vec2::new(gx as f32 * 0.5, gy as f32 * 0.5) * cell_size;
                let world = origin + local;
                positions.push(Vec3::new(world.x, 0.0, world.y));
                uvs.push(Vec2::new(world.x / side_length, world.y / side_length));
            }

            let on_north_edge = cy == 0;
            let on_south_edge = cy == element_count - 1;
            let on_east_edge = cx == element_count - 1;
            let on_west_edge = cx == 0;

            let collapse_north = flags.north && on_north_edge;
            let collapse_south = flags.south && on_south_edge;
            let collapse_east = flags.east && on_east_edge;
            let collapse_west = flags.west && on_west_edge;

            emit_cell_triangles(
                base_index,
                collapse_north,
                collapse_south,
                collapse_east,
                collapse_west,
                &mut indices,
            );
        }
    }

    TileMesh {
        positions,
        uvs,
        indices,
    }
}

/// Index offsets of the 3x3 block relative to `base`, per `SubNode::ORDER`.
mod idx {
    pub const NW: u32 = 0;
    pub const N: u32 = 1;
    pub const NE: u32 = 2;
    pub const W: u32 = 3;
    pub const C: u32 = 4;
    pub const E: u32 = 5;
    pub const SW: u32 = 6;
    pub const S: u32 = 7;
    pub const SE: u32 = 8;
}

/// Emit the cell's triangle fan around its center vertex, skipping
/// (collapsing) the midpoint of any flagged edge so the two triangles
/// that would have straddled it become one, suppressing the
/// T-junction against a coarser neighbor across that edge.
fn emit_cell_triangles(
    base: u32,
    collapse_north: bool,
    collapse_south: bool,
    collapse_east: bool,
    collapse_west: bool,
    out: &mut Vec<u32>,
) {
    let v = |i: u32| base + i;
    let c = v(idx::C);

    let mut quad_tri = |a: u32, b: u32| {
        out.push(c);
        out.push(a);
        out.push(b);
    };

    // NW quadrant (corner NW, midpoints N and W)
    if collapse_north {
        quad_tri(v(idx::NW), v(idx::W));
    } else if collapse_west {
        quad_tri(v(idx::N), v(idx::NW));
    } else {
        quad_tri(v(idx::N), v(idx::NW));
        quad_tri(v(idx::NW), v(idx::W));
    }

    // NE quadrant (corner NE, midpoints N and E)
    if collapse_north {
        quad_tri(v(idx::E), v(idx::NE));
    } else if collapse_east {
        quad_tri(v(idx::NE), v(idx::N));
    } else {
        quad_tri(v(idx::NE), v(idx::N));
        quad_tri(v(idx::E), v(idx::NE));
    }

    // SE quadrant (corner SE, midpoints E and S)
    if collapse_south {
        quad_tri(v(idx::SE), v(idx::E));
    } else if collapse_east {
        quad_tri(v(idx::S), v(idx::SE));
    } else {
        quad_tri(v(idx::S), v(idx::SE));
        quad_tri(v(idx::SE), v(idx::E));
    }

    // SW quadrant (corner SW, midpoints S and W)
    if collapse_south {
        quad_tri(v(idx::W), v(idx::SW));
    } else if collapse_west {
        quad_tri(v(idx::SW), v(idx::S));
    } else {
        quad_tri(v(idx::SW), v(idx::S));
        quad_tri(v(idx::W), v(idx::SW));
    }
}

/// Cache of precomputed tile meshes, indexed by `(element_count,
/// side_length_bits, flags)`. Meshes are generated lazily on first
/// request and reused for every chunk sharing that key.
pub struct GridMeshCatalog {
    element_count: u32,
    side_length: f32,
    cache: std::sync::Mutex<std::collections::HashMap<u8, std::sync::Arc<TileMesh>>>,
}

impl GridMeshCatalog {
    pub fn new(element_count: u32, side_length: f32) -> Self {
        Self {
            element_count,
            side_length,
            cache: std::sync::Mutex::new(std::collections::HashMap::new()),
        }
    }

    /// The mesh for this flag combination, building and caching it on
    /// first use.
    pub fn mesh_for(&self, flags: EdgeFlags) -> std::sync::Arc<TileMesh> {
        let key = flags.bits();
        let mut cache = self.cache.lock().expect("mesh catalog poisoned");
        cache
            .entry(key)
            .or_insert_with(|| {
                std::sync::Arc::new(build_tile(self.element_count, self.side_length, flags))
            })
            .clone()
    }

    /// Select the edge-flag combination for a leaf whose neighbor-LOD
    /// vector is `neighbor_lods` (`[north, south, east, west]`, `-1`
    /// meaning "no neighbor"), at `lod`: an edge is flagged when it
    /// borders a strictly finer neighbor.
    pub fn flags_for_neighbors(lod: u32, neighbor_lods: [i32; 4]) -> EdgeFlags {
        let flagged = |n: i32| n != -1 && n < lod as i32;
        EdgeFlags {
            north: flagged(neighbor_lods[0]),
            south: flagged(neighbor_lods[1]),
            east: flagged(neighbor_lods[2]),
            west: flagged(neighbor_lods[3]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unflagged_mesh_has_full_triangle_count() {
        let mesh = build_tile(2, 100.0, EdgeFlags::NONE);
        // 2x2 cells, 8 triangles each (4 quadrants x 2 triangles) = 32.
        assert_eq!(mesh.indices.len(), 2 * 2 * 8 * 3);
    }

    #[test]
    fn flagging_an_edge_collapses_its_border_cells_triangles() {
        let unflagged = build_tile(2, 100.0, EdgeFlags::NONE);
        let north_flagged = build_tile(
            2,
            100.0,
            EdgeFlags {
                north: true,
                ..EdgeFlags::NONE
            },
        );
        assert!(north_flagged.indices.len() < unflagged.indices.len());
    }

    #[test]
    fn all_sixteen_combinations_are_distinct_flag_sets() {
        let all = EdgeFlags::all();
        let mut bits: Vec<u8> = all.iter().map(|f| f.bits()).collect();
        bits.sort();
        bits.dedup();
        assert_eq!(bits.len(), 16);
    }

    #[test]
    fn catalog_caches_and_reuses_the_same_mesh() {
        let catalog = GridMeshCatalog::new(4, 50.0);
        let a = catalog.mesh_for(EdgeFlags::NONE);
        let b = catalog.mesh_for(EdgeFlags::NONE);
        assert!(std::sync::Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn flags_for_neighbors_only_flags_strictly_finer_neighbors() {
        // lod=2: a north neighbor at lod 1 (finer) flags north; a
        // south neighbor at lod 2 (same) does not; no east neighbor
        // (-1) does not; a west neighbor at lod 3 (coarser) does not.
        let flags = GridMeshCatalog::flags_for_neighbors(2, [1, 2, -1, 3]);
        assert!(flags.north);
        assert!(!flags.south);
        assert!(!flags.east);
        assert!(!flags.west);
    }

    #[test]
    fn positions_stay_within_tile_bounds() {
        let mesh = build_tile(3, 90.0, EdgeFlags::NONE);
        for p in &mesh.positions {
            assert!(p.x >= -1e-3 && p.x <= 90.0 + 1e-3);
            assert!(p.z >= -1e-3 && p.z <= 90.0 + 1e-3);
        }
    }
}

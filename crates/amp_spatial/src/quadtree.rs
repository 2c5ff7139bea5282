//! Adaptive quad-tree for the terrain LOD layer (§4.2, C2).
//!
//! The tree is an arena: nodes live in a flat `Vec`, and
//! `parent`/`children` are indices (`NodeId`) rather than
//! owning/back-pointers, which keeps subdivision and balancing free of
//! cyclic ownership. Child slots are kept in `[NW, NE, SE, SW]` order
//! throughout, and every neighbor/direction table is derived from that
//! same ordering so it never disagrees with itself; see `DESIGN.md`
//! for the rationale.

use amp_math::rect2::Rect2;
use glam::Vec2;

use crate::chunk::Lod;

pub type NodeId = u32;

/// The four child quadrants of a node, in the order child slots are
/// stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quadrant {
    Nw = 0,
    Ne = 1,
    Se = 2,
    Sw = 3,
}

impl Quadrant {
    const ALL: [Quadrant; 4] = [Quadrant::Nw, Quadrant::Ne, Quadrant::Se, Quadrant::Sw];

    fn subrect(self, parent: Rect2) -> Rect2 {
        let half = parent.size * 0.5;
        let origin = match self {
            Quadrant::Nw => parent.position,
            Quadrant::Ne => parent.position + Vec2::new(half.x, 0.0),
            Quadrant::Se => parent.position + half,
            Quadrant::Sw => parent.position + Vec2::new(0.0, half.y),
        };
        Rect2::new(origin, half)
    }

    fn mirror_y(self) -> Quadrant {
        match self {
            Quadrant::Nw => Quadrant::Sw,
            Quadrant::Sw => Quadrant::Nw,
            Quadrant::Ne => Quadrant::Se,
            Quadrant::Se => Quadrant::Ne,
        }
    }

    fn mirror_x(self) -> Quadrant {
        match self {
            Quadrant::Nw => Quadrant::Ne,
            Quadrant::Ne => Quadrant::Nw,
            Quadrant::Sw => Quadrant::Se,
            Quadrant::Se => Quadrant::Sw,
        }
    }

    fn mirror(self, dir: Direction) -> Quadrant {
        match dir {
            Direction::North | Direction::South => self.mirror_y(),
            Direction::East | Direction::West => self.mirror_x(),
        }
    }

    /// Whether this quadrant touches the parent's edge in `dir` (and
    /// so has no same-parent sibling in that direction).
    fn on_edge(self, dir: Direction) -> bool {
        use Direction::*;
        use Quadrant::*;
        matches!(
            (self, dir),
            (Nw, North)
                | (Nw, West)
                | (Ne, North)
                | (Ne, East)
                | (Se, South)
                | (Se, East)
                | (Sw, South)
                | (Sw, West)
        )
    }
}

/// The four cardinal neighbor directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    North,
    South,
    East,
    West,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::North,
        Direction::South,
        Direction::East,
        Direction::West,
    ];

    fn index(self) -> usize {
        match self {
            Direction::North => 0,
            Direction::South => 1,
            Direction::East => 2,
            Direction::West => 3,
        }
    }

    /// The two child quadrants of a node that touch its edge in this
    /// direction (used to descend a greater-or-equal neighbor down to
    /// the leaves that actually share the edge).
    fn touching_children(self) -> [Quadrant; 2] {
        match self {
            Direction::North => [Quadrant::Sw, Quadrant::Se],
            Direction::South => [Quadrant::Nw, Quadrant::Ne],
            Direction::East => [Quadrant::Nw, Quadrant::Sw],
            Direction::West => [Quadrant::Ne, Quadrant::Se],
        }
    }
}

/// A monotone curve controlling how quickly LOD threshold distances
/// shrink with depth (§4.2's `lodCurve`), supplied as configuration.
pub trait LodCurve: Send + Sync {
    fn evaluate(&self, t: f32) -> f32;
}

/// The identity curve: `lodCurve(t) = t`. Used by Scenario B and as a
/// sane default.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityCurve;

impl LodCurve for IdentityCurve {
    fn evaluate(&self, t: f32) -> f32 {
        t.clamp(0.0, 1.0)
    }
}

/// `lodCurve(t) = t^exponent`, a common "ease toward the camera" shape
/// for games that want LOD bands to bunch up near the viewer.
#[derive(Debug, Clone, Copy)]
pub struct PowCurve {
    pub exponent: f32,
}

impl LodCurve for PowCurve {
    fn evaluate(&self, t: f32) -> f32 {
        t.clamp(0.0, 1.0).powf(self.exponent)
    }
}

struct Node {
    rect: Rect2,
    lod: Lod,
    parent: Option<NodeId>,
    /// Which quadrant of `parent` this node occupies.
    quadrant: Option<Quadrant>,
    children: Option<[NodeId; 4]>,
}

/// Per-leaf info exposed to callers: its rectangle, its LOD, and the
/// LOD of a representative neighbor in each cardinal direction (`-1`
/// if there is none).
#[derive(Debug, Clone, Copy)]
pub struct LeafInfo {
    pub bounds: Rect2,
    pub lod: Lod,
    /// Indexed by `Direction::index()`: [north, south, east, west].
    pub neighbor_lods: [i32; 4],
}

/// An adaptive quad-tree rooted at one rectangle, subdividing toward a
/// reference point.
pub struct AdaptiveQuadTree {
    nodes: Vec<Node>,
    root_side: f32,
    max_lods: u32,
    curve: Box<dyn LodCurve>,
}

impl AdaptiveQuadTree {
    pub fn new(root_rect: Rect2, max_lods: u32, curve: Box<dyn LodCurve>) -> Self {
        assert!(
            (root_rect.size.x - root_rect.size.y).abs() < 1e-3,
            "quad-tree root rect must be square"
        );
        Self {
            nodes: vec![Node {
                rect: root_rect,
                lod: 0,
                parent: None,
                quadrant: None,
                children: None,
            }],
            root_side: root_rect.size.x,
            max_lods,
            curve,
        }
    }

    pub fn root(&self) -> NodeId {
        0
    }

    pub fn is_leaf(&self, node: NodeId) -> bool {
        self.nodes[node as usize].children.is_none()
    }

    pub fn rect(&self, node: NodeId) -> Rect2 {
        self.nodes[node as usize].rect
    }

    pub fn lod(&self, node: NodeId) -> Lod {
        self.nodes[node as usize].lod
    }

    pub fn children(&self, node: NodeId) -> Option<[NodeId; 4]> {
        self.nodes[node as usize].children
    }

    /// Reset to a single root leaf, discarding all subdivisions. Used
    /// by the terrain chunk's build task before each tick's
    /// `insert_reference` + `balance` pass.
    pub fn reset(&mut self) {
        let root_rect = self.nodes[0].rect;
        self.nodes.truncate(1);
        self.nodes[0] = Node {
            rect: root_rect,
            lod: 0,
            parent: None,
            quadrant: None,
            children: None,
        };
    }

    fn lod_distance(&self, lod: Lod) -> f32 {
        let denom = (self.max_lods as f32 - 1.0).max(1.0);
        let t = if self.max_lods <= 1 {
            0.0
        } else {
            1.0 - lod as f32 / denom
        };
        (self.root_side * 0.5) * self.curve.evaluate(t)
    }

    /// Subdivide `node` into four children. Panics (per §4.2's
    /// "programmer error") if `node` is already at `max_lods`.
    fn subdivide(&mut self, node: NodeId) {
        let lod = self.nodes[node as usize].lod;
        assert!(
            lod < self.max_lods,
            "cannot subdivide a quad-tree leaf already at max_lods ({})",
            self.max_lods
        );

        let parent_rect = self.nodes[node as usize].rect;
        let mut child_ids = [0u32; 4];
        for (i, quadrant) in Quadrant::ALL.iter().enumerate() {
            let id = self.nodes.len() as NodeId;
            self.nodes.push(Node {
                rect: quadrant.subrect(parent_rect),
                lod: lod + 1,
                parent: Some(node),
                quadrant: Some(*quadrant),
                children: None,
            });
            child_ids[i] = id;
        }
        self.nodes[node as usize].children = Some(child_ids);
    }

    /// Subdivide toward `point`, starting from the root.
    pub fn insert_reference(&mut self, point: Vec2) {
        self.insert_reference_at(self.root(), point);
    }

    fn insert_reference_at(&mut self, node: NodeId, point: Vec2) {
        let lod = self.nodes[node as usize].lod;
        if lod >= self.max_lods {
            return;
        }
        let center = self.nodes[node as usize].rect.center();
        if center.distance(point) <= self.lod_distance(lod) {
            if self.is_leaf(node) {
                self.subdivide(node);
            }
            let children = self.nodes[node as usize].children.unwrap();
            for child in children {
                self.insert_reference_at(child, point);
            }
        }
    }

    /// Every leaf node id, in arena order (no particular spatial
    /// order is guaranteed).
    pub fn leaves(&self) -> Vec<NodeId> {
        (0..self.nodes.len() as NodeId)
            .filter(|&id| self.is_leaf(id))
            .collect()
    }

    /// The greater-or-equal-size neighbor of `node` in `dir`, per the
    /// classic quad-tree "climb, mirror, descend one step" algorithm.
    fn greater_or_equal_neighbor(&self, node: NodeId, dir: Direction) -> Option<NodeId> {
        let n = &self.nodes[node as usize];
        let parent_id = n.parent?;
        let quadrant = n.quadrant.expect("non-root node must have a quadrant");

        if !quadrant.on_edge(dir) {
            let sibling_quadrant = quadrant.mirror(dir);
            let parent_children = self.nodes[parent_id as usize].children.unwrap();
            return Some(parent_children[sibling_quadrant as usize]);
        }

        let mu = self.greater_or_equal_neighbor(parent_id, dir)?;
        if self.is_leaf(mu) {
            return Some(mu);
        }
        let mu_children = self.nodes[mu as usize].children.unwrap();
        let mirrored = quadrant.mirror(dir);
        Some(mu_children[mirrored as usize])
    }

    fn collect_leaves_along_edge(&self, node: NodeId, dir: Direction, out: &mut Vec<NodeId>) {
        if self.is_leaf(node) {
            out.push(node);
            return;
        }
        let children = self.nodes[node as usize].children.unwrap();
        for quadrant in dir.touching_children() {
            self.collect_leaves_along_edge(children[quadrant as usize], dir, out);
        }
    }

    /// All edge-adjacent leaf neighbors of `node` in `dir`.
    pub fn neighbors_in_direction(&self, node: NodeId, dir: Direction) -> Vec<NodeId> {
        match self.greater_or_equal_neighbor(node, dir) {
            None => Vec::new(),
            Some(mu) => {
                let mut out = Vec::new();
                self.collect_leaves_along_edge(mu, dir, &mut out);
                out
            }
        }
    }

    /// All (direction, neighbor) pairs for every cardinal direction.
    pub fn neighbors(&self, node: NodeId) -> Vec<(Direction, NodeId)> {
        Direction::ALL
            .into_iter()
            .flat_map(|dir| {
                self.neighbors_in_direction(node, dir)
                    .into_iter()
                    .map(move |n| (dir, n))
            })
            .collect()
    }

    /// Repeatedly refine until every pair of edge-adjacent leaves
    /// differs in LOD by at most 1. Terminates because only
    /// refinement occurs and depth is bounded by `max_lods`.
    pub fn balance(&mut self) {
        loop {
            let mut changed = false;
            let snapshot_len = self.nodes.len() as NodeId;
            for id in 0..snapshot_len {
                if !self.is_leaf(id) {
                    continue;
                }
                let lod = self.lod(id);
                if lod >= self.max_lods {
                    continue;
                }
                let too_coarse = Direction::ALL.iter().any(|&dir| {
                    self.neighbors_in_direction(id, dir)
                        .iter()
                        .any(|&n| self.lod(n) as i64 - lod as i64 > 1)
                });
                if too_coarse {
                    self.subdivide(id);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
    }

    /// Per-leaf bounds, LOD, and representative neighbor LODs, the
    /// read surface the terrain chunk's finalization step and the
    /// grid-mesh catalog selection consume.
    pub fn leaf_info(&self) -> Vec<LeafInfo> {
        self.leaves()
            .into_iter()
            .map(|id| {
                let mut neighbor_lods = [-1i32; 4];
                for &dir in &Direction::ALL {
                    if let Some(&n) = self.neighbors_in_direction(id, dir).first() {
                        neighbor_lods[dir.index()] = self.lod(n) as i32;
                    }
                }
                LeafInfo {
                    bounds: self.rect(id),
                    lod: self.lod(id),
                    neighbor_lods,
                }
            })
            .collect()
    }

    /// Whether every pair of edge-adjacent leaves differs in LOD by
    /// at most 1 (invariant 7's balance clause). Debug-only helper for
    /// property tests.
    pub fn balance_holds(&self) -> bool {
        self.leaves().iter().all(|&id| {
            let lod = self.lod(id) as i64;
            Direction::ALL.iter().all(|&dir| {
                self.neighbors_in_direction(id, dir)
                    .iter()
                    .all(|&n| (self.lod(n) as i64 - lod).abs() <= 1)
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(root: Rect2, max_lods: u32) -> AdaptiveQuadTree {
        AdaptiveQuadTree::new(root, max_lods, Box::new(IdentityCurve))
    }

    #[test]
    fn max_lods_zero_is_single_leaf_for_any_input() {
        let mut t = tree(Rect2::new(Vec2::ZERO, Vec2::splat(400.0)), 0);
        t.insert_reference(Vec2::new(50.0, 50.0));
        assert_eq!(t.leaves(), vec![0]);

        t.insert_reference(Vec2::new(399.0, 399.0));
        assert_eq!(t.leaves().len(), 1);
    }

    #[test]
    fn lod_distance_at_max_lods_one_uses_the_maxlods_minus_one_threshold() {
        // max_lods == 1 means the only queried lod (0) is also
        // `maxLods - 1`, whose threshold is `0.5 * rootSide *
        // lodCurve(0)`, not `lodCurve(1)`.
        let t = tree(Rect2::new(Vec2::ZERO, Vec2::splat(100.0)), 1);
        assert_eq!(t.lod_distance(0), 0.0);
    }

    #[test]
    fn insert_reference_is_idempotent_after_reset() {
        let mut t = tree(Rect2::new(Vec2::ZERO, Vec2::splat(400.0)), 3);
        t.insert_reference(Vec2::new(50.0, 50.0));
        let first_leaf_count = t.leaves().len();

        t.reset();
        t.insert_reference(Vec2::new(50.0, 50.0));
        assert_eq!(t.leaves().len(), first_leaf_count);
    }

    #[test]
    fn double_insert_reference_same_point_is_stable() {
        let mut t = tree(Rect2::new(Vec2::ZERO, Vec2::splat(400.0)), 3);
        t.insert_reference(Vec2::new(50.0, 50.0));
        let first = t.leaves().len();
        t.insert_reference(Vec2::new(50.0, 50.0));
        assert_eq!(t.leaves().len(), first);
    }

    #[test]
    fn subdivide_near_reference_point_increases_depth_near_it() {
        let mut t = tree(Rect2::new(Vec2::ZERO, Vec2::splat(400.0)), 4);
        t.insert_reference(Vec2::new(10.0, 10.0));

        let near_leaf = t
            .leaves()
            .into_iter()
            .min_by(|&a, &b| {
                t.rect(a)
                    .center()
                    .distance(Vec2::new(10.0, 10.0))
                    .total_cmp(&t.rect(b).center().distance(Vec2::new(10.0, 10.0)))
            })
            .unwrap();
        let far_leaf = t
            .leaves()
            .into_iter()
            .max_by(|&a, &b| {
                t.rect(a)
                    .center()
                    .distance(Vec2::new(10.0, 10.0))
                    .total_cmp(&t.rect(b).center().distance(Vec2::new(10.0, 10.0)))
            })
            .unwrap();
        assert!(t.lod(near_leaf) > t.lod(far_leaf));
    }

    #[test]
    fn balance_holds_after_balancing_arbitrary_reference() {
        let mut t = tree(Rect2::new(Vec2::ZERO, Vec2::splat(800.0)), 4);
        t.insert_reference(Vec2::new(15.0, 15.0));
        assert!(!t.balance_holds() || t.leaves().len() == 1);
        t.balance();
        assert!(t.balance_holds());
    }

    #[test]
    fn balance_never_reduces_depth() {
        let mut t = tree(Rect2::new(Vec2::ZERO, Vec2::splat(800.0)), 5);
        t.insert_reference(Vec2::new(5.0, 5.0));
        let max_lod_before = t.leaves().iter().map(|&id| t.lod(id)).max().unwrap();
        t.balance();
        let max_lod_after = t.leaves().iter().map(|&id| t.lod(id)).max().unwrap();
        assert!(max_lod_after >= max_lod_before);
    }

    #[test]
    #[should_panic(expected = "cannot subdivide")]
    fn subdividing_at_max_lods_panics() {
        let mut t = tree(Rect2::new(Vec2::ZERO, Vec2::splat(100.0)), 0);
        t.subdivide(0);
    }

    #[test]
    fn neighbor_query_of_root_is_empty() {
        let t = tree(Rect2::new(Vec2::ZERO, Vec2::splat(400.0)), 3);
        for dir in Direction::ALL {
            assert!(t.neighbors_in_direction(t.root(), dir).is_empty());
        }
    }

    #[test]
    fn sibling_neighbors_share_the_expected_edge() {
        let mut t = tree(Rect2::new(Vec2::ZERO, Vec2::splat(400.0)), 1);
        t.insert_reference(Vec2::new(1.0, 1.0));
        let children = t.children(t.root()).unwrap();
        let nw = children[Quadrant::Nw as usize];
        let ne = children[Quadrant::Ne as usize];
        let sw = children[Quadrant::Sw as usize];

        // NW's east neighbor is NE; NW's south neighbor is SW.
        assert_eq!(t.neighbors_in_direction(nw, Direction::East), vec![ne]);
        assert_eq!(t.neighbors_in_direction(nw, Direction::South), vec![sw]);
    }
}

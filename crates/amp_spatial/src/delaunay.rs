//! Delaunay triangulation over a flat site set, and the barycentric
//! query the triangulation chunk's `biomes_at` uses (§4.5.2, C5.2).
//!
//! The original engine links `jc_voronoi` (a C single-header Voronoi/
//! Delaunay library) for this. Nothing in this crate's dependency stack
//! brings an equivalent, so this is a direct Bowyer-Watson
//! implementation: sites per chunk are small (a handful of 4x4 point
//! grids from neighboring chunks), so the O(n^2) per-insertion scan is
//! not a concern.

use glam::Vec2;

fn signed_area2(a: Vec2, b: Vec2, c: Vec2) -> f32 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

fn make_ccw(points: &[Vec2], mut v: [usize; 3]) -> [usize; 3] {
    if signed_area2(points[v[0]], points[v[1]], points[v[2]]) < 0.0 {
        v.swap(1, 2);
    }
    v
}

/// Whether `p` lies inside the circumcircle of the CCW-wound triangle
/// `(a, b, c)`. Computed in `f64` since the determinant involves
/// squared magnitudes that lose precision quickly in `f32`.
fn in_circumcircle(a: Vec2, b: Vec2, c: Vec2, p: Vec2) -> bool {
    let ax = a.x as f64 - p.x as f64;
    let ay = a.y as f64 - p.y as f64;
    let bx = b.x as f64 - p.x as f64;
    let by = b.y as f64 - p.y as f64;
    let cx = c.x as f64 - p.x as f64;
    let cy = c.y as f64 - p.y as f64;

    let det = (ax * ax + ay * ay) * (bx * cy - cx * by) - (bx * bx + by * by) * (ax * cy - cx * ay)
        + (cx * cx + cy * cy) * (ax * by - bx * ay);
    det > 0.0
}

/// Bowyer-Watson Delaunay triangulation of `sites`, returning triples of
/// indices into `sites`. Triangles are deduplicated by their sorted
/// index triple, per §3's entity definition of a Delaunay triangle.
/// Returns an empty set for fewer than 3 sites.
pub fn triangulate(sites: &[Vec2]) -> Vec<[usize; 3]> {
    if sites.len() < 3 {
        return Vec::new();
    }

    let mut min = sites[0];
    let mut max = sites[0];
    for &p in sites {
        min = min.min(p);
        max = max.max(p);
    }
    let span = (max - min).max(Vec2::splat(1.0));
    let margin = span.max_element() * 20.0;
    let center = (min + max) * 0.5;

    let super0 = sites.len();
    let super1 = sites.len() + 1;
    let super2 = sites.len() + 2;

    let mut points = sites.to_vec();
    points.push(Vec2::new(center.x - 2.0 * margin, center.y - margin));
    points.push(Vec2::new(center.x, center.y + 2.0 * margin));
    points.push(Vec2::new(center.x + 2.0 * margin, center.y - margin));

    let mut triangles: Vec<[usize; 3]> = vec![make_ccw(&points, [super0, super1, super2])];

    for i in 0..sites.len() {
        let p = points[i];

        let bad: Vec<usize> = triangles
            .iter()
            .enumerate()
            .filter(|&(_, &[a, b, c])| in_circumcircle(points[a], points[b], points[c], p))
            .map(|(idx, _)| idx)
            .collect();

        let mut edges: Vec<(usize, usize)> = Vec::new();
        for &ti in &bad {
            let [a, b, c] = triangles[ti];
            edges.push((a, b));
            edges.push((b, c));
            edges.push((c, a));
        }

        let boundary: Vec<(usize, usize)> = edges
            .iter()
            .copied()
            .filter(|&(e0, e1)| {
                edges
                    .iter()
                    .filter(|&&(f0, f1)| (f0 == e0 && f1 == e1) || (f0 == e1 && f1 == e0))
                    .count()
                    == 1
            })
            .collect();

        let mut bad_sorted = bad;
        bad_sorted.sort_unstable_by(|a, b| b.cmp(a));
        for ti in bad_sorted {
            triangles.remove(ti);
        }

        for (e0, e1) in boundary {
            triangles.push(make_ccw(&points, [e0, e1, i]));
        }
    }

    triangles.retain(|&[a, b, c]| a < super0 && b < super0 && c < super0);

    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::with_capacity(triangles.len());
    for tri in triangles {
        let mut sorted = tri;
        sorted.sort_unstable();
        if seen.insert(sorted) {
            out.push(tri);
        }
    }
    out
}

/// Barycentric weights `(u, v, w)` of `p` against triangle `(a, b, c)`,
/// such that `p = u*a + v*b + w*c`. `None` if the triangle is
/// degenerate (zero area).
pub fn barycentric_weights(p: Vec2, a: Vec2, b: Vec2, c: Vec2) -> Option<(f32, f32, f32)> {
    let v0 = b - a;
    let v1 = c - a;
    let v2 = p - a;
    let d00 = v0.dot(v0);
    let d01 = v0.dot(v1);
    let d11 = v1.dot(v1);
    let d20 = v2.dot(v0);
    let d21 = v2.dot(v1);
    let denom = d00 * d11 - d01 * d01;
    if denom.abs() < 1e-8 {
        return None;
    }
    let v = (d11 * d20 - d01 * d21) / denom;
    let w = (d00 * d21 - d01 * d20) / denom;
    let u = 1.0 - v - w;
    Some((u, v, w))
}

/// Whether barycentric weights place the point inside the triangle
/// (with a small tolerance for points exactly on an edge).
pub fn weights_inside_triangle(weights: (f32, f32, f32)) -> bool {
    const EPS: f32 = -1e-4;
    weights.0 >= EPS && weights.1 >= EPS && weights.2 >= EPS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_e_barycentric_weights() {
        let (u, v, w) =
            barycentric_weights(Vec2::new(0.25, 0.25), Vec2::ZERO, Vec2::new(1.0, 0.0), Vec2::new(0.0, 1.0))
                .unwrap();
        assert!((u - 0.5).abs() < 1e-4);
        assert!((v - 0.25).abs() < 1e-4);
        assert!((w - 0.25).abs() < 1e-4);
        assert!((u + v + w - 1.0).abs() < 1e-4);
    }

    #[test]
    fn triangulate_single_triangle() {
        let sites = vec![Vec2::new(0.0, 0.0), Vec2::new(10.0, 0.0), Vec2::new(0.0, 10.0)];
        let tris = triangulate(&sites);
        assert_eq!(tris.len(), 1);
        let mut sorted = tris[0];
        sorted.sort_unstable();
        assert_eq!(sorted, [0, 1, 2]);
    }

    #[test]
    fn triangulate_grid_covers_every_site_with_some_triangle() {
        let mut sites = Vec::new();
        for y in 0..4 {
            for x in 0..4 {
                sites.push(Vec2::new(x as f32 * 10.0, y as f32 * 10.0));
            }
        }
        let tris = triangulate(&sites);
        assert!(!tris.is_empty());

        let mut covered = vec![false; sites.len()];
        for &[a, b, c] in &tris {
            covered[a] = true;
            covered[b] = true;
            covered[c] = true;
        }
        assert!(covered.iter().all(|&c| c), "every site should appear in at least one triangle");
    }

    #[test]
    fn triangle_indices_are_deduplicated_and_valid() {
        let sites = vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(10.0, 0.0),
            Vec2::new(10.0, 10.0),
            Vec2::new(0.0, 10.0),
            Vec2::new(5.0, 5.0),
        ];
        let tris = triangulate(&sites);
        let mut seen = std::collections::HashSet::new();
        for &[a, b, c] in &tris {
            let mut sorted = [a, b, c];
            sorted.sort_unstable();
            assert!(seen.insert(sorted), "duplicate triangle {sorted:?}");
            assert!(a < sites.len() && b < sites.len() && c < sites.len());
        }
    }

    #[test]
    fn point_outside_any_triangle_is_not_inside() {
        let a = Vec2::new(0.0, 0.0);
        let b = Vec2::new(1.0, 0.0);
        let c = Vec2::new(0.0, 1.0);
        let weights = barycentric_weights(Vec2::new(5.0, 5.0), a, b, c).unwrap();
        assert!(!weights_inside_triangle(weights));
    }
}

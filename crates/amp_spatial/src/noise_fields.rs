//! Deterministic noise and PRNG helpers shared across the per-layer
//! chunk builders: chunk-position-seeded PRNGs for Voronoi site
//! jitter, and named Perlin fields for biome classification and
//! height synthesis.

use glam::Vec2;
use noise::{NoiseFn, Perlin};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::chunk::ChunkIndex;

/// Seed a reproducible PRNG from a chunk's index, so rebuilding the
/// same chunk twice (e.g. after an unload/reload) always reproduces
/// the same site positions.
pub fn rng_for_chunk(index: ChunkIndex, layer_salt: u64) -> ChaCha8Rng {
    let seed = hash_chunk(index, layer_salt);
    ChaCha8Rng::seed_from_u64(seed)
}

fn hash_chunk(index: ChunkIndex, salt: u64) -> u64 {
    // Fibonacci/splitmix-style integer hash; deterministic and has no
    // dependency on platform hasher randomization, unlike
    // `std::collections::hash_map::DefaultHasher`.
    let mut x = (index.x as i64 as u64)
        .wrapping_mul(0x9E3779B97F4A7C15)
        ^ (index.y as i64 as u64).wrapping_mul(0xC2B2AE3D27D4EB4F)
        ^ salt.wrapping_mul(0xD6E8FEB86659FD93);
    x ^= x >> 33;
    x = x.wrapping_mul(0xff51afd7ed558ccd);
    x ^= x >> 33;
    x = x.wrapping_mul(0xc4ceb9fe1a85ec53);
    x ^= x >> 33;
    x
}

/// A named 2D Perlin field sampled at a given frequency, wrapping the
/// `noise` crate's `Perlin` the way the terrain heightmap generator
/// does.
#[derive(Debug, Clone)]
pub struct ScalarField2 {
    perlin: Perlin,
    frequency: f64,
}

impl ScalarField2 {
    pub fn new(seed: u32, frequency: f32) -> Self {
        Self {
            perlin: Perlin::new(seed),
            frequency: frequency as f64,
        }
    }

    /// Sample at a world position, returning a value in `[-1, 1]`.
    pub fn sample(&self, world_pos: Vec2) -> f32 {
        self.perlin.get([
            world_pos.x as f64 * self.frequency,
            world_pos.y as f64 * self.frequency,
        ]) as f32
    }

    /// Convenience for the heightmap synthesis rule in §4.5.3:
    /// `(noise * 0.5 + 0.5)`, folding the field into `[0, 1]`.
    pub fn sample_unit(&self, world_pos: Vec2) -> f32 {
        self.sample(world_pos) * 0.5 + 0.5
    }
}

/// Sample a jittered point within `cell_center +/- cell_size/2`, used
/// by the Voronoi-points layer.
pub fn jittered_point(rng: &mut ChaCha8Rng, cell_center: Vec2, cell_size: f32) -> Vec2 {
    let half = cell_size * 0.5;
    Vec2::new(
        cell_center.x + rng.gen_range(-half..=half),
        cell_center.y + rng.gen_range(-half..=half),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_chunk_index_produces_same_seed() {
        let a = hash_chunk(ChunkIndex::new(3, -2), 7);
        let b = hash_chunk(ChunkIndex::new(3, -2), 7);
        assert_eq!(a, b);
    }

    #[test]
    fn different_salts_diverge() {
        let a = hash_chunk(ChunkIndex::new(3, -2), 7);
        let b = hash_chunk(ChunkIndex::new(3, -2), 8);
        assert_ne!(a, b);
    }

    #[test]
    fn jittered_point_stays_within_cell() {
        let mut rng = rng_for_chunk(ChunkIndex::new(0, 0), 1);
        let center = Vec2::new(100.0, 100.0);
        for _ in 0..50 {
            let p = jittered_point(&mut rng, center, 20.0);
            assert!((p.x - center.x).abs() <= 10.0 + 1e-4);
            assert!((p.y - center.y).abs() <= 10.0 + 1e-4);
        }
    }

    #[test]
    fn scalar_field_sample_unit_is_bounded() {
        let field = ScalarField2::new(42, 0.01);
        for i in 0..20 {
            let v = field.sample_unit(Vec2::new(i as f32 * 13.0, i as f32 * 7.0));
            assert!((0.0..=1.0).contains(&v));
        }
    }
}

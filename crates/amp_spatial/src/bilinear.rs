//! World-bounded bilinear scalar field sampling (§4.7, C7).
//!
//! This is the common read surface between layers: the heightmap
//! layer stores one `BilinearField` per chunk, and the road layer
//! samples it per-pixel through the heightmap layer's accessor rather
//! than touching the field directly.

use amp_math::rect2::Rect2;
use glam::Vec2;

/// A `dimension x dimension` grid of floats mapped onto a world
/// rectangle, with half-pixel-centered, border-clamped sampling.
#[derive(Debug, Clone)]
pub struct BilinearField {
    dimension: u32,
    bounds: Rect2,
    values: Vec<f32>,
}

fn inverse_lerp(a: f32, b: f32, v: f32) -> f32 {
    if (b - a).abs() < f32::EPSILON {
        0.0
    } else {
        ((v - a) / (b - a)).clamp(0.0, 1.0)
    }
}

impl BilinearField {
    /// Build a field from row-major `values` (`values[y * dimension +
    /// x]`), covering `bounds`.
    pub fn new(dimension: u32, bounds: Rect2, values: Vec<f32>) -> Self {
        assert_eq!(
            values.len(),
            (dimension * dimension) as usize,
            "bilinear field value count must be dimension^2"
        );
        Self {
            dimension,
            bounds,
            values,
        }
    }

    /// Build a field by evaluating `f` at each pixel's world position.
    /// `f` is called with the sample's world-space coordinate.
    pub fn from_fn(dimension: u32, bounds: Rect2, mut f: impl FnMut(Vec2) -> f32) -> Self {
        let mut values = Vec::with_capacity((dimension * dimension) as usize);
        let d = dimension as f32;
        for y in 0..dimension {
            for x in 0..dimension {
                let u = (x as f32 + 0.5) / d;
                let v = (y as f32 + 0.5) / d;
                let world = bounds.position + Vec2::new(u, v) * bounds.size;
                values.push(f(world));
            }
        }
        Self::new(dimension, bounds, values)
    }

    pub fn dimension(&self) -> u32 {
        self.dimension
    }

    pub fn bounds(&self) -> Rect2 {
        self.bounds
    }

    fn pixel(&self, x: u32, y: u32) -> f32 {
        self.values[(y * self.dimension + x) as usize]
    }

    /// Sample at a world position. `world_pos` must lie within
    /// `bounds`; out-of-bounds sampling is a caller error (the layer
    /// is responsible for locating the correct chunk first).
    pub fn sample(&self, world_pos: Vec2) -> f32 {
        let max = self.bounds.max();
        let eps = 1e-4;
        assert!(
            world_pos.x >= self.bounds.position.x - eps
                && world_pos.x <= max.x + eps
                && world_pos.y >= self.bounds.position.y - eps
                && world_pos.y <= max.y + eps,
            "sample position {world_pos:?} outside field bounds {:?}",
            self.bounds
        );

        let d = self.dimension as f32;
        let rel = (world_pos - self.bounds.position) / self.bounds.size;
        // Scale into [0, D] with half-pixel centering so the four
        // corners of the rect map exactly to the four corner pixels.
        let coord = rel * (1.0 - 1.0 / d) * d + Vec2::splat(0.5);

        // `coord` is in pixel-center units (pixel i's center sits at
        // i + 0.5), so the lower bracketing pixel is found by
        // subtracting the half-pixel offset before flooring, not by
        // flooring `coord` itself and stepping back one.
        let x0 = (coord.x - 0.5).floor().clamp(0.0, (self.dimension - 1) as f32) as u32;
        let y0 = (coord.y - 0.5).floor().clamp(0.0, (self.dimension - 1) as f32) as u32;
        let x1 = (x0 + 1).min(self.dimension - 1);
        let y1 = (y0 + 1).min(self.dimension - 1);

        let wx = inverse_lerp(x0 as f32 + 0.5, x1 as f32 + 0.5, coord.x);
        let wy = inverse_lerp(y0 as f32 + 0.5, y1 as f32 + 0.5, coord.y);

        let v00 = self.pixel(x0, y0);
        let v10 = self.pixel(x1, y0);
        let v01 = self.pixel(x0, y1);
        let v11 = self.pixel(x1, y1);

        let top = v00 + (v10 - v00) * wx;
        let bottom = v01 + (v11 - v01) * wx;
        top + (bottom - top) * wy
    }

    /// `(value, gradient)` via forward finite differences of step
    /// `eps` along both world axes.
    pub fn sample_with_gradient(&self, world_pos: Vec2, eps: f32) -> (f32, Vec2) {
        let h = self.sample(world_pos);
        let hx = self.sample_clamped(world_pos + Vec2::new(eps, 0.0));
        let hy = self.sample_clamped(world_pos + Vec2::new(0.0, eps));
        (h, Vec2::new((hx - h) / eps, (hy - h) / eps))
    }

    fn sample_clamped(&self, world_pos: Vec2) -> f32 {
        let max = self.bounds.max();
        let clamped = world_pos.clamp(self.bounds.position, max);
        self.sample(clamped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario_c_field() -> BilinearField {
        // Scenario C: 4x4 field, data[y][x] = x + 4y, over rect (0,0,1,1).
        let mut values = vec![0.0; 16];
        for y in 0..4u32 {
            for x in 0..4u32 {
                values[(y * 4 + x) as usize] = (x + 4 * y) as f32;
            }
        }
        BilinearField::new(4, Rect2::new(Vec2::ZERO, Vec2::ONE), values)
    }

    #[test]
    fn scenario_c_corners_and_center() {
        let field = scenario_c_field();
        assert!((field.sample(Vec2::new(0.0, 0.0)) - 0.0).abs() < 1e-4);
        assert!((field.sample(Vec2::new(1.0, 1.0)) - 15.0).abs() < 1e-4);
        assert!((field.sample(Vec2::new(0.5, 0.5)) - 7.5).abs() < 1e-4);
    }

    #[test]
    fn corners_clamp_to_nearest_pixel_no_wrap() {
        let field = scenario_c_field();
        // Bottom-right corner (1,0) should read the top-right pixel (x=3,y=0) = 3.
        assert!((field.sample(Vec2::new(1.0, 0.0)) - 3.0).abs() < 1e-4);
        // Top-left-ish corner (0,1) should read the bottom-left pixel (x=0,y=3) = 12.
        assert!((field.sample(Vec2::new(0.0, 1.0)) - 12.0).abs() < 1e-4);
    }

    #[test]
    fn constant_field_samples_constant_everywhere() {
        let field = BilinearField::new(8, Rect2::new(Vec2::ZERO, Vec2::splat(100.0)), vec![3.5; 64]);
        for i in 0..10 {
            let p = Vec2::splat(i as f32 * 10.0);
            assert!((field.sample(p) - 3.5).abs() < 1e-4);
        }
    }

    #[test]
    fn samples_past_a_pixel_centers_midpoint_bracket_the_next_pixel_pair() {
        // Regression: a sample whose pixel-center coordinate lands in
        // the upper half of a pixel's interval (not exactly on a
        // pixel center or the midpoint between two) must interpolate
        // between that pixel and its *next* neighbor, not fall back to
        // the previous pair.
        // Every row identical (x*10), so the y bracket doesn't matter.
        let mut values = vec![0.0f32; 16];
        for y in 0..4u32 {
            for x in 0..4u32 {
                values[(y * 4 + x) as usize] = x as f32 * 10.0;
            }
        }
        let field = BilinearField::new(4, Rect2::new(Vec2::ZERO, Vec2::ONE), values);
        // Pixel centers sit at rel 0.125, 0.375, 0.625, 0.875; rel =
        // 0.7333 lies between the third and fourth pixel centers.
        let sample = field.sample(Vec2::new(0.7333, 0.125));
        assert!((sample - 24.33).abs() < 0.1, "got {sample}");
    }

    #[test]
    fn gradient_of_linear_ramp_is_constant() {
        // f(x, y) = x. Over a 100x100 world rect, gradient should read ~1 on x, ~0 on y.
        let dim = 32;
        let bounds = Rect2::new(Vec2::ZERO, Vec2::splat(100.0));
        let field = BilinearField::from_fn(dim, bounds, |p| p.x);
        let (_, grad) = field.sample_with_gradient(Vec2::new(50.0, 50.0), 1.0);
        assert!((grad.x - 1.0).abs() < 0.1);
        assert!(grad.y.abs() < 0.1);
    }
}

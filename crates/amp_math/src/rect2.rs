//! Axis-aligned rectangles in 2D world space.
//!
//! The worldgen engine works entirely in a flattened XZ-style 2D plane
//! (chunk bounds, quad-tree node rectangles, biome selector rectangles).
//! `Rect2` is the one bounding-volume type the engine needs; it follows
//! the same builder-and-intersection-test shape as this crate's 3D
//! `Aabb`, scaled down to two axes.
//!
//! # Examples
//!
//! ```rust
//! use amp_math::rect2::Rect2;
//! use glam::Vec2;
//!
//! let a = Rect2::new(Vec2::ZERO, Vec2::new(100.0, 100.0));
//! let b = a.grow(10.0);
//! assert!(b.intersects(&a));
//! ```

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// An axis-aligned rectangle in world space, given by its minimum
/// corner (`position`) and non-negative `size`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect2 {
    /// Minimum corner of the rectangle.
    pub position: Vec2,
    /// Width and height of the rectangle; both components non-negative.
    pub size: Vec2,
}

impl Rect2 {
    /// Create a new rectangle from a minimum corner and a size.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use amp_math::rect2::Rect2;
    /// use glam::Vec2;
    ///
    /// let rect = Rect2::new(Vec2::ZERO, Vec2::new(10.0, 10.0));
    /// ```
    pub fn new(position: Vec2, size: Vec2) -> Self {
        Self { position, size }
    }

    /// Create a rectangle from a center point and a side length,
    /// matching `ChunkIndex * chunkSize` semantics: the chunk at index
    /// `(ix, iz)` with side `s` occupies
    /// `[ix*s, ix*s+s) x [iz*s, iz*s+s)`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use amp_math::rect2::Rect2;
    ///
    /// let rect = Rect2::from_chunk_index(2, -1, 100.0);
    /// assert_eq!(rect.position.x, 200.0);
    /// assert_eq!(rect.position.y, -100.0);
    /// ```
    pub fn from_chunk_index(ix: i32, iy: i32, side: f32) -> Self {
        Self {
            position: Vec2::new(ix as f32 * side, iy as f32 * side),
            size: Vec2::splat(side),
        }
    }

    /// The center point of the rectangle.
    pub fn center(&self) -> Vec2 {
        self.position + self.size * 0.5
    }

    /// The maximum corner of the rectangle (`position + size`).
    pub fn max(&self) -> Vec2 {
        self.position + self.size
    }

    /// A rectangle grown by `amount` on every side (negative shrinks).
    ///
    /// # Examples
    ///
    /// ```rust
    /// use amp_math::rect2::Rect2;
    /// use glam::Vec2;
    ///
    /// let rect = Rect2::new(Vec2::ZERO, Vec2::new(10.0, 10.0));
    /// let grown = rect.grow(5.0);
    /// assert_eq!(grown.position, Vec2::new(-5.0, -5.0));
    /// assert_eq!(grown.size, Vec2::new(20.0, 20.0));
    /// ```
    pub fn grow(&self, amount: f32) -> Self {
        Self {
            position: self.position - Vec2::splat(amount),
            size: self.size + Vec2::splat(amount * 2.0),
        }
    }

    /// Whether this rectangle overlaps `other` (touching edges count as
    /// overlapping, not merely adjacent).
    ///
    /// # Examples
    ///
    /// ```rust
    /// use amp_math::rect2::Rect2;
    /// use glam::Vec2;
    ///
    /// let a = Rect2::new(Vec2::ZERO, Vec2::new(10.0, 10.0));
    /// let b = Rect2::new(Vec2::new(5.0, 5.0), Vec2::new(10.0, 10.0));
    /// assert!(a.intersects(&b));
    /// ```
    pub fn intersects(&self, other: &Self) -> bool {
        let a_max = self.max();
        let b_max = other.max();
        self.position.x <= b_max.x
            && a_max.x >= other.position.x
            && self.position.y <= b_max.y
            && a_max.y >= other.position.y
    }

    /// Whether `point` lies within this rectangle (half-open: the
    /// maximum edge is excluded, matching `ChunkIndex` tiling).
    pub fn contains_point(&self, point: Vec2) -> bool {
        let max = self.max();
        point.x >= self.position.x
            && point.x < max.x
            && point.y >= self.position.y
            && point.y < max.y
    }

    /// Union of this rectangle and `other`: the smallest rectangle
    /// containing both.
    pub fn union(&self, other: &Self) -> Self {
        let min = self.position.min(other.position);
        let max = self.max().max(other.max());
        Self {
            position: min,
            size: max - min,
        }
    }
}

//! Small math library for the worldgen engine's 2D spatial calculations.
//!
//! The engine works in a flattened world plane, so this crate is
//! intentionally narrow: `Rect2` is the one bounding-volume type chunk
//! bounds, quad-tree nodes, and biome selector rectangles all share.
//!
//! # Examples
//!
//! ```rust
//! use amp_math::rect2::Rect2;
//! use glam::Vec2;
//!
//! let chunk = Rect2::from_chunk_index(0, 0, 100.0);
//! let padded = chunk.grow(10.0);
//! assert!(padded.contains_point(Vec2::new(-5.0, -5.0)));
//! ```

pub mod rect2;

pub use glam::*;

//! Bounded GPU texture-array slot pool with RAII handles (§4.4, C4).
//!
//! The pool itself never touches a GPU; it hands out `u32` slot
//! indices into a texture array the host owns, via the [`TextureHost`]
//! trait (§6's `createTextureArray`/`updateTextureLayer`). This keeps
//! the pool testable without a real graphics backend, matching the
//! engine's split between spatial/logic crates and the GPU backend.

use std::sync::{Arc, Mutex};

/// Pixel format of a texture array, mirrored from the host config
/// table (`terrain.normal_height_texture_size` implies the format is
/// fixed per pool; only dimensions vary across LODs).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureFormat {
    Rgba8,
    Rg16Float,
}

/// An image payload uploaded into one texture-array layer.
#[derive(Debug, Clone)]
pub struct TextureImage {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub pixels: Vec<u8>,
}

/// The host-owned texture array a pool draws its slots from. A real
/// renderer implements this against `wgpu`; tests use a recording
/// double.
pub trait TextureHost: Send + Sync {
    fn upload_layer(&self, slot: u32, image: &TextureImage);
}

struct Inner {
    free: Vec<u32>,
}

/// A fixed-capacity pool of texture-array slot indices `[0, capacity)`.
pub struct TextureSlotPool {
    capacity: u32,
    dimensions: (u32, u32),
    format: TextureFormat,
    host: Arc<dyn TextureHost>,
    inner: Mutex<Inner>,
}

impl TextureSlotPool {
    pub fn new(
        capacity: u32,
        dimensions: (u32, u32),
        format: TextureFormat,
        host: Arc<dyn TextureHost>,
    ) -> Self {
        Self {
            capacity,
            dimensions,
            format,
            host,
            inner: Mutex::new(Inner {
                free: (0..capacity).rev().collect(),
            }),
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.dimensions
    }

    /// Number of slots currently checked out. For debug/property
    /// tests asserting §8's "live handles <= capacity" invariant.
    pub fn used_slots(&self) -> u32 {
        let inner = self.inner.lock().expect("texture pool poisoned");
        self.capacity - inner.free.len() as u32
    }

    /// Acquire the smallest available slot, wrapped in a scoped
    /// handle. Returns `None` if the pool is exhausted — a normal,
    /// transient condition callers surface as "producer stalled", not
    /// an error.
    pub fn acquire(self: &Arc<Self>) -> Option<TextureSlotHandle> {
        let mut inner = self.inner.lock().expect("texture pool poisoned");
        let slot = inner.free.pop()?;
        drop(inner);
        Some(TextureSlotHandle {
            pool: self.clone(),
            slot,
        })
    }

    /// Replace the contents of `slot`. The image must match the
    /// pool's configured dimensions; a mismatch is a programmer error.
    pub fn upload(&self, slot: u32, image: &TextureImage) {
        assert_eq!(
            (image.width, image.height),
            self.dimensions,
            "image dimensions do not match texture pool dimensions"
        );
        assert_eq!(
            image.format, self.format,
            "image format does not match texture pool format"
        );
        self.host.upload_layer(slot, image);
    }

    fn release(&self, slot: u32) {
        let mut inner = self.inner.lock().expect("texture pool poisoned");
        inner.free.push(slot);
    }
}

/// Scoped acquisition of one texture-array slot. Returns the slot to
/// the pool's free list when dropped; leaking a handle (forgetting it)
/// would shrink the usable pool, which debug builds can catch by
/// asserting `used_slots() == 0` at pool teardown.
pub struct TextureSlotHandle {
    pool: Arc<TextureSlotPool>,
    slot: u32,
}

impl TextureSlotHandle {
    pub fn slot(&self) -> u32 {
        self.slot
    }

    pub fn upload(&self, image: &TextureImage) {
        self.pool.upload(self.slot, image);
    }
}

impl Drop for TextureSlotHandle {
    fn drop(&mut self) {
        self.pool.release(self.slot);
    }
}

impl std::fmt::Debug for TextureSlotHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextureSlotHandle")
            .field("slot", &self.slot)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullHost;
    impl TextureHost for NullHost {
        fn upload_layer(&self, _slot: u32, _image: &TextureImage) {}
    }

    fn pool(capacity: u32) -> Arc<TextureSlotPool> {
        Arc::new(TextureSlotPool::new(
            capacity,
            (64, 64),
            TextureFormat::Rgba8,
            Arc::new(NullHost),
        ))
    }

    #[test]
    fn acquire_returns_smallest_free_slot() {
        let pool = pool(4);
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert_eq!(a.slot(), 0);
        assert_eq!(b.slot(), 1);
    }

    #[test]
    fn capacity_zero_always_exhausted() {
        let pool = pool(0);
        assert!(pool.acquire().is_none());
    }

    #[test]
    fn exhaustion_and_recycling() {
        let pool = pool(1);
        let handle = pool.acquire().unwrap();
        assert!(pool.acquire().is_none(), "capacity 1 pool must be exhausted");

        drop(handle);
        assert!(
            pool.acquire().is_some(),
            "dropping the handle must return its slot to the free list"
        );
    }

    #[test]
    fn used_slots_tracks_live_handles() {
        let pool = pool(3);
        assert_eq!(pool.used_slots(), 0);
        let a = pool.acquire().unwrap();
        let _b = pool.acquire().unwrap();
        assert_eq!(pool.used_slots(), 2);
        drop(a);
        assert_eq!(pool.used_slots(), 1);
    }

    #[test]
    #[should_panic(expected = "image dimensions")]
    fn upload_mismatched_dimensions_panics() {
        let pool = pool(1);
        let handle = pool.acquire().unwrap();
        handle.upload(&TextureImage {
            width: 32,
            height: 32,
            format: TextureFormat::Rgba8,
            pixels: vec![0; 32 * 32 * 4],
        });
    }
}

use std::collections::HashMap;

use crate::compile::scheduler::CacheProbe;
use crate::foundation::core::{Point, Uid};
use crate::render::backend::RasterSurface;

/// One cached rasterization.
#[derive(Debug)]
pub struct CacheEntry<S> {
    pub width: u32,
    pub height: u32,
    /// Where the surface's top-left corner sits in the space it was rendered in.
    pub origin: Point,
    pub surface: S,
}

/// Per-node rasterizations that survive across passes until invalidated.
///
/// Owns its surfaces outright; they never come from or go back to the surface allocator.
#[derive(Debug)]
pub struct BitmapCache<S> {
    entries: HashMap<Uid, CacheEntry<S>>,
}

impl<S> Default for BitmapCache<S> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<S: RasterSurface> BitmapCache<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Same uid and same requested size.
    pub fn is_valid(&self, uid: &Uid, width: u32, height: u32) -> bool {
        self.entries
            .get(uid)
            .is_some_and(|e| e.width == width && e.height == height)
    }

    pub fn get(&self, uid: &Uid) -> Option<&CacheEntry<S>> {
        self.entries.get(uid)
    }

    /// Valid entry for `uid` at the requested size.
    pub fn lookup(&self, uid: &Uid, width: u32, height: u32) -> Option<&CacheEntry<S>> {
        self.entries
            .get(uid)
            .filter(|e| e.width == width && e.height == height)
    }

    pub fn store(&mut self, uid: Uid, origin: Point, surface: S) {
        let entry = CacheEntry {
            width: surface.width(),
            height: surface.height(),
            origin,
            surface,
        };
        tracing::debug!(%uid, w = entry.width, h = entry.height, "bitmap cache write");
        self.entries.insert(uid, entry);
    }

    pub fn invalidate(&mut self, uid: &Uid) -> bool {
        self.entries.remove(uid).is_some()
    }

    pub fn invalidate_all(&mut self) {
        self.entries.clear();
    }

    /// Drop every entry and release their surfaces.
    pub fn dispose(&mut self) {
        self.entries.clear();
        self.entries.shrink_to_fit();
    }
}

impl<S: RasterSurface> CacheProbe for BitmapCache<S> {
    fn is_valid(&self, uid: &Uid, width: u32, height: u32) -> bool {
        BitmapCache::is_valid(self, uid, width, height)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/cache.rs"]
mod tests;

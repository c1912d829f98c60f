use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::foundation::error::EaselResult;
use crate::render::backend::{RasterSurface, SurfaceOptions};

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// Allocator configuration.
#[derive(Debug, Clone, Copy)]
pub struct SurfaceAllocatorOpts {
    /// How long a returned surface stays reusable before `gc` may reclaim it.
    pub ttl: Duration,
}

impl Default for SurfaceAllocatorOpts {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SurfaceAllocatorStats {
    pub entries: usize,
    pub in_use: usize,
    pub created: u64,
    pub reused_exact: u64,
    pub resized: u64,
    pub reclaimed: u64,
}

/// A surface on loan from a [`SurfaceAllocator`]. Hand it back with
/// [`SurfaceAllocator::release`].
#[derive(Debug)]
pub struct SurfaceLease<S> {
    pool_id: u64,
    entry_id: u64,
    base_depth: usize,
    surface: S,
}

impl<S> SurfaceLease<S> {
    /// Identity of the pool entry backing this lease. Stable across borrow/release cycles.
    pub fn entry_id(&self) -> u64 {
        self.entry_id
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }
}

struct Entry<S> {
    id: u64,
    width: u32,
    height: u32,
    options: SurfaceOptions,
    used: bool,
    permanent: bool,
    expires_at: Option<Instant>,
    // `None` while lent out.
    surface: Option<S>,
}

/// Pool of reusable surfaces keyed by size and creation options.
///
/// Not thread-safe; callers serialize access (the renderer keeps it behind an
/// [`crate::AtomicResource`]).
pub struct SurfaceAllocator<S> {
    id: u64,
    opts: SurfaceAllocatorOpts,
    entries: Vec<Entry<S>>,
    next_entry: u64,
    stats: SurfaceAllocatorStats,
}

impl<S: RasterSurface> SurfaceAllocator<S> {
    pub fn new(opts: SurfaceAllocatorOpts) -> Self {
        Self {
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            opts,
            entries: Vec::new(),
            next_entry: 0,
            stats: SurfaceAllocatorStats::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn in_use(&self) -> usize {
        self.entries.iter().filter(|e| e.used).count()
    }

    pub fn stats(&self) -> SurfaceAllocatorStats {
        let mut s = self.stats.clone();
        s.entries = self.len();
        s.in_use = self.in_use();
        s
    }

    /// Lend a cleared surface of exactly `width x height` created with `options`.
    ///
    /// Prefers an idle exact match, then an idle entry with the same options (resized in place),
    /// and only then calls `create`.
    pub fn borrow(
        &mut self,
        width: u32,
        height: u32,
        options: &SurfaceOptions,
        create: impl FnOnce(u32, u32, &SurfaceOptions) -> EaselResult<S>,
    ) -> EaselResult<SurfaceLease<S>> {
        let exact = self.entries.iter().position(|e| {
            !e.used && e.width == width && e.height == height && e.options == *options
        });
        if let Some(i) = exact
            && let Some(mut surface) = self.entries[i].surface.take()
        {
            surface.clear();
            self.stats.reused_exact += 1;
            return Ok(self.lend(i, surface));
        }

        let same_opts = self
            .entries
            .iter()
            .position(|e| !e.used && e.options == *options);
        if let Some(i) = same_opts
            && let Some(mut surface) = self.entries[i].surface.take()
        {
            if let Err(e) = surface.resize(width, height) {
                self.entries[i].surface = Some(surface);
                return Err(e);
            }
            tracing::debug!(
                entry = self.entries[i].id,
                from_w = self.entries[i].width,
                from_h = self.entries[i].height,
                width,
                height,
                "surface resized for reuse"
            );
            self.entries[i].width = width;
            self.entries[i].height = height;
            self.stats.resized += 1;
            return Ok(self.lend(i, surface));
        }

        let surface = create(width, height, options)?;
        let id = self.next_entry;
        self.next_entry += 1;
        self.entries.push(Entry {
            id,
            width,
            height,
            options: *options,
            used: false,
            permanent: false,
            expires_at: None,
            surface: None,
        });
        self.stats.created += 1;
        tracing::debug!(entry = id, width, height, pool = self.entries.len(), "surface created");
        let i = self.entries.len() - 1;
        Ok(self.lend(i, surface))
    }

    fn lend(&mut self, i: usize, mut surface: S) -> SurfaceLease<S> {
        let e = &mut self.entries[i];
        e.used = true;
        e.expires_at = None;
        let base_depth = surface.save_depth();
        surface.save();
        SurfaceLease {
            pool_id: self.id,
            entry_id: e.id,
            base_depth,
            surface,
        }
    }

    /// Return a lease. Leases this pool does not recognize are dropped without effect.
    pub fn release(&mut self, lease: SurfaceLease<S>) {
        self.release_at(lease, Instant::now());
    }

    pub fn release_at(&mut self, lease: SurfaceLease<S>, now: Instant) {
        if lease.pool_id != self.id {
            return;
        }
        let Some(e) = self
            .entries
            .iter_mut()
            .find(|e| e.id == lease.entry_id && e.used)
        else {
            return;
        };
        let SurfaceLease {
            base_depth,
            mut surface,
            ..
        } = lease;
        while surface.save_depth() > base_depth {
            surface.restore();
        }
        e.surface = Some(surface);
        e.used = false;
        e.expires_at = (!e.permanent).then(|| now + self.opts.ttl);
    }

    /// Exempt the entry behind `lease` from time-based reclamation.
    pub fn set_permanent(&mut self, lease: &SurfaceLease<S>, permanent: bool) {
        if lease.pool_id != self.id {
            return;
        }
        if let Some(e) = self.entries.iter_mut().find(|e| e.id == lease.entry_id) {
            e.permanent = permanent;
        }
    }

    /// Reclaim idle entries past their expiry, or every idle entry when `force` is set.
    pub fn gc(&mut self, force: bool) -> usize {
        self.gc_at(Instant::now(), force)
    }

    pub fn gc_at(&mut self, now: Instant, force: bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| {
            e.used || (!force && (e.permanent || e.expires_at.is_none_or(|t| t > now)))
        });
        let reclaimed = before - self.entries.len();
        if reclaimed > 0 {
            self.stats.reclaimed += reclaimed as u64;
            tracing::debug!(reclaimed, remaining = self.entries.len(), "surface pool gc");
        }
        reclaimed
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/surface_pool.rs"]
mod tests;

// SPDX-FileCopyrightText: © 2025 PipeKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Heap-backed byte regions with pooled recycling.
//!
//! A [`Region`] owns a resizable byte buffer. Regions are handed out by a
//! [`MemPool`]; on drop they return their storage to the pool (if it is
//! still alive and not full), so steady-state pipelines stop allocating
//! after warm-up. The pool hands back whatever vector it has; callers get
//! at least the size they asked for and must not assume fresh zeroed
//! memory beyond that size.

use crate::pool::Pool;
use std::sync::{Arc, Weak};

/// An owned, resizable byte region.
///
/// Created through [`MemPool::alloc`]. May be grown or shrunk in place with
/// [`Region::realloc`]; sharing rules (who is allowed to call `realloc`) are
/// enforced one level up, by the block-buffer layer.
pub struct Region {
    data: Vec<u8>,
    pool: Weak<Pool<Vec<u8>>>,
}

impl Region {
    /// Current usable size in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Resizes the region in place. New bytes are zeroed.
    ///
    /// Always succeeds for a heap-backed region; the `bool` is part of the
    /// contract because callers must be ready for allocators that can
    /// refuse, falling back to allocate + copy + release.
    pub fn realloc(&mut self, new_size: usize) -> bool {
        self.data.resize(new_size, 0);
        true
    }
}

impl std::fmt::Debug for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Region").field("size", &self.data.len()).finish_non_exhaustive()
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        let Some(pool) = self.pool.upgrade() else { return };
        let _ = pool.push(std::mem::take(&mut self.data));
    }
}

/// Allocator of [`Region`]s backed by a recycling pool of byte vectors.
///
/// Cloning the pool is cheap and shares the same storage pool.
#[derive(Clone)]
pub struct MemPool {
    vecs: Arc<Pool<Vec<u8>>>,
}

impl MemPool {
    /// Creates a pool keeping at most `depth` released buffers around.
    pub fn new(depth: usize) -> Self {
        Self { vecs: Arc::new(Pool::new(depth)) }
    }

    /// Allocates a region of exactly `size` bytes, reusing a released
    /// buffer when one is available.
    pub fn alloc(&self, size: usize) -> Region {
        let mut data = self.vecs.pop().unwrap_or_default();
        data.clear();
        data.resize(size, 0);
        Region { data, pool: Arc::downgrade(&self.vecs) }
    }

    /// Number of buffers currently waiting for reuse.
    #[must_use]
    pub fn pooled(&self) -> usize {
        self.vecs.len()
    }

    /// Frees every pooled buffer (debug tool; matches manager vacuum).
    pub fn vacuum(&self) {
        self.vecs.drain();
    }
}

impl std::fmt::Debug for MemPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemPool").field("pooled", &self.vecs.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_and_realloc() {
        let pool = MemPool::new(4);
        let mut region = pool.alloc(16);
        assert_eq!(region.size(), 16);
        assert!(region.as_slice().iter().all(|&b| b == 0));
        assert!(region.realloc(32));
        assert_eq!(region.size(), 32);
    }

    #[test]
    fn regions_recycle_on_drop() {
        let pool = MemPool::new(2);
        assert_eq!(pool.pooled(), 0);
        let region = pool.alloc(64);
        drop(region);
        assert_eq!(pool.pooled(), 1);

        // The recycled buffer is reused, not reallocated.
        let region = pool.alloc(8);
        assert_eq!(pool.pooled(), 0);
        assert_eq!(region.size(), 8);
    }

    #[test]
    fn dead_pool_frees_instead_of_recycling() {
        let pool = MemPool::new(2);
        let region = pool.alloc(16);
        drop(pool);
        drop(region); // must not panic; storage is simply freed
    }
}

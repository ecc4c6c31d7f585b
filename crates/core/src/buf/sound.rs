// SPDX-FileCopyrightText: © 2025 PipeKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Sound buffers: planar sample storage with shared planes.
//!
//! Much lighter than the block variant: fixed geometry decided at
//! allocation, one shared region per channel plane, no windowing. Mutation
//! follows the same rule as blocks: a plane is writable only while its
//! storage is exclusively owned.

use crate::mem::{MemPool, Region};
use smallvec::SmallVec;
use std::sync::Arc;

struct SoundPlane {
    channel: String,
    storage: Arc<Region>,
}

/// A frame of planar audio samples.
pub struct SoundBuf {
    samples: usize,
    sample_size: usize,
    planes: SmallVec<[SoundPlane; 2]>,
}

impl SoundBuf {
    /// Allocates `samples` samples of `sample_size` bytes for each named
    /// channel plane.
    #[must_use]
    pub fn alloc(mem: &MemPool, channels: &[&str], samples: usize, sample_size: usize) -> Self {
        let planes = channels
            .iter()
            .map(|&channel| SoundPlane {
                channel: channel.to_string(),
                storage: Arc::new(mem.alloc(samples * sample_size)),
            })
            .collect();
        Self { samples, sample_size, planes }
    }

    #[must_use]
    pub fn samples(&self) -> usize {
        self.samples
    }

    #[must_use]
    pub fn sample_size(&self) -> usize {
        self.sample_size
    }

    /// Channel names, in allocation order.
    pub fn channels(&self) -> impl Iterator<Item = &str> {
        self.planes.iter().map(|plane| plane.channel.as_str())
    }

    #[must_use]
    pub fn plane(&self, channel: &str) -> Option<&[u8]> {
        self.planes
            .iter()
            .find(|plane| plane.channel == channel)
            .map(|plane| plane.storage.as_slice())
    }

    /// Mutable plane access; fails while the plane is shared with a dup.
    pub fn plane_mut(&mut self, channel: &str) -> Option<&mut [u8]> {
        let plane = self.planes.iter_mut().find(|plane| plane.channel == channel)?;
        Arc::get_mut(&mut plane.storage).map(Region::as_mut_slice)
    }

    /// O(planes) duplicate sharing every plane.
    #[must_use]
    pub fn dup(&self) -> Self {
        Self {
            samples: self.samples,
            sample_size: self.sample_size,
            planes: self
                .planes
                .iter()
                .map(|plane| SoundPlane {
                    channel: plane.channel.clone(),
                    storage: Arc::clone(&plane.storage),
                })
                .collect(),
        }
    }
}

impl std::fmt::Debug for SoundBuf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoundBuf")
            .field("samples", &self.samples)
            .field("sample_size", &self.sample_size)
            .field("planes", &self.planes.len())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn planes_share_on_dup_and_guard_writes() {
        let mem = MemPool::new(2);
        let mut buf = SoundBuf::alloc(&mem, &["l", "r"], 480, 4);
        assert_eq!(buf.samples(), 480);
        buf.plane_mut("l").unwrap().fill(0x11);

        let dup = buf.dup();
        assert!(buf.plane_mut("l").is_none());
        assert_eq!(dup.plane("l").unwrap()[0], 0x11);
        drop(dup);
        assert!(buf.plane_mut("l").is_some());
    }
}

// SPDX-FileCopyrightText: © 2025 PipeKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Picture buffers: chroma planes with per-plane stride.

use crate::mem::{MemPool, Region};
use smallvec::SmallVec;
use std::sync::Arc;

/// Geometry of one picture plane to allocate.
#[derive(Debug, Clone, Copy)]
pub struct PlaneSpec<'a> {
    /// Chroma identifier, e.g. `"y8"`, `"u8"`, `"v8"`.
    pub chroma: &'a str,
    /// Bytes per line.
    pub stride: usize,
    /// Number of lines.
    pub lines: usize,
}

struct PicturePlane {
    chroma: String,
    stride: usize,
    storage: Arc<Region>,
}

/// A single video picture.
pub struct PictureBuf {
    width: usize,
    height: usize,
    planes: SmallVec<[PicturePlane; 4]>,
}

impl PictureBuf {
    #[must_use]
    pub fn alloc(mem: &MemPool, width: usize, height: usize, specs: &[PlaneSpec<'_>]) -> Self {
        let planes = specs
            .iter()
            .map(|spec| PicturePlane {
                chroma: spec.chroma.to_string(),
                stride: spec.stride,
                storage: Arc::new(mem.alloc(spec.stride * spec.lines)),
            })
            .collect();
        Self { width, height, planes }
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Plane bytes and stride for a chroma, when present.
    #[must_use]
    pub fn plane(&self, chroma: &str) -> Option<(&[u8], usize)> {
        self.planes
            .iter()
            .find(|plane| plane.chroma == chroma)
            .map(|plane| (plane.storage.as_slice(), plane.stride))
    }

    /// Mutable plane access; fails while the plane is shared with a dup.
    pub fn plane_mut(&mut self, chroma: &str) -> Option<(&mut [u8], usize)> {
        let plane = self.planes.iter_mut().find(|plane| plane.chroma == chroma)?;
        let stride = plane.stride;
        Arc::get_mut(&mut plane.storage).map(|region| (region.as_mut_slice(), stride))
    }

    /// O(planes) duplicate sharing every plane.
    #[must_use]
    pub fn dup(&self) -> Self {
        Self {
            width: self.width,
            height: self.height,
            planes: self
                .planes
                .iter()
                .map(|plane| PicturePlane {
                    chroma: plane.chroma.clone(),
                    stride: plane.stride,
                    storage: Arc::clone(&plane.storage),
                })
                .collect(),
        }
    }
}

impl std::fmt::Debug for PictureBuf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PictureBuf")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("planes", &self.planes.len())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn planes_are_addressed_by_chroma() {
        let mem = MemPool::new(2);
        let specs = [
            PlaneSpec { chroma: "y8", stride: 64, lines: 32 },
            PlaneSpec { chroma: "u8", stride: 32, lines: 16 },
            PlaneSpec { chroma: "v8", stride: 32, lines: 16 },
        ];
        let mut pic = PictureBuf::alloc(&mem, 64, 32, &specs);
        let (plane, stride) = pic.plane_mut("u8").unwrap();
        assert_eq!(stride, 32);
        plane.fill(0x80);
        assert_eq!(pic.plane("u8").unwrap().0[5], 0x80);
        assert!(pic.plane("a8").is_none());
    }
}

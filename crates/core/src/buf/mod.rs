// SPDX-FileCopyrightText: © 2025 PipeKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Typed payload buffers.
//!
//! [`Buf`] is the payload a record carries: block (an opaque byte sequence,
//! the variant the whole data plane is built on), sound, or picture. All
//! variants share the same ownership discipline: duplication shares backing
//! storage and bumps its refcount, mutation requires exclusive ownership.

pub mod block;
pub mod picture;
pub mod sound;

pub use block::{BlockBuf, BlockBufManager};
pub use picture::{PictureBuf, PlaneSpec};
pub use sound::SoundBuf;

/// A typed buffer handle.
#[derive(Debug)]
pub enum Buf {
    /// Opaque byte sequence (coded data, transport packets, ...).
    Block(BlockBuf),
    /// Planar audio samples.
    Sound(SoundBuf),
    /// Video picture planes.
    Picture(PictureBuf),
}

impl Buf {
    /// Cheap duplicate sharing the backing storage.
    #[must_use]
    pub fn dup(&self) -> Self {
        match self {
            Self::Block(buf) => Self::Block(buf.dup()),
            Self::Sound(buf) => Self::Sound(buf.dup()),
            Self::Picture(buf) => Self::Picture(buf.dup()),
        }
    }

    #[must_use]
    pub fn as_block(&self) -> Option<&BlockBuf> {
        match self {
            Self::Block(buf) => Some(buf),
            _ => None,
        }
    }

    pub fn as_block_mut(&mut self) -> Option<&mut BlockBuf> {
        match self {
            Self::Block(buf) => Some(buf),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_block(self) -> Option<BlockBuf> {
        match self {
            Self::Block(buf) => Some(buf),
            _ => None,
        }
    }
}

impl From<BlockBuf> for Buf {
    fn from(buf: BlockBuf) -> Self {
        Self::Block(buf)
    }
}

impl From<SoundBuf> for Buf {
    fn from(buf: SoundBuf) -> Self {
        Self::Sound(buf)
    }
}

impl From<PictureBuf> for Buf {
    fn from(buf: PictureBuf) -> Self {
        Self::Picture(buf)
    }
}

// SPDX-FileCopyrightText: © 2025 PipeKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! PipeKit Core - the pipe/record/buffer runtime media pipelines are built
//! on.
//!
//! Applications build a graph of pipes (demuxer → framer → decoder →
//! muxer → sink), wire outputs to inputs and drive records through it.
//! This crate is the generic machinery every pipe shares:
//!
//! - [`buf`]: typed payload buffers; the block variant is a copy-on-write
//!   window over pooled shared storage
//! - [`dict`]: ordered typed attribute dictionary
//! - [`record`]: the (buffer, attributes) pair pipes exchange, with flow
//!   helpers in [`flow`] and timestamp helpers in [`clock`]
//! - [`pipe`]: the pipe trait, handles, control commands and output wiring
//! - [`probe`]: hierarchical out-of-band event handling
//! - [`stream`]: byte-stream accumulation for framers
//! - [`sync`]: sync-word acquisition state
//! - [`pool`] / [`mem`]: lock-free object pooling and recycled backing
//!   regions
//!
//! ## Concurrency model
//!
//! A pipe graph is single-threaded cooperative: `input()` runs to
//! completion and may synchronously call the downstream `input()`. The only
//! cross-thread state is buffer backing storage; its refcounts and pools
//! are atomic, so records may be handed between graphs on different
//! threads.

pub mod buf;
pub mod clock;
pub mod dict;
pub mod error;
pub mod flow;
pub mod mem;
pub mod pipe;
pub mod pool;
pub mod probe;
pub mod pump;
pub mod record;
pub mod stream;
pub mod sync;
pub mod testing;

// Convenience re-exports for the types nearly every pipe implementation
// touches.
pub use buf::{BlockBuf, BlockBufManager, Buf};
pub use clock::{ClockDomain, DateKind, CLOCK_FREQ};
pub use dict::{Dict, Rational, Value};
pub use error::{ControlError, ErrorKind};
pub use mem::MemPool;
pub use pipe::{
    Command, ControlResponse, ControlResult, LifeState, LocalCommand, OutputHelper, Pipe,
    PipeCore, PipeHandle, Signature, SIGNATURE_NONE,
};
pub use pool::Pool;
pub use probe::{Event, FnProbe, LogProbe, Probe, ProbeChain, ProbeResult};
pub use pump::Pump;
pub use record::Record;
pub use stream::StreamAccumulator;
pub use sync::SyncState;

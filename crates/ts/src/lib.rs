// SPDX-FileCopyrightText: © 2025 PipeKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! PipeKit MPEG-TS pipes: transport-packet checking and the PES layer.
//!
//! - [`check`]: validates and splits 188-byte transport packets
//! - [`pesd`]: removes PES headers, lifting PTS/DTS into clock attributes
//! - [`pese`]: builds PES headers in front of payload records
//! - [`pes`]: the shared PES bit layout helpers
//!
//! PES-related flow attributes (stream id, minimum header size, minimum
//! duration) are accessed through [`TsFlowExt`].

pub mod check;
pub mod pes;
pub mod pesd;
pub mod pese;

pub use check::{ts_validate, TsCheck, TS_CHECK_SIGNATURE, TS_SIZE, TS_SYNC};
pub use pesd::{PesDecaps, TS_PESD_SIGNATURE};
pub use pese::{PesEncaps, TS_PESE_SIGNATURE};

use pipekit_core::dict::Value;
use pipekit_core::record::Record;

const PES_ID_KEY: &str = "tspes.id";
const PES_HEADER_KEY: &str = "tspes.header";
const PES_MIN_DURATION_KEY: &str = "tspes.min_duration";

/// PES flow attributes carried by flow-definition records.
pub trait TsFlowExt {
    /// The PES stream id of the flow.
    fn pes_id(&self) -> Option<u8>;
    fn set_pes_id(&mut self, id: u8);
    /// Minimum total PES header size, padded with stuffing.
    fn pes_header_min(&self) -> Option<usize>;
    fn set_pes_header_min(&mut self, size: usize);
    /// Minimum PES payload duration, in 27 MHz ticks.
    fn pes_min_duration(&self) -> Option<u64>;
    fn set_pes_min_duration(&mut self, duration: u64);
}

impl TsFlowExt for Record {
    fn pes_id(&self) -> Option<u8> {
        self.dict.unsigned(PES_ID_KEY).and_then(|id| u8::try_from(id).ok())
    }

    fn set_pes_id(&mut self, id: u8) {
        self.dict.set(PES_ID_KEY, Value::Unsigned(u64::from(id)));
    }

    fn pes_header_min(&self) -> Option<usize> {
        self.dict.unsigned(PES_HEADER_KEY).and_then(|size| usize::try_from(size).ok())
    }

    fn set_pes_header_min(&mut self, size: usize) {
        self.dict.set(PES_HEADER_KEY, Value::Unsigned(size as u64));
    }

    fn pes_min_duration(&self) -> Option<u64> {
        self.dict.unsigned(PES_MIN_DURATION_KEY)
    }

    fn set_pes_min_duration(&mut self, duration: u64) {
        self.dict.set(PES_MIN_DURATION_KEY, Value::Unsigned(duration));
    }
}

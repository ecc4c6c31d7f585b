// SPDX-FileCopyrightText: © 2025 PipeKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! PES encapsulator: prepends PES headers to payload records.
//!
//! The stream id, an optional minimum header size (padded with `0xFF`
//! stuffing) and an optional minimum duration (payload aggregation) come
//! from the input flow definition (see [`crate::TsFlowExt`]). Timestamps:
//! a prog-domain DTS plus the PTS/DTS delay become the 90 kHz PTS/DTS
//! fields: both when the delay is non-zero, PTS only otherwise. The
//! length field is 0 when the packet exceeds 65535 bytes (unbounded,
//! video only).
//!
//! Flow definition: `"block.*"` in, rewritten to `"block.mpegtspes.*"` out.

use crate::pes;
use crate::TsFlowExt;
use pipekit_core::buf::{BlockBufManager, Buf};
use pipekit_core::clock::ClockDomain;
use pipekit_core::error::{ControlError, ErrorKind};
use pipekit_core::pipe::{
    Command, ControlResponse, ControlResult, LifeState, OutputHelper, Pipe, PipeCore, PipeHandle,
    Signature,
};
use pipekit_core::probe::{Event, ProbeChain};
use pipekit_core::pump::Pump;
use pipekit_core::record::Record;

/// Signature of the PES encapsulator's command range.
pub const TS_PESE_SIGNATURE: Signature = Signature::from_fourcc(*b"pese");

/// 27 MHz ticks per 90 kHz tick.
const TICKS_PER_90KHZ: u64 = 300;
/// Timestamps wrap on 33 bits.
const TS_MASK: u64 = (1 << 33) - 1;

/// The PES encapsulator pipe.
pub struct PesEncaps {
    core: PipeCore,
    output: OutputHelper,
    /// Allocates header buffers.
    mgr: BlockBufManager,
    stream_id: u8,
    /// Minimum total header size, padded with stuffing.
    header_min: usize,
    /// Minimum payload duration; 0 disables aggregation.
    min_duration: u64,
    /// Payloads gathered towards `min_duration`.
    next: Option<Record>,
    next_duration: u64,
}

impl PesEncaps {
    /// Allocates the encapsulator. `mgr` provides the header buffers.
    #[must_use]
    pub fn new(name: impl Into<String>, probes: ProbeChain, mgr: BlockBufManager) -> PipeHandle {
        PipeHandle::new(Self {
            core: PipeCore::new(name, TS_PESE_SIGNATURE, probes),
            output: OutputHelper::new(),
            mgr,
            stream_id: 0,
            header_min: 0,
            min_duration: 0,
            next: None,
            next_duration: 0,
        })
    }

    /// Builds the header and sends header + payload downstream.
    #[allow(clippy::cast_possible_truncation)]
    fn encaps(&mut self, mut record: Record, pump: Option<&Pump>) {
        let payload_size = record.block_size().unwrap_or(0);
        let headerless = pes::is_headerless(self.stream_id);

        let dts_prog = record.dts(ClockDomain::Prog);
        let delay = record.dts_pts_delay().unwrap_or(0);
        let (pts, dts) = match dts_prog {
            Some(date) if !headerless => {
                let pts = ((date + delay) / TICKS_PER_90KHZ) & TS_MASK;
                if delay > 0 {
                    (Some(pts), Some((date / TICKS_PER_90KHZ) & TS_MASK))
                } else {
                    (Some(pts), None)
                }
            }
            _ => (None, None),
        };

        let header_size = if headerless {
            pes::PES_HEADER_SIZE
        } else {
            let ts_size = match (&pts, &dts) {
                (Some(_), Some(_)) => 2 * pes::PES_HEADER_TS_SIZE,
                (Some(_), None) => pes::PES_HEADER_TS_SIZE,
                _ => 0,
            };
            let header_length =
                ts_size.max(self.header_min.saturating_sub(pes::PES_HEADER_SIZE_NOPTS)).min(255);
            pes::PES_HEADER_SIZE_NOPTS + header_length
        };

        let mut header = self.mgr.alloc(header_size);
        {
            let Some(buf) = header.write_span(0, header_size) else {
                self.core.throw(&Event::Fatal(ErrorKind::Alloc));
                return;
            };
            buf[0] = 0x00;
            buf[1] = 0x00;
            buf[2] = 0x01;
            buf[3] = self.stream_id;
            let pes_length = payload_size + header_size - pes::PES_HEADER_SIZE;
            let pes_length = if pes_length > usize::from(u16::MAX) { 0 } else { pes_length };
            buf[4..pes::PES_HEADER_SIZE].copy_from_slice(&(pes_length as u16).to_be_bytes());

            if !headerless {
                // Marker '10' plus the data alignment indicator.
                buf[6] = 0x84;
                buf[7] = match (&pts, &dts) {
                    (Some(_), Some(_)) => 0xc0,
                    (Some(_), None) => 0x80,
                    _ => 0x00,
                };
                buf[8] = (header_size - pes::PES_HEADER_SIZE_NOPTS) as u8;

                let mut at = pes::PES_HEADER_SIZE_NOPTS;
                if let Some(pts) = pts {
                    let prefix = if dts.is_some() { 0x3 } else { 0x2 };
                    pes::write_ts_field(&mut buf[at..at + pes::PES_HEADER_TS_SIZE], prefix, pts);
                    at += pes::PES_HEADER_TS_SIZE;
                }
                if let Some(dts) = dts {
                    pes::write_ts_field(&mut buf[at..at + pes::PES_HEADER_TS_SIZE], 0x1, dts);
                    at += pes::PES_HEADER_TS_SIZE;
                }
                // Stuffing up to the requested minimum header size.
                for byte in &mut buf[at..] {
                    *byte = 0xff;
                }
            }
        }

        if record.buf.is_some() {
            record.block_insert(0, header);
        } else {
            record.buf = Some(Buf::Block(header));
        }
        // Every output record begins a PES packet.
        record.set_start();
        self.output.send(&self.core, record, pump);
    }

    /// Emits whatever aggregation is pending (flow def change, teardown).
    fn flush_pending(&mut self, pump: Option<&Pump>) {
        if let Some(record) = self.next.take() {
            self.next_duration = 0;
            self.encaps(record, pump);
        }
    }

    fn set_flow_def(&mut self, flow_def: Record) -> ControlResult {
        if !flow_def.matches_def("block.") {
            self.core.set_state(LifeState::FlowErr);
            self.core.throw(&Event::FlowDefError(flow_def));
            return Err(ControlError::Rejected("expected a block. flow definition".to_string()));
        }
        let Some(stream_id) = flow_def.pes_id() else {
            self.core.set_state(LifeState::FlowErr);
            self.core.throw(&Event::FlowDefError(flow_def));
            return Err(ControlError::Rejected("missing PES stream id".to_string()));
        };
        self.flush_pending(None);
        self.stream_id = stream_id;
        self.header_min = flow_def.pes_header_min().unwrap_or(0);
        self.min_duration = flow_def.pes_min_duration().unwrap_or(0);

        let rewritten = flow_def
            .flow_def()
            .map(|def| format!("block.mpegtspes.{}", &def["block.".len()..]))
            .unwrap_or_default();
        let mut flow_def = flow_def;
        flow_def.set_flow_def(&rewritten);
        self.output.store_flow_def(&self.core, flow_def);
        Ok(ControlResponse::Done)
    }
}

impl Pipe for PesEncaps {
    fn core(&self) -> &PipeCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut PipeCore {
        &mut self.core
    }

    fn input(&mut self, mut record: Record, pump: Option<&Pump>) {
        if record.flow_def().is_some() {
            let _ = self.set_flow_def(record);
            return;
        }
        if self.output.flow_def().is_none() {
            self.core.throw(&Event::FlowDefError(record));
            return;
        }
        if record.buf.is_none() {
            self.output.send(&self.core, record, pump);
            return;
        }
        if self.min_duration == 0 {
            self.encaps(record, pump);
            return;
        }

        // Aggregate payloads until the minimum duration is reached; the
        // first payload's attributes (dates included) win.
        let duration = record.duration().unwrap_or(0);
        match self.next.as_mut() {
            None => {
                self.next = Some(record);
                self.next_duration = duration;
            }
            Some(aggregate) => {
                if let Some(Buf::Block(block)) = record.take_buf() {
                    aggregate.block_append(block);
                }
                self.next_duration += duration;
            }
        }
        if self.next_duration >= self.min_duration {
            self.flush_pending(pump);
        }
    }

    fn control(&mut self, command: Command) -> ControlResult {
        match command {
            Command::GetFlowDef => {
                Ok(ControlResponse::FlowDef(self.output.flow_def().map(Record::dup)))
            }
            Command::SetFlowDef(flow_def) => self.set_flow_def(flow_def),
            Command::GetOutput => Ok(ControlResponse::Output(self.output.output())),
            Command::SetOutput(output) => {
                self.output.set_output(Some(output));
                Ok(ControlResponse::Done)
            }
            Command::Local(_) => Err(ControlError::NotHandled),
        }
    }
}

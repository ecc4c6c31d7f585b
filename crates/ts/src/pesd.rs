// SPDX-FileCopyrightText: © 2025 PipeKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! PES decapsulator: strips PES headers off reassembled packet payloads.
//!
//! Input records are the payloads of transport packets, flagged with the
//! unit-start flag when they begin a PES packet. The header may straddle
//! several records; fragments accumulate by shared-segment concatenation
//! until the header is complete, then PTS/DTS are lifted into the clock
//! attributes, the header bytes are dropped by window resize, and the
//! payload goes downstream. Records arriving mid-PES after a header was
//! removed are forwarded unchanged.
//!
//! Flow definition: `"block.mpegtspes.*"` in, rewritten to `"block.*"` out.

use crate::pes;
use pipekit_core::buf::Buf;
use pipekit_core::clock::ClockDomain;
use pipekit_core::error::ControlError;
use pipekit_core::pipe::{
    Command, ControlResponse, ControlResult, LifeState, OutputHelper, Pipe, PipeCore, PipeHandle,
    Signature,
};
use pipekit_core::probe::{Event, ProbeChain};
use pipekit_core::pump::Pump;
use pipekit_core::record::Record;
use pipekit_core::sync::SyncState;

/// Signature of the PES decapsulator's command range.
pub const TS_PESD_SIGNATURE: Signature = Signature::from_fourcc(*b"pesd");

/// We only accept flows of formerly-TS packets containing PES.
const EXPECTED_FLOW_DEF: &str = "block.mpegtspes.";

/// The PES decapsulator pipe.
pub struct PesDecaps {
    core: PipeCore,
    output: OutputHelper,
    /// PES packet under reassembly, headed by the unit-start record.
    next: Option<Record>,
    sync: SyncState,
}

impl PesDecaps {
    /// Allocates the decapsulator and returns its handle.
    #[must_use]
    pub fn new(name: impl Into<String>, probes: ProbeChain) -> PipeHandle {
        PipeHandle::new(Self {
            core: PipeCore::new(name, TS_PESD_SIGNATURE, probes),
            output: OutputHelper::new(),
            next: None,
            sync: SyncState::new(),
        })
    }

    /// Drops the reassembly in progress and loses sync.
    fn flush(&mut self) {
        self.next = None;
        self.sync.lose(&self.core);
    }

    /// Parses and removes the PES header of the packet under reassembly.
    #[allow(clippy::cognitive_complexity)]
    fn decaps(&mut self, pump: Option<&Pump>) {
        let (valid, stream_id, length) = {
            let Some(next) = self.next.as_ref() else { return };
            let mut scratch = [0u8; pes::PES_HEADER_SIZE];
            let Some(header) = next.block_peek(0, pes::PES_HEADER_SIZE, &mut scratch) else {
                return; // wait for more fragments
            };
            (pes::validate(header), pes::stream_id(header), usize::from(pes::length(header)))
        };

        if !valid {
            tracing::warn!(pipe = self.core.name(), "wrong PES header");
            self.flush();
            return;
        }
        if stream_id == pes::STREAM_ID_PADDING {
            self.flush();
            return;
        }
        if pes::is_headerless(stream_id) {
            let Some(mut record) = self.next.take() else { return };
            record.block_resize(pes::PES_HEADER_SIZE, None);
            self.sync.acquire(&self.core);
            self.output.send(&self.core, record, pump);
            return;
        }
        if length != 0 && length < pes::PES_HEADER_OPTIONAL_SIZE {
            tracing::warn!(pipe = self.core.name(), "wrong PES length");
            self.flush();
            return;
        }

        let (opt_valid, alignment, has_pts, has_dts, header_length) = {
            let Some(next) = self.next.as_ref() else { return };
            let mut scratch = [0u8; pes::PES_HEADER_OPTIONAL_SIZE];
            let Some(opt) =
                next.block_peek(pes::PES_HEADER_SIZE, pes::PES_HEADER_OPTIONAL_SIZE, &mut scratch)
            else {
                return; // wait for more fragments
            };
            (
                pes::validate_header(opt),
                pes::has_alignment(opt),
                pes::has_pts(opt),
                pes::has_dts(opt),
                usize::from(pes::header_length(opt)),
            )
        };

        if !opt_valid {
            tracing::warn!(pipe = self.core.name(), "wrong PES optional header");
            self.flush();
            return;
        }
        if (length != 0 && header_length + pes::PES_HEADER_OPTIONAL_SIZE > length)
            || (has_pts && header_length < pes::PES_HEADER_SIZE_PTS - pes::PES_HEADER_SIZE_NOPTS)
            || (has_dts && header_length < pes::PES_HEADER_SIZE_PTSDTS - pes::PES_HEADER_SIZE_NOPTS)
        {
            tracing::warn!(pipe = self.core.name(), "wrong PES header length");
            self.flush();
            return;
        }

        let gathered = self.next.as_ref().and_then(Record::block_size).unwrap_or(0);
        if gathered < pes::PES_HEADER_SIZE_NOPTS + header_length {
            return; // wait for the whole header
        }

        let mut timestamps = None;
        if has_pts {
            let count = if has_dts { 2 * pes::PES_HEADER_TS_SIZE } else { pes::PES_HEADER_TS_SIZE };
            let parsed = {
                let Some(next) = self.next.as_ref() else { return };
                let mut scratch = [0u8; 2 * pes::PES_HEADER_TS_SIZE];
                let Some(fields) = next.block_peek(pes::PES_HEADER_SIZE_NOPTS, count, &mut scratch)
                else {
                    return;
                };
                let mut ok = pes::validate_pts_field(&fields[..pes::PES_HEADER_TS_SIZE]);
                let pts = pes::parse_ts_field(&fields[..pes::PES_HEADER_TS_SIZE]);
                let dts = if has_dts {
                    ok = ok && pes::validate_dts_fields(fields);
                    pes::parse_ts_field(&fields[pes::PES_HEADER_TS_SIZE..])
                } else {
                    pts
                };
                ok.then_some((pts, dts))
            };
            let Some((pts, dts)) = parsed else {
                tracing::warn!(pipe = self.core.name(), "wrong PES timestamp syntax");
                self.flush();
                return;
            };
            timestamps = Some((pts, dts));
        }

        let Some(mut record) = self.next.take() else { return };
        if let Some((pts, dts)) = timestamps {
            // Dates are rebased on DTS; a lone PTS means DTS == PTS.
            record.set_dts(ClockDomain::Orig, dts);
            if pts > dts {
                record.set_dts_pts_delay(pts - dts);
            }
        }
        if alignment {
            record.set_start();
        } else {
            record.clear_start();
        }
        record.block_resize(pes::PES_HEADER_SIZE_NOPTS + header_length, None);
        self.sync.acquire(&self.core);
        self.output.send(&self.core, record, pump);
    }

    /// Routes one payload record into the reassembly state machine.
    fn work(&mut self, mut record: Record, pump: Option<&Pump>) {
        if record.discontinuity() {
            record.clear_discontinuity();
            self.flush();
        }
        if record.start() {
            if self.next.is_some() {
                tracing::warn!(pipe = self.core.name(), "truncated PES header");
            }
            self.next = Some(record);
            self.decaps(pump);
        } else if self.next.is_some() {
            if let Some(Buf::Block(block)) = record.take_buf() {
                if let Some(next) = self.next.as_mut() {
                    next.block_append(block);
                }
            }
            self.decaps(pump);
        } else if self.sync.acquired() {
            // Mid-PES payload after the header was removed.
            self.output.send(&self.core, record, pump);
        }
        // Otherwise: payload of a PES whose header we never saw; drop.
    }

    fn set_flow_def(&mut self, mut flow_def: Record) -> ControlResult {
        self.flush();
        if !flow_def.matches_def(EXPECTED_FLOW_DEF) {
            self.output.clear_flow_def();
            self.core.set_state(LifeState::FlowErr);
            self.core.throw(&Event::FlowDefError(flow_def));
            return Err(ControlError::Rejected(
                "expected a block.mpegtspes. flow definition".to_string(),
            ));
        }
        let rewritten = flow_def
            .flow_def()
            .map(|def| format!("block.{}", &def[EXPECTED_FLOW_DEF.len()..]))
            .unwrap_or_default();
        tracing::debug!(pipe = self.core.name(), flow_def = %rewritten, "flow definition");
        flow_def.set_flow_def(&rewritten);
        self.output.store_flow_def(&self.core, flow_def);
        Ok(ControlResponse::Done)
    }
}

impl Pipe for PesDecaps {
    fn core(&self) -> &PipeCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut PipeCore {
        &mut self.core
    }

    fn input(&mut self, record: Record, pump: Option<&Pump>) {
        if record.flow_def().is_some() {
            let _ = self.set_flow_def(record);
            return;
        }
        if self.output.flow_def().is_none() {
            self.core.throw(&Event::FlowDefError(record));
            return;
        }
        if record.buf.is_none() {
            return;
        }
        self.work(record, pump);
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

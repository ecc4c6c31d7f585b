// SPDX-FileCopyrightText: © 2025 PipeKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! TS sync checker: validates and splits transport packets.
//!
//! Each input record is expected to hold back-to-back 188-byte transport
//! packets, each starting with the `0x47` sync byte. Valid packets go
//! downstream as 188-byte shared views; the first byte out of sync
//! discards the remainder of the record; the checker verifies alignment,
//! it does not search for it.

use pipekit_core::error::ControlError;
use pipekit_core::pipe::{
    Command, ControlResponse, ControlResult, LifeState, OutputHelper, Pipe, PipeCore, PipeHandle,
    Signature,
};
use pipekit_core::probe::{Event, ProbeChain};
use pipekit_core::pump::Pump;
use pipekit_core::record::Record;

/// Signature of the TS checker's command range.
pub const TS_CHECK_SIGNATURE: Signature = Signature::from_fourcc(*b"tsck");

/// Size of a transport packet.
pub const TS_SIZE: usize = 188;
/// Transport packet sync byte.
pub const TS_SYNC: u8 = 0x47;

/// Validates the sync byte of a transport packet.
#[must_use]
pub fn ts_validate(packet: &[u8]) -> bool {
    !packet.is_empty() && packet[0] == TS_SYNC
}

/// The TS sync checker pipe.
pub struct TsCheck {
    core: PipeCore,
    output: OutputHelper,
}

impl TsCheck {
    /// Allocates the checker and returns its handle.
    #[must_use]
    pub fn new(name: impl Into<String>, probes: ProbeChain) -> PipeHandle {
        PipeHandle::new(Self {
            core: PipeCore::new(name, TS_CHECK_SIGNATURE, probes),
            output: OutputHelper::new(),
        })
    }

    fn work(&mut self, record: &Record, pump: Option<&Pump>) {
        let size = record.block_size().unwrap_or(0);
        let mut offset = 0usize;
        while size - offset >= TS_SIZE {
            let mut scratch = [0u8; 1];
            let in_sync = record
                .block_peek(offset, 1, &mut scratch)
                .is_some_and(|byte| byte[0] == TS_SYNC);
            if !in_sync {
                tracing::warn!(pipe = self.core.name(), offset, "lost TS sync");
                break;
            }
            let mut packet = record.dup();
            packet.block_resize(offset, Some(TS_SIZE));
            self.output.send(&self.core, packet, pump);
            offset += TS_SIZE;
        }
        if offset < size {
            tracing::debug!(pipe = self.core.name(), dropped = size - offset, "dropping octets");
        }
    }

    fn set_flow_def(&mut self, flow_def: Record) -> ControlResult {
        if !flow_def.matches_def("block.") {
            self.core.set_state(LifeState::FlowErr);
            self.core.throw(&Event::FlowDefError(flow_def));
            return Err(ControlError::Rejected("expected a block. flow definition".to_string()));
        }
        self.output.store_flow_def(&self.core, flow_def);
        Ok(ControlResponse::Done)
    }
}

impl Pipe for TsCheck {
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
        if record.buf.is_none() {
            return;
        }
        self.work(&record, pump);
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

// SPDX-FileCopyrightText: © 2025 PipeKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Test support: a capture sink pipe and a capture probe.
//!
//! Shared by the unit and scenario tests of this workspace; kept in the
//! library (rather than duplicated per test binary) because downstream
//! crates exercise their pipes against it too.

use crate::pipe::{
    Command, ControlResponse, ControlResult, OutputHelper, Pipe, PipeCore, PipeHandle,
    SIGNATURE_NONE,
};
use crate::probe::{Event, Probe, ProbeChain, ProbeResult};
use crate::pump::Pump;
use crate::record::Record;
use std::cell::RefCell;
use std::rc::Rc;

/// A sink pipe that stores every record it receives.
pub struct CaptureSink {
    core: PipeCore,
    records: Rc<RefCell<Vec<Record>>>,
}

impl CaptureSink {
    /// Builds the sink and returns its handle plus the shared record store.
    #[must_use]
    pub fn new(name: &str) -> (PipeHandle, Rc<RefCell<Vec<Record>>>) {
        Self::with_probes(name, ProbeChain::new())
    }

    #[must_use]
    pub fn with_probes(name: &str, probes: ProbeChain) -> (PipeHandle, Rc<RefCell<Vec<Record>>>) {
        let records = Rc::new(RefCell::new(Vec::new()));
        let sink = Self {
            core: PipeCore::new(name, SIGNATURE_NONE, probes),
            records: Rc::clone(&records),
        };
        (PipeHandle::new(sink), records)
    }
}

impl Pipe for CaptureSink {
    fn core(&self) -> &PipeCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut PipeCore {
        &mut self.core
    }

    fn input(&mut self, record: Record, _pump: Option<&Pump>) {
        self.records.borrow_mut().push(record);
    }

    fn control(&mut self, command: Command) -> ControlResult {
        match command {
            Command::SetFlowDef(_) => Ok(ControlResponse::Done),
            _ => Err(crate::error::ControlError::NotHandled),
        }
    }
}

/// A probe recording a label for every event it sees, then passing it on.
///
/// Labels are the stable event names, with the flow definition appended for
/// `new_flow_def` (e.g. `"new_flow_def:block.ac3.sound."`).
pub struct CaptureProbe {
    events: Rc<RefCell<Vec<String>>>,
}

impl CaptureProbe {
    #[must_use]
    pub fn new() -> (Rc<Self>, Rc<RefCell<Vec<String>>>) {
        let events = Rc::new(RefCell::new(Vec::new()));
        (Rc::new(Self { events: Rc::clone(&events) }), events)
    }

    /// A probe chain containing just a capture probe.
    #[must_use]
    pub fn chain() -> (ProbeChain, Rc<RefCell<Vec<String>>>) {
        let (probe, events) = Self::new();
        (ProbeChain::new().with(probe), events)
    }
}

impl Probe for CaptureProbe {
    fn catch(&self, _pipe: &PipeCore, event: &Event) -> ProbeResult {
        let label = match event {
            Event::NewFlowDef(record) => {
                format!("new_flow_def:{}", record.flow_def().unwrap_or("?"))
            }
            Event::Fatal(kind) => format!("fatal:{kind}"),
            Event::Error(kind) => format!("error:{kind}"),
            other => other.name().to_string(),
        };
        self.events.borrow_mut().push(label);
        ProbeResult::Pass
    }
}

/// Convenience: a passthrough output helper wired straight to a capture
/// sink, for pipes under test that need a downstream.
#[must_use]
pub fn capture_output(name: &str) -> (OutputHelper, Rc<RefCell<Vec<Record>>>) {
    let (sink, records) = CaptureSink::new(name);
    let mut output = OutputHelper::new();
    output.set_output(Some(sink));
    (output, records)
}

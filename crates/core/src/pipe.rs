// SPDX-FileCopyrightText: © 2025 PipeKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The pipe abstraction: graph nodes with input/control/output contracts.
//!
//! A pipe type composes a [`PipeCore`] (name, signature, probe chain,
//! lifecycle state) with its private state and implements [`Pipe`]. Graphs
//! hold pipes through [`PipeHandle`]s: cloning a handle is `use`, dropping
//! it is `release`; when the last handle goes, the pipe throws
//! [`Event::Dead`](crate::probe::Event::Dead) and its state is torn down.
//!
//! Control is a closed command set plus a signature-tagged escape hatch for
//! pipe-local commands. Commands a pipe does not recognise (including local
//! commands carrying a foreign signature) answer
//! [`ControlError::NotHandled`], never an error.
//!
//! Data flows one direction: a producer calls the consumer's `input()`,
//! transferring record ownership, and the call runs to completion; the
//! graph is single-threaded cooperative, so `input()` may synchronously
//! feed the next pipe downstream.

use crate::error::ControlError;
use crate::probe::{Event, ProbeChain};
use crate::pump::Pump;
use crate::record::Record;
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Identifies the pipe type owning a local command range.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature(pub u32);

impl Signature {
    /// Builds a signature from a four-character code.
    #[must_use]
    pub const fn from_fourcc(code: [u8; 4]) -> Self {
        Self(u32::from_be_bytes(code))
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bytes = self.0.to_be_bytes();
        if bytes.iter().all(u8::is_ascii_graphic) {
            write!(
                f,
                "Signature({}{}{}{})",
                bytes[0] as char, bytes[1] as char, bytes[2] as char, bytes[3] as char
            )
        } else {
            write!(f, "Signature({:#010x})", self.0)
        }
    }
}

/// Signature of pipes that define no local commands.
pub const SIGNATURE_NONE: Signature = Signature(0);

/// Lifecycle of a pipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifeState {
    /// Allocated; `Ready` has been thrown.
    Ready,
    /// A flow definition was accepted or data was emitted.
    Live,
    /// The last `SetFlowDef` was rejected.
    FlowErr,
    /// Being torn down.
    Dead,
}

/// The part every pipe type composes: identity, probe chain, lifecycle.
pub struct PipeCore {
    name: String,
    signature: Signature,
    probes: ProbeChain,
    state: Cell<LifeState>,
}

impl PipeCore {
    /// Creates the core and throws [`Event::Ready`] into the chain.
    #[must_use]
    pub fn new(name: impl Into<String>, signature: Signature, probes: ProbeChain) -> Self {
        let core = Self {
            name: name.into(),
            signature,
            probes,
            state: Cell::new(LifeState::Ready),
        };
        core.throw(&Event::Ready);
        core
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn signature(&self) -> Signature {
        self.signature
    }

    #[must_use]
    pub fn state(&self) -> LifeState {
        self.state.get()
    }

    pub fn set_state(&self, state: LifeState) {
        self.state.set(state);
    }

    /// Throws an event into the probe chain; true when handled.
    pub fn throw(&self, event: &Event) -> bool {
        self.probes.throw(self, event)
    }
}

impl std::fmt::Debug for PipeCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeCore")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .field("state", &self.state.get())
            .finish()
    }
}

impl Drop for PipeCore {
    fn drop(&mut self) {
        self.state.set(LifeState::Dead);
        self.throw(&Event::Dead);
    }
}

/// A pipe-local command, tagged with the signature of the pipe type that
/// defines it. Pipes downcast `payload` only after checking the signature.
pub struct LocalCommand {
    pub signature: Signature,
    pub payload: Box<dyn Any>,
}

/// Control commands understood by every pipe, plus the local escape hatch.
pub enum Command {
    /// Asks for the current output flow definition.
    GetFlowDef,
    /// Validates and installs the input flow definition.
    SetFlowDef(Record),
    /// Asks for the downstream pipe.
    GetOutput,
    /// Wires the downstream pipe.
    SetOutput(PipeHandle),
    /// A pipe-type-specific command.
    Local(LocalCommand),
}

/// Successful answer of a control command.
pub enum ControlResponse {
    /// Command executed; nothing to return.
    Done,
    /// Answer to [`Command::GetFlowDef`].
    FlowDef(Option<Record>),
    /// Answer to [`Command::GetOutput`].
    Output(Option<PipeHandle>),
}

pub type ControlResult = Result<ControlResponse, ControlError>;

/// A graph node. See the module docs for the contracts.
pub trait Pipe {
    fn core(&self) -> &PipeCore;
    fn core_mut(&mut self) -> &mut PipeCore;

    /// Consumes one record. Never fails; problems are thrown as events.
    fn input(&mut self, record: Record, pump: Option<&Pump>);

    /// Executes one control command.
    fn control(&mut self, command: Command) -> ControlResult;
}

/// Shared, refcounted handle to a pipe.
///
/// Clones are the `use` operation, drops the `release`; pipes hold strong
/// handles only downstream (the graph is a DAG), so the last release of a
/// chain tears it down front to back.
#[derive(Clone)]
pub struct PipeHandle(Rc<RefCell<dyn Pipe>>);

impl PipeHandle {
    pub fn new(pipe: impl Pipe + 'static) -> Self {
        Self(Rc::new(RefCell::new(pipe)))
    }

    /// Feeds one record into the pipe, transferring ownership.
    pub fn input(&self, record: Record, pump: Option<&Pump>) {
        self.0.borrow_mut().input(record, pump);
    }

    pub fn control(&self, command: Command) -> ControlResult {
        self.0.borrow_mut().control(command)
    }

    /// Convenience for [`Command::SetFlowDef`]; true on acceptance.
    pub fn set_flow_def(&self, flow_def: Record) -> bool {
        self.control(Command::SetFlowDef(flow_def)).is_ok()
    }

    /// Convenience for [`Command::GetFlowDef`].
    #[must_use]
    pub fn flow_def(&self) -> Option<Record> {
        match self.control(Command::GetFlowDef) {
            Ok(ControlResponse::FlowDef(def)) => def,
            _ => None,
        }
    }

    /// Convenience for [`Command::SetOutput`]; true on acceptance.
    pub fn set_output(&self, output: &PipeHandle) -> bool {
        self.control(Command::SetOutput(output.clone())).is_ok()
    }

    /// Convenience for [`Command::GetOutput`].
    #[must_use]
    pub fn output(&self) -> Option<PipeHandle> {
        match self.control(Command::GetOutput) {
            Ok(ControlResponse::Output(output)) => output,
            _ => None,
        }
    }

    /// Number of live handles to this pipe.
    #[must_use]
    pub fn refcount(&self) -> usize {
        Rc::strong_count(&self.0)
    }
}

impl std::fmt::Debug for PipeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PipeHandle").field(&self.0.borrow().core().name()).finish()
    }
}

/// Output wiring shared by every producing pipe.
///
/// Guarantees the ordering contract: whenever the stored flow definition
/// has not been sent to the current output yet, it is dispatched (as a
/// buf-less flow-def record) strictly before the next data record.
#[derive(Debug, Default)]
pub struct OutputHelper {
    output: Option<PipeHandle>,
    flow_def: Option<Record>,
    flow_def_sent: bool,
}

impl OutputHelper {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a new output flow definition and throws
    /// [`Event::NewFlowDef`]. The next data record will be preceded by it.
    pub fn store_flow_def(&mut self, core: &PipeCore, flow_def: Record) {
        core.throw(&Event::NewFlowDef(flow_def.dup()));
        self.flow_def = Some(flow_def);
        self.flow_def_sent = false;
    }

    /// Drops the stored flow definition (rejected input flow def).
    pub fn clear_flow_def(&mut self) {
        self.flow_def = None;
        self.flow_def_sent = false;
    }

    #[must_use]
    pub fn flow_def(&self) -> Option<&Record> {
        self.flow_def.as_ref()
    }

    pub fn set_output(&mut self, output: Option<PipeHandle>) {
        self.output = output;
        self.flow_def_sent = false;
    }

    #[must_use]
    pub fn output(&self) -> Option<PipeHandle> {
        self.output.clone()
    }

    /// Dispatches one record downstream, sending the pending flow
    /// definition first if needed. Without a wired output the record is
    /// dropped with a warning.
    pub fn send(&mut self, core: &PipeCore, record: Record, pump: Option<&Pump>) {
        let Some(output) = &self.output else {
            tracing::warn!(pipe = core.name(), "no output wired, dropping record");
            return;
        };
        if !self.flow_def_sent {
            if let Some(flow_def) = &self.flow_def {
                output.input(flow_def.dup(), pump);
                self.flow_def_sent = true;
            }
        }
        core.set_state(LifeState::Live);
        output.input(record, pump);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::probe::{FnProbe, ProbeResult};
    use crate::testing::CaptureSink;
    use std::rc::Rc;

    struct Passthrough {
        core: PipeCore,
        output: OutputHelper,
    }

    impl Pipe for Passthrough {
        fn core(&self) -> &PipeCore {
            &self.core
        }
        fn core_mut(&mut self) -> &mut PipeCore {
            &mut self.core
        }
        fn input(&mut self, record: Record, pump: Option<&Pump>) {
            self.output.send(&self.core, record, pump);
        }
        fn control(&mut self, command: Command) -> ControlResult {
            match command {
                Command::SetFlowDef(flow_def) => {
                    self.output.store_flow_def(&self.core, flow_def);
                    Ok(ControlResponse::Done)
                }
                Command::GetFlowDef => {
                    Ok(ControlResponse::FlowDef(self.output.flow_def().map(Record::dup)))
                }
                Command::SetOutput(output) => {
                    self.output.set_output(Some(output));
                    Ok(ControlResponse::Done)
                }
                Command::GetOutput => Ok(ControlResponse::Output(self.output.output())),
                Command::Local(_) => Err(ControlError::NotHandled),
            }
        }
    }

    fn passthrough(probes: ProbeChain) -> PipeHandle {
        PipeHandle::new(Passthrough {
            core: PipeCore::new("passthrough", SIGNATURE_NONE, probes),
            output: OutputHelper::new(),
        })
    }

    #[test]
    fn flow_def_precedes_first_data_record() {
        let pipe = passthrough(ProbeChain::new());
        let (sink, records) = CaptureSink::new("sink");
        assert!(pipe.set_output(&sink));
        assert!(pipe.set_flow_def(Record::flow_def_record("block.")));

        pipe.input(Record::new(), None);
        pipe.input(Record::new(), None);

        let records = records.borrow();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].flow_def(), Some("block."));
        assert!(records[1].flow_def().is_none());
    }

    #[test]
    fn flow_def_resends_after_rewiring() {
        let pipe = passthrough(ProbeChain::new());
        let (first, first_records) = CaptureSink::new("first");
        pipe.set_output(&first);
        pipe.set_flow_def(Record::flow_def_record("block."));
        pipe.input(Record::new(), None);

        let (second, second_records) = CaptureSink::new("second");
        pipe.set_output(&second);
        pipe.input(Record::new(), None);

        assert_eq!(first_records.borrow().len(), 2);
        let second_records = second_records.borrow();
        assert_eq!(second_records.len(), 2);
        assert_eq!(second_records[0].flow_def(), Some("block."));
    }

    #[test]
    fn ready_and_dead_bracket_the_lifecycle() {
        let events: Rc<std::cell::RefCell<Vec<String>>> = Rc::default();
        let log = Rc::clone(&events);
        let chain = ProbeChain::new().with(Rc::new(FnProbe(move |_: &PipeCore, event: &Event| {
            log.borrow_mut().push(event.name().to_string());
            ProbeResult::Pass
        })));

        let pipe = passthrough(chain);
        let clone = pipe.clone();
        assert_eq!(clone.refcount(), 2);
        drop(pipe);
        assert!(events.borrow().iter().all(|name| name != "dead"));
        drop(clone);
        assert_eq!(*events.borrow(), vec!["ready".to_string(), "dead".to_string()]);
    }

    #[test]
    fn fourcc_signatures_render_readably() {
        let sig = Signature::from_fourcc(*b"a52f");
        assert_eq!(format!("{sig:?}"), "Signature(a52f)");
        assert_ne!(sig, SIGNATURE_NONE);
    }
}

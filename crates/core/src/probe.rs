// SPDX-FileCopyrightText: © 2025 PipeKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Probes: out-of-band event handling.
//!
//! Pipes never report errors up the call stack; they throw [`Event`]s into
//! the probe chain bound to them at allocation. The chain is walked
//! head-to-tail; a handler answers [`ProbeResult::Handled`] to stop
//! propagation or [`ProbeResult::Pass`] to let the next probe look.
//! Fatal errors are events like any other; the runtime never terminates
//! the process.
//!
//! Event identity is stable: downstream probes match on variants, so
//! variants are never renumbered or repurposed. Events outside the fixed
//! set travel as [`Event::Custom`] and are forwarded unchanged.

use crate::error::ErrorKind;
use crate::pipe::{PipeCore, Signature};
use crate::record::Record;
use std::any::Any;
use std::rc::Rc;
use tracing::Level;

/// An out-of-band event thrown by a pipe.
pub enum Event {
    /// The pipe finished allocation and is ready for input/control.
    Ready,
    /// The pipe is being freed (last reference released).
    Dead,
    /// Unrecoverable error; the pipe stops processing but stays releasable.
    Fatal(ErrorKind),
    /// Recoverable error report.
    Error(ErrorKind),
    /// The source finished its stream.
    SourceEnd,
    /// The sink cannot accept more data (backpressure by convention).
    SinkEnd,
    /// The pipe needs a record manager to proceed.
    NeedRecordMgr,
    /// The pipe needs an event source to proceed.
    NeedPump,
    /// The pipe needs a clock to proceed.
    NeedClock,
    /// The pipe needs a buffer manager to proceed.
    NeedBufMgr,
    /// A new output flow definition was stored.
    NewFlowDef(Record),
    /// A flow definition was rejected; carries the offending record.
    FlowDefError(Record),
    /// A new random access point.
    NewRap,
    /// A split pipe updated its set of outputs.
    SplitUpdate,
    /// A framer locked onto the stream.
    SyncAcquired,
    /// A framer lost the stream.
    SyncLost,
    /// A clock reference (PCR) was found.
    ClockRef {
        record: Record,
        pcr: u64,
        discontinuity: bool,
    },
    /// A record acquired original-clock timestamps.
    ClockTs(Record),
    /// A log line routed through the probe chain.
    Log(Level, String),
    /// An event this runtime does not know; forwarded unchanged.
    Custom {
        signature: Signature,
        payload: Box<dyn Any>,
    },
}

impl Event {
    /// Stable lowercase identifier of the event variant.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Dead => "dead",
            Self::Fatal(_) => "fatal",
            Self::Error(_) => "error",
            Self::SourceEnd => "source_end",
            Self::SinkEnd => "sink_end",
            Self::NeedRecordMgr => "need_record_mgr",
            Self::NeedPump => "need_pump",
            Self::NeedClock => "need_clock",
            Self::NeedBufMgr => "need_buf_mgr",
            Self::NewFlowDef(_) => "new_flow_def",
            Self::FlowDefError(_) => "flow_def_error",
            Self::NewRap => "new_rap",
            Self::SplitUpdate => "split_update",
            Self::SyncAcquired => "sync_acquired",
            Self::SyncLost => "sync_lost",
            Self::ClockRef { .. } => "clock_ref",
            Self::ClockTs(_) => "clock_ts",
            Self::Log(..) => "log",
            Self::Custom { .. } => "custom",
        }
    }
}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fatal(kind) => write!(f, "fatal({kind})"),
            Self::Error(kind) => write!(f, "error({kind})"),
            Self::NewFlowDef(record) => {
                write!(f, "new_flow_def({})", record.flow_def().unwrap_or("?"))
            }
            Self::ClockRef { pcr, discontinuity, .. } => {
                write!(f, "clock_ref(pcr={pcr}, discontinuity={discontinuity})")
            }
            Self::Log(level, msg) => write!(f, "log({level}, {msg:?})"),
            Self::Custom { signature, .. } => write!(f, "custom({signature:?})"),
            other => f.write_str(other.name()),
        }
    }
}

/// Whether a probe consumed an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeResult {
    /// Stop walking the chain.
    Handled,
    /// Let the next probe look at the event.
    Pass,
}

/// One event handler in a chain.
pub trait Probe {
    fn catch(&self, pipe: &PipeCore, event: &Event) -> ProbeResult;
}

/// A head-to-tail chain of probes bound to a pipe.
#[derive(Clone, Default)]
pub struct ProbeChain {
    probes: Vec<Rc<dyn Probe>>,
}

impl ProbeChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a probe at the tail of the chain.
    #[must_use]
    pub fn with(mut self, probe: Rc<dyn Probe>) -> Self {
        self.probes.push(probe);
        self
    }

    pub fn push(&mut self, probe: Rc<dyn Probe>) {
        self.probes.push(probe);
    }

    /// Walks the chain; true when some probe handled the event.
    pub fn throw(&self, pipe: &PipeCore, event: &Event) -> bool {
        for probe in &self.probes {
            if probe.catch(pipe, event) == ProbeResult::Handled {
                return true;
            }
        }
        false
    }
}

impl std::fmt::Debug for ProbeChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeChain").field("probes", &self.probes.len()).finish()
    }
}

/// Adapts a closure into a probe.
pub struct FnProbe<F>(pub F);

impl<F> Probe for FnProbe<F>
where
    F: Fn(&PipeCore, &Event) -> ProbeResult,
{
    fn catch(&self, pipe: &PipeCore, event: &Event) -> ProbeResult {
        (self.0)(pipe, event)
    }
}

/// Emits one line at a runtime-chosen level, with the pipe as a field.
fn log_at(level: Level, pipe: &str, message: &str) {
    if level == Level::ERROR {
        tracing::error!(pipe, "{message}");
    } else if level == Level::WARN {
        tracing::warn!(pipe, "{message}");
    } else if level == Level::INFO {
        tracing::info!(pipe, "{message}");
    } else if level == Level::DEBUG {
        tracing::debug!(pipe, "{message}");
    } else {
        tracing::trace!(pipe, "{message}");
    }
}

/// A fall-back probe logging every received event, then passing it on.
pub struct LogProbe {
    level: Level,
}

impl LogProbe {
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    fn log(&self, pipe: &PipeCore, message: &str) {
        log_at(self.level, pipe.name(), message);
    }
}

impl Probe for LogProbe {
    fn catch(&self, pipe: &PipeCore, event: &Event) -> ProbeResult {
        match event {
            // Log lines carry their own level and are not re-rendered here.
            Event::Log(level, message) => log_at(*level, pipe.name(), message),
            Event::Fatal(kind) => self.log(pipe, &format!("probe caught fatal error: {kind}")),
            Event::Error(kind) => self.log(pipe, &format!("probe caught error: {kind}")),
            Event::NewFlowDef(record) => self.log(
                pipe,
                &format!("probe caught new flow def \"{}\"", record.flow_def().unwrap_or("?")),
            ),
            Event::FlowDefError(_) => self.log(pipe, "probe caught flow def error"),
            Event::ClockRef { pcr, discontinuity, .. } => self.log(
                pipe,
                &format!("probe caught clock ref {pcr}{}", if *discontinuity { " (discontinuity)" } else { "" }),
            ),
            other => self.log(pipe, &format!("probe caught {} event", other.name())),
        }
        ProbeResult::Pass
    }
}

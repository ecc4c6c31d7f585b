// SPDX-FileCopyrightText: © 2025 PipeKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Sync-word acquisition state for framers.
//!
//! Tracks whether a pipe has locked onto its stream's frame boundaries and
//! throws the transition events. Both operations are idempotent, so
//! `SyncAcquired` and `SyncLost` strictly alternate no matter how often the
//! parser calls them.

use crate::pipe::PipeCore;
use crate::probe::Event;

/// Acquired/lost latch throwing sync events on transitions only.
#[derive(Debug, Default)]
pub struct SyncState {
    acquired: bool,
}

impl SyncState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn acquired(&self) -> bool {
        self.acquired
    }

    /// Marks the stream as locked; throws `SyncAcquired` when it was not.
    pub fn acquire(&mut self, core: &PipeCore) {
        if !self.acquired {
            self.acquired = true;
            core.throw(&Event::SyncAcquired);
        }
    }

    /// Marks the stream as lost; throws `SyncLost` when it was locked.
    pub fn lose(&mut self, core: &PipeCore) {
        if self.acquired {
            self.acquired = false;
            core.throw(&Event::SyncLost);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipe::{PipeCore, SIGNATURE_NONE};
    use crate::probe::{FnProbe, ProbeChain, ProbeResult};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn events_alternate_and_duplicates_are_suppressed() {
        let events: Rc<RefCell<Vec<String>>> = Rc::default();
        let log = Rc::clone(&events);
        let chain = ProbeChain::new().with(Rc::new(FnProbe(move |_: &PipeCore, event: &Event| {
            log.borrow_mut().push(event.name().to_string());
            ProbeResult::Pass
        })));
        let core = PipeCore::new("framer", SIGNATURE_NONE, chain);
        let mut sync = SyncState::new();

        sync.lose(&core); // not acquired yet: no event
        sync.acquire(&core);
        sync.acquire(&core);
        sync.lose(&core);
        sync.lose(&core);
        sync.acquire(&core);

        assert_eq!(
            *events.borrow(),
            vec!["ready", "sync_acquired", "sync_lost", "sync_acquired"]
        );
        drop(core);
    }
}

// SPDX-FileCopyrightText: © 2025 PipeKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Flow-definition attributes on records.
//!
//! A flow definition is a hierarchical dot-separated descriptor of what
//! flows through a pipe edge: `"block."`, `"block.mpegtspes."`,
//! `"block.ac3.sound."`. Prefix match is the standard compatibility check.
//! Flow definitions travel as buf-less records whose dictionary carries the
//! `flow.def` attribute.

use crate::dict::Value;
use crate::record::Record;

const DEF_KEY: &str = "flow.def";
const DISCONTINUITY_KEY: &str = "flow.discontinuity";
const START_KEY: &str = "block.start";
const OCTETRATE_KEY: &str = "flow.octetrate";
const RAP_KEY: &str = "flow.rap";

impl Record {
    /// The flow definition string, when this is a flow-def record.
    #[must_use]
    pub fn flow_def(&self) -> Option<&str> {
        self.dict.string(DEF_KEY)
    }

    pub fn set_flow_def(&mut self, def: &str) {
        self.dict.set(DEF_KEY, Value::String(def.to_string()));
    }

    /// Prefix compatibility check against this record's flow definition.
    #[must_use]
    pub fn matches_def(&self, prefix: &str) -> bool {
        self.flow_def().is_some_and(|def| def.starts_with(prefix))
    }

    /// True when the stream was interrupted before this record.
    #[must_use]
    pub fn discontinuity(&self) -> bool {
        self.dict.has(DISCONTINUITY_KEY)
    }

    pub fn set_discontinuity(&mut self) {
        self.dict.set(DISCONTINUITY_KEY, Value::Void);
    }

    pub fn clear_discontinuity(&mut self) {
        self.dict.delete(DISCONTINUITY_KEY);
    }

    /// True when this record starts an access unit / packet payload.
    #[must_use]
    pub fn start(&self) -> bool {
        self.dict.has(START_KEY)
    }

    pub fn set_start(&mut self) {
        self.dict.set(START_KEY, Value::Void);
    }

    pub fn clear_start(&mut self) {
        self.dict.delete(START_KEY);
    }

    /// Octet rate of the flow, in bytes per second.
    #[must_use]
    pub fn octetrate(&self) -> Option<u64> {
        self.dict.unsigned(OCTETRATE_KEY)
    }

    pub fn set_octetrate(&mut self, octetrate: u64) {
        self.dict.set(OCTETRATE_KEY, Value::Unsigned(octetrate));
    }

    /// True when decoding may start at this record (random access point).
    #[must_use]
    pub fn rap(&self) -> bool {
        self.dict.has(RAP_KEY)
    }

    pub fn set_rap(&mut self) {
        self.dict.set(RAP_KEY, Value::Void);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn def_and_prefix_match() {
        let record = Record::flow_def_record("block.mpegtspes.mp2v.");
        assert_eq!(record.flow_def(), Some("block.mpegtspes.mp2v."));
        assert!(record.matches_def("block."));
        assert!(record.matches_def("block.mpegtspes."));
        assert!(!record.matches_def("block.ac3."));
        assert!(!Record::new().matches_def("block."));
    }

    #[test]
    fn flags_toggle() {
        let mut record = Record::new();
        assert!(!record.discontinuity());
        record.set_discontinuity();
        assert!(record.discontinuity());
        record.clear_discontinuity();
        assert!(!record.discontinuity());

        record.set_start();
        assert!(record.start());
        record.clear_start();
        assert!(!record.start());
    }
}

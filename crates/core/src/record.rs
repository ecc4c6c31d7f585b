// SPDX-FileCopyrightText: © 2025 PipeKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The record: what actually travels through a pipe graph.
//!
//! A [`Record`] pairs an optional payload [`Buf`] with a typed attribute
//! [`Dict`]. Ownership of a record moves into the downstream pipe on
//! `input()`; [`Record::dup`] is cheap (the dictionary deep-copies, the
//! payload shares backing storage).
//!
//! Attribute helpers live next to their domain: flow-definition helpers in
//! [`crate::flow`], clock helpers in [`crate::clock`]. This module adds the
//! block helpers, a mirror of the [`BlockBuf`] API that tolerates a missing
//! or non-block payload by failing soft.

use crate::buf::{BlockBuf, Buf};
use crate::dict::Dict;

/// A payload buffer plus its attributes.
#[derive(Debug, Default)]
pub struct Record {
    pub buf: Option<Buf>,
    pub dict: Dict,
}

impl Record {
    /// An empty record: no payload, no attributes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A record carrying a block payload.
    #[must_use]
    pub fn with_block(buf: BlockBuf) -> Self {
        Self { buf: Some(Buf::Block(buf)), dict: Dict::new() }
    }

    /// A buf-less flow-definition record (see [`crate::flow`]).
    #[must_use]
    pub fn flow_def_record(def: &str) -> Self {
        let mut record = Self::new();
        record.set_flow_def(def);
        record
    }

    /// Cheap duplicate: attributes deep-copy, payload shares storage.
    #[must_use]
    pub fn dup(&self) -> Self {
        Self { buf: self.buf.as_ref().map(Buf::dup), dict: self.dict.clone() }
    }

    /// Takes the payload out, leaving the attributes in place.
    pub fn take_buf(&mut self) -> Option<Buf> {
        self.buf.take()
    }

    #[must_use]
    pub fn block(&self) -> Option<&BlockBuf> {
        self.buf.as_ref().and_then(Buf::as_block)
    }

    pub fn block_mut(&mut self) -> Option<&mut BlockBuf> {
        self.buf.as_mut().and_then(Buf::as_block_mut)
    }

    /// Payload size in bytes; `None` when there is no block payload.
    #[must_use]
    pub fn block_size(&self) -> Option<usize> {
        self.block().map(BlockBuf::size)
    }

    /// See [`BlockBuf::peek`].
    #[must_use]
    pub fn block_peek<'a>(
        &'a self,
        offset: usize,
        size: usize,
        scratch: &'a mut [u8],
    ) -> Option<&'a [u8]> {
        self.block()?.peek(offset, size, scratch)
    }

    /// See [`BlockBuf::extract_to`].
    pub fn block_extract(&self, offset: usize, out: &mut [u8]) -> bool {
        self.block().is_some_and(|buf| buf.extract_to(offset, out))
    }

    /// See [`BlockBuf::scan`].
    #[must_use]
    pub fn block_scan(&self, from: usize, byte: u8) -> Option<usize> {
        self.block()?.scan(from, byte)
    }

    /// See [`BlockBuf::resize`].
    pub fn block_resize(&mut self, skip: usize, new_size: Option<usize>) -> bool {
        self.block_mut().is_some_and(|buf| buf.resize(skip, new_size))
    }

    /// See [`BlockBuf::insert`].
    pub fn block_insert(&mut self, offset: usize, other: BlockBuf) -> bool {
        self.block_mut().is_some_and(|buf| buf.insert(offset, other))
    }

    /// See [`BlockBuf::append`]; installs the buffer when the record had no
    /// payload yet.
    pub fn block_append(&mut self, other: BlockBuf) -> bool {
        if let Some(buf) = self.block_mut() {
            return buf.append(other);
        }
        if self.buf.is_none() {
            self.buf = Some(Buf::Block(other));
            return true;
        }
        false
    }

    /// JSON rendering of the attributes plus a payload summary, for debug
    /// logs.
    #[must_use]
    pub fn dump(&self) -> serde_json::Value {
        serde_json::json!({
            "attributes": self.dict.to_json(),
            "payload": self.buf.as_ref().map(|buf| format!("{buf:?}")),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::buf::BlockBufManager;
    use crate::dict::Value;

    #[test]
    fn dup_shares_payload_but_copies_attributes() {
        let mgr = BlockBufManager::new(2);
        let mut record = Record::with_block(mgr.alloc_from(&[1, 2, 3, 4]));
        record.dict.set("k", Value::Unsigned(1));

        let mut dup = record.dup();
        dup.dict.set("k", Value::Unsigned(2));
        assert_eq!(record.dict.unsigned("k"), Some(1));

        // Payload is shared: neither side may write any more.
        assert!(record.block_mut().unwrap().write_span(0, 1).is_none());
        drop(dup);
        assert!(record.block_mut().unwrap().write_span(0, 1).is_some());
    }

    #[test]
    fn block_helpers_fail_soft_without_payload() {
        let mut record = Record::new();
        assert_eq!(record.block_size(), None);
        assert!(!record.block_resize(0, None));
        let mut scratch = [0u8; 4];
        assert!(record.block_peek(0, 4, &mut scratch).is_none());
    }

    #[test]
    fn dump_renders_attributes_and_payload() {
        let mgr = BlockBufManager::new(2);
        let mut record = Record::with_block(mgr.alloc(4));
        record.set_flow_def("block.");
        let dump = record.dump();
        assert_eq!(dump["attributes"]["flow.def"]["string"], "block.");
        assert!(dump["payload"].as_str().unwrap().contains("size: 4"));
    }

    #[test]
    fn append_installs_payload_on_empty_record() {
        let mgr = BlockBufManager::new(2);
        let mut record = Record::new();
        assert!(record.block_append(mgr.alloc_from(&[9, 9])));
        assert!(record.block_append(mgr.alloc_from(&[8, 8])));
        assert_eq!(record.block_size(), Some(4));
    }
}

// SPDX-FileCopyrightText: © 2025 PipeKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Scenario tests for the PES decapsulator.

#![allow(clippy::unwrap_used, clippy::cast_possible_truncation)]

use pipekit_core::clock::{ClockDomain, CLOCK_FREQ};
use pipekit_core::record::Record;
use pipekit_core::testing::{CaptureProbe, CaptureSink};
use pipekit_core::{BlockBufManager, PipeHandle};
use pipekit_ts::{pes, PesDecaps, PesEncaps, TsFlowExt};
use std::cell::RefCell;
use std::rc::Rc;

struct Bench {
    mgr: BlockBufManager,
    pesd: PipeHandle,
    records: Rc<RefCell<Vec<Record>>>,
    events: Rc<RefCell<Vec<String>>>,
}

fn bench() -> Bench {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let (chain, events) = CaptureProbe::chain();
    let pesd = PesDecaps::new("ts pesd", chain);
    let (sink, records) = CaptureSink::new("sink");
    assert!(pesd.set_output(&sink));
    assert!(pesd.set_flow_def(Record::flow_def_record("block.mpegtspes.mp2v.")));
    Bench { mgr: BlockBufManager::new(4), pesd, records, events }
}

impl Bench {
    /// Feeds `data` as a unit-start record.
    fn input_start(&self, data: &[u8]) {
        let mut record = Record::with_block(self.mgr.alloc_from(data));
        record.set_start();
        self.pesd.input(record, None);
    }

    /// Feeds `data` as a continuation record.
    fn input_cont(&self, data: &[u8]) {
        self.pesd.input(Record::with_block(self.mgr.alloc_from(data)), None);
    }

    fn data_records(&self) -> Vec<Record> {
        self.records.borrow().iter().filter(|r| r.buf.is_some()).map(Record::dup).collect()
    }

    fn sync_events(&self) -> Vec<String> {
        self.events.borrow().iter().filter(|e| e.starts_with("sync_")).cloned().collect()
    }
}

/// A complete PES packet for the MPEG video stream id, alignment set.
fn pes_packet(pts: Option<u64>, dts: Option<u64>, payload: &[u8]) -> Vec<u8> {
    let header_length = match (pts, dts) {
        (Some(_), Some(_)) => 2 * pes::PES_HEADER_TS_SIZE,
        (Some(_), None) => pes::PES_HEADER_TS_SIZE,
        _ => 0,
    };
    let mut bytes = vec![0x00, 0x00, 0x01, pes::STREAM_ID_VIDEO_MPEG];
    let length = pes::PES_HEADER_OPTIONAL_SIZE + header_length + payload.len();
    bytes.extend_from_slice(&(length as u16).to_be_bytes());
    bytes.push(0x84); // marker + data alignment
    bytes.push(match (pts, dts) {
        (Some(_), Some(_)) => 0xc0,
        (Some(_), None) => 0x80,
        _ => 0x00,
    });
    bytes.push(header_length as u8);
    if let Some(pts) = pts {
        let mut field = [0u8; 5];
        pes::write_ts_field(&mut field, if dts.is_some() { 0x3 } else { 0x2 }, pts);
        bytes.extend_from_slice(&field);
    }
    if let Some(dts) = dts {
        let mut field = [0u8; 5];
        pes::write_ts_field(&mut field, 0x1, dts);
        bytes.extend_from_slice(&field);
    }
    bytes.extend_from_slice(payload);
    bytes
}

#[test]
fn strips_ptsdts_header_and_lifts_timestamps() {
    let b = bench();
    let payload = [0x42u8; 16];
    b.input_start(&pes_packet(Some(180_000), Some(90_000), &payload));

    let data = b.data_records();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0].block_size(), Some(16));
    let mut out = [0u8; 16];
    assert!(data[0].block_extract(0, &mut out));
    assert_eq!(out, payload);

    assert_eq!(data[0].dts(ClockDomain::Orig), Some(90_000));
    assert_eq!(data[0].dts_pts_delay(), Some(90_000));
    assert!(data[0].start()); // alignment bit
    assert_eq!(b.sync_events(), vec!["sync_acquired"]);
}

#[test]
fn lone_pts_means_dts_equals_pts() {
    let b = bench();
    b.input_start(&pes_packet(Some(180_000), None, &[0u8; 8]));

    let data = b.data_records();
    assert_eq!(data[0].dts(ClockDomain::Orig), Some(180_000));
    assert_eq!(data[0].dts_pts_delay(), None);
}

#[test]
fn header_reassembles_across_fragments() {
    let b = bench();
    let packet = pes_packet(Some(180_000), Some(90_000), &[7u8; 32]);

    b.input_start(&packet[..4]);
    assert!(b.data_records().is_empty());
    b.input_cont(&packet[4..12]);
    assert!(b.data_records().is_empty());
    b.input_cont(&packet[12..]);

    let data = b.data_records();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0].block_size(), Some(32));
    assert_eq!(data[0].dts(ClockDomain::Orig), Some(90_000));
}

#[test]
fn mid_pes_payload_is_forwarded_once_acquired() {
    let b = bench();
    b.input_start(&pes_packet(None, None, &[1u8; 4]));
    assert_eq!(b.data_records().len(), 1);

    // Continuation of the same PES, after the header was removed.
    b.input_cont(&[2u8; 100]);
    let data = b.data_records();
    assert_eq!(data.len(), 2);
    assert_eq!(data[1].block_size(), Some(100));
}

#[test]
fn payload_without_header_is_dropped_until_acquired() {
    let b = bench();
    b.input_cont(&[1u8; 100]);
    assert!(b.data_records().is_empty());
    assert!(b.sync_events().is_empty());
}

#[test]
fn padding_stream_flushes_and_loses_sync() {
    let b = bench();
    b.input_start(&pes_packet(None, None, &[1u8; 4]));
    assert_eq!(b.sync_events(), vec!["sync_acquired"]);

    let mut padding = vec![0x00, 0x00, 0x01, pes::STREAM_ID_PADDING, 0x00, 0x08];
    padding.extend_from_slice(&[0xffu8; 8]);
    b.input_start(&padding);

    assert_eq!(b.data_records().len(), 1);
    assert_eq!(b.sync_events(), vec!["sync_acquired", "sync_lost"]);
}

#[test]
fn headerless_stream_ids_only_drop_the_fixed_header() {
    let b = bench();
    let mut packet = vec![0x00, 0x00, 0x01, pes::STREAM_ID_PSM, 0x00, 0x06];
    packet.extend_from_slice(&[0xabu8; 6]);
    b.input_start(&packet);

    let data = b.data_records();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0].block_size(), Some(6));
    assert_eq!(data[0].dts(ClockDomain::Orig), None);
}

#[test]
fn new_start_replaces_a_truncated_header() {
    let b = bench();
    let packet = pes_packet(None, None, &[9u8; 4]);
    // A start record whose header never completes...
    b.input_start(&packet[..3]);
    assert!(b.data_records().is_empty());
    // ...is dropped when the next unit start arrives.
    b.input_start(&packet);
    assert_eq!(b.data_records().len(), 1);
}

#[test]
fn garbage_start_code_flushes() {
    let b = bench();
    let mut packet = pes_packet(None, None, &[1u8; 4]);
    packet[2] = 0x02; // break the start code
    b.input_start(&packet);
    assert!(b.data_records().is_empty());
}

#[test]
fn flow_def_is_rewritten() {
    let b = bench();
    assert_eq!(b.pesd.flow_def().unwrap().flow_def(), Some("block.mp2v."));
}

#[test]
fn rejects_foreign_flow_defs_and_drops_data() {
    let (chain, events) = CaptureProbe::chain();
    let pesd = PesDecaps::new("ts pesd", chain);
    assert!(!pesd.set_flow_def(Record::flow_def_record("block.mp2v.")));
    assert!(events.borrow().iter().any(|e| e == "flow_def_error"));

    // Data without a stored flow def is refused too.
    let mgr = BlockBufManager::new(2);
    let before = events.borrow().len();
    pesd.input(Record::with_block(mgr.alloc(8)), None);
    assert!(events.borrow().len() > before);
}

#[test]
fn encaps_then_decaps_round_trips() {
    let mgr = BlockBufManager::new(4);
    let (pese_chain, _pese_events) = CaptureProbe::chain();
    let (pesd_chain, _pesd_events) = CaptureProbe::chain();
    let pese = PesEncaps::new("ts pese", pese_chain, mgr.clone());
    let pesd = PesDecaps::new("ts pesd", pesd_chain);
    let (sink, records) = CaptureSink::new("sink");
    assert!(pese.set_output(&pesd));
    assert!(pesd.set_output(&sink));

    let mut flow_def = Record::flow_def_record("block.mpeg2video.");
    flow_def.set_pes_id(pes::STREAM_ID_VIDEO_MPEG);
    assert!(pese.set_flow_def(flow_def));

    let mut payload = Record::with_block(mgr.alloc(2048));
    payload.set_dts(ClockDomain::Prog, CLOCK_FREQ);
    payload.set_dts_pts_delay(CLOCK_FREQ);
    pese.input(payload, None);

    let records = records.borrow();
    // The decapsulator rewrote the encapsulator's flow def back.
    assert_eq!(records[0].flow_def(), Some("block.mpeg2video."));
    let data: Vec<&Record> = records.iter().filter(|r| r.buf.is_some()).collect();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0].block_size(), Some(2048));
    assert_eq!(data[0].dts(ClockDomain::Orig), Some(CLOCK_FREQ / 300));
    assert_eq!(data[0].dts_pts_delay(), Some(CLOCK_FREQ / 300));
}

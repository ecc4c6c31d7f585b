// SPDX-FileCopyrightText: © 2025 PipeKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! A/52 (AC-3 / E-AC-3) framer.
//!
//! Accepts `"block."` input, scans for the `0x0B 0x77` sync word, parses
//! the 6-byte sync frame header and emits one record per frame. The output
//! flow definition is `"block.ac3.sound."` (bit stream id 8) or
//! `"block.eac3.sound."` (Annex E, bit stream id 16); AC-3 additionally
//! carries the octet rate derived from the frame size code.
//!
//! Timestamps: the framer works on encoded data, so dates are rebased on
//! DTS. The DTS carried by an input record lands on the first frame that
//! starts in it; after each frame the pseudo-record DTS advances by the
//! frame duration, carrying the division residue so long streams do not
//! drift.

use pipekit_core::clock::{ClockDomain, CLOCK_FREQ};
use pipekit_core::error::{ControlError, ErrorKind};
use pipekit_core::pipe::{
    Command, ControlResponse, ControlResult, LifeState, OutputHelper, Pipe, PipeCore, PipeHandle,
    Signature,
};
use pipekit_core::probe::{Event, ProbeChain};
use pipekit_core::pump::Pump;
use pipekit_core::record::Record;
use pipekit_core::stream::StreamAccumulator;
use pipekit_core::sync::SyncState;

/// Signature of the A/52 framer's command range.
pub const A52_FRAMER_SIGNATURE: Signature = Signature::from_fourcc(*b"a52f");

/// A/52 sync word.
const SYNCWORD: [u8; 2] = [0x0b, 0x77];
/// Bit stream id of an A/52 (AC-3) stream.
const BSID_AC3: u8 = 8;
/// Bit stream id of an A/52 Annex E (E-AC-3) stream.
const BSID_EAC3: u8 = 16;
/// Samples per AC-3 sync frame.
const AC3_SAMPLES: u64 = 1536;

/// Sample rates indexed by `fscod`.
const SAMPLERATES: [u64; 3] = [48_000, 44_100, 32_000];
/// Reduced sample rates indexed by `fscod2` (E-AC-3, `fscod == 3`).
const REDUCED_SAMPLERATES: [u64; 3] = [24_000, 22_050, 16_000];
/// Audio blocks per E-AC-3 frame, indexed by `numblkscod`.
const NUMBLKS: [u64; 4] = [1, 2, 3, 6];
/// Nominal bitrates in kbit/s, indexed by `frmsizecod >> 1`.
const BITRATES_KBPS: [u64; 19] = [
    32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384, 448, 512, 576, 640,
];
/// AC-3 frame sizes in 16-bit words, indexed by `frmsizecod` then `fscod`.
const FRAME_SIZE_WORDS: [[u16; 3]; 38] = [
    [64, 69, 96],
    [64, 70, 96],
    [80, 87, 120],
    [80, 88, 120],
    [96, 104, 144],
    [96, 105, 144],
    [112, 121, 168],
    [112, 122, 168],
    [128, 139, 192],
    [128, 140, 192],
    [160, 174, 240],
    [160, 175, 240],
    [192, 208, 288],
    [192, 209, 288],
    [224, 243, 336],
    [224, 244, 336],
    [256, 278, 384],
    [256, 279, 384],
    [320, 348, 480],
    [320, 349, 480],
    [384, 417, 576],
    [384, 418, 576],
    [448, 487, 672],
    [448, 488, 672],
    [512, 557, 768],
    [512, 558, 768],
    [640, 696, 960],
    [640, 697, 960],
    [768, 835, 1152],
    [768, 836, 1152],
    [896, 975, 1344],
    [896, 976, 1344],
    [1024, 1114, 1536],
    [1024, 1115, 1536],
    [1152, 1253, 1728],
    [1152, 1254, 1728],
    [1280, 1393, 1920],
    [1280, 1394, 1920],
];

/// `bsid`: bits 40..45 of the sync frame header.
fn bsid(header: &[u8; 6]) -> u8 {
    header[5] >> 3
}

/// `fscod`: top two bits of byte 4.
fn fscod(header: &[u8; 6]) -> u8 {
    header[4] >> 6
}

/// `frmsizecod`: low six bits of byte 4.
fn frmsizecod(header: &[u8; 6]) -> u8 {
    header[4] & 0x3f
}

/// E-AC-3 `frmsiz`: 11 bits straddling bytes 2 and 3.
fn frmsiz(header: &[u8; 6]) -> u16 {
    (u16::from(header[2] & 0x07) << 8) | u16::from(header[3])
}

/// E-AC-3 `numblkscod` (doubles as `fscod2` when `fscod == 3`).
fn numblkscod(header: &[u8; 6]) -> u8 {
    (header[4] >> 4) & 0x03
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameClass {
    Ac3,
    Eac3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameCheck {
    Ready,
    NeedMore,
    Invalid,
}

/// Harvests an input record's per-domain DTS into the pseudo-record and
/// resets the duration residue. Invoked at each stream promotion.
fn promote_dates(dates: &mut Record, residue: &mut u64, record: &Record) {
    for domain in ClockDomain::ALL {
        if let Some(dts) = record.dts(domain) {
            dates.set_dts(domain, dts);
        }
    }
    *residue = 0;
}

/// The A/52 framer pipe.
pub struct A52Framer {
    core: PipeCore,
    output: OutputHelper,
    flow_def_input: Option<Record>,
    sync: SyncState,
    stream: StreamAccumulator,
    /// Size of the frame being gathered; `None` until a header parses.
    next_frame_size: Option<usize>,
    /// Pseudo-record holding the dates for the next frame.
    pseudo_dates: Record,
    /// Residue of the frame duration division, in 27 MHz units.
    duration_residue: u64,
    samples: u64,
    samplerate: u64,
    /// Codec class of the stored flow definition; a class flip mid-stream
    /// re-emits the flow def.
    last_class: Option<FrameClass>,
}

impl A52Framer {
    /// Allocates the framer and returns its handle.
    #[must_use]
    pub fn new(name: impl Into<String>, probes: ProbeChain) -> PipeHandle {
        PipeHandle::new(Self {
            core: PipeCore::new(name, A52_FRAMER_SIGNATURE, probes),
            output: OutputHelper::new(),
            flow_def_input: None,
            sync: SyncState::new(),
            stream: StreamAccumulator::new(),
            next_frame_size: None,
            pseudo_dates: Record::new(),
            duration_residue: 0,
            samples: 0,
            samplerate: 0,
            last_class: None,
        })
    }

    fn consume(&mut self, n: usize) {
        let (dates, residue) = (&mut self.pseudo_dates, &mut self.duration_residue);
        self.stream.consume(n, &mut |record| promote_dates(dates, residue, record));
    }

    /// Looks for the sync word. Returns whether it was found and how many
    /// leading bytes to drop to reach it (or the end of useless data).
    fn scan_sync(&self) -> (bool, usize) {
        let mut from = 0usize;
        loop {
            let Some(pos) = self.stream.scan(from, SYNCWORD[0]) else {
                return (false, self.stream.size());
            };
            let mut scratch = [0u8; 1];
            let Some(word) = self.stream.peek(pos + 1, 1, &mut scratch) else {
                // Candidate at the very end; keep it and wait for more data.
                return (false, pos);
            };
            if word[0] == SYNCWORD[1] {
                return (true, pos);
            }
            from = pos + 1;
        }
    }

    /// Base for output flow definitions: the input flow def's attributes.
    fn flow_def_base(&self) -> Record {
        self.flow_def_input.as_ref().map_or_else(Record::new, Record::dup)
    }

    fn parse_ac3(&mut self, header: &[u8; 6]) -> bool {
        let fscod = usize::from(fscod(header));
        let frmsizecod = usize::from(frmsizecod(header));
        if fscod >= SAMPLERATES.len() || frmsizecod >= FRAME_SIZE_WORDS.len() {
            return false;
        }
        self.next_frame_size = Some(usize::from(FRAME_SIZE_WORDS[frmsizecod][fscod]) * 2);
        self.samples = AC3_SAMPLES;
        self.samplerate = SAMPLERATES[fscod];

        if self.last_class != Some(FrameClass::Ac3) {
            let mut flow_def = self.flow_def_base();
            flow_def.set_flow_def("block.ac3.sound.");
            flow_def.set_octetrate(BITRATES_KBPS[frmsizecod >> 1] * 125);
            self.output.store_flow_def(&self.core, flow_def);
            self.last_class = Some(FrameClass::Ac3);
        }
        true
    }

    fn parse_eac3(&mut self, header: &[u8; 6]) -> bool {
        let fscod = usize::from(fscod(header));
        let numblkscod = usize::from(numblkscod(header));
        let (samplerate, samples) = if fscod == 3 {
            // numblkscod doubles as fscod2; 3 is reserved.
            let Some(&samplerate) = REDUCED_SAMPLERATES.get(numblkscod) else {
                return false;
            };
            (samplerate, 6 * 256)
        } else {
            (SAMPLERATES[fscod], NUMBLKS[numblkscod] * 256)
        };
        self.next_frame_size = Some((usize::from(frmsiz(header)) + 1) * 2);
        self.samplerate = samplerate;
        self.samples = samples;

        if self.last_class != Some(FrameClass::Eac3) {
            let mut flow_def = self.flow_def_base();
            flow_def.set_flow_def("block.eac3.sound.");
            self.output.store_flow_def(&self.core, flow_def);
            self.last_class = Some(FrameClass::Eac3);
        }
        true
    }

    /// Parses the 6-byte header at the stream head. Returns false when the
    /// header is inconsistent; with too little data buffered it returns
    /// true leaving `next_frame_size` unset.
    fn parse_header(&mut self) -> bool {
        let mut scratch = [0u8; 6];
        let header: [u8; 6] = {
            let Some(header) = self.stream.peek(0, 6, &mut scratch) else {
                return true;
            };
            let Ok(header) = header.try_into() else { return true };
            header
        };
        match bsid(&header) {
            BSID_AC3 => self.parse_ac3(&header),
            BSID_EAC3 => self.parse_eac3(&header),
            _ => false,
        }
    }

    /// Checks that a sync word begins right after the gathered frame.
    fn check_frame(&self, frame_size: usize) -> FrameCheck {
        if self.stream.size() < frame_size {
            return FrameCheck::NeedMore;
        }
        let mut scratch = [0u8; 2];
        match self.stream.peek(frame_size, 2, &mut scratch) {
            // The whole frame is here but the next sync word is not; once
            // acquired, emit anyway rather than delaying the frame.
            None => {
                if self.sync.acquired() {
                    FrameCheck::Ready
                } else {
                    FrameCheck::NeedMore
                }
            }
            Some(words) if words[0] == SYNCWORD[0] && words[1] == SYNCWORD[1] => FrameCheck::Ready,
            Some(_) => FrameCheck::Invalid,
        }
    }

    fn output_frame(&mut self, frame_size: usize, pump: Option<&Pump>) {
        let dates = self.pseudo_dates.dup();
        // From now on, date declarations only impact the next frame.
        self.pseudo_dates.flush_dates();

        let frame = {
            let (pd, residue) = (&mut self.pseudo_dates, &mut self.duration_residue);
            self.stream.extract(frame_size, &mut |record| promote_dates(pd, residue, record))
        };
        let Some(mut frame) = frame else {
            self.core.throw(&Event::Fatal(ErrorKind::Alloc));
            return;
        };

        let ticks = self.samples * CLOCK_FREQ + self.duration_residue;
        let duration = if self.samplerate > 0 { ticks / self.samplerate } else { 0 };
        self.duration_residue = if self.samplerate > 0 { ticks % self.samplerate } else { 0 };

        // Rebase on DTS, domain by domain.
        for domain in ClockDomain::ALL {
            if let Some(date) = dates.dts(domain) {
                frame.set_dts(domain, date);
                self.pseudo_dates.set_dts(domain, date + duration);
            } else if frame.dts(domain).is_some() {
                frame.clear_date(domain);
            }
        }
        frame.set_dts_pts_delay(0);

        self.output.send(&self.core, frame, pump);
    }

    /// Pulls as many complete frames as possible out of the accumulator.
    fn work(&mut self, pump: Option<&Pump>) {
        while !self.stream.is_empty() {
            if !self.sync.acquired() {
                let (found, dropped) = self.scan_sync();
                if dropped > 0 {
                    self.consume(dropped);
                }
                if !found {
                    return;
                }
            }
            if self.next_frame_size.is_none() && !self.parse_header() {
                tracing::warn!(pipe = self.core.name(), "invalid header");
                self.consume(1);
                self.sync.lose(&self.core);
                continue;
            }
            let Some(frame_size) = self.next_frame_size else {
                return; // not enough data
            };
            match self.check_frame(frame_size) {
                FrameCheck::Invalid => {
                    tracing::warn!(pipe = self.core.name(), "invalid frame");
                    self.consume(1);
                    self.next_frame_size = None;
                    self.sync.lose(&self.core);
                    continue;
                }
                FrameCheck::NeedMore => return,
                FrameCheck::Ready => {}
            }
            self.sync.acquire(&self.core);
            self.output_frame(frame_size, pump);
            self.next_frame_size = None;
        }
    }

    fn set_flow_def(&mut self, flow_def: Record) -> ControlResult {
        if !flow_def.matches_def("block.") {
            self.core.set_state(LifeState::FlowErr);
            self.core.throw(&Event::FlowDefError(flow_def));
            return Err(ControlError::Rejected("expected a block. flow definition".to_string()));
        }
        self.flow_def_input = Some(flow_def);
        // Rebuild the output flow def from the new attributes at the next
        // header parse.
        self.last_class = None;
        Ok(ControlResponse::Done)
    }
}

impl Pipe for A52Framer {
    fn core(&self) -> &PipeCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut PipeCore {
        &mut self.core
    }

    fn input(&mut self, record: Record, pump: Option<&Pump>) {
        // Flow definitions travel in-band as buf-less records.
        if record.flow_def().is_some() {
            let _ = self.set_flow_def(record);
            return;
        }
        if record.buf.is_none() {
            self.output.send(&self.core, record, pump);
            return;
        }
        if record.discontinuity() {
            // Drop the current frame and resync.
            self.stream.clear();
            self.next_frame_size = None;
            self.sync.lose(&self.core);
        }
        let (dates, residue) = (&mut self.pseudo_dates, &mut self.duration_residue);
        self.stream.append(record, &mut |r| promote_dates(dates, residue, r));
        self.work(pump);
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

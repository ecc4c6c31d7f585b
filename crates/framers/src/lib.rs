// SPDX-FileCopyrightText: © 2025 PipeKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! PipeKit framers: pipes that cut elementary streams into frames.
//!
//! A framer consumes arbitrarily-chopped `"block."` records, locks onto the
//! stream's sync words and emits exactly one record per coded frame, with
//! timestamps rebased onto frame boundaries and the output flow definition
//! describing the detected codec.

pub mod a52;

pub use a52::{A52Framer, A52_FRAMER_SIGNATURE};

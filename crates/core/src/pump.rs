// SPDX-FileCopyrightText: © 2025 PipeKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! The pump tag: an opaque event-source identity.
//!
//! Whatever drives data into a graph (a file reader loop, a socket
//! callback, a test harness) passes a pump tag through `input()`. The
//! runtime never inspects it; it only identifies the originator in logs.

/// Opaque tag identifying the event source driving an `input()` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pump {
    name: String,
}

impl Pump {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

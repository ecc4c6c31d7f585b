// SPDX-FileCopyrightText: © 2025 PipeKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Clock attributes on records.
//!
//! Timestamps live in three domains: `sys` (system/monotonic), `prog`
//! (program clock, 27 MHz) and `orig` (whatever the original stream
//! carried). Each domain stores one base date with a kind tag. The data
//! plane works on encoded data, so dates are rebased on DTS: a `Direct`
//! date *is* the DTS of that domain, and the PTS is derived as
//! `dts + dts_pts_delay`.
//!
//! All values are 64-bit ticks; `prog`/`sys` use the 27 MHz reference
//! ([`CLOCK_FREQ`]).

use crate::dict::Value;
use crate::record::Record;

/// Ticks per second of the reference clock (27 MHz).
pub const CLOCK_FREQ: u64 = 27_000_000;

/// The three time domains a date can live in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockDomain {
    Sys,
    Prog,
    Orig,
}

impl ClockDomain {
    /// All domains, in rebasing order.
    pub const ALL: [Self; 3] = [Self::Sys, Self::Prog, Self::Orig];
}

/// What a domain's date represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateKind {
    /// No date (deletes the attribute when stored).
    None,
    /// A direct timestamp: the DTS of this domain.
    Direct,
    /// A clock reference (PCR-style), not a presentation timestamp.
    ClockRef,
}

impl DateKind {
    fn tag(self) -> u64 {
        match self {
            Self::None => 0,
            Self::Direct => 1,
            Self::ClockRef => 2,
        }
    }

    fn from_tag(tag: u64) -> Option<Self> {
        match tag {
            1 => Some(Self::Direct),
            2 => Some(Self::ClockRef),
            _ => None,
        }
    }
}

fn date_key(domain: ClockDomain) -> &'static str {
    match domain {
        ClockDomain::Sys => "clock.date.sys",
        ClockDomain::Prog => "clock.date.prog",
        ClockDomain::Orig => "clock.date.orig",
    }
}

fn kind_key(domain: ClockDomain) -> &'static str {
    match domain {
        ClockDomain::Sys => "clock.datekind.sys",
        ClockDomain::Prog => "clock.datekind.prog",
        ClockDomain::Orig => "clock.datekind.orig",
    }
}

const DELAY_KEY: &str = "clock.dtspts_delay";
const DURATION_KEY: &str = "clock.duration";

impl Record {
    /// The base date of a domain, when one is set.
    #[must_use]
    pub fn date(&self, domain: ClockDomain) -> Option<(u64, DateKind)> {
        let value = self.dict.unsigned(date_key(domain))?;
        let kind = DateKind::from_tag(self.dict.unsigned(kind_key(domain))?)?;
        Some((value, kind))
    }

    /// Stores a domain's date; `DateKind::None` deletes it.
    pub fn set_date(&mut self, domain: ClockDomain, value: u64, kind: DateKind) {
        if kind == DateKind::None {
            self.dict.delete(date_key(domain));
            self.dict.delete(kind_key(domain));
        } else {
            self.dict.set(date_key(domain), Value::Unsigned(value));
            self.dict.set(kind_key(domain), Value::Unsigned(kind.tag()));
        }
    }

    /// Deletes a domain's date.
    pub fn clear_date(&mut self, domain: ClockDomain) {
        self.set_date(domain, 0, DateKind::None);
    }

    /// The DTS of a domain (a `Direct` date).
    #[must_use]
    pub fn dts(&self, domain: ClockDomain) -> Option<u64> {
        match self.date(domain)? {
            (value, DateKind::Direct) => Some(value),
            _ => None,
        }
    }

    pub fn set_dts(&mut self, domain: ClockDomain, value: u64) {
        self.set_date(domain, value, DateKind::Direct);
    }

    /// The PTS of a domain: DTS plus the PTS/DTS delay (0 when unset).
    #[must_use]
    pub fn pts(&self, domain: ClockDomain) -> Option<u64> {
        Some(self.dts(domain)? + self.dts_pts_delay().unwrap_or(0))
    }

    #[must_use]
    pub fn dts_pts_delay(&self) -> Option<u64> {
        self.dict.unsigned(DELAY_KEY)
    }

    pub fn set_dts_pts_delay(&mut self, delay: u64) {
        self.dict.set(DELAY_KEY, Value::Unsigned(delay));
    }

    pub fn clear_dts_pts_delay(&mut self) {
        self.dict.delete(DELAY_KEY);
    }

    /// Duration of the payload, in 27 MHz ticks.
    #[must_use]
    pub fn duration(&self) -> Option<u64> {
        self.dict.unsigned(DURATION_KEY)
    }

    pub fn set_duration(&mut self, duration: u64) {
        self.dict.set(DURATION_KEY, Value::Unsigned(duration));
    }

    /// Clears every domain's date and the PTS/DTS delay.
    pub fn flush_dates(&mut self) {
        for domain in ClockDomain::ALL {
            self.clear_date(domain);
        }
        self.clear_dts_pts_delay();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dates_round_trip_per_domain() {
        let mut record = Record::new();
        record.set_dts(ClockDomain::Prog, CLOCK_FREQ);
        record.set_date(ClockDomain::Sys, 123, DateKind::ClockRef);

        assert_eq!(record.dts(ClockDomain::Prog), Some(CLOCK_FREQ));
        assert_eq!(record.dts(ClockDomain::Sys), None); // clock ref, not a DTS
        assert_eq!(record.date(ClockDomain::Sys), Some((123, DateKind::ClockRef)));
        assert_eq!(record.dts(ClockDomain::Orig), None);
    }

    #[test]
    fn pts_derives_from_dts_and_delay() {
        let mut record = Record::new();
        record.set_dts(ClockDomain::Prog, 1000);
        assert_eq!(record.pts(ClockDomain::Prog), Some(1000));
        record.set_dts_pts_delay(500);
        assert_eq!(record.pts(ClockDomain::Prog), Some(1500));
    }

    #[test]
    fn flush_clears_everything() {
        let mut record = Record::new();
        record.set_dts(ClockDomain::Sys, 1);
        record.set_dts(ClockDomain::Orig, 2);
        record.set_dts_pts_delay(3);
        record.flush_dates();
        assert_eq!(record.dts(ClockDomain::Sys), None);
        assert_eq!(record.dts(ClockDomain::Orig), None);
        assert_eq!(record.dts_pts_delay(), None);
    }
}

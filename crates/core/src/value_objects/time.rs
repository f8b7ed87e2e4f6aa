//! Virtual session time.
//!
//! Sessions run on a virtual clock: integer milliseconds since session
//! start, mapped from wall time by the harness. Integer storage keeps the
//! type totally ordered so it can break price-level ties deterministically.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Milliseconds of virtual time since session start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct SimTime(u64);

impl SimTime {
    pub const ZERO: SimTime = SimTime(0);

    #[inline(always)]
    pub const fn from_millis(ms: u64) -> Self {
        Self(ms)
    }

    pub fn from_secs_f64(secs: f64) -> Self {
        Self((secs * 1_000.0).max(0.0).round() as u64)
    }

    #[inline(always)]
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 1_000.0
    }

    #[inline]
    pub const fn plus_millis(self, ms: u64) -> Self {
        Self(self.0 + ms)
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}s", self.as_secs_f64())
    }
}

//! Integer tick price.
//!
//! The simulated instrument trades on a whole-tick grid; the system-wide
//! worst-price bounds live in the exchange configuration, not here.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

/// Price in whole ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Price(i64);

impl Price {
    pub const ZERO: Price = Price(0);

    #[inline(always)]
    pub const fn new(ticks: i64) -> Self {
        Self(ticks)
    }

    #[inline(always)]
    pub const fn ticks(self) -> i64 {
        self.0
    }

    /// Shift by a signed number of ticks.
    #[inline]
    pub const fn offset(self, ticks: i64) -> Self {
        Self(self.0 + ticks)
    }

    /// Clamp into an inclusive band.
    #[inline]
    pub fn clamp_to(self, lo: Price, hi: Price) -> Self {
        Self(self.0.clamp(lo.0, hi.0))
    }

    #[inline]
    pub fn to_f64(self) -> f64 {
        self.0 as f64
    }
}

impl Add for Price {
    type Output = Price;

    fn add(self, rhs: Self) -> Self {
        Price(self.0 + rhs.0)
    }
}

impl Sub for Price {
    type Output = Price;

    fn sub(self, rhs: Self) -> Self {
        Price(self.0 - rhs.0)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_and_offset() {
        let p = Price::new(100);
        assert!(p < Price::new(101));
        assert_eq!(p.offset(-1), Price::new(99));
        assert_eq!(Price::new(250).clamp_to(Price::new(1), Price::new(200)), Price::new(200));
    }
}

//! Virtual session clock.
//!
//! A session lasts `real_len` of wall time but `virtual_len_ms` of market
//! time; every thread maps wall time to virtual time through a shared
//! clone of this clock, so all units agree on "now" without coordination.

use agora_core::SimTime;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct SessionClock {
    started: Instant,
    real_len: Duration,
    virtual_len_ms: u64,
}

impl SessionClock {
    pub fn start(real_len: Duration, virtual_len_ms: u64) -> Self {
        SessionClock { started: Instant::now(), real_len, virtual_len_ms }
    }

    fn fraction(&self) -> f64 {
        self.started.elapsed().as_secs_f64() / self.real_len.as_secs_f64()
    }

    /// Current virtual time. Keeps advancing past the nominal end, so late
    /// bookkeeping still gets monotone timestamps.
    pub fn now(&self) -> SimTime {
        SimTime::from_millis((self.fraction() * self.virtual_len_ms as f64).round() as u64)
    }

    /// Remaining fraction of the session, in [0, 1].
    pub fn time_left(&self) -> f64 {
        (1.0 - self.fraction()).clamp(0.0, 1.0)
    }

    pub fn expired(&self) -> bool {
        self.started.elapsed() >= self.real_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_real_time_onto_virtual_time() {
        let clock = SessionClock::start(Duration::from_millis(50), 1_000);
        assert!(clock.time_left() > 0.0);
        std::thread::sleep(Duration::from_millis(60));
        assert!(clock.expired());
        assert!(clock.now() >= SimTime::from_millis(1_000));
        assert_eq!(clock.time_left(), 0.0);
    }
}

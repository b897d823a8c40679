//! Per-room broadcast rate limiter.
//!
//! Document writes are always applied immediately; only the outbound
//! `document-broadcast` is throttled. When a write arrives inside the
//! interval the throttle remembers that a flush is owed (and who caused
//! it), so the engine can send the latest document once the interval has
//! elapsed and peers never miss the final state.

use std::time::{Duration, Instant};

use crate::ids::ConnId;

#[derive(Debug, Clone)]
pub struct BroadcastThrottle {
    interval: Duration,
    last_broadcast: Option<Instant>,

    /// Origin of the most recent throttled write, if a flush is owed.
    pending: Option<ConnId>,
}

impl BroadcastThrottle {
    /// A zero interval disables throttling.
    pub fn new(interval: Duration) -> Self {
        BroadcastThrottle {
            interval,
            last_broadcast: None,
            pending: None,
        }
    }

    /// Decide whether a write from `origin` at `now` may broadcast right away.
    ///
    /// Returns `false` and records a pending flush when throttled. The first
    /// write after creation (or after [`reset`](Self::reset)) is always admitted.
    pub fn admit(&mut self, now: Instant, origin: ConnId) -> bool {
        if self.elapsed(now) {
            self.last_broadcast = Some(now);
            self.pending = None;
            true
        } else {
            self.pending = Some(origin);
            false
        }
    }

    /// If a flush is owed and the interval has passed, consume it and
    /// return the origin connection to exclude from the broadcast.
    pub fn take_due(&mut self, now: Instant) -> Option<ConnId> {
        if self.pending.is_some() && self.elapsed(now) {
            self.last_broadcast = Some(now);
            self.pending.take()
        } else {
            None
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Forget any owed flush and broadcast history.
    pub fn reset(&mut self) {
        self.last_broadcast = None;
        self.pending = None;
    }

    fn elapsed(&self, now: Instant) -> bool {
        match self.last_broadcast {
            None => true,
            Some(_) if self.interval.is_zero() => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS_50: Duration = Duration::from_millis(50);

    #[test]
    fn first_write_is_admitted() {
        let mut t = BroadcastThrottle::new(MS_50);
        assert!(t.admit(Instant::now(), ConnId(1)));
        assert!(!t.is_pending());
    }

    #[test]
    fn burst_inside_interval_is_deferred_then_flushed() {
        let start = Instant::now();
        let mut t = BroadcastThrottle::new(MS_50);

        assert!(t.admit(start, ConnId(1)));
        assert!(!t.admit(start + Duration::from_millis(10), ConnId(1)));
        assert!(!t.admit(start + Duration::from_millis(20), ConnId(2)));
        assert!(t.is_pending());

        // Not yet due.
        assert_eq!(t.take_due(start + Duration::from_millis(30)), None);

        // Due: the last origin is reported, and only once.
        assert_eq!(t.take_due(start + MS_50), Some(ConnId(2)));
        assert_eq!(t.take_due(start + Duration::from_millis(200)), None);
    }

    #[test]
    fn admitted_write_clears_pending_flush() {
        let start = Instant::now();
        let mut t = BroadcastThrottle::new(MS_50);

        t.admit(start, ConnId(1));
        t.admit(start + Duration::from_millis(5), ConnId(1));
        assert!(t.admit(start + Duration::from_millis(60), ConnId(1)));
        assert!(!t.is_pending());
    }

    #[test]
    fn zero_interval_never_throttles() {
        let now = Instant::now();
        let mut t = BroadcastThrottle::new(Duration::ZERO);
        for _ in 0..5 {
            assert!(t.admit(now, ConnId(7)));
        }
        assert!(!t.is_pending());
    }
}

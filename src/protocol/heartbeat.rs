//! Connection-state keep-alive bookkeeping.
//!
//! The tunnel sends a `CONNECTIONSTATE_REQUEST` right after connecting and
//! again one interval after every successful response. This type only tracks
//! when the next request is due and which round is still unanswered; the
//! tunnel builds and retries the packets.

use std::time::{Duration, Instant};

/// Heartbeat timer state
#[derive(Debug, Clone)]
pub struct Heartbeat {
    interval: Duration,
    next_due: Option<Instant>,
    outstanding: Option<u64>,
    rounds: u64,
}

impl Heartbeat {
    /// Create a stopped heartbeat
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_due: None,
            outstanding: None,
            rounds: 0,
        }
    }

    /// Interval between a response and the next request
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Begin a new round, returns its token.
    ///
    /// Any pending timer is cancelled first.
    pub fn begin(&mut self) -> u64 {
        self.rounds += 1;
        self.next_due = None;
        self.outstanding = Some(self.rounds);
        self.rounds
    }

    /// Record a successful response and schedule the next round
    pub fn answered(&mut self, now: Instant) {
        self.outstanding = None;
        self.next_due = Some(now + self.interval);
    }

    /// True while round `token` has no response
    pub fn is_outstanding(&self, token: u64) -> bool {
        self.outstanding == Some(token)
    }

    /// True if the next round should start
    pub fn is_due(&self, now: Instant) -> bool {
        self.next_due.is_some_and(|due| now >= due)
    }

    /// Time the next round starts
    pub const fn next_due(&self) -> Option<Instant> {
        self.next_due
    }

    /// Stop the timer and forget the open round
    pub fn stop(&mut self) {
        self.next_due = None;
        self.outstanding = None;
    }
}

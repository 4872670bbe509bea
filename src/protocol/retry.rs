//! Bounded retransmission of outbound packets.
//!
//! Every request the tunnel sends goes through a [`RetryTask`]: the packet is
//! sent once immediately, then resent each `interval` until its
//! [`StopCondition`] holds or the repeat budget is spent. Exhaustion is
//! reported one interval after the last transmission, so a budget of three
//! means exactly three packets on the wire.
//!
//! The scheduler never looks at connection state itself. The caller passes
//! a predicate deciding whether a stop condition is satisfied, which keeps
//! the repeat and cancel rules testable on their own.

use crate::protocol::tunnel::Transmit;
use std::time::{Duration, Instant};

/// When a retried request counts as answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCondition {
    /// Connect handshake: the tunnel left the connecting state
    LeftConnecting,
    /// Disconnect: the tunnel reached the closed state
    Closed,
    /// Tunneling request: the pending entry for `sequence` was acknowledged
    Acknowledged {
        /// Sequence number of the request
        sequence: u8,
        /// Identifies the pending entry, guards against slot reuse
        token: u64,
    },
    /// Heartbeat: the connection state response for `token` arrived
    HeartbeatAnswered {
        /// Heartbeat round
        token: u64,
    },
}

/// Outcome of a scheduler tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryAction {
    /// Send the packet again
    Retransmit(Transmit),
    /// The budget ran out without the stop condition being met
    Exhausted(StopCondition),
}

/// A packet under retransmission
#[derive(Debug, Clone)]
pub struct RetryTask {
    transmit: Transmit,
    stop: StopCondition,
    deadline: Instant,
    interval: Duration,
    remaining: u8,
}

impl RetryTask {
    /// Stop condition of this task
    pub const fn stop(&self) -> StopCondition {
        self.stop
    }

    /// Next time the task needs attention
    pub const fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Retransmissions left
    pub const fn remaining(&self) -> u8 {
        self.remaining
    }
}

/// Collection of running retry tasks driven by [`RetryScheduler::poll`]
#[derive(Debug, Default)]
pub struct RetryScheduler {
    tasks: Vec<RetryTask>,
}

impl RetryScheduler {
    /// Create an empty scheduler
    pub fn new() -> Self {
        Self::default()
    }

    /// Start retrying `transmit`.
    ///
    /// Returns the first transmission, which the caller sends right away.
    /// `max_repeats` counts every transmission including the first one.
    pub fn schedule(
        &mut self,
        now: Instant,
        transmit: Transmit,
        stop: StopCondition,
        max_repeats: u8,
        interval: Duration,
    ) -> Transmit {
        self.tasks.push(RetryTask {
            transmit: transmit.clone(),
            stop,
            deadline: now + interval,
            interval,
            remaining: max_repeats.saturating_sub(1),
        });
        transmit
    }

    /// Drop tasks whose stop condition holds
    pub fn prune(&mut self, is_satisfied: impl Fn(&StopCondition) -> bool) {
        self.tasks.retain(|task| !is_satisfied(&task.stop));
    }

    /// Advance all tasks to `now`.
    ///
    /// Satisfied tasks are dropped silently. Due tasks either retransmit or,
    /// with no budget left, are removed and reported as exhausted.
    pub fn poll(
        &mut self,
        now: Instant,
        is_satisfied: impl Fn(&StopCondition) -> bool,
    ) -> Vec<RetryAction> {
        self.prune(is_satisfied);

        let mut actions = Vec::new();
        self.tasks.retain_mut(|task| {
            if now < task.deadline {
                return true;
            }
            if task.remaining == 0 {
                actions.push(RetryAction::Exhausted(task.stop));
                return false;
            }
            task.remaining -= 1;
            task.deadline += task.interval;
            actions.push(RetryAction::Retransmit(task.transmit.clone()));
            true
        });
        actions
    }

    /// Earliest deadline among running tasks
    pub fn next_deadline(&self) -> Option<Instant> {
        self.tasks.iter().map(RetryTask::deadline).min()
    }

    /// Remove the task with the given stop condition
    pub fn cancel(&mut self, stop: StopCondition) {
        self.tasks.retain(|task| task.stop != stop);
    }

    /// Remove every task
    pub fn clear(&mut self) {
        self.tasks.clear();
    }

    /// Number of running tasks
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// True when nothing is being retried
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Running tasks
    pub fn tasks(&self) -> &[RetryTask] {
        &self.tasks
    }
}

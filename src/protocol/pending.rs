//! In-flight tunneling requests indexed by sequence number.
//!
//! The table is a 256-slot ring, one slot per sequence value. A slot stays
//! occupied until its request is resolved, so reusing a sequence number
//! before the earlier request finished is detected instead of silently
//! overwriting it.

use crate::error::{KnxError, Result};
use crate::protocol::telegram::Telegram;
use std::time::Instant;

/// Number of sequence values
const SLOTS: usize = 256;

/// Who the pending request belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// Telegram sent by the application
    Local,
    /// Confirmation sent back for an inbound telegram, surfaced once acked
    Remote(Telegram),
}

/// One in-flight request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    /// Owner of the request
    pub origin: Origin,
    /// Tunneling ack received
    pub acknowledged: bool,
    /// `L_Data.con` echo received
    pub repeated: bool,
    /// Distinguishes successive users of the same slot
    pub token: u64,
    /// Give up waiting for the echo after this instant (set once acked)
    pub confirm_deadline: Option<Instant>,
}

impl PendingRequest {
    /// Request sent by the application
    pub const fn local(token: u64) -> Self {
        Self {
            origin: Origin::Local,
            acknowledged: false,
            repeated: false,
            token,
            confirm_deadline: None,
        }
    }

    /// Confirmation for an inbound telegram
    pub const fn remote(token: u64, telegram: Telegram) -> Self {
        Self {
            origin: Origin::Remote(telegram),
            acknowledged: false,
            repeated: false,
            token,
            confirm_deadline: None,
        }
    }

    /// Both ack and echo arrived
    pub const fn is_complete(&self) -> bool {
        self.acknowledged && self.repeated
    }
}

/// Fixed ring of pending requests
#[derive(Debug)]
pub struct PendingTable {
    slots: Box<[Option<PendingRequest>]>,
}

impl Default for PendingTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self {
            slots: (0..SLOTS).map(|_| None).collect(),
        }
    }

    /// Occupy the slot for `sequence`.
    ///
    /// # Errors
    ///
    /// Fails with a sequence-in-use error if the slot is still occupied.
    pub fn insert(&mut self, sequence: u8, request: PendingRequest) -> Result<()> {
        let slot = &mut self.slots[usize::from(sequence)];
        if slot.is_some() {
            return Err(KnxError::sequence_in_use(sequence));
        }
        *slot = Some(request);
        Ok(())
    }

    /// Slot content for `sequence`
    pub fn get(&self, sequence: u8) -> Option<&PendingRequest> {
        self.slots[usize::from(sequence)].as_ref()
    }

    /// Mutable slot content for `sequence`
    pub fn get_mut(&mut self, sequence: u8) -> Option<&mut PendingRequest> {
        self.slots[usize::from(sequence)].as_mut()
    }

    /// Free the slot for `sequence`
    pub fn remove(&mut self, sequence: u8) -> Option<PendingRequest> {
        self.slots[usize::from(sequence)].take()
    }

    /// Free the slot only if it still holds the entry identified by `token`
    pub fn remove_token(&mut self, sequence: u8, token: u64) -> Option<PendingRequest> {
        let slot = &mut self.slots[usize::from(sequence)];
        if slot.as_ref().is_some_and(|request| request.token == token) {
            slot.take()
        } else {
            None
        }
    }

    /// True if the slot is occupied
    pub fn is_occupied(&self, sequence: u8) -> bool {
        self.get(sequence).is_some()
    }

    /// True if the entry identified by `token` was acked or is gone
    pub fn is_acknowledged(&self, sequence: u8, token: u64) -> bool {
        match self.get(sequence) {
            Some(request) if request.token == token => request.acknowledged,
            _ => true,
        }
    }

    /// Earliest confirmation deadline
    pub fn next_confirm_deadline(&self) -> Option<Instant> {
        self.slots
            .iter()
            .flatten()
            .filter_map(|request| request.confirm_deadline)
            .min()
    }

    /// Remove and return local requests whose echo never arrived in time
    pub fn take_expired(&mut self, now: Instant) -> Vec<(u8, PendingRequest)> {
        let mut expired = Vec::new();
        for (sequence, slot) in self.slots.iter_mut().enumerate() {
            if slot
                .as_ref()
                .and_then(|request| request.confirm_deadline)
                .is_some_and(|deadline| now >= deadline)
            {
                if let Some(request) = slot.take() {
                    expired.push((sequence as u8, request));
                }
            }
        }
        expired
    }

    /// Remove every entry
    pub fn drain(&mut self) -> Vec<(u8, PendingRequest)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(sequence, slot)| slot.take().map(|request| (sequence as u8, request)))
            .collect()
    }

    /// Number of occupied slots
    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    /// True if no request is pending
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }
}

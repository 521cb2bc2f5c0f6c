// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Single-flight guard for tool execution within one turn.

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Outcome of trying to run a tool block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotClaim {
    /// This block owns the turn's tool slot
    Granted,
    /// An earlier block in the same response already used it
    AlreadyUsed,
    /// The human rejected an earlier block in the same response
    PriorRejection,
}

/// One permit per assistant response. The first complete tool block takes
/// it and keeps it until the turn ends; everything after is answered with a
/// notice instead of running.
#[derive(Debug)]
pub struct ToolSlot {
    semaphore: Arc<Semaphore>,
    held: Option<OwnedSemaphorePermit>,
    rejected: bool,
}

impl Default for ToolSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolSlot {
    pub fn new() -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(1)),
            held: None,
            rejected: false,
        }
    }

    pub fn claim(&mut self) -> SlotClaim {
        if self.rejected {
            return SlotClaim::PriorRejection;
        }
        match Arc::clone(&self.semaphore).try_acquire_owned() {
            Ok(permit) => {
                self.held = Some(permit);
                SlotClaim::Granted
            }
            Err(_) => SlotClaim::AlreadyUsed,
        }
    }

    /// The human said no; later blocks are skipped.
    pub fn mark_rejected(&mut self) {
        self.rejected = true;
    }

    pub fn is_used(&self) -> bool {
        self.held.is_some()
    }

    pub fn was_rejected(&self) -> bool {
        self.rejected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_claim_wins() {
        let mut slot = ToolSlot::new();
        assert!(!slot.is_used());
        assert_eq!(slot.claim(), SlotClaim::Granted);
        assert!(slot.is_used());
        assert_eq!(slot.claim(), SlotClaim::AlreadyUsed);
        assert_eq!(slot.claim(), SlotClaim::AlreadyUsed);
    }

    #[test]
    fn test_rejection_takes_precedence() {
        let mut slot = ToolSlot::new();
        slot.claim();
        slot.mark_rejected();
        assert!(slot.was_rejected());
        assert_eq!(slot.claim(), SlotClaim::PriorRejection);
    }

    #[test]
    fn test_fresh_slot_per_turn() {
        let mut first = ToolSlot::new();
        first.claim();
        let mut second = ToolSlot::new();
        assert_eq!(second.claim(), SlotClaim::Granted);
    }
}

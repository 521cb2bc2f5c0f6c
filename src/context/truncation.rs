// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Deleted-range arithmetic over the durable conversation history.
//!
//! The durable history is never shortened. A [`DeletedRange`] names an
//! inclusive slice of it that is left out of the prompt. Index 0 (the task)
//! and index 1 (the first reply) are always kept, and a range always ends on
//! an assistant message so the prompt keeps alternating user/assistant.

use serde::{Deserialize, Serialize};

use crate::llm::{Message, Role};

/// First history index eligible for deletion
pub const RANGE_START: usize = 2;

/// Inclusive range of history indices excluded from the prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedRange {
    pub start: usize,
    pub end: usize,
}

impl DeletedRange {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end + 1 - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }
}

/// How much more history to drop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TruncationStrategy {
    /// Drop nothing further
    None,
    /// Keep only the final exchange
    LastTwo,
    /// Drop about a quarter of what remains
    Quarter,
    /// Drop about half of what remains
    Half,
}

/// The effective prompt: `history` with `deleted_range` cut out.
pub fn get_truncated_messages(history: &[Message], deleted_range: Option<DeletedRange>) -> Vec<Message> {
    let Some(range) = deleted_range else {
        return history.to_vec();
    };
    // Never drop the task itself, whatever a stale sidecar says.
    let start = range.start.max(1).min(history.len());
    let resume = range.end.saturating_add(1).clamp(start, history.len());

    let mut messages = Vec::with_capacity(history.len() - (resume - start));
    messages.extend_from_slice(&history[..start]);
    messages.extend_from_slice(&history[resume..]);
    messages
}

/// A strictly larger range than `previous`, or `None` when `strategy` asks for
/// nothing or no whole user/assistant pair can be removed.
pub fn next_truncation_range(
    history: &[Message],
    previous: Option<DeletedRange>,
    strategy: TruncationStrategy,
) -> Option<DeletedRange> {
    let start = previous.map(|r| r.start).unwrap_or(RANGE_START);
    let rest_start = previous.map(|r| r.end + 1).unwrap_or(RANGE_START);
    // The newest message is the turn being sent; it always stays.
    let remaining = history.len().checked_sub(rest_start)?;
    let removable = remaining.saturating_sub(1) / 2 * 2;

    let wanted = match strategy {
        TruncationStrategy::None => return None,
        TruncationStrategy::LastTwo => remaining.saturating_sub(2),
        TruncationStrategy::Half => remaining / 4 * 2,
        TruncationStrategy::Quarter => remaining / 8 * 2,
    };
    let to_remove = wanted.max(2).min(removable);
    if to_remove == 0 {
        return None;
    }

    let mut end = rest_start + to_remove - 1;
    while end >= rest_start && history[end].role != Role::Assistant {
        if end == rest_start {
            return None;
        }
        end -= 1;
    }

    Some(DeletedRange::new(start, end))
}

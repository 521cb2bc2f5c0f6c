// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Context window management
//!
//! The durable conversation history is append-only. What actually gets sent
//! to the model is the *effective* prompt: the history minus the current
//! [`DeletedRange`], with a short notice on the first reply once anything has
//! been dropped. Every truncation is recorded in a small sidecar
//! (`context_history.json`) next to the task so a resumed task picks up the
//! same view without recomputing it.

pub mod truncation;
pub mod usage;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::llm::{ContentPart, Message, ModelInfo, Role};

pub use truncation::{get_truncated_messages, next_truncation_range, DeletedRange, TruncationStrategy};
pub use usage::{ApiRequestRecord, CancelReason, TokenTotals};

/// Sidecar file name inside a task directory
pub const CONTEXT_HISTORY_FILE: &str = "context_history.json";

/// Appended to the first assistant message of a truncated prompt
pub const TRUNCATION_NOTICE: &str = "[NOTE] Some previous conversation history with the user has been removed to maintain optimal context window length. The initial user task and the most recent exchanges have been retained for continuity, while intermediate conversation history has been removed. Please keep this in mind as you continue assisting the user.";

/// What prompted a truncation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TruncationReason {
    /// The previous request came close to the window limit
    Proactive,
    /// The provider rejected the prompt as too long
    Overflow,
}

/// One recorded truncation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TruncationRecord {
    pub timestamp: DateTime<Utc>,
    pub range: DeletedRange,
    pub strategy: TruncationStrategy,
    pub reason: TruncationReason,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ContextHistory {
    #[serde(default)]
    truncations: Vec<TruncationRecord>,
}

/// Tokens that may be used before the window is considered full
pub fn max_allowed_size(context_window: u64) -> u64 {
    match context_window {
        64_000 => context_window - 27_000,
        128_000 => context_window - 30_000,
        200_000 => context_window - 40_000,
        _ => context_window
            .saturating_sub(40_000)
            .max((context_window as f64 * 0.8) as u64),
    }
}

/// Owns the truncation state of one task
#[derive(Debug, Clone, Default)]
pub struct ContextManager {
    /// Sidecar location; `None` keeps everything in memory
    path: Option<PathBuf>,
    history: ContextHistory,
}

impl ContextManager {
    /// In-memory manager with no prior truncations
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the sidecar from `task_dir`, if it exists.
    ///
    /// `fallback_range` (from task metadata) seeds the state when the sidecar
    /// is missing, so older task directories still resume with their range.
    pub fn load(task_dir: &Path, fallback_range: Option<DeletedRange>) -> Result<Self> {
        let path = task_dir.join(CONTEXT_HISTORY_FILE);
        let history = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str(&content)?
        } else {
            ContextHistory {
                truncations: fallback_range
                    .map(|range| {
                        vec![TruncationRecord {
                            timestamp: Utc::now(),
                            range,
                            strategy: TruncationStrategy::Half,
                            reason: TruncationReason::Overflow,
                        }]
                    })
                    .unwrap_or_default(),
            }
        };

        tracing::debug!(
            target: "tern.context",
            path = %path.display(),
            truncations = history.truncations.len(),
            "loaded context history"
        );

        Ok(Self {
            path: Some(path),
            history,
        })
    }

    /// Persist the sidecar (no-op for in-memory managers)
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.history)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Range currently excluded from the prompt
    pub fn deleted_range(&self) -> Option<DeletedRange> {
        self.history.truncations.last().map(|t| t.range)
    }

    pub fn truncations(&self) -> &[TruncationRecord] {
        &self.history.truncations
    }

    /// The prompt to send for `history`.
    pub fn effective_messages(&self, history: &[Message]) -> Vec<Message> {
        let range = self.deleted_range();
        let mut messages = get_truncated_messages(history, range);
        if range.is_some() {
            if let Some(first_reply) = messages.get_mut(1) {
                if first_reply.role == Role::Assistant {
                    first_reply.content.push(ContentPart::text(TRUNCATION_NOTICE));
                }
            }
        }
        messages
    }

    /// Extend the deleted range with `strategy`. Returns the new range, or
    /// `None` if nothing more can be dropped.
    pub fn truncate(
        &mut self,
        history: &[Message],
        strategy: TruncationStrategy,
        reason: TruncationReason,
    ) -> Result<Option<DeletedRange>> {
        let Some(range) = next_truncation_range(history, self.deleted_range(), strategy) else {
            tracing::warn!(
                target: "tern.context",
                history_len = history.len(),
                ?strategy,
                "no further history can be truncated"
            );
            return Ok(None);
        };

        tracing::info!(
            target: "tern.context",
            start = range.start,
            end = range.end,
            ?strategy,
            ?reason,
            "truncated conversation history"
        );

        self.history.truncations.push(TruncationRecord {
            timestamp: Utc::now(),
            range,
            strategy,
            reason,
        });
        self.save()?;
        Ok(Some(range))
    }

    /// Rough token count of the prompt for `history`.
    pub fn estimate_tokens(&self, history: &[Message], chars_per_token: u32) -> u64 {
        self.effective_messages(history)
            .iter()
            .map(|message| u64::from(message.estimate_tokens(chars_per_token)))
            .sum()
    }

    /// Truncate ahead of the next request if the previous one came too close
    /// to the window. `previous_tokens` is that request's total token count.
    pub fn truncate_if_needed(
        &mut self,
        history: &[Message],
        previous_tokens: u64,
        model: &ModelInfo,
    ) -> Result<Option<DeletedRange>> {
        let allowed = max_allowed_size(model.context_window);
        if previous_tokens < allowed {
            return Ok(None);
        }
        let strategy = if previous_tokens / 2 > allowed {
            TruncationStrategy::LastTwo
        } else {
            TruncationStrategy::Half
        };
        self.truncate(history, strategy, TruncationReason::Proactive)
    }

    /// Forget truncations that reach past `history_len`, used when the
    /// conversation is rewound to an earlier message.
    pub fn rewind(&mut self, history_len: usize) -> Result<()> {
        let before = self.history.truncations.len();
        self.history
            .truncations
            .retain(|t| t.range.end + 1 < history_len);
        if self.history.truncations.len() != before {
            self.save()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn history(pairs: usize) -> Vec<Message> {
        let mut messages = vec![Message::user("task")];
        for i in 0..pairs {
            messages.push(Message::assistant(format!("reply {}", i)));
            messages.push(Message::user(format!("result {}", i)));
        }
        messages
    }

    #[test]
    fn test_max_allowed_size() {
        assert_eq!(max_allowed_size(64_000), 37_000);
        assert_eq!(max_allowed_size(128_000), 98_000);
        assert_eq!(max_allowed_size(200_000), 160_000);
        assert_eq!(max_allowed_size(1_000_000), 960_000);
        assert_eq!(max_allowed_size(32_000), 25_600);
    }

    #[test]
    fn test_effective_messages_adds_notice_once_truncated() {
        let h = history(8);
        let mut manager = ContextManager::new();
        assert_eq!(manager.effective_messages(&h), h);

        manager
            .truncate(&h, TruncationStrategy::Half, TruncationReason::Overflow)
            .unwrap()
            .unwrap();
        let effective = manager.effective_messages(&h);
        assert!(effective.len() < h.len());
        assert!(effective[1].text().contains("[NOTE]"));
        // Durable history untouched
        assert!(!h[1].text().contains("[NOTE]"));
    }

    #[test]
    fn test_truncate_if_needed_thresholds() {
        let h = history(10);
        let model = ModelInfo::new("m", 128_000);
        let mut manager = ContextManager::new();

        assert!(manager.truncate_if_needed(&h, 50_000, &model).unwrap().is_none());

        let range = manager.truncate_if_needed(&h, 100_000, &model).unwrap().unwrap();
        assert_eq!(manager.truncations()[0].strategy, TruncationStrategy::Half);
        assert_eq!(manager.truncations()[0].reason, TruncationReason::Proactive);
        assert_eq!(manager.deleted_range(), Some(range));
    }

    #[test]
    fn test_truncate_if_needed_far_over_uses_last_two() {
        let h = history(10);
        let model = ModelInfo::new("m", 128_000);
        let mut manager = ContextManager::new();
        manager.truncate_if_needed(&h, 250_000, &model).unwrap().unwrap();
        assert_eq!(manager.truncations()[0].strategy, TruncationStrategy::LastTwo);
    }

    #[test]
    fn test_estimate_tokens_follows_effective_prompt() {
        let mut h = vec![Message::user("x".repeat(400))];
        for _ in 0..4 {
            h.push(Message::assistant("y".repeat(40)));
            h.push(Message::user("z".repeat(800)));
        }
        let mut manager = ContextManager::new();
        assert_eq!(manager.estimate_tokens(&h, 4), 100 + 4 * (10 + 200));

        manager
            .truncate(&h, TruncationStrategy::Half, TruncationReason::Proactive)
            .unwrap()
            .unwrap();
        assert!(manager.estimate_tokens(&h, 4) < 940);
    }

    #[test]
    fn test_sidecar_roundtrip() {
        let dir = TempDir::new().unwrap();
        let h = history(10);

        let mut manager = ContextManager::load(dir.path(), None).unwrap();
        assert!(manager.deleted_range().is_none());
        let range = manager
            .truncate(&h, TruncationStrategy::Quarter, TruncationReason::Overflow)
            .unwrap();

        let reloaded = ContextManager::load(dir.path(), None).unwrap();
        assert_eq!(reloaded.deleted_range(), range);
        assert_eq!(reloaded.truncations().len(), 1);
    }

    #[test]
    fn test_load_uses_fallback_range() {
        let dir = TempDir::new().unwrap();
        let manager = ContextManager::load(dir.path(), Some(DeletedRange::new(2, 5))).unwrap();
        assert_eq!(manager.deleted_range(), Some(DeletedRange::new(2, 5)));
    }

    #[test]
    fn test_rewind_drops_stale_truncations() {
        let h = history(10);
        let mut manager = ContextManager::new();
        let range = manager
            .truncate(&h, TruncationStrategy::Half, TruncationReason::Overflow)
            .unwrap()
            .unwrap();
        manager.rewind(range.end + 5).unwrap();
        assert!(manager.deleted_range().is_some());
        manager.rewind(range.end).unwrap();
        assert!(manager.deleted_range().is_none());
    }
}

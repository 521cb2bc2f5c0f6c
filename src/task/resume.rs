// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Resuming a saved task, and rewinding one to an earlier message

use chrono::{Duration, Utc};
use std::path::Path;

use super::message::{AskKind, AskResponse, DisplayMessage, MessageKind, MessageLog, SayKind};
use super::storage::TaskStorage;
use super::{image_parts, Task};
use crate::checkpoint::{CheckpointTracker, RestoreMode};
use crate::config::CheckpointConfig;
use crate::context::{ApiRequestRecord, ContextManager, TokenTotals};
use crate::error::{Result, TernError};
use crate::llm::{ContentPart, Role};
use crate::tools::responses;

/// Human-readable age, e.g. `5 minutes ago`
pub fn format_elapsed(elapsed: Duration) -> String {
    let ago = |n: i64, unit: &str| format!("{} {}{} ago", n, unit, if n == 1 { "" } else { "s" });
    let minutes = elapsed.num_minutes();
    if minutes < 1 {
        "just now".to_string()
    } else if minutes < 60 {
        ago(minutes, "minute")
    } else if elapsed.num_hours() < 24 {
        ago(elapsed.num_hours(), "hour")
    } else {
        ago(elapsed.num_days(), "day")
    }
}

fn is_unfinished_request(message: &DisplayMessage) -> bool {
    if message.kind != MessageKind::Say(SayKind::ApiReqStarted) {
        return false;
    }
    message
        .text
        .as_deref()
        .and_then(|text| serde_json::from_str::<ApiRequestRecord>(text).ok())
        .is_none_or(|record| record.cost.is_none() && record.cancel_reason.is_none())
}

impl Task {
    /// Clean up after an interrupted run and ask whether to continue.
    ///
    /// Returns the content of the next user turn, or `None` if the operator
    /// declined.
    pub(super) async fn resume(&mut self) -> Result<Option<Vec<ContentPart>>> {
        let ago = format_elapsed(Utc::now().signed_duration_since(self.metadata.updated_at));

        let dropped = self.log.drop_partials();
        loop {
            let Some(last) = self.log.last() else {
                break;
            };
            let stale_ask = matches!(
                last.kind,
                MessageKind::Ask(AskKind::ResumeTask) | MessageKind::Ask(AskKind::ResumeCompletedTask)
            );
            if stale_ask || is_unfinished_request(last) {
                self.log.remove_last();
            } else {
                break;
            }
        }
        tracing::debug!(target: "tern.task", task_id = %self.id, dropped, "resuming task");

        let completed = self.log.last().is_some_and(|m| {
            matches!(
                m.kind,
                MessageKind::Say(SayKind::CompletionResult) | MessageKind::Ask(AskKind::CompletionResult)
            )
        });
        self.save_messages()?;

        let kind = if completed {
            AskKind::ResumeCompletedTask
        } else {
            AskKind::ResumeTask
        };
        let (feedback, images) = match self.ask(kind, None).await? {
            AskResponse::No => return Ok(None),
            AskResponse::Yes => (None, Vec::new()),
            AskResponse::Message { text, images } => {
                self.post(MessageKind::Say(SayKind::UserFeedback), Some(text.clone()), images.clone(), None)?;
                (Some(text), images)
            }
        };

        let mut content = Vec::new();
        if self.history.is_empty() {
            // Interrupted before the first request went out.
            if let Some(task) = self
                .log
                .messages()
                .iter()
                .find(|m| m.kind == MessageKind::Say(SayKind::Task))
            {
                content.push(ContentPart::text(format!(
                    "<task>\n{}\n</task>",
                    task.text.as_deref().unwrap_or_default()
                )));
                content.extend(image_parts(&task.images));
            }
        } else if self.history.last().is_some_and(|m| m.role == Role::User) {
            // The pending user turn is sent again together with the notice.
            if let Some(pending) = self.history.pop() {
                content = pending.content;
            }
        }

        let cwd = self.ctx.workspace.root().display().to_string();
        content.push(ContentPart::text(responses::task_resumption(
            &ago,
            &cwd,
            completed,
            feedback.as_deref(),
        )));
        content.extend(image_parts(&images));

        self.context.rewind(self.history.len())?;
        self.save_history()?;
        Ok(Some(content))
    }
}

/// What a restore changed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RestoreReport {
    /// Snapshot the workspace was reset to
    pub workspace_hash: Option<String>,
    pub history_removed: usize,
    pub messages_removed: usize,
    /// Usage of the provider requests that were rewound past
    pub deleted_totals: Option<TokenTotals>,
}

/// Rewind a saved (not running) task to the message at `ts`.
pub async fn restore_checkpoint(
    tasks_dir: &Path,
    checkpoints_dir: &Path,
    config: &CheckpointConfig,
    task_id: &str,
    ts: i64,
    mode: RestoreMode,
) -> Result<RestoreReport> {
    let storage = TaskStorage::existing(tasks_dir, task_id)?;
    let mut metadata = storage.load_metadata()?;
    let mut log = MessageLog::from_messages(storage.load_messages()?);
    let target = log
        .get(ts)
        .cloned()
        .ok_or_else(|| TernError::InvalidInput(format!("Task {} has no message at {}", task_id, ts)))?;

    let mut report = RestoreReport::default();

    if mode.restores_workspace() {
        let hash = target
            .checkpoint_hash
            .clone()
            .ok_or_else(|| TernError::Checkpoint(format!("Message {} has no checkpoint", ts)))?;
        let tracker = CheckpointTracker::create(task_id, &metadata.workspace, checkpoints_dir, config).await;
        tracker.reset_head(&hash).await?;
        report.workspace_hash = Some(hash);
    }

    if mode.restores_task() {
        let mut history = storage.load_history()?;

        let keep = target.conversation_history_index.map_or(0, |index| index + 1);
        report.history_removed = history.len().saturating_sub(keep);
        history.truncate(keep);

        let records: Vec<ApiRequestRecord> = log
            .messages()
            .iter()
            .filter(|m| m.ts > ts && m.kind == MessageKind::Say(SayKind::ApiReqStarted))
            .filter_map(|m| m.text.as_deref())
            .filter_map(|text| serde_json::from_str(text).ok())
            .collect();
        report.messages_removed = log.truncate_from(ts + 1);

        if !records.is_empty() {
            let totals = TokenTotals::from_records(&records);
            let notice = log.upsert(
                MessageKind::Say(SayKind::DeletedApiReqs),
                Some(serde_json::to_string(&totals)?),
                Vec::new(),
                None,
            );
            if let Some(message) = log.get_mut(notice) {
                message.conversation_history_index = history.len().checked_sub(1);
            }
            report.deleted_totals = Some(totals);
        }

        let mut context = ContextManager::load(storage.dir(), metadata.deleted_range)?;
        context.rewind(history.len())?;

        metadata.deleted_range = context.deleted_range();
        if target.checkpoint_hash.is_some() {
            metadata.last_checkpoint_hash = target.checkpoint_hash.clone();
        }
        metadata.updated_at = Utc::now();

        storage.save_history(&history)?;
        storage.save_messages(log.messages())?;
        storage.save_metadata(&metadata)?;
    }

    tracing::info!(
        target: "tern.task",
        task_id = %task_id,
        ts,
        ?mode,
        history_removed = report.history_removed,
        messages_removed = report.messages_removed,
        "task restored"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(Duration::seconds(20)), "just now");
        assert_eq!(format_elapsed(Duration::minutes(1)), "1 minute ago");
        assert_eq!(format_elapsed(Duration::minutes(45)), "45 minutes ago");
        assert_eq!(format_elapsed(Duration::hours(3)), "3 hours ago");
        assert_eq!(format_elapsed(Duration::days(2)), "2 days ago");
    }

    #[test]
    fn test_unfinished_request_detection() {
        let mut message = DisplayMessage {
            ts: 1,
            kind: MessageKind::Say(SayKind::ApiReqStarted),
            text: Some(serde_json::to_string(&ApiRequestRecord::new("x")).unwrap()),
            images: vec![],
            partial: None,
            checkpoint_hash: None,
            conversation_history_index: None,
        };
        assert!(is_unfinished_request(&message));

        let mut record = ApiRequestRecord::new("x");
        record.cost = Some(0.01);
        message.text = Some(serde_json::to_string(&record).unwrap());
        assert!(!is_unfinished_request(&message));

        message.kind = MessageKind::Say(SayKind::Text);
        assert!(!is_unfinished_request(&message));
    }
}

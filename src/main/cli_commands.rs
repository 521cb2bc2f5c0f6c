// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use tern::checkpoint::{ChangedFile, CheckpointTracker, RestoreMode};
use tern::config::Settings;
use tern::error::Result;
use tern::task::{list_tasks, restore_checkpoint, MessageKind, TaskStorage};

const PREVIEW_CHARS: usize = 100;

pub(super) fn run_tasks(limit: usize) -> Result<()> {
    let tasks = list_tasks(&Settings::tasks_dir())?;
    if tasks.is_empty() {
        println!("\nNo saved tasks.\n");
        return Ok(());
    }

    println!("\nRecent tasks:\n");
    for task in tasks.iter().take(limit) {
        let date = task.updated_at.format("%Y-%m-%d %H:%M");
        let dir = task
            .workspace
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("?");
        println!(
            "  {} | {} | {} | ${:.4} | {}",
            task.task_id, date, dir, task.totals.total_cost, task.summary
        );
    }
    println!();
    Ok(())
}

pub(super) fn run_show(task_id: &str) -> Result<()> {
    let storage = TaskStorage::existing(&Settings::tasks_dir(), task_id)?;
    let metadata = storage.load_metadata()?;
    let messages = storage.load_messages()?;

    println!("\nTask {} ({})", metadata.task_id, metadata.workspace.display());
    println!(
        "Tokens: {} in / {} out, cost ${:.4}",
        metadata.totals.tokens_in, metadata.totals.tokens_out, metadata.totals.total_cost
    );
    if let Some(range) = metadata.deleted_range {
        println!("History truncated: messages {}..={}", range.start, range.end);
    }
    println!();

    for message in &messages {
        let marker = if message.checkpoint_hash.is_some() { "*" } else { " " };
        let text = message.text.as_deref().unwrap_or_default();
        println!("{} {} {:<30} {}", marker, message.ts, kind_label(message.kind), preview(text));
    }
    println!();
    Ok(())
}

pub(super) async fn run_diff(settings: &Settings, task_id: &str, from: &str, to: Option<&str>) -> Result<()> {
    let storage = TaskStorage::existing(&Settings::tasks_dir(), task_id)?;
    let metadata = storage.load_metadata()?;
    let tracker = CheckpointTracker::create(
        task_id,
        &metadata.workspace,
        &Settings::checkpoints_dir(),
        &settings.checkpoints,
    )
    .await;
    if let Some(reason) = tracker.disabled_reason() {
        eprintln!("Checkpoints are unavailable: {}", reason);
        return Ok(());
    }

    let files = tracker.get_diff_set(from, to).await?;
    if files.is_empty() {
        println!("\nNo changes.\n");
        return Ok(());
    }
    println!();
    for file in &files {
        println!("  {} {}", change_marker(file), file.relative_path.display());
    }
    println!("\n{} file(s) changed.\n", files.len());
    Ok(())
}

pub(super) async fn run_restore(settings: &Settings, task_id: &str, ts: i64, mode: RestoreMode) -> Result<()> {
    let report = restore_checkpoint(
        &Settings::tasks_dir(),
        &Settings::checkpoints_dir(),
        &settings.checkpoints,
        task_id,
        ts,
        mode,
    )
    .await?;

    if let Some(hash) = &report.workspace_hash {
        println!("Workspace reset to {}.", hash);
    }
    if mode.restores_task() {
        println!(
            "Conversation rewound: {} history message(s) and {} display message(s) removed.",
            report.history_removed, report.messages_removed
        );
    }
    if let Some(totals) = report.deleted_totals {
        println!("Rewound requests had cost ${:.4}.", totals.total_cost);
    }
    Ok(())
}

fn kind_label(kind: MessageKind) -> String {
    let (prefix, value) = match kind {
        MessageKind::Ask(ask) => ("ask", serde_json::to_value(ask)),
        MessageKind::Say(say) => ("say", serde_json::to_value(say)),
    };
    let name = value
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();
    format!("{}:{}", prefix, name)
}

fn preview(text: &str) -> String {
    let first_line = text.lines().next().unwrap_or_default();
    if first_line.chars().count() > PREVIEW_CHARS {
        let cut: String = first_line.chars().take(PREVIEW_CHARS).collect();
        format!("{}...", cut)
    } else {
        first_line.to_string()
    }
}

fn change_marker(file: &ChangedFile) -> char {
    match (file.before.is_empty(), file.after.is_empty()) {
        (true, false) => 'A',
        (false, true) => 'D',
        _ => 'M',
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tern::task::{AskKind, SayKind};

    #[test]
    fn test_kind_label() {
        assert_eq!(kind_label(MessageKind::Say(SayKind::ApiReqStarted)), "say:api_req_started");
        assert_eq!(kind_label(MessageKind::Ask(AskKind::Followup)), "ask:followup");
    }

    #[test]
    fn test_preview_first_line_only() {
        assert_eq!(preview("one\ntwo"), "one");
        assert_eq!(preview(&"x".repeat(120)).len(), PREVIEW_CHARS + 3);
    }
}

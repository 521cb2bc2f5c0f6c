// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Durable per-task state
//!
//! Each task has a directory under `$TERN_HOME/tasks/<task-id>/` with the
//! full conversation history, the display log, and a small metadata record.
//! The context manager keeps its own sidecar in the same directory.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::message::DisplayMessage;
use crate::context::{DeletedRange, TokenTotals};
use crate::error::{Result, TernError};
use crate::llm::Message;

pub const API_HISTORY_FILE: &str = "api_conversation_history.json";
pub const UI_MESSAGES_FILE: &str = "ui_messages.json";
pub const METADATA_FILE: &str = "task_metadata.json";

/// Small record of task state that is not derivable from the two logs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMetadata {
    pub task_id: String,
    /// The original request, shortened for listings
    pub summary: String,
    pub workspace: PathBuf,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_range: Option<DeletedRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checkpoint_hash: Option<String>,
    #[serde(default)]
    pub totals: TokenTotals,
}

impl TaskMetadata {
    pub fn new(task_id: impl Into<String>, summary: &str, workspace: &Path) -> Self {
        let now = Utc::now();
        Self {
            task_id: task_id.into(),
            summary: shorten(summary, 100),
            workspace: workspace.to_path_buf(),
            created_at: now,
            updated_at: now,
            deleted_range: None,
            last_checkpoint_hash: None,
            totals: TokenTotals::default(),
        }
    }
}

fn shorten(text: &str, max_chars: usize) -> String {
    let first_line = text.lines().next().unwrap_or_default().trim();
    if first_line.chars().count() > max_chars {
        let cut: String = first_line.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", cut)
    } else {
        first_line.to_string()
    }
}

/// Directory of one task
#[derive(Debug, Clone)]
pub struct TaskStorage {
    dir: PathBuf,
}

impl TaskStorage {
    /// Storage for `task_id` under `tasks_dir`, creating the directory.
    pub fn open(tasks_dir: &Path, task_id: &str) -> Result<Self> {
        let dir = tasks_dir.join(task_id);
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Storage for an existing task
    pub fn existing(tasks_dir: &Path, task_id: &str) -> Result<Self> {
        let dir = tasks_dir.join(task_id);
        if !dir.join(METADATA_FILE).exists() {
            return Err(TernError::Storage(format!("No saved task '{}'", task_id)));
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn load_history(&self) -> Result<Vec<Message>> {
        self.read_or_default(API_HISTORY_FILE)
    }

    pub fn save_history(&self, history: &[Message]) -> Result<()> {
        self.write(API_HISTORY_FILE, &history)
    }

    pub fn load_messages(&self) -> Result<Vec<DisplayMessage>> {
        self.read_or_default(UI_MESSAGES_FILE)
    }

    pub fn save_messages(&self, messages: &[DisplayMessage]) -> Result<()> {
        self.write(UI_MESSAGES_FILE, &messages)
    }

    pub fn load_metadata(&self) -> Result<TaskMetadata> {
        let path = self.dir.join(METADATA_FILE);
        let content = std::fs::read_to_string(&path)
            .map_err(|e| TernError::Storage(format!("Failed to read {}: {}", path.display(), e)))?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save_metadata(&self, metadata: &TaskMetadata) -> Result<()> {
        self.write(METADATA_FILE, metadata)
    }

    fn read_or_default<T: DeserializeOwned + Default>(&self, name: &str) -> Result<T> {
        let path = self.dir.join(name);
        if !path.exists() {
            return Ok(T::default());
        }
        let content = std::fs::read_to_string(&path)?;
        serde_json::from_str(&content)
            .map_err(|e| TernError::Storage(format!("Corrupt {}: {}", path.display(), e)))
    }

    /// Write through a temporary file so a crash never leaves half a log.
    fn write<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<()> {
        let path = self.dir.join(name);
        let tmp = self.dir.join(format!("{}.tmp", name));
        let content = serde_json::to_string_pretty(value)?;
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// Metadata of every saved task, newest first.
pub fn list_tasks(tasks_dir: &Path) -> Result<Vec<TaskMetadata>> {
    if !tasks_dir.exists() {
        return Ok(Vec::new());
    }
    let mut tasks = Vec::new();
    for entry in std::fs::read_dir(tasks_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        match TaskStorage::existing(tasks_dir, &name).and_then(|s| s.load_metadata()) {
            Ok(metadata) => tasks.push(metadata),
            Err(e) => {
                tracing::warn!(target: "tern.task", task = %name, error = %e, "skipping unreadable task");
            }
        }
    }
    tasks.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    Ok(tasks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::message::{MessageKind, SayKind};
    use tempfile::TempDir;

    #[test]
    fn test_round_trip_all_artifacts() {
        let root = TempDir::new().unwrap();
        let storage = TaskStorage::open(root.path(), "1700000000000").unwrap();

        let history = vec![Message::user("<task>\nfix it\n</task>"), Message::assistant("ok")];
        storage.save_history(&history).unwrap();
        assert_eq!(storage.load_history().unwrap(), history);

        let messages = vec![DisplayMessage {
            ts: 5,
            kind: MessageKind::Say(SayKind::Task),
            text: Some("fix it".to_string()),
            images: vec![],
            partial: None,
            checkpoint_hash: None,
            conversation_history_index: None,
        }];
        storage.save_messages(&messages).unwrap();
        assert_eq!(storage.load_messages().unwrap(), messages);

        let mut metadata = TaskMetadata::new("1700000000000", "fix it", root.path());
        metadata.deleted_range = Some(DeletedRange::new(2, 3));
        storage.save_metadata(&metadata).unwrap();
        assert_eq!(storage.load_metadata().unwrap(), metadata);
        assert!(!storage.dir().join("task_metadata.json.tmp").exists());
    }

    #[test]
    fn test_missing_logs_load_empty() {
        let root = TempDir::new().unwrap();
        let storage = TaskStorage::open(root.path(), "t").unwrap();
        assert!(storage.load_history().unwrap().is_empty());
        assert!(storage.load_messages().unwrap().is_empty());
        assert!(storage.load_metadata().is_err());
    }

    #[test]
    fn test_list_tasks_newest_first() {
        let root = TempDir::new().unwrap();
        for (id, offset) in [("a", 0), ("b", 10)] {
            let storage = TaskStorage::open(root.path(), id).unwrap();
            let mut metadata = TaskMetadata::new(id, id, root.path());
            metadata.updated_at = metadata.updated_at + chrono::Duration::seconds(offset);
            storage.save_metadata(&metadata).unwrap();
        }
        std::fs::create_dir(root.path().join("junk")).unwrap();

        let tasks = list_tasks(root.path()).unwrap();
        let ids: Vec<_> = tasks.iter().map(|t| t.task_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn test_summary_is_shortened() {
        let long = "x".repeat(150);
        let metadata = TaskMetadata::new("t", &format!("{}\nsecond line", long), Path::new("/w"));
        assert_eq!(metadata.summary.chars().count(), 100);
        assert!(metadata.summary.ends_with("..."));
    }
}

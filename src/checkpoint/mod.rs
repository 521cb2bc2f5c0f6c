// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Workspace checkpoints
//!
//! A [`CheckpointTracker`] snapshots the workspace into a hidden shadow git
//! repository after each file-mutating tool and around completion attempts.
//! Checkpointing never blocks a task: if initialization fails or times out
//! the tracker records why and every later operation becomes a no-op.

mod shadow;

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::CheckpointConfig;
use crate::error::TernError;
use shadow::ShadowRepo;

/// Checkpoint failures
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoints are disabled: {0}")]
    Disabled(String),

    #[error("refusing to checkpoint protected directory {}", .0.display())]
    ProtectedDirectory(PathBuf),

    #[error("checkpoint initialization timed out after {0}s")]
    InitTimeout(u64),

    #[error("invalid checkpoint hash: {0}")]
    InvalidHash(String),

    #[error("git error: {}", .0.message())]
    Git(#[from] git2::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("checkpoint worker failed: {0}")]
    Worker(String),
}

impl From<CheckpointError> for TernError {
    fn from(err: CheckpointError) -> Self {
        TernError::Checkpoint(err.to_string())
    }
}

/// One file that differs between two snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedFile {
    pub relative_path: PathBuf,
    pub absolute_path: PathBuf,
    pub before: String,
    pub after: String,
}

/// What a "restore to here" touches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestoreMode {
    /// Rewind the conversation only
    Task,
    /// Reset workspace files only
    Workspace,
    /// Both
    TaskAndWorkspace,
}

impl RestoreMode {
    pub fn restores_workspace(&self) -> bool {
        matches!(self, RestoreMode::Workspace | RestoreMode::TaskAndWorkspace)
    }

    pub fn restores_task(&self) -> bool {
        matches!(self, RestoreMode::Task | RestoreMode::TaskAndWorkspace)
    }
}

#[derive(Debug, Clone)]
enum TrackerState {
    Ready(Arc<ShadowRepo>),
    Disabled(String),
}

/// Task-scoped handle to the shadow repository
#[derive(Debug, Clone)]
pub struct CheckpointTracker {
    task_id: String,
    state: TrackerState,
}

async fn blocking<T, F>(f: F) -> Result<T, CheckpointError>
where
    F: FnOnce() -> Result<T, CheckpointError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| CheckpointError::Worker(e.to_string()))?
}

async fn with_init_timeout<T>(
    secs: u64,
    init: impl Future<Output = Result<T, CheckpointError>>,
) -> Result<T, CheckpointError> {
    match tokio::time::timeout(Duration::from_secs(secs), init).await {
        Ok(result) => result,
        Err(_) => Err(CheckpointError::InitTimeout(secs)),
    }
}

impl CheckpointTracker {
    /// Initialize (idempotently) the shadow repo for `workspace`.
    ///
    /// Never fails: a failure leaves the tracker disabled, see [`Self::disabled_reason`].
    pub async fn create(
        task_id: impl Into<String>,
        workspace: &Path,
        checkpoints_root: &Path,
        config: &CheckpointConfig,
    ) -> Self {
        let task_id = task_id.into();
        if !config.enabled {
            return Self::disabled(task_id, "disabled in settings");
        }

        let workspace = workspace.to_path_buf();
        let root = checkpoints_root.to_path_buf();
        let init = blocking(move || ShadowRepo::open_or_init(&root, &workspace));
        let result = with_init_timeout(config.init_timeout_secs, init).await;
        Self::from_init(task_id, result)
    }

    fn from_init(task_id: String, result: Result<ShadowRepo, CheckpointError>) -> Self {
        match result {
            Ok(repo) => {
                tracing::debug!(
                    target: "tern.checkpoint",
                    task_id = %task_id,
                    workspace = %repo.workspace().display(),
                    "checkpoint tracker ready"
                );
                Self {
                    task_id,
                    state: TrackerState::Ready(Arc::new(repo)),
                }
            }
            Err(e) => {
                tracing::warn!(
                    target: "tern.checkpoint",
                    task_id = %task_id,
                    error = %e,
                    "checkpoints disabled for this task"
                );
                Self::disabled(task_id, e.to_string())
            }
        }
    }

    /// A tracker that does nothing
    pub fn disabled(task_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            state: TrackerState::Disabled(reason.into()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self.state, TrackerState::Ready(_))
    }

    /// Why checkpointing is off, if it is
    pub fn disabled_reason(&self) -> Option<&str> {
        match &self.state {
            TrackerState::Ready(_) => None,
            TrackerState::Disabled(reason) => Some(reason),
        }
    }

    fn repo(&self) -> Result<Arc<ShadowRepo>, CheckpointError> {
        match &self.state {
            TrackerState::Ready(repo) => Ok(Arc::clone(repo)),
            TrackerState::Disabled(reason) => Err(CheckpointError::Disabled(reason.clone())),
        }
    }

    /// Snapshot the workspace. Returns the commit hash, or `None` when
    /// checkpoints are off or the snapshot failed.
    pub async fn commit(&self) -> Option<String> {
        let repo = self.repo().ok()?;
        let task_id = self.task_id.clone();
        match blocking(move || repo.commit(&task_id)).await {
            Ok(hash) => {
                tracing::debug!(target: "tern.checkpoint", hash = %hash, "checkpoint committed");
                Some(hash)
            }
            Err(e) => {
                tracing::warn!(target: "tern.checkpoint", error = %e, "checkpoint commit failed");
                None
            }
        }
    }

    /// Restore workspace files to the snapshot `hash`.
    pub async fn reset_head(&self, hash: &str) -> Result<(), CheckpointError> {
        let repo = self.repo()?;
        let hash = hash.to_string();
        let task_id = self.task_id.clone();
        blocking(move || repo.reset_head(&task_id, &hash)).await?;
        tracing::info!(target: "tern.checkpoint", task_id = %self.task_id, "workspace restored");
        Ok(())
    }

    /// Files changed between `from` and `to` (or the live workspace).
    pub async fn get_diff_set(&self, from: &str, to: Option<&str>) -> Result<Vec<ChangedFile>, CheckpointError> {
        let Ok(repo) = self.repo() else {
            return Ok(Vec::new());
        };
        let from = from.to_string();
        let to = to.map(str::to_string);
        blocking(move || repo.diff_set(&from, to.as_deref())).await
    }

    /// Number of files changed between `from` and `to` (or the live workspace).
    pub async fn get_diff_count(&self, from: &str, to: Option<&str>) -> Result<usize, CheckpointError> {
        let Ok(repo) = self.repo() else {
            return Ok(0);
        };
        let from = from.to_string();
        let to = to.map(str::to_string);
        blocking(move || repo.diff_count(&from, to.as_deref())).await
    }
}

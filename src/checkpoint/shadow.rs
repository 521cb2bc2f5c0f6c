// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Blocking git2 operations on the shadow repository.
//!
//! The shadow repo keeps its git directory outside the workspace
//! (`<checkpoints>/<hash>/.git`) with `core.worktree` pointed at the
//! workspace, so the user's own repository is never touched. Each task
//! chains its snapshots on its own ref, `refs/tern/<task id>`.

use git2::build::CheckoutBuilder;
use git2::{DiffOptions, IndexAddOption, Oid, Repository, ResetType, Signature, Tree};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use super::{ChangedFile, CheckpointError};

/// Paths never snapshotted
const EXCLUDE_PATTERNS: &[&str] = &[
    ".git/",
    "node_modules/",
    "target/",
    "dist/",
    "build/",
    "out/",
    ".venv/",
    "venv/",
    "__pycache__/",
    ".next/",
    ".cache/",
    "coverage/",
    "*.log",
    "*.tmp",
    ".DS_Store",
];

#[derive(Debug, Clone)]
pub(super) struct ShadowRepo {
    git_dir: PathBuf,
    workspace: PathBuf,
    workspace_hash: String,
}

fn task_ref(task_id: &str) -> String {
    format!("refs/tern/{}", task_id)
}

/// Short content hash identifying a workspace path
pub(super) fn workspace_hash(workspace: &Path) -> String {
    let digest = Sha256::digest(workspace.to_string_lossy().as_bytes());
    format!("{:x}", digest)[..16].to_string()
}

/// Refuse directories where snapshotting everything would be harmful.
pub(super) fn validate_workspace(workspace: &Path) -> Result<(), CheckpointError> {
    if workspace.parent().is_none() {
        return Err(CheckpointError::ProtectedDirectory(workspace.to_path_buf()));
    }
    if let Some(home) = dirs::home_dir() {
        let protected = [
            home.clone(),
            home.join("Desktop"),
            home.join("Documents"),
            home.join("Downloads"),
        ];
        if protected.iter().any(|p| p == workspace) {
            return Err(CheckpointError::ProtectedDirectory(workspace.to_path_buf()));
        }
    }
    Ok(())
}

impl ShadowRepo {
    /// Open the shadow repo for `workspace`, creating it on first use.
    pub(super) fn open_or_init(checkpoints_root: &Path, workspace: &Path) -> Result<Self, CheckpointError> {
        let workspace = workspace.canonicalize()?;
        validate_workspace(&workspace)?;

        let workspace_hash = workspace_hash(&workspace);
        let git_dir = checkpoints_root.join(&workspace_hash).join(".git");
        let shadow = Self {
            git_dir,
            workspace,
            workspace_hash,
        };

        if shadow.git_dir.exists() {
            shadow.open()?;
        } else {
            std::fs::create_dir_all(&shadow.git_dir)?;
            let repo = Repository::init_bare(&shadow.git_dir)?;
            let mut config = repo.config()?;
            config.set_bool("core.bare", false)?;
            config.set_str("core.worktree", &shadow.workspace.to_string_lossy())?;
            config.set_str("user.name", "Tern Checkpoint")?;
            config.set_str("user.email", "checkpoint@tern.local")?;
            shadow.write_excludes()?;
        }

        Ok(shadow)
    }

    pub(super) fn workspace(&self) -> &Path {
        &self.workspace
    }

    fn open(&self) -> Result<Repository, CheckpointError> {
        let repo = Repository::open(&self.git_dir)?;
        repo.set_workdir(&self.workspace, false)?;
        Ok(repo)
    }

    fn write_excludes(&self) -> Result<(), CheckpointError> {
        let info = self.git_dir.join("info");
        std::fs::create_dir_all(&info)?;
        std::fs::write(info.join("exclude"), EXCLUDE_PATTERNS.join("\n") + "\n")?;
        Ok(())
    }

    /// Snapshot the whole work tree. Empty commits are allowed so every
    /// checkpoint gets its own hash.
    pub(super) fn commit(&self, task_id: &str) -> Result<String, CheckpointError> {
        let repo = self.open()?;
        let mut index = repo.index()?;
        index.add_all(["*"], IndexAddOption::DEFAULT, None)?;
        index.update_all(["*"], None)?;
        index.write()?;

        let tree_id = index.write_tree()?;
        let tree = repo.find_tree(tree_id)?;
        let signature = Signature::now("Tern Checkpoint", "checkpoint@tern.local")?;
        let task_ref = task_ref(task_id);
        let parent = repo
            .find_reference(&task_ref)
            .ok()
            .and_then(|reference| reference.peel_to_commit().ok());
        let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();
        let message = format!("checkpoint-{}-{}", self.workspace_hash, task_id);

        let oid = repo.commit(Some(&task_ref), &signature, &signature, &message, &tree, &parents)?;
        Ok(oid.to_string())
    }

    /// Restore the work tree to `hash`, removing files created since, and
    /// move the task's ref back to it.
    pub(super) fn reset_head(&self, task_id: &str, hash: &str) -> Result<(), CheckpointError> {
        let repo = self.open()?;
        let oid = parse_oid(hash)?;
        let commit = repo.find_commit(oid)?;

        // Files the task snapshotted after `hash` are removed relative to its tip.
        let task_ref = task_ref(task_id);
        if let Some(tip) = repo.find_reference(&task_ref).ok().and_then(|r| r.target()) {
            repo.set_head_detached(tip)?;
        }

        let mut checkout = CheckoutBuilder::new();
        checkout.force().remove_untracked(true);
        repo.reset(commit.as_object(), ResetType::Hard, Some(&mut checkout))?;
        repo.reference(&task_ref, oid, true, "restore checkpoint")?;
        Ok(())
    }

    /// Files that differ between `from` and `to`, or the live work tree.
    pub(super) fn diff_set(&self, from: &str, to: Option<&str>) -> Result<Vec<ChangedFile>, CheckpointError> {
        let repo = self.open()?;
        let from_tree = tree_of(&repo, from)?;
        let to_tree = to.map(|hash| tree_of(&repo, hash)).transpose()?;

        let mut options = DiffOptions::new();
        options.include_untracked(true).recurse_untracked_dirs(true);
        let diff = match &to_tree {
            Some(to_tree) => repo.diff_tree_to_tree(Some(&from_tree), Some(to_tree), Some(&mut options))?,
            None => repo.diff_tree_to_workdir(Some(&from_tree), Some(&mut options))?,
        };

        let mut files = Vec::new();
        for delta in diff.deltas() {
            let Some(relative) = delta.new_file().path().or_else(|| delta.old_file().path()) else {
                continue;
            };
            let relative = relative.to_path_buf();
            let before = blob_text(&repo, &from_tree, &relative);
            let after = match &to_tree {
                Some(to_tree) => blob_text(&repo, to_tree, &relative),
                None => std::fs::read_to_string(self.workspace.join(&relative)).unwrap_or_default(),
            };
            files.push(ChangedFile {
                absolute_path: self.workspace.join(&relative),
                relative_path: relative,
                before,
                after,
            });
        }
        Ok(files)
    }

    pub(super) fn diff_count(&self, from: &str, to: Option<&str>) -> Result<usize, CheckpointError> {
        let repo = self.open()?;
        let from_tree = tree_of(&repo, from)?;
        let mut options = DiffOptions::new();
        options.include_untracked(true).recurse_untracked_dirs(true);
        let diff = match to {
            Some(hash) => {
                let to_tree = tree_of(&repo, hash)?;
                repo.diff_tree_to_tree(Some(&from_tree), Some(&to_tree), Some(&mut options))?
            }
            None => repo.diff_tree_to_workdir(Some(&from_tree), Some(&mut options))?,
        };
        Ok(diff.deltas().len())
    }
}

fn parse_oid(hash: &str) -> Result<Oid, CheckpointError> {
    Oid::from_str(hash).map_err(|_| CheckpointError::InvalidHash(hash.to_string()))
}

fn tree_of<'r>(repo: &'r Repository, hash: &str) -> Result<Tree<'r>, CheckpointError> {
    Ok(repo.find_commit(parse_oid(hash)?)?.tree()?)
}

fn blob_text(repo: &Repository, tree: &Tree<'_>, path: &Path) -> String {
    tree.get_path(path)
        .ok()
        .and_then(|entry| repo.find_blob(entry.id()).ok())
        .map(|blob| String::from_utf8_lossy(blob.content()).into_owned())
        .unwrap_or_default()
}

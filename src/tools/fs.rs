// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! File-system side effects: reading, revertible writes, listing and search.

use regex::Regex;
use std::io::Read;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

use crate::error::{Result, TernError};
use crate::workspace::Workspace;

/// Entries returned by a listing before it is cut off
pub const LIST_FILES_LIMIT: usize = 200;

/// Matches returned by a search before it is cut off
pub const SEARCH_RESULTS_LIMIT: usize = 300;

/// Directories skipped by recursive listings and searches
const IGNORED_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "target",
    "dist",
    "build",
    "out",
    "__pycache__",
    ".venv",
    "venv",
    ".next",
    ".cache",
    "coverage",
];

/// Read a text file, refusing binary content and invalid UTF-8.
pub fn read_file(path: &Path) -> Result<String> {
    if path.is_dir() {
        return Err(TernError::ToolExecution(format!(
            "{} is a directory, not a file",
            path.display()
        )));
    }
    let bytes = std::fs::read(path).map_err(|e| {
        TernError::ToolExecution(format!("Failed to read {}: {}", path.display(), e))
    })?;
    if looks_binary(&bytes) {
        return Err(TernError::ToolExecution(format!(
            "Cannot read text for file type: {}",
            path.display()
        )));
    }
    String::from_utf8(bytes).map_err(|_| {
        TernError::ToolExecution(format!(
            "{} is not valid UTF-8 text",
            path.display()
        ))
    })
}

fn looks_binary(bytes: &[u8]) -> bool {
    bytes.iter().take(8192).any(|b| *b == 0)
}

/// Drop a markdown fence the model sometimes wraps file content in.
pub fn strip_code_fences(content: &str) -> String {
    let mut lines: Vec<&str> = content.split('\n').collect();
    if lines.first().is_some_and(|l| l.trim_start().starts_with("```")) {
        lines.remove(0);
    }
    if lines.last().is_some_and(|l| l.trim() == "```") {
        lines.pop();
    }
    lines.join("\n")
}

/// A file edit written to disk but not yet accepted.
///
/// Dropping it keeps the write; [`PendingEdit::revert`] restores the original
/// content (or removes a newly created file and the directories made for it).
#[derive(Debug)]
pub struct PendingEdit {
    path: PathBuf,
    original: Option<Vec<u8>>,
    created_dirs: Vec<PathBuf>,
}

impl PendingEdit {
    /// Write `new_content` to `path`, remembering what was there before.
    pub fn apply(path: &Path, new_content: String) -> Result<Self> {
        let original = if path.exists() {
            Some(std::fs::read(path)?)
        } else {
            None
        };

        let mut created_dirs = Vec::new();
        let mut missing = path.parent();
        while let Some(dir) = missing {
            if dir.as_os_str().is_empty() || dir.exists() {
                break;
            }
            created_dirs.push(dir.to_path_buf());
            missing = dir.parent();
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, &new_content)?;

        tracing::debug!(
            target: "tern.tools",
            path = %path.display(),
            created = original.is_none(),
            "pending edit written"
        );

        Ok(Self {
            path: path.to_path_buf(),
            original,
            created_dirs,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Put the file back the way it was.
    pub fn revert(self) -> Result<()> {
        match &self.original {
            Some(original) => std::fs::write(&self.path, original)?,
            None => {
                if self.path.exists() {
                    std::fs::remove_file(&self.path)?;
                }
                // Innermost first; stop at the first directory that gained other content.
                for dir in &self.created_dirs {
                    if std::fs::remove_dir(dir).is_err() {
                        break;
                    }
                }
            }
        }
        tracing::info!(target: "tern.tools", path = %self.path.display(), "pending edit reverted");
        Ok(())
    }
}

fn is_ignored_dir(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| IGNORED_DIRS.contains(&name))
}

/// List a directory. Returns display paths (directories end in `/`) and
/// whether the listing hit the limit.
pub fn list_files(workspace: &Workspace, dir: &Path, recursive: bool, limit: usize) -> Result<(Vec<String>, bool)> {
    if !dir.is_dir() {
        return Err(TernError::ToolExecution(format!(
            "Directory not found: {}",
            dir.display()
        )));
    }

    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut entries: Vec<String> = Vec::new();
    let mut truncated = false;

    for entry in WalkDir::new(dir)
        .max_depth(max_depth)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !(recursive && is_ignored_dir(e)))
        .filter_map(|e| e.ok())
        .filter(|e| e.depth() > 0)
    {
        if entries.len() >= limit {
            truncated = true;
            break;
        }
        let mut shown = workspace.display_path(entry.path());
        if entry.file_type().is_dir() {
            shown.push('/');
        }
        entries.push(shown);
    }

    Ok((entries, truncated))
}

/// Regex search across files under `dir`, formatted with one line of context
/// around each match.
pub fn search_files(
    workspace: &Workspace,
    dir: &Path,
    regex: &Regex,
    file_pattern: Option<&str>,
    limit: usize,
) -> Result<String> {
    let pattern = match file_pattern {
        Some(raw) => Some(glob::Pattern::new(raw).map_err(|e| {
            TernError::ToolExecution(format!("Invalid file pattern '{}': {}", raw, e))
        })?),
        None => None,
    };

    let mut results: Vec<(String, Vec<String>)> = Vec::new();
    let mut total = 0usize;

    'files: for entry in WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_ignored_dir(e))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let path = entry.path();
        if let Some(pattern) = &pattern {
            let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
            if !pattern.matches(&name) {
                continue;
            }
        }

        let Some(content) = read_text_lossy(path) else {
            continue;
        };
        let lines: Vec<&str> = content.lines().collect();
        let mut snippets = Vec::new();
        for (index, line) in lines.iter().enumerate() {
            if !regex.is_match(line) {
                continue;
            }
            let start = index.saturating_sub(1);
            let end = (index + 2).min(lines.len());
            snippets.push(
                lines[start..end]
                    .iter()
                    .map(|l| format!("│{}", l.trim_end()))
                    .collect::<Vec<_>>()
                    .join("\n"),
            );
            total += 1;
            if total >= limit {
                results.push((workspace.display_path(path), snippets));
                break 'files;
            }
        }
        if !snippets.is_empty() {
            results.push((workspace.display_path(path), snippets));
        }
    }

    if total == 0 {
        return Ok("Found 0 results.".to_string());
    }

    let mut output = if total >= limit {
        format!(
            "Showing first {} of {}+ results. Use a more specific search if necessary.\n\n",
            limit, limit
        )
    } else {
        format!("Found {} result{}.\n\n", total, if total == 1 { "" } else { "s" })
    };
    for (file, snippets) in results {
        output.push_str(&file);
        output.push_str("\n│----\n");
        output.push_str(&snippets.join("\n│----\n"));
        output.push_str("\n│----\n\n");
    }
    Ok(output.trim_end().to_string())
}

fn read_text_lossy(path: &Path) -> Option<String> {
    let mut file = std::fs::File::open(path).ok()?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).ok()?;
    if looks_binary(&bytes) {
        return None;
    }
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! CLI argument definitions using Clap
//!
//! Operator commands for inspecting and rewinding persisted tasks.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::checkpoint::RestoreMode;

/// Tern - task orchestration core for an AI coding assistant
#[derive(Parser, Debug)]
#[command(name = "tern")]
#[command(version, about = "Inspect and restore AI coding-assistant tasks")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Settings file path (defaults to $TERN_HOME/settings.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List persisted tasks, newest first
    Tasks {
        /// Maximum number of tasks to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Print the display log of a task
    Show {
        /// Task ID
        task_id: String,
    },

    /// List files changed between two checkpoints, or since one
    Diff {
        /// Task ID
        task_id: String,
        /// Checkpoint hash to compare from
        from: String,
        /// Checkpoint hash to compare to (defaults to the working tree)
        to: Option<String>,
    },

    /// Restore a task to the message with the given timestamp
    Restore {
        /// Task ID
        task_id: String,
        /// Timestamp of the message to restore to
        ts: i64,
        /// What to restore
        #[arg(long, value_enum, default_value = "both")]
        mode: RestoreTarget,
    },
}

/// Restore scope as typed on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RestoreTarget {
    /// Reset workspace files only
    Workspace,
    /// Rewind the conversation only
    Task,
    /// Both
    Both,
}

impl From<RestoreTarget> for RestoreMode {
    fn from(target: RestoreTarget) -> Self {
        match target {
            RestoreTarget::Workspace => RestoreMode::Workspace,
            RestoreTarget::Task => RestoreMode::Task,
            RestoreTarget::Both => RestoreMode::TaskAndWorkspace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tasks_default_limit() {
        let cli = Cli::parse_from(["tern", "tasks"]);
        assert!(matches!(cli.command, Commands::Tasks { limit: 20 }));
    }

    #[test]
    fn test_diff_optional_target() {
        let cli = Cli::parse_from(["tern", "diff", "1700", "abc"]);
        if let Commands::Diff { task_id, from, to } = cli.command {
            assert_eq!(task_id, "1700");
            assert_eq!(from, "abc");
            assert!(to.is_none());
        } else {
            panic!("Expected Diff command");
        }
    }

    #[test]
    fn test_restore_mode() {
        let cli = Cli::parse_from(["tern", "restore", "1700", "42", "--mode", "task"]);
        if let Commands::Restore { ts, mode, .. } = cli.command {
            assert_eq!(ts, 42);
            assert_eq!(RestoreMode::from(mode), RestoreMode::Task);
        } else {
            panic!("Expected Restore command");
        }

        let cli = Cli::parse_from(["tern", "restore", "1700", "42"]);
        assert!(matches!(
            cli.command,
            Commands::Restore {
                mode: RestoreTarget::Both,
                ..
            }
        ));
    }

    #[test]
    fn test_verbose_is_global() {
        let cli = Cli::parse_from(["tern", "show", "1700", "-vv"]);
        assert_eq!(cli.verbose, 2);
    }
}

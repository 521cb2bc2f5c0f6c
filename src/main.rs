// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Tern operator CLI
//!
//! Entry point for inspecting, diffing and restoring persisted tasks.

use clap::Parser;

use tern::cli::{Cli, Commands};
use tern::config::Settings;

#[path = "main/cli_commands.rs"]
mod cli_commands;

use cli_commands::{run_diff, run_restore, run_show, run_tasks};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::WARN.into());

    // `-v` turns on the orchestration targets; `RUST_LOG` still applies.
    if cli.verbose > 0 {
        for directive in ["tern.task=debug", "tern.tools=debug", "tern.checkpoint=debug"] {
            if let Ok(parsed) = directive.parse() {
                env_filter = env_filter.add_directive(parsed);
            }
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load()?,
    };

    match cli.command {
        Commands::Tasks { limit } => run_tasks(limit)?,
        Commands::Show { task_id } => run_show(&task_id)?,
        Commands::Diff { task_id, from, to } => run_diff(&settings, &task_id, &from, to.as_deref()).await?,
        Commands::Restore { task_id, ts, mode } => run_restore(&settings, &task_id, ts, mode.into()).await?,
    }

    Ok(())
}

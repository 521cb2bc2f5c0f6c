// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Tern - task orchestration core for a streaming AI coding assistant.
//!
//! This crate exposes the runtime used by:
//! - the `tern` operator CLI (`src/main.rs`)
//! - any front-end that renders a task's display messages and answers its asks
//!
//! Architecture highlights:
//! - `task`: the turn loop, display log, persistence and resumption
//! - `parser`: incremental parsing of streamed assistant text into blocks
//! - `context`: effective-prompt assembly and history truncation
//! - `checkpoint`: shadow-repository snapshots of the workspace
//! - `diff`: SEARCH/REPLACE patch application
//! - `approval`: auto-approval policy and runaway counters
//! - `tools`: tool validation and the filesystem/shell/browser collaborators
//! - `mcp`: stdio client for external tool servers
//! - `llm`: provider contract, messages and retry policy

pub mod approval;
pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod context;
pub mod diff;
pub mod error;
pub mod llm;
pub mod mcp;
pub mod parser;
pub mod task;
pub mod tools;
pub mod workspace;

pub use error::{Result, TernError};

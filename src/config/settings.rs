// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Settings management for Tern
//!
//! Handles loading and saving settings from ~/.tern/settings.json

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

mod io;

/// Main settings structure, stored in ~/.tern/settings.json
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Which tool categories may run without a human confirmation
    #[serde(default)]
    pub auto_approval: AutoApprovalSettings,

    /// Turn loop limits
    #[serde(default)]
    pub task: TaskConfig,

    /// Retry and backoff settings for provider calls
    #[serde(default)]
    pub resilience: ResilienceConfig,

    /// Shell command execution settings
    #[serde(default)]
    pub commands: CommandConfig,

    /// Workspace checkpoint settings
    #[serde(default)]
    pub checkpoints: CheckpointConfig,

    /// Context window accounting settings
    #[serde(default)]
    pub context: ContextConfig,

    /// External tool servers
    #[serde(default)]
    pub mcp: McpConfig,
}

/// Auto-approval policy table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoApprovalSettings {
    /// Master switch; when off every gated tool asks
    #[serde(default)]
    pub enabled: bool,

    /// Per-category toggles
    #[serde(default)]
    pub actions: AutoApprovalActions,

    /// Consecutive auto-approved requests before a forced check-in
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
}

/// Per-category auto-approval toggles
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutoApprovalActions {
    #[serde(default)]
    pub read_files: bool,
    #[serde(default)]
    pub read_files_externally: bool,
    #[serde(default)]
    pub edit_files: bool,
    #[serde(default)]
    pub edit_files_externally: bool,
    #[serde(default)]
    pub execute_safe_commands: bool,
    #[serde(default)]
    pub execute_all_commands: bool,
    #[serde(default)]
    pub use_browser: bool,
    #[serde(default)]
    pub use_mcp: bool,
}

/// Turn loop limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Consecutive mistakes before a forced human check-in
    #[serde(default = "default_max_consecutive_mistakes")]
    pub max_consecutive_mistakes: u32,
}

/// Retry settings for provider calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResilienceConfig {
    /// Automatic retries before escalating to the human
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay in milliseconds for exponential backoff
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Maximum delay in milliseconds (cap for backoff)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Jitter percentage (0.0 to 1.0) for randomizing delays
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

/// Shell command execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandConfig {
    /// Seconds to wait for a command before continuing while it runs
    #[serde(default = "default_grace_period_secs")]
    pub grace_period_secs: u64,

    /// Wall-clock ceiling after which the command is killed
    #[serde(default = "default_hard_timeout_secs")]
    pub hard_timeout_secs: u64,

    /// Buffered lines that force an output flush
    #[serde(default = "default_output_flush_lines")]
    pub output_flush_lines: usize,

    /// Quiet period after which buffered output is flushed
    #[serde(default = "default_output_flush_interval_ms")]
    pub output_flush_interval_ms: u64,

    /// Output lines kept for the tool result
    #[serde(default = "default_max_output_lines")]
    pub max_output_lines: usize,
}

/// Workspace checkpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Shadow repository initialization timeout
    #[serde(default = "default_init_timeout_secs")]
    pub init_timeout_secs: u64,
}

/// Context window accounting settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Characters per token for estimation (default: 4)
    #[serde(default = "default_chars_per_token")]
    pub chars_per_token: u32,
}

/// External tool server configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpConfig {
    #[serde(default)]
    pub servers: HashMap<String, McpServerConfig>,
}

/// A single stdio tool server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    /// Program to spawn
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Tool names on this server that never need confirmation
    #[serde(default)]
    pub auto_approve: Vec<String>,

    #[serde(default)]
    pub disabled: bool,
}

fn default_true() -> bool {
    true
}

fn default_max_requests() -> u32 {
    20
}

fn default_max_consecutive_mistakes() -> u32 {
    3
}

fn default_max_retries() -> u32 {
    1
}

fn default_base_delay_ms() -> u64 {
    2000
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_jitter() -> f64 {
    0.1
}

fn default_grace_period_secs() -> u64 {
    30
}

fn default_hard_timeout_secs() -> u64 {
    600
}

fn default_output_flush_lines() -> usize {
    20
}

fn default_output_flush_interval_ms() -> u64 {
    100
}

fn default_max_output_lines() -> usize {
    500
}

fn default_init_timeout_secs() -> u64 {
    15
}

fn default_chars_per_token() -> u32 {
    4
}

impl Default for AutoApprovalSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            actions: AutoApprovalActions::default(),
            max_requests: default_max_requests(),
        }
    }
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            max_consecutive_mistakes: default_max_consecutive_mistakes(),
        }
    }
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: default_jitter(),
        }
    }
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: default_grace_period_secs(),
            hard_timeout_secs: default_hard_timeout_secs(),
            output_flush_lines: default_output_flush_lines(),
            output_flush_interval_ms: default_output_flush_interval_ms(),
            max_output_lines: default_max_output_lines(),
        }
    }
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            init_timeout_secs: default_init_timeout_secs(),
        }
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            chars_per_token: default_chars_per_token(),
        }
    }
}

impl AutoApprovalSettings {
    /// Everything enabled; used by tests and trusted automation.
    pub fn allow_all() -> Self {
        Self {
            enabled: true,
            actions: AutoApprovalActions {
                read_files: true,
                read_files_externally: true,
                edit_files: true,
                edit_files_externally: true,
                execute_safe_commands: true,
                execute_all_commands: true,
                use_browser: true,
                use_mcp: true,
            },
            max_requests: default_max_requests(),
        }
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Approval policy for tool invocations
//!
//! [`ApprovalGate::decide`] answers, per invocation, whether a tool may run
//! without asking. [`RunawayCounters`] tracks consecutive mistakes and
//! consecutive auto-approved requests; past their limits the gate forces a
//! human check-in whatever the per-tool policy says.

use std::collections::HashMap;
use std::path::Path;

use crate::config::{AutoApprovalSettings, Settings};
use crate::parser::ToolName;
use crate::workspace::Workspace;

/// What an invocation acts on, as far as policy is concerned
#[derive(Debug, Clone, Copy)]
pub enum ApprovalTarget<'a> {
    /// Path-scoped tools (read/write/list/search)
    Path(&'a Path),
    /// Shell commands; `requires_approval` is the model's own risk flag
    Command { requires_approval: bool },
    /// A tool or resource on an external server
    Mcp { server: &'a str, tool: Option<&'a str> },
    /// Tools with no target (browser, questions)
    None,
}

/// Outcome of a policy check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Decision {
    /// Run without a blocking ask
    pub auto_approve: bool,
    /// The target escalated the action (outside the workspace, or a command
    /// flagged as risky); it only auto-approves under the broader toggle
    pub requires_secondary_approval: bool,
}

impl Decision {
    fn new(auto_approve: bool, requires_secondary_approval: bool) -> Self {
        Self {
            auto_approve,
            requires_secondary_approval,
        }
    }
}

/// A limit that forces the loop to stop and ask
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escalation {
    /// Too many consecutive turns without usable output
    MistakeLimit(u32),
    /// Too many consecutive requests ran without a human in the loop
    AutoApprovalLimit(u32),
}

/// Orchestrator-owned runaway counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunawayCounters {
    pub consecutive_mistakes: u32,
    pub consecutive_auto_approved: u32,
}

impl RunawayCounters {
    pub fn record_mistake(&mut self) {
        self.consecutive_mistakes += 1;
    }

    pub fn record_auto_approved(&mut self) {
        self.consecutive_auto_approved += 1;
    }

    /// A tool ran to completion, so the mistake streak is broken.
    pub fn record_success(&mut self) {
        self.consecutive_mistakes = 0;
    }

    /// A human answered an ask; both counters start over.
    pub fn reset_on_human_response(&mut self) {
        *self = Self::default();
    }
}

/// Per-task policy table
#[derive(Debug, Clone)]
pub struct ApprovalGate {
    settings: AutoApprovalSettings,
    max_consecutive_mistakes: u32,
    workspace: Workspace,
    /// server name -> tools that never need confirmation
    mcp_auto_approve: HashMap<String, Vec<String>>,
}

impl ApprovalGate {
    pub fn new(settings: &Settings, workspace: Workspace) -> Self {
        let mcp_auto_approve = settings
            .mcp
            .servers
            .iter()
            .map(|(name, server)| (name.clone(), server.auto_approve.clone()))
            .collect();
        Self {
            settings: settings.auto_approval.clone(),
            max_consecutive_mistakes: settings.task.max_consecutive_mistakes,
            workspace,
            mcp_auto_approve,
        }
    }

    pub fn settings(&self) -> &AutoApprovalSettings {
        &self.settings
    }

    /// Decide whether `tool` acting on `target` may run unattended.
    pub fn decide(&self, tool: ToolName, target: ApprovalTarget<'_>) -> Decision {
        let actions = &self.settings.actions;

        // Per-server lists are explicit opt-ins and apply without the master switch.
        if let ApprovalTarget::Mcp {
            server,
            tool: Some(mcp_tool),
        } = target
        {
            let listed = self
                .mcp_auto_approve
                .get(server)
                .is_some_and(|tools| tools.iter().any(|t| t == mcp_tool));
            if listed {
                return Decision::new(true, false);
            }
        }

        let outside = match target {
            ApprovalTarget::Path(path) => !self.workspace.contains(path),
            _ => false,
        };

        let decision = match tool {
            // Interactive tools are answered by the human by definition.
            ToolName::AskFollowupQuestion | ToolName::AttemptCompletion => Decision::new(false, false),

            ToolName::ReadFile | ToolName::ListFiles | ToolName::SearchFiles => {
                if outside {
                    Decision::new(actions.read_files && actions.read_files_externally, true)
                } else {
                    Decision::new(actions.read_files, false)
                }
            }

            ToolName::WriteToFile | ToolName::ReplaceInFile => {
                if outside {
                    Decision::new(actions.edit_files && actions.edit_files_externally, true)
                } else {
                    Decision::new(actions.edit_files, false)
                }
            }

            ToolName::ExecuteCommand => {
                let risky = matches!(target, ApprovalTarget::Command { requires_approval: true });
                if risky {
                    Decision::new(actions.execute_safe_commands && actions.execute_all_commands, true)
                } else {
                    Decision::new(actions.execute_safe_commands, false)
                }
            }

            ToolName::BrowserAction => Decision::new(actions.use_browser, false),

            ToolName::UseMcpTool | ToolName::AccessMcpResource => Decision::new(actions.use_mcp, false),
        };

        Decision {
            auto_approve: self.settings.enabled && decision.auto_approve,
            ..decision
        }
    }

    /// A limit that must be cleared by a human before the next provider call
    pub fn escalation(&self, counters: &RunawayCounters) -> Option<Escalation> {
        if counters.consecutive_mistakes >= self.max_consecutive_mistakes {
            return Some(Escalation::MistakeLimit(counters.consecutive_mistakes));
        }
        if self.settings.enabled && counters.consecutive_auto_approved >= self.settings.max_requests {
            return Some(Escalation::AutoApprovalLimit(counters.consecutive_auto_approved));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::McpServerConfig;
    use std::path::PathBuf;

    fn gate_with(approval: AutoApprovalSettings) -> ApprovalGate {
        let settings = Settings {
            auto_approval: approval,
            ..Settings::default()
        };
        ApprovalGate::new(&settings, Workspace::new("/work/project"))
    }

    fn reads_only() -> AutoApprovalSettings {
        let mut approval = AutoApprovalSettings {
            enabled: true,
            ..AutoApprovalSettings::default()
        };
        approval.actions.read_files = true;
        approval
    }

    #[test]
    fn test_disabled_master_switch_asks() {
        let gate = gate_with(AutoApprovalSettings {
            enabled: false,
            ..AutoApprovalSettings::allow_all()
        });
        let path = PathBuf::from("/work/project/a");
        assert!(!gate.decide(ToolName::ReadFile, ApprovalTarget::Path(&path)).auto_approve);
    }

    #[test]
    fn test_read_inside_vs_outside() {
        let gate = gate_with(reads_only());
        let inside = PathBuf::from("/work/project/src/lib.rs");
        let outside = PathBuf::from("/etc/hosts");

        let d = gate.decide(ToolName::ReadFile, ApprovalTarget::Path(&inside));
        assert!(d.auto_approve);
        assert!(!d.requires_secondary_approval);

        let d = gate.decide(ToolName::ReadFile, ApprovalTarget::Path(&outside));
        assert!(!d.auto_approve);
        assert!(d.requires_secondary_approval);
    }

    #[test]
    fn test_edits_need_their_own_toggle() {
        let gate = gate_with(reads_only());
        let inside = PathBuf::from("/work/project/src/lib.rs");
        assert!(!gate.decide(ToolName::WriteToFile, ApprovalTarget::Path(&inside)).auto_approve);
    }

    #[test]
    fn test_safe_vs_all_commands() {
        let mut approval = reads_only();
        approval.actions.execute_safe_commands = true;
        let gate = gate_with(approval.clone());

        let safe = gate.decide(ToolName::ExecuteCommand, ApprovalTarget::Command { requires_approval: false });
        assert!(safe.auto_approve);
        let risky = gate.decide(ToolName::ExecuteCommand, ApprovalTarget::Command { requires_approval: true });
        assert!(!risky.auto_approve);
        assert!(risky.requires_secondary_approval);

        approval.actions.execute_all_commands = true;
        let gate = gate_with(approval);
        let risky = gate.decide(ToolName::ExecuteCommand, ApprovalTarget::Command { requires_approval: true });
        assert!(risky.auto_approve);
    }

    #[test]
    fn test_interactive_tools_never_auto_approve() {
        let gate = gate_with(AutoApprovalSettings::allow_all());
        assert!(!gate.decide(ToolName::AttemptCompletion, ApprovalTarget::None).auto_approve);
        assert!(!gate.decide(ToolName::AskFollowupQuestion, ApprovalTarget::None).auto_approve);
    }

    #[test]
    fn test_mcp_server_allow_list() {
        let mut settings = Settings::default();
        settings.mcp.servers.insert(
            "weather".to_string(),
            McpServerConfig {
                command: "node".to_string(),
                args: vec![],
                env: HashMap::new(),
                auto_approve: vec!["get_forecast".to_string()],
                disabled: false,
            },
        );
        let gate = ApprovalGate::new(&settings, Workspace::new("/work/project"));

        let listed = gate.decide(
            ToolName::UseMcpTool,
            ApprovalTarget::Mcp { server: "weather", tool: Some("get_forecast") },
        );
        assert!(listed.auto_approve);

        let unlisted = gate.decide(
            ToolName::UseMcpTool,
            ApprovalTarget::Mcp { server: "weather", tool: Some("set_alert") },
        );
        assert!(!unlisted.auto_approve);
    }

    #[test]
    fn test_mistake_escalation() {
        let gate = gate_with(AutoApprovalSettings::allow_all());
        let mut counters = RunawayCounters::default();
        for _ in 0..2 {
            counters.record_mistake();
        }
        assert_eq!(gate.escalation(&counters), None);
        counters.record_mistake();
        assert_eq!(gate.escalation(&counters), Some(Escalation::MistakeLimit(3)));
    }

    #[test]
    fn test_auto_approval_escalation() {
        let gate = gate_with(AutoApprovalSettings {
            max_requests: 2,
            ..AutoApprovalSettings::allow_all()
        });
        let mut counters = RunawayCounters::default();
        counters.record_auto_approved();
        assert_eq!(gate.escalation(&counters), None);
        counters.record_auto_approved();
        assert_eq!(gate.escalation(&counters), Some(Escalation::AutoApprovalLimit(2)));

        counters.reset_on_human_response();
        assert_eq!(counters, RunawayCounters::default());
        assert_eq!(gate.escalation(&counters), None);
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Typed tool invocations
//!
//! The parser yields raw string parameters; [`ToolCall::from_block`] checks
//! them against each tool's schema once the block is complete.

use serde_json::Value;
use thiserror::Error;

use crate::parser::{ParamName, ToolName, ToolUseBlock};

/// A tool block whose parameters do not satisfy its schema
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParamError {
    #[error("missing value for required parameter '{param}' of {tool}")]
    Missing { tool: ToolName, param: ParamName },

    #[error("invalid value for parameter '{param}' of {tool}: {reason}")]
    Invalid {
        tool: ToolName,
        param: ParamName,
        reason: String,
    },
}

impl ParamError {
    pub fn tool(&self) -> ToolName {
        match self {
            ParamError::Missing { tool, .. } | ParamError::Invalid { tool, .. } => *tool,
        }
    }
}

/// Headless browser operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserAction {
    Launch { url: String },
    Click { coordinate: (i32, i32) },
    Type { text: String },
    ScrollDown,
    ScrollUp,
    Close,
}

impl BrowserAction {
    pub fn name(&self) -> &'static str {
        match self {
            BrowserAction::Launch { .. } => "launch",
            BrowserAction::Click { .. } => "click",
            BrowserAction::Type { .. } => "type",
            BrowserAction::ScrollDown => "scroll_down",
            BrowserAction::ScrollUp => "scroll_up",
            BrowserAction::Close => "close",
        }
    }
}

/// A validated tool invocation
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCall {
    ExecuteCommand {
        command: String,
        requires_approval: bool,
    },
    ReadFile {
        path: String,
    },
    WriteToFile {
        path: String,
        content: String,
    },
    ReplaceInFile {
        path: String,
        diff: String,
    },
    SearchFiles {
        path: String,
        regex: String,
        file_pattern: Option<String>,
    },
    ListFiles {
        path: String,
        recursive: bool,
    },
    Browser(BrowserAction),
    UseMcpTool {
        server_name: String,
        tool_name: String,
        arguments: Option<Value>,
    },
    AccessMcpResource {
        server_name: String,
        uri: String,
    },
    AskFollowupQuestion {
        question: String,
        options: Vec<String>,
    },
    AttemptCompletion {
        result: String,
        command: Option<String>,
    },
}

struct Params<'a> {
    block: &'a ToolUseBlock,
}

impl<'a> Params<'a> {
    fn optional(&self, param: ParamName) -> Option<&'a str> {
        self.block.param(param).filter(|v| !v.is_empty())
    }

    fn required(&self, param: ParamName) -> Result<&'a str, ParamError> {
        self.optional(param).ok_or(ParamError::Missing {
            tool: self.block.name,
            param,
        })
    }

    fn invalid(&self, param: ParamName, reason: impl Into<String>) -> ParamError {
        ParamError::Invalid {
            tool: self.block.name,
            param,
            reason: reason.into(),
        }
    }

    fn boolean(&self, param: ParamName) -> bool {
        self.optional(param)
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"))
    }
}

impl ToolCall {
    /// Validate a complete tool block.
    pub fn from_block(block: &ToolUseBlock) -> Result<Self, ParamError> {
        let p = Params { block };
        let call = match block.name {
            ToolName::ExecuteCommand => {
                let command = p.required(ParamName::Command)?.to_string();
                p.required(ParamName::RequiresApproval)?;
                ToolCall::ExecuteCommand {
                    command,
                    requires_approval: p.boolean(ParamName::RequiresApproval),
                }
            }
            ToolName::ReadFile => ToolCall::ReadFile {
                path: p.required(ParamName::Path)?.to_string(),
            },
            ToolName::WriteToFile => ToolCall::WriteToFile {
                path: p.required(ParamName::Path)?.to_string(),
                // An empty file is a legitimate write; only absence is an error.
                content: block
                    .param(ParamName::Content)
                    .ok_or(ParamError::Missing {
                        tool: block.name,
                        param: ParamName::Content,
                    })?
                    .to_string(),
            },
            ToolName::ReplaceInFile => ToolCall::ReplaceInFile {
                path: p.required(ParamName::Path)?.to_string(),
                diff: p.required(ParamName::Diff)?.to_string(),
            },
            ToolName::SearchFiles => {
                let regex = p.required(ParamName::Regex)?;
                regex::Regex::new(regex).map_err(|e| p.invalid(ParamName::Regex, e.to_string()))?;
                ToolCall::SearchFiles {
                    path: p.required(ParamName::Path)?.to_string(),
                    regex: regex.to_string(),
                    file_pattern: p.optional(ParamName::FilePattern).map(str::to_string),
                }
            }
            ToolName::ListFiles => ToolCall::ListFiles {
                path: p.required(ParamName::Path)?.to_string(),
                recursive: p.boolean(ParamName::Recursive),
            },
            ToolName::BrowserAction => ToolCall::Browser(browser_action(&p)?),
            ToolName::UseMcpTool => {
                let arguments = match p.optional(ParamName::Arguments) {
                    Some(raw) => Some(
                        serde_json::from_str::<Value>(raw)
                            .map_err(|e| p.invalid(ParamName::Arguments, format!("not valid JSON: {}", e)))?,
                    ),
                    None => None,
                };
                ToolCall::UseMcpTool {
                    server_name: p.required(ParamName::ServerName)?.to_string(),
                    tool_name: p.required(ParamName::ToolName)?.to_string(),
                    arguments,
                }
            }
            ToolName::AccessMcpResource => ToolCall::AccessMcpResource {
                server_name: p.required(ParamName::ServerName)?.to_string(),
                uri: p.required(ParamName::Uri)?.to_string(),
            },
            ToolName::AskFollowupQuestion => ToolCall::AskFollowupQuestion {
                question: p.required(ParamName::Question)?.to_string(),
                options: p
                    .optional(ParamName::Options)
                    .and_then(|raw| serde_json::from_str::<Vec<String>>(raw).ok())
                    .unwrap_or_default(),
            },
            ToolName::AttemptCompletion => ToolCall::AttemptCompletion {
                result: p.required(ParamName::Result)?.to_string(),
                command: p.optional(ParamName::Command).map(str::to_string),
            },
        };
        Ok(call)
    }

    pub fn name(&self) -> ToolName {
        match self {
            ToolCall::ExecuteCommand { .. } => ToolName::ExecuteCommand,
            ToolCall::ReadFile { .. } => ToolName::ReadFile,
            ToolCall::WriteToFile { .. } => ToolName::WriteToFile,
            ToolCall::ReplaceInFile { .. } => ToolName::ReplaceInFile,
            ToolCall::SearchFiles { .. } => ToolName::SearchFiles,
            ToolCall::ListFiles { .. } => ToolName::ListFiles,
            ToolCall::Browser(_) => ToolName::BrowserAction,
            ToolCall::UseMcpTool { .. } => ToolName::UseMcpTool,
            ToolCall::AccessMcpResource { .. } => ToolName::AccessMcpResource,
            ToolCall::AskFollowupQuestion { .. } => ToolName::AskFollowupQuestion,
            ToolCall::AttemptCompletion { .. } => ToolName::AttemptCompletion,
        }
    }
}

fn browser_action(p: &Params<'_>) -> Result<BrowserAction, ParamError> {
    let action = p.required(ParamName::Action)?;
    Ok(match action.trim() {
        "launch" => BrowserAction::Launch {
            url: p.required(ParamName::Url)?.to_string(),
        },
        "click" => {
            let raw = p.required(ParamName::Coordinate)?;
            BrowserAction::Click {
                coordinate: parse_coordinate(raw)
                    .ok_or_else(|| p.invalid(ParamName::Coordinate, "expected 'x,y'"))?,
            }
        }
        "type" => BrowserAction::Type {
            text: p.required(ParamName::Text)?.to_string(),
        },
        "scroll_down" => BrowserAction::ScrollDown,
        "scroll_up" => BrowserAction::ScrollUp,
        "close" => BrowserAction::Close,
        other => return Err(p.invalid(ParamName::Action, format!("unknown action '{}'", other))),
    })
}

fn parse_coordinate(raw: &str) -> Option<(i32, i32)> {
    let (x, y) = raw.split_once(',')?;
    Some((x.trim().parse().ok()?, y.trim().parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn block(name: ToolName, params: &[(ParamName, &str)]) -> ToolUseBlock {
        ToolUseBlock {
            name,
            params: params
                .iter()
                .map(|(k, v)| (*k, v.to_string()))
                .collect::<BTreeMap<_, _>>(),
            partial: false,
        }
    }

    #[test]
    fn test_execute_command() {
        let call = ToolCall::from_block(&block(
            ToolName::ExecuteCommand,
            &[(ParamName::Command, "ls -la"), (ParamName::RequiresApproval, "TRUE")],
        ))
        .unwrap();
        assert_eq!(
            call,
            ToolCall::ExecuteCommand {
                command: "ls -la".to_string(),
                requires_approval: true
            }
        );
    }

    #[test]
    fn test_missing_required_param() {
        let err = ToolCall::from_block(&block(ToolName::ReadFile, &[])).unwrap_err();
        assert_eq!(
            err,
            ParamError::Missing {
                tool: ToolName::ReadFile,
                param: ParamName::Path
            }
        );
        assert_eq!(err.tool(), ToolName::ReadFile);
    }

    #[test]
    fn test_empty_value_counts_as_missing() {
        let err = ToolCall::from_block(&block(ToolName::ReadFile, &[(ParamName::Path, "")])).unwrap_err();
        assert!(matches!(err, ParamError::Missing { .. }));
    }

    #[test]
    fn test_write_allows_empty_content() {
        let call = ToolCall::from_block(&block(
            ToolName::WriteToFile,
            &[(ParamName::Path, "empty.txt"), (ParamName::Content, "")],
        ))
        .unwrap();
        assert!(matches!(call, ToolCall::WriteToFile { content, .. } if content.is_empty()));
    }

    #[test]
    fn test_mcp_arguments_must_be_json() {
        let err = ToolCall::from_block(&block(
            ToolName::UseMcpTool,
            &[
                (ParamName::ServerName, "s"),
                (ParamName::ToolName, "t"),
                (ParamName::Arguments, "{not json"),
            ],
        ))
        .unwrap_err();
        assert!(matches!(err, ParamError::Invalid { param: ParamName::Arguments, .. }));
    }

    #[test]
    fn test_invalid_regex() {
        let err = ToolCall::from_block(&block(
            ToolName::SearchFiles,
            &[(ParamName::Path, "."), (ParamName::Regex, "([")],
        ))
        .unwrap_err();
        assert!(matches!(err, ParamError::Invalid { param: ParamName::Regex, .. }));
    }

    #[test]
    fn test_browser_actions() {
        let click = ToolCall::from_block(&block(
            ToolName::BrowserAction,
            &[(ParamName::Action, "click"), (ParamName::Coordinate, "450, 300")],
        ))
        .unwrap();
        assert_eq!(click, ToolCall::Browser(BrowserAction::Click { coordinate: (450, 300) }));

        let err = ToolCall::from_block(&block(ToolName::BrowserAction, &[(ParamName::Action, "launch")])).unwrap_err();
        assert!(matches!(err, ParamError::Missing { param: ParamName::Url, .. }));
    }

    #[test]
    fn test_followup_options() {
        let call = ToolCall::from_block(&block(
            ToolName::AskFollowupQuestion,
            &[(ParamName::Question, "Which?"), (ParamName::Options, r#"["a","b"]"#)],
        ))
        .unwrap();
        assert_eq!(
            call,
            ToolCall::AskFollowupQuestion {
                question: "Which?".to_string(),
                options: vec!["a".to_string(), "b".to_string()]
            }
        );
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Tag vocabulary for tool invocations.

use serde::{Deserialize, Serialize};

/// Tools the model may invoke
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    ExecuteCommand,
    ReadFile,
    WriteToFile,
    ReplaceInFile,
    SearchFiles,
    ListFiles,
    BrowserAction,
    UseMcpTool,
    AccessMcpResource,
    AskFollowupQuestion,
    AttemptCompletion,
}

impl ToolName {
    pub const ALL: [ToolName; 11] = [
        ToolName::ExecuteCommand,
        ToolName::ReadFile,
        ToolName::WriteToFile,
        ToolName::ReplaceInFile,
        ToolName::SearchFiles,
        ToolName::ListFiles,
        ToolName::BrowserAction,
        ToolName::UseMcpTool,
        ToolName::AccessMcpResource,
        ToolName::AskFollowupQuestion,
        ToolName::AttemptCompletion,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::ExecuteCommand => "execute_command",
            ToolName::ReadFile => "read_file",
            ToolName::WriteToFile => "write_to_file",
            ToolName::ReplaceInFile => "replace_in_file",
            ToolName::SearchFiles => "search_files",
            ToolName::ListFiles => "list_files",
            ToolName::BrowserAction => "browser_action",
            ToolName::UseMcpTool => "use_mcp_tool",
            ToolName::AccessMcpResource => "access_mcp_resource",
            ToolName::AskFollowupQuestion => "ask_followup_question",
            ToolName::AttemptCompletion => "attempt_completion",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.as_str() == name)
    }

    pub fn opening_tag(&self) -> String {
        format!("<{}>", self.as_str())
    }

    pub fn closing_tag(&self) -> String {
        format!("</{}>", self.as_str())
    }

    /// Parameter carrying a whole file body, which may contain its own
    /// closing tag.
    pub(crate) fn body_param(&self) -> Option<ParamName> {
        match self {
            ToolName::WriteToFile => Some(ParamName::Content),
            ToolName::ReplaceInFile => Some(ParamName::Diff),
            _ => None,
        }
    }
}

impl std::fmt::Display for ToolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameter tags nested inside a tool invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamName {
    Command,
    RequiresApproval,
    Path,
    Content,
    Diff,
    Regex,
    FilePattern,
    Recursive,
    Action,
    Url,
    Coordinate,
    Text,
    ServerName,
    ToolName,
    Arguments,
    Uri,
    Question,
    Options,
    Result,
}

impl ParamName {
    pub const ALL: [ParamName; 19] = [
        ParamName::Command,
        ParamName::RequiresApproval,
        ParamName::Path,
        ParamName::Content,
        ParamName::Diff,
        ParamName::Regex,
        ParamName::FilePattern,
        ParamName::Recursive,
        ParamName::Action,
        ParamName::Url,
        ParamName::Coordinate,
        ParamName::Text,
        ParamName::ServerName,
        ParamName::ToolName,
        ParamName::Arguments,
        ParamName::Uri,
        ParamName::Question,
        ParamName::Options,
        ParamName::Result,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ParamName::Command => "command",
            ParamName::RequiresApproval => "requires_approval",
            ParamName::Path => "path",
            ParamName::Content => "content",
            ParamName::Diff => "diff",
            ParamName::Regex => "regex",
            ParamName::FilePattern => "file_pattern",
            ParamName::Recursive => "recursive",
            ParamName::Action => "action",
            ParamName::Url => "url",
            ParamName::Coordinate => "coordinate",
            ParamName::Text => "text",
            ParamName::ServerName => "server_name",
            ParamName::ToolName => "tool_name",
            ParamName::Arguments => "arguments",
            ParamName::Uri => "uri",
            ParamName::Question => "question",
            ParamName::Options => "options",
            ParamName::Result => "result",
        }
    }

    pub fn opening_tag(&self) -> String {
        format!("<{}>", self.as_str())
    }

    pub fn closing_tag(&self) -> String {
        format!("</{}>", self.as_str())
    }
}

impl std::fmt::Display for ParamName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_name_roundtrip() {
        for tool in ToolName::ALL {
            assert_eq!(ToolName::parse(tool.as_str()), Some(tool));
        }
        assert_eq!(ToolName::parse("rm_rf"), None);
    }

    #[test]
    fn test_tags() {
        assert_eq!(ToolName::ReadFile.opening_tag(), "<read_file>");
        assert_eq!(ParamName::FilePattern.closing_tag(), "</file_pattern>");
    }
}

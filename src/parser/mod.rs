// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Streaming assistant-message parser
//!
//! Re-derives the ordered content blocks of an assistant response from the
//! full text received so far. Tool invocations are XML-like tags drawn from a
//! fixed vocabulary; each parameter is a child tag:
//!
//! ```text
//! Let me look at the manifest.
//! <read_file>
//! <path>Cargo.toml</path>
//! </read_file>
//! ```
//!
//! Parsing is a pure function of the buffer, so calling it again on a longer
//! buffer reproduces every non-trailing block unchanged. A block is partial
//! until its closing tag has been seen. Unknown tags are plain text.

mod tags;

pub use tags::{ParamName, ToolName};

use std::collections::BTreeMap;

/// Plain text emitted by the model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextBlock {
    pub content: String,
    pub partial: bool,
}

/// A tool invocation with its raw string parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolUseBlock {
    pub name: ToolName,
    pub params: BTreeMap<ParamName, String>,
    pub partial: bool,
}

impl ToolUseBlock {
    /// Raw parameter value, if present
    pub fn param(&self, name: ParamName) -> Option<&str> {
        self.params.get(&name).map(String::as_str)
    }
}

/// One unit of parsed assistant output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssistantBlock {
    Text(TextBlock),
    ToolUse(ToolUseBlock),
}

impl AssistantBlock {
    pub fn is_partial(&self) -> bool {
        match self {
            AssistantBlock::Text(text) => text.partial,
            AssistantBlock::ToolUse(tool) => tool.partial,
        }
    }

    /// Mark the block complete (used once the stream has ended)
    pub fn finalize(&mut self) {
        match self {
            AssistantBlock::Text(text) => text.partial = false,
            AssistantBlock::ToolUse(tool) => tool.partial = false,
        }
    }
}

struct OpenTool {
    name: ToolName,
    /// Byte offset just past the opening tag
    body_start: usize,
    params: BTreeMap<ParamName, String>,
}

/// Parse the complete assistant text received so far.
pub fn parse_assistant_message(message: &str) -> Vec<AssistantBlock> {
    let bytes = message.as_bytes();
    let mut blocks = Vec::new();
    let mut text_start = 0usize;
    let mut tool: Option<OpenTool> = None;
    let mut param: Option<(ParamName, usize)> = None;

    for i in 0..bytes.len() {
        // Every tag ends with '>', so nothing can close before one.
        if bytes[i] != b'>' {
            continue;
        }
        let seen = &bytes[..=i];

        if let Some((name, value_start)) = param {
            let close = name.closing_tag();
            if seen.ends_with(close.as_bytes()) {
                let value_end = i + 1 - close.len();
                if let Some(open) = tool.as_mut() {
                    open.params
                        .insert(name, message[value_start..value_end].trim().to_string());
                }
                param = None;
            }
            continue;
        }

        if let Some(open) = tool.as_ref() {
            if let Some(name) = ParamName::ALL
                .iter()
                .copied()
                .find(|p| seen.ends_with(p.opening_tag().as_bytes()))
            {
                param = Some((name, i + 1));
                continue;
            }

            let close = open.name.closing_tag();
            if seen.ends_with(close.as_bytes()) {
                let body_end = i + 1 - close.len();
                if let Some(open) = tool.take() {
                    blocks.push(AssistantBlock::ToolUse(finish_tool(
                        open,
                        &message[..body_end],
                        false,
                    )));
                }
                text_start = i + 1;
            }
            continue;
        }

        if let Some(name) = ToolName::ALL
            .iter()
            .copied()
            .find(|t| seen.ends_with(t.opening_tag().as_bytes()))
        {
            let text_end = i + 1 - name.opening_tag().len();
            let text = message[text_start..text_end].trim();
            if !text.is_empty() {
                blocks.push(AssistantBlock::Text(TextBlock {
                    content: text.to_string(),
                    partial: false,
                }));
            }
            tool = Some(OpenTool {
                name,
                body_start: i + 1,
                params: BTreeMap::new(),
            });
        }
    }

    if let Some(mut open) = tool {
        if let Some((name, value_start)) = param {
            open.params
                .insert(name, message[value_start..].trim().to_string());
        }
        blocks.push(AssistantBlock::ToolUse(finish_tool(open, message, true)));
    } else {
        let text = message[text_start..].trim();
        if !text.is_empty() {
            blocks.push(AssistantBlock::Text(TextBlock {
                content: text.to_string(),
                partial: true,
            }));
        }
    }

    blocks
}

/// File bodies may legitimately contain their own closing tag; once the tool
/// is closed, take everything up to the last one.
fn finish_tool(open: OpenTool, message_to_body_end: &str, partial: bool) -> ToolUseBlock {
    let mut params = open.params;
    if !partial {
        if let Some(body_param) = open.name.body_param() {
            let body = &message_to_body_end[open.body_start..];
            let open_tag = body_param.opening_tag();
            let close_tag = body_param.closing_tag();
            if let (Some(start), Some(end)) = (body.find(&open_tag), body.rfind(&close_tag)) {
                let value_start = start + open_tag.len();
                if value_start <= end {
                    params.insert(body_param, body[value_start..end].trim().to_string());
                }
            }
        }
    }
    ToolUseBlock {
        name: open.name,
        params,
        partial,
    }
}

/// Prepare model text for display: drop `<thinking>` markers and, while the
/// block is still streaming, any trailing fragment that looks like the start
/// of a tag so raw markup never flashes on screen.
pub fn clean_text_for_display(content: &str, partial: bool) -> String {
    let mut cleaned = content
        .replace("<thinking>\n", "")
        .replace("<thinking>", "")
        .replace("\n</thinking>", "")
        .replace("</thinking>", "");

    if partial {
        if let Some(last_open) = cleaned.rfind('<') {
            let fragment = &cleaned[last_open..];
            if !fragment.contains('>') {
                let tag_body = fragment
                    .strip_prefix("</")
                    .or_else(|| fragment.strip_prefix('<'))
                    .unwrap_or(fragment)
                    .trim();
                let looks_like_tag = tag_body.is_empty()
                    || tag_body.chars().all(|c| c.is_ascii_alphabetic() || c == '_');
                if looks_like_tag {
                    cleaned.truncate(last_open);
                }
            }
        }
    }

    cleaned.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(blocks: &[AssistantBlock], index: usize) -> &ToolUseBlock {
        match &blocks[index] {
            AssistantBlock::ToolUse(tool) => tool,
            other => panic!("expected tool use, got {:?}", other),
        }
    }

    fn text(blocks: &[AssistantBlock], index: usize) -> &TextBlock {
        match &blocks[index] {
            AssistantBlock::Text(text) => text,
            other => panic!("expected text, got {:?}", other),
        }
    }

    #[test]
    fn test_plain_text_is_partial() {
        let blocks = parse_assistant_message("Hello there");
        assert_eq!(blocks.len(), 1);
        assert_eq!(text(&blocks, 0).content, "Hello there");
        assert!(text(&blocks, 0).partial);
    }

    #[test]
    fn test_empty_message() {
        assert!(parse_assistant_message("").is_empty());
        assert!(parse_assistant_message("   \n ").is_empty());
    }

    #[test]
    fn test_complete_tool_use() {
        let blocks = parse_assistant_message(
            "I'll read it.\n<read_file>\n<path>src/main.rs</path>\n</read_file>",
        );
        assert_eq!(blocks.len(), 2);
        assert_eq!(text(&blocks, 0).content, "I'll read it.");
        assert!(!text(&blocks, 0).partial);

        let read = tool(&blocks, 1);
        assert_eq!(read.name, ToolName::ReadFile);
        assert_eq!(read.param(ParamName::Path), Some("src/main.rs"));
        assert!(!read.partial);
    }

    #[test]
    fn test_partial_tool_use_with_partial_param() {
        let blocks = parse_assistant_message("<execute_command>\n<command>npm ins");
        let cmd = tool(&blocks, 0);
        assert!(cmd.partial);
        assert_eq!(cmd.param(ParamName::Command), Some("npm ins"));
    }

    #[test]
    fn test_text_after_tool_is_new_block() {
        let blocks = parse_assistant_message(
            "<list_files>\n<path>.</path>\n</list_files>\nAnd more text",
        );
        assert_eq!(blocks.len(), 2);
        assert!(!tool(&blocks, 0).partial);
        assert_eq!(text(&blocks, 1).content, "And more text");
        assert!(text(&blocks, 1).partial);
    }

    #[test]
    fn test_two_tools_in_order() {
        let blocks = parse_assistant_message(
            "<read_file><path>a</path></read_file><execute_command><command>ls</command><requires_approval>false</requires_approval></execute_command>",
        );
        assert_eq!(blocks.len(), 2);
        assert_eq!(tool(&blocks, 0).name, ToolName::ReadFile);
        assert_eq!(tool(&blocks, 1).name, ToolName::ExecuteCommand);
        assert_eq!(tool(&blocks, 1).param(ParamName::RequiresApproval), Some("false"));
    }

    #[test]
    fn test_unknown_tag_is_text() {
        let blocks = parse_assistant_message("<delete_everything><path>/</path></delete_everything>");
        assert_eq!(blocks.len(), 1);
        assert!(matches!(blocks[0], AssistantBlock::Text(_)));
    }

    #[test]
    fn test_write_content_containing_closing_tag() {
        let message = "<write_to_file>\n<path>doc.xml</path>\n<content>\n<a></content>\n</b>\n</content>\n</write_to_file>";
        let blocks = parse_assistant_message(message);
        let write = tool(&blocks, 0);
        assert!(!write.partial);
        assert_eq!(write.param(ParamName::Content), Some("<a></content>\n</b>"));
    }

    #[test]
    fn test_reparse_is_stable() {
        let message = "Thinking...\n<read_file>\n<path>x</path>\n</read_file>\ntrailing";
        assert_eq!(parse_assistant_message(message), parse_assistant_message(message));
    }

    #[test]
    fn test_finalize() {
        let mut blocks = parse_assistant_message("<read_file><path>x</path>");
        assert!(blocks[0].is_partial());
        blocks[0].finalize();
        assert!(!blocks[0].is_partial());
    }

    #[test]
    fn test_clean_text_strips_thinking() {
        let cleaned = clean_text_for_display("<thinking>\nplan\n</thinking>", false);
        assert_eq!(cleaned, "plan");
    }

    #[test]
    fn test_clean_text_strips_trailing_tag_fragment() {
        assert_eq!(clean_text_for_display("Hello <", true), "Hello");
        assert_eq!(clean_text_for_display("Hello </", true), "Hello");
        assert_eq!(clean_text_for_display("Hello <read_fi", true), "Hello");
        // Not tag-like, kept
        assert_eq!(clean_text_for_display("if a < 3", true), "if a < 3");
        // Final text is never trimmed of fragments
        assert_eq!(clean_text_for_display("Hello <", false), "Hello <");
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Text fed back to the model as tool results and synthetic notices.

use crate::parser::{ParamName, ToolName, ToolUseBlock};

const TOOL_USE_REMINDER: &str = "# Reminder: Instructions for Tool Use

Tool uses are formatted using XML-style tags. The tool name is enclosed in opening and closing tags, and each parameter is similarly enclosed within its own set of tags. Here's the structure:

<tool_name>
<parameter1_name>value1</parameter1_name>
<parameter2_name>value2</parameter2_name>
...
</tool_name>

For example:

<attempt_completion>
<result>
I have completed the task...
</result>
</attempt_completion>

Always adhere to this format for all tool uses to ensure proper parsing and execution.";

pub fn tool_denied() -> String {
    "The user denied this operation.".to_string()
}

pub fn tool_denied_with_feedback(feedback: &str) -> String {
    format!(
        "The user denied this operation and provided the following feedback:\n<feedback>\n{}\n</feedback>",
        feedback
    )
}

pub fn tool_error(error: &str) -> String {
    format!(
        "The tool execution failed with the following error:\n<error>\n{}\n</error>",
        error
    )
}

pub fn missing_param(tool: ToolName, param: ParamName) -> String {
    format!(
        "Missing value for required parameter '{}' in {}. Please retry with complete response.\n\n{}",
        param, tool, TOOL_USE_REMINDER
    )
}

pub fn invalid_param(tool: ToolName, param: ParamName, reason: &str) -> String {
    format!(
        "Invalid value for parameter '{}' in {}: {}. Please retry with a corrected value.",
        param, tool, reason
    )
}

pub fn no_tools_used() -> String {
    format!(
        "[ERROR] You did not use a tool in your previous response! Please retry with a tool use.\n\n{}\n\n# Next Steps\n\nIf you have completed the user's task, use the attempt_completion tool.\nIf you require additional information from the user, use the ask_followup_question tool.\nOtherwise, if you have not completed the task and do not need additional information, then proceed with the next step of the task.\n(This is an automated message, so do not respond to it conversationally.)",
        TOOL_USE_REMINDER
    )
}

pub fn too_many_mistakes(feedback: Option<&str>) -> String {
    match feedback {
        Some(feedback) => format!(
            "You seem to be having trouble proceeding. The user has provided the following feedback to help guide you:\n<feedback>\n{}\n</feedback>",
            feedback
        ),
        None => "You seem to be having trouble proceeding. The user has asked you to try again.".to_string(),
    }
}

pub fn tool_already_used(tool: ToolName) -> String {
    format!(
        "Tool [{}] was not executed because a tool has already been used in this message. Only one tool may be used per message. You must assess the first tool's result before proceeding to use the next tool.",
        tool
    )
}

pub fn tool_skipped_after_rejection(description: &str) -> String {
    format!(
        "Skipping tool {} due to user rejecting a previous tool.",
        description
    )
}

pub fn interrupted_by_user() -> String {
    "[Response interrupted by user]".to_string()
}

pub fn interrupted_by_api_error() -> String {
    "[Response interrupted by API Error]".to_string()
}

pub fn diff_error(path: &str, error: &str, original: &str) -> String {
    format!(
        "This is likely because the SEARCH block content doesn't match exactly with what's in the file, or if you used multiple SEARCH/REPLACE blocks they may not have been in the order they appear in the file.\n\nThe file was reverted to its original state:\n\n<file_content path=\"{}\">\n{}\n</file_content>\n\n{}\n\nNow that you have the latest state of the file, try the operation again with fewer, more precise SEARCH blocks. For large files especially, it may be prudent to try to limit yourself to <5 SEARCH/REPLACE blocks at a time, then wait for the user to respond with the result of the operation before following up with another replace_in_file call to make additional edits.",
        path, original, error
    )
}

pub fn file_edited(path: &str) -> String {
    format!("The content was successfully saved to {}.", path)
}

pub fn command_output(output: &str, exit_code: Option<i32>) -> String {
    let status = match exit_code {
        Some(0) => "Command executed.".to_string(),
        Some(code) => format!("Command exited with code {}.", code),
        None => "Command was terminated.".to_string(),
    };
    if output.trim().is_empty() {
        status
    } else {
        format!("{}\nOutput:\n{}", status, output)
    }
}

pub fn command_still_running(output: &str) -> String {
    format!(
        "Command is still running in the user's terminal.{}\n\nThe command keeps running in the background; you will not see further output unless you check on it.",
        if output.trim().is_empty() {
            String::new()
        } else {
            format!("\nHere's the output so far:\n{}", output)
        }
    )
}

pub fn command_timed_out(output: &str, secs: u64) -> String {
    format!(
        "Command was killed after exceeding the {}s time limit.{}",
        secs,
        if output.trim().is_empty() {
            String::new()
        } else {
            format!("\nOutput before termination:\n{}", output)
        }
    )
}

pub fn task_resumption(ago: &str, cwd: &str, completed: bool, feedback: Option<&str>) -> String {
    let mut text = if completed {
        format!(
            "[TASK RESUMPTION] This task was interrupted {}. The task was previously marked complete; the user may want a follow-up or new instructions. The current working directory is now '{}'.",
            ago, cwd
        )
    } else {
        format!(
            "[TASK RESUMPTION] This task was interrupted {}. It may or may not be complete, so please reassess the task context. Be aware that the project state may have changed since then. The current working directory is now '{}'. If the task has not been completed, retry the last step before interruption and proceed with completing the task.",
            ago, cwd
        )
    };
    if let Some(feedback) = feedback {
        text.push_str(&format!(
            "\n\nNew instructions for task continuation:\n<user_message>\n{}\n</user_message>",
            feedback
        ));
    }
    text
}

/// Short form of a tool block for notices, e.g. `[read_file for 'src/a.rs']`
pub fn describe(block: &ToolUseBlock) -> String {
    let target = match block.name {
        ToolName::ExecuteCommand => block.param(ParamName::Command),
        ToolName::ReadFile
        | ToolName::WriteToFile
        | ToolName::ReplaceInFile
        | ToolName::ListFiles => block.param(ParamName::Path),
        ToolName::SearchFiles => block.param(ParamName::Regex),
        ToolName::BrowserAction => block.param(ParamName::Action),
        ToolName::UseMcpTool => block.param(ParamName::ToolName),
        ToolName::AccessMcpResource => block.param(ParamName::Uri),
        ToolName::AskFollowupQuestion => block.param(ParamName::Question),
        ToolName::AttemptCompletion => None,
    };
    match target {
        Some(target) => format!("[{} for '{}']", block.name, target),
        None => format!("[{}]", block.name),
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Presenting parsed blocks and executing tools
//!
//! Blocks are handed over as the parser produces them. Partial blocks are
//! only displayed; a block is acted on once it is complete, and at most one
//! tool runs per response.

use serde_json::{json, Map, Value};
use std::collections::VecDeque;
use std::path::Path;

use super::message::{AskKind, AskResponse, MessageKind, SayKind};
use super::Task;
use crate::approval::{ApprovalTarget, Decision};
use crate::diff::construct_new_file_content;
use crate::error::{ErrorCategory, Result, TernError};
use crate::llm::ContentPart;
use crate::parser::{clean_text_for_display, AssistantBlock, ParamName, ToolName, ToolUseBlock};
use crate::tools::fs::{self, LIST_FILES_LIMIT, SEARCH_RESULTS_LIMIT};
use crate::tools::{
    responses, spawn_command, BrowserAction, CommandEvent, ParamError, PendingEdit, SlotClaim, ToolCall,
    ToolResponse, ToolSlot,
};

/// Presentation progress through one assistant response
pub(super) struct TurnState {
    slot: ToolSlot,
    /// Index of the first block not yet acted on
    next_block: usize,
    user_content: Vec<ContentPart>,
    pub(super) completed: bool,
}

impl TurnState {
    pub(super) fn new() -> Self {
        Self {
            slot: ToolSlot::new(),
            next_block: 0,
            user_content: Vec::new(),
            completed: false,
        }
    }

    pub(super) fn has_results(&self) -> bool {
        !self.user_content.is_empty()
    }

    pub(super) fn into_user_content(self) -> Vec<ContentPart> {
        self.user_content
    }

    fn push_text(&mut self, text: String) {
        self.user_content.push(ContentPart::text(text));
    }

    fn push_result(&mut self, description: &str, response: ToolResponse) {
        self.push_text(format!("{} Result:", description));
        self.user_content.extend(response.into_parts());
    }
}

enum ToolOutcome {
    Done(ToolResponse),
    /// Reported to the model without resetting the mistake streak
    Failed(ToolResponse),
    Denied(Option<String>),
    Completed,
}

enum Approval {
    Approved,
    Denied(Option<String>),
}

/// How a tool block is shown and whether it needs a human
struct Presentation {
    ask: AskKind,
    say: SayKind,
    payload: Value,
    decision: Decision,
    /// Counts toward the consecutive auto-approval limit
    gated: bool,
}

impl Presentation {
    fn text(&self) -> String {
        match &self.payload {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    fn with_content(mut self, content: &str) -> Self {
        if let Value::Object(map) = &mut self.payload {
            map.insert("content".to_string(), Value::String(content.to_string()));
        }
        self
    }

    fn kind(&self) -> MessageKind {
        if self.decision.auto_approve {
            MessageKind::Say(self.say)
        } else {
            MessageKind::Ask(self.ask)
        }
    }
}

/// Last lines of a command's output
struct OutputTail {
    lines: VecDeque<String>,
    omitted: usize,
    max_lines: usize,
}

impl OutputTail {
    fn new(max_lines: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            omitted: 0,
            max_lines: max_lines.max(1),
        }
    }

    fn extend(&mut self, lines: Vec<String>) {
        for line in lines {
            if self.lines.len() == self.max_lines {
                self.lines.pop_front();
                self.omitted += 1;
            }
            self.lines.push_back(line);
        }
    }

    fn render(&self) -> String {
        let body = self.lines.iter().map(String::as_str).collect::<Vec<_>>().join("\n");
        if self.omitted > 0 {
            format!("... ({} earlier lines omitted) ...\n{}", self.omitted, body)
        } else {
            body
        }
    }
}

impl Task {
    /// Present every block from the last one not yet handled. Stops at the
    /// first partial block; it is picked up again on the next chunk.
    pub(super) async fn present_blocks(&mut self, turn: &mut TurnState, blocks: &[AssistantBlock]) -> Result<()> {
        while let Some(block) = blocks.get(turn.next_block) {
            self.ensure_running()?;
            match block {
                AssistantBlock::Text(text) => {
                    let cleaned = clean_text_for_display(&text.content, text.partial);
                    if !cleaned.trim().is_empty() {
                        self.say_partial(SayKind::Text, cleaned, text.partial)?;
                    }
                    if text.partial {
                        return Ok(());
                    }
                    turn.next_block += 1;
                }
                AssistantBlock::ToolUse(tool) if tool.partial => {
                    if !turn.slot.is_used() && !turn.slot.was_rejected() {
                        self.show_partial_tool(tool)?;
                    }
                    return Ok(());
                }
                AssistantBlock::ToolUse(tool) => {
                    turn.next_block += 1;
                    self.present_tool(turn, tool).await?;
                }
            }
        }
        Ok(())
    }

    fn show_partial_tool(&mut self, block: &ToolUseBlock) -> Result<()> {
        match block.name {
            ToolName::AttemptCompletion => {
                if let Some(result) = block.param(ParamName::Result) {
                    self.say_partial(SayKind::CompletionResult, result, true)?;
                }
            }
            _ => {
                let presentation = self.presentation(block);
                self.post(presentation.kind(), Some(presentation.text()), Vec::new(), Some(true))?;
            }
        }
        Ok(())
    }

    /// Drop a streaming tool preview that will not be finalized.
    fn discard_tool_preview(&mut self) {
        let Some(last) = self.log.last() else {
            return;
        };
        let streamed_text = matches!(
            last.kind,
            MessageKind::Say(SayKind::Text) | MessageKind::Say(SayKind::Reasoning)
        );
        if last.is_partial() && !streamed_text {
            self.log.remove_last();
        }
    }

    async fn present_tool(&mut self, turn: &mut TurnState, block: &ToolUseBlock) -> Result<()> {
        let description = responses::describe(block);
        match turn.slot.claim() {
            SlotClaim::PriorRejection => {
                turn.push_text(responses::tool_skipped_after_rejection(&description));
                return Ok(());
            }
            SlotClaim::AlreadyUsed => {
                turn.push_text(responses::tool_already_used(block.name));
                return Ok(());
            }
            SlotClaim::Granted => {}
        }

        let call = match ToolCall::from_block(block) {
            Ok(call) => call,
            Err(e) => {
                self.counters.record_mistake();
                self.discard_tool_preview();
                tracing::warn!(target: "tern.tools", tool = %block.name, error = %e, "invalid tool call");
                self.say(SayKind::Error, format!("Invalid {} call: {}", block.name, e))?;
                let text = match &e {
                    ParamError::Missing { tool, param } => responses::missing_param(*tool, *param),
                    ParamError::Invalid { tool, param, reason } => responses::invalid_param(*tool, *param, reason),
                };
                turn.push_result(&description, ToolResponse::text(responses::tool_error(&text)));
                return Ok(());
            }
        };

        tracing::debug!(target: "tern.tools", tool = %block.name, "executing tool");
        let outcome = match self.execute_tool(block, call).await {
            Ok(outcome) => outcome,
            Err(e) if !matches!(
                e.category(),
                ErrorCategory::RecoverableReported | ErrorCategory::RecoverableRetried
            ) =>
            {
                return Err(e)
            }
            Err(e) => {
                tracing::warn!(target: "tern.tools", tool = %block.name, error = %e, "tool failed");
                self.discard_tool_preview();
                self.say(SayKind::Error, format!("Error executing {}: {}", description, e))?;
                ToolOutcome::Failed(ToolResponse::text(responses::tool_error(&e.to_string())))
            }
        };

        match outcome {
            ToolOutcome::Done(response) => {
                self.counters.record_success();
                turn.push_result(&description, response);
            }
            ToolOutcome::Failed(response) => turn.push_result(&description, response),
            ToolOutcome::Denied(feedback) => {
                tracing::info!(target: "tern.tools", tool = %block.name, "tool denied");
                turn.slot.mark_rejected();
                let text = match feedback {
                    Some(feedback) => responses::tool_denied_with_feedback(&feedback),
                    None => responses::tool_denied(),
                };
                turn.push_result(&description, ToolResponse::text(text));
            }
            ToolOutcome::Completed => turn.completed = true,
        }
        Ok(())
    }

    /// Presentation for a (possibly partial) tool block.
    fn presentation(&self, block: &ToolUseBlock) -> Presentation {
        let workspace = &self.ctx.workspace;

        match block.name {
            ToolName::ReadFile
            | ToolName::ListFiles
            | ToolName::SearchFiles
            | ToolName::WriteToFile
            | ToolName::ReplaceInFile => {
                let resolved = block.param(ParamName::Path).map(|p| workspace.resolve(p));
                let target = match &resolved {
                    Some(path) => ApprovalTarget::Path(path.as_path()),
                    None => ApprovalTarget::Path(workspace.root()),
                };
                let mut payload = Map::new();
                payload.insert("tool".into(), json!(block.name.as_str()));
                payload.insert(
                    "path".into(),
                    json!(resolved.as_deref().map(|p| workspace.display_path(p)).unwrap_or_default()),
                );
                for name in [ParamName::Content, ParamName::Diff, ParamName::Regex, ParamName::FilePattern] {
                    if let Some(value) = block.param(name) {
                        payload.insert(name.as_str().into(), json!(value));
                    }
                }
                Presentation {
                    ask: AskKind::Tool,
                    say: SayKind::Tool,
                    payload: Value::Object(payload),
                    decision: self.gate.decide(block.name, target),
                    gated: true,
                }
            }
            ToolName::ExecuteCommand => {
                let requires_approval = param_or_empty(block, ParamName::RequiresApproval)
                    .trim()
                    .eq_ignore_ascii_case("true");
                Presentation {
                    ask: AskKind::Command,
                    say: SayKind::Command,
                    payload: json!(param_or_empty(block, ParamName::Command)),
                    decision: self
                        .gate
                        .decide(block.name, ApprovalTarget::Command { requires_approval }),
                    gated: true,
                }
            }
            ToolName::BrowserAction => {
                let action = param_or_empty(block, ParamName::Action).trim();
                let launch = action == "launch";
                Presentation {
                    ask: AskKind::BrowserActionLaunch,
                    say: SayKind::BrowserAction,
                    payload: json!({
                        "action": action,
                        "url": block.param(ParamName::Url),
                        "coordinate": block.param(ParamName::Coordinate),
                        "text": block.param(ParamName::Text),
                    }),
                    // Only launching needs consent; steps inside a session follow it.
                    decision: if launch {
                        self.gate.decide(block.name, ApprovalTarget::None)
                    } else {
                        Decision {
                            auto_approve: true,
                            requires_secondary_approval: false,
                        }
                    },
                    gated: launch,
                }
            }
            ToolName::UseMcpTool | ToolName::AccessMcpResource => {
                let server = param_or_empty(block, ParamName::ServerName);
                let tool = block.param(ParamName::ToolName);
                Presentation {
                    ask: AskKind::UseMcpServer,
                    say: SayKind::Tool,
                    payload: json!({
                        "tool": block.name.as_str(),
                        "server_name": server,
                        "tool_name": tool,
                        "arguments": block.param(ParamName::Arguments),
                        "uri": block.param(ParamName::Uri),
                    }),
                    decision: self.gate.decide(block.name, ApprovalTarget::Mcp { server, tool }),
                    gated: true,
                }
            }
            ToolName::AskFollowupQuestion | ToolName::AttemptCompletion => Presentation {
                ask: AskKind::Followup,
                say: SayKind::Text,
                payload: json!({
                    "question": param_or_empty(block, ParamName::Question),
                    "options": block.param(ParamName::Options),
                }),
                decision: self.gate.decide(block.name, ApprovalTarget::None),
                gated: false,
            },
        }
    }

    /// Announce the tool, or ask for it and wait.
    async fn approve(&mut self, presentation: &Presentation) -> Result<Approval> {
        if presentation.decision.auto_approve {
            self.log.discard_partial(MessageKind::Ask(presentation.ask));
            self.post(
                MessageKind::Say(presentation.say),
                Some(presentation.text()),
                Vec::new(),
                Some(false),
            )?;
            if presentation.gated {
                self.counters.record_auto_approved();
            }
            return Ok(Approval::Approved);
        }

        self.log.discard_partial(MessageKind::Say(presentation.say));
        match self.ask(presentation.ask, Some(presentation.text())).await? {
            AskResponse::Yes => Ok(Approval::Approved),
            AskResponse::No => Ok(Approval::Denied(None)),
            AskResponse::Message { text, images } => {
                self.post(MessageKind::Say(SayKind::UserFeedback), Some(text.clone()), images, None)?;
                Ok(Approval::Denied(Some(text)))
            }
        }
    }

    async fn execute_tool(&mut self, block: &ToolUseBlock, call: ToolCall) -> Result<ToolOutcome> {
        let workspace = self.ctx.workspace.clone();
        let presentation = self.presentation(block);

        match call {
            ToolCall::ReadFile { path } => {
                let absolute = workspace.resolve(&path);
                let content = fs::read_file(&absolute)?;
                if let Approval::Denied(feedback) = self.approve(&presentation).await? {
                    return Ok(ToolOutcome::Denied(feedback));
                }
                Ok(ToolOutcome::Done(ToolResponse::text(content)))
            }

            ToolCall::ListFiles { path, recursive } => {
                let absolute = workspace.resolve(&path);
                let (entries, truncated) = fs::list_files(&workspace, &absolute, recursive, LIST_FILES_LIMIT)?;
                let mut listing = if entries.is_empty() {
                    "No files found.".to_string()
                } else {
                    entries.join("\n")
                };
                if truncated {
                    listing.push_str(
                        "\n\n(File list truncated. Use list_files on specific subdirectories if you need to explore further.)",
                    );
                }
                let presentation = presentation.with_content(&listing);
                if let Approval::Denied(feedback) = self.approve(&presentation).await? {
                    return Ok(ToolOutcome::Denied(feedback));
                }
                Ok(ToolOutcome::Done(ToolResponse::text(listing)))
            }

            ToolCall::SearchFiles {
                path,
                regex,
                file_pattern,
            } => {
                let absolute = workspace.resolve(&path);
                let regex = regex::Regex::new(&regex).map_err(|e| TernError::InvalidInput(e.to_string()))?;
                let results = fs::search_files(
                    &workspace,
                    &absolute,
                    &regex,
                    file_pattern.as_deref(),
                    SEARCH_RESULTS_LIMIT,
                )?;
                let presentation = presentation.with_content(&results);
                if let Approval::Denied(feedback) = self.approve(&presentation).await? {
                    return Ok(ToolOutcome::Denied(feedback));
                }
                Ok(ToolOutcome::Done(ToolResponse::text(results)))
            }

            ToolCall::WriteToFile { path, content } => {
                let absolute = workspace.resolve(&path);
                self.stage_edit(&absolute, fs::strip_code_fences(&content), &presentation)
                    .await
            }

            ToolCall::ReplaceInFile { path, diff } => {
                let absolute = workspace.resolve(&path);
                let original = fs::read_file(&absolute)?;
                match construct_new_file_content(&diff, &original, true) {
                    Ok(new_content) => self.stage_edit(&absolute, new_content, &presentation).await,
                    Err(e) => {
                        let shown_path = workspace.display_path(&absolute);
                        tracing::info!(target: "tern.tools", path = %shown_path, error = %e, "diff did not apply");
                        self.discard_tool_preview();
                        self.say(SayKind::DiffError, shown_path.clone())?;
                        Ok(ToolOutcome::Failed(ToolResponse::text(responses::tool_error(
                            &responses::diff_error(&shown_path, &e.to_string(), &original),
                        ))))
                    }
                }
            }

            ToolCall::ExecuteCommand { command, .. } => {
                if let Approval::Denied(feedback) = self.approve(&presentation).await? {
                    return Ok(ToolOutcome::Denied(feedback));
                }
                Ok(ToolOutcome::Done(self.run_command(&command).await?))
            }

            ToolCall::Browser(action) => self.browse(action, &presentation).await,

            ToolCall::UseMcpTool {
                server_name,
                tool_name,
                arguments,
            } => {
                let Some(hub) = self.ctx.mcp.clone() else {
                    return Ok(no_collaborator("No MCP servers are connected."));
                };
                if let Approval::Denied(feedback) = self.approve(&presentation).await? {
                    return Ok(ToolOutcome::Denied(feedback));
                }
                let output = tokio::select! {
                    output = hub.call_tool(&server_name, &tool_name, arguments) => output?,
                    _ = self.abort.aborted() => return Err(TernError::Aborted),
                };
                self.say(SayKind::McpServerResponse, output.text.clone())?;
                if output.is_error {
                    return Ok(ToolOutcome::Failed(ToolResponse::text(responses::tool_error(&output.text))));
                }
                Ok(ToolOutcome::Done(ToolResponse::with_images(output.text, output.images)))
            }

            ToolCall::AccessMcpResource { server_name, uri } => {
                let Some(hub) = self.ctx.mcp.clone() else {
                    return Ok(no_collaborator("No MCP servers are connected."));
                };
                if let Approval::Denied(feedback) = self.approve(&presentation).await? {
                    return Ok(ToolOutcome::Denied(feedback));
                }
                let output = tokio::select! {
                    output = hub.read_resource(&server_name, &uri) => output?,
                    _ = self.abort.aborted() => return Err(TernError::Aborted),
                };
                self.say(SayKind::McpServerResponse, output.text.clone())?;
                Ok(ToolOutcome::Done(ToolResponse::with_images(output.text, output.images)))
            }

            ToolCall::AskFollowupQuestion { question, options } => {
                let text = json!({ "question": question, "options": options }).to_string();
                match self.ask(AskKind::Followup, Some(text)).await? {
                    AskResponse::Message { text, images } => {
                        self.post(MessageKind::Say(SayKind::UserFeedback), Some(text.clone()), images.clone(), None)?;
                        Ok(ToolOutcome::Done(ToolResponse::with_images(
                            format!("<answer>\n{}\n</answer>", text),
                            images,
                        )))
                    }
                    AskResponse::Yes => Ok(ToolOutcome::Done(ToolResponse::text(
                        "<answer>\n(The user acknowledged the question without answering.)\n</answer>",
                    ))),
                    AskResponse::No => Ok(ToolOutcome::Denied(None)),
                }
            }

            ToolCall::AttemptCompletion { result, command } => self.attempt_completion(result, command).await,
        }
    }

    /// Write an edit to disk, then keep it only if it is approved.
    async fn stage_edit(
        &mut self,
        absolute: &Path,
        new_content: String,
        presentation: &Presentation,
    ) -> Result<ToolOutcome> {
        let shown_path = self.ctx.workspace.display_path(absolute);
        self.pending_edit = Some(PendingEdit::apply(absolute, new_content)?);

        if let Approval::Denied(feedback) = self.approve(presentation).await? {
            if let Some(edit) = self.pending_edit.take() {
                edit.revert()?;
            }
            return Ok(ToolOutcome::Denied(feedback));
        }

        self.pending_edit = None;
        tracing::info!(target: "tern.tools", path = %shown_path, "file edited");
        self.checkpoint().await?;
        Ok(ToolOutcome::Done(ToolResponse::text(responses::file_edited(&shown_path))))
    }

    async fn browse(&mut self, action: BrowserAction, presentation: &Presentation) -> Result<ToolOutcome> {
        let Some(browser) = self.ctx.browser.clone() else {
            return Ok(no_collaborator("No browser is available in this session."));
        };
        if let Approval::Denied(feedback) = self.approve(presentation).await? {
            return Ok(ToolOutcome::Denied(feedback));
        }

        let result = tokio::select! {
            result = browser.perform(&action) => result?,
            _ = self.abort.aborted() => return Err(TernError::Aborted),
        };
        self.browser_open = !matches!(action, BrowserAction::Close);

        self.post(
            MessageKind::Say(SayKind::BrowserActionResult),
            Some(json!({ "logs": result.logs, "current_url": result.current_url }).to_string()),
            result.screenshot.iter().cloned().collect(),
            None,
        )?;
        let summary = result.summary(&action);
        Ok(ToolOutcome::Done(ToolResponse::with_images(
            summary,
            result.screenshot.into_iter().collect(),
        )))
    }

    async fn attempt_completion(&mut self, result: String, command: Option<String>) -> Result<ToolOutcome> {
        self.say_partial(SayKind::CompletionResult, result, false)?;
        self.checkpoint().await?;

        if let Some(command) = command {
            let presentation = Presentation {
                ask: AskKind::Command,
                say: SayKind::Command,
                payload: json!(command),
                decision: Decision::default(),
                gated: false,
            };
            if let Approval::Denied(feedback) = self.approve(&presentation).await? {
                return Ok(ToolOutcome::Denied(feedback));
            }
            self.run_command(&command).await?;
        }

        match self.ask(AskKind::CompletionResult, None).await? {
            AskResponse::Yes | AskResponse::No => Ok(ToolOutcome::Completed),
            AskResponse::Message { text, images } => {
                self.post(MessageKind::Say(SayKind::UserFeedback), Some(text.clone()), images.clone(), None)?;
                Ok(ToolOutcome::Done(ToolResponse::with_images(
                    format!(
                        "The user has provided feedback on the results. Consider their input to continue the task, and then attempt completion again.\n<feedback>\n{}\n</feedback>",
                        text
                    ),
                    images,
                )))
            }
        }
    }

    /// Snapshot the workspace and note the hash on the display log.
    pub(super) async fn checkpoint(&mut self) -> Result<()> {
        let Some(hash) = self.checkpoints.commit().await else {
            return Ok(());
        };
        self.metadata.last_checkpoint_hash = Some(hash.clone());
        if let Some(ts) = self.say(SayKind::CheckpointCreated, hash.clone())? {
            self.amend(ts, |message| message.checkpoint_hash = Some(hash))?;
        }
        self.save_metadata()
    }

    /// Run a shell command, streaming its output to the display log.
    ///
    /// Past the grace period the command is left running in the background
    /// and the model gets the output so far.
    async fn run_command(&mut self, command: &str) -> Result<ToolResponse> {
        let config = self.ctx.settings.commands.clone();
        let mut handle = spawn_command(command, self.ctx.workspace.root(), &config)?;
        let killer = handle.killer();
        let mut tail = OutputTail::new(config.max_output_lines);

        loop {
            let event = tokio::select! {
                event = handle.next_event() => event,
                _ = self.abort.aborted() => {
                    killer.kill();
                    return Err(TernError::Aborted);
                }
            };

            let Some(event) = event else {
                self.finish_output(&tail)?;
                return Ok(ToolResponse::text(responses::command_output(&tail.render(), None)));
            };

            match event {
                CommandEvent::Output(lines) => {
                    tail.extend(lines);
                    self.say_partial(SayKind::CommandOutput, tail.render(), true)?;
                }
                CommandEvent::StillRunning => {
                    self.finish_output(&tail)?;
                    self.say(SayKind::CommandStillRunning, command)?;
                    tracing::info!(target: "tern.tools", command = %command, "command continues in background");
                    self.background.push(killer);
                    tokio::spawn(async move {
                        while let Some(event) = handle.next_event().await {
                            if event.is_terminal() {
                                break;
                            }
                        }
                    });
                    return Ok(ToolResponse::text(responses::command_still_running(&tail.render())));
                }
                CommandEvent::Exited(code) => {
                    self.finish_output(&tail)?;
                    return Ok(ToolResponse::text(responses::command_output(&tail.render(), code)));
                }
                CommandEvent::TimedOut => {
                    self.finish_output(&tail)?;
                    return Ok(ToolResponse::text(responses::command_timed_out(
                        &tail.render(),
                        config.hard_timeout_secs,
                    )));
                }
                CommandEvent::Killed => {
                    self.finish_output(&tail)?;
                    return Ok(ToolResponse::text(responses::command_output(&tail.render(), None)));
                }
            }
        }
    }

    fn finish_output(&mut self, tail: &OutputTail) -> Result<()> {
        if tail.lines.is_empty() {
            return Ok(());
        }
        self.say_partial(SayKind::CommandOutput, tail.render(), false)?;
        Ok(())
    }
}

fn param_or_empty(block: &ToolUseBlock, name: ParamName) -> &str {
    block.param(name).unwrap_or_default()
}

fn no_collaborator(message: &str) -> ToolOutcome {
    ToolOutcome::Failed(ToolResponse::text(responses::tool_error(message)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_tail_keeps_last_lines() {
        let mut tail = OutputTail::new(2);
        tail.extend(vec!["a".into(), "b".into(), "c".into()]);
        assert_eq!(tail.render(), "... (1 earlier lines omitted) ...\nb\nc");
    }

    #[test]
    fn test_turn_state_result_shape() {
        let mut turn = TurnState::new();
        assert!(!turn.has_results());
        turn.push_result("[read_file for 'a.rs']", ToolResponse::text("fn main() {}"));
        let content = turn.into_user_content();
        assert_eq!(content[0].as_text(), Some("[read_file for 'a.rs'] Result:"));
        assert_eq!(content[1].as_text(), Some("fn main() {}"));
    }
}

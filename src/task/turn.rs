// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! The turn loop
//!
//! One turn is one provider call: assemble the effective prompt, open the
//! stream (retrying a failed first chunk once), feed text into the parser as
//! it arrives, and present each block as soon as it is complete.

use futures::StreamExt;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use super::message::{AskKind, AskResponse, MessageKind, SayKind};
use super::present::TurnState;
use super::{image_parts, Task, TaskOutcome};
use crate::approval::Escalation;
use crate::context::{ApiRequestRecord, CancelReason, TruncationReason, TruncationStrategy};
use crate::error::{ErrorCategory, Result, TernError};
use crate::llm::{ApiChunk, ApiStream, ContentPart, Message};
use crate::parser::{parse_assistant_message, AssistantBlock};
use crate::tools::responses;

/// How a turn ended
pub(super) enum TurnEnd {
    /// Feed these tool results into the next turn
    ToolResults(Vec<ContentPart>),
    /// The model produced neither a tool call nor a completion
    NoToolUsed,
    /// The operator accepted a completion
    Completed,
}

/// What the stream loop saw, kept outside it so an interrupted turn can
/// still be recorded
struct StreamProgress {
    request_ts: Option<i64>,
    record: ApiRequestRecord,
    text: String,
    reasoning: String,
}

enum StreamStep {
    Item(Option<Result<ApiChunk>>),
    Aborted,
}

impl Task {
    pub(super) async fn task_loop(&mut self, mut user_content: Vec<ContentPart>) -> Result<TaskOutcome> {
        loop {
            self.ensure_running()?;
            user_content = match self.check_escalation(user_content).await? {
                Some(content) => content,
                None => return Ok(TaskOutcome::Abandoned),
            };

            match self.run_turn(user_content).await? {
                TurnEnd::ToolResults(next) => user_content = next,
                TurnEnd::NoToolUsed => {
                    self.counters.record_mistake();
                    tracing::debug!(
                        target: "tern.task",
                        mistakes = self.counters.consecutive_mistakes,
                        "turn ended without a tool"
                    );
                    user_content = vec![ContentPart::text(responses::no_tools_used())];
                }
                TurnEnd::Completed => return Ok(TaskOutcome::Completed),
            }
        }
    }

    /// Block on the human if a runaway limit was reached. `None` means the
    /// human chose not to continue.
    async fn check_escalation(&mut self, mut content: Vec<ContentPart>) -> Result<Option<Vec<ContentPart>>> {
        let Some(escalation) = self.gate.escalation(&self.counters) else {
            return Ok(Some(content));
        };
        tracing::warn!(target: "tern.task", ?escalation, "escalating to the operator");

        let (kind, text) = match escalation {
            Escalation::MistakeLimit(count) => (
                AskKind::MistakeLimitReached,
                format!(
                    "The model has gone {} turns in a row without making progress. Provide guidance to continue, or start a new task.",
                    count
                ),
            ),
            Escalation::AutoApprovalLimit(count) => (
                AskKind::AutoApprovalMaxReqReached,
                format!(
                    "{} requests were auto-approved in a row. Continue with the count reset?",
                    count
                ),
            ),
        };
        let mistakes = matches!(escalation, Escalation::MistakeLimit(_));

        match self.ask(kind, Some(text)).await? {
            AskResponse::No => Ok(None),
            AskResponse::Yes => {
                if mistakes {
                    content.push(ContentPart::text(responses::too_many_mistakes(None)));
                }
                Ok(Some(content))
            }
            AskResponse::Message { text, images } => {
                self.post(MessageKind::Say(SayKind::UserFeedback), Some(text.clone()), images.clone(), None)?;
                let feedback = if mistakes {
                    responses::too_many_mistakes(Some(&text))
                } else {
                    format!("<feedback>\n{}\n</feedback>", text)
                };
                content.push(ContentPart::text(feedback));
                content.extend(image_parts(&images));
                Ok(Some(content))
            }
        }
    }

    async fn run_turn(&mut self, user_content: Vec<ContentPart>) -> Result<TurnEnd> {
        let preview = user_content
            .iter()
            .find_map(ContentPart::as_text)
            .map(|t| t.chars().take(200).collect::<String>())
            .unwrap_or_default();

        self.history.push(Message::user_parts(user_content));
        self.save_history()?;

        let mut progress = StreamProgress {
            request_ts: None,
            record: ApiRequestRecord::new(preview),
            text: String::new(),
            reasoning: String::new(),
        };
        progress.request_ts = self.say(SayKind::ApiReqStarted, serde_json::to_string(&progress.record)?)?;

        if self.requests_made == 0 {
            self.checkpoint().await?;
        }
        self.requests_made += 1;

        match self.stream_turn(&mut progress).await {
            Ok(end) => Ok(end),
            Err(TernError::Aborted) => {
                self.record_interruption(&mut progress, CancelReason::UserCancelled, None)?;
                Err(TernError::Aborted)
            }
            Err(e) if progress.record.cancel_reason.is_none() && !progress.text.is_empty() => {
                self.record_interruption(&mut progress, CancelReason::StreamingFailed, Some(e.to_string()))?;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    async fn stream_turn(&mut self, progress: &mut StreamProgress) -> Result<TurnEnd> {
        let model = self.ctx.provider.model();
        let (first, mut stream) = self.open_stream(progress).await?;

        let mut turn = TurnState::new();
        let mut pending = first.map(Ok);
        let mut exhausted = pending.is_none();

        while !exhausted {
            let step = match pending.take() {
                Some(item) => StreamStep::Item(Some(item)),
                None => tokio::select! {
                    item = stream.next() => StreamStep::Item(item),
                    _ = self.abort.aborted() => StreamStep::Aborted,
                },
            };

            match step {
                StreamStep::Aborted => return Err(TernError::Aborted),
                StreamStep::Item(None) => exhausted = true,
                StreamStep::Item(Some(Err(TernError::Aborted))) => return Err(TernError::Aborted),
                StreamStep::Item(Some(Err(e))) => {
                    // Tools may already have run; the turn cannot be replayed.
                    tracing::error!(target: "tern.task", error = %e, "stream failed mid-response");
                    return Err(TernError::StreamFailed(e.to_string()));
                }
                StreamStep::Item(Some(Ok(chunk))) => match chunk {
                    ApiChunk::Usage(usage) => progress.record.add_usage(&usage),
                    ApiChunk::Reasoning(delta) => {
                        progress.reasoning.push_str(&delta);
                        self.say_partial(SayKind::Reasoning, progress.reasoning.clone(), true)?;
                    }
                    ApiChunk::Text(delta) => {
                        progress.text.push_str(&delta);
                        let blocks = parse_assistant_message(&progress.text);
                        self.present_blocks(&mut turn, &blocks).await?;
                    }
                },
            }
        }

        let mut blocks = parse_assistant_message(&progress.text);
        blocks.iter_mut().for_each(AssistantBlock::finalize);
        self.present_blocks(&mut turn, &blocks).await?;
        if let Some(ts) = self.log.finalize_trailing_partial() {
            self.emit(ts);
        }

        progress.record.finalize(&model);
        self.last_request_tokens = progress.record.total_tokens();
        self.metadata.totals.add(&progress.record);
        self.update_request_message(progress)?;
        tracing::debug!(
            target: "tern.task",
            tokens_in = progress.record.tokens_in,
            tokens_out = progress.record.tokens_out,
            cost = progress.record.cost.unwrap_or_default(),
            "request finished"
        );

        if progress.text.trim().is_empty() {
            self.say(
                SayKind::Error,
                "Unexpected API response: the model returned no assistant message.",
            )?;
            self.history
                .push(Message::assistant("Failure: I did not provide a response."));
            self.save_history()?;
            return Ok(TurnEnd::NoToolUsed);
        }

        self.history.push(Message::assistant(progress.text.clone()));
        self.save_history()?;

        if turn.completed {
            Ok(TurnEnd::Completed)
        } else if turn.has_results() {
            Ok(TurnEnd::ToolResults(turn.into_user_content()))
        } else {
            Ok(TurnEnd::NoToolUsed)
        }
    }

    /// Issue the request and wait for its first chunk.
    ///
    /// A failure before any chunk is retried automatically up to the
    /// configured budget: a context overflow first drops a quarter of the
    /// history, anything else waits with backoff. After that the human
    /// decides.
    async fn open_stream(&mut self, progress: &mut StreamProgress) -> Result<(Option<ApiChunk>, ApiStream)> {
        let model = self.ctx.provider.model();
        // Without reported usage (a resumed task, or a provider that sends
        // none) the prompt size is estimated from its text.
        let previous_tokens = if self.last_request_tokens > 0 {
            self.last_request_tokens
        } else {
            self.context
                .estimate_tokens(&self.history, self.ctx.settings.context.chars_per_token)
        };
        if let Some(range) = self
            .context
            .truncate_if_needed(&self.history, previous_tokens, &model)?
        {
            self.say(
                SayKind::ContextTruncated,
                json!({ "reason": TruncationReason::Proactive, "start": range.start, "end": range.end }).to_string(),
            )?;
            self.save_metadata()?;
        }

        let provider = Arc::clone(&self.ctx.provider);
        let mut attempt = 0u32;
        loop {
            self.ensure_running()?;
            let messages = self.context.effective_messages(&self.history);
            tracing::debug!(target: "tern.task", messages = messages.len(), attempt, "sending request");

            let error = match provider.create_message(&self.ctx.system_prompt, &messages).await {
                Ok(mut stream) => {
                    let step = tokio::select! {
                        item = stream.next() => StreamStep::Item(item),
                        _ = self.abort.aborted() => StreamStep::Aborted,
                    };
                    match step {
                        StreamStep::Aborted => return Err(TernError::Aborted),
                        StreamStep::Item(Some(Ok(chunk))) => return Ok((Some(chunk), stream)),
                        StreamStep::Item(None) => return Ok((None, stream)),
                        StreamStep::Item(Some(Err(e))) => e,
                    }
                }
                Err(e) => e,
            };

            tracing::warn!(target: "tern.task", error = %error, attempt, "request failed before streaming");

            let category = error.category();
            match category {
                ErrorCategory::Cancelled | ErrorCategory::Fatal => return Err(error),
                ErrorCategory::RecoverableRetried
                | ErrorCategory::RecoverableReported
                | ErrorCategory::HumanEscalated => {}
            }
            if category == ErrorCategory::RecoverableRetried && attempt < self.retry.max_retries {
                attempt += 1;
                progress.record.retry_count += 1;
                let delay = if error.is_context_window_exceeded() {
                    if let Some(range) = self.context.truncate(
                        &self.history,
                        TruncationStrategy::Quarter,
                        TruncationReason::Overflow,
                    )? {
                        self.say(
                            SayKind::ContextTruncated,
                            json!({ "reason": TruncationReason::Overflow, "start": range.start, "end": range.end })
                                .to_string(),
                        )?;
                        self.save_metadata()?;
                    }
                    Duration::ZERO
                } else {
                    self.retry.calculate_delay(attempt - 1)
                };
                self.say(
                    SayKind::ApiReqRetried,
                    json!({
                        "attempt": attempt,
                        "delay_ms": delay.as_millis() as u64,
                        "error": error.to_string(),
                    })
                    .to_string(),
                )?;
                self.sleep_or_abort(delay).await?;
                continue;
            }

            match self.ask(AskKind::ApiReqFailed, Some(error.to_string())).await? {
                AskResponse::No => return Err(error),
                _ => {
                    attempt = 0;
                    progress.record.retry_count += 1;
                    self.say(SayKind::ApiReqRetried, json!({ "error": error.to_string() }).to_string())?;
                }
            }
        }
    }

    async fn sleep_or_abort(&self, delay: Duration) -> Result<()> {
        if delay.is_zero() {
            return Ok(());
        }
        tokio::select! {
            _ = tokio::time::sleep(delay) => Ok(()),
            _ = self.abort.aborted() => Err(TernError::Aborted),
        }
    }

    fn update_request_message(&mut self, progress: &StreamProgress) -> Result<()> {
        let Some(ts) = progress.request_ts else {
            return Ok(());
        };
        let text = serde_json::to_string(&progress.record)?;
        self.amend(ts, |message| message.text = Some(text))
    }

    /// Keep what streamed before an abort or failure so a resumed task sees
    /// where it stopped.
    fn record_interruption(
        &mut self,
        progress: &mut StreamProgress,
        reason: CancelReason,
        message: Option<String>,
    ) -> Result<()> {
        progress.record.cancel(reason, message);
        progress.record.finalize(&self.ctx.provider.model());
        self.metadata.totals.add(&progress.record);
        self.update_request_message(progress)?;

        let notice = match reason {
            CancelReason::UserCancelled => responses::interrupted_by_user(),
            CancelReason::StreamingFailed => responses::interrupted_by_api_error(),
        };
        let text = if progress.text.is_empty() {
            notice
        } else {
            format!("{}\n\n{}", progress.text, notice)
        };
        self.history.push(Message::assistant(text));
        self.save_history()
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Display messages shown to the operator
//!
//! The log is append-mostly. The one exception is the trailing partial
//! message, which is amended in place while its content streams and keeps
//! its timestamp when finalized.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Blocking questions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AskKind {
    Followup,
    Command,
    CommandOutput,
    CompletionResult,
    Tool,
    ApiReqFailed,
    ResumeTask,
    ResumeCompletedTask,
    MistakeLimitReached,
    AutoApprovalMaxReqReached,
    BrowserActionLaunch,
    UseMcpServer,
}

/// One-way notices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SayKind {
    Task,
    Error,
    ApiReqStarted,
    ApiReqFinished,
    ApiReqRetried,
    Text,
    Reasoning,
    CompletionResult,
    UserFeedback,
    Command,
    CommandOutput,
    CommandStillRunning,
    Tool,
    BrowserAction,
    BrowserActionResult,
    McpServerResponse,
    DiffError,
    CheckpointCreated,
    DeletedApiReqs,
    ContextTruncated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Ask(AskKind),
    Say(SayKind),
}

impl MessageKind {
    pub fn is_ask(&self) -> bool {
        matches!(self, MessageKind::Ask(_))
    }
}

/// How the operator (or an automatic policy) answered an ask
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "response", rename_all = "snake_case")]
pub enum AskResponse {
    Yes,
    No,
    Message {
        text: String,
        #[serde(default)]
        images: Vec<String>,
    },
}

impl AskResponse {
    pub fn message(text: impl Into<String>) -> Self {
        AskResponse::Message {
            text: text.into(),
            images: Vec::new(),
        }
    }
}

/// A unit shown to the operator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayMessage {
    /// Milliseconds since the epoch, unique and increasing within a task
    pub ts: i64,
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
    /// `Some(true)` while streaming, `Some(false)` once finalized, `None` if
    /// it was always complete
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_hash: Option<String>,
    /// Length of the conversation history when this message was produced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_history_index: Option<usize>,
}

impl DisplayMessage {
    pub fn is_partial(&self) -> bool {
        self.partial == Some(true)
    }
}

/// Ordered display log of one task
#[derive(Debug, Clone, Default)]
pub struct MessageLog {
    messages: Vec<DisplayMessage>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_messages(messages: Vec<DisplayMessage>) -> Self {
        Self { messages }
    }

    pub fn messages(&self) -> &[DisplayMessage] {
        &self.messages
    }

    pub fn last(&self) -> Option<&DisplayMessage> {
        self.messages.last()
    }

    pub fn get(&self, ts: i64) -> Option<&DisplayMessage> {
        self.messages.iter().find(|m| m.ts == ts)
    }

    pub fn get_mut(&mut self, ts: i64) -> Option<&mut DisplayMessage> {
        self.messages.iter_mut().find(|m| m.ts == ts)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn next_ts(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        match self.messages.iter().map(|m| m.ts).max() {
            Some(last) if last >= now => last + 1,
            _ => now,
        }
    }

    /// Add or amend a message and return its timestamp.
    ///
    /// `partial` is `Some(true)` for streaming content, `Some(false)` for
    /// the final version of streamed content, and `None` for content that
    /// never streamed. A trailing partial message of the same kind is updated
    /// in place; a trailing partial of another kind is finalized first, so at
    /// most one partial message ever exists.
    pub fn upsert(
        &mut self,
        kind: MessageKind,
        text: Option<String>,
        images: Vec<String>,
        partial: Option<bool>,
    ) -> i64 {
        if partial.is_some() {
            if let Some(last) = self.messages.last_mut() {
                if last.is_partial() && last.kind == kind {
                    last.text = text;
                    last.images = images;
                    last.partial = partial;
                    return last.ts;
                }
            }
        }

        self.finalize_trailing_partial();
        let ts = self.next_ts();
        self.messages.push(DisplayMessage {
            ts,
            kind,
            text,
            images,
            // A message that first appears already complete was never streamed.
            partial: if partial == Some(true) { Some(true) } else { None },
            checkpoint_hash: None,
            conversation_history_index: None,
        });
        ts
    }

    /// Drop the trailing message if it is a partial of `kind`.
    pub fn discard_partial(&mut self, kind: MessageKind) -> Option<i64> {
        let last = self.messages.last()?;
        if last.is_partial() && last.kind == kind {
            return self.messages.pop().map(|m| m.ts);
        }
        None
    }

    /// Mark the trailing partial message (if any) complete.
    pub fn finalize_trailing_partial(&mut self) -> Option<i64> {
        let last = self.messages.last_mut()?;
        if last.is_partial() {
            last.partial = Some(false);
            return Some(last.ts);
        }
        None
    }

    /// Remove partial messages left behind by an unclean shutdown.
    pub fn drop_partials(&mut self) -> usize {
        let before = self.messages.len();
        self.messages.retain(|m| !m.is_partial());
        before - self.messages.len()
    }

    /// Remove every message from `ts` onward. Returns how many were removed.
    pub fn truncate_from(&mut self, ts: i64) -> usize {
        let before = self.messages.len();
        self.messages.retain(|m| m.ts < ts);
        before - self.messages.len()
    }

    pub fn remove_last(&mut self) -> Option<DisplayMessage> {
        self.messages.pop()
    }

    pub fn partial_count(&self) -> usize {
        self.messages.iter().filter(|m| m.is_partial()).count()
    }
}

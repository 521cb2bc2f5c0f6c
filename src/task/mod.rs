// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Task orchestration
//!
//! A [`Task`] owns one conversation from first request to completion. It runs
//! as a single future; the outside world talks to it through a
//! [`TaskHandle`] (answers to asks, abort) and listens on a channel of
//! [`TaskEvent`]s. Everything the task touches is passed in explicitly
//! through [`TaskContext`].

pub mod message;
mod present;
mod resume;
pub mod storage;
mod turn;

pub use message::{AskKind, AskResponse, DisplayMessage, MessageKind, MessageLog, SayKind};
pub use resume::{format_elapsed, restore_checkpoint, RestoreReport};
pub use storage::{list_tasks, TaskMetadata, TaskStorage};

use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

use crate::approval::{ApprovalGate, RunawayCounters};
use crate::checkpoint::CheckpointTracker;
use crate::config::Settings;
use crate::context::ContextManager;
use crate::error::{ErrorCategory, Result, TernError};
use crate::llm::retry::RetryConfig;
use crate::llm::{ContentPart, ImageSource, LlmProvider, Message};
use crate::mcp::McpHub;
use crate::tools::{BrowserSession, CommandKiller, PendingEdit};
use crate::workspace::Workspace;

/// Collaborators and settings for one task
#[derive(Clone)]
pub struct TaskContext {
    pub provider: Arc<dyn LlmProvider>,
    pub settings: Settings,
    pub workspace: Workspace,
    pub system_prompt: String,
    pub tasks_dir: PathBuf,
    pub checkpoints_dir: PathBuf,
    pub browser: Option<Arc<dyn BrowserSession>>,
    pub mcp: Option<Arc<dyn McpHub>>,
}

impl TaskContext {
    pub fn new(provider: Arc<dyn LlmProvider>, settings: Settings, workspace: Workspace) -> Self {
        Self {
            provider,
            settings,
            workspace,
            system_prompt: String::new(),
            tasks_dir: Settings::tasks_dir(),
            checkpoints_dir: Settings::checkpoints_dir(),
            browser: None,
            mcp: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Keep task and checkpoint state under `root` instead of `$TERN_HOME`.
    pub fn with_storage_root(mut self, root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        self.tasks_dir = root.join("tasks");
        self.checkpoints_dir = root.join("checkpoints");
        self
    }

    pub fn with_browser(mut self, browser: Arc<dyn BrowserSession>) -> Self {
        self.browser = Some(browser);
        self
    }

    pub fn with_mcp(mut self, hub: Arc<dyn McpHub>) -> Self {
        self.mcp = Some(hub);
        self
    }
}

/// How a task begins
#[derive(Debug, Clone)]
pub enum TaskStart {
    New { text: String, images: Vec<String> },
    Resume,
}

/// How a task ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The model finished and the operator accepted the result
    Completed,
    /// The operator aborted
    Aborted,
    /// The operator declined to continue at an escalation
    Abandoned,
    /// An unrecoverable failure
    Failed(String),
}

/// Emitted to whoever renders the task
#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent {
    /// A new message, or a new version of one with the same `ts`
    Message(DisplayMessage),
    /// Durable state was written
    StateChanged,
}

#[derive(Debug, Clone)]
struct AskReply {
    ts: i64,
    response: AskResponse,
}

/// Task-wide abort flag that can also be awaited
#[derive(Debug, Clone)]
pub struct AbortSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for AbortSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl AbortSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn abort(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_aborted(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the task is aborted.
    pub async fn aborted(&self) {
        let mut rx = self.tx.subscribe();
        loop {
            let aborted = *rx.borrow_and_update();
            if aborted {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Control side of a running task
#[derive(Debug, Clone)]
pub struct TaskHandle {
    task_id: String,
    replies: mpsc::UnboundedSender<AskReply>,
    abort: AbortSignal,
}

impl TaskHandle {
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Answer the ask identified by `ts`. Answers to anything but the
    /// outstanding ask are dropped by the task.
    pub fn respond(&self, ts: i64, response: AskResponse) -> bool {
        self.replies.send(AskReply { ts, response }).is_ok()
    }

    pub fn abort(&self) {
        self.abort.abort();
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.is_aborted()
    }
}

/// Receiving side of a task's events
pub type TaskEvents = mpsc::UnboundedReceiver<TaskEvent>;

/// One conversation
pub struct Task {
    id: String,
    ctx: TaskContext,
    storage: TaskStorage,
    metadata: TaskMetadata,
    history: Vec<Message>,
    log: MessageLog,
    context: ContextManager,
    checkpoints: CheckpointTracker,
    gate: ApprovalGate,
    counters: RunawayCounters,
    retry: RetryConfig,
    events: mpsc::UnboundedSender<TaskEvent>,
    replies: mpsc::UnboundedReceiver<AskReply>,
    abort: AbortSignal,
    /// File edit written but not yet approved
    pending_edit: Option<PendingEdit>,
    /// Commands left running after their grace period
    background: Vec<CommandKiller>,
    browser_open: bool,
    /// Context tokens of the previous request
    last_request_tokens: u64,
    requests_made: usize,
}

impl Task {
    /// A fresh task with a new identifier.
    pub fn create(ctx: TaskContext, task_text: &str) -> Result<(Self, TaskHandle, TaskEvents)> {
        let id = Utc::now().timestamp_millis().to_string();
        let storage = TaskStorage::open(&ctx.tasks_dir, &id)?;
        let metadata = TaskMetadata::new(&id, task_text, ctx.workspace.root());
        storage.save_metadata(&metadata)?;
        let context = ContextManager::load(storage.dir(), None)?;
        tracing::info!(target: "tern.task", task_id = %id, "task created");
        Ok(Self::assemble(ctx, storage, metadata, Vec::new(), MessageLog::new(), context))
    }

    /// Reopen a saved task.
    pub fn open(ctx: TaskContext, task_id: &str) -> Result<(Self, TaskHandle, TaskEvents)> {
        let storage = TaskStorage::existing(&ctx.tasks_dir, task_id)?;
        let metadata = storage.load_metadata()?;
        let history = storage.load_history()?;
        let log = MessageLog::from_messages(storage.load_messages()?);
        let context = ContextManager::load(storage.dir(), metadata.deleted_range)?;
        tracing::info!(
            target: "tern.task",
            task_id = %task_id,
            history = history.len(),
            messages = log.len(),
            "task reopened"
        );
        Ok(Self::assemble(ctx, storage, metadata, history, log, context))
    }

    fn assemble(
        ctx: TaskContext,
        storage: TaskStorage,
        metadata: TaskMetadata,
        history: Vec<Message>,
        log: MessageLog,
        context: ContextManager,
    ) -> (Self, TaskHandle, TaskEvents) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();
        let abort = AbortSignal::new();
        let id = metadata.task_id.clone();
        let handle = TaskHandle {
            task_id: id.clone(),
            replies: reply_tx,
            abort: abort.clone(),
        };
        let task = Self {
            checkpoints: CheckpointTracker::disabled(id.clone(), "not initialized"),
            gate: ApprovalGate::new(&ctx.settings, ctx.workspace.clone()),
            retry: RetryConfig::from(&ctx.settings.resilience),
            id,
            ctx,
            storage,
            metadata,
            history,
            log,
            context,
            counters: RunawayCounters::default(),
            events: event_tx,
            replies: reply_rx,
            abort,
            pending_edit: None,
            background: Vec::new(),
            browser_open: false,
            last_request_tokens: 0,
            requests_made: 0,
        };
        (task, handle, event_rx)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn messages(&self) -> &[DisplayMessage] {
        self.log.messages()
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    /// Drive the task until it completes, is aborted, or fails.
    ///
    /// Only storage failures are returned as errors; everything else ends
    /// up in the [`TaskOutcome`]. A stream that breaks mid-response winds the
    /// task down and asks the operator whether to resume it.
    pub async fn run(mut self, start: TaskStart) -> Result<TaskOutcome> {
        let mut result = self.run_inner(start).await;
        let outcome = loop {
            let error = match result {
                Ok(outcome) => break outcome,
                Err(error) => error,
            };
            match error.category() {
                ErrorCategory::Cancelled => break TaskOutcome::Aborted,
                ErrorCategory::Fatal => {
                    self.report_failure(&error);
                    self.wind_down().await;
                    result = match self.resume().await {
                        Ok(Some(content)) => self.task_loop(content).await,
                        Ok(None) => break TaskOutcome::Failed(error.to_string()),
                        Err(e) => Err(e),
                    };
                }
                ErrorCategory::RecoverableRetried
                | ErrorCategory::RecoverableReported
                | ErrorCategory::HumanEscalated => {
                    self.report_failure(&error);
                    break TaskOutcome::Failed(error.to_string());
                }
            }
        };

        self.wind_down().await;
        self.log.finalize_trailing_partial();
        self.save_messages()?;
        self.save_metadata()?;
        tracing::info!(target: "tern.task", task_id = %self.id, ?outcome, "task finished");
        Ok(outcome)
    }

    fn report_failure(&mut self, error: &TernError) {
        tracing::error!(target: "tern.task", task_id = %self.id, error = %error, "task failed");
        if let Err(report_err) = self.say(SayKind::Error, error.to_string()) {
            tracing::warn!(target: "tern.task", error = %report_err, "failed to record task failure");
        }
    }

    async fn run_inner(&mut self, start: TaskStart) -> Result<TaskOutcome> {
        let user_content = match start {
            TaskStart::New { text, images } => {
                self.post(MessageKind::Say(SayKind::Task), Some(text.clone()), images.clone(), None)?;
                let mut content = vec![ContentPart::text(format!("<task>\n{}\n</task>", text))];
                content.extend(image_parts(&images));
                Some(content)
            }
            TaskStart::Resume => None,
        };

        self.checkpoints = CheckpointTracker::create(
            self.id.clone(),
            self.ctx.workspace.root(),
            &self.ctx.checkpoints_dir,
            &self.ctx.settings.checkpoints,
        )
        .await;
        if self.ctx.settings.checkpoints.enabled {
            if let Some(reason) = self.checkpoints.disabled_reason().map(str::to_string) {
                self.say(
                    SayKind::Error,
                    format!("Checkpoints are disabled for this task: {}", reason),
                )?;
            }
        }

        let user_content = match user_content {
            Some(content) => content,
            None => match self.resume().await? {
                Some(content) => content,
                None => return Ok(TaskOutcome::Abandoned),
            },
        };

        self.task_loop(user_content).await
    }

    /// Undo or stop whatever the task left in flight.
    async fn wind_down(&mut self) {
        if let Some(edit) = self.pending_edit.take() {
            let path = edit.path().to_path_buf();
            if let Err(e) = edit.revert() {
                tracing::error!(target: "tern.task", path = %path.display(), error = %e, "failed to revert edit");
            }
        }
        for killer in self.background.drain(..) {
            killer.kill();
        }
        if self.browser_open {
            if let Some(browser) = &self.ctx.browser {
                if let Err(e) = browser.close().await {
                    tracing::warn!(target: "tern.task", error = %e, "failed to close browser");
                }
            }
            self.browser_open = false;
        }
    }

    fn ensure_running(&self) -> Result<()> {
        if self.abort.is_aborted() {
            return Err(TernError::Aborted);
        }
        Ok(())
    }

    // ----- display messages -----

    fn emit(&self, ts: i64) {
        if let Some(message) = self.log.get(ts) {
            let _ = self.events.send(TaskEvent::Message(message.clone()));
        }
    }

    /// Add or amend a display message. A no-op once the task is aborted.
    fn post(
        &mut self,
        kind: MessageKind,
        text: Option<String>,
        images: Vec<String>,
        partial: Option<bool>,
    ) -> Result<Option<i64>> {
        if self.abort.is_aborted() {
            return Ok(None);
        }
        let ts = self.log.upsert(kind, text, images, partial);
        let history_index = self.history.len().checked_sub(1);
        if let Some(message) = self.log.get_mut(ts) {
            message.conversation_history_index = history_index;
        }
        self.emit(ts);
        if partial != Some(true) {
            self.save_messages()?;
        }
        Ok(Some(ts))
    }

    fn say(&mut self, kind: SayKind, text: impl Into<String>) -> Result<Option<i64>> {
        self.post(MessageKind::Say(kind), Some(text.into()), Vec::new(), None)
    }

    fn say_partial(&mut self, kind: SayKind, text: impl Into<String>, partial: bool) -> Result<Option<i64>> {
        self.post(MessageKind::Say(kind), Some(text.into()), Vec::new(), Some(partial))
    }

    /// Change a message in place, even after an abort (bookkeeping only).
    fn amend(&mut self, ts: i64, f: impl FnOnce(&mut DisplayMessage)) -> Result<()> {
        if let Some(message) = self.log.get_mut(ts) {
            f(message);
            if !self.abort.is_aborted() {
                self.emit(ts);
            }
            self.save_messages()?;
        }
        Ok(())
    }

    /// Post an ask and wait for its answer.
    ///
    /// Finalizes a streaming ask of the same kind. Replies for any other
    /// `ts` are stale and dropped.
    async fn ask(&mut self, kind: AskKind, text: Option<String>) -> Result<AskResponse> {
        self.ensure_running()?;
        let Some(ts) = self.post(MessageKind::Ask(kind), text, Vec::new(), Some(false))? else {
            return Err(TernError::Aborted);
        };
        tracing::debug!(target: "tern.task", ts, ?kind, "waiting for response");

        loop {
            let reply = tokio::select! {
                reply = self.replies.recv() => reply,
                _ = self.abort.aborted() => return Err(TernError::Aborted),
            };
            match reply {
                Some(reply) if reply.ts == ts => {
                    self.counters.reset_on_human_response();
                    return Ok(reply.response);
                }
                Some(reply) => {
                    tracing::debug!(target: "tern.task", expected = ts, got = reply.ts, "dropping stale response");
                }
                None => return Err(TernError::Aborted),
            }
        }
    }

    // ----- persistence -----

    fn save_messages(&self) -> Result<()> {
        self.storage.save_messages(self.log.messages())
    }

    fn save_history(&mut self) -> Result<()> {
        self.storage.save_history(&self.history)?;
        self.save_metadata()
    }

    fn save_metadata(&mut self) -> Result<()> {
        self.metadata.updated_at = Utc::now();
        self.metadata.deleted_range = self.context.deleted_range();
        self.storage.save_metadata(&self.metadata)?;
        let _ = self.events.send(TaskEvent::StateChanged);
        Ok(())
    }
}

fn image_parts(images: &[String]) -> Vec<ContentPart> {
    images
        .iter()
        .filter_map(|url| ImageSource::from_data_url(url))
        .map(|source| ContentPart::Image { source })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_abort_signal_wakes_waiters() {
        let signal = AbortSignal::new();
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.aborted().await })
        };
        assert!(!signal.is_aborted());
        signal.abort();
        waiter.await.unwrap();
        assert!(signal.is_aborted());

        // Already aborted resolves immediately.
        signal.aborted().await;
    }
}

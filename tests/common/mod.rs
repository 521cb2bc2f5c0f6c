// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Drives a real task against the scripted provider and answers its asks.

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;
use tern::config::{AutoApprovalSettings, Settings};
use tern::llm::mock_provider::MockProvider;
use tern::llm::Message;
use tern::mcp::McpHub;
use tern::task::{
    AskKind, AskResponse, DisplayMessage, MessageKind, Task, TaskContext, TaskEvent, TaskEvents, TaskHandle,
    TaskOutcome, TaskStart, TaskStorage,
};
use tern::tools::BrowserSession;
use tern::workspace::Workspace;
use tokio::task::JoinHandle;

pub const COMPLETE: &str = "<attempt_completion>\n<result>\nAll done.\n</result>\n</attempt_completion>";

pub enum Reply {
    Respond(AskResponse),
    Abort,
}

pub struct Harness {
    pub workspace: TempDir,
    pub storage: TempDir,
    pub provider: MockProvider,
    pub settings: Settings,
    pub browser: Option<Arc<dyn BrowserSession>>,
    pub mcp: Option<Arc<dyn McpHub>>,
}

impl Harness {
    pub fn new() -> Self {
        let mut settings = Settings::default();
        settings.checkpoints.enabled = false;
        settings.resilience.base_delay_ms = 5;
        settings.resilience.max_delay_ms = 5;
        settings.resilience.jitter = 0.0;
        Self {
            workspace: TempDir::new().unwrap(),
            storage: TempDir::new().unwrap(),
            provider: MockProvider::new(),
            settings,
            browser: None,
            mcp: None,
        }
    }

    pub fn allow_all(mut self) -> Self {
        self.settings.auto_approval = AutoApprovalSettings::allow_all();
        self
    }

    pub fn context(&self) -> TaskContext {
        let mut ctx = TaskContext::new(
            Arc::new(self.provider.clone()),
            self.settings.clone(),
            Workspace::new(self.workspace.path()),
        )
        .with_system_prompt("You are a careful coding assistant.")
        .with_storage_root(self.storage.path());
        if let Some(browser) = &self.browser {
            ctx = ctx.with_browser(Arc::clone(browser));
        }
        if let Some(hub) = &self.mcp {
            ctx = ctx.with_mcp(Arc::clone(hub));
        }
        ctx
    }

    pub fn tasks_dir(&self) -> PathBuf {
        self.storage.path().join("tasks")
    }

    pub fn checkpoints_dir(&self) -> PathBuf {
        self.storage.path().join("checkpoints")
    }

    pub async fn run_new<P>(&self, text: &str, policy: P) -> (TaskOutcome, String)
    where
        P: FnMut(&DisplayMessage) -> Option<Reply> + Send + 'static,
    {
        let (task, handle, events) = Task::create(self.context(), text).unwrap();
        let id = task.id().to_string();
        let responder = spawn_responder(events, handle, policy);
        let outcome = task
            .run(TaskStart::New {
                text: text.to_string(),
                images: vec![],
            })
            .await
            .unwrap();
        responder.await.unwrap();
        (outcome, id)
    }

    pub async fn resume<P>(&self, id: &str, policy: P) -> TaskOutcome
    where
        P: FnMut(&DisplayMessage) -> Option<Reply> + Send + 'static,
    {
        let (task, handle, events) = Task::open(self.context(), id).unwrap();
        let responder = spawn_responder(events, handle, policy);
        let outcome = task.run(TaskStart::Resume).await.unwrap();
        responder.await.unwrap();
        outcome
    }

    pub fn saved_messages(&self, id: &str) -> Vec<DisplayMessage> {
        TaskStorage::existing(&self.tasks_dir(), id)
            .unwrap()
            .load_messages()
            .unwrap()
    }

    pub fn saved_history(&self, id: &str) -> Vec<Message> {
        TaskStorage::existing(&self.tasks_dir(), id)
            .unwrap()
            .load_history()
            .unwrap()
    }
}

/// Answers each settled ask once, as the policy decides.
pub fn spawn_responder<P>(mut events: TaskEvents, handle: TaskHandle, mut policy: P) -> JoinHandle<()>
where
    P: FnMut(&DisplayMessage) -> Option<Reply> + Send + 'static,
{
    tokio::spawn(async move {
        let mut answered = HashSet::new();
        while let Some(event) = events.recv().await {
            let TaskEvent::Message(message) = event else {
                continue;
            };
            if answered.contains(&message.ts) {
                continue;
            }
            if let Some(reply) = policy(&message) {
                answered.insert(message.ts);
                match reply {
                    Reply::Respond(response) => {
                        handle.respond(message.ts, response);
                    }
                    Reply::Abort => handle.abort(),
                }
            }
        }
    })
}

pub fn is_open_ask(message: &DisplayMessage, kind: AskKind) -> bool {
    message.kind == MessageKind::Ask(kind) && !message.is_partial()
}

pub fn approve_all(message: &DisplayMessage) -> Option<Reply> {
    (message.kind.is_ask() && !message.is_partial()).then_some(Reply::Respond(AskResponse::Yes))
}

pub fn count_kind(messages: &[DisplayMessage], kind: MessageKind) -> usize {
    messages.iter().filter(|m| m.kind == kind).count()
}

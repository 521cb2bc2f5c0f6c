// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Headless browser collaborator
//!
//! The task only sees this trait. A front-end that owns a real browser
//! registers an implementation; without one, `browser_action` reports a tool
//! error to the model.

use async_trait::async_trait;

use super::call::BrowserAction;
use crate::error::Result;

/// What a browser step produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrowserActionResult {
    /// PNG or WEBP data URL of the viewport after the action
    pub screenshot: Option<String>,
    /// Console output captured during the action
    pub logs: String,
    pub current_url: Option<String>,
}

impl BrowserActionResult {
    /// Text summary returned to the model alongside the screenshot
    pub fn summary(&self, action: &BrowserAction) -> String {
        let mut text = format!("The browser action '{}' has been executed.", action.name());
        if let Some(url) = &self.current_url {
            text.push_str(&format!("\n\nCurrent URL: {}", url));
        }
        text.push_str("\n\nConsole logs:\n");
        if self.logs.trim().is_empty() {
            text.push_str("(No new logs)");
        } else {
            text.push_str(&self.logs);
        }
        if self.screenshot.is_some() {
            text.push_str("\n\n(See the attached screenshot of the page.)");
        }
        text
    }
}

#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn launch(&self, url: &str) -> Result<BrowserActionResult>;
    async fn click(&self, x: i32, y: i32) -> Result<BrowserActionResult>;
    async fn type_text(&self, text: &str) -> Result<BrowserActionResult>;
    async fn scroll_down(&self) -> Result<BrowserActionResult>;
    async fn scroll_up(&self) -> Result<BrowserActionResult>;
    async fn close(&self) -> Result<BrowserActionResult>;

    /// Dispatch a validated action.
    async fn perform(&self, action: &BrowserAction) -> Result<BrowserActionResult> {
        match action {
            BrowserAction::Launch { url } => self.launch(url).await,
            BrowserAction::Click { coordinate: (x, y) } => self.click(*x, *y).await,
            BrowserAction::Type { text } => self.type_text(text).await,
            BrowserAction::ScrollDown => self.scroll_down().await,
            BrowserAction::ScrollUp => self.scroll_up().await,
            BrowserAction::Close => self.close().await,
        }
    }
}

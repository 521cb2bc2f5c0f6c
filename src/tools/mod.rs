// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Tool system for Tern
//!
//! Validation of parsed tool blocks, the single-flight execution slot, and
//! the side-effect collaborators the task drives: filesystem, shell, browser.
//! External-protocol tools live in [`crate::mcp`].

pub mod browser;
pub mod call;
pub mod command;
pub mod fs;
pub mod responses;
pub mod slot;

pub use browser::{BrowserActionResult, BrowserSession};
pub use call::{BrowserAction, ParamError, ToolCall};
pub use command::{spawn_command, CommandEvent, CommandHandle, CommandKiller, DebouncedOutput};
pub use fs::PendingEdit;
pub use slot::{SlotClaim, ToolSlot};

use crate::llm::ContentPart;
use crate::llm::message::ImageSource;

/// What one executed tool hands back to the model
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolResponse {
    pub text: String,
    /// Data URLs
    pub images: Vec<String>,
}

impl ToolResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            images: Vec::new(),
        }
    }

    pub fn with_images(text: impl Into<String>, images: Vec<String>) -> Self {
        Self {
            text: text.into(),
            images,
        }
    }

    /// Content parts for the next user turn; undecodable images are dropped.
    pub fn into_parts(self) -> Vec<ContentPart> {
        let mut parts = vec![ContentPart::text(self.text)];
        parts.extend(
            self.images
                .iter()
                .filter_map(|url| ImageSource::from_data_url(url))
                .map(|source| ContentPart::Image { source }),
        );
        parts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_parts_keeps_valid_images() {
        let response = ToolResponse::with_images(
            "shot",
            vec!["data:image/png;base64,AAAA".to_string(), "not a data url".to_string()],
        );
        let parts = response.into_parts();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].as_text(), Some("shot"));
        assert!(matches!(&parts[1], ContentPart::Image { source } if source.media_type == "image/png"));
    }
}

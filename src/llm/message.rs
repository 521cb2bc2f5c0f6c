// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Message types for LLM interactions
//!
//! Provider-format conversation history. Tool invocations travel inside
//! assistant text (see [`crate::parser`]) and tool results travel back as user
//! text parts, so a message is just a role plus text/image parts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Unique identifier for the message
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,

    /// Role of the message sender
    pub role: Role,

    /// Content parts in order
    pub content: Vec<ContentPart>,

    /// When the message was created
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

/// Role of the message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// User message (including tool results)
    User,
    /// Assistant response
    Assistant,
}

/// A part of a message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Text content
    Text { text: String },
    /// Image content (base64)
    Image { source: ImageSource },
}

/// Source of an image
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageSource {
    #[serde(rename = "type")]
    pub source_type: String, // "base64"
    pub media_type: String, // "image/png", "image/jpeg", etc.
    pub data: String,       // base64 encoded
}

impl ImageSource {
    /// Build from a `data:<media>;base64,<data>` URL.
    pub fn from_data_url(url: &str) -> Option<Self> {
        let rest = url.strip_prefix("data:")?;
        let (media_type, data) = rest.split_once(";base64,")?;
        Some(Self {
            source_type: "base64".to_string(),
            media_type: media_type.to_string(),
            data: data.to_string(),
        })
    }
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    /// Text of this part, if it is a text part
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentPart::Text { text } => Some(text),
            ContentPart::Image { .. } => None,
        }
    }
}

impl Message {
    fn with_parts(role: Role, content: Vec<ContentPart>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content,
            timestamp: Utc::now(),
        }
    }

    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_parts(Role::User, vec![ContentPart::text(content)])
    }

    /// Create a new user message with several parts
    pub fn user_parts(parts: Vec<ContentPart>) -> Self {
        Self::with_parts(Role::User, parts)
    }

    /// Create a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_parts(Role::Assistant, vec![ContentPart::text(content)])
    }

    /// Concatenated text of all text parts
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(ContentPart::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Estimate token count using a characters-per-token heuristic.
    /// Images are counted as a flat 1000 tokens.
    pub fn estimate_tokens(&self, chars_per_token: u32) -> u32 {
        let chars_per_token = chars_per_token.max(1) as usize;
        self.content
            .iter()
            .map(|part| match part {
                ContentPart::Text { text } => (text.len() / chars_per_token) as u32,
                ContentPart::Image { .. } => 1000,
            })
            .sum()
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_user() {
        let msg = Message::user("Hello");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.text(), "Hello");
    }

    #[test]
    fn test_message_text_joins_parts() {
        let msg = Message::user_parts(vec![
            ContentPart::text("a"),
            ContentPart::Image {
                source: ImageSource::from_data_url("data:image/png;base64,AAAA").unwrap(),
            },
            ContentPart::text("b"),
        ]);
        assert_eq!(msg.text(), "a\nb");
    }

    #[test]
    fn test_estimate_tokens() {
        let msg = Message::assistant("x".repeat(400));
        assert_eq!(msg.estimate_tokens(4), 100);
    }

    #[test]
    fn test_image_from_data_url() {
        let img = ImageSource::from_data_url("data:image/jpeg;base64,Zm9v").unwrap();
        assert_eq!(img.media_type, "image/jpeg");
        assert_eq!(img.data, "Zm9v");
        assert!(ImageSource::from_data_url("https://example.com/a.png").is_none());
    }

    #[test]
    fn test_serde_roundtrip_preserves_role_tag() {
        let msg = Message::assistant("hi");
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"role\":\"assistant\""));
        assert!(json.contains("\"type\":\"text\""));
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }
}

// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Error types for Tern
//!
//! This module defines the crate-wide error type and the mapping from every
//! failure onto the task loop's error taxonomy.

use thiserror::Error;

/// Main error type for Tern operations
#[derive(Error, Debug)]
pub enum TernError {
    /// API-related errors
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Tool execution errors
    #[error("Tool execution failed: {0}")]
    ToolExecution(String),

    /// The provider stream broke after the response had started
    #[error("Stream failed mid-response: {0}")]
    StreamFailed(String),

    /// Checkpoint errors
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Task persistence errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// The task was aborted while waiting
    #[error("Task aborted")]
    Aborted,

    /// External protocol errors
    #[error("MCP error: {0}")]
    Mcp(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// API-specific error types
#[derive(Error, Debug, Clone)]
pub enum ApiError {
    /// Authentication failed (invalid API key)
    #[error("Authentication failed: invalid API key")]
    AuthenticationFailed,

    /// Rate limited by the API
    #[error("Rate limited: retry after {0} seconds")]
    RateLimited(u32),

    /// Context window exceeded
    #[error("Context window exceeded: {0}")]
    ContextWindowExceeded(String),

    /// Network connectivity error
    #[error("Network error: {0}")]
    Network(String),

    /// Invalid response from API
    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    /// API returned an error
    #[error("API error ({status}): {message}")]
    ServerError { status: u16, message: String },

    /// Timeout waiting for response
    #[error("Request timed out")]
    Timeout,

    /// Streaming error
    #[error("Streaming error: {0}")]
    StreamError(String),
}

/// How the task loop treats a failure once it reaches its boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Retried once automatically, escalated to the human afterwards.
    RecoverableRetried,
    /// Fed back into the conversation so the model can correct itself.
    RecoverableReported,
    /// Blocks the loop on an explicit human decision.
    HumanEscalated,
    /// Ends the turn, reverts in-flight edits and asks whether to resume.
    Fatal,
    /// The operator stopped the task.
    Cancelled,
}

impl TernError {
    /// Classify a failure at the task loop's boundary.
    pub fn category(&self) -> ErrorCategory {
        match self {
            TernError::Aborted => ErrorCategory::Cancelled,
            TernError::StreamFailed(_) => ErrorCategory::Fatal,
            TernError::Api(ApiError::AuthenticationFailed) => ErrorCategory::HumanEscalated,
            TernError::Api(_) => ErrorCategory::RecoverableRetried,
            TernError::ToolExecution(_)
            | TernError::Checkpoint(_)
            | TernError::Mcp(_)
            | TernError::InvalidInput(_)
            | TernError::Io(_) => ErrorCategory::RecoverableReported,
            TernError::Storage(_) | TernError::Json(_) => ErrorCategory::HumanEscalated,
        }
    }

    /// Whether the provider reported that the prompt no longer fits.
    pub fn is_context_window_exceeded(&self) -> bool {
        matches!(self, TernError::Api(ApiError::ContextWindowExceeded(_)))
    }
}

/// Result type alias for Tern operations
pub type Result<T> = std::result::Result<T, TernError>;

impl From<git2::Error> for TernError {
    fn from(err: git2::Error) -> Self {
        TernError::Checkpoint(err.message().to_string())
    }
}

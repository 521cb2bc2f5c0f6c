// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

use std::io;
use tern::error::{ApiError, ErrorCategory, TernError};

#[test]
fn test_io_error_conversion() {
    let io_error = io::Error::new(io::ErrorKind::NotFound, "File not found");
    let error: TernError = io_error.into();
    assert!(matches!(error, TernError::Io(_)));
}

#[test]
fn test_error_display() {
    assert_eq!(
        TernError::StreamFailed("connection reset".to_string()).to_string(),
        "Stream failed mid-response: connection reset"
    );
    assert_eq!(TernError::Aborted.to_string(), "Task aborted");
    assert_eq!(
        ApiError::RateLimited(30).to_string(),
        "Rate limited: retry after 30 seconds"
    );
}

#[test]
fn test_context_window_detection() {
    let overflow = TernError::Api(ApiError::ContextWindowExceeded("too long".to_string()));
    assert!(overflow.is_context_window_exceeded());
    assert!(!TernError::Api(ApiError::Timeout).is_context_window_exceeded());
}

#[test]
fn test_error_categories() {
    assert_eq!(
        TernError::Api(ApiError::Network("reset".to_string())).category(),
        ErrorCategory::RecoverableRetried
    );
    assert_eq!(
        TernError::Api(ApiError::AuthenticationFailed).category(),
        ErrorCategory::HumanEscalated
    );
    assert_eq!(
        TernError::ToolExecution("exit 1".to_string()).category(),
        ErrorCategory::RecoverableReported
    );
    assert_eq!(
        TernError::StreamFailed("eof".to_string()).category(),
        ErrorCategory::Fatal
    );
    assert_eq!(TernError::Aborted.category(), ErrorCategory::Cancelled);
}

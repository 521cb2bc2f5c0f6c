// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Per-request token and cost bookkeeping

use serde::{Deserialize, Serialize};

use crate::llm::{ModelInfo, Usage};

/// Why a request ended without finishing its stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// The stream broke mid-response
    StreamingFailed,
    /// The operator aborted the task
    UserCancelled,
}

/// Bookkeeping for one model call, stored as the text of its
/// `api_req_started` display message and amended in place
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiRequestRecord {
    /// First line of the user turn that triggered the request
    #[serde(default)]
    pub request: String,
    #[serde(default)]
    pub tokens_in: u64,
    #[serde(default)]
    pub tokens_out: u64,
    #[serde(default)]
    pub cache_writes: u64,
    #[serde(default)]
    pub cache_reads: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel_reason: Option<CancelReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub streaming_failed_message: Option<String>,
    #[serde(default)]
    pub retry_count: u32,
}

impl ApiRequestRecord {
    pub fn new(request: impl Into<String>) -> Self {
        Self {
            request: request.into(),
            ..Self::default()
        }
    }

    /// Fold a usage chunk in; providers may report several
    pub fn add_usage(&mut self, usage: &Usage) {
        self.tokens_in += usage.input_tokens;
        self.tokens_out += usage.output_tokens;
        self.cache_writes += usage.cache_write_tokens;
        self.cache_reads += usage.cache_read_tokens;
        if let Some(reported) = usage.total_cost {
            self.cost = Some(self.cost.unwrap_or(0.0) + reported);
        }
    }

    /// Compute the cost unless the provider reported one.
    pub fn finalize(&mut self, model: &ModelInfo) {
        if self.cost.is_none() {
            self.cost = Some(model.calculate_cost(&self.as_usage()));
        }
    }

    pub fn cancel(&mut self, reason: CancelReason, message: Option<String>) {
        self.cancel_reason = Some(reason);
        self.streaming_failed_message = message;
    }

    /// Tokens that occupied the context window for this request
    pub fn total_tokens(&self) -> u64 {
        self.tokens_in + self.tokens_out + self.cache_writes + self.cache_reads
    }

    pub fn as_usage(&self) -> Usage {
        Usage {
            input_tokens: self.tokens_in,
            output_tokens: self.tokens_out,
            cache_write_tokens: self.cache_writes,
            cache_read_tokens: self.cache_reads,
            total_cost: None,
        }
    }
}

/// Running totals for a task
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenTotals {
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub cache_writes: u64,
    pub cache_reads: u64,
    pub total_cost: f64,
}

impl TokenTotals {
    pub fn add(&mut self, record: &ApiRequestRecord) {
        self.tokens_in += record.tokens_in;
        self.tokens_out += record.tokens_out;
        self.cache_writes += record.cache_writes;
        self.cache_reads += record.cache_reads;
        self.total_cost += record.cost.unwrap_or(0.0);
    }

    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a ApiRequestRecord>) -> Self {
        let mut totals = Self::default();
        for record in records {
            totals.add(record);
        }
        totals
    }
}

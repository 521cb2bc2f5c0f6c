// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! LLM Provider trait and related types
//!
//! Defines the abstract streaming contract the task loop consumes. Concrete
//! backends live outside this crate.

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

use crate::error::Result;
use crate::llm::message::Message;

/// A lazy, finite, non-restartable sequence of response chunks.
pub type ApiStream = Pin<Box<dyn Stream<Item = Result<ApiChunk>> + Send>>;

/// Main trait for LLM providers
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Get the provider name (e.g., "anthropic", "openrouter")
    fn name(&self) -> &str;

    /// The model this provider instance talks to
    fn model(&self) -> ModelInfo;

    /// Start a streaming completion for the given system prompt and
    /// effective message list.
    async fn create_message(&self, system: &str, messages: &[Message]) -> Result<ApiStream>;
}

/// One chunk of a streaming response
#[derive(Debug, Clone, PartialEq)]
pub enum ApiChunk {
    /// Incremental answer text
    Text(String),
    /// Incremental rationale text
    Reasoning(String),
    /// Token totals, typically emitted once near the end
    Usage(Usage),
}

/// Token usage statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_write_tokens: u64,
    #[serde(default)]
    pub cache_read_tokens: u64,
    /// Provider-reported cost, overriding the computed one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_cost: Option<f64>,
}

impl Usage {
    /// Every token that occupied the context window for this request
    pub fn context_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens + self.cache_write_tokens + self.cache_read_tokens
    }
}

/// Information about a model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Model identifier
    pub id: String,

    /// Maximum context window in tokens
    pub context_window: u64,

    /// Maximum output tokens
    pub max_output_tokens: u64,

    /// Whether the model accepts images
    #[serde(default)]
    pub supports_images: bool,

    /// Input price per million tokens (USD)
    #[serde(default)]
    pub input_price: f64,

    /// Output price per million tokens (USD)
    #[serde(default)]
    pub output_price: f64,

    /// Cache write price per million tokens (USD)
    #[serde(default)]
    pub cache_write_price: f64,

    /// Cache read price per million tokens (USD)
    #[serde(default)]
    pub cache_read_price: f64,
}

impl ModelInfo {
    /// Create a model with no pricing
    pub fn new(id: impl Into<String>, context_window: u64) -> Self {
        Self {
            id: id.into(),
            context_window,
            max_output_tokens: 8192,
            supports_images: false,
            input_price: 0.0,
            output_price: 0.0,
            cache_write_price: 0.0,
            cache_read_price: 0.0,
        }
    }

    /// Cost of one request in USD
    pub fn calculate_cost(&self, usage: &Usage) -> f64 {
        if let Some(cost) = usage.total_cost {
            return cost;
        }
        let per_million = |price: f64, tokens: u64| price / 1_000_000.0 * tokens as f64;
        per_million(self.input_price, usage.input_tokens)
            + per_million(self.output_price, usage.output_tokens)
            + per_million(self.cache_write_price, usage.cache_write_tokens)
            + per_million(self.cache_read_price, usage.cache_read_tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn priced_model() -> ModelInfo {
        ModelInfo {
            input_price: 3.0,
            output_price: 15.0,
            cache_write_price: 3.75,
            cache_read_price: 0.3,
            ..ModelInfo::new("priced", 200_000)
        }
    }

    #[test]
    fn test_usage_context_tokens() {
        let usage = Usage {
            input_tokens: 100,
            output_tokens: 50,
            cache_write_tokens: 10,
            cache_read_tokens: 5,
            total_cost: None,
        };
        assert_eq!(usage.context_tokens(), 165);
    }

    #[test]
    fn test_calculate_cost() {
        let usage = Usage {
            input_tokens: 1_000_000,
            output_tokens: 1_000_000,
            cache_write_tokens: 1_000_000,
            cache_read_tokens: 1_000_000,
            total_cost: None,
        };
        let cost = priced_model().calculate_cost(&usage);
        assert!((cost - 22.05).abs() < 1e-9);
    }

    #[test]
    fn test_reported_cost_wins() {
        let usage = Usage {
            input_tokens: 1_000_000,
            total_cost: Some(0.5),
            ..Usage::default()
        };
        assert!((priced_model().calculate_cost(&usage) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_free_model_costs_nothing() {
        let usage = Usage {
            input_tokens: 12_345,
            output_tokens: 678,
            ..Usage::default()
        };
        assert_eq!(ModelInfo::new("free", 8_000).calculate_cost(&usage), 0.0);
    }
}

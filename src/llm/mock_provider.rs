// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Mock LLM provider for testing
//!
//! Plays back scripted responses in order and records every request, so the
//! task loop can be driven deterministically without a real backend.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::error::{ApiError, Result, TernError};
use crate::llm::message::Message;
use crate::llm::provider::{ApiChunk, ApiStream, LlmProvider, ModelInfo, Usage};

/// One scripted model call
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// `create_message` itself fails
    Fail(ApiError),
    /// The stream yields these items in order
    Stream(Vec<MockItem>),
}

/// One item of a scripted stream
#[derive(Debug, Clone)]
pub enum MockItem {
    Chunk(ApiChunk),
    Error(ApiError),
    /// Pause before the next item
    Delay(Duration),
    /// Never yield again
    Hang,
}

/// A request the provider received
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub system: String,
    pub messages: Vec<Message>,
}

/// A mock LLM provider for testing
#[derive(Clone)]
pub struct MockProvider {
    model: ModelInfo,
    responses: Arc<Mutex<VecDeque<MockResponse>>>,
    call_count: Arc<AtomicUsize>,
    recorded_requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!("Mock provider lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

impl MockProvider {
    /// Create a new mock provider with an empty script
    pub fn new() -> Self {
        Self {
            model: ModelInfo::new("mock-model", 128_000),
            responses: Arc::new(Mutex::new(VecDeque::new())),
            call_count: Arc::new(AtomicUsize::new(0)),
            recorded_requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Describe a different model, e.g. one with a small context window
    pub fn with_model(mut self, model: ModelInfo) -> Self {
        self.model = model;
        self
    }

    /// Queue a plain-text reply streamed in one chunk followed by usage
    pub fn push_text(&self, text: impl Into<String>) -> &Self {
        self.push_chunks(vec![
            ApiChunk::Text(text.into()),
            ApiChunk::Usage(Usage {
                input_tokens: 10,
                output_tokens: 5,
                ..Usage::default()
            }),
        ])
    }

    /// Queue a reply made of the given chunks
    pub fn push_chunks(&self, chunks: Vec<ApiChunk>) -> &Self {
        self.push(MockResponse::Stream(
            chunks.into_iter().map(MockItem::Chunk).collect(),
        ))
    }

    /// Queue an arbitrary scripted response
    pub fn push(&self, response: MockResponse) -> &Self {
        lock(&self.responses).push_back(response);
        self
    }

    /// Number of `create_message` calls so far
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// All recorded requests
    pub fn recorded_requests(&self) -> Vec<RecordedRequest> {
        lock(&self.recorded_requests).clone()
    }

    /// The last request made
    pub fn last_request(&self) -> Option<RecordedRequest> {
        lock(&self.recorded_requests).last().cloned()
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> ModelInfo {
        self.model.clone()
    }

    async fn create_message(&self, system: &str, messages: &[Message]) -> Result<ApiStream> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        lock(&self.recorded_requests).push(RecordedRequest {
            system: system.to_string(),
            messages: messages.to_vec(),
        });

        let next = lock(&self.responses).pop_front();
        match next {
            None => Err(TernError::Api(ApiError::InvalidResponse(
                "mock provider script exhausted".to_string(),
            ))),
            Some(MockResponse::Fail(error)) => Err(TernError::Api(error)),
            Some(MockResponse::Stream(items)) => {
                let stream = async_stream::stream! {
                    for item in items {
                        match item {
                            MockItem::Chunk(chunk) => yield Ok(chunk),
                            MockItem::Error(error) => yield Err(TernError::Api(error)),
                            MockItem::Delay(duration) => tokio::time::sleep(duration).await,
                            MockItem::Hang => std::future::pending::<()>().await,
                        }
                    }
                };
                Ok(Box::pin(stream))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_plays_script_in_order() {
        let provider = MockProvider::new();
        provider.push_text("first").push_text("second");

        let mut stream = provider
            .create_message("sys", &[Message::user("hi")])
            .await
            .unwrap();
        assert_eq!(
            stream.next().await.unwrap().unwrap(),
            ApiChunk::Text("first".to_string())
        );

        let mut stream = provider.create_message("sys", &[]).await.unwrap();
        assert_eq!(
            stream.next().await.unwrap().unwrap(),
            ApiChunk::Text("second".to_string())
        );
        assert_eq!(provider.call_count(), 2);
        assert_eq!(provider.recorded_requests()[0].messages.len(), 1);
    }

    #[tokio::test]
    async fn test_scripted_failure() {
        let provider = MockProvider::new();
        provider.push(MockResponse::Fail(ApiError::Timeout));
        assert!(provider.create_message("sys", &[]).await.is_err());
    }

    #[tokio::test]
    async fn test_exhausted_script_errors() {
        let provider = MockProvider::new();
        assert!(provider.create_message("sys", &[]).await.is_err());
    }
}

// SPDX-FileCopyrightText: 2026 UltimaRAG Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock completion adapter with a scripted reply queue.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use ultima_core::UltimaError;
use ultima_core::traits::{CompletionAdapter, PluginAdapter};
use ultima_core::types::{AdapterType, CompletionRequest, CompletionResponse, HealthStatus};

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Successful completion with this text.
    Text(String),
    /// Transport-class failure.
    ProviderError(String),
    /// Content-class failure.
    Malformed(String),
    /// Sleep, then reply with the text.
    Delayed(Duration, String),
    /// Panic inside `complete`.
    Panic,
}

/// A mock completion service.
///
/// Replies are popped from a FIFO queue. When the queue is empty the
/// fallback reply is used, or a provider error if none is set. Every
/// request is recorded for later inspection.
#[derive(Clone, Default)]
pub struct MockCompletion {
    replies: Arc<Mutex<VecDeque<MockReply>>>,
    fallback: Option<MockReply>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl MockCompletion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue pre-loaded with successful text replies.
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self::with_replies(responses.into_iter().map(MockReply::Text).collect())
    }

    pub fn with_replies(replies: Vec<MockReply>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(VecDeque::from(replies))),
            ..Self::default()
        }
    }

    /// Answer every call with `text` once the queue is empty.
    pub fn always(text: impl Into<String>) -> Self {
        Self {
            fallback: Some(MockReply::Text(text.into())),
            ..Self::default()
        }
    }

    pub async fn push(&self, reply: MockReply) {
        self.replies.lock().await.push_back(reply);
    }

    /// Number of `complete` calls so far.
    pub async fn call_count(&self) -> usize {
        self.requests.lock().await.len()
    }

    /// All requests received so far, in call order.
    pub async fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().await.clone()
    }

    async fn next_reply(&self) -> Option<MockReply> {
        self.replies
            .lock()
            .await
            .pop_front()
            .or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl PluginAdapter for MockCompletion {
    fn name(&self) -> &str {
        "mock-completion"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Completion
    }

    async fn health_check(&self) -> Result<HealthStatus, UltimaError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), UltimaError> {
        Ok(())
    }
}

#[async_trait]
impl CompletionAdapter for MockCompletion {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, UltimaError> {
        let model = request.model.clone().unwrap_or_else(|| "mock-model".into());
        self.requests.lock().await.push(request);

        let text = match self.next_reply().await {
            Some(MockReply::Text(text)) => text,
            Some(MockReply::Delayed(delay, text)) => {
                tokio::time::sleep(delay).await;
                text
            }
            Some(MockReply::ProviderError(message)) => {
                return Err(UltimaError::Provider {
                    message,
                    source: None,
                });
            }
            Some(MockReply::Malformed(message)) => {
                return Err(UltimaError::MalformedOutput(message));
            }
            Some(MockReply::Panic) => panic!("scripted panic in mock completion"),
            None => {
                return Err(UltimaError::Provider {
                    message: "no scripted reply".into(),
                    source: None,
                });
            }
        };

        Ok(CompletionResponse { text, model })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replies_are_served_in_order_then_fail() {
        let mock = MockCompletion::with_replies(vec![
            MockReply::Text("first".into()),
            MockReply::ProviderError("down".into()),
        ]);

        let first = mock.complete(CompletionRequest::new("a")).await.unwrap();
        assert_eq!(first.text, "first");
        assert!(mock.complete(CompletionRequest::new("b")).await.unwrap_err().is_transport());
        assert!(mock.complete(CompletionRequest::new("c")).await.is_err());
        assert_eq!(mock.call_count().await, 3);
    }

    #[tokio::test]
    async fn fallback_repeats() {
        let mock = MockCompletion::always("same");
        for _ in 0..3 {
            assert_eq!(mock.complete(CompletionRequest::new("x")).await.unwrap().text, "same");
        }
    }

    #[tokio::test]
    async fn requests_are_recorded() {
        let mock = MockCompletion::always("ok");
        let mut request = CompletionRequest::new("prompt text");
        request.system = Some("system text".into());
        mock.complete(request).await.unwrap();
        let seen = mock.requests().await;
        assert_eq!(seen[0].prompt, "prompt text");
        assert_eq!(seen[0].system.as_deref(), Some("system text"));
    }
}

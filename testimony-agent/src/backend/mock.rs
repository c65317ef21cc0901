//! Mock LLM backend for testing.
//!
//! Responses are scripted by matching a substring of the final user message,
//! so a test can make one pipeline call slow or failing while its siblings
//! succeed.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::traits::*;

/// What the mock does when a rule matches.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Return this content.
    Text(String),
    /// Return this content after sleeping.
    Delayed(Duration, String),
    /// Fail with `LlmError::RequestFailed`.
    Fail(String),
}

#[derive(Debug, Clone)]
struct MockRule {
    needle: String,
    reply: MockReply,
}

/// Mock backend for testing.
pub struct MockBackend {
    model_id: String,
    available: AtomicBool,
    response_content: String,
    rules: Vec<MockRule>,
    call_count: AtomicU32,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockBackend {
    /// Create a new mock backend.
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            available: AtomicBool::new(true),
            response_content: "Mock response".to_string(),
            rules: Vec::new(),
            call_count: AtomicU32::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Set the fallback response content.
    pub fn with_response(mut self, content: impl Into<String>) -> Self {
        self.response_content = content.into();
        self
    }

    /// Reply with `reply` whenever the final user message contains `needle`.
    ///
    /// Rules are checked in registration order; the first match wins.
    pub fn on(mut self, needle: impl Into<String>, reply: MockReply) -> Self {
        self.rules.push(MockRule {
            needle: needle.into(),
            reply,
        });
        self
    }

    /// Set availability.
    pub fn with_available(self, available: bool) -> Self {
        self.available.store(available, Ordering::SeqCst);
        self
    }

    /// Get the number of times complete was called.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Requests received so far, in arrival order.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    fn reply_for(&self, request: &CompletionRequest) -> MockReply {
        let input = request.last_user_content().unwrap_or_default();
        self.rules
            .iter()
            .find(|rule| input.contains(&rule.needle))
            .map(|rule| rule.reply.clone())
            .unwrap_or_else(|| MockReply::Text(self.response_content.clone()))
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new("mock-model")
    }
}

fn respond(request: &CompletionRequest, content: String) -> CompletionResponse {
    let prompt_tokens: u32 = request
        .messages
        .iter()
        .map(|m| m.content.len() as u32 / 4)
        .sum();

    CompletionResponse {
        usage: Usage {
            prompt_tokens,
            completion_tokens: content.len() as u32 / 4,
        },
        content,
        finish_reason: FinishReason::Stop,
    }
}

#[async_trait]
impl LlmBackend for MockBackend {
    fn id(&self) -> &str {
        &self.model_id
    }

    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        if !self.available.load(Ordering::SeqCst) {
            return Err(LlmError::Unavailable("Mock backend disabled".to_string()));
        }

        match self.reply_for(&request) {
            MockReply::Text(content) => Ok(respond(&request, content)),
            MockReply::Delayed(delay, content) => {
                tokio::time::sleep(delay).await;
                Ok(respond(&request, content))
            }
            MockReply::Fail(reason) => Err(LlmError::RequestFailed(reason)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_backend() {
        let backend = MockBackend::new("test-model").with_response("Hello, world!");

        assert!(backend.is_available().await);
        assert_eq!(backend.call_count(), 0);

        let response = backend
            .complete(CompletionRequest::user("Hi"))
            .await
            .unwrap();

        assert_eq!(response.content, "Hello, world!");
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_unavailable() {
        let backend = MockBackend::new("test-model").with_available(false);

        assert!(!backend.is_available().await);

        let result = backend.complete(CompletionRequest::user("Hi")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_rules_match_final_user_message() {
        let backend = MockBackend::default()
            .on("60-80", MockReply::Fail("medium down".into()))
            .on("30-50", MockReply::Text("short one".into()));

        let short = backend
            .complete(CompletionRequest::user("write 30-50 words"))
            .await
            .unwrap();
        assert_eq!(short.content, "short one");

        let medium = backend
            .complete(CompletionRequest::user("write 60-80 words"))
            .await;
        assert!(matches!(medium, Err(LlmError::RequestFailed(_))));

        assert_eq!(backend.requests().len(), 2);
    }
}

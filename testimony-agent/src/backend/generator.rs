//! `generate(system_role, turns, user_input) -> text`
//!
//! Binds a backend to sampling settings and a per-call timeout. A timed-out
//! call is reported as a failure and is not retried here.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::traits::{CompletionRequest, FinishReason, LlmBackend, Message};
use crate::error::GenerationError;
use crate::transcript::Turn;

/// Sampling and timeout settings for one generator.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub timeout: Duration,
}

impl GeneratorConfig {
    /// Settings for the dependent stage calls.
    pub fn stage() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: Some(1024),
            timeout: Duration::from_secs(60),
        }
    }

    /// Settings for testimonial synthesis.
    pub fn synthesis() -> Self {
        Self {
            temperature: 0.8,
            max_tokens: Some(512),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// A backend plus the settings used for every call made through it.
#[derive(Clone)]
pub struct Generator {
    backend: Arc<dyn LlmBackend>,
    config: GeneratorConfig,
}

impl Generator {
    pub fn new(backend: Arc<dyn LlmBackend>, config: GeneratorConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Issue one generation call.
    ///
    /// `turns` become prior conversation messages; `user_input` is the new
    /// human message.
    pub async fn generate(
        &self,
        system_role: &str,
        turns: &[Turn],
        user_input: &str,
    ) -> Result<String, GenerationError> {
        let mut request = CompletionRequest::default()
            .with_system(system_role)
            .with_temperature(self.config.temperature);
        if let Some(max) = self.config.max_tokens {
            request = request.with_max_tokens(max);
        }
        for turn in turns {
            request = request.with_message(turn.to_message());
        }
        request = request.with_message(Message::user(user_input));

        let after_ms = self.config.timeout.as_millis() as u64;
        let completion = tokio::time::timeout(self.config.timeout, self.backend.complete(request))
            .await
            .map_err(|_| GenerationError::Timeout { after_ms })??;

        debug!(
            backend = self.backend.id(),
            prompt_tokens = completion.usage.prompt_tokens,
            completion_tokens = completion.usage.completion_tokens,
            total_tokens = completion.usage.total(),
            finish_reason = ?completion.finish_reason,
            "generation call completed"
        );
        if completion.finish_reason == FinishReason::Length {
            warn!(
                backend = self.backend.id(),
                max_tokens = ?self.config.max_tokens,
                "generation truncated at max_tokens"
            );
        }

        let text = normalize_output(&completion.content);
        if text.is_empty() {
            return Err(GenerationError::EmptyOutput);
        }
        Ok(text)
    }
}

/// Trim and drop a leading `AI:` speaker label.
fn normalize_output(raw: &str) -> String {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix("AI:")
        .map(str::trim_start)
        .unwrap_or(trimmed)
        .to_string()
}

//! Generative completion providers.
//!
//! The router treats the generative model as an opaque `prompt → text`
//! function with no retry semantics of its own; the router supplies the
//! timeout. This module defines that seam and ships an OpenAI-compatible
//! HTTP implementation plus a scripted mock for tests.

pub mod openai_compat;

use crate::error::LlmError;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub use openai_compat::OpenAiCompatibleProvider;

/// A single-shot text completion service.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Complete `prompt` and return the raw model text.
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;

    /// Return the model name, for logs.
    fn model_name(&self) -> &str;
}

/// Scripted provider for tests and offline use.
///
/// Returns queued responses in order, then the fallback response (if any),
/// then an error. An optional delay simulates a slow service.
pub struct MockCompletionProvider {
    responses: Mutex<VecDeque<Result<String, LlmError>>>,
    fallback: Option<String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl MockCompletionProvider {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            fallback: None,
            delay: None,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Create a provider that always returns the given text.
    pub fn with_response(text: &str) -> Self {
        Self {
            fallback: Some(text.to_string()),
            ..Self::new()
        }
    }

    /// Sleep for `delay` before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue a response to be returned by the next `complete` call.
    pub fn queue_response(&self, response: impl Into<String>) {
        if let Ok(mut queue) = self.responses.lock() {
            queue.push_back(Ok(response.into()));
        }
    }

    /// Queue an error to be returned by the next `complete` call.
    pub fn queue_error(&self, error: LlmError) {
        if let Ok(mut queue) = self.responses.lock() {
            queue.push_back(Err(error));
        }
    }

    /// Number of `complete` calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

impl Default for MockCompletionProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompletionProvider for MockCompletionProvider {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let queued = self.responses.lock().ok().and_then(|mut q| q.pop_front());
        match queued {
            Some(result) => result,
            None => self.fallback.clone().ok_or_else(|| LlmError::ApiRequest {
                message: "mock provider has no response queued".to_string(),
            }),
        }
    }

    fn model_name(&self) -> &str {
        "mock-model"
    }
}

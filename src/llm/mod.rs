//! LLM interface (§6 External Interfaces).
//!
//! Two callables are exposed: [`LlmClient::generate`] (plain text) and
//! [`LlmClient::generate_json`] (JSON mode, used by the router's planner
//! fallback, the SQL engine's grader, and the reranker's LLM-grading
//! fallback). A "grader" variant is a second, typically smaller, model
//! selected by constructing a distinct [`LlmClient`] and flagging it via
//! [`LlmClient::is_grader`].

use crate::error::{LlmError, Result};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// Default per-stage deadline for a plain-text generation call (§5).
pub const DEFAULT_GENERATE_TIMEOUT: Duration = Duration::from_secs(60);

/// A callable generative LLM, plus a JSON-mode variant. Every call must
/// honour cancellation at `deadline` (§5); synchronous implementations
/// enforce this by checking elapsed wall-clock time against the deadline
/// themselves, since the base crate has no mandatory async runtime.
pub trait LlmClient: Send + Sync {
    /// Generates plain text from a prompt and optional system message.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::GenerationFailed`] on a provider failure or
    /// [`LlmError::Timeout`] if `deadline` elapses first.
    fn generate(&self, prompt: &str, system: Option<&str>, deadline: Duration) -> Result<String>;

    /// Generates a JSON value from a prompt and optional system message.
    /// Implementations should request the provider's JSON mode where
    /// available; the default implementation parses [`Self::generate`]'s
    /// output as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::MalformedJson`] if the text is not valid JSON, or
    /// any error [`Self::generate`] can return.
    fn generate_json(&self, prompt: &str, system: Option<&str>, deadline: Duration) -> Result<Value> {
        let text = self.generate(prompt, system, deadline)?;
        serde_json::from_str(text.trim()).map_err(|e| LlmError::MalformedJson(e.to_string()).into())
    }

    /// True if this client is the smaller "grader" variant (§4.11, §4.14),
    /// used where the spec calls for a cheaper non-authoritative opinion.
    fn is_grader(&self) -> bool {
        false
    }
}

/// A queued, deterministic [`LlmClient`] for tests: responses are consumed
/// in FIFO order; once exhausted, [`Self::generate`] returns a canned
/// fallback string rather than failing, matching how a flaky provider is
/// expected to degrade gracefully rather than abort the request (§7 kind 5).
#[derive(Debug)]
pub struct MockLlm {
    text_responses: Mutex<VecDeque<String>>,
    json_responses: Mutex<VecDeque<Value>>,
    grader: bool,
    fallback_text: String,
}

impl MockLlm {
    /// Creates a mock with no queued responses; every call returns the
    /// fallback text until responses are queued.
    #[must_use]
    pub fn new() -> Self {
        Self {
            text_responses: Mutex::new(VecDeque::new()),
            json_responses: Mutex::new(VecDeque::new()),
            grader: false,
            fallback_text: "Xin lỗi, hiện tại tôi chưa thể trả lời câu hỏi này.".to_string(),
        }
    }

    /// Marks this mock as the grader variant.
    #[must_use]
    pub const fn as_grader(mut self) -> Self {
        self.grader = true;
        self
    }

    /// Queues a plain-text response to return on the next [`Self::generate`] call.
    #[must_use]
    pub fn with_text(self, text: impl Into<String>) -> Self {
        self.text_responses
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push_back(text.into());
        self
    }

    /// Queues a JSON response to return on the next [`Self::generate_json`] call.
    #[must_use]
    pub fn with_json(self, value: Value) -> Self {
        self.json_responses
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push_back(value);
        self
    }
}

impl Default for MockLlm {
    fn default() -> Self {
        Self::new()
    }
}

impl LlmClient for MockLlm {
    fn generate(&self, _prompt: &str, _system: Option<&str>, _deadline: Duration) -> Result<String> {
        let mut queue = self
            .text_responses
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(queue.pop_front().unwrap_or_else(|| self.fallback_text.clone()))
    }

    fn generate_json(&self, prompt: &str, system: Option<&str>, deadline: Duration) -> Result<Value> {
        let mut queue = self
            .json_responses
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(value) = queue.pop_front() {
            return Ok(value);
        }
        drop(queue);
        // Fall back to parsing a queued text response as JSON, matching the
        // default trait behaviour.
        let text = self.generate(prompt, system, deadline)?;
        serde_json::from_str(text.trim()).map_err(|e| LlmError::MalformedJson(e.to_string()).into())
    }

    fn is_grader(&self) -> bool {
        self.grader
    }
}

//! Request types for gateway generation calls.

use serde::{Deserialize, Serialize};

/// Scheduling priority for queued requests.
///
/// High-priority requests drain ahead of normal and low; within a band,
/// FIFO. Background preloads should use `Low` so they never starve
/// user-triggered work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Normal,
    Low,
}

/// A generation request. Immutable once submitted to the gateway.
///
/// Model, temperature, and max tokens default to the gateway
/// configuration when unset.
///
/// ```rust
/// # use heimdallr::{GenerateRequest, Priority};
/// let request = GenerateRequest::new("Explain ownership in Rust")
///     .context("You are a patient tutor.")
///     .component("lesson")
///     .priority(Priority::High);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// The prompt text.
    pub prompt: String,

    /// Optional system instructions sent ahead of the prompt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,

    /// Model override. Falls back to the configured default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Sampling temperature override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Maximum output tokens override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<usize>,

    /// End-user tag forwarded to the provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// Calling feature tag, used for usage attribution.
    pub component: String,

    /// Optional persona tag, used for usage attribution.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persona: Option<String>,

    /// Whether the response cache may be read or written for this
    /// request. When false, the cache is never touched.
    pub cache: bool,

    /// Scheduling priority in the concurrency queue.
    pub priority: Priority,
}

impl GenerateRequest {
    /// Create a request with the given prompt and defaults for the rest.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            context: None,
            model: None,
            temperature: None,
            max_tokens: None,
            user: None,
            component: "unattributed".to_string(),
            persona: None,
            cache: true,
            priority: Priority::Normal,
        }
    }

    /// Set system instructions.
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Override the model.
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Override the sampling temperature.
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Override the maximum output tokens.
    pub fn max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the end-user tag.
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Set the calling feature tag.
    pub fn component(mut self, component: impl Into<String>) -> Self {
        self.component = component.into();
        self
    }

    /// Set the persona tag.
    pub fn persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = Some(persona.into());
        self
    }

    /// Disable the response cache for this request.
    pub fn no_cache(mut self) -> Self {
        self.cache = false;
        self
    }

    /// Set the scheduling priority.
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Rough token estimate for admission control: ~4 chars per token
    /// of input plus the expected completion budget.
    pub fn estimated_tokens(&self, default_max_tokens: usize) -> u64 {
        let input_chars = self.prompt.len() + self.context.as_deref().map_or(0, str::len);
        let input = (input_chars / 4) as u64;
        let output = self.max_tokens.unwrap_or(default_max_tokens) as u64;
        input + output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let req = GenerateRequest::new("hello");
        assert!(req.cache);
        assert_eq!(req.priority, Priority::Normal);
        assert_eq!(req.component, "unattributed");
        assert!(req.model.is_none());
    }

    #[test]
    fn builder_setters() {
        let req = GenerateRequest::new("hello")
            .context("sys")
            .model("m-1")
            .temperature(0.2)
            .max_tokens(64)
            .component("chat")
            .persona("tutor")
            .no_cache()
            .priority(Priority::Low);
        assert_eq!(req.context.as_deref(), Some("sys"));
        assert_eq!(req.model.as_deref(), Some("m-1"));
        assert!(!req.cache);
        assert_eq!(req.priority, Priority::Low);
    }

    #[test]
    fn estimated_tokens_uses_default_output_budget() {
        let req = GenerateRequest::new("x".repeat(400));
        assert_eq!(req.estimated_tokens(500), 100 + 500);
        let capped = GenerateRequest::new("x".repeat(400)).max_tokens(10);
        assert_eq!(capped.estimated_tokens(500), 100 + 10);
    }

    #[test]
    fn priority_band_order() {
        assert!(Priority::High < Priority::Normal);
        assert!(Priority::Normal < Priority::Low);
    }
}

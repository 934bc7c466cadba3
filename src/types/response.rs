//! Response types for gateway generation calls.

use serde::{Deserialize, Serialize};

/// Token usage and estimated cost for a settled call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens consumed by the prompt and context.
    pub prompt_tokens: u64,
    /// Tokens generated in the completion.
    pub completion_tokens: u64,
    /// Sum of prompt and completion tokens.
    pub total_tokens: u64,
    /// Estimated cost in account currency, derived from configured
    /// per-1k token rates.
    pub estimated_cost: f64,
}

/// Response from a generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateResponse {
    /// Generated content.
    pub content: String,

    /// Token usage and estimated cost.
    pub usage: Usage,

    /// Model identifier actually used.
    pub model: String,

    /// True when the response was served from the cache.
    pub cached: bool,
}

/// Events emitted during streaming generation.
///
/// Chunks already delivered are never retracted; a failure after the
/// first chunk surfaces as an `Err` item terminating the stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
#[non_exhaustive]
pub enum StreamEvent {
    /// Incremental content chunk.
    #[serde(rename = "content")]
    Content(String),

    /// Generation complete. Usage is present when the provider reports it.
    #[serde(rename = "done")]
    Done { usage: Option<Usage> },
}

/// Result of a pre-flight admission check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Admission {
    /// Whether a request submitted now would be admitted.
    pub allowed: bool,
    /// Human-readable denial reason when not allowed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Admission {
    /// An allowed admission.
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    /// A denied admission with the given reason.
    pub fn denied(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
        }
    }
}

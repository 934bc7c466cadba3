//! Provider adapter boundary.
//!
//! The gateway core never speaks HTTP itself; it drives a [`Provider`]
//! implementation supplied at construction time. Adapters are required
//! to tag every failure with an [`ErrorKind`](crate::ErrorKind) — the
//! core decides retry behaviour from that tag alone, never from error
//! message text.

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use serde::{Deserialize, Serialize};

use crate::types::StreamEvent;
use crate::Result;

/// Role of a message in a provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single message in a provider call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderMessage {
    pub role: Role,
    pub content: String,
}

impl ProviderMessage {
    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// The fully-resolved outbound call, built by the gateway from a
/// request plus configured defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderCall {
    pub model: String,
    pub messages: Vec<ProviderMessage>,
    pub max_tokens: usize,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

/// Raw token counts reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// Response from a provider call, before cost attribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub content: String,
    pub usage: ProviderUsage,
    /// Model identifier the provider actually used.
    pub model: String,
}

/// The outbound provider adapter.
///
/// Failures must be returned as
/// [`GatewayError::Provider`](crate::GatewayError::Provider) with the
/// kind set at this boundary.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Short provider name for logs and metrics.
    fn name(&self) -> &str;

    /// Issue a non-streaming generation call.
    async fn generate(&self, call: &ProviderCall) -> Result<ProviderResponse>;

    /// Issue a streaming generation call.
    ///
    /// The stream yields content chunks and a terminal
    /// [`StreamEvent::Done`]; mid-stream failures surface as a single
    /// `Err` item.
    async fn generate_stream(
        &self,
        call: &ProviderCall,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>>;

    /// Minimal-cost probe verifying the provider connection works.
    async fn probe(&self) -> Result<()>;

    /// Rebuild any provider-internal state (clients, connections) after
    /// repeated probe failures. Default: no-op.
    async fn reinitialize(&self) -> Result<()> {
        Ok(())
    }
}

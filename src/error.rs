//! Heimdallr error types and the provider failure taxonomy.
//!
//! Every provider-originated failure carries an explicit [`ErrorKind`]
//! assigned by the provider adapter at the boundary. The gateway never
//! inspects error message text to decide retry behaviour; classification
//! is structural.
//!
//! The error type is `Clone` so a single settled result can be fanned
//! out to every caller attached to the same in-flight request.

use std::time::Duration;

/// Classification of a provider failure, assigned by the adapter.
///
/// Determines whether the retry policy makes a further attempt and
/// which cooldown applies before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Invalid or missing credentials. Never retried.
    Authentication,
    /// Malformed request, caller bug. Never retried.
    InvalidRequest,
    /// Provider-side throttling. Retried after a fixed cooldown.
    RateLimited,
    /// Billing or quota exhaustion. Retried after a long cooldown.
    QuotaExceeded,
    /// Provider-side fault (5xx). Retried with short backoff.
    ServerError,
    /// Connectivity failure or timeout. Retried with short backoff.
    NetworkError,
    /// Anything the adapter could not classify. Retried with default backoff.
    Unknown,
}

impl ErrorKind {
    /// Whether the retry policy may make a further attempt for this kind.
    ///
    /// `QuotaExceeded` is retryable with a long cooldown rather than
    /// terminal; see [`cooldown`](Self::cooldown).
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ErrorKind::Authentication | ErrorKind::InvalidRequest)
    }

    /// Fixed cooldown for kinds that impose one, overriding exponential
    /// backoff: 60s for `RateLimited`, 1h for `QuotaExceeded`.
    pub fn cooldown(&self) -> Option<Duration> {
        match self {
            ErrorKind::RateLimited => Some(Duration::from_secs(60)),
            ErrorKind::QuotaExceeded => Some(Duration::from_secs(3600)),
            _ => None,
        }
    }

    /// Stable label for metrics and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Authentication => "authentication",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::QuotaExceeded => "quota_exceeded",
            ErrorKind::ServerError => "server_error",
            ErrorKind::NetworkError => "network_error",
            ErrorKind::Unknown => "unknown",
        }
    }
}

/// Heimdallr error types.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    /// Failure from the provider adapter, tagged with its classification.
    #[error("provider error ({}): {message}", kind.as_str())]
    Provider {
        kind: ErrorKind,
        message: String,
        /// Provider-supplied hint for when to retry (e.g. from a 429).
        retry_after: Option<Duration>,
    },

    /// Admission denied before any provider call was made. Never retried.
    #[error("request rejected: {reason}")]
    RequestRejected { reason: String },

    /// The gateway is fast-failing because the provider is unhealthy.
    #[error("provider unavailable after {consecutive_failures} consecutive probe failures")]
    ProviderUnavailable { consecutive_failures: u32 },

    /// Mid-stream failure after chunks were already delivered.
    #[error("stream error: {0}")]
    Stream(String),

    /// Gateway misconfiguration detected at construction time.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Persistence backend failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization failure for persisted or exported state.
    #[error("JSON error: {0}")]
    Json(String),
}

impl GatewayError {
    /// Construct a provider error with the given classification.
    pub fn provider(kind: ErrorKind, message: impl Into<String>) -> Self {
        GatewayError::Provider {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    /// The failure classification, if this is a provider error.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            GatewayError::Provider { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Whether the retry policy may make a further attempt.
    ///
    /// Admission failures (`RequestRejected`, `ProviderUnavailable`) are
    /// never retryable events; only classified provider failures are.
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Provider { kind, .. } => kind.is_retryable(),
            _ => false,
        }
    }

    /// Provider-supplied retry hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            GatewayError::Provider { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Json(err.to_string())
    }
}

/// Result type alias for Heimdallr operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

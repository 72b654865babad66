//! Webhook Dispatch Error Types
//!
//! Every failure a dispatch call can end in. Nothing here is retried; the
//! caller decides whether to dispatch again.

use bytes::Bytes;
use std::time::Duration;

/// Result type alias for dispatch operations
pub type Result<T> = std::result::Result<T, DispatchError>;

/// Error types for webhook dispatch
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Descriptor rejected before any network activity
    #[error("Invalid webhook: {0}")]
    InvalidWebhook(String),

    /// Network, DNS or proxy failure before a response arrived
    #[error("Transport error: {0}")]
    Transport(String),

    /// Request exceeded the configured timeout
    #[error("Request timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    /// Token endpoint answered with a non-2xx status
    #[error("Authorization failed: token endpoint returned HTTP {status}")]
    Authorization { status: u16 },

    /// Token endpoint answered 2xx without a usable access token
    #[error("Authorization failed: unusable token response: {0}")]
    TokenDecode(String),

    /// Webhook target answered with a non-2xx status
    #[error("Webhook delivery failed with HTTP {status}")]
    Delivery { status: u16, body: Bytes },

    /// Caller cancelled the dispatch
    #[error("Dispatch cancelled")]
    Cancelled,
}

impl DispatchError {
    /// Token acquisition failed and delivery was never attempted
    pub fn is_authorization(&self) -> bool {
        matches!(self, Self::Authorization { .. } | Self::TokenDecode(_))
    }

    /// No HTTP response was received
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout { .. })
    }

    /// HTTP status observed from either endpoint, if any
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Authorization { status } | Self::Delivery { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Short label used for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidWebhook(_) => "invalid_webhook",
            Self::Transport(_) => "transport",
            Self::Timeout { .. } => "timeout",
            Self::Authorization { .. } => "authorization",
            Self::TokenDecode(_) => "token_decode",
            Self::Delivery { .. } => "delivery",
            Self::Cancelled => "cancelled",
        }
    }

    /// Map a reqwest send failure onto the transport variants
    pub(crate) fn from_send(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout { timeout }
        } else if err.is_builder() {
            Self::InvalidWebhook(err.to_string())
        } else if err.is_connect() {
            Self::Transport(format!("connection failed: {err}"))
        } else {
            Self::Transport(err.to_string())
        }
    }
}

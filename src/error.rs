//! Error types for the Slipstream SDK

use std::time::Duration;
use thiserror::Error;

/// SDK error types
///
/// `Clone` so that background failures can be delivered inside
/// [`TransportEvent::Error`](crate::events::TransportEvent::Error).
#[derive(Debug, Clone, Error)]
pub enum SdkError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Protocol error
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Transaction submission error
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Operation timed out
    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    /// All protocol fallbacks failed
    #[error("All protocols failed to connect")]
    AllProtocolsFailed,

    /// Rate limited
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Not connected
    #[error("Not connected to server")]
    NotConnected,

    /// Stream closed
    #[error("Stream closed")]
    StreamClosed,

    /// Token balance exhausted
    #[error("Insufficient tokens: {0}")]
    InsufficientTokens(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SdkError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        SdkError::Config(msg.into())
    }

    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        SdkError::Connection(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        SdkError::Auth(msg.into())
    }

    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        SdkError::Protocol(msg.into())
    }

    /// Create a transaction error
    pub fn transaction(msg: impl Into<String>) -> Self {
        SdkError::Transaction(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        SdkError::Internal(msg.into())
    }

    /// Stable, language-neutral error code
    pub fn code(&self) -> &'static str {
        match self {
            SdkError::Config(_) => "CONFIG",
            SdkError::Connection(_) => "CONNECTION",
            SdkError::Auth(_) => "AUTH",
            SdkError::Protocol(_) => "PROTOCOL",
            SdkError::Transaction(_) => "TRANSACTION",
            SdkError::Timeout(_) => "TIMEOUT",
            SdkError::AllProtocolsFailed => "ALL_PROTOCOLS_FAILED",
            SdkError::RateLimited(_) => "RATE_LIMITED",
            SdkError::NotConnected => "NOT_CONNECTED",
            SdkError::StreamClosed => "STREAM_CLOSED",
            SdkError::InsufficientTokens(_) => "INSUFFICIENT_TOKENS",
            SdkError::Internal(_) => "INTERNAL",
        }
    }

    /// Whether retrying the same operation later could succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SdkError::Connection(_)
                | SdkError::Timeout(_)
                | SdkError::RateLimited(_)
                | SdkError::NotConnected
                | SdkError::StreamClosed
        )
    }
}

impl From<reqwest::Error> for SdkError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SdkError::Timeout(Duration::from_secs(30))
        } else if e.is_connect() {
            SdkError::Connection(e.to_string())
        } else {
            SdkError::Protocol(e.to_string())
        }
    }
}

impl From<serde_json::Error> for SdkError {
    fn from(e: serde_json::Error) -> Self {
        SdkError::Protocol(format!("JSON error: {}", e))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SdkError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        SdkError::Connection(format!("WebSocket error: {}", e))
    }
}

impl From<std::io::Error> for SdkError {
    fn from(e: std::io::Error) -> Self {
        SdkError::Connection(format!("IO error: {}", e))
    }
}

/// Result type for SDK operations
pub type Result<T> = std::result::Result<T, SdkError>;

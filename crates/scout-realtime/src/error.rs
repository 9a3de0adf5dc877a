use std::time::Duration;

/// Failures of the realtime transport.
#[derive(Debug, thiserror::Error)]
pub enum RealtimeError {
    #[error("invalid endpoint {url}: {reason}")]
    InvalidEndpoint { url: String, reason: String },
    #[error("invalid handshake header {name}")]
    InvalidHeader { name: String },
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),
    #[error("handshake failed: {0}")]
    Handshake(String),
    #[error("channel is not connected")]
    NotConnected,
    #[error("write failed: {0}")]
    Send(String),
    #[error("failed to serialize message: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl RealtimeError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::InvalidEndpoint { .. } => "invalid_endpoint",
            Self::InvalidHeader { .. } => "invalid_header",
            Self::ConnectTimeout(_) => "connect_timeout",
            Self::Handshake(_) => "handshake",
            Self::NotConnected => "not_connected",
            Self::Send(_) => "send",
            Self::Serialize(_) => "serialize",
        }
    }
}

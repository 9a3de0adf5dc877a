use std::time::Duration;

/// Typed error hierarchy for control-plane HTTP calls.
/// Classifies failures as permanent (drop) or transient (retry by requeue).
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ControlPlaneError {
    // Permanent
    #[error("rejected by control plane ({status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("control plane URL not configured")]
    NotConfigured,
    #[error("invalid control plane URL: {0}")]
    InvalidUrl(String),
    #[error("invalid response body: {0}")]
    Decode(String),

    // Transient
    #[error("control plane server error {status}: {body}")]
    Server { status: u16, body: String },
    #[error("unexpected status {status}")]
    UnexpectedStatus { status: u16 },
    #[error("network error: {0}")]
    Network(String),
    #[error("timeout after {0:?}")]
    Timeout(Duration),
}

impl ControlPlaneError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Server { .. } | Self::UnexpectedStatus { .. } | Self::Network(_) | Self::Timeout(_)
        )
    }

    pub fn is_permanent(&self) -> bool {
        !self.is_retryable()
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Rejected { .. } => "rejected",
            Self::NotConfigured => "not_configured",
            Self::InvalidUrl(_) => "invalid_url",
            Self::Decode(_) => "decode",
            Self::Server { .. } => "server_error",
            Self::UnexpectedStatus { .. } => "unexpected_status",
            Self::Network(_) => "network_error",
            Self::Timeout(_) => "timeout",
        }
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Rejected { status, .. }
            | Self::Server { status, .. }
            | Self::UnexpectedStatus { status } => Some(*status),
            _ => None,
        }
    }

    /// Classify a non-2xx HTTP status code.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            400..=499 => Self::Rejected { status, body },
            500..=599 => Self::Server { status, body },
            _ => Self::UnexpectedStatus { status },
        }
    }
}

/// Failure reported by an inbound-message or command handler.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<CollaboratorError> for HandlerError {
    fn from(err: CollaboratorError) -> Self {
        Self(err.to_string())
    }
}

/// Failure inside an external collaborator (login or site automation).
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorError {
    #[error("not logged in")]
    NotLoggedIn,
    #[error("login failed: {0}")]
    LoginFailed(String),
    #[error("{operation} is not supported by this collaborator")]
    Unsupported { operation: String },
    #[error("invalid parameters: {0}")]
    InvalidParams(String),
    #[error("site automation failed: {0}")]
    Site(String),
}

impl CollaboratorError {
    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert!(ControlPlaneError::from_status(400, "bad".into()).is_permanent());
        assert!(ControlPlaneError::from_status(404, "missing".into()).is_permanent());
        assert!(ControlPlaneError::from_status(429, "slow down".into()).is_permanent());
        assert!(ControlPlaneError::from_status(500, "internal".into()).is_retryable());
        assert!(ControlPlaneError::from_status(503, "unavailable".into()).is_retryable());
        assert!(ControlPlaneError::from_status(302, String::new()).is_retryable());
    }

    #[test]
    fn transport_failures_are_retryable() {
        assert!(ControlPlaneError::Network("reset".into()).is_retryable());
        assert!(ControlPlaneError::Timeout(Duration::from_secs(30)).is_retryable());
    }

    #[test]
    fn configuration_and_decode_are_permanent() {
        assert!(ControlPlaneError::NotConfigured.is_permanent());
        assert!(ControlPlaneError::Decode("eof".into()).is_permanent());
    }

    #[test]
    fn status_accessor() {
        assert_eq!(ControlPlaneError::from_status(503, String::new()).status(), Some(503));
        assert_eq!(ControlPlaneError::Network("x".into()).status(), None);
    }

    #[test]
    fn error_kind_strings() {
        assert_eq!(ControlPlaneError::from_status(400, String::new()).error_kind(), "rejected");
        assert_eq!(ControlPlaneError::from_status(502, String::new()).error_kind(), "server_error");
        assert_eq!(ControlPlaneError::Timeout(Duration::ZERO).error_kind(), "timeout");
    }

    #[test]
    fn handler_error_from_collaborator() {
        let err: HandlerError = CollaboratorError::unsupported("search_candidates").into();
        assert_eq!(err.to_string(), "search_candidates is not supported by this collaborator");
    }
}

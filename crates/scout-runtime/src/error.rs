use scout_core::CollaboratorError;

/// Failures that end an orchestrator run.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("login failed: {0}")]
    Login(#[source] CollaboratorError),
    #[error("orchestrator is already running")]
    AlreadyRunning,
    #[error("orchestrator has been stopped")]
    Stopped,
}

impl RuntimeError {
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Login(_) => "login",
            Self::AlreadyRunning => "already_running",
            Self::Stopped => "stopped",
        }
    }
}

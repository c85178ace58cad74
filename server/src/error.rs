use thiserror::Error;

/// Failures raised while serving a peer. Any of these ends the session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("Already connected to a gate.")]
    AlreadyAssociated,

    #[error("Gate not found.")]
    GateNotFound(String),

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("gate registry is unavailable")]
    RegistryUnavailable,
}

impl RelayError {
    /// Stable error code sent to clients.
    pub fn code(&self) -> &'static str {
        match self {
            RelayError::InvalidRequest(_) => "invalid_request",
            RelayError::AlreadyAssociated => "already_associated",
            RelayError::GateNotFound(_) => "gate_not_found",
            RelayError::UnknownAction(_) => "unknown_action",
            RelayError::Transport(_) => "transport_error",
            RelayError::RegistryUnavailable => "registry_unavailable",
        }
    }
}

pub type RelayResult<T> = Result<T, RelayError>;

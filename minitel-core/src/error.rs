use crate::throttle::TransmissionFailure;
use minitel_io::{LinkError, ProbeError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("link unavailable: {0}")]
    LinkUnavailable(#[source] LinkError),

    #[error("no link configuration confirmed after {cycles} probe cycle(s)")]
    ProbeExhausted { cycles: usize },

    #[error(transparent)]
    Transmission(#[from] TransmissionFailure),

    #[error("{collaborator} failed: {message}")]
    CollaboratorFailure {
        collaborator: &'static str,
        message: String,
    },
}

impl SessionError {
    pub fn collaborator(collaborator: &'static str, err: impl std::fmt::Display) -> Self {
        SessionError::CollaboratorFailure {
            collaborator,
            message: err.to_string(),
        }
    }

    /// The link itself is gone; only a reconfiguration can help.
    pub fn is_link_lost(&self) -> bool {
        matches!(self, SessionError::LinkUnavailable(_))
    }
}

impl From<LinkError> for SessionError {
    fn from(err: LinkError) -> Self {
        SessionError::LinkUnavailable(err)
    }
}

impl From<ProbeError> for SessionError {
    fn from(err: ProbeError) -> Self {
        match err {
            ProbeError::Exhausted { cycles } => SessionError::ProbeExhausted { cycles },
            ProbeError::Unavailable(e) => SessionError::LinkUnavailable(e),
            ProbeError::NoCandidates => SessionError::ProbeExhausted { cycles: 0 },
        }
    }
}

use std::time::Duration;

use thiserror::Error;

use crate::gateway::guidance;
use crate::gateway::{Endpoint, Failure, Supplement};

/// Everything that can go wrong during one YOURLS API exchange.
///
/// `Display` renders the exact message shown to the user, so the variants
/// carry text that has already been stripped of markup.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Request timed out")]
    Timeout(Duration),

    #[error("Invalid response from Server: {text}")]
    MalformedResponse { text: String },

    #[error("Error: Server returned status {status} ({reason})")]
    HttpStatus { status: u16, reason: String },

    /// Connection-level failure: DNS, TLS, refused connection, unusable URL.
    /// Reported as status 0, like a browser XHR would.
    #[error("Error: Server returned status 0 ()")]
    Transport { detail: String },
}

/// Coarse classification of a [`GatewayError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Timeout,
    MalformedResponse,
    HttpStatus(u16),
    Transport,
}

impl GatewayError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Timeout(_) => FailureKind::Timeout,
            Self::MalformedResponse { .. } => FailureKind::MalformedResponse,
            Self::HttpStatus { status, .. } => FailureKind::HttpStatus(*status),
            Self::Transport { .. } => FailureKind::Transport,
        }
    }

    /// HTTP status as the user sees it; 0 for transport failures.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            Self::Transport { .. } => Some(0),
            _ => None,
        }
    }

    pub fn supplement(&self, endpoint: &Endpoint) -> Supplement {
        match self {
            Self::Timeout(_) => Supplement::default(),
            Self::MalformedResponse { .. } => Supplement {
                text: guidance::OUTDATED_SERVER.to_string(),
                links: vec![],
            },
            Self::HttpStatus { status, .. } => guidance::for_status(*status, endpoint),
            Self::Transport { .. } => guidance::for_status(0, endpoint),
        }
    }

    pub fn into_failure(self, endpoint: &Endpoint) -> Failure {
        Failure {
            message: self.to_string(),
            supplement: self.supplement(endpoint),
        }
    }
}

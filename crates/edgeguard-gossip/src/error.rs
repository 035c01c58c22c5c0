//! Gossip error types.

use edgeguard_cluster::RegistryError;
use thiserror::Error;

/// Errors that can occur while signing, sending or receiving gossip.
#[derive(Debug, Error)]
pub enum GossipError {
    #[error("hmac secret is not available")]
    MissingSecret,

    #[error("invalid hmac secret: {0}")]
    InvalidSecret(String),

    #[error("hmac mismatch")]
    Signature,

    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("message claims to come from this node ({0})")]
    SelfSourced(String),

    #[error("encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("peer answered {0}")]
    Status(u16),

    #[error("invalid gossip config: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl GossipError {
    /// Whether resending the same message might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            GossipError::Transport(_) => true,
            GossipError::Status(code) => *code >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for GossipError {
    fn from(e: reqwest::Error) -> Self {
        GossipError::Transport(e.to_string())
    }
}

pub type GossipResult<T> = Result<T, GossipError>;

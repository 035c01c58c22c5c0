//! Error types for the verdict store.

use thiserror::Error;

/// Result type alias for verdict store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur when writing to the verdict store.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("node {0} cannot record a verdict about itself")]
    SelfVerdict(String),

    #[error("empty address for {0}")]
    EmptyAddress(&'static str),
}

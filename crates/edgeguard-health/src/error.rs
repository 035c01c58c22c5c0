//! Health checker error types.

use thiserror::Error;

/// Invalid check or plugin configuration. Always fatal at startup.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid plugin spec {input:?}: {reason}")]
    Parse { input: String, reason: String },

    #[error("unknown plugin kind: {0}")]
    UnknownKind(String),

    #[error("no health check plugins configured")]
    EmptyPluginSet,

    #[error("plugin {plugin} weight {weight} is outside (0, 1]")]
    WeightOutOfRange { plugin: String, weight: f64 },

    #[error("plugin weights sum to {0}, expected 1")]
    WeightSum(f64),

    #[error("duplicate plugin: {0}")]
    DuplicatePlugin(String),

    #[error("{0} must be positive")]
    NonPositive(String),

    #[error("score line {0} is outside (0, 100]")]
    ScoreLine(f64),

    #[error("plugin {plugin}: {reason}")]
    Client { plugin: String, reason: String },
}

/// Why a single probe attempt failed. Never escalated: a failed probe
/// scores 0.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("timed out")]
    Timeout,

    #[error("request failed: {0}")]
    Request(String),

    #[error("unexpected status {0}")]
    Status(u16),

    #[error("credentials unavailable: {0}")]
    Credentials(String),
}

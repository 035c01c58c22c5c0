//! Gossip loop settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::GossipError;

/// Well-known port every node's gossip server listens on.
pub const DEFAULT_GOSSIP_PORT: u16 = 51005;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GossipConfig {
    pub port: u16,
    pub period_secs: u64,
    /// Per-request timeout.
    pub timeout_secs: u64,
    /// Maximum attempts per peer per cycle.
    pub retries: u32,
    /// Maximum pushes in flight at once.
    pub concurrency: usize,
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_GOSSIP_PORT,
            period_secs: 10,
            timeout_secs: 3,
            retries: 1,
            concurrency: 16,
        }
    }
}

impl GossipConfig {
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Collect every problem with these settings.
    pub fn validate(&self) -> Vec<GossipError> {
        let mut errors = Vec::new();
        let mut require = |ok: bool, what: &str| {
            if !ok {
                errors.push(GossipError::InvalidConfig(format!("{what} must be positive")));
            }
        };
        require(self.port != 0, "gossip port");
        require(self.period_secs > 0, "gossip period");
        require(self.timeout_secs > 0, "gossip timeout");
        require(self.retries > 0, "gossip retries");
        require(self.concurrency > 0, "gossip concurrency");
        errors
    }
}

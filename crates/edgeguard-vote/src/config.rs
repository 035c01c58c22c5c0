//! Vote loop settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VoteConfigError {
    #[error("{0} must be positive")]
    NonPositive(&'static str),

    #[error("vote timeout {timeout}s must exceed gossip period {gossip_period}s")]
    TimeoutTooShort { timeout: u64, gossip_period: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoteConfig {
    pub period_secs: u64,
    /// Maximum age of a remote verdict that still counts.
    pub timeout_secs: u64,
}

impl Default for VoteConfig {
    fn default() -> Self {
        Self {
            period_secs: 10,
            timeout_secs: 60,
        }
    }
}

impl VoteConfig {
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Collect every problem with these settings. A remote verdict is
    /// refreshed once per gossip period, so the timeout has to be longer.
    pub fn validate(&self, gossip_period_secs: u64) -> Vec<VoteConfigError> {
        let mut errors = Vec::new();
        if self.period_secs == 0 {
            errors.push(VoteConfigError::NonPositive("vote period"));
        }
        if self.timeout_secs == 0 {
            errors.push(VoteConfigError::NonPositive("vote timeout"));
        } else if self.timeout_secs <= gossip_period_secs {
            errors.push(VoteConfigError::TimeoutTooShort {
                timeout: self.timeout_secs,
                gossip_period: gossip_period_secs,
            });
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid_against_default_gossip_period() {
        assert!(VoteConfig::default().validate(10).is_empty());
    }

    #[test]
    fn timeout_must_exceed_gossip_period() {
        let config = VoteConfig {
            timeout_secs: 10,
            ..Default::default()
        };
        assert_eq!(
            config.validate(10),
            vec![VoteConfigError::TimeoutTooShort {
                timeout: 10,
                gossip_period: 10
            }]
        );
        assert!(config.validate(9).is_empty());
    }

    #[test]
    fn zero_values_rejected() {
        let config = VoteConfig {
            period_secs: 0,
            timeout_secs: 0,
        };
        assert_eq!(config.validate(10).len(), 2);
    }
}

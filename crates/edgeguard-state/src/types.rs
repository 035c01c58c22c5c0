//! Domain types for the verdict store.
//!
//! `CheckDetail` is the value stored per (checker, checked) pair and is
//! also the unit carried on the gossip wire. `Verdict` is the flattened,
//! owned view handed out to readers.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Address of a node (its InternalIP, or name when no address is known).
pub type NodeAddress = String;

/// One checker's judgement about one peer.
///
/// `time` is a Unix timestamp in seconds. For remote rows it is always
/// the local receive time, never the sender's clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckDetail {
    pub normal: bool,
    pub time: i64,
}

impl CheckDetail {
    pub fn new(normal: bool, time: i64) -> Self {
        Self { normal, time }
    }

    /// Age of this detail relative to `now`, in seconds.
    pub fn age(&self, now: i64) -> i64 {
        now - self.time
    }
}

/// All details reported by one checker, keyed by checked address.
///
/// A `BTreeMap` keeps iteration (and therefore JSON encoding) ordered,
/// which the gossip HMAC depends on.
pub type CheckDetails = BTreeMap<NodeAddress, CheckDetail>;

/// Full store contents: checker → checked → detail.
pub type VerdictTable = BTreeMap<NodeAddress, CheckDetails>;

/// A single attributed verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub checker: NodeAddress,
    pub checked: NodeAddress,
    pub normal: bool,
    pub observed_at: i64,
}

impl Verdict {
    pub fn from_detail(checker: &str, checked: &str, detail: CheckDetail) -> Self {
        Self {
            checker: checker.to_string(),
            checked: checked.to_string(),
            normal: detail.normal,
            observed_at: detail.time,
        }
    }
}

/// Current Unix time in seconds.
pub fn epoch_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_detail_wire_shape() {
        let detail = CheckDetail::new(true, 1_700_000_000);
        let json = serde_json::to_string(&detail).unwrap();
        assert_eq!(json, r#"{"normal":true,"time":1700000000}"#);
    }

    #[test]
    fn check_details_encode_in_key_order() {
        let mut details = CheckDetails::new();
        details.insert("10.0.0.3".to_string(), CheckDetail::new(false, 5));
        details.insert("10.0.0.1".to_string(), CheckDetail::new(true, 5));

        let json = serde_json::to_string(&details).unwrap();
        assert!(json.find("10.0.0.1").unwrap() < json.find("10.0.0.3").unwrap());
    }

    #[test]
    fn age_is_relative_to_now() {
        let detail = CheckDetail::new(true, 100);
        assert_eq!(detail.age(161), 61);
    }
}

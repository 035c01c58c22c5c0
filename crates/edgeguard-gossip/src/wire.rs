//! Gossip wire message.

use edgeguard_state::{CheckDetails, NodeAddress, epoch_secs};
use serde::{Deserialize, Serialize};

use crate::error::{GossipError, GossipResult};
use crate::signer;

/// One node's verdict row, signed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GossipMessage {
    #[serde(rename = "sourceIP")]
    pub source_ip: NodeAddress,
    #[serde(rename = "checkDetail", default)]
    pub check_detail: CheckDetails,
    #[serde(default)]
    pub hmac: String,
}

/// The signed part of a message: everything except the signature.
/// Map keys are ordered, so the encoding is stable across nodes.
#[derive(Serialize)]
struct SignedFields<'a> {
    #[serde(rename = "sourceIP")]
    source_ip: &'a str,
    #[serde(rename = "checkDetail")]
    check_detail: &'a CheckDetails,
}

fn signed_bytes(source_ip: &str, check_detail: &CheckDetails) -> GossipResult<Vec<u8>> {
    Ok(serde_json::to_vec(&SignedFields {
        source_ip,
        check_detail,
    })?)
}

impl GossipMessage {
    /// Build and sign a message for `source_ip`'s row.
    pub fn signed(key: &[u8], source_ip: &str, check_detail: CheckDetails) -> GossipResult<Self> {
        let hmac = signer::sign(key, &signed_bytes(source_ip, &check_detail)?)?;
        Ok(Self {
            source_ip: source_ip.to_string(),
            check_detail,
            hmac,
        })
    }

    pub fn decode(body: &[u8]) -> GossipResult<Self> {
        let message: Self =
            serde_json::from_slice(body).map_err(|e| GossipError::Malformed(e.to_string()))?;
        if message.source_ip.is_empty() {
            return Err(GossipError::Malformed("empty sourceIP".to_string()));
        }
        Ok(message)
    }

    pub fn verify(&self, key: &[u8]) -> GossipResult<()> {
        signer::verify(key, &signed_bytes(&self.source_ip, &self.check_detail)?, &self.hmac)
    }

    /// Consume the message, replacing every timestamp with the local
    /// receive time.
    pub fn into_received(self) -> (NodeAddress, CheckDetails) {
        let now = epoch_secs();
        let mut details = self.check_detail;
        for detail in details.values_mut() {
            detail.time = now;
        }
        (self.source_ip, details)
    }
}

//! HMAC-SHA256 signing of gossip payloads.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{GossipError, GossipResult};

type HmacSha256 = Hmac<Sha256>;

/// Hex-encoded HMAC-SHA256 of `payload` under `key`.
pub fn sign(key: &[u8], payload: &[u8]) -> GossipResult<String> {
    let mut mac = mac(key)?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Check a hex-encoded signature in constant time.
pub fn verify(key: &[u8], payload: &[u8], signature: &str) -> GossipResult<()> {
    let expected = hex::decode(signature.trim()).map_err(|_| GossipError::Signature)?;
    let mut mac = mac(key)?;
    mac.update(payload);
    mac.verify_slice(&expected).map_err(|_| GossipError::Signature)
}

fn mac(key: &[u8]) -> GossipResult<HmacSha256> {
    if key.is_empty() {
        return Err(GossipError::MissingSecret);
    }
    HmacSha256::new_from_slice(key).map_err(|e| GossipError::InvalidSecret(e.to_string()))
}

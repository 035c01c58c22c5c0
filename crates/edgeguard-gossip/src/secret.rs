//! Cluster-shared HMAC secret, cached between reads.

use std::sync::{Arc, RwLock};

use edgeguard_cluster::{CONFIG_NAMESPACE, HMAC_SECRET, HMAC_SECRET_KEY, NodeRegistry};
use tracing::{debug, warn};

use crate::error::{GossipError, GossipResult};

/// Reads `kube-system/hmac-config` and keeps the last good key.
///
/// A secret that is gone or empty clears the cache; a registry outage
/// keeps serving the cached key.
pub struct SecretCache {
    registry: Arc<dyn NodeRegistry>,
    key: RwLock<Option<Arc<[u8]>>>,
}

impl SecretCache {
    pub fn new(registry: Arc<dyn NodeRegistry>) -> Self {
        Self {
            registry,
            key: RwLock::new(None),
        }
    }

    /// Cached key, if any.
    pub fn current(&self) -> Option<Arc<[u8]>> {
        self.key.read().expect("secret cache lock").clone()
    }

    /// Re-read the secret from the registry.
    pub async fn refresh(&self) -> GossipResult<Arc<[u8]>> {
        let data = match self.registry.get_secret(CONFIG_NAMESPACE, HMAC_SECRET).await {
            Ok(data) => data,
            Err(e) if e.is_not_found() => {
                self.clear();
                return Err(GossipError::MissingSecret);
            }
            Err(e) => {
                return match self.current() {
                    Some(key) => {
                        warn!(error = %e, "hmac secret read failed, using cached key");
                        Ok(key)
                    }
                    None => Err(e.into()),
                };
            }
        };

        match data.get(HMAC_SECRET_KEY).filter(|k| !k.is_empty()) {
            Some(bytes) => {
                let key: Arc<[u8]> = Arc::from(bytes.as_slice());
                let mut cached = self.key.write().expect("secret cache lock");
                if cached.as_deref() != Some(&*key) {
                    debug!("hmac secret loaded");
                }
                *cached = Some(Arc::clone(&key));
                Ok(key)
            }
            None => {
                self.clear();
                Err(GossipError::MissingSecret)
            }
        }
    }

    /// Cached key, falling back to a registry read when the cache is empty.
    pub async fn get(&self) -> GossipResult<Arc<[u8]>> {
        match self.current() {
            Some(key) => Ok(key),
            None => self.refresh().await,
        }
    }

    fn clear(&self) {
        let mut cached = self.key.write().expect("secret cache lock");
        if cached.take().is_some() {
            warn!("hmac secret disappeared, gossip disabled until it returns");
        }
    }
}

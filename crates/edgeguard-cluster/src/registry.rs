//! The control-plane boundary.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::RegistryResult;
use crate::node::NodeInfo;

/// Read/write access to the cluster's node registry.
///
/// Reads return [`RegistryError::NotFound`](crate::RegistryError::NotFound)
/// for missing objects so callers can apply permissive defaults.
/// Writes may fail with `Conflict` when another node updated the same
/// object first; callers retry on their next cycle.
#[async_trait]
pub trait NodeRegistry: Send + Sync {
    async fn list_nodes(&self) -> RegistryResult<Vec<NodeInfo>>;

    async fn get_node(&self, name: &str) -> RegistryResult<NodeInfo>;

    /// String data of a configuration object.
    async fn get_config_map(
        &self,
        namespace: &str,
        name: &str,
    ) -> RegistryResult<BTreeMap<String, String>>;

    /// Decoded data of a secret object.
    async fn get_secret(
        &self,
        namespace: &str,
        name: &str,
    ) -> RegistryResult<BTreeMap<String, Vec<u8>>>;

    async fn set_annotation(&self, node: &str, key: &str, value: &str) -> RegistryResult<()>;

    async fn remove_annotation(&self, node: &str, key: &str) -> RegistryResult<()>;

    /// Remove every taint matching `key`/`effect`. Returns whether any was removed.
    async fn remove_taint(&self, node: &str, key: &str, effect: &str) -> RegistryResult<bool>;
}

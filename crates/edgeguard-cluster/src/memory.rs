//! In-process node registry.
//!
//! Holds nodes, config maps and secrets in memory. Used by tests across
//! the workspace to stand in for the control plane, including simulated
//! outages and write conflicts.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{RegistryError, RegistryResult};
use crate::node::NodeInfo;
use crate::registry::NodeRegistry;

#[derive(Default)]
struct Inner {
    nodes: BTreeMap<String, NodeInfo>,
    config_maps: HashMap<(String, String), BTreeMap<String, String>>,
    secrets: HashMap<(String, String), BTreeMap<String, Vec<u8>>>,
    unavailable: bool,
    conflict_writes: bool,
    config_map_unavailable: bool,
    latency: Duration,
    writes: usize,
}

/// Thread-safe in-memory registry.
#[derive(Clone, Default)]
pub struct MemoryRegistry {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_node(&self, node: NodeInfo) {
        let mut inner = self.inner.write().expect("registry lock");
        inner.nodes.insert(node.name.clone(), node);
    }

    pub fn remove_node(&self, name: &str) -> bool {
        let mut inner = self.inner.write().expect("registry lock");
        inner.nodes.remove(name).is_some()
    }

    pub fn insert_config_map(&self, namespace: &str, name: &str, data: BTreeMap<String, String>) {
        let mut inner = self.inner.write().expect("registry lock");
        inner
            .config_maps
            .insert((namespace.to_string(), name.to_string()), data);
    }

    pub fn insert_secret(&self, namespace: &str, name: &str, data: BTreeMap<String, Vec<u8>>) {
        let mut inner = self.inner.write().expect("registry lock");
        inner
            .secrets
            .insert((namespace.to_string(), name.to_string()), data);
    }

    /// Current copy of a node.
    pub fn node(&self, name: &str) -> Option<NodeInfo> {
        let inner = self.inner.read().expect("registry lock");
        inner.nodes.get(name).cloned()
    }

    /// Make every call fail with `Unavailable` until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.write().expect("registry lock").unavailable = unavailable;
    }

    /// Make every write fail with `Conflict` until reset.
    pub fn set_conflict_writes(&self, conflict: bool) {
        self.inner.write().expect("registry lock").conflict_writes = conflict;
    }

    /// Make only config map reads fail with `Unavailable` until reset.
    pub fn set_config_map_unavailable(&self, unavailable: bool) {
        self.inner.write().expect("registry lock").config_map_unavailable = unavailable;
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.inner.write().expect("registry lock").latency = latency;
    }

    /// Number of successful mutating calls so far.
    pub fn write_count(&self) -> usize {
        self.inner.read().expect("registry lock").writes
    }

    async fn pause(&self) {
        let latency = self.inner.read().expect("registry lock").latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    fn read<T>(&self, f: impl FnOnce(&Inner) -> RegistryResult<T>) -> RegistryResult<T> {
        let inner = self.inner.read().expect("registry lock");
        if inner.unavailable {
            return Err(RegistryError::Unavailable("memory registry offline".to_string()));
        }
        f(&inner)
    }

    fn write_node<T>(
        &self,
        name: &str,
        f: impl FnOnce(&mut NodeInfo) -> T,
    ) -> RegistryResult<T> {
        let mut inner = self.inner.write().expect("registry lock");
        if inner.unavailable {
            return Err(RegistryError::Unavailable("memory registry offline".to_string()));
        }
        if inner.conflict_writes {
            return Err(RegistryError::Conflict(format!("node {name}")));
        }
        let node = inner
            .nodes
            .get_mut(name)
            .ok_or_else(|| RegistryError::NotFound(format!("node {name}")))?;
        let result = f(node);
        inner.writes += 1;
        Ok(result)
    }
}

#[async_trait]
impl NodeRegistry for MemoryRegistry {
    async fn list_nodes(&self) -> RegistryResult<Vec<NodeInfo>> {
        self.pause().await;
        self.read(|inner| Ok(inner.nodes.values().cloned().collect()))
    }

    async fn get_node(&self, name: &str) -> RegistryResult<NodeInfo> {
        self.pause().await;
        self.read(|inner| {
            inner
                .nodes
                .get(name)
                .cloned()
                .ok_or_else(|| RegistryError::NotFound(format!("node {name}")))
        })
    }

    async fn get_config_map(
        &self,
        namespace: &str,
        name: &str,
    ) -> RegistryResult<BTreeMap<String, String>> {
        self.pause().await;
        self.read(|inner| {
            if inner.config_map_unavailable {
                return Err(RegistryError::Unavailable(format!(
                    "configmap {namespace}/{name} unreadable"
                )));
            }
            inner
                .config_maps
                .get(&(namespace.to_string(), name.to_string()))
                .cloned()
                .ok_or_else(|| RegistryError::NotFound(format!("configmap {namespace}/{name}")))
        })
    }

    async fn get_secret(
        &self,
        namespace: &str,
        name: &str,
    ) -> RegistryResult<BTreeMap<String, Vec<u8>>> {
        self.pause().await;
        self.read(|inner| {
            inner
                .secrets
                .get(&(namespace.to_string(), name.to_string()))
                .cloned()
                .ok_or_else(|| RegistryError::NotFound(format!("secret {namespace}/{name}")))
        })
    }

    async fn set_annotation(&self, node: &str, key: &str, value: &str) -> RegistryResult<()> {
        self.pause().await;
        self.write_node(node, |n| {
            n.annotations.insert(key.to_string(), value.to_string());
        })
    }

    async fn remove_annotation(&self, node: &str, key: &str) -> RegistryResult<()> {
        self.pause().await;
        self.write_node(node, |n| {
            n.annotations.remove(key);
        })
    }

    async fn remove_taint(&self, node: &str, key: &str, effect: &str) -> RegistryResult<bool> {
        self.pause().await;
        self.write_node(node, |n| {
            let before = n.taints.len();
            n.taints.retain(|t| !t.matches(key, effect));
            n.taints.len() != before
        })
    }
}

//! Peer topology — which nodes this node is responsible for checking.
//!
//! The resolver reads the local node, the zone-partitioning toggle and
//! the node list, then derives a `PeerSet`. The last successfully
//! resolved topology is cached; a failed sync leaves it untouched so
//! the other loops keep working from stale-but-valid data.

use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, RwLock};

use edgeguard_state::{NodeAddress, epoch_secs};
use tracing::{debug, info};

use crate::error::RegistryResult;
use crate::node::*;
use crate::registry::NodeRegistry;

/// Deduplicated, ordered set of peer addresses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerSet {
    peers: BTreeSet<NodeAddress>,
}

impl PeerSet {
    pub fn contains(&self, address: &str) -> bool {
        self.peers.contains(address)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeAddress> {
        self.peers.iter()
    }

    /// Every peer except `address` (used to skip self).
    pub fn excluding(&self, address: &str) -> Vec<NodeAddress> {
        self.peers
            .iter()
            .filter(|p| p.as_str() != address)
            .cloned()
            .collect()
    }

    pub fn to_hash_set(&self) -> HashSet<NodeAddress> {
        self.peers.iter().cloned().collect()
    }
}

impl FromIterator<NodeAddress> for PeerSet {
    fn from_iter<I: IntoIterator<Item = NodeAddress>>(iter: I) -> Self {
        Self {
            peers: iter.into_iter().filter(|p| !p.is_empty()).collect(),
        }
    }
}

/// A resolved view of the cluster from this node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    pub local_name: String,
    pub local_address: NodeAddress,
    /// Zone used for partitioning, if partitioning applied.
    pub zone: Option<String>,
    pub peers: PeerSet,
    pub resolved_at: i64,
}

/// Resolves and caches the peer topology.
pub struct TopologyResolver {
    registry: Arc<dyn NodeRegistry>,
    node_name: String,
    current: RwLock<Option<Topology>>,
}

impl TopologyResolver {
    pub fn new(registry: Arc<dyn NodeRegistry>, node_name: &str) -> Self {
        Self {
            registry,
            node_name: node_name.to_string(),
            current: RwLock::new(None),
        }
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    /// Last successfully resolved topology.
    pub fn current(&self) -> Option<Topology> {
        self.current.read().expect("topology lock").clone()
    }

    /// Read the registry and rebuild the topology.
    ///
    /// The local address is always the registry's address for this node,
    /// since that is the address every peer knows it by.
    ///
    /// On success the cache is replaced. On error the cache is kept and
    /// the error returned; a missing zone config map is not an error.
    pub async fn resolve(&self) -> RegistryResult<Topology> {
        let local = self.registry.get_node(&self.node_name).await?;

        let partitioned = match self
            .registry
            .get_config_map(CONFIG_NAMESPACE, ZONE_CONFIG_MAP)
            .await
        {
            Ok(data) => zone_partitioning_enabled(&data),
            Err(e) if e.is_not_found() => false,
            Err(e) => return Err(e),
        };

        let nodes = self.registry.list_nodes().await?;
        let (zone, peers) = select_peers(&local, &nodes, partitioned);

        let topology = Topology {
            local_name: local.name.clone(),
            local_address: local.address.clone(),
            zone,
            peers,
            resolved_at: epoch_secs(),
        };

        let mut current = self.current.write().expect("topology lock");
        if current.as_ref().map(|t| &t.peers) != Some(&topology.peers) {
            info!(
                node = %topology.local_name,
                peers = topology.peers.len(),
                zone = topology.zone.as_deref().unwrap_or("-"),
                partitioned,
                "peer topology changed"
            );
        } else {
            debug!(peers = topology.peers.len(), "peer topology unchanged");
        }
        *current = Some(topology.clone());
        Ok(topology)
    }
}

fn zone_partitioning_enabled(data: &std::collections::BTreeMap<String, String>) -> bool {
    data.get(ZONE_CONFIG_KEY)
        .map(|v| v.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Pick the peers for `local` out of `nodes`.
///
/// - partitioning off: every non-master node
/// - partitioning on, local zone set: non-master nodes in the same zone
/// - partitioning on, no local zone: only the local node
pub fn select_peers(
    local: &NodeInfo,
    nodes: &[NodeInfo],
    partitioned: bool,
) -> (Option<String>, PeerSet) {
    let candidates = nodes.iter().filter(|n| !n.is_master());

    if !partitioned {
        return (None, candidates.map(|n| n.address.clone()).collect());
    }

    match local.zone() {
        Some(zone) => {
            let peers = candidates
                .filter(|n| n.zone() == Some(zone))
                .map(|n| n.address.clone())
                .collect();
            (Some(zone.to_string()), peers)
        }
        None => (None, std::iter::once(local.address.clone()).collect()),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::error::RegistryError;
    use crate::memory::MemoryRegistry;

    fn edge(name: &str, addr: &str, zone: Option<&str>) -> NodeInfo {
        let node = NodeInfo::new(name, addr);
        match zone {
            Some(z) => node.with_label(ZONE_LABEL, z),
            None => node,
        }
    }

    fn master(name: &str, addr: &str) -> NodeInfo {
        NodeInfo::new(name, addr).with_label(MASTER_LABELS[0], "")
    }

    fn cluster() -> Vec<NodeInfo> {
        vec![
            edge("edge-1", "10.0.0.1", Some("a")),
            edge("edge-2", "10.0.0.2", Some("a")),
            edge("edge-3", "10.0.0.3", Some("b")),
            edge("edge-4", "10.0.0.4", None),
            master("cp-1", "10.0.0.100"),
        ]
    }

    fn addrs(peers: &PeerSet) -> Vec<&str> {
        peers.iter().map(String::as_str).collect()
    }

    fn registry_with(nodes: Vec<NodeInfo>, zone_toggle: Option<&str>) -> Arc<MemoryRegistry> {
        let registry = Arc::new(MemoryRegistry::new());
        for node in nodes {
            registry.insert_node(node);
        }
        if let Some(value) = zone_toggle {
            let mut data = BTreeMap::new();
            data.insert(ZONE_CONFIG_KEY.to_string(), value.to_string());
            registry.insert_config_map(CONFIG_NAMESPACE, ZONE_CONFIG_MAP, data);
        }
        registry
    }

    #[test]
    fn unpartitioned_selects_all_non_masters() {
        let nodes = cluster();
        let (zone, peers) = select_peers(&nodes[0], &nodes, false);
        assert_eq!(zone, None);
        assert_eq!(addrs(&peers), vec!["10.0.0.1", "10.0.0.2", "10.0.0.3", "10.0.0.4"]);
    }

    #[test]
    fn partitioned_selects_same_zone() {
        let nodes = cluster();
        let (zone, peers) = select_peers(&nodes[0], &nodes, true);
        assert_eq!(zone.as_deref(), Some("a"));
        assert_eq!(addrs(&peers), vec!["10.0.0.1", "10.0.0.2"]);
    }

    #[test]
    fn partitioned_without_local_zone_selects_self_only() {
        let nodes = cluster();
        let (zone, peers) = select_peers(&nodes[3], &nodes, true);
        assert_eq!(zone, None);
        assert_eq!(addrs(&peers), vec!["10.0.0.4"]);
    }

    #[test]
    fn peer_set_deduplicates_and_skips_empty() {
        let peers: PeerSet = vec![
            "10.0.0.2".to_string(),
            "10.0.0.1".to_string(),
            "10.0.0.2".to_string(),
            String::new(),
        ]
        .into_iter()
        .collect();
        assert_eq!(addrs(&peers), vec!["10.0.0.1", "10.0.0.2"]);
        assert_eq!(peers.excluding("10.0.0.1"), vec!["10.0.0.2".to_string()]);
    }

    #[tokio::test]
    async fn missing_zone_config_means_unpartitioned() {
        let registry = registry_with(cluster(), None);
        let resolver = TopologyResolver::new(registry, "edge-1");

        let topology = resolver.resolve().await.unwrap();
        assert_eq!(topology.local_address, "10.0.0.1");
        assert_eq!(topology.peers.len(), 4);
        assert_eq!(resolver.current(), Some(topology));
    }

    #[tokio::test]
    async fn zone_toggle_enables_partitioning() {
        let registry = registry_with(cluster(), Some("true"));
        let resolver = TopologyResolver::new(registry, "edge-3");

        let topology = resolver.resolve().await.unwrap();
        assert_eq!(topology.zone.as_deref(), Some("b"));
        assert_eq!(addrs(&topology.peers), vec!["10.0.0.3"]);
    }

    #[tokio::test]
    async fn zone_toggle_false_is_unpartitioned() {
        let registry = registry_with(cluster(), Some("false"));
        let resolver = TopologyResolver::new(registry, "edge-3");
        assert_eq!(resolver.resolve().await.unwrap().peers.len(), 4);
    }

    #[tokio::test]
    async fn read_error_keeps_last_topology() {
        let registry = registry_with(cluster(), None);
        let resolver = TopologyResolver::new(registry.clone(), "edge-1");
        let first = resolver.resolve().await.unwrap();

        registry.set_unavailable(true);
        let err = resolver.resolve().await.unwrap_err();
        assert!(matches!(err, RegistryError::Unavailable(_)));
        assert_eq!(resolver.current(), Some(first));
    }

    #[tokio::test]
    async fn unknown_local_node_is_an_error() {
        let registry = registry_with(cluster(), None);
        let resolver = TopologyResolver::new(registry, "edge-9");
        assert!(resolver.resolve().await.unwrap_err().is_not_found());
        assert!(resolver.current().is_none());
    }

    #[tokio::test]
    async fn zone_config_read_error_keeps_last_topology() {
        let registry = registry_with(cluster(), Some("true"));
        let resolver = TopologyResolver::new(registry.clone(), "edge-1");
        let first = resolver.resolve().await.unwrap();
        assert_eq!(addrs(&first.peers), vec!["10.0.0.1", "10.0.0.2"]);

        // Partitioning must not silently fall back to "off" on a read error.
        registry.set_config_map_unavailable(true);
        let err = resolver.resolve().await.unwrap_err();
        assert!(matches!(err, RegistryError::Unavailable(_)));
        assert!(!err.is_not_found());
        assert_eq!(resolver.current(), Some(first));
    }

    #[tokio::test]
    async fn local_address_comes_from_registry() {
        let mut nodes = cluster();
        nodes[1].address = "172.16.0.2".to_string();
        let registry = registry_with(nodes, None);
        let resolver = TopologyResolver::new(registry, "edge-2");

        let topology = resolver.resolve().await.unwrap();
        assert_eq!(topology.local_address, "172.16.0.2");
        assert!(topology.peers.contains("172.16.0.2"));
        assert!(!topology.peers.contains("10.0.0.2"));
    }
}

//! Node view and well-known control-plane names.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Label carrying a node's failure-domain zone.
pub const ZONE_LABEL: &str = "superedgehealth/topology-zone";

/// Labels that mark a control-plane node. Such nodes are never probed.
pub const MASTER_LABELS: [&str; 2] = [
    "node-role.kubernetes.io/master",
    "node-role.kubernetes.io/control-plane",
];

/// Annotation set on a node that a quorum judged unhealthy.
pub const UNHEALTHY_ANNOTATION: &str = "nodeunhealth";

/// Value written for [`UNHEALTHY_ANNOTATION`].
pub const UNHEALTHY_ANNOTATION_VALUE: &str = "yes";

/// Taint placed by the control plane's lifecycle controller.
pub const UNREACHABLE_TAINT_KEY: &str = "node.kubernetes.io/unreachable";

pub const NO_EXECUTE: &str = "NoExecute";

/// Namespace holding EdgeGuard's cluster-wide configuration objects.
pub const CONFIG_NAMESPACE: &str = "kube-system";

/// Config map toggling zone partitioning.
pub const ZONE_CONFIG_MAP: &str = "edge-health-zone-config";

/// Key in [`ZONE_CONFIG_MAP`]; `"true"` enables partitioning.
pub const ZONE_CONFIG_KEY: &str = "TaintZoneAdmission";

/// Secret holding the gossip HMAC key.
pub const HMAC_SECRET: &str = "hmac-config";

/// Key in [`HMAC_SECRET`].
pub const HMAC_SECRET_KEY: &str = "hmackey";

/// A node taint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Taint {
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub effect: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_added: Option<String>,
}

impl Taint {
    pub fn new(key: &str, effect: &str) -> Self {
        Self {
            key: key.to_string(),
            value: None,
            effect: effect.to_string(),
            time_added: None,
        }
    }

    pub fn matches(&self, key: &str, effect: &str) -> bool {
        self.key == key && self.effect == effect
    }
}

/// What EdgeGuard needs to know about one cluster node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeInfo {
    pub name: String,
    /// InternalIP, else first listed address, else the node name.
    pub address: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub taints: Vec<Taint>,
}

impl NodeInfo {
    pub fn new(name: &str, address: &str) -> Self {
        Self {
            name: name.to_string(),
            address: address.to_string(),
            ..Default::default()
        }
    }

    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_taint(mut self, taint: Taint) -> Self {
        self.taints.push(taint);
        self
    }

    /// Whether this node belongs to the control plane.
    pub fn is_master(&self) -> bool {
        MASTER_LABELS.iter().any(|l| self.labels.contains_key(*l))
    }

    /// Zone label value, if set and non-empty.
    pub fn zone(&self) -> Option<&str> {
        self.labels
            .get(ZONE_LABEL)
            .map(String::as_str)
            .filter(|z| !z.is_empty())
    }

    pub fn has_annotation(&self, key: &str) -> bool {
        self.annotations.contains_key(key)
    }

    pub fn has_taint(&self, key: &str, effect: &str) -> bool {
        self.taints.iter().any(|t| t.matches(key, effect))
    }
}

/// Join a host and port, bracketing bare IPv6 addresses.
pub fn host_port(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

//! edgeguard-cluster — the cluster as seen by one EdgeGuard node.
//!
//! The control plane is an external collaborator. This crate reduces it
//! to the `NodeRegistry` trait (read nodes, configuration and secrets;
//! write annotations and taints) and builds the peer topology on top.
//!
//! # Architecture
//!
//! ```text
//! NodeRegistry (trait)
//!   ├── KubeRegistry   — Kubernetes REST API over reqwest
//!   └── MemoryRegistry — in-process registry for tests
//!
//! TopologyResolver
//!   ├── get_node(self)            → zone label
//!   ├── get_config_map(zone cfg)  → partitioning on/off
//!   ├── list_nodes()              → candidates (masters excluded)
//!   └── caches the last good Topology
//! ```

pub mod error;
pub mod kube;
pub mod memory;
pub mod node;
pub mod registry;
pub mod topology;

pub use error::{RegistryError, RegistryResult};
pub use kube::{KubeConfig, KubeRegistry};
pub use memory::MemoryRegistry;
pub use node::*;
pub use registry::NodeRegistry;
pub use topology::{PeerSet, Topology, TopologyResolver};

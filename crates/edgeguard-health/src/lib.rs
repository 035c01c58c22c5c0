//! edgeguard-health — local health checking for EdgeGuard.
//!
//! Probes every peer with a fixed set of weighted plugins and turns the
//! weighted sum into one local verdict per peer.
//!
//! # Architecture
//!
//! ```text
//! CheckEngine (periodic)
//!   ├── TopologyResolver::resolve() → PeerSet
//!   ├── ScoreTable::reset(peers)
//!   ├── fan-out: every Plugin × every peer (bounded by a semaphore)
//!   │     └── Plugin::execute(peer) → 0 or 100, times weight
//!   └── VerdictStore::put_verdict(self, peer, total >= score_line)
//! ```
//!
//! # Plugins
//!
//! | Kind | Probe |
//! |---|---|
//! | `tcp` | TCP connect to `peer:port` |
//! | `http` | `GET http://peer:port{path}` expecting 2xx |
//! | `https-auth` | `GET https://peer:port{path}` with a bearer token, certificate not verified |
//!
//! Plugin weights must sum to 1; that is checked once when the
//! configuration is validated, never at probe time.

pub mod config;
pub mod engine;
pub mod error;
pub mod plugin;
pub mod score;

pub use config::{CheckConfig, HttpConfig, HttpsAuthConfig, PluginConfig, TcpConfig};
pub use engine::{CheckEngine, CycleReport};
pub use error::{ConfigError, ProbeError};
pub use plugin::{MAX_SCORE, Plugin, PluginSet};
pub use score::ScoreTable;

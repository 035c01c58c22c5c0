//! edgeguard-gossip — verdict exchange between EdgeGuard nodes.
//!
//! Every node pushes its own row of the verdict store to every peer and
//! accepts pushes from them. Messages carry an HMAC-SHA256 over the
//! sender address and its verdicts, keyed with a secret both sides read
//! from the cluster; the secret itself is never sent.
//!
//! # Wire protocol
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | PUT | `/result` | Accept a signed verdict row |
//! | GET | `/result` | Same as PUT |
//! | GET | `/status` | JSON snapshot of the local verdict store |
//!
//! `/result` answers `200` on accept, `400` for a malformed body or a
//! row claiming to come from the receiver itself, `403` on HMAC mismatch
//! and `500` when no secret is available.
//!
//! ```json
//! {"sourceIP": "10.0.0.2", "checkDetail": {"10.0.0.3": {"normal": true, "time": 1700000000}}, "hmac": "9f2c..."}
//! ```
//!
//! Accepted verdicts are stamped with the receiver's clock, not the
//! sender's, so clock skew between nodes never ages a verdict.

pub mod config;
pub mod error;
pub mod secret;
pub mod sender;
pub mod server;
pub mod signer;
pub mod wire;

pub use config::GossipConfig;
pub use error::{GossipError, GossipResult};
pub use secret::SecretCache;
pub use sender::{GossipSender, SendReport};
pub use server::{GossipState, MAX_BODY_BYTES, build_router, serve};
pub use wire::GossipMessage;

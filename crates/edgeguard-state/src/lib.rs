//! edgeguard-state — the shared verdict store for EdgeGuard.
//!
//! Every node keeps one `VerdictStore`: a two-level table of
//! `checker → checked → CheckDetail`, guarded by a single reader/writer
//! lock. Three loops touch it concurrently:
//!
//! ```text
//! CheckEngine   ──put_verdict──▶ ┌──────────────┐ ◀──replace_row── gossip receiver
//!                                │ VerdictStore │
//! VoteEngine    ◀──snapshot───── └──────────────┘ ───row────────▶ gossip sender
//! ```
//!
//! The store is `Clone` + `Send` + `Sync` (backed by `Arc<RwLock<..>>`).
//! Readers always copy out; no caller holds the lock across I/O.

pub mod error;
pub mod store;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::VerdictStore;
pub use types::*;

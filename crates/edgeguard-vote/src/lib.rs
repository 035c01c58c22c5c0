//! edgeguard-vote — turns distributed verdicts into health decisions.
//!
//! Each cycle the engine copies the verdict store, admits the local
//! node's verdicts and every remote verdict younger than the vote
//! timeout, and counts one vote per checker per peer. A strict majority
//! of all checkers that have reported decides:
//!
//! ```text
//! yes >= Q  → healthy:   clear `nodeunhealth`, drop unreachable:NoExecute taint
//! no  >= Q  → unhealthy: set `nodeunhealth=yes`
//! otherwise → undecided: no write
//! ```
//!
//! With one contributing checker the cycle is skipped entirely, so a
//! single isolated node can never act on its own opinion.

pub mod config;
pub mod engine;
pub mod tally;

pub use config::{VoteConfig, VoteConfigError};
pub use engine::{VoteEngine, VoteReport};
pub use tally::{Decision, Tally, VoteOutcome, quorum, tally};

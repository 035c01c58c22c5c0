//! Pure vote counting over a verdict table snapshot.

use std::collections::{BTreeMap, BTreeSet};

use edgeguard_state::{NodeAddress, VerdictTable};
use serde::Serialize;

/// What the quorum concluded about one peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Healthy,
    Unhealthy,
    Undecided,
}

/// Admitted votes about one peer.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub yes: usize,
    pub no: usize,
}

/// Result of counting one snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoteOutcome {
    /// Distinct checkers with a row in the store, stale or not.
    pub total: usize,
    pub quorum: usize,
    /// Checkers with at least one admitted verdict.
    pub contributing: BTreeSet<NodeAddress>,
    pub tallies: BTreeMap<NodeAddress, Tally>,
}

impl VoteOutcome {
    /// Whether too few checkers contributed for any decision.
    pub fn skipped(&self) -> bool {
        self.contributing.len() <= 1
    }

    pub fn decision(&self, peer: &str) -> Decision {
        if self.skipped() {
            return Decision::Undecided;
        }
        match self.tallies.get(peer) {
            Some(t) if t.yes >= self.quorum => Decision::Healthy,
            Some(t) if t.no >= self.quorum => Decision::Unhealthy,
            _ => Decision::Undecided,
        }
    }

    /// Every tallied peer with a quorum decision.
    pub fn decisions(&self) -> BTreeMap<NodeAddress, Decision> {
        self.tallies
            .keys()
            .map(|peer| (peer.clone(), self.decision(peer)))
            .filter(|(_, d)| *d != Decision::Undecided)
            .collect()
    }
}

/// Strict majority of `total`.
pub fn quorum(total: usize) -> usize {
    total / 2 + 1
}

/// Count votes in `table` as seen by `local` at `now`.
///
/// `local`'s own verdicts always count. A remote verdict counts only if
/// it is at most `timeout_secs` old.
pub fn tally(table: &VerdictTable, local: &str, now: i64, timeout_secs: u64) -> VoteOutcome {
    let timeout = i64::try_from(timeout_secs).unwrap_or(i64::MAX);
    let total = table.len();
    let mut contributing = BTreeSet::new();
    let mut tallies: BTreeMap<NodeAddress, Tally> = BTreeMap::new();

    for (checker, row) in table {
        let own = checker == local;
        for (checked, detail) in row {
            if checked == checker || (!own && detail.age(now) > timeout) {
                continue;
            }
            contributing.insert(checker.clone());
            let tally = tallies.entry(checked.clone()).or_default();
            if detail.normal {
                tally.yes += 1;
            } else {
                tally.no += 1;
            }
        }
    }

    VoteOutcome {
        total,
        quorum: quorum(total),
        contributing,
        tallies,
    }
}

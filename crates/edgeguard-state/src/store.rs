//! VerdictStore — the single table shared by the check, gossip and vote loops.
//!
//! Rows are keyed by checker address. A node writes its own row one
//! verdict at a time; rows received over gossip are replaced wholesale.
//! Every read returns an owned copy so the lock is never held across
//! network or control-plane calls.

use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::types::*;

/// Thread-safe verdict table.
#[derive(Clone, Default)]
pub struct VerdictStore {
    table: Arc<RwLock<VerdictTable>>,
}

impl VerdictStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite one (checker, checked) verdict.
    pub fn put_verdict(&self, checker: &str, checked: &str, detail: CheckDetail) -> StateResult<()> {
        validate_pair(checker, checked)?;
        let mut table = self.table.write().expect("verdict store lock");
        table
            .entry(checker.to_string())
            .or_default()
            .insert(checked.to_string(), detail);
        Ok(())
    }

    /// Replace a checker's entire row.
    ///
    /// Any entry the checker reports about itself is dropped. Returns the
    /// number of entries stored.
    pub fn replace_row(&self, checker: &str, mut details: CheckDetails) -> StateResult<usize> {
        if checker.is_empty() {
            return Err(StateError::EmptyAddress("checker"));
        }
        if details.remove(checker).is_some() {
            debug!(%checker, "discarded self-verdict in replaced row");
        }
        details.retain(|checked, _| !checked.is_empty());

        let count = details.len();
        let mut table = self.table.write().expect("verdict store lock");
        table.insert(checker.to_string(), details);
        debug!(%checker, entries = count, "verdict row replaced");
        Ok(count)
    }

    /// Copy of one checker's row (empty if the checker never reported).
    pub fn row(&self, checker: &str) -> CheckDetails {
        let table = self.table.read().expect("verdict store lock");
        table.get(checker).cloned().unwrap_or_default()
    }

    /// Look up a single verdict.
    pub fn get(&self, checker: &str, checked: &str) -> Option<CheckDetail> {
        let table = self.table.read().expect("verdict store lock");
        table.get(checker).and_then(|row| row.get(checked)).copied()
    }

    /// Point-in-time copy of the whole table.
    pub fn snapshot(&self) -> VerdictTable {
        self.table.read().expect("verdict store lock").clone()
    }

    /// Flattened copy of every verdict.
    pub fn verdicts(&self) -> Vec<Verdict> {
        let table = self.table.read().expect("verdict store lock");
        table
            .iter()
            .flat_map(|(checker, row)| {
                row.iter()
                    .map(move |(checked, detail)| Verdict::from_detail(checker, checked, *detail))
            })
            .collect()
    }

    /// Addresses of every checker that has a row.
    pub fn checkers(&self) -> BTreeSet<NodeAddress> {
        let table = self.table.read().expect("verdict store lock");
        table.keys().cloned().collect()
    }

    /// Drop every row and entry that refers to a node outside `keep`.
    ///
    /// Used after a topology sync: a node that left the peer set is
    /// neither a checker nor a checked peer any more. Returns the number
    /// of entries removed (rows count as one each).
    pub fn retain_peers(&self, keep: &HashSet<NodeAddress>) -> usize {
        let mut table = self.table.write().expect("verdict store lock");
        let mut removed = 0;

        table.retain(|checker, _| {
            let kept = keep.contains(checker);
            if !kept {
                removed += 1;
            }
            kept
        });
        for row in table.values_mut() {
            let before = row.len();
            row.retain(|checked, _| keep.contains(checked));
            removed += before - row.len();
        }

        if removed > 0 {
            debug!(removed, "pruned verdicts for departed peers");
        }
        removed
    }

    /// Number of checker rows.
    pub fn len(&self) -> usize {
        self.table.read().expect("verdict store lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn validate_pair(checker: &str, checked: &str) -> StateResult<()> {
    if checker.is_empty() {
        return Err(StateError::EmptyAddress("checker"));
    }
    if checked.is_empty() {
        return Err(StateError::EmptyAddress("checked"));
    }
    if checker == checked {
        return Err(StateError::SelfVerdict(checker.to_string()));
    }
    Ok(())
}

//! Per-peer, per-plugin weighted scores for one check cycle.

use std::collections::HashMap;

use edgeguard_state::NodeAddress;

/// Absorbs float rounding in weighted sums (0.1 + 0.2 + 0.7 weights).
const SCORE_EPSILON: f64 = 1e-9;

/// Weighted scores keyed by peer, then plugin name.
#[derive(Debug, Default)]
pub struct ScoreTable {
    scores: HashMap<NodeAddress, HashMap<String, f64>>,
}

impl ScoreTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop everything and start an empty row for each peer.
    pub fn reset(&mut self, peers: &[NodeAddress]) {
        self.scores.clear();
        for peer in peers {
            self.scores.insert(peer.clone(), HashMap::new());
        }
    }

    /// Record a plugin's weighted score for a peer. Returns false if the
    /// peer is not part of this cycle.
    pub fn record(&mut self, peer: &str, plugin: &str, weighted: f64) -> bool {
        match self.scores.get_mut(peer) {
            Some(row) => {
                row.insert(plugin.to_string(), weighted);
                true
            }
            None => false,
        }
    }

    /// Sum of a peer's weighted scores; missing plugins count as 0.
    pub fn total(&self, peer: &str) -> Option<f64> {
        self.scores.get(peer).map(|row| row.values().sum())
    }

    pub fn plugin_score(&self, peer: &str, plugin: &str) -> Option<f64> {
        self.scores.get(peer).and_then(|row| row.get(plugin)).copied()
    }

    /// Whether a peer's total reaches `score_line`.
    pub fn is_normal(&self, peer: &str, score_line: f64) -> bool {
        self.total(peer)
            .is_some_and(|total| total + SCORE_EPSILON >= score_line)
    }

    pub fn peers(&self) -> impl Iterator<Item = &NodeAddress> {
        self.scores.keys()
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::MAX_SCORE;

    fn table(peers: &[&str]) -> ScoreTable {
        let mut table = ScoreTable::new();
        let peers: Vec<NodeAddress> = peers.iter().map(|p| p.to_string()).collect();
        table.reset(&peers);
        table
    }

    #[test]
    fn reset_creates_zero_rows() {
        let table = table(&["10.0.0.2", "10.0.0.3"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.total("10.0.0.2"), Some(0.0));
        assert_eq!(table.total("10.0.0.9"), None);
    }

    #[test]
    fn reset_drops_departed_peers() {
        let mut table = table(&["10.0.0.2", "10.0.0.3"]);
        table.record("10.0.0.3", "tcp:1", 100.0);
        table.reset(&["10.0.0.2".to_string()]);
        assert_eq!(table.len(), 1);
        assert_eq!(table.total("10.0.0.3"), None);
    }

    #[test]
    fn record_ignores_unknown_peer() {
        let mut table = table(&["10.0.0.2"]);
        assert!(!table.record("10.0.0.9", "tcp:1", 100.0));
        assert!(table.record("10.0.0.2", "tcp:1", 100.0));
        assert_eq!(table.plugin_score("10.0.0.2", "tcp:1"), Some(100.0));
    }

    #[test]
    fn normal_iff_weighted_sum_reaches_score_line() {
        // (plugin weight, plugin passed)
        let outcomes = [(0.5, true), (0.3, false), (0.2, true)];
        let mut table = table(&["10.0.0.2"]);
        for (i, (weight, passed)) in outcomes.iter().enumerate() {
            let score = if *passed { MAX_SCORE } else { 0.0 };
            table.record("10.0.0.2", &format!("p{i}"), score * weight);
        }

        let total = table.total("10.0.0.2").unwrap();
        assert!((total - 70.0).abs() < 1e-9);
        for line in [10.0, 50.0, 69.0, 70.0, 71.0, 100.0] {
            assert_eq!(table.is_normal("10.0.0.2", line), 70.0 >= line, "score line {line}");
        }
    }

    #[test]
    fn rounding_does_not_fail_a_perfect_score() {
        let mut table = table(&["10.0.0.2"]);
        for (i, weight) in [0.1, 0.2, 0.7].iter().enumerate() {
            table.record("10.0.0.2", &format!("p{i}"), MAX_SCORE * weight);
        }
        assert!(table.is_normal("10.0.0.2", 100.0));
    }

    #[test]
    fn unknown_peer_is_not_normal() {
        let table = table(&[]);
        assert!(!table.is_normal("10.0.0.2", 1.0));
    }
}

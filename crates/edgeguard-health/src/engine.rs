//! Check engine — the periodic loop that produces this node's verdicts.
//!
//! Each cycle resolves the topology, prunes state for departed peers,
//! fans every plugin out over every peer, and writes one verdict per
//! peer into the shared store. A topology failure skips the cycle and
//! leaves the previous verdicts in place.

use std::sync::Arc;

use edgeguard_cluster::{RegistryResult, TopologyResolver};
use edgeguard_state::{CheckDetail, NodeAddress, VerdictStore, epoch_secs};
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::config::CheckConfig;
use crate::plugin::PluginSet;
use crate::score::ScoreTable;

/// Outcome of one check cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub peers: usize,
    pub normal: usize,
    pub abnormal: usize,
    pub pruned: usize,
}

/// Runs plugins against peers and records local verdicts.
pub struct CheckEngine {
    resolver: Arc<TopologyResolver>,
    store: VerdictStore,
    plugins: PluginSet,
    config: CheckConfig,
    scores: ScoreTable,
}

impl CheckEngine {
    pub fn new(
        resolver: Arc<TopologyResolver>,
        store: VerdictStore,
        plugins: PluginSet,
        config: CheckConfig,
    ) -> Self {
        Self {
            resolver,
            store,
            plugins,
            config,
            scores: ScoreTable::new(),
        }
    }

    /// Scores from the most recent cycle.
    pub fn scores(&self) -> &ScoreTable {
        &self.scores
    }

    /// Run until the shutdown signal fires. A cycle in progress is
    /// abandoned, which aborts its outstanding probes.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            period = ?self.config.period(),
            plugins = self.plugins.len(),
            score_line = self.config.score_line,
            "check engine starting"
        );

        let mut ticker = interval(self.config.period());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    tokio::select! {
                        result = self.check_once() => {
                            if let Err(e) = result {
                                warn!(error = %e, "topology sync failed, keeping previous verdicts");
                            }
                        }
                        _ = shutdown.changed() => {
                            info!("check engine shutting down mid-cycle");
                            break;
                        }
                    }
                }
                _ = shutdown.changed() => {
                    info!("check engine shutting down");
                    break;
                }
            }
        }
    }

    /// Run a single check cycle.
    pub async fn check_once(&mut self) -> RegistryResult<CycleReport> {
        let topology = self.resolver.resolve().await?;
        let local = topology.local_address.clone();
        let targets = topology.peers.excluding(&local);

        self.scores.reset(&targets);
        let mut keep = topology.peers.to_hash_set();
        keep.insert(local.clone());
        let pruned = self.store.retain_peers(&keep);

        self.probe_all(&targets).await;

        let now = epoch_secs();
        let mut report = CycleReport {
            peers: targets.len(),
            pruned,
            ..Default::default()
        };
        for peer in &targets {
            let normal = self.scores.is_normal(peer, self.config.score_line);
            if normal {
                report.normal += 1;
            } else {
                report.abnormal += 1;
            }
            if let Err(e) = self
                .store
                .put_verdict(&local, peer, CheckDetail::new(normal, now))
            {
                warn!(%peer, error = %e, "failed to record verdict");
            }
        }

        debug!(
            peers = report.peers,
            normal = report.normal,
            abnormal = report.abnormal,
            pruned = report.pruned,
            "check cycle complete"
        );
        Ok(report)
    }

    /// Fan every plugin over every target and wait for all of them.
    async fn probe_all(&mut self, targets: &[NodeAddress]) {
        let permits = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut set = JoinSet::new();

        for plugin in self.plugins.iter() {
            for peer in targets {
                let plugin = Arc::clone(plugin);
                let peer = peer.clone();
                let permits = Arc::clone(&permits);
                set.spawn(async move {
                    let score = match permits.acquire_owned().await {
                        Ok(_permit) => plugin.execute(&peer).await,
                        Err(_) => 0.0,
                    };
                    (peer, plugin.name().to_string(), score * plugin.weight())
                });
            }
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((peer, plugin, weighted)) => {
                    debug!(%peer, %plugin, weighted, "probe scored");
                    self.scores.record(&peer, &plugin, weighted);
                }
                Err(e) => warn!(error = %e, "probe task failed"),
            }
        }
    }
}

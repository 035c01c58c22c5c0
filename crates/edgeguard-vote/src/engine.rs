//! Vote engine — the periodic loop that acts on quorum decisions.

use std::collections::HashMap;
use std::sync::Arc;

use edgeguard_cluster::*;
use edgeguard_state::{VerdictStore, epoch_secs};
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::config::VoteConfig;
use crate::tally::{Decision, VoteOutcome, tally};

/// What one vote cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteReport {
    pub outcome: VoteOutcome,
    pub marked: usize,
    pub cleared: usize,
    pub untainted: usize,
    pub failed: usize,
}

impl VoteReport {
    fn new(outcome: VoteOutcome) -> Self {
        Self {
            outcome,
            marked: 0,
            cleared: 0,
            untainted: 0,
            failed: 0,
        }
    }

    pub fn writes(&self) -> usize {
        self.marked + self.cleared + self.untainted
    }
}

pub struct VoteEngine {
    registry: Arc<dyn NodeRegistry>,
    resolver: Arc<TopologyResolver>,
    store: VerdictStore,
    config: VoteConfig,
}

impl VoteEngine {
    pub fn new(
        registry: Arc<dyn NodeRegistry>,
        resolver: Arc<TopologyResolver>,
        store: VerdictStore,
        config: VoteConfig,
    ) -> Self {
        Self {
            registry,
            resolver,
            store,
            config,
        }
    }

    /// Run until the shutdown signal fires. Registry writes still
    /// pending are abandoned.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            period = ?self.config.period(),
            timeout = ?self.config.timeout(),
            "vote engine starting"
        );

        let mut ticker = interval(self.config.period());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    tokio::select! {
                        result = self.vote_once() => {
                            if let Err(e) = result {
                                warn!(error = %e, "vote cycle skipped");
                            }
                        }
                        _ = shutdown.changed() => {
                            info!("vote engine shutting down mid-cycle");
                            break;
                        }
                    }
                }
                _ = shutdown.changed() => {
                    info!("vote engine shutting down");
                    break;
                }
            }
        }
    }

    /// Count one snapshot of the store and apply its decisions.
    ///
    /// Individual write failures are logged and counted; the next cycle
    /// retries them.
    pub async fn vote_once(&self) -> RegistryResult<VoteReport> {
        let local = match self.resolver.current() {
            Some(topology) => topology.local_address,
            None => self.resolver.resolve().await?.local_address,
        };

        let outcome = tally(
            &self.store.snapshot(),
            &local,
            epoch_secs(),
            self.config.timeout_secs,
        );
        if outcome.skipped() {
            debug!(
                total = outcome.total,
                contributing = outcome.contributing.len(),
                "too few contributing checkers, skipping vote"
            );
            return Ok(VoteReport::new(outcome));
        }

        let decisions = outcome.decisions();
        let mut report = VoteReport::new(outcome);
        if decisions.is_empty() {
            debug!(total = report.outcome.total, "no quorum decisions this cycle");
            return Ok(report);
        }

        let nodes: HashMap<String, NodeInfo> = self
            .registry
            .list_nodes()
            .await?
            .into_iter()
            .map(|n| (n.address.clone(), n))
            .collect();

        for (peer, decision) in decisions {
            let Some(node) = nodes.get(&peer) else {
                debug!(%peer, "no node object for peer, skipping");
                continue;
            };
            match decision {
                Decision::Unhealthy => self.mark_unhealthy(node, &mut report).await,
                Decision::Healthy => self.mark_healthy(node, &mut report).await,
                Decision::Undecided => {}
            }
        }

        debug!(
            total = report.outcome.total,
            quorum = report.outcome.quorum,
            writes = report.writes(),
            failed = report.failed,
            "vote cycle complete"
        );
        Ok(report)
    }

    async fn mark_unhealthy(&self, node: &NodeInfo, report: &mut VoteReport) {
        if node.has_annotation(UNHEALTHY_ANNOTATION) {
            return;
        }
        match self
            .registry
            .set_annotation(&node.name, UNHEALTHY_ANNOTATION, UNHEALTHY_ANNOTATION_VALUE)
            .await
        {
            Ok(()) => {
                info!(node = %node.name, address = %node.address, "quorum judged node unhealthy");
                report.marked += 1;
            }
            Err(e) => {
                warn!(node = %node.name, error = %e, "failed to mark node unhealthy");
                report.failed += 1;
            }
        }
    }

    async fn mark_healthy(&self, node: &NodeInfo, report: &mut VoteReport) {
        if node.has_annotation(UNHEALTHY_ANNOTATION) {
            match self
                .registry
                .remove_annotation(&node.name, UNHEALTHY_ANNOTATION)
                .await
            {
                Ok(()) => {
                    info!(node = %node.name, address = %node.address, "quorum judged node healthy");
                    report.cleared += 1;
                }
                Err(e) => {
                    warn!(node = %node.name, error = %e, "failed to clear unhealthy annotation");
                    report.failed += 1;
                }
            }
        }

        if node.has_taint(UNREACHABLE_TAINT_KEY, NO_EXECUTE) {
            match self
                .registry
                .remove_taint(&node.name, UNREACHABLE_TAINT_KEY, NO_EXECUTE)
                .await
            {
                Ok(true) => {
                    info!(node = %node.name, "removed unreachable taint");
                    report.untainted += 1;
                }
                Ok(false) => debug!(node = %node.name, "unreachable taint already gone"),
                Err(e) if e.is_conflict() => {
                    warn!(node = %node.name, "node changed while removing taint, retrying next cycle");
                    report.failed += 1;
                }
                Err(e) => {
                    warn!(node = %node.name, error = %e, "failed to remove unreachable taint");
                    report.failed += 1;
                }
            }
        }
    }
}

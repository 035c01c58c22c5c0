//! Gossip sender — pushes this node's verdict row to every peer.

use std::sync::Arc;

use bytes::Bytes;
use edgeguard_cluster::{TopologyResolver, host_port};
use edgeguard_state::VerdictStore;
use reqwest::header::CONTENT_TYPE;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::config::GossipConfig;
use crate::error::{GossipError, GossipResult};
use crate::secret::SecretCache;
use crate::wire::GossipMessage;

/// Outcome of one send cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SendReport {
    pub targets: usize,
    pub delivered: usize,
    pub failed: usize,
}

pub struct GossipSender {
    resolver: Arc<TopologyResolver>,
    store: VerdictStore,
    secrets: Arc<SecretCache>,
    config: GossipConfig,
    client: reqwest::Client,
}

impl GossipSender {
    pub fn new(
        resolver: Arc<TopologyResolver>,
        store: VerdictStore,
        secrets: Arc<SecretCache>,
        config: GossipConfig,
    ) -> GossipResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;
        Ok(Self {
            resolver,
            store,
            secrets,
            config,
            client,
        })
    }

    /// Run until the shutdown signal fires. Pushes still in flight are
    /// dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            period = ?self.config.period(),
            port = self.config.port,
            "gossip sender starting"
        );

        let mut ticker = interval(self.config.period());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    tokio::select! {
                        result = self.send_once() => {
                            if let Err(e) = result {
                                warn!(error = %e, "gossip cycle skipped");
                            }
                        }
                        _ = shutdown.changed() => {
                            info!("gossip sender shutting down mid-cycle");
                            break;
                        }
                    }
                }
                _ = shutdown.changed() => {
                    info!("gossip sender shutting down");
                    break;
                }
            }
        }
    }

    /// Sign the local row and push it to every peer once.
    ///
    /// Fails without sending anything when no topology or secret is
    /// available.
    pub async fn send_once(&self) -> GossipResult<SendReport> {
        let topology = match self.resolver.current() {
            Some(topology) => topology,
            None => self.resolver.resolve().await?,
        };
        let key = self.secrets.refresh().await?;

        let local = topology.local_address.clone();
        let message = GossipMessage::signed(&key, &local, self.store.row(&local))?;
        let body = Bytes::from(serde_json::to_vec(&message)?);

        let targets = topology.peers.excluding(&local);
        let mut report = SendReport {
            targets: targets.len(),
            ..Default::default()
        };

        let permits = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut set = JoinSet::new();
        for peer in targets {
            let url = format!("http://{}/result", host_port(&peer, self.config.port));
            let client = self.client.clone();
            let body = body.clone();
            let permits = Arc::clone(&permits);
            let attempts = self.config.retries.max(1);
            set.spawn(async move {
                let result = match permits.acquire_owned().await {
                    Ok(_permit) => push(&client, &url, body, attempts).await,
                    Err(_) => Err(GossipError::Transport("sender closed".to_string())),
                };
                (peer, result)
            });
        }

        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((_, Ok(()))) => report.delivered += 1,
                Ok((peer, Err(e))) => {
                    warn!(%peer, error = %e, "gossip push failed");
                    report.failed += 1;
                }
                Err(e) => {
                    warn!(error = %e, "gossip task failed");
                    report.failed += 1;
                }
            }
        }

        debug!(
            targets = report.targets,
            delivered = report.delivered,
            failed = report.failed,
            "gossip cycle complete"
        );
        Ok(report)
    }
}

/// PUT `body` to `url`, retrying transport errors and 5xx answers.
async fn push(client: &reqwest::Client, url: &str, body: Bytes, attempts: u32) -> GossipResult<()> {
    let mut last = GossipError::Transport("no attempt made".to_string());
    for attempt in 1..=attempts {
        let result = client
            .put(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body.clone())
            .send()
            .await;
        let err = match result {
            Ok(resp) if resp.status().is_success() => return Ok(()),
            Ok(resp) => GossipError::Status(resp.status().as_u16()),
            Err(e) => GossipError::from(e),
        };
        debug!(%url, attempt, error = %err, "gossip push attempt failed");
        if !err.is_retryable() {
            return Err(err);
        }
        last = err;
    }
    Err(last)
}

//! Node mode: assembles the registry, the shared store and the four
//! loops, then waits for a shutdown signal.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use edgeguard_cluster::{KubeRegistry, NodeRegistry, TopologyResolver};
use edgeguard_gossip::{GossipSender, GossipState, SecretCache, build_router, serve};
use edgeguard_health::{CheckEngine, PluginSet};
use edgeguard_state::VerdictStore;
use edgeguard_vote::VoteEngine;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::DaemonConfig;
use crate::logging::{self, LogControl};

/// How long in-flight gossip requests may drain on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub async fn run(config: DaemonConfig, log: LogControl) -> anyhow::Result<()> {
    info!(node = %config.node.name, "EdgeGuard node starting");

    // ── Cluster view ───────────────────────────────────────────

    let registry: Arc<dyn NodeRegistry> = Arc::new(
        KubeRegistry::new(config.registry.kube_config()).context("building registry client")?,
    );
    info!(apiserver = %config.registry.apiserver, "registry client initialized");

    let resolver = Arc::new(TopologyResolver::new(Arc::clone(&registry), &config.node.name));
    match resolver.resolve().await {
        Ok(topology) => info!(
            address = %topology.local_address,
            peers = topology.peers.len(),
            "initial topology resolved"
        ),
        Err(e) => warn!(error = %e, "initial topology sync failed, will retry"),
    }

    // ── Subsystems ─────────────────────────────────────────────

    let store = VerdictStore::new();
    let secrets = Arc::new(SecretCache::new(Arc::clone(&registry)));

    let plugins = PluginSet::from_configs(&config.check.plugins).map_err(|errors| {
        anyhow::anyhow!(
            "invalid plugins: {}",
            errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
        )
    })?;
    let names: Vec<&str> = plugins.iter().map(|p| p.name()).collect();
    info!(plugins = ?names, "health plugins initialized");

    let check = CheckEngine::new(
        Arc::clone(&resolver),
        store.clone(),
        plugins,
        config.check.clone(),
    );
    let sender = GossipSender::new(
        Arc::clone(&resolver),
        store.clone(),
        Arc::clone(&secrets),
        config.gossip.clone(),
    )?;
    let vote = VoteEngine::new(
        Arc::clone(&registry),
        Arc::clone(&resolver),
        store.clone(),
        config.vote.clone(),
    );

    // ── Background loops ───────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let check_handle = tokio::spawn(check.run(shutdown_rx.clone()));
    let sender_handle = tokio::spawn(sender.run(shutdown_rx.clone()));
    let vote_handle = tokio::spawn(vote.run(shutdown_rx.clone()));

    // ── Gossip server ──────────────────────────────────────────

    let router =
        build_router(GossipState::new(store, secrets, resolver)).merge(logging::router(log));
    let addr = config.node.bind_addr(config.gossip.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding gossip port {addr}"))?;
    let mut server_handle = tokio::spawn(serve(listener, router, shutdown_rx, SHUTDOWN_GRACE));

    let exited = tokio::select! {
        _ = shutdown_signal() => None,
        joined = &mut server_handle => Some(joined),
    };
    let _ = shutdown_tx.send(true);
    let server_result = match exited {
        Some(joined) => {
            error!("gossip server exited unexpectedly");
            joined
        }
        None => {
            info!("shutdown signal received");
            server_handle.await
        }
    };

    let _ = check_handle.await;
    let _ = sender_handle.await;
    let _ = vote_handle.await;

    server_result.context("gossip server task")??;
    info!("EdgeGuard node stopped");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

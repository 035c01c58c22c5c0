//! Gossip receiver — accepts signed verdict rows from peers.

use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use edgeguard_cluster::TopologyResolver;
use edgeguard_state::{NodeAddress, VerdictStore};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{GossipError, GossipResult};
use crate::secret::SecretCache;
use crate::wire::GossipMessage;

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Shared state for gossip handlers.
#[derive(Clone)]
pub struct GossipState {
    pub store: VerdictStore,
    pub secrets: Arc<SecretCache>,
    pub resolver: Arc<TopologyResolver>,
}

impl GossipState {
    pub fn new(
        store: VerdictStore,
        secrets: Arc<SecretCache>,
        resolver: Arc<TopologyResolver>,
    ) -> Self {
        Self {
            store,
            secrets,
            resolver,
        }
    }

    /// This node's address, from the cached topology or a fresh sync.
    async fn local_address(&self) -> GossipResult<NodeAddress> {
        match self.resolver.current() {
            Some(topology) => Ok(topology.local_address),
            None => Ok(self.resolver.resolve().await?.local_address),
        }
    }
}

/// Build the gossip router.
pub fn build_router(state: GossipState) -> Router {
    Router::new()
        .route("/result", get(receive_result).put(receive_result))
        .route("/status", get(status))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

/// PUT/GET /result
async fn receive_result(State(state): State<GossipState>, body: Bytes) -> (StatusCode, String) {
    let message = match GossipMessage::decode(&body) {
        Ok(message) => message,
        Err(e) => {
            debug!(error = %e, "rejecting malformed gossip");
            return e.into();
        }
    };

    // Only the check engine writes this node's own row.
    match state.local_address().await {
        Ok(local) if local == message.source_ip => {
            warn!(source = %message.source_ip, "rejecting gossip sourced as this node");
            return GossipError::SelfSourced(local).into();
        }
        Ok(_) => {}
        Err(e) => {
            warn!(error = %e, "cannot determine local address for gossip");
            return e.into();
        }
    }

    let key = match state.secrets.get().await {
        Ok(key) => key,
        Err(e) => {
            warn!(source = %message.source_ip, error = %e, "cannot verify gossip");
            return e.into();
        }
    };

    if let Err(e) = message.verify(&key) {
        warn!(source = %message.source_ip, "gossip hmac mismatch, dropping");
        return e.into();
    }

    let (source, details) = message.into_received();
    match state.store.replace_row(&source, details) {
        Ok(entries) => {
            debug!(%source, entries, "gossip accepted");
            (StatusCode::OK, String::new())
        }
        Err(e) => (StatusCode::BAD_REQUEST, e.to_string()),
    }
}

/// GET /status
async fn status(State(state): State<GossipState>) -> impl IntoResponse {
    Json(state.store.snapshot())
}

/// Serve `router` until the shutdown signal fires, then let in-flight
/// requests drain for at most `grace` before aborting them.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    mut shutdown: watch::Receiver<bool>,
    grace: Duration,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    info!(%addr, "gossip server listening");

    let mut signal = shutdown.clone();
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        shutdown_requested(&mut signal).await;
    });
    let mut handle = tokio::spawn(async move { server.await });

    tokio::select! {
        joined = &mut handle => return flatten(joined),
        _ = shutdown_requested(&mut shutdown) => {}
    }

    match tokio::time::timeout(grace, &mut handle).await {
        Ok(joined) => {
            info!("gossip server stopped");
            flatten(joined)
        }
        Err(_) => {
            warn!(?grace, "gossip server did not drain in time, aborting");
            handle.abort();
            Ok(())
        }
    }
}

async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

fn flatten(joined: Result<std::io::Result<()>, tokio::task::JoinError>) -> std::io::Result<()> {
    joined.map_err(std::io::Error::other)?
}

impl From<GossipError> for (StatusCode, String) {
    fn from(e: GossipError) -> Self {
        let status = match e {
            GossipError::Malformed(_) | GossipError::SelfSourced(_) => StatusCode::BAD_REQUEST,
            GossipError::Signature => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use axum::body::Body;
    use axum::http::Request;
    use edgeguard_cluster::*;
    use edgeguard_state::{CheckDetail, CheckDetails, VerdictTable, epoch_secs};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;

    const KEY: &[u8] = b"cluster-secret";
    const LOCAL: &str = "10.0.0.1";

    fn test_state(key: Option<&[u8]>) -> GossipState {
        let registry = Arc::new(MemoryRegistry::new());
        registry.insert_node(NodeInfo::new("local", LOCAL));
        if let Some(key) = key {
            let mut data = BTreeMap::new();
            data.insert(HMAC_SECRET_KEY.to_string(), key.to_vec());
            registry.insert_secret(CONFIG_NAMESPACE, HMAC_SECRET, data);
        }
        let resolver = Arc::new(TopologyResolver::new(registry.clone(), "local"));
        GossipState::new(
            VerdictStore::new(),
            Arc::new(SecretCache::new(registry)),
            resolver,
        )
    }

    fn row(entries: &[(&str, bool)]) -> CheckDetails {
        entries
            .iter()
            .map(|(addr, normal)| (addr.to_string(), CheckDetail::new(*normal, 5)))
            .collect()
    }

    fn signed_body(key: &[u8], source: &str, details: CheckDetails) -> Vec<u8> {
        serde_json::to_vec(&GossipMessage::signed(key, source, details).unwrap()).unwrap()
    }

    async fn send(state: &GossipState, method: &str, body: Vec<u8>) -> (StatusCode, Vec<u8>) {
        let resp = build_router(state.clone())
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri("/result")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        (status, bytes.to_vec())
    }

    #[tokio::test]
    async fn accepts_signed_row_with_local_time() {
        let state = test_state(Some(KEY));
        let before = epoch_secs();
        let body = signed_body(KEY, "10.0.0.2", row(&[("10.0.0.3", true), ("10.0.0.4", false)]));

        let (status, _) = send(&state, "PUT", body).await;
        assert_eq!(status, StatusCode::OK);

        let stored = state.store.row("10.0.0.2");
        assert_eq!(stored.len(), 2);
        assert!(!stored["10.0.0.4"].normal);
        assert!(stored.values().all(|d| d.time >= before));
    }

    #[tokio::test]
    async fn get_is_handled_like_put() {
        let state = test_state(Some(KEY));
        let body = signed_body(KEY, "10.0.0.2", row(&[("10.0.0.3", true)]));
        let (status, _) = send(&state, "GET", body).await;
        assert_eq!(status, StatusCode::OK);
        assert!(state.store.get("10.0.0.2", "10.0.0.3").is_some());
    }

    #[tokio::test]
    async fn hmac_mismatch_is_forbidden_and_row_unchanged() {
        let state = test_state(Some(KEY));
        send(&state, "PUT", signed_body(KEY, "10.0.0.2", row(&[("10.0.0.3", true)]))).await;
        let before = state.store.snapshot();

        let forged = signed_body(b"wrong-key", "10.0.0.2", row(&[("10.0.0.3", false)]));
        let (status, _) = send(&state, "PUT", forged).await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(state.store.snapshot(), before);
    }

    #[tokio::test]
    async fn malformed_body_is_bad_request() {
        let state = test_state(Some(KEY));
        let (status, _) = send(&state, "PUT", b"{not json".to_vec()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(state.store.is_empty());
    }

    #[tokio::test]
    async fn missing_secret_is_internal_error() {
        let state = test_state(None);
        let body = signed_body(KEY, "10.0.0.2", row(&[("10.0.0.3", true)]));
        let (status, _) = send(&state, "PUT", body).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(state.store.is_empty());
    }

    #[tokio::test]
    async fn self_verdicts_in_row_are_dropped() {
        let state = test_state(Some(KEY));
        let body = signed_body(KEY, "10.0.0.2", row(&[("10.0.0.2", true), ("10.0.0.3", true)]));
        let (status, _) = send(&state, "PUT", body).await;
        assert_eq!(status, StatusCode::OK);
        assert!(state.store.get("10.0.0.2", "10.0.0.2").is_none());
        assert_eq!(state.store.row("10.0.0.2").len(), 1);
    }

    #[tokio::test]
    async fn row_sourced_as_this_node_is_rejected() {
        let state = test_state(Some(KEY));
        state
            .store
            .put_verdict(LOCAL, "10.0.0.3", CheckDetail::new(false, epoch_secs()))
            .unwrap();
        let before = state.store.snapshot();

        let body = signed_body(KEY, LOCAL, row(&[("10.0.0.3", true), ("10.0.0.4", true)]));
        let (status, _) = send(&state, "PUT", body).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(state.store.snapshot(), before);
    }

    #[tokio::test]
    async fn unknown_local_node_is_internal_error() {
        let state = test_state(Some(KEY));
        let state = GossipState::new(
            state.store.clone(),
            Arc::clone(&state.secrets),
            Arc::new(TopologyResolver::new(Arc::new(MemoryRegistry::new()), "local")),
        );
        let body = signed_body(KEY, "10.0.0.2", row(&[("10.0.0.3", true)]));
        let (status, _) = send(&state, "PUT", body).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(state.store.is_empty());
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let state = test_state(Some(KEY));
        let (status, _) = send(&state, "PUT", vec![b' '; MAX_BODY_BYTES + 1]).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn status_returns_store_snapshot() {
        let state = test_state(Some(KEY));
        state
            .store
            .put_verdict("10.0.0.1", "10.0.0.2", CheckDetail::new(true, 7))
            .unwrap();

        let resp = build_router(state.clone())
            .oneshot(Request::builder().uri("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let table: VerdictTable = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(table["10.0.0.1"]["10.0.0.2"], CheckDetail::new(true, 7));
    }

    #[tokio::test]
    async fn serve_stops_on_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (tx, rx) = watch::channel(false);
        let router = build_router(test_state(Some(KEY)));

        let handle = tokio::spawn(serve(listener, router, rx, Duration::from_secs(1)));
        tx.send(true).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }

    #[test]
    fn errors_map_to_status_codes() {
        let (status, _): (StatusCode, String) = GossipError::Signature.into();
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _): (StatusCode, String) = GossipError::Malformed("x".into()).into();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _): (StatusCode, String) = GossipError::SelfSourced("x".into()).into();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _): (StatusCode, String) = GossipError::MissingSecret.into();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}

//! The introspection HTTP server (§4.6): a read-only JSON view of node
//! state for operators and dashboards. Off by default; when enabled it
//! binds to the configured address, which defaults to loopback so the
//! server is never reachable from outside the host without an explicit
//! override.

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tracing::{info, instrument};

use dep2p_transport::Transport;

use crate::error::Dep2pResult;
use crate::Node;

#[derive(Debug, Serialize)]
struct StatusView {
    node_id: String,
    started: bool,
    realm: String,
    connected_peers: usize,
}

#[derive(Debug, Serialize)]
struct PeerView {
    node_id: String,
    status: String,
    avg_rtt_ms: Option<u128>,
}

#[derive(Debug, Serialize)]
struct BandwidthView {
    total_bytes_sent: u64,
    total_bytes_received: u64,
    per_peer: usize,
}

async fn status<T: Transport + 'static>(State(node): State<Arc<Node<T>>>) -> impl IntoResponse {
    Json(StatusView {
        node_id: node.node_id().to_base58(),
        started: node.is_started(),
        realm: node.realm().manager().realm(),
        connected_peers: node.swarm().connected_count(),
    })
}

async fn peers<T: Transport + 'static>(State(node): State<Arc<Node<T>>>) -> impl IntoResponse {
    let views: Vec<PeerView> = node
        .swarm()
        .connected_peers()
        .into_iter()
        .map(|peer| {
            let liveness = node.realm().liveness();
            PeerView {
                node_id: peer.to_base58(),
                status: format!("{:?}", liveness.status(&peer)),
                avg_rtt_ms: liveness.avg_rtt(&peer).map(|d| d.as_millis()),
            }
        })
        .collect();
    Json(views)
}

async fn bandwidth<T: Transport + 'static>(State(node): State<Arc<Node<T>>>) -> impl IntoResponse {
    let report = node.swarm().bandwidth().rollup();
    Json(BandwidthView {
        total_bytes_sent: report.total_out,
        total_bytes_received: report.total_in,
        per_peer: report.top_peers.len(),
    })
}

fn router<T: Transport + 'static>(node: Arc<Node<T>>) -> Router {
    Router::new()
        .route("/status", get(status::<T>))
        .route("/peers", get(peers::<T>))
        .route("/bandwidth", get(bandwidth::<T>))
        .layer(CorsLayer::permissive())
        .with_state(node)
}

/// Binds and serves the introspection API until the returned task is
/// aborted, e.g. on node shutdown.
#[instrument(skip(node))]
pub async fn spawn<T: Transport + 'static>(node: Arc<Node<T>>) -> Dep2pResult<tokio::task::JoinHandle<()>> {
    let addr = node.config().introspect.addr;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| crate::error::Dep2pError::Io(e.to_string()))?;
    let app = router(node);
    info!(%addr, "introspection server listening");
    Ok(tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    }))
}

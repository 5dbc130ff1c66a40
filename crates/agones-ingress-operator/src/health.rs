//! Health check HTTP server for Kubernetes probes.
//!
//! Provides `/healthz` (liveness) and `/readyz` (readiness) endpoints.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::{debug, info};

/// Shared state for health check endpoints.
#[derive(Default)]
pub struct HealthState {
    /// Whether the health server has bound its listener.
    started: AtomicBool,
    /// Whether the object caches completed their initial list.
    synced: AtomicBool,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the operator as started.
    pub fn mark_started(&self) {
        self.started.store(true, Ordering::SeqCst);
        info!("Health check: operator marked as started");
    }

    /// Mark the object caches as synced.
    pub fn mark_synced(&self) {
        self.synced.store(true, Ordering::SeqCst);
        info!("Health check: caches marked as synced");
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn is_synced(&self) -> bool {
        self.synced.load(Ordering::SeqCst)
    }
}

/// Run the health check HTTP server.
///
/// Spawned alongside the watch loop; runs until the server encounters
/// a fatal error. The operator is marked as started only after the
/// server successfully binds, so readiness probes cannot succeed
/// before the listener exists.
pub async fn run_health_server(state: Arc<HealthState>, addr: SocketAddr) -> std::io::Result<()> {
    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .with_state(state.clone());

    let listener = TcpListener::bind(addr).await?;

    info!(addr = %addr, "Health check server listening");

    state.mark_started();

    axum::serve(listener, app).await
}

/// Liveness probe endpoint.
///
/// Returns 200 OK if the process is alive.
async fn healthz() -> StatusCode {
    debug!("Liveness probe: OK");
    StatusCode::OK
}

/// Readiness probe endpoint.
///
/// Returns 200 OK once startup completed and the object caches have
/// done their initial list; 503 Service Unavailable before that.
async fn readyz(State(state): State<Arc<HealthState>>) -> StatusCode {
    if !state.is_started() {
        debug!("Readiness probe: NOT READY (startup incomplete)");
        return StatusCode::SERVICE_UNAVAILABLE;
    }

    if !state.is_synced() {
        debug!("Readiness probe: NOT READY (caches not synced)");
        return StatusCode::SERVICE_UNAVAILABLE;
    }

    debug!("Readiness probe: OK");
    StatusCode::OK
}

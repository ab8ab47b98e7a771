//! Health and metrics HTTP server.
//!
//! Provides `/healthz` (liveness), `/readyz` (readiness) and `/metrics`
//! (Prometheus text exposition).

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use prometheus::{Registry, TextEncoder};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::api::ApiProbe;

/// Shared state for health check endpoints.
pub struct HealthState<P: ApiProbe> {
    /// Whether the operator has completed startup.
    started: AtomicBool,
    /// Reachability check against the orchestration API.
    probe: Arc<P>,
    registry: Registry,
}

impl<P: ApiProbe> HealthState<P> {
    pub fn new(probe: Arc<P>, registry: Registry) -> Self {
        Self {
            started: AtomicBool::new(false),
            probe,
            registry,
        }
    }

    /// Mark the operator as started and ready.
    pub fn mark_started(&self) {
        self.started.store(true, Ordering::SeqCst);
        info!("Health check: operator marked as started");
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }
}

/// Run the health and metrics HTTP server.
///
/// Runs until the server encounters a fatal error. Readiness stays false
/// until the caller marks the operator started once its controllers run.
pub async fn run_health_server<P: ApiProbe + 'static>(
    state: Arc<HealthState<P>>,
    port: u16,
) -> std::io::Result<()> {
    let app = router(state);

    // Metrics are scraped from outside the pod
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;

    info!(port = port, "Health and metrics server listening");

    axum::serve(listener, app).await
}

fn router<P: ApiProbe + 'static>(state: Arc<HealthState<P>>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz::<P>))
        .route("/metrics", get(metrics::<P>))
        .with_state(state)
}

/// Liveness probe endpoint.
async fn healthz() -> StatusCode {
    debug!("Liveness probe: OK");
    StatusCode::OK
}

/// Readiness probe endpoint.
///
/// Returns 503 Service Unavailable until startup completed or while the
/// orchestration API is unreachable.
async fn readyz<P: ApiProbe + 'static>(State(state): State<Arc<HealthState<P>>>) -> StatusCode {
    if !state.is_started() {
        debug!("Readiness probe: NOT READY (startup incomplete)");
        return StatusCode::SERVICE_UNAVAILABLE;
    }

    match state.probe.check().await {
        Ok(()) => {
            debug!("Readiness probe: OK");
            StatusCode::OK
        }
        Err(e) => {
            warn!(error = %e, "Readiness probe: NOT READY (API server unreachable)");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// Prometheus scrape endpoint.
async fn metrics<P: ApiProbe + 'static>(State(state): State<Arc<HealthState<P>>>) -> Response {
    match TextEncoder::new().encode_to_string(&state.registry.gather()) {
        Ok(body) => ([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockApiProbe;
    use crate::metrics::ReconcileMetrics;
    use crate::test_utils::api_error;

    fn state(probe: MockApiProbe) -> Arc<HealthState<MockApiProbe>> {
        Arc::new(HealthState::new(Arc::new(probe), Registry::new()))
    }

    #[tokio::test]
    async fn test_healthz_returns_ok() {
        assert_eq!(healthz().await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_readyz_returns_unavailable_before_startup() {
        let mut probe = MockApiProbe::new();
        probe.expect_check().never();

        let result = readyz(State(state(probe))).await;
        assert_eq!(result, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_readyz_returns_ok_when_api_reachable() {
        let mut probe = MockApiProbe::new();
        probe.expect_check().times(1).returning(|| Ok(()));
        let state = state(probe);
        state.mark_started();

        assert_eq!(readyz(State(state)).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_readyz_returns_unavailable_when_api_unreachable() {
        let mut probe = MockApiProbe::new();
        probe
            .expect_check()
            .returning(|| Err(api_error(503, "ServiceUnavailable")));
        let state = state(probe);
        state.mark_started();

        assert_eq!(readyz(State(state)).await, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_mark_started_is_idempotent() {
        let state = state(MockApiProbe::new());

        assert!(!state.is_started());
        state.mark_started();
        state.mark_started();
        assert!(state.is_started());
    }

    #[tokio::test]
    async fn test_server_bind_does_not_mark_started() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let state = state(MockApiProbe::new());
        let server = tokio::spawn(run_health_server(state.clone(), port));

        let mut bound = false;
        for _ in 0..100 {
            if tokio::net::TcpStream::connect(("127.0.0.1", port)).await.is_ok() {
                bound = true;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        server.abort();

        assert!(bound);
        assert!(!state.is_started());
    }

    #[tokio::test]
    async fn test_metrics_exposes_registry() {
        let registry = Registry::new();
        let reconcile_metrics = ReconcileMetrics::new().unwrap().register(&registry).unwrap();
        reconcile_metrics.pass_started("abc12");
        let state = Arc::new(HealthState::new(Arc::new(MockApiProbe::new()), registry));

        let response = metrics::<MockApiProbe>(State(state)).await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("reconciliation_total{namespace=\"abc12\"} 1"));
    }
}

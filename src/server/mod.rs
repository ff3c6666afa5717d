//! HTTP surface.
//!
//! ```text
//! POST /api/emergency/override   authorize + apply an override
//! GET  /api/emergency/status     current status (allowlisted callers)
//! GET  /health                   liveness
//! GET  /api/ping                 gated platform route
//! ```
//!
//! The peer address comes from `ConnectInfo<SocketAddr>`, never from
//! forwarding headers.

pub mod handlers;
pub mod response;
pub mod status_gate;

use crate::gateway::OverrideGateway;
use crate::status::StatusHandle;
use crate::GatewayError;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// How often idle rate-limit windows are swept.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Full application with the built-in platform routes.
pub fn router(gateway: Arc<OverrideGateway>) -> Router {
    let platform = Router::new().route("/api/ping", get(handlers::ping));
    with_platform_routes(gateway, platform)
}

/// Mount `platform` behind the status gate, next to the emergency routes.
pub fn with_platform_routes(gateway: Arc<OverrideGateway>, platform: Router) -> Router {
    let gated = platform.layer(middleware::from_fn_with_state(
        gateway.status_handle().clone(),
        status_gate::status_gate,
    ));

    Router::new()
        .route("/api/emergency/override", post(handlers::emergency_override))
        .route("/api/emergency/status", get(handlers::emergency_status))
        .route("/health", get(handlers::health))
        .with_state(gateway)
        .merge(gated)
        .layer(TraceLayer::new_for_http())
}

/// Bind `addr` and serve until Ctrl-C.
pub async fn serve(gateway: Arc<OverrideGateway>, addr: SocketAddr) -> Result<(), GatewayError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| GatewayError::ServerIO(format!("failed to bind {}: {}", addr, e)))?;
    serve_on(listener, gateway, shutdown_signal()).await
}

/// Serve on an already-bound listener until `shutdown` resolves.
///
/// Runs the rate-limit sweeper and a status-change logger alongside the
/// server, and flushes the audit trail before returning.
pub async fn serve_on<F>(
    listener: TcpListener,
    gateway: Arc<OverrideGateway>,
    shutdown: F,
) -> Result<(), GatewayError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let local_addr = listener
        .local_addr()
        .map_err(|e| GatewayError::ServerIO(format!("listener has no address: {}", e)))?;
    tracing::info!(addr = %local_addr, "emergency gateway listening");

    let sweeper = tokio::spawn(sweep_rate_limits(Arc::clone(&gateway)));
    let watcher = tokio::spawn(log_status_changes(gateway.status_handle().clone()));

    let app = router(Arc::clone(&gateway));
    let result = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    .map_err(|e| GatewayError::ServerIO(format!("server error: {}", e)));

    sweeper.abort();
    watcher.abort();
    if let Err(e) = gateway.audit_log().flush().await {
        tracing::warn!(error = %e, "audit flush on shutdown failed");
    }
    tracing::info!("emergency gateway stopped");
    result
}

async fn sweep_rate_limits(gateway: Arc<OverrideGateway>) {
    let mut interval = tokio::time::interval(SWEEP_INTERVAL);
    loop {
        interval.tick().await;
        let forgotten = gateway.sweep_rate_limits();
        if forgotten > 0 {
            tracing::debug!(forgotten, "rate-limit windows swept");
        }
    }
}

async fn log_status_changes(status: StatusHandle) {
    let mut rx = status.subscribe();
    while rx.changed().await.is_ok() {
        let current = rx.borrow_and_update().clone();
        tracing::warn!(
            status = %current.current,
            by = ?current.changed_by_ip,
            at = %current.changed_at,
            "platform status changed"
        );
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}

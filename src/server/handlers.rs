//! Route handlers.

use crate::crypto::credential::EMERGENCY_KEY_HEADER;
use crate::gateway::{OverrideAttempt, OverrideGateway};
use crate::status::SystemStatus;
use crate::GatewayError;
use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;

/// `POST /api/emergency/override`
pub async fn emergency_override(
    State(gateway): State<Arc<OverrideGateway>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(ConnectInfo(peer)) = connect_info else {
        return gateway.reject_unattributed(&body).into_response();
    };

    let emergency_key = headers
        .get(EMERGENCY_KEY_HEADER)
        .and_then(|value| value.to_str().ok());

    let attempt = OverrideAttempt {
        source_ip: peer.ip(),
        emergency_key,
        body: &body,
    };

    match gateway.authorize(attempt) {
        Ok(grant) => Json(grant.receipt()).into_response(),
        Err(e) => e.into_response(),
    }
}

/// `GET /api/emergency/status` (allowlisted callers only)
pub async fn emergency_status(
    State(gateway): State<Arc<OverrideGateway>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
) -> Result<Json<SystemStatus>, GatewayError> {
    match connect_info {
        Some(ConnectInfo(peer)) if gateway.is_allowed_source(peer.ip()) => {
            Ok(Json(gateway.status()))
        }
        _ => Err(GatewayError::Forbidden),
    }
}

/// `GET /health`
pub async fn health(State(gateway): State<Arc<OverrideGateway>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "platform_status": gateway.status().current,
    }))
}

/// `GET /api/ping`, a minimal gated platform route.
pub async fn ping() -> Json<Value> {
    Json(json!({ "pong": true }))
}

//! Platform status gate.
//!
//! Applied to ordinary platform routes only. While the platform is in
//! `SHUTDOWN` every gated request gets `503`; in `SAFE_MODE` gated requests
//! get `403`. Emergency and health routes are mounted outside the gate so
//! an operator can always reach them.

use crate::protocol::models::ErrorEnvelope;
use crate::status::{PlatformStatus, StatusHandle};
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;

/// Middleware reading the shared status on every request.
pub async fn status_gate(
    State(status): State<StatusHandle>,
    request: Request,
    next: Next,
) -> Response {
    match status.platform_status() {
        PlatformStatus::Normal => next.run(request).await,
        PlatformStatus::SafeMode => blocked(
            StatusCode::FORBIDDEN,
            "The system is in safe mode.",
            "SAFE_MODE",
        ),
        PlatformStatus::Shutdown => blocked(
            StatusCode::SERVICE_UNAVAILABLE,
            "The system is currently down for maintenance.",
            "SHUTDOWN",
        ),
    }
}

fn blocked(status: StatusCode, message: &str, code: &str) -> Response {
    let body = ErrorEnvelope {
        error: true,
        message: message.to_string(),
        code: code.to_string(),
    };
    (status, Json(body)).into_response()
}

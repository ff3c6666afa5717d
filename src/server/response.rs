//! HTTP error mapping.
//!
//! Authentication failures share one status, message and code so a caller
//! cannot tell which factor failed. The audit trail keeps the real reason.

use crate::protocol::models::ErrorEnvelope;
use crate::GatewayError;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

/// Message shown for every authentication failure.
pub const AUTHENTICATION_FAILED: &str = "authentication failed";

impl GatewayError {
    /// HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::Forbidden | GatewayError::NoPeerAddress => StatusCode::FORBIDDEN,
            GatewayError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            e if e.is_authentication_failure() => StatusCode::UNAUTHORIZED,
            GatewayError::TransitionRejected { .. } => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable code for client handling.
    pub fn error_code(&self) -> &'static str {
        match self {
            GatewayError::RateLimited { .. } => "TOO_MANY_REQUESTS",
            GatewayError::Forbidden | GatewayError::NoPeerAddress => "FORBIDDEN",
            GatewayError::MalformedRequest(_) => "BAD_REQUEST",
            e if e.is_authentication_failure() => "AUTHENTICATION_FAILED",
            GatewayError::TransitionRejected { .. } => "CONFLICT",
            _ => "INTERNAL_SERVER_ERROR",
        }
    }

    /// Client-safe message.
    pub fn client_message(&self) -> String {
        match self {
            GatewayError::RateLimited { .. } => {
                "Too many attempts. Try again later.".to_string()
            }
            GatewayError::Forbidden | GatewayError::NoPeerAddress => "Access denied.".to_string(),
            GatewayError::MalformedRequest(detail) => detail.clone(),
            e if e.is_authentication_failure() => AUTHENTICATION_FAILED.to_string(),
            GatewayError::TransitionRejected { from, to } => {
                format!("Cannot move from {} to {}.", from, to)
            }
            _ => "Internal server error.".to_string(),
        }
    }

    /// JSON body for this error.
    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            error: true,
            message: self.client_message(),
            code: self.error_code().to_string(),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let mut response = (self.status_code(), Json(self.envelope())).into_response();
        if let GatewayError::RateLimited {
            retry_after_seconds,
        } = self
        {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_seconds));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_failures_are_indistinguishable() {
        let errors = [
            GatewayError::StaleRequest { skew_seconds: 600 },
            GatewayError::InvalidEmergencyKey,
            GatewayError::InvalidTotp,
            GatewayError::InvalidSignature,
        ];
        for error in errors {
            assert_eq!(error.status_code(), StatusCode::UNAUTHORIZED);
            let envelope = error.envelope();
            assert_eq!(envelope.message, AUTHENTICATION_FAILED);
            assert_eq!(envelope.code, "AUTHENTICATION_FAILED");
        }
    }

    #[test]
    fn test_rate_limited_sets_retry_after() {
        let response = GatewayError::RateLimited {
            retry_after_seconds: 42,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "42");
    }

    #[test]
    fn test_internal_errors_hide_detail() {
        let error = GatewayError::AuditIO("/var/lib/secret/path".to_string());
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!error.client_message().contains("/var/lib"));
    }

    #[test]
    fn test_missing_peer_looks_like_forbidden() {
        let error = GatewayError::NoPeerAddress;
        assert_eq!(error.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(error.envelope(), GatewayError::Forbidden.envelope());
    }

    #[test]
    fn test_distinct_statuses() {
        assert_eq!(GatewayError::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            GatewayError::MalformedRequest("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            GatewayError::TransitionRejected {
                from: crate::status::PlatformStatus::Shutdown,
                to: crate::status::PlatformStatus::Normal,
            }
            .status_code(),
            StatusCode::CONFLICT
        );
    }
}

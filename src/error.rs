//! Gateway error taxonomy.
//!
//! Every request that does not reach a backend, or whose backend could not be
//! reached, terminates with exactly one of these errors. Each maps to one HTTP
//! status and one taxonomy tag used in log fields and metric labels.
//!
//! # Design Decisions
//! - Rejections are expected outcomes, never panics
//! - Response bodies are empty so no internal detail leaks to the client
//! - The reason string is for logs only

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// Terminal outcome of a single request pipeline.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// No routing rule matched the request path.
    #[error("no matching route")]
    RoutingNotFound,

    /// Protected route without an `Authorization` header.
    #[error("missing credential")]
    MissingCredential,

    /// `Authorization` header does not start with `Bearer `.
    #[error("malformed scheme")]
    MalformedScheme,

    /// `Bearer ` prefix followed by nothing.
    #[error("empty token")]
    EmptyToken,

    /// Token failed structure, signature, expiry or claim checks.
    #[error("invalid or expired token")]
    InvalidOrExpiredToken,

    /// The backend name resolved to no instance able to take the request.
    #[error("no healthy backend available")]
    BackendUnavailable,

    /// An instance was selected but the upstream exchange failed.
    #[error("upstream request failed")]
    UpstreamFailed,
}

/// Taxonomy tag of a [`GatewayError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    RoutingNotFound,
    MissingCredential,
    MalformedCredential,
    InvalidOrExpiredToken,
    BackendUnavailable,
    UpstreamFailed,
}

impl ErrorKind {
    /// Stable label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::RoutingNotFound => "routing_not_found",
            ErrorKind::MissingCredential => "missing_credential",
            ErrorKind::MalformedCredential => "malformed_credential",
            ErrorKind::InvalidOrExpiredToken => "invalid_or_expired_token",
            ErrorKind::BackendUnavailable => "backend_unavailable",
            ErrorKind::UpstreamFailed => "upstream_failed",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::RoutingNotFound => ErrorKind::RoutingNotFound,
            GatewayError::MissingCredential => ErrorKind::MissingCredential,
            GatewayError::MalformedScheme | GatewayError::EmptyToken => {
                ErrorKind::MalformedCredential
            }
            GatewayError::InvalidOrExpiredToken => ErrorKind::InvalidOrExpiredToken,
            GatewayError::BackendUnavailable => ErrorKind::BackendUnavailable,
            GatewayError::UpstreamFailed => ErrorKind::UpstreamFailed,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::RoutingNotFound => StatusCode::NOT_FOUND,
            ErrorKind::MissingCredential
            | ErrorKind::MalformedCredential
            | ErrorKind::InvalidOrExpiredToken => StatusCode::UNAUTHORIZED,
            ErrorKind::BackendUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::UpstreamFailed => StatusCode::BAD_GATEWAY,
        }
    }

    /// True for the 401 family.
    pub fn is_auth_failure(&self) -> bool {
        self.status_code() == StatusCode::UNAUTHORIZED
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        self.status_code().into_response()
    }
}

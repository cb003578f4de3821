//! Authentication error taxonomy.

use axum::http::StatusCode;
use thiserror::Error;

/// Why a request could not be authenticated or authorized.
///
/// Every variant is terminal for the current request. Only
/// `PersistenceUnavailable` is a server-side condition that a client may
/// retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Token is not a well-formed signed token or its claims are unreadable
    #[error("malformed token")]
    Malformed,
    /// Signature does not verify against the configured public key
    #[error("token signature is invalid")]
    BadSignature,
    /// Current time is outside the signed `[iat, exp]` window
    #[error("token has expired")]
    Expired,
    /// No live token record backs this token
    #[error("token has been revoked")]
    Revoked,
    /// No bearer credential on the request
    #[error("no bearer credential provided")]
    NoCredential,
    /// Token is valid but its principal no longer exists
    #[error("token principal not found")]
    UnknownPrincipal,
    /// Authenticated, but the route needs an administrator
    #[error("insufficient privilege")]
    InsufficientPrivilege,
    /// The token store could not be reached in time
    #[error("token store unavailable: {0}")]
    PersistenceUnavailable(String),
    /// Local failure unrelated to the presented credential
    #[error("internal auth error: {0}")]
    Internal(String),
}

impl AuthError {
    /// HTTP status this error is reported with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Malformed
            | Self::BadSignature
            | Self::Expired
            | Self::Revoked
            | Self::NoCredential
            | Self::UnknownPrincipal => StatusCode::UNAUTHORIZED,
            Self::InsufficientPrivilege => StatusCode::FORBIDDEN,
            Self::PersistenceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to the caller.
    ///
    /// Authentication failures all read "Unauthorized" so a client cannot
    /// tell which check rejected its token.
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::InsufficientPrivilege => "Forbidden",
            Self::PersistenceUnavailable(_) => "Service temporarily unavailable",
            Self::Internal(_) => "Internal server error",
            _ => "Unauthorized",
        }
    }

    /// Whether the caller's transport may retry the request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::PersistenceUnavailable(_))
    }
}

//! Response envelope and error mapping.

use axum::Json;
use axum::http::header::RETRY_AFTER;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::auth::{AuthError, UserStoreError};

/// Shape of every response body.
///
/// Failures carry `success: 0`, an `error` message and an empty `data` array.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: u8,
    pub data: T,
    pub error: Option<String>,
    pub errors: Vec<String>,
    pub extra: Vec<Value>,
}

impl<T: Serialize> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: 1,
            data,
            error: None,
            errors: Vec::new(),
            extra: Vec::new(),
        }
    }
}

impl Envelope<Value> {
    pub fn failure(error: impl Into<String>, errors: Vec<String>) -> Self {
        Self {
            success: 0,
            data: Value::Array(Vec::new()),
            error: Some(error.into()),
            errors,
            extra: Vec::new(),
        }
    }
}

/// 200 with `data`.
pub fn ok<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope::ok(data))
}

/// 201 with `data`.
pub fn created<T: Serialize>(data: T) -> (StatusCode, Json<Envelope<T>>) {
    (StatusCode::CREATED, Json(Envelope::ok(data)))
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Request understood but refused, e.g. failed login or a taken email
    #[error("{message}")]
    Unprocessable {
        message: String,
        errors: Vec<String>,
    },

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::Unprocessable {
            message: message.into(),
            errors: Vec::new(),
        }
    }

    pub fn login_failed() -> Self {
        Self::unprocessable("Failed to authenticate user")
    }
}

impl From<UserStoreError> for ApiError {
    fn from(err: UserStoreError) -> Self {
        match err {
            UserStoreError::DuplicateEmail => Self::Unprocessable {
                message: "Validation failed".to_string(),
                errors: vec!["The email has already been taken.".to_string()],
            },
            UserStoreError::Invalid(reason) => Self::Unprocessable {
                message: "Validation failed".to_string(),
                errors: vec![reason.to_string()],
            },
            UserStoreError::Hashing(e) => Self::Internal(anyhow::anyhow!(e)),
            UserStoreError::Database(e) => Self::Internal(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Auth(err) => {
                tracing::debug!("request refused: {}", err);
                let status = err.status_code();
                let body = Json(Envelope::failure(err.public_message(), Vec::new()));

                if err.is_retryable() {
                    let mut response = (status, body).into_response();
                    response
                        .headers_mut()
                        .insert(RETRY_AFTER, HeaderValue::from_static("1"));
                    response
                } else {
                    (status, body).into_response()
                }
            }
            ApiError::Unprocessable { message, errors } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(Envelope::failure(message, errors)),
            )
                .into_response(),
            ApiError::Internal(err) => {
                tracing::error!("request failed: {:#}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(Envelope::failure("Internal server error", Vec::new())),
                )
                    .into_response()
            }
        }
    }
}

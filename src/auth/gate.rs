//! Request-boundary authentication and privilege checks.

use std::sync::Arc;

use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use chrono::{DateTime, Utc};
use surrealdb::sql::Datetime;
use tracing::{debug, error, warn};

use crate::auth::context::Principal;
use crate::auth::error::AuthError;
use crate::auth::token_store::{TokenRecordStore, bounded};
use crate::auth::user_store::PrincipalDirectory;
use crate::auth::validator::TokenValidator;
use crate::config::AuthConfig;

/// Which principals a protected route admits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatePolicy {
    /// Any authenticated principal
    User,
    /// Authenticated principals with the admin flag
    Admin,
}

/// Turns an `Authorization` header into a [`Principal`], or refuses.
#[derive(Clone)]
pub struct AuthGate {
    validator: TokenValidator,
    directory: Arc<dyn PrincipalDirectory>,
    store: Arc<dyn TokenRecordStore>,
    config: Arc<AuthConfig>,
}

impl AuthGate {
    pub fn new(
        validator: TokenValidator,
        directory: Arc<dyn PrincipalDirectory>,
        store: Arc<dyn TokenRecordStore>,
        config: Arc<AuthConfig>,
    ) -> Self {
        Self {
            validator,
            directory,
            store,
            config,
        }
    }

    pub async fn authenticate(
        &self,
        authorization: Option<&str>,
        policy: GatePolicy,
    ) -> Result<Principal, AuthError> {
        self.authenticate_at(authorization, policy, Utc::now()).await
    }

    /// Read the bearer credential straight from request headers.
    pub async fn authenticate_headers(
        &self,
        headers: &HeaderMap,
        policy: GatePolicy,
    ) -> Result<Principal, AuthError> {
        let header = match headers.get(AUTHORIZATION) {
            Some(value) => Some(value.to_str().map_err(|_| AuthError::Malformed)?),
            None => None,
        };
        self.authenticate(header, policy).await
    }

    pub async fn authenticate_at(
        &self,
        authorization: Option<&str>,
        policy: GatePolicy,
        now: DateTime<Utc>,
    ) -> Result<Principal, AuthError> {
        let token = authorization
            .and_then(bearer_token)
            .ok_or(AuthError::NoCredential)?;

        let session = self.validator.session_at(token, now).await?;

        let principal = bounded(
            self.config.store_timeout(),
            self.directory.find_by_external_id(session.external_id()),
        )
        .await
        .inspect_err(|e| error!(user = %session.external_id(), "principal lookup failed: {}", e))?
        .ok_or_else(|| {
            debug!(user = %session.external_id(), "token principal no longer exists");
            AuthError::UnknownPrincipal
        })?;

        // A record owned by someone else cannot back this principal's token.
        if principal.id() != &session.record.owner_id {
            warn!(user = %principal.external_id(), token = %session.record.unique_id, "token record owner mismatch");
            return Err(AuthError::UnknownPrincipal);
        }

        if policy == GatePolicy::Admin && !principal.is_admin() {
            debug!(user = %principal.external_id(), "admin route refused");
            return Err(AuthError::InsufficientPrivilege);
        }

        if self.config.touch_last_used {
            let touched = bounded(
                self.config.store_timeout(),
                self.store.touch(&session.record.id, Datetime::from(now)),
            )
            .await;
            if let Err(e) = touched {
                warn!(token = %session.record.unique_id, "could not record token use: {}", e);
            }
        }

        Ok(principal)
    }
}

/// Extract the credential from `Bearer <token>`.
///
/// The scheme is matched case-insensitively; an empty token counts as absent.
fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_token_parsing() {
        assert_eq!(bearer_token("Bearer abc.def.ghi"), Some("abc.def.ghi"));
        assert_eq!(bearer_token("bearer   abc "), Some("abc"));
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token("Bearer"), None);
        assert_eq!(bearer_token("Basic dXNlcjpwYXNz"), None);
        assert_eq!(bearer_token(""), None);
    }
}

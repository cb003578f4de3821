//! Token issuance.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Header, encode};
use serde::Serialize;
use surrealdb::sql::Datetime;
use tracing::{error, info};

use crate::auth::claims::SessionClaims;
use crate::auth::context::Principal;
use crate::auth::error::AuthError;
use crate::auth::keys::{KeyMaterial, SIGNING_ALGORITHM};
use crate::auth::token_store::{TokenRecordStore, bounded};
use crate::config::AuthConfig;
use crate::db::TokenRecordCreate;
use crate::types::TokenId;

const TOKEN_TITLE: &str = "User Auth Token";

/// A freshly minted bearer token and the record it is tied to.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub unique_id: TokenId,
    pub expires_at: DateTime<Utc>,
}

/// Mints signed tokens and records them.
#[derive(Clone)]
pub struct TokenIssuer {
    keys: Arc<KeyMaterial>,
    store: Arc<dyn TokenRecordStore>,
    config: Arc<AuthConfig>,
}

impl TokenIssuer {
    pub fn new(keys: Arc<KeyMaterial>, store: Arc<dyn TokenRecordStore>, config: Arc<AuthConfig>) -> Self {
        Self { keys, store, config }
    }

    pub async fn issue(&self, principal: &Principal) -> Result<IssuedToken, AuthError> {
        self.issue_at(principal, Utc::now()).await
    }

    /// Issue a token as of `now`.
    ///
    /// The token string is only returned once its record is stored. If the
    /// insert fails or times out the signed string is dropped.
    pub async fn issue_at(&self, principal: &Principal, now: DateTime<Utc>) -> Result<IssuedToken, AuthError> {
        let unique_id = TokenId::generate();
        let expires_at = now.checked_add_signed(self.config.token_ttl()).ok_or_else(|| {
            error!(ttl = self.config.token_ttl_seconds, "token lifetime overflows the clock");
            AuthError::Internal("token lifetime out of range".to_string())
        })?;

        let claims = SessionClaims::new(
            self.config.issuer.clone(),
            now,
            expires_at,
            principal.external_id().clone(),
            unique_id.clone(),
        );

        let token = encode(&Header::new(SIGNING_ALGORITHM), &claims, self.keys.encoding_key())
            .map_err(|e| {
                error!("failed to sign token: {}", e);
                AuthError::Internal("token signing failed".to_string())
            })?;

        let record = TokenRecordCreate {
            owner_id: principal.id().clone(),
            unique_id: unique_id.clone(),
            token_title: TOKEN_TITLE.to_string(),
            permissions: vec!["*".to_string()],
            restrictions: None,
            expires_at: Datetime::from(expires_at),
            last_used_at: Some(Datetime::from(now)),
            refreshed_at: Some(Datetime::from(now)),
            created_at: Datetime::from(now),
        };

        bounded(self.config.store_timeout(), self.store.insert(record))
            .await
            .inspect_err(|e| {
                error!(user = %principal.external_id(), "token not issued: {}", e);
            })?;

        info!(user = %principal.external_id(), token = %unique_id, "issued session token");

        Ok(IssuedToken {
            token,
            unique_id,
            expires_at,
        })
    }
}

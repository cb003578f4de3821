//! Token validation: signature, time window, then the live record.

use std::collections::HashSet;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Validation, decode, decode_header};
use surrealdb::sql::Datetime;
use tracing::{debug, error};

use crate::auth::claims::SessionClaims;
use crate::auth::error::AuthError;
use crate::auth::keys::{SIGNING_ALGORITHM, VerifyingKey};
use crate::auth::token_store::{TokenRecordStore, bounded};
use crate::config::AuthConfig;
use crate::db::TokenRecord;
use crate::types::ExternalUserId;

/// A token that passed every check, with the record that keeps it alive.
#[derive(Debug, Clone)]
pub struct ValidatedSession {
    pub claims: SessionClaims,
    pub record: TokenRecord,
}

impl ValidatedSession {
    pub fn external_id(&self) -> &ExternalUserId {
        &self.claims.user_uuid
    }
}

/// Verifies presented tokens.
///
/// Only needs the public key, so it can run in processes that cannot issue.
#[derive(Clone)]
pub struct TokenValidator {
    key: VerifyingKey,
    store: Arc<dyn TokenRecordStore>,
    config: Arc<AuthConfig>,
    validation: Validation,
}

impl TokenValidator {
    pub fn new(key: VerifyingKey, store: Arc<dyn TokenRecordStore>, config: Arc<AuthConfig>) -> Self {
        // Time checks run against an injected clock in `session_at`.
        let mut validation = Validation::new(SIGNING_ALGORITHM);
        validation.required_spec_claims = HashSet::new();
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.set_issuer(&[config.issuer.as_str()]);

        Self {
            key,
            store,
            config,
            validation,
        }
    }

    pub async fn validate(&self, token: &str) -> Result<ExternalUserId, AuthError> {
        self.validate_at(token, Utc::now()).await
    }

    /// Validate as of `now`, returning the principal's external id.
    pub async fn validate_at(&self, token: &str, now: DateTime<Utc>) -> Result<ExternalUserId, AuthError> {
        self.session_at(token, now)
            .await
            .map(|session| session.claims.user_uuid)
    }

    /// Run every check and keep the backing record.
    ///
    /// Order: structure, signature, signed time window, record lookup. The
    /// first failure wins and the store is only touched once the token is
    /// known to be genuine and current.
    pub async fn session_at(&self, token: &str, now: DateTime<Utc>) -> Result<ValidatedSession, AuthError> {
        let claims = self.verify_signed(token)?;

        if !claims.is_current_at(now, self.config.clock_skew()) {
            debug!(user = %claims.user_uuid, exp = claims.exp, "token outside its validity window");
            return Err(AuthError::Expired);
        }

        let record = bounded(
            self.config.store_timeout(),
            self.store.find_by_unique_id(&claims.unique_id),
        )
        .await
        .inspect_err(|e| error!(token = %claims.unique_id, "token lookup failed: {}", e))?;

        let Some(record) = record else {
            debug!(token = %claims.unique_id, "no record for token");
            return Err(AuthError::Revoked);
        };

        if !record.is_usable_at(&Datetime::from(now)) {
            debug!(token = %claims.unique_id, "token record no longer usable");
            return Err(AuthError::Revoked);
        }

        Ok(ValidatedSession { claims, record })
    }

    fn verify_signed(&self, token: &str) -> Result<SessionClaims, AuthError> {
        parse_unverified(token)?;

        decode::<SessionClaims>(token, self.key.decoding_key(), &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                let mapped = match e.kind() {
                    ErrorKind::InvalidSignature
                    | ErrorKind::InvalidAlgorithm
                    | ErrorKind::InvalidIssuer => AuthError::BadSignature,
                    _ => AuthError::Malformed,
                };
                debug!("rejected token: {}", e);
                mapped
            })
    }
}

/// Structural check: three segments, a readable header and a payload that
/// deserializes into [`SessionClaims`]. Nothing here is trusted yet.
fn parse_unverified(token: &str) -> Result<SessionClaims, AuthError> {
    let mut segments = token.split('.');
    let (Some(_), Some(payload), Some(_), None) =
        (segments.next(), segments.next(), segments.next(), segments.next())
    else {
        debug!("rejected token: not three segments");
        return Err(AuthError::Malformed);
    };

    decode_header(token).map_err(|e| {
        debug!("rejected token header: {}", e);
        AuthError::Malformed
    })?;

    let bytes = URL_SAFE_NO_PAD.decode(payload).map_err(|e| {
        debug!("rejected token payload encoding: {}", e);
        AuthError::Malformed
    })?;

    serde_json::from_slice(&bytes).map_err(|e| {
        debug!("rejected token claims: {}", e);
        AuthError::Malformed
    })
}

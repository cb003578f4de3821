//! Logout.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use surrealdb::sql::Datetime;
use tracing::{debug, error, info};

use crate::auth::context::Principal;
use crate::auth::error::AuthError;
use crate::auth::token_store::{TokenRecordStore, bounded};
use crate::config::AuthConfig;

/// Ends sessions by backdating the expiry of a token record.
///
/// Only the principal's most recently issued record is ended, whichever
/// token the logout request presented. Other devices stay signed in.
#[derive(Clone)]
pub struct SessionTerminator {
    store: Arc<dyn TokenRecordStore>,
    config: Arc<AuthConfig>,
}

impl SessionTerminator {
    pub fn new(store: Arc<dyn TokenRecordStore>, config: Arc<AuthConfig>) -> Self {
        Self { store, config }
    }

    pub async fn invalidate(&self, principal: &Principal) -> Result<(), AuthError> {
        self.invalidate_at(principal, Utc::now()).await
    }

    /// Idempotent: a principal with no records, or whose newest record has
    /// already lapsed, still gets `Ok(())`.
    pub async fn invalidate_at(&self, principal: &Principal, now: DateTime<Utc>) -> Result<(), AuthError> {
        let latest = bounded(
            self.config.store_timeout(),
            self.store.latest_for_owner(principal.id()),
        )
        .await
        .inspect_err(|e| error!(user = %principal.external_id(), "logout lookup failed: {}", e))?;

        let Some(record) = latest else {
            debug!(user = %principal.external_id(), "logout with no token records");
            return Ok(());
        };

        let now = Datetime::from(now);
        let expires_at = if record.expires_at < now {
            record.expires_at.clone()
        } else {
            now.clone()
        };

        bounded(
            self.config.store_timeout(),
            self.store.set_expiry(&record.id, expires_at, now),
        )
        .await
        .inspect_err(|e| error!(user = %principal.external_id(), "logout update failed: {}", e))?;

        info!(user = %principal.external_id(), token = %record.unique_id, "session ended");
        Ok(())
    }
}

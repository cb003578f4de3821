//! Storage of issued-token metadata.

use std::future::Future;
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use surrealdb::RecordId;
use surrealdb::sql::Datetime;

use crate::auth::error::AuthError;
use crate::db::{Db, TokenRecord, TokenRecordCreate};
use crate::types::TokenId;

/// Persistence for token records.
///
/// Each method is a single-row operation; atomicity comes from the backing
/// store.
#[async_trait]
pub trait TokenRecordStore: Send + Sync {
    /// Insert the record for a freshly signed token.
    async fn insert(&self, record: TokenRecordCreate) -> Result<TokenRecord>;

    async fn find_by_unique_id(&self, unique_id: &TokenId) -> Result<Option<TokenRecord>>;

    /// Most recently issued record for a user, by `created_at`.
    async fn latest_for_owner(&self, owner_id: &RecordId) -> Result<Option<TokenRecord>>;

    /// End a session: set `expires_at` and stamp `revoked_at`.
    async fn set_expiry(&self, id: &RecordId, expires_at: Datetime, revoked_at: Datetime) -> Result<()>;

    /// Record that the token was just used.
    async fn touch(&self, id: &RecordId, used_at: Datetime) -> Result<()>;
}

/// Run one store call under `limit`.
///
/// Store errors and timeouts both come back as `PersistenceUnavailable`.
pub(crate) async fn bounded<T, F>(limit: Duration, fut: F) -> Result<T, AuthError>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(AuthError::PersistenceUnavailable(format!("{:#}", e))),
        Err(_) => Err(AuthError::PersistenceUnavailable(format!(
            "no response within {}ms",
            limit.as_millis()
        ))),
    }
}

/// SurrealDB-backed token store (table: `token_record`).
#[derive(Clone)]
pub struct SurrealTokenStore {
    db: Db,
}

impl SurrealTokenStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TokenRecordStore for SurrealTokenStore {
    async fn insert(&self, record: TokenRecordCreate) -> Result<TokenRecord> {
        let query = r#"
            CREATE token_record CONTENT {
                owner_id: $owner_id,
                unique_id: $unique_id,
                token_title: $token_title,
                permissions: $permissions,
                restrictions: $restrictions,
                expires_at: $expires_at,
                last_used_at: $last_used_at,
                refreshed_at: $refreshed_at,
                created_at: $created_at
            }
        "#;

        let mut res = self.db
            .query(query)
            .bind(("owner_id", record.owner_id))
            .bind(("unique_id", record.unique_id))
            .bind(("token_title", record.token_title))
            .bind(("permissions", record.permissions))
            .bind(("restrictions", record.restrictions))
            .bind(("expires_at", record.expires_at))
            .bind(("last_used_at", record.last_used_at))
            .bind(("refreshed_at", record.refreshed_at))
            .bind(("created_at", record.created_at))
            .await?;

        let created: Vec<TokenRecord> = res.take(0)?;
        created.into_iter().next()
            .ok_or_else(|| anyhow!("failed to create token record"))
    }

    async fn find_by_unique_id(&self, unique_id: &TokenId) -> Result<Option<TokenRecord>> {
        let query = "SELECT * FROM token_record WHERE unique_id = $unique_id LIMIT 1";

        let mut res = self.db
            .query(query)
            .bind(("unique_id", unique_id.clone()))
            .await?;

        let records: Vec<TokenRecord> = res.take(0)?;
        Ok(records.into_iter().next())
    }

    async fn latest_for_owner(&self, owner_id: &RecordId) -> Result<Option<TokenRecord>> {
        let query = r#"
            SELECT * FROM token_record
            WHERE owner_id = $owner_id
            ORDER BY created_at DESC
            LIMIT 1
        "#;

        let mut res = self.db
            .query(query)
            .bind(("owner_id", owner_id.clone()))
            .await?;

        let records: Vec<TokenRecord> = res.take(0)?;
        Ok(records.into_iter().next())
    }

    async fn set_expiry(&self, id: &RecordId, expires_at: Datetime, revoked_at: Datetime) -> Result<()> {
        let query = r#"
            UPDATE $id SET
                expires_at = $expires_at,
                revoked_at = $revoked_at
        "#;

        self.db
            .query(query)
            .bind(("id", id.clone()))
            .bind(("expires_at", expires_at))
            .bind(("revoked_at", revoked_at))
            .await?
            .check()?;

        Ok(())
    }

    async fn touch(&self, id: &RecordId, used_at: Datetime) -> Result<()> {
        let query = "UPDATE $id SET last_used_at = $used_at";

        self.db
            .query(query)
            .bind(("id", id.clone()))
            .bind(("used_at", used_at))
            .await?
            .check()?;

        Ok(())
    }
}

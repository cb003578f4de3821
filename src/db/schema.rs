use serde::{Deserialize, Serialize};
use surrealdb::{RecordId, sql::Datetime};

use crate::types::{ExternalUserId, TokenId};

/// Persisted user record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    /// Database identifier (internal; token records point at it)
    pub id: RecordId,
    /// Public identifier carried in tokens
    pub external_id: ExternalUserId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    /// Argon2 PHC string
    pub password_hash: String,
    /// Grants access to admin-gated routes
    pub is_admin: bool,
    pub address: Option<String>,
    pub phone_number: Option<String>,
    #[serde(default)]
    pub is_marketing: bool,
    pub created_at: Option<Datetime>,
}

/// Payload for creating a new user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserCreate {
    pub external_id: ExternalUserId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    pub is_admin: bool,
    pub address: Option<String>,
    pub phone_number: Option<String>,
    pub is_marketing: bool,
}

/// Server-side metadata for one issued token.
///
/// # Invariants
/// - Exactly one record exists per issued token, keyed by `unique_id`.
/// - `expires_at` only moves backwards, and only on invalidation.
/// - Records are never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRecord {
    pub id: RecordId,
    /// Internal id of the owning user
    pub owner_id: RecordId,
    pub unique_id: TokenId,
    pub token_title: String,
    /// Currently always `["*"]`
    pub permissions: Vec<String>,
    /// Reserved
    pub restrictions: Option<Vec<String>>,
    pub expires_at: Datetime,
    pub last_used_at: Option<Datetime>,
    pub refreshed_at: Option<Datetime>,
    pub created_at: Datetime,
    /// Set when the session was ended early
    pub revoked_at: Option<Datetime>,
}

impl TokenRecord {
    /// Whether the session shadowed by this record may still be used at `now`.
    pub fn is_usable_at(&self, now: &Datetime) -> bool {
        *now < self.expires_at
    }
}

/// Payload for inserting a token record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRecordCreate {
    pub owner_id: RecordId,
    pub unique_id: TokenId,
    pub token_title: String,
    pub permissions: Vec<String>,
    pub restrictions: Option<Vec<String>>,
    pub expires_at: Datetime,
    pub last_used_at: Option<Datetime>,
    pub refreshed_at: Option<Datetime>,
    pub created_at: Datetime,
}

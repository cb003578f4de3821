//! User storage and credential checks.

use anyhow::Result;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use surrealdb::RecordId;
use thiserror::Error;

use crate::auth::context::Principal;
use crate::db::{Db, UserCreate, UserRecord};
use crate::types::ExternalUserId;

/// Lookup of principals by their public identifier.
#[async_trait]
pub trait PrincipalDirectory: Send + Sync {
    async fn find_by_external_id(&self, external_id: &ExternalUserId) -> Result<Option<Principal>>;
}

/// Profile data for a new account.
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub is_marketing: bool,
}

/// Partial profile change. Absent fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserUpdate {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub is_marketing: Option<bool>,
}

/// Columns written by a profile update; `None` leaves the column alone.
#[derive(Debug, Default, Serialize)]
struct ProfilePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    password_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    is_marketing: Option<bool>,
}

#[derive(Debug, Error)]
pub enum UserStoreError {
    #[error("email already registered")]
    DuplicateEmail,
    #[error("{0}")]
    Invalid(&'static str),
    #[error("password hashing failed: {0}")]
    Hashing(String),
    #[error(transparent)]
    Database(#[from] anyhow::Error),
}

/// User store for database operations.
#[derive(Clone)]
pub struct UserStore {
    db: Db,
}

impl UserStore {
    /// Create a new user store.
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Create an account with a fresh external id and a hashed password.
    pub async fn create_user(&self, new_user: NewUser, is_admin: bool) -> Result<UserRecord, UserStoreError> {
        let email = normalize_email(&new_user.email)?;
        check_password(&new_user.password)?;

        if self.find_by_email(&email).await?.is_some() {
            return Err(UserStoreError::DuplicateEmail);
        }

        let create = UserCreate {
            external_id: ExternalUserId::generate(),
            first_name: new_user.first_name,
            last_name: new_user.last_name,
            email,
            password_hash: hash_password(&new_user.password)?,
            is_admin,
            address: new_user.address,
            phone_number: new_user.phone_number,
            is_marketing: new_user.is_marketing,
        };

        let query = r#"
            CREATE user CONTENT {
                external_id: $external_id,
                first_name: $first_name,
                last_name: $last_name,
                email: $email,
                password_hash: $password_hash,
                is_admin: $is_admin,
                address: $address,
                phone_number: $phone_number,
                is_marketing: $is_marketing
            }
        "#;

        let mut res = self.db
            .query(query)
            .bind(("external_id", create.external_id))
            .bind(("first_name", create.first_name))
            .bind(("last_name", create.last_name))
            .bind(("email", create.email))
            .bind(("password_hash", create.password_hash))
            .bind(("is_admin", create.is_admin))
            .bind(("address", create.address))
            .bind(("phone_number", create.phone_number))
            .bind(("is_marketing", create.is_marketing))
            .await
            .map_err(anyhow::Error::from)?;

        // A concurrent registration can still trip the unique index.
        let users: Vec<UserRecord> = res.take(0).map_err(map_write_error)?;
        let user = users
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Failed to create user"))?;

        tracing::info!(user = %user.external_id, is_admin, "user created");
        Ok(user)
    }

    /// Apply a partial profile change and return the stored result.
    ///
    /// Privilege is not editable here; `is_admin` only changes through the
    /// admin flows.
    pub async fn update_profile(&self, id: &RecordId, update: UserUpdate) -> Result<UserRecord, UserStoreError> {
        let mut patch = ProfilePatch {
            first_name: filled(update.first_name, "first_name must not be empty")?,
            last_name: filled(update.last_name, "last_name must not be empty")?,
            address: filled(update.address, "address must not be empty")?,
            phone_number: filled(update.phone_number, "phone_number must not be empty")?,
            is_marketing: update.is_marketing,
            ..ProfilePatch::default()
        };

        if let Some(email) = update.email {
            let email = normalize_email(&email)?;
            if let Some(existing) = self.find_by_email(&email).await? {
                if &existing.id != id {
                    return Err(UserStoreError::DuplicateEmail);
                }
            }
            patch.email = Some(email);
        }

        if let Some(password) = update.password {
            check_password(&password)?;
            patch.password_hash = Some(hash_password(&password)?);
        }

        let mut res = self.db
            .query("UPDATE $id MERGE $patch RETURN AFTER")
            .bind(("id", id.clone()))
            .bind(("patch", patch))
            .await
            .map_err(anyhow::Error::from)?;

        let users: Vec<UserRecord> = res.take(0).map_err(map_write_error)?;
        let user = users
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("user {} no longer exists", id))?;

        tracing::info!(user = %user.external_id, "user profile updated");
        Ok(user)
    }

    /// Remove an account. Returns whether a row was deleted.
    ///
    /// Token records are left in place; they stop authenticating because
    /// their owner can no longer be resolved.
    pub async fn delete_user(&self, id: &RecordId) -> Result<bool> {
        let mut res = self.db
            .query("DELETE $id RETURN BEFORE")
            .bind(("id", id.clone()))
            .await?;

        let deleted: Vec<UserRecord> = res.take(0)?;
        if let Some(user) = deleted.first() {
            tracing::info!(user = %user.external_id, "user deleted");
        }
        Ok(!deleted.is_empty())
    }

    pub async fn get_user_by_external_id(&self, external_id: &ExternalUserId) -> Result<Option<UserRecord>> {
        let query = "SELECT * FROM user WHERE external_id = $external_id LIMIT 1";

        let mut res = self.db
            .query(query)
            .bind(("external_id", external_id.clone()))
            .await?;

        let users: Vec<UserRecord> = res.take(0)?;
        Ok(users.into_iter().next())
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        let email = email.trim().to_lowercase();
        let query = "SELECT * FROM user WHERE email = $email LIMIT 1";

        let mut res = self.db
            .query(query)
            .bind(("email", email))
            .await?;

        let users: Vec<UserRecord> = res.take(0)?;
        Ok(users.into_iter().next())
    }

    /// Check an email/password pair.
    ///
    /// Unknown email and wrong password both return `None`.
    pub async fn verify_credentials(&self, email: &str, password: &str) -> Result<Option<Principal>> {
        let Some(user) = self.find_by_email(email).await? else {
            return Ok(None);
        };

        if verify_password(password, &user.password_hash) {
            Ok(Some(Principal::from(user)))
        } else {
            Ok(None)
        }
    }
}

#[async_trait]
impl PrincipalDirectory for UserStore {
    async fn find_by_external_id(&self, external_id: &ExternalUserId) -> Result<Option<Principal>> {
        Ok(self
            .get_user_by_external_id(external_id)
            .await?
            .map(Principal::from))
    }
}

fn normalize_email(email: &str) -> Result<String, UserStoreError> {
    let email = email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(UserStoreError::Invalid("a valid email is required"));
    }
    Ok(email)
}

fn check_password(password: &str) -> Result<(), UserStoreError> {
    if password.len() < 8 {
        return Err(UserStoreError::Invalid("password must be at least 8 characters"));
    }
    Ok(())
}

/// A present field must carry something.
fn filled(value: Option<String>, message: &'static str) -> Result<Option<String>, UserStoreError> {
    match value {
        Some(v) if v.trim().is_empty() => Err(UserStoreError::Invalid(message)),
        other => Ok(other),
    }
}

/// Only a hit on the email index is a duplicate; anything else is a
/// storage failure.
fn map_write_error(err: surrealdb::Error) -> UserStoreError {
    if is_duplicate_email(&err) {
        UserStoreError::DuplicateEmail
    } else {
        UserStoreError::Database(err.into())
    }
}

fn is_duplicate_email(err: &surrealdb::Error) -> bool {
    let message = err.to_string();
    message.contains("`user_email`") && message.contains("already contains")
}

fn hash_password(password: &str) -> Result<String, UserStoreError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| UserStoreError::Hashing(e.to_string()))
}

fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::warn!("unparseable password hash in user table: {}", e);
            false
        }
    }
}

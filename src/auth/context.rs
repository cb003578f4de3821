//! Resolved identity handed to request handlers.

use crate::db::UserRecord;
use crate::types::ExternalUserId;
use serde::{Deserialize, Serialize};
use surrealdb::RecordId;

/// An authenticated user.
///
/// Produced by the auth gate and passed to handlers explicitly (as a request
/// extension); it is immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    /// Database record ID for this user
    id: RecordId,
    /// Stable public identifier
    external_id: ExternalUserId,
    email: String,
    first_name: String,
    last_name: String,
    is_admin: bool,
}

impl Principal {
    pub fn new(
        id: RecordId,
        external_id: ExternalUserId,
        email: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        is_admin: bool,
    ) -> Self {
        Self {
            id,
            external_id,
            email: email.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            is_admin,
        }
    }

    /// Get the database user ID.
    pub fn id(&self) -> &RecordId {
        &self.id
    }

    pub fn external_id(&self) -> &ExternalUserId {
        &self.external_id
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn is_admin(&self) -> bool {
        self.is_admin
    }

    /// Display name for logs: the full name, or the email when no name is set.
    pub fn display(&self) -> String {
        let full = format!("{} {}", self.first_name, self.last_name);
        let full = full.trim();
        if full.is_empty() {
            self.email.clone()
        } else {
            full.to_string()
        }
    }
}

impl From<UserRecord> for Principal {
    fn from(record: UserRecord) -> Self {
        Self {
            id: record.id,
            external_id: record.external_id,
            email: record.email,
            first_name: record.first_name,
            last_name: record.last_name,
            is_admin: record.is_admin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_user_id() -> RecordId {
        RecordId::from_table_key("user", "test123")
    }

    #[test]
    fn test_principal_accessors() {
        let principal = Principal::new(
            test_user_id(),
            ExternalUserId::new("u1"),
            "jane@example.com",
            "Jane",
            "Doe",
            false,
        );

        assert_eq!(principal.external_id().as_str(), "u1");
        assert_eq!(principal.email(), "jane@example.com");
        assert!(!principal.is_admin());
        assert_eq!(principal.display(), "Jane Doe");
    }

    #[test]
    fn test_display_falls_back_to_email() {
        let principal = Principal::new(
            test_user_id(),
            ExternalUserId::new("u1"),
            "admin@example.com",
            "",
            "",
            true,
        );

        assert_eq!(principal.display(), "admin@example.com");
    }
}

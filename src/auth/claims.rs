use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ExternalUserId, TokenId};

/// Claim set signed into every session token.
///
/// Times are unix seconds, as in any standard compact signed token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Issuer
    pub iss: String,
    /// Issued at
    pub iat: i64,
    /// Expires at
    pub exp: i64,
    /// External id of the principal
    pub user_uuid: ExternalUserId,
    /// Id of the backing token record
    pub unique_id: TokenId,
}

impl SessionClaims {
    pub fn new(
        issuer: impl Into<String>,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        user_uuid: ExternalUserId,
        unique_id: TokenId,
    ) -> Self {
        Self {
            iss: issuer.into(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
            user_uuid,
            unique_id,
        }
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.iat, 0).single()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.exp, 0).single()
    }

    /// Whether `now` lies inside `[iat - skew, exp + skew]`.
    pub fn is_current_at(&self, now: DateTime<Utc>, skew: chrono::Duration) -> bool {
        let (Some(iat), Some(exp)) = (self.issued_at(), self.expires_at()) else {
            return false;
        };

        let not_before = iat.checked_sub_signed(skew).is_none_or(|t| t <= now);
        let not_after = exp.checked_add_signed(skew).is_none_or(|t| now <= t);
        not_before && not_after
    }
}

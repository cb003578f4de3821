use anyhow::{Result, ensure};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default token lifetime (1 hour).
pub const DEFAULT_TOKEN_TTL_SECONDS: u64 = 3600;

/// Default tolerance applied to `iat`/`exp` checks.
pub const DEFAULT_CLOCK_SKEW_SECONDS: u64 = 5;

/// Default bound on a single token store round trip.
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 2000;

/// Longest token lifetime accepted at startup (30 days).
pub const MAX_TOKEN_TTL_SECONDS: u64 = 30 * 24 * 60 * 60;

/// Largest clock skew accepted at startup.
pub const MAX_CLOCK_SKEW_SECONDS: u64 = 300;

/// Authentication settings, loaded once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// PEM file holding the RSA private key used to sign tokens
    pub private_key_path: PathBuf,
    /// PEM file holding the matching public key
    pub public_key_path: PathBuf,
    /// Value of the `iss` claim; tokens from any other issuer are rejected
    pub issuer: String,
    /// Lifetime shared by the signed `exp` claim and the token record
    #[serde(default = "default_token_ttl_seconds")]
    pub token_ttl_seconds: u64,
    #[serde(default = "default_clock_skew_seconds")]
    pub clock_skew_seconds: u64,
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,
    /// Record `last_used_at` on every successful authentication
    #[serde(default = "default_touch_last_used")]
    pub touch_last_used: bool,
}

fn default_token_ttl_seconds() -> u64 {
    DEFAULT_TOKEN_TTL_SECONDS
}

fn default_clock_skew_seconds() -> u64 {
    DEFAULT_CLOCK_SKEW_SECONDS
}

fn default_store_timeout_ms() -> u64 {
    DEFAULT_STORE_TIMEOUT_MS
}

fn default_touch_last_used() -> bool {
    true
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            private_key_path: PathBuf::from("keys/jwt_private.pem"),
            public_key_path: PathBuf::from("keys/jwt_public.pem"),
            issuer: "petshop-api".to_string(),
            token_ttl_seconds: DEFAULT_TOKEN_TTL_SECONDS,
            clock_skew_seconds: DEFAULT_CLOCK_SKEW_SECONDS,
            store_timeout_ms: DEFAULT_STORE_TIMEOUT_MS,
            touch_last_used: true,
        }
    }
}

impl AuthConfig {
    /// Reject settings that would make every token unusable or overflow
    /// timestamp arithmetic.
    pub fn validate(&self) -> Result<()> {
        ensure!(!self.issuer.trim().is_empty(), "token issuer must not be empty");
        ensure!(
            (1..=MAX_TOKEN_TTL_SECONDS).contains(&self.token_ttl_seconds),
            "token lifetime must be between 1 and {} seconds, got {}",
            MAX_TOKEN_TTL_SECONDS,
            self.token_ttl_seconds
        );
        ensure!(
            self.clock_skew_seconds <= MAX_CLOCK_SKEW_SECONDS,
            "clock skew must be at most {} seconds, got {}",
            MAX_CLOCK_SKEW_SECONDS,
            self.clock_skew_seconds
        );
        ensure!(self.store_timeout_ms > 0, "token store timeout must be positive");
        Ok(())
    }

    /// Saturates instead of wrapping for values past `i64::MAX` seconds.
    pub fn token_ttl(&self) -> chrono::Duration {
        saturating_seconds(self.token_ttl_seconds)
    }

    pub fn clock_skew(&self) -> chrono::Duration {
        saturating_seconds(self.clock_skew_seconds)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

fn saturating_seconds(seconds: u64) -> chrono::Duration {
    i64::try_from(seconds)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or(chrono::Duration::MAX)
}

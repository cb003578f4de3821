//! End-to-end session tests.
//!
//! Issue, validate, gate and logout wired together over the in-memory
//! SurrealDB engine, plus stores that fail or stall to cover the
//! persistence error paths.

#![cfg(test)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{Duration, Utc};
use surrealdb::RecordId;
use surrealdb::sql::Datetime;

use super::keys::test_keys;
use super::*;
use crate::config::AuthConfig;
use crate::db::{DatabaseConfig, Db, TokenRecord, TokenRecordCreate, create_connection, ensure_schema};
use crate::types::{ExternalUserId, TokenId};

/// Directory backed by a fixed set of principals.
#[derive(Default)]
struct StaticDirectory {
    principals: HashMap<String, Principal>,
}

impl StaticDirectory {
    fn with(principals: impl IntoIterator<Item = Principal>) -> Self {
        Self {
            principals: principals
                .into_iter()
                .map(|p| (p.external_id().to_string(), p))
                .collect(),
        }
    }
}

#[async_trait]
impl PrincipalDirectory for StaticDirectory {
    async fn find_by_external_id(&self, external_id: &ExternalUserId) -> Result<Option<Principal>> {
        Ok(self.principals.get(external_id.as_str()).cloned())
    }
}

/// Store that fails every call.
struct FailingStore;

#[async_trait]
impl TokenRecordStore for FailingStore {
    async fn insert(&self, _record: TokenRecordCreate) -> Result<TokenRecord> {
        Err(anyhow!("connection refused"))
    }

    async fn find_by_unique_id(&self, _unique_id: &TokenId) -> Result<Option<TokenRecord>> {
        Err(anyhow!("connection refused"))
    }

    async fn latest_for_owner(&self, _owner_id: &RecordId) -> Result<Option<TokenRecord>> {
        Err(anyhow!("connection refused"))
    }

    async fn set_expiry(&self, _id: &RecordId, _expires_at: Datetime, _revoked_at: Datetime) -> Result<()> {
        Err(anyhow!("connection refused"))
    }

    async fn touch(&self, _id: &RecordId, _used_at: Datetime) -> Result<()> {
        Err(anyhow!("connection refused"))
    }
}

/// Wraps a real store; reads stall and touches fail on demand.
struct DegradedStore {
    inner: SurrealTokenStore,
    stall_reads: bool,
    fail_touch: bool,
}

#[async_trait]
impl TokenRecordStore for DegradedStore {
    async fn insert(&self, record: TokenRecordCreate) -> Result<TokenRecord> {
        self.inner.insert(record).await
    }

    async fn find_by_unique_id(&self, unique_id: &TokenId) -> Result<Option<TokenRecord>> {
        if self.stall_reads {
            tokio::time::sleep(StdDuration::from_secs(30)).await;
        }
        self.inner.find_by_unique_id(unique_id).await
    }

    async fn latest_for_owner(&self, owner_id: &RecordId) -> Result<Option<TokenRecord>> {
        if self.stall_reads {
            tokio::time::sleep(StdDuration::from_secs(30)).await;
        }
        self.inner.latest_for_owner(owner_id).await
    }

    async fn set_expiry(&self, id: &RecordId, expires_at: Datetime, revoked_at: Datetime) -> Result<()> {
        self.inner.set_expiry(id, expires_at, revoked_at).await
    }

    async fn touch(&self, id: &RecordId, used_at: Datetime) -> Result<()> {
        if self.fail_touch {
            return Err(anyhow!("write quorum lost"));
        }
        self.inner.touch(id, used_at).await
    }
}

struct Harness {
    issuer: TokenIssuer,
    validator: TokenValidator,
    gate: AuthGate,
    terminator: SessionTerminator,
    records: SurrealTokenStore,
}

impl Harness {
    fn build(
        store: Arc<dyn TokenRecordStore>,
        records: SurrealTokenStore,
        directory: Arc<dyn PrincipalDirectory>,
        config: AuthConfig,
    ) -> Self {
        let keys = Arc::new(test_keys::key_material());
        let config = Arc::new(config);
        let validator = TokenValidator::new(keys.verifying_key().clone(), store.clone(), config.clone());

        Self {
            issuer: TokenIssuer::new(keys, store.clone(), config.clone()),
            gate: AuthGate::new(validator.clone(), directory, store.clone(), config.clone()),
            terminator: SessionTerminator::new(store, config),
            validator,
            records,
        }
    }
}

async fn setup_test_db() -> Db {
    let config = DatabaseConfig {
        url: "memory".to_string(),
        ..Default::default()
    };
    let db = create_connection(config).await.unwrap();
    ensure_schema(&db).await.unwrap();
    db
}

fn u1() -> Principal {
    Principal::new(
        RecordId::from_table_key("user", "u1"),
        ExternalUserId::new("u1"),
        "u1@example.com",
        "Una",
        "One",
        false,
    )
}

fn admin() -> Principal {
    Principal::new(
        RecordId::from_table_key("user", "a1"),
        ExternalUserId::new("a1"),
        "admin@example.com",
        "Ada",
        "Admin",
        true,
    )
}

async fn harness_with(config: AuthConfig) -> Harness {
    let records = SurrealTokenStore::new(setup_test_db().await);
    Harness::build(
        Arc::new(records.clone()),
        records,
        Arc::new(StaticDirectory::with([u1(), admin()])),
        config,
    )
}

async fn harness() -> Harness {
    harness_with(AuthConfig::default()).await
}

fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

/// Flip one bit in the decoded payload segment and re-encode it.
fn flip_payload_bit(token: &str, byte: usize, bit: u8) -> String {
    let parts: Vec<&str> = token.split('.').collect();
    assert_eq!(parts.len(), 3);

    let mut payload = URL_SAFE_NO_PAD.decode(parts[1]).unwrap();
    payload[byte] ^= 1 << bit;

    format!("{}.{}.{}", parts[0], URL_SAFE_NO_PAD.encode(&payload), parts[2])
}

#[tokio::test]
async fn round_trip_returns_external_id() {
    let h = harness().await;
    let now = Utc::now();
    let issued = h.issuer.issue_at(&u1(), now).await.unwrap();

    for offset in [0, 1, 600, 3599] {
        let at = now + Duration::seconds(offset);
        let id = h.validator.validate_at(&issued.token, at).await.unwrap();
        assert_eq!(id.as_str(), "u1", "offset {offset}s");
    }
}

#[tokio::test]
async fn round_trip_through_user_store() {
    let db = setup_test_db().await;
    let users = UserStore::new(db.clone());
    let records = SurrealTokenStore::new(db);
    let h = Harness::build(
        Arc::new(records.clone()),
        records,
        Arc::new(users.clone()),
        AuthConfig::default(),
    );

    let user = users
        .create_user(
            NewUser {
                first_name: "Kofi".to_string(),
                last_name: "Mensah".to_string(),
                email: "kofi@example.com".to_string(),
                password: "correct-horse".to_string(),
                address: None,
                phone_number: None,
                is_marketing: true,
            },
            false,
        )
        .await
        .unwrap();

    let principal = users
        .verify_credentials("kofi@example.com", "correct-horse")
        .await
        .unwrap()
        .unwrap();
    let issued = h.issuer.issue(&principal).await.unwrap();

    let resolved = h
        .gate
        .authenticate(Some(&bearer(&issued.token)), GatePolicy::User)
        .await
        .unwrap();
    assert_eq!(resolved.external_id(), &user.external_id);
    assert_eq!(resolved.email(), "kofi@example.com");
}

#[tokio::test]
async fn logout_revokes_before_signed_expiry() {
    let h = harness().await;
    let now = Utc::now();
    let issued = h.issuer.issue_at(&u1(), now).await.unwrap();

    h.terminator.invalidate_at(&u1(), now + Duration::seconds(10)).await.unwrap();

    let later = now + Duration::seconds(11);
    let err = h.validator.validate_at(&issued.token, later).await.unwrap_err();
    assert_eq!(err, AuthError::Revoked);

    let err = h
        .gate
        .authenticate_at(Some(&bearer(&issued.token)), GatePolicy::User, later)
        .await
        .unwrap_err();
    assert_eq!(err, AuthError::Revoked);
}

#[tokio::test]
async fn logout_is_idempotent() {
    let h = harness().await;
    let issued = h.issuer.issue(&u1()).await.unwrap();

    h.terminator.invalidate(&u1()).await.unwrap();
    h.terminator.invalidate(&u1()).await.unwrap();
    h.terminator.invalidate(&admin()).await.unwrap();

    let record = h.records.find_by_unique_id(&issued.unique_id).await.unwrap().unwrap();
    assert!(record.revoked_at.is_some());
}

#[tokio::test]
async fn expiry_boundary() {
    let h = harness().await;
    let now = Utc::now();
    let issued = h.issuer.issue_at(&u1(), now).await.unwrap();

    let before = issued.expires_at - Duration::seconds(1);
    assert!(h.validator.validate_at(&issued.token, before).await.is_ok());

    let skew = AuthConfig::default().clock_skew();
    let after = issued.expires_at + skew + Duration::seconds(1);
    let err = h.validator.validate_at(&issued.token, after).await.unwrap_err();
    assert_eq!(err, AuthError::Expired);
}

#[tokio::test]
async fn any_payload_bit_flip_is_rejected() {
    let h = harness().await;
    let now = Utc::now();
    let issued = h.issuer.issue_at(&u1(), now).await.unwrap();

    let payload_len = URL_SAFE_NO_PAD
        .decode(issued.token.split('.').nth(1).unwrap())
        .unwrap()
        .len();

    // Flips that still yield readable claims must fail the signature; the
    // rest never get that far.
    let mut signature_failures = 0;
    for byte in 0..payload_len {
        let tampered = flip_payload_bit(&issued.token, byte, (byte % 8) as u8);
        let readable = URL_SAFE_NO_PAD
            .decode(tampered.split('.').nth(1).unwrap())
            .ok()
            .and_then(|bytes| serde_json::from_slice::<SessionClaims>(&bytes).ok())
            .is_some();

        let err = h.validator.validate_at(&tampered, now).await.unwrap_err();
        if readable {
            assert_eq!(err, AuthError::BadSignature, "byte {byte}");
            signature_failures += 1;
        } else {
            assert_eq!(err, AuthError::Malformed, "byte {byte}");
        }
    }
    assert!(signature_failures > 0);
}

#[tokio::test]
async fn token_signed_by_foreign_key_is_rejected() {
    let h = harness().await;
    let foreign = KeyMaterial::from_pem(
        test_keys::FOREIGN_PRIVATE_PEM.as_bytes(),
        test_keys::FOREIGN_PUBLIC_PEM.as_bytes(),
    )
    .unwrap();
    let forger = TokenIssuer::new(
        Arc::new(foreign),
        Arc::new(h.records.clone()),
        Arc::new(AuthConfig::default()),
    );
    let forged = forger.issue(&admin()).await.unwrap();

    let err = h
        .gate
        .authenticate(Some(&bearer(&forged.token)), GatePolicy::Admin)
        .await
        .unwrap_err();
    assert_eq!(err, AuthError::BadSignature);
}

#[tokio::test]
async fn malformed_credentials() {
    let h = harness().await;

    assert_eq!(
        h.gate.authenticate(None, GatePolicy::User).await.unwrap_err(),
        AuthError::NoCredential
    );
    assert_eq!(
        h.gate.authenticate(Some("Bearer "), GatePolicy::User).await.unwrap_err(),
        AuthError::NoCredential
    );
    assert_eq!(
        h.gate.authenticate(Some("Basic dTE6cHc="), GatePolicy::User).await.unwrap_err(),
        AuthError::NoCredential
    );
    assert_eq!(
        h.gate.authenticate(Some("Bearer not-a-token"), GatePolicy::User).await.unwrap_err(),
        AuthError::Malformed
    );
}

#[tokio::test]
async fn non_admin_is_refused_by_admin_gate_only() {
    let h = harness().await;
    let issued = h.issuer.issue(&u1()).await.unwrap();
    let header = bearer(&issued.token);

    let err = h
        .gate
        .authenticate(Some(&header), GatePolicy::Admin)
        .await
        .unwrap_err();
    assert_eq!(err, AuthError::InsufficientPrivilege);
    assert_eq!(err.status_code(), axum::http::StatusCode::FORBIDDEN);

    let principal = h
        .gate
        .authenticate(Some(&header), GatePolicy::User)
        .await
        .unwrap();
    assert_eq!(principal.external_id().as_str(), "u1");
    assert!(!principal.is_admin());
}

#[tokio::test]
async fn admin_passes_both_gates() {
    let h = harness().await;
    let issued = h.issuer.issue(&admin()).await.unwrap();
    let header = bearer(&issued.token);

    for policy in [GatePolicy::User, GatePolicy::Admin] {
        let principal = h.gate.authenticate(Some(&header), policy).await.unwrap();
        assert!(principal.is_admin());
    }
}

#[tokio::test]
async fn vanished_principal_reads_as_no_credential() {
    let records = SurrealTokenStore::new(setup_test_db().await);
    let h = Harness::build(
        Arc::new(records.clone()),
        records,
        Arc::new(StaticDirectory::default()),
        AuthConfig::default(),
    );
    let issued = h.issuer.issue(&u1()).await.unwrap();

    let err = h
        .gate
        .authenticate(Some(&bearer(&issued.token)), GatePolicy::User)
        .await
        .unwrap_err();
    assert_eq!(err, AuthError::UnknownPrincipal);
    assert_eq!(err.status_code(), AuthError::NoCredential.status_code());
    assert_eq!(err.public_message(), AuthError::NoCredential.public_message());
}

#[tokio::test]
async fn logout_ends_only_the_newest_of_two_devices() {
    let h = harness().await;
    let now = Utc::now();

    let phone = h.issuer.issue_at(&u1(), now).await.unwrap();
    let laptop = h.issuer.issue_at(&u1(), now + Duration::seconds(1)).await.unwrap();

    h.terminator.invalidate_at(&u1(), now + Duration::seconds(2)).await.unwrap();

    let at = now + Duration::seconds(3);
    let results = [
        h.validator.validate_at(&phone.token, at).await,
        h.validator.validate_at(&laptop.token, at).await,
    ];

    let revoked = results
        .iter()
        .filter(|r| matches!(r, Err(AuthError::Revoked)))
        .count();
    assert_eq!(revoked, 1);
    assert!(results[0].is_ok());
    assert_eq!(results[1], Err(AuthError::Revoked));
}

#[tokio::test]
async fn successful_gate_touches_last_used() {
    let h = harness().await;
    let now = Utc::now();
    let issued = h.issuer.issue_at(&u1(), now).await.unwrap();

    let used_at = now + Duration::minutes(5);
    h.gate
        .authenticate_at(Some(&bearer(&issued.token)), GatePolicy::User, used_at)
        .await
        .unwrap();

    let record = h.records.find_by_unique_id(&issued.unique_id).await.unwrap().unwrap();
    assert_eq!(record.last_used_at, Some(Datetime::from(used_at)));
}

#[tokio::test]
async fn touch_failure_does_not_block_request() {
    let records = SurrealTokenStore::new(setup_test_db().await);
    let store = DegradedStore {
        inner: records.clone(),
        stall_reads: false,
        fail_touch: true,
    };
    let h = Harness::build(
        Arc::new(store),
        records,
        Arc::new(StaticDirectory::with([u1()])),
        AuthConfig::default(),
    );
    let issued = h.issuer.issue(&u1()).await.unwrap();

    let principal = h
        .gate
        .authenticate(Some(&bearer(&issued.token)), GatePolicy::User)
        .await
        .unwrap();
    assert_eq!(principal.external_id().as_str(), "u1");
}

#[tokio::test]
async fn unreachable_store_is_unavailable_not_unauthenticated() {
    let records = SurrealTokenStore::new(setup_test_db().await);
    let healthy = harness().await;
    let issued = healthy.issuer.issue(&u1()).await.unwrap();

    let h = Harness::build(
        Arc::new(FailingStore),
        records,
        Arc::new(StaticDirectory::with([u1()])),
        AuthConfig::default(),
    );

    let err = h.validator.validate(&issued.token).await.unwrap_err();
    assert!(matches!(err, AuthError::PersistenceUnavailable(_)));
    assert!(err.is_retryable());

    let err = h.issuer.issue(&u1()).await.unwrap_err();
    assert!(matches!(err, AuthError::PersistenceUnavailable(_)));

    let err = h.terminator.invalidate(&u1()).await.unwrap_err();
    assert!(matches!(err, AuthError::PersistenceUnavailable(_)));
}

#[tokio::test]
async fn stalled_store_times_out() {
    let records = SurrealTokenStore::new(setup_test_db().await);
    let store = DegradedStore {
        inner: records.clone(),
        stall_reads: true,
        fail_touch: false,
    };
    let config = AuthConfig {
        store_timeout_ms: 50,
        ..AuthConfig::default()
    };
    let h = Harness::build(
        Arc::new(store),
        records,
        Arc::new(StaticDirectory::with([u1()])),
        config,
    );
    let issued = h.issuer.issue(&u1()).await.unwrap();

    let err = h
        .gate
        .authenticate(Some(&bearer(&issued.token)), GatePolicy::User)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::PersistenceUnavailable(_)));
    assert_eq!(err.status_code(), axum::http::StatusCode::SERVICE_UNAVAILABLE);

    let err = h.terminator.invalidate(&u1()).await.unwrap_err();
    assert!(matches!(err, AuthError::PersistenceUnavailable(_)));
}

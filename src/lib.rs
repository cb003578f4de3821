// Core modules
pub mod api;
pub mod auth;
mod config;
pub mod db;
mod types;

// Re-export key types and functions
pub use api::{AppState, create_router};
pub use auth::{
    AuthError, AuthGate, GatePolicy, KeyMaterial, Principal, SessionTerminator, TokenIssuer,
    TokenValidator, UserStore,
};
pub use config::AuthConfig;
pub use db::{DatabaseConfig, create_connection, ensure_schema};
pub use types::{ExternalUserId, TokenId};

use anyhow::Result;

/// Check the settings, load the key pair, connect, apply the schema and
/// assemble the app state.
pub async fn build_state(db_config: DatabaseConfig, auth_config: AuthConfig) -> Result<AppState> {
    auth_config.validate()?;
    let keys = KeyMaterial::from_files(&auth_config.private_key_path, &auth_config.public_key_path)?;

    let db = create_connection(db_config).await?;
    ensure_schema(&db).await?;

    Ok(AppState::new(db, keys, auth_config))
}

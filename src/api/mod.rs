// REST API for accounts and sessions

use axum::{
    Router,
    http::StatusCode,
    middleware::from_fn_with_state,
    response::Json,
    routing::{get, post, put},
};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{
    AuthGate, KeyMaterial, SessionTerminator, SurrealTokenStore, TokenIssuer, TokenRecordStore,
    TokenValidator, UserStore,
};
use crate::config::AuthConfig;
use crate::db::Db;

pub mod handlers;
pub mod middleware;
pub mod response;

/// Everything a request needs, built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub users: UserStore,
    pub issuer: TokenIssuer,
    pub gate: AuthGate,
    pub terminator: SessionTerminator,
}

impl AppState {
    pub fn new(db: Db, keys: KeyMaterial, config: AuthConfig) -> Self {
        let keys = Arc::new(keys);
        let config = Arc::new(config);
        let users = UserStore::new(db.clone());
        let tokens: Arc<dyn TokenRecordStore> = Arc::new(SurrealTokenStore::new(db));

        let validator = TokenValidator::new(keys.verifying_key().clone(), tokens.clone(), config.clone());

        Self {
            issuer: TokenIssuer::new(keys, tokens.clone(), config.clone()),
            gate: AuthGate::new(validator, Arc::new(users.clone()), tokens.clone(), config.clone()),
            terminator: SessionTerminator::new(tokens, config),
            users,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let user_routes = Router::new()
        .route("/api/v1/user", get(handlers::show_user).delete(handlers::delete_user))
        .route("/api/v1/user/edit", put(handlers::edit_user))
        .route("/api/v1/user/logout", get(handlers::logout))
        .route_layer(from_fn_with_state(state.clone(), middleware::require_user));

    let admin_routes = Router::new()
        .route("/api/v1/admin/create", post(handlers::create_admin))
        .route_layer(from_fn_with_state(state.clone(), middleware::require_admin));

    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/user/create", post(handlers::create_user))
        .route("/api/v1/user/login", post(handlers::login))
        .route("/api/v1/admin/login", post(handlers::admin_login))
        .merge(user_routes)
        .merge(admin_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

async fn health_check() -> Result<Json<Value>, StatusCode> {
    Ok(Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}

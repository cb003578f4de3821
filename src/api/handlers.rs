//! Account and session endpoints.

use axum::extract::{Extension, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::api::AppState;
use crate::api::response::{ApiError, Envelope, created, ok};
use crate::auth::{AuthError, NewUser, Principal, UserUpdate};
use crate::db::UserRecord;
use crate::types::ExternalUserId;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Public view of a user; never includes the password hash.
#[derive(Debug, Serialize)]
pub struct UserView {
    pub uuid: ExternalUserId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub is_admin: bool,
    pub address: Option<String>,
    pub phone_number: Option<String>,
    pub is_marketing: bool,
}

impl From<UserRecord> for UserView {
    fn from(user: UserRecord) -> Self {
        Self {
            uuid: user.external_id,
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            is_admin: user.is_admin,
            address: user.address,
            phone_number: user.phone_number,
            is_marketing: user.is_marketing,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CreatedUser {
    #[serde(flatten)]
    pub user: UserView,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct TokenBody {
    pub token: String,
}

/// `POST /api/v1/user/create`: register and sign in.
///
/// Either both the account and its first token exist afterwards, or
/// neither does.
pub async fn create_user(
    State(state): State<AppState>,
    Json(payload): Json<NewUser>,
) -> Result<(StatusCode, Json<Envelope<CreatedUser>>), ApiError> {
    let user = state.users.create_user(payload, false).await?;

    let issued = match state.issuer.issue(&Principal::from(user.clone())).await {
        Ok(issued) => issued,
        Err(err) => {
            match state.users.delete_user(&user.id).await {
                Ok(_) => warn!(user = %user.external_id, "registration rolled back: {}", err),
                Err(e) => error!(user = %user.external_id, "registration rollback failed: {:#}", e),
            }
            return Err(err.into());
        }
    };

    Ok(created(CreatedUser {
        user: UserView::from(user),
        token: issued.token,
    }))
}

/// `POST /api/v1/user/login`
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<Envelope<TokenBody>>, ApiError> {
    let principal = state
        .users
        .verify_credentials(&payload.email, &payload.password)
        .await?
        .ok_or_else(ApiError::login_failed)?;

    let issued = state.issuer.issue(&principal).await?;
    Ok(ok(TokenBody { token: issued.token }))
}

/// `POST /api/v1/admin/login`: same as login, but only for administrators.
pub async fn admin_login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<Envelope<TokenBody>>, ApiError> {
    let principal = state
        .users
        .verify_credentials(&payload.email, &payload.password)
        .await?
        .filter(Principal::is_admin)
        .ok_or_else(ApiError::login_failed)?;

    let issued = state.issuer.issue(&principal).await?;
    Ok(ok(TokenBody { token: issued.token }))
}

/// `GET /api/v1/user/logout`
pub async fn logout(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Envelope<Value>>, ApiError> {
    state.terminator.invalidate(&principal).await?;
    Ok(ok(Value::Array(Vec::new())))
}

/// `GET /api/v1/user`
pub async fn show_user(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Envelope<UserView>>, ApiError> {
    let user = state
        .users
        .get_user_by_external_id(principal.external_id())
        .await?
        .ok_or(AuthError::UnknownPrincipal)?;

    Ok(ok(UserView::from(user)))
}

/// `PUT /api/v1/user/edit`: partial profile update.
pub async fn edit_user(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(payload): Json<UserUpdate>,
) -> Result<(StatusCode, Json<Envelope<UserView>>), ApiError> {
    let user = state.users.update_profile(principal.id(), payload).await?;
    Ok(created(UserView::from(user)))
}

/// `DELETE /api/v1/user`: end the current session and remove the account.
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<Envelope<Value>>, ApiError> {
    state.terminator.invalidate(&principal).await?;

    if !state.users.delete_user(principal.id()).await? {
        return Err(AuthError::UnknownPrincipal.into());
    }
    info!(user = %principal.external_id(), "account closed");

    Ok(ok(Value::Array(Vec::new())))
}

/// `POST /api/v1/admin/create`
pub async fn create_admin(
    State(state): State<AppState>,
    Extension(admin): Extension<Principal>,
    Json(payload): Json<NewUser>,
) -> Result<(StatusCode, Json<Envelope<UserView>>), ApiError> {
    let user = state.users.create_user(payload, true).await?;
    info!(
        created_by = %admin.external_id(),
        admin = %admin.display(),
        user = %user.external_id,
        "administrator created"
    );

    Ok(created(UserView::from(user)))
}

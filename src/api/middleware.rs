use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::api::AppState;
use crate::api::response::ApiError;
use crate::auth::GatePolicy;

/// Admit any authenticated user; the [`crate::auth::Principal`] is stored in
/// request extensions.
pub async fn require_user(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    gate(state, req, next, GatePolicy::User).await
}

/// Admit administrators only.
pub async fn require_admin(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    gate(state, req, next, GatePolicy::Admin).await
}

async fn gate(
    state: AppState,
    mut req: Request,
    next: Next,
    policy: GatePolicy,
) -> Result<Response, ApiError> {
    let headers = req.headers().clone();
    let principal = state.gate.authenticate_headers(&headers, policy).await?;

    req.extensions_mut().insert(principal);

    Ok(next.run(req).await)
}

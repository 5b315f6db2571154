//! Admin route guard
//!
//! Authentication proper (login, sessions, token issuance) is owned by the
//! upstream accounts service. This middleware only verifies the shared
//! admin bearer token that service forwards on operator requests.

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;

use crate::error::ApiError;
use crate::state::AppState;

pub async fn require_admin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    match token {
        Some(token) if token == state.config.admin_api_token => Ok(next.run(request).await),
        _ => Err(ApiError::Unauthorized),
    }
}

//! API error mapping
//!
//! Maps the billing taxonomy onto HTTP statuses. Configuration errors are
//! operator data-entry mistakes: they are logged loudly for the admin and
//! surfaced to the caller as an opaque 500 so tenants never see them.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use eglise_billing::BillingError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Billing(#[from] BillingError),

    #[error("unauthorized")]
    Unauthorized,

    #[error("{0}")]
    BadRequest(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::Billing(BillingError::Validation(message)) => {
                (StatusCode::BAD_REQUEST, message)
            }
            ApiError::Billing(BillingError::StateConflict(message)) => {
                (StatusCode::CONFLICT, message)
            }
            ApiError::Billing(BillingError::NotFound(what)) => {
                (StatusCode::NOT_FOUND, format!("{} not found", what))
            }
            ApiError::Billing(BillingError::Configuration(message)) => {
                tracing::error!(error = %message, "Package configuration error, operator action required");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Billing configuration error. The platform operator has been notified."
                        .to_string(),
                )
            }
            ApiError::Billing(BillingError::Database(e)) => {
                tracing::error!(error = %e, "Database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            ApiError::Billing(BillingError::Internal(message)) => {
                tracing::error!(error = %message, "Internal billing error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
        };

        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

//! Package catalogue routes

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use eglise_billing::{Package, PackageInput};

use crate::error::ApiResult;
use crate::state::AppState;

/// List the catalogue (church-facing; also used by the admin panel).
pub async fn list_packages(State(state): State<AppState>) -> ApiResult<Json<Vec<Package>>> {
    let packages = state.billing.packages.list().await?;
    Ok(Json(packages))
}

pub async fn create_package(
    State(state): State<AppState>,
    Json(input): Json<PackageInput>,
) -> ApiResult<(StatusCode, Json<Package>)> {
    let package = state.billing.packages.create(input).await?;
    Ok((StatusCode::CREATED, Json(package)))
}

pub async fn update_package(
    State(state): State<AppState>,
    Path(package_id): Path<Uuid>,
    Json(input): Json<PackageInput>,
) -> ApiResult<Json<Package>> {
    let package = state.billing.packages.update(package_id, input).await?;
    Ok(Json(package))
}

pub async fn delete_package(
    State(state): State<AppState>,
    Path(package_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    state.billing.packages.delete(package_id).await?;
    Ok(Json(serde_json::json!({ "detail": "Package deleted" })))
}

//! HTTP routes
//!
//! `/api/v1` carries church-facing routes (church identity is the explicit
//! path id, verified upstream); `/admin` carries operator routes behind the
//! admin bearer token.

pub mod bills;
pub mod churches;
pub mod packages;
pub mod subscriptions;
pub mod upgrade_requests;

use axum::extract::State;
use axum::middleware;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};

use eglise_billing::InvariantCheckSummary;

use crate::auth::require_admin;
use crate::error::ApiResult;
use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    let tenant_routes = Router::new()
        .route("/packages", get(packages::list_packages))
        .route(
            "/churches/{church_id}/subscribe",
            post(subscriptions::subscribe),
        )
        .route(
            "/churches/{church_id}/upgrade",
            post(subscriptions::upgrade),
        )
        .route(
            "/churches/{church_id}/dashboard",
            get(subscriptions::dashboard),
        )
        .route("/churches/{church_id}/bills", get(bills::list_church_bills))
        .route(
            "/churches/{church_id}/bills/{bill_id}",
            get(bills::church_bill_detail),
        )
        .route(
            "/churches/{church_id}/upgrade-requests",
            post(upgrade_requests::file_request),
        );

    let admin_routes = Router::new()
        .route(
            "/churches",
            post(churches::create_church).get(churches::list_churches),
        )
        .route("/churches/expiring", get(churches::expiring_churches))
        .route(
            "/churches/{church_id}",
            get(churches::church_detail).delete(churches::soft_delete_church),
        )
        .route(
            "/churches/{church_id}/subscription",
            put(subscriptions::admin_edit),
        )
        .route(
            "/churches/{church_id}/mark-unpaid",
            post(subscriptions::mark_unpaid),
        )
        .route("/churches/{church_id}/suspend", post(churches::suspend_church))
        .route(
            "/churches/{church_id}/activate",
            post(churches::activate_church),
        )
        .route("/churches/{church_id}/restore", post(churches::restore_church))
        .route(
            "/churches/{church_id}/hard-delete",
            delete(churches::hard_delete_church),
        )
        .route("/bills", get(bills::list_all_bills))
        .route("/bills/{bill_id}", get(bills::bill_detail))
        .route("/bills/{bill_id}/pay", post(bills::mark_bill_paid))
        .route("/packages", post(packages::create_package))
        .route(
            "/packages/{package_id}",
            put(packages::update_package).delete(packages::delete_package),
        )
        .route("/upgrade-requests", get(upgrade_requests::list_requests))
        .route(
            "/upgrade-requests/{request_id}/review",
            post(upgrade_requests::review_request),
        )
        .route("/invariants", get(run_invariants))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_admin,
        ));

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", tenant_routes)
        .nest("/admin", admin_routes)
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Run all billing consistency checks and report violations.
async fn run_invariants(State(state): State<AppState>) -> ApiResult<Json<InvariantCheckSummary>> {
    let summary = state.billing.invariants.run_all_checks().await?;
    Ok(Json(summary))
}

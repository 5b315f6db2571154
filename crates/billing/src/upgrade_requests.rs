//! Upgrade requests
//!
//! A church can ask for a bigger package; the operator approves or rejects.
//! The request is advisory: approval signals the church may proceed with an
//! upgrade but never creates a bill or mutates billing state by itself.

use serde::Serialize;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use eglise_shared::UpgradeRequestStatus;

use crate::error::{BillingError, BillingResult};
use crate::events::{BillingEventLogger, BillingEventType};

const UPGRADE_REQUEST_COLUMNS: &str = "id, church_id, current_package_id, requested_package_id, \
     requested_capacity, reason, status, created_at, reviewed_at";

/// A stored upgrade request.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct UpgradeRequest {
    pub id: Uuid,
    pub church_id: Uuid,
    pub current_package_id: Uuid,
    pub requested_package_id: Uuid,
    pub requested_capacity: Option<i32>,
    pub reason: String,
    pub status: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub reviewed_at: Option<OffsetDateTime>,
}

impl UpgradeRequest {
    pub fn status(&self) -> BillingResult<UpgradeRequestStatus> {
        UpgradeRequestStatus::parse(&self.status).ok_or_else(|| {
            BillingError::Internal(format!("unknown upgrade request status '{}'", self.status))
        })
    }
}

/// Review decision by the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewDecision {
    Approve,
    Reject,
}

/// Upgrade request service.
pub struct UpgradeRequestService {
    pool: PgPool,
    event_logger: BillingEventLogger,
}

impl UpgradeRequestService {
    pub fn new(pool: PgPool) -> Self {
        let event_logger = BillingEventLogger::new(pool.clone());
        Self { pool, event_logger }
    }

    /// File a request for the church's current subscription.
    pub async fn file(
        &self,
        church_id: Uuid,
        requested_package_id: Uuid,
        requested_capacity: Option<i32>,
        reason: Option<String>,
    ) -> BillingResult<UpgradeRequest> {
        let current_package_id: Option<(Uuid,)> = sqlx::query_as(
            "SELECT package_id FROM church_subscriptions WHERE church_id = $1",
        )
        .bind(church_id)
        .fetch_optional(&self.pool)
        .await?;
        let (current_package_id,) = current_package_id
            .ok_or_else(|| BillingError::Validation("No active subscription".into()))?;

        let (target_exists,): (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM packages WHERE id = $1)")
                .bind(requested_package_id)
                .fetch_one(&self.pool)
                .await?;
        if !target_exists {
            return Err(BillingError::NotFound("package".into()));
        }

        let request: UpgradeRequest = sqlx::query_as(&format!(
            r#"
            INSERT INTO upgrade_requests (
                church_id, current_package_id, requested_package_id,
                requested_capacity, reason, status
            )
            VALUES ($1, $2, $3, $4, $5, 'PENDING')
            RETURNING {UPGRADE_REQUEST_COLUMNS}
            "#
        ))
        .bind(church_id)
        .bind(current_package_id)
        .bind(requested_package_id)
        .bind(requested_capacity)
        .bind(reason.unwrap_or_default())
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(
            church_id = %church_id,
            request_id = %request.id,
            requested_package_id = %requested_package_id,
            "Upgrade request filed"
        );
        self.event_logger
            .record(
                Some(church_id),
                BillingEventType::UpgradeRequestFiled,
                serde_json::json!({
                    "request_id": request.id,
                    "requested_package_id": requested_package_id,
                }),
            )
            .await;

        Ok(request)
    }

    pub async fn get(&self, id: Uuid) -> BillingResult<UpgradeRequest> {
        let request: Option<UpgradeRequest> = sqlx::query_as(&format!(
            "SELECT {UPGRADE_REQUEST_COLUMNS} FROM upgrade_requests WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        request.ok_or_else(|| BillingError::NotFound("upgrade request".into()))
    }

    pub async fn list(
        &self,
        status: Option<UpgradeRequestStatus>,
    ) -> BillingResult<Vec<UpgradeRequest>> {
        let requests: Vec<UpgradeRequest> = match status {
            Some(status) => {
                sqlx::query_as(&format!(
                    "SELECT {UPGRADE_REQUEST_COLUMNS} FROM upgrade_requests \
                     WHERE status = $1 ORDER BY created_at DESC"
                ))
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(&format!(
                    "SELECT {UPGRADE_REQUEST_COLUMNS} FROM upgrade_requests \
                     ORDER BY created_at DESC"
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(requests)
    }

    /// Approve or reject a PENDING request. Informational only: the church
    /// still has to go through the upgrade flow to get billed.
    pub async fn review(
        &self,
        id: Uuid,
        decision: ReviewDecision,
    ) -> BillingResult<UpgradeRequest> {
        let mut tx = self.pool.begin().await?;

        let request: Option<UpgradeRequest> = sqlx::query_as(&format!(
            "SELECT {UPGRADE_REQUEST_COLUMNS} FROM upgrade_requests WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        let request = request.ok_or_else(|| BillingError::NotFound("upgrade request".into()))?;

        if request.status()? != UpgradeRequestStatus::Pending {
            return Err(BillingError::StateConflict("Request already processed".into()));
        }

        let new_status = match decision {
            ReviewDecision::Approve => UpgradeRequestStatus::Approved,
            ReviewDecision::Reject => UpgradeRequestStatus::Rejected,
        };

        let request: UpgradeRequest = sqlx::query_as(&format!(
            "UPDATE upgrade_requests SET status = $2, reviewed_at = NOW() \
             WHERE id = $1 RETURNING {UPGRADE_REQUEST_COLUMNS}"
        ))
        .bind(id)
        .bind(new_status.as_str())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            request_id = %id,
            status = %new_status,
            "Upgrade request reviewed"
        );
        self.event_logger
            .record(
                Some(request.church_id),
                BillingEventType::UpgradeRequestReviewed,
                serde_json::json!({ "request_id": id, "status": new_status.as_str() }),
            )
            .await;

        Ok(request)
    }
}

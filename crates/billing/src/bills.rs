//! Bill lifecycle
//!
//! A bill is an immutable financial record once created; only `status` /
//! `paid_at` move, plus a one-time backfill of the generated bill and
//! invoice numbers. Numbers derive from a dedicated allocation sequence
//! (`bill_no`): the insert allocates the sequence value and a guarded update
//! stamps the formatted numbers inside the same transaction, so the
//! stamping is idempotent and a legacy row missing its numbers can be
//! backfilled later.
//!
//! `mark_paid` is the single authoritative transition from pending
//! financial obligation to live entitlement: it applies the bill's frozen
//! `breakdown.apply` payload to the subscription and activates the church,
//! all inside one transaction.

use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{PgConnection, PgPool};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use eglise_shared::{BillStatus, BillType, BillingCycle, PaymentStatus, PricingOrigin};

use crate::breakdown::Breakdown;
use crate::dates::add_months;
use crate::email::BillingEmailService;
use crate::error::{BillingError, BillingResult};
use crate::events::{BillingEventLogger, BillingEventType};

const BILL_COLUMNS: &str = "id, bill_no, bill_number, invoice_number, church_id, \
     subscription_id, bill_type, amount, billing_cycle, duration_months, \
     status, created_at, paid_at, breakdown";

/// A bill as stored.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Bill {
    pub id: Uuid,
    /// Number-allocation sequence value; not exposed to tenants.
    #[serde(skip)]
    pub bill_no: i64,
    pub bill_number: Option<String>,
    pub invoice_number: Option<String>,
    pub church_id: Uuid,
    pub subscription_id: Uuid,
    pub bill_type: String,
    pub amount: Decimal,
    pub billing_cycle: Option<String>,
    pub duration_months: Option<i32>,
    pub status: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub paid_at: Option<OffsetDateTime>,
    pub breakdown: Option<serde_json::Value>,
}

impl Bill {
    pub fn status(&self) -> BillingResult<BillStatus> {
        BillStatus::parse(&self.status)
            .ok_or_else(|| BillingError::Internal(format!("unknown bill status '{}'", self.status)))
    }

    pub fn bill_type(&self) -> BillingResult<BillType> {
        BillType::parse(&self.bill_type)
            .ok_or_else(|| BillingError::Internal(format!("unknown bill type '{}'", self.bill_type)))
    }
}

/// Inputs for creating a bill. The breakdown is frozen verbatim.
#[derive(Debug, Clone)]
pub struct NewBill<'a> {
    pub church_id: Uuid,
    pub subscription_id: Uuid,
    pub bill_type: BillType,
    pub billing_cycle: BillingCycle,
    pub duration_months: i32,
    pub amount: Decimal,
    pub breakdown: &'a Breakdown,
}

fn format_bill_number(year: i32, bill_no: i64) -> String {
    format!("EGLS-BILL-{}-{}", year, bill_no)
}

fn format_invoice_number(year: i32, bill_no: i64) -> String {
    format!("EGLS-INV-{}-{}", year, bill_no)
}

/// Insert a bill and stamp its generated numbers. Runs on the caller's
/// transaction so bill creation composes with subscription writes.
pub(crate) async fn insert_bill(conn: &mut PgConnection, new: NewBill<'_>) -> BillingResult<Bill> {
    let breakdown_value = new.breakdown.to_value()?;

    let (id, bill_no, created_at): (Uuid, i64, OffsetDateTime) = sqlx::query_as(
        r#"
        INSERT INTO bills (
            church_id, subscription_id, bill_type, amount,
            billing_cycle, duration_months, status, breakdown
        )
        VALUES ($1, $2, $3, $4, $5, $6, 'UNPAID', $7)
        RETURNING id, bill_no, created_at
        "#,
    )
    .bind(new.church_id)
    .bind(new.subscription_id)
    .bind(new.bill_type.as_str())
    .bind(new.amount)
    .bind(new.billing_cycle.as_str())
    .bind(new.duration_months)
    .bind(&breakdown_value)
    .fetch_one(&mut *conn)
    .await?;

    let year = created_at.year();
    let bill_number = format_bill_number(year, bill_no);
    let invoice_number = format_invoice_number(year, bill_no);

    // Guarded so re-running the stamp (e.g. backfill) never rewrites an
    // already-numbered bill.
    sqlx::query(
        "UPDATE bills SET bill_number = $2, invoice_number = $3 \
         WHERE id = $1 AND bill_number IS NULL",
    )
    .bind(id)
    .bind(&bill_number)
    .bind(&invoice_number)
    .execute(&mut *conn)
    .await?;

    Ok(Bill {
        id,
        bill_no,
        bill_number: Some(bill_number),
        invoice_number: Some(invoice_number),
        church_id: new.church_id,
        subscription_id: new.subscription_id,
        bill_type: new.bill_type.as_str().to_string(),
        amount: new.amount,
        billing_cycle: Some(new.billing_cycle.as_str().to_string()),
        duration_months: Some(new.duration_months),
        status: BillStatus::Unpaid.as_str().to_string(),
        created_at,
        paid_at: None,
        breakdown: Some(breakdown_value),
    })
}

/// True when the subscription already has an outstanding UNPAID bill.
pub(crate) async fn subscription_has_unpaid_bill(
    conn: &mut PgConnection,
    subscription_id: Uuid,
) -> BillingResult<bool> {
    let (exists,): (bool,) = sqlx::query_as(
        "SELECT EXISTS(SELECT 1 FROM bills WHERE subscription_id = $1 AND status = 'UNPAID')",
    )
    .bind(subscription_id)
    .fetch_one(conn)
    .await?;
    Ok(exists)
}

/// True when a bill was already created for the subscription on `day`
/// (one billing-affecting change per calendar day).
pub(crate) async fn subscription_billed_on(
    conn: &mut PgConnection,
    subscription_id: Uuid,
    day: Date,
) -> BillingResult<bool> {
    let (exists,): (bool,) = sqlx::query_as(
        "SELECT EXISTS(SELECT 1 FROM bills WHERE subscription_id = $1 AND created_at::date = $2)",
    )
    .bind(subscription_id)
    .bind(day)
    .fetch_one(conn)
    .await?;
    Ok(exists)
}

/// Bill lifecycle service.
pub struct BillService {
    pool: PgPool,
    email: BillingEmailService,
    event_logger: BillingEventLogger,
}

impl BillService {
    pub fn new(pool: PgPool, email: BillingEmailService) -> Self {
        let event_logger = BillingEventLogger::new(pool.clone());
        Self {
            pool,
            email,
            event_logger,
        }
    }

    /// Create a bill in UNPAID state with its frozen breakdown.
    pub async fn create_bill(&self, new: NewBill<'_>) -> BillingResult<Bill> {
        let mut tx = self.pool.begin().await?;
        let bill = insert_bill(&mut tx, new).await?;
        tx.commit().await?;

        tracing::info!(
            bill_id = %bill.id,
            church_id = %bill.church_id,
            bill_type = %bill.bill_type,
            amount = %bill.amount,
            "Bill created"
        );
        Ok(bill)
    }

    pub async fn get(&self, id: Uuid) -> BillingResult<Bill> {
        let bill: Option<Bill> =
            sqlx::query_as(&format!("SELECT {BILL_COLUMNS} FROM bills WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        bill.ok_or_else(|| BillingError::NotFound("bill".into()))
    }

    pub async fn list_for_church(&self, church_id: Uuid) -> BillingResult<Vec<Bill>> {
        let bills: Vec<Bill> = sqlx::query_as(&format!(
            "SELECT {BILL_COLUMNS} FROM bills WHERE church_id = $1 ORDER BY created_at DESC"
        ))
        .bind(church_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(bills)
    }

    pub async fn list_all(&self, status: Option<BillStatus>) -> BillingResult<Vec<Bill>> {
        let bills: Vec<Bill> = match status {
            Some(status) => {
                sqlx::query_as(&format!(
                    "SELECT {BILL_COLUMNS} FROM bills WHERE status = $1 ORDER BY created_at DESC"
                ))
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(&format!(
                    "SELECT {BILL_COLUMNS} FROM bills ORDER BY created_at DESC"
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(bills)
    }

    /// Confirm payment of a bill and apply its deferred changes.
    ///
    /// Silent no-op when the bill is not UNPAID (paying twice leaves state
    /// untouched) or when the subscription's package is a trial. Otherwise
    /// the bill, subscription and church all move together or not at all.
    pub async fn mark_paid(&self, bill_id: Uuid) -> BillingResult<()> {
        let mut tx = self.pool.begin().await?;

        let bill: Option<Bill> = sqlx::query_as(&format!(
            "SELECT {BILL_COLUMNS} FROM bills WHERE id = $1 FOR UPDATE"
        ))
        .bind(bill_id)
        .fetch_optional(&mut *tx)
        .await?;
        let bill = bill.ok_or_else(|| BillingError::NotFound("bill".into()))?;

        if bill.status()? != BillStatus::Unpaid {
            tracing::debug!(bill_id = %bill.id, status = %bill.status, "mark_paid is a no-op");
            return Ok(());
        }

        let (package_is_trial,): (bool,) = sqlx::query_as(
            r#"
            SELECT p.is_trial
            FROM church_subscriptions s
            JOIN packages p ON p.id = s.package_id
            WHERE s.id = $1
            FOR UPDATE OF s
            "#,
        )
        .bind(bill.subscription_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| BillingError::NotFound("subscription".into()))?;

        if package_is_trial {
            tracing::debug!(bill_id = %bill.id, "trial subscription; mark_paid is a no-op");
            return Ok(());
        }

        sqlx::query("UPDATE bills SET status = 'PAID', paid_at = NOW() WHERE id = $1")
            .bind(bill.id)
            .execute(&mut *tx)
            .await?;

        let today = OffsetDateTime::now_utc().date();

        // The frozen apply payload, never the live package, decides what
        // the subscription becomes.
        let apply = match bill.breakdown.clone() {
            Some(value) => {
                let breakdown = Breakdown::from_value(value)?;
                breakdown
                    .apply
                    .clone()
                    .map(|apply| (apply, breakdown.remaining_months()))
            }
            None => None,
        };

        match apply {
            Some((apply, remaining_months)) => {
                let period = match bill.bill_type()? {
                    BillType::New => Some((apply.duration_months, PricingOrigin::Base)),
                    BillType::Upgrade => {
                        Some((remaining_months.unwrap_or(0), PricingOrigin::Upgrade))
                    }
                    // Extension/renewal bills keep the existing period anchor.
                    BillType::Extension | BillType::Renew => None,
                };

                match period {
                    Some((duration_months, origin)) => {
                        let end_date = add_months(today, duration_months);
                        sqlx::query(
                            r#"
                            UPDATE church_subscriptions
                            SET package_id = $2,
                                billing_cycle = $3,
                                custom_capacity = $4,
                                start_date = $5,
                                end_date = $6,
                                duration_months = $7,
                                pricing_origin = $8,
                                payment_status = $9,
                                is_active = TRUE,
                                updated_at = NOW()
                            WHERE id = $1
                            "#,
                        )
                        .bind(bill.subscription_id)
                        .bind(apply.package_id)
                        .bind(apply.billing_cycle.as_str())
                        .bind(apply.custom_capacity)
                        .bind(today)
                        .bind(end_date)
                        .bind(duration_months)
                        .bind(origin.as_str())
                        .bind(PaymentStatus::Paid.as_str())
                        .execute(&mut *tx)
                        .await?;
                    }
                    None => {
                        sqlx::query(
                            r#"
                            UPDATE church_subscriptions
                            SET package_id = $2,
                                billing_cycle = $3,
                                custom_capacity = $4,
                                payment_status = $5,
                                is_active = TRUE,
                                updated_at = NOW()
                            WHERE id = $1
                            "#,
                        )
                        .bind(bill.subscription_id)
                        .bind(apply.package_id)
                        .bind(apply.billing_cycle.as_str())
                        .bind(apply.custom_capacity)
                        .bind(PaymentStatus::Paid.as_str())
                        .execute(&mut *tx)
                        .await?;
                    }
                }
            }
            None => {
                sqlx::query(
                    "UPDATE church_subscriptions \
                     SET payment_status = $2, is_active = TRUE, updated_at = NOW() \
                     WHERE id = $1",
                )
                .bind(bill.subscription_id)
                .bind(PaymentStatus::Paid.as_str())
                .execute(&mut *tx)
                .await?;
            }
        }

        sqlx::query("UPDATE churches SET is_active = TRUE WHERE id = $1")
            .bind(bill.church_id)
            .execute(&mut *tx)
            .await?;

        let church: Option<(String, String)> =
            sqlx::query_as("SELECT name, email FROM churches WHERE id = $1")
                .bind(bill.church_id)
                .fetch_optional(&mut *tx)
                .await?;

        tx.commit().await?;

        tracing::info!(
            bill_id = %bill.id,
            church_id = %bill.church_id,
            amount = %bill.amount,
            "Bill marked paid and applied"
        );

        self.event_logger
            .record(
                Some(bill.church_id),
                BillingEventType::BillPaid,
                serde_json::json!({
                    "bill_id": bill.id,
                    "bill_number": bill.bill_number,
                    "amount": bill.amount,
                }),
            )
            .await;

        if let Some((name, address)) = church {
            self.email
                .send_payment_confirmed(
                    &address,
                    &name,
                    bill.bill_number.as_deref().unwrap_or("-"),
                    bill.amount,
                )
                .await;
        }

        Ok(())
    }

    /// Backfill generated numbers for bills persisted before numbering
    /// existed. Already-stamped rows are skipped.
    pub async fn stamp_missing_numbers(&self) -> BillingResult<u64> {
        let rows: Vec<(Uuid, i64, OffsetDateTime)> = sqlx::query_as(
            "SELECT id, bill_no, created_at FROM bills WHERE bill_number IS NULL",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut stamped = 0u64;
        for (id, bill_no, created_at) in rows {
            let year = created_at.year();
            let result = sqlx::query(
                "UPDATE bills SET bill_number = $2, invoice_number = $3 \
                 WHERE id = $1 AND bill_number IS NULL",
            )
            .bind(id)
            .bind(format_bill_number(year, bill_no))
            .bind(format_invoice_number(year, bill_no))
            .execute(&self.pool)
            .await?;
            stamped += result.rows_affected();
        }

        if stamped > 0 {
            tracing::info!(stamped = stamped, "Backfilled bill numbers");
        }
        Ok(stamped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_formats() {
        assert_eq!(format_bill_number(2025, 41), "EGLS-BILL-2025-41");
        assert_eq!(format_invoice_number(2025, 41), "EGLS-INV-2025-41");
    }

    #[test]
    fn test_bill_status_accessor() {
        let bill = Bill {
            id: Uuid::new_v4(),
            bill_no: 1,
            bill_number: None,
            invoice_number: None,
            church_id: Uuid::new_v4(),
            subscription_id: Uuid::new_v4(),
            bill_type: "NEW".to_string(),
            amount: Decimal::ZERO,
            billing_cycle: Some("MONTHLY".to_string()),
            duration_months: Some(1),
            status: "UNPAID".to_string(),
            created_at: OffsetDateTime::UNIX_EPOCH,
            paid_at: None,
            breakdown: None,
        };
        assert_eq!(bill.status().unwrap(), BillStatus::Unpaid);
        assert_eq!(bill.bill_type().unwrap(), BillType::New);
    }
}

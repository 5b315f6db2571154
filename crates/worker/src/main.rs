//! EGLISE Background Worker
//!
//! Handles scheduled jobs including:
//! - Subscription expiry reminder emails (daily at 8:00 UTC)
//! - Billing invariant sweep (daily at 2:00 AM UTC)
//! - Bill number backfill for legacy rows (on startup)
//! - Health check heartbeat (every 5 minutes)

use std::sync::Arc;
use std::time::Duration;

use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use eglise_billing::{BillingService, ViolationSeverity};
use eglise_shared::create_pool;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    info!("Starting EGLISE Worker");

    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;
    let pool = create_pool(&database_url).await?;

    let billing = Arc::new(BillingService::from_env(pool));

    // Backfill bill numbers for rows persisted before numbering existed.
    match billing.bills.stamp_missing_numbers().await {
        Ok(0) => {}
        Ok(stamped) => info!(stamped = stamped, "Stamped missing bill numbers on startup"),
        Err(e) => error!(error = %e, "Bill number backfill failed"),
    }

    let scheduler = JobScheduler::new().await?;

    // Job 1: Subscription expiry reminders (daily at 8:00 UTC)
    // Emails each church whose paid subscription ends within 7 days.
    let reminder_billing = billing.clone();
    scheduler
        .add(Job::new_async("0 0 8 * * *", move |_uuid, _l| {
            let billing = reminder_billing.clone();
            Box::pin(async move {
                info!("Running subscription expiry reminder job");

                let expiring = match billing.subscriptions.expiring_within(7).await {
                    Ok(expiring) => expiring,
                    Err(e) => {
                        error!(error = %e, "Failed to query expiring subscriptions");
                        return;
                    }
                };

                let total = expiring.len();
                for subscription in expiring {
                    billing
                        .email
                        .send_expiry_reminder(
                            &subscription.church_email,
                            &subscription.church_name,
                            &subscription.package_name,
                            subscription.end_date,
                        )
                        .await;
                }

                info!(total = total, "Expiry reminder cycle complete");
            })
        })?)
        .await?;
    info!("Scheduled: Subscription expiry reminders (daily at 8:00 UTC)");

    // Job 2: Billing invariant sweep (daily at 2:00 AM UTC)
    let invariant_billing = billing.clone();
    scheduler
        .add(Job::new_async("0 0 2 * * *", move |_uuid, _l| {
            let billing = invariant_billing.clone();
            Box::pin(async move {
                info!("Running billing invariant sweep");

                let summary = match billing.invariants.run_all_checks().await {
                    Ok(summary) => summary,
                    Err(e) => {
                        error!(error = %e, "Invariant sweep failed");
                        return;
                    }
                };

                if summary.healthy {
                    info!(checks_run = summary.checks_run, "All billing invariants hold");
                    return;
                }

                for violation in &summary.violations {
                    if violation.severity == ViolationSeverity::Critical {
                        error!(
                            invariant = %violation.invariant,
                            church_ids = ?violation.church_ids,
                            description = %violation.description,
                            "CRITICAL billing invariant violation"
                        );
                    } else {
                        warn!(
                            invariant = %violation.invariant,
                            severity = %violation.severity,
                            description = %violation.description,
                            "Billing invariant violation"
                        );
                    }
                }

                warn!(
                    checks_failed = summary.checks_failed,
                    violations = summary.violations.len(),
                    "Billing invariant sweep found violations"
                );
            })
        })?)
        .await?;
    info!("Scheduled: Billing invariant sweep (daily at 2:00 AM UTC)");

    // Job 3: Health check heartbeat (every 5 minutes)
    scheduler
        .add(Job::new_async("0 */5 * * * *", |_uuid, _l| {
            Box::pin(async move {
                info!("Worker heartbeat - all systems operational");
            })
        })?)
        .await?;
    info!("Scheduled: Health check heartbeat (every 5 minutes)");

    info!("Starting job scheduler");
    scheduler.start().await?;

    info!("EGLISE Worker started successfully with 3 scheduled jobs");

    // Keep the main task running; the scheduler runs jobs in background tasks.
    loop {
        tokio::time::sleep(Duration::from_secs(3600)).await;
    }
}

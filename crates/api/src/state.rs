//! Application state

use std::sync::Arc;

use sqlx::PgPool;

use eglise_billing::BillingService;

use crate::config::Config;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub billing: Arc<BillingService>,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config) -> Self {
        let billing = Arc::new(BillingService::from_env(pool.clone()));
        Self {
            pool,
            config,
            billing,
        }
    }
}

//! Server configuration from environment variables

use anyhow::Context;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection string.
    pub database_url: String,
    /// Listen address, e.g. `0.0.0.0:8080`.
    pub bind_address: String,
    /// Bearer token required on `/admin` routes. Token issuance and admin
    /// identity live in the upstream auth service; this server only checks
    /// the shared secret it forwards.
    pub admin_api_token: String,
    /// Comma-separated CORS origins.
    pub allowed_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let admin_api_token =
            std::env::var("ADMIN_API_TOKEN").context("ADMIN_API_TOKEN must be set")?;
        if admin_api_token.len() < 16 {
            anyhow::bail!("ADMIN_API_TOKEN must be at least 16 characters");
        }

        let bind_address =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let allowed_origins = std::env::var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            database_url,
            bind_address,
            admin_api_token,
            allowed_origins,
        })
    }
}

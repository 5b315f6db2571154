//! Billing notification emails
//!
//! The platform only builds the notification request (recipient, subject,
//! body); delivery is owned by a Resend-compatible HTTP API. Sends are
//! best-effort: a delivery failure is logged and never fails the billing
//! operation that triggered it.

use rust_decimal::Decimal;
use serde::Serialize;
use time::Date;

/// Email delivery configuration.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub api_key: String,
    pub api_url: String,
    pub from_address: String,
    pub login_url: String,
    pub enabled: bool,
}

impl EmailConfig {
    pub fn from_env() -> Self {
        let api_key = std::env::var("RESEND_API_KEY").unwrap_or_default();
        Self {
            enabled: !api_key.is_empty(),
            api_key,
            api_url: std::env::var("RESEND_API_URL")
                .unwrap_or_else(|_| "https://api.resend.com/emails".to_string()),
            from_address: std::env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "EGLISE <billing@eglise.app>".to_string()),
            login_url: std::env::var("FRONTEND_LOGIN_URL")
                .unwrap_or_else(|_| "https://app.eglise.app/login".to_string()),
        }
    }
}

#[derive(Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    text: &'a str,
}

/// Outbound notification service for billing events.
#[derive(Clone)]
pub struct BillingEmailService {
    config: EmailConfig,
    client: reqwest::Client,
}

impl BillingEmailService {
    pub fn new(config: EmailConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(EmailConfig::from_env())
    }

    async fn send(&self, to: &str, subject: &str, body: &str) {
        if !self.config.enabled {
            tracing::debug!(to = %to, subject = %subject, "Email disabled, skipping send");
            return;
        }

        let request = SendEmailRequest {
            from: &self.config.from_address,
            to: [to],
            subject,
            text: body,
        };

        let result = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                tracing::info!(to = %to, subject = %subject, "Notification email sent");
            }
            Ok(response) => {
                tracing::warn!(
                    to = %to,
                    subject = %subject,
                    status = %response.status(),
                    "Notification email rejected by delivery service"
                );
            }
            Err(e) => {
                tracing::warn!(to = %to, subject = %subject, error = %e, "Failed to send email");
            }
        }
    }

    /// Sent after a church account is registered.
    pub async fn send_account_created(&self, to: &str, church_name: &str) {
        let body = format!(
            "Your church account for {} has been created successfully.\n\n\
             Login here:\n{}\n\n\
             Please purchase a package to activate your account.",
            church_name, self.config.login_url
        );
        self.send(to, "EGLISE Church Account Created", &body).await;
    }

    /// Sent when a bill is issued and payment is awaited.
    pub async fn send_bill_issued(
        &self,
        to: &str,
        church_name: &str,
        bill_number: &str,
        amount: Decimal,
    ) {
        let body = format!(
            "A bill has been generated for {}.\n\n\
             Bill number: {}\n\
             Amount due: {}\n\n\
             Your account will be activated after payment confirmation.",
            church_name, bill_number, amount
        );
        self.send(to, "EGLISE Subscription Bill", &body).await;
    }

    /// Sent after the operator confirms payment.
    pub async fn send_payment_confirmed(
        &self,
        to: &str,
        church_name: &str,
        bill_number: &str,
        amount: Decimal,
    ) {
        let body = format!(
            "Payment received for {}.\n\n\
             Bill number: {}\n\
             Amount: {}\n\n\
             Your subscription is now active.\n\
             Login here:\n{}",
            church_name, bill_number, amount, self.config.login_url
        );
        self.send(to, "EGLISE Payment Confirmed", &body).await;
    }

    /// Sent by the worker when a paid subscription is close to its end date.
    pub async fn send_expiry_reminder(
        &self,
        to: &str,
        church_name: &str,
        package_name: &str,
        end_date: Date,
    ) {
        let body = format!(
            "The subscription for {} ({}) ends on {}.\n\n\
             Please renew to keep your account active.",
            church_name, package_name, end_date
        );
        self.send(to, "EGLISE Subscription Expiring Soon", &body)
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_without_api_key() {
        let config = EmailConfig {
            api_key: String::new(),
            api_url: "https://api.resend.com/emails".to_string(),
            from_address: "EGLISE <billing@eglise.app>".to_string(),
            login_url: "https://app.eglise.app/login".to_string(),
            enabled: false,
        };
        let service = BillingEmailService::new(config);
        assert!(!service.config.enabled);
    }
}

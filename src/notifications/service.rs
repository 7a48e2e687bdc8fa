//! Alert delivery for failed jobs

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{error, info, warn};

use super::models::Email;
use crate::background_jobs::RetryPolicy;

/// Transport for alert emails.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &Email) -> Result<()>;
}

/// Mailer that writes alerts to the log instead of delivering them.
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &Email) -> Result<()> {
        warn!(
            "ALERT to [{}]: {}\n{}",
            email.recipients.join(", "),
            email.subject,
            email.body
        );
        Ok(())
    }
}

/// Composes alert emails and delivers them with retries.
pub struct AlertNotifier {
    mailer: Arc<dyn Mailer>,
    retry_policy: RetryPolicy,
}

impl AlertNotifier {
    pub fn new(mailer: Arc<dyn Mailer>, retry_policy: RetryPolicy) -> Self {
        Self {
            mailer,
            retry_policy,
        }
    }

    pub fn generate_email(
        &self,
        subject: &str,
        recipients: &[String],
        message: &str,
        stack_trace: &str,
    ) -> Email {
        Email::new(subject, recipients, message, stack_trace)
    }

    /// Send `email`, retrying transport failures.
    ///
    /// A final failure is logged and dropped.
    pub async fn send_with_retry(&self, email: Email) {
        let result = self
            .retry_policy
            .run(|| self.mailer.send(&email))
            .await;

        match result {
            Ok(()) => info!("Sent alert '{}'", email.subject),
            Err(e) => error!("Failed to send alert '{}': {:#}", email.subject, e),
        }
    }
}

//! HTTP downstream notifier
//!
//! POSTs `{"submission_id", "insert_id"}` to the configured endpoint once a
//! testimonial set is stored. What the endpoint does with it (an email, a
//! CRM update) is not our concern.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use testimony_agent::{Notification, Notifier, NotifyError};

/// Notifier backed by a plain HTTP POST
pub struct HttpNotifier {
    client: Client,
    url: String,
    timeout: Duration,
}

impl HttpNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            url: url.into(),
            timeout,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .json(notification)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    NotifyError::Timeout {
                        after_ms: self.timeout.as_millis() as u64,
                    }
                } else {
                    NotifyError::Request(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Status(status.as_u16()));
        }

        debug!(
            submission_id = %notification.submission_id,
            url = %self.url,
            "downstream notified"
        );
        Ok(())
    }
}

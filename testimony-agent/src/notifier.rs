//! Downstream notification collaborator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::NotifyError;
use crate::survey::DocumentId;

/// Payload sent downstream once a testimonial set is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub submission_id: String,
    #[serde(rename = "insert_id")]
    pub document_id: DocumentId,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Notifier used when no downstream endpoint is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        info!(
            submission_id = %notification.submission_id,
            document_id = %notification.document_id,
            "testimonials ready (no downstream endpoint configured)"
        );
        Ok(())
    }
}

//! Result Sink
//!
//! Stores the testimonial set, marks the submission completed, then notifies
//! downstream. Notification runs after the terminal status is written and its
//! outcome is recorded as delivery state; a failed notification never rolls
//! back a stored set. Once `max_delivery_attempts` have failed the state
//! turns `abandoned` and the redelivery sweep stops picking it up.

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::error::{NotifyError, PipelineError};
use crate::notifier::{Notification, Notifier};
use crate::store::SubmissionStore;
use crate::survey::{DeliveryState, Submission, SubmissionStatus};
use crate::testimonial::TestimonialSet;

/// Default cap on notification attempts per submission
pub const DEFAULT_MAX_DELIVERY_ATTEMPTS: u32 = 10;

#[derive(Clone)]
pub struct ResultSink {
    store: Arc<dyn SubmissionStore>,
    notifier: Arc<dyn Notifier>,
    notify_timeout: Duration,
    max_delivery_attempts: u32,
}

impl ResultSink {
    pub fn new(
        store: Arc<dyn SubmissionStore>,
        notifier: Arc<dyn Notifier>,
        notify_timeout: Duration,
    ) -> Self {
        Self {
            store,
            notifier,
            notify_timeout,
            max_delivery_attempts: DEFAULT_MAX_DELIVERY_ATTEMPTS,
        }
    }

    pub fn with_max_delivery_attempts(mut self, max: u32) -> Self {
        self.max_delivery_attempts = max.max(1);
        self
    }

    /// Persist `set` and notify. Returns the recorded delivery state.
    pub async fn commit(
        &self,
        submission: &Submission,
        set: &TestimonialSet,
    ) -> Result<DeliveryState, PipelineError> {
        self.store.save_testimonials(set).await?;
        self.store
            .set_status(&submission.document_id, SubmissionStatus::Completed)
            .await?;
        info!(
            submission_id = %submission.submission_id,
            document_id = %submission.document_id,
            completion = ?set.completion,
            "testimonial set stored"
        );

        Ok(self.deliver(submission).await)
    }

    /// Notify downstream once and record the outcome on the submission.
    pub async fn deliver(&self, submission: &Submission) -> DeliveryState {
        let notification = Notification {
            submission_id: submission.submission_id.clone(),
            document_id: submission.document_id.clone(),
        };
        let attempts = submission.delivery.attempts + 1;

        let after_ms = self.notify_timeout.as_millis() as u64;
        let outcome = tokio::time::timeout(self.notify_timeout, self.notifier.notify(&notification))
            .await
            .unwrap_or(Err(NotifyError::Timeout { after_ms }));

        let delivery = match outcome {
            Ok(()) => DeliveryState::delivered(attempts),
            Err(e) if attempts >= self.max_delivery_attempts => {
                error!(
                    submission_id = %submission.submission_id,
                    attempts,
                    error = %e,
                    "notification failed, giving up"
                );
                DeliveryState::abandoned(attempts, e.to_string())
            }
            Err(e) => {
                warn!(
                    submission_id = %submission.submission_id,
                    attempts,
                    error = %e,
                    "notification failed, marked pending"
                );
                DeliveryState::pending(attempts, e.to_string())
            }
        };

        if let Err(e) = self
            .store
            .set_delivery(&submission.document_id, &delivery)
            .await
        {
            error!(
                submission_id = %submission.submission_id,
                error = %e,
                "failed to record delivery state"
            );
        }
        delivery
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::LogNotifier;
    use crate::store::MemoryStore;
    use crate::survey::{DeliveryStatus, NewSubmission, SurveyAnswers};
    use crate::testimonial::Completion;
    use async_trait::async_trait;

    struct FailingNotifier;

    #[async_trait]
    impl Notifier for FailingNotifier {
        async fn notify(&self, _: &Notification) -> Result<(), NotifyError> {
            Err(NotifyError::Status(503))
        }
    }

    struct HangingNotifier;

    #[async_trait]
    impl Notifier for HangingNotifier {
        async fn notify(&self, _: &Notification) -> Result<(), NotifyError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        }
    }

    async fn stored(store: &MemoryStore) -> Submission {
        store
            .insert_submission(NewSubmission {
                submission_id: "s1".into(),
                form_id: "f".into(),
                webhook_url: "https://example.test".into(),
                contact: "a@b.com".into(),
                answers: SurveyAnswers::default(),
            })
            .await
            .unwrap()
    }

    fn set(submission: &Submission) -> TestimonialSet {
        TestimonialSet {
            submission_id: submission.submission_id.clone(),
            document_id: submission.document_id.clone(),
            summary: "sum".into(),
            context: vec![],
            short_testimonial: Some("s".into()),
            medium_testimonial: Some("m".into()),
            long_testimonial: Some("l".into()),
            completion: Completion::Complete,
            failures: vec![],
            sentiment: None,
        }
    }

    #[tokio::test]
    async fn test_commit_stores_and_delivers() {
        let store = Arc::new(MemoryStore::new());
        let submission = stored(&store).await;
        let sink = ResultSink::new(store.clone(), Arc::new(LogNotifier), Duration::from_secs(1));

        let delivery = sink.commit(&submission, &set(&submission)).await.unwrap();
        assert_eq!(delivery.status, DeliveryStatus::Delivered);

        let reloaded = store.load_submission(&submission.document_id).await.unwrap();
        assert_eq!(reloaded.status, SubmissionStatus::Completed);
        assert_eq!(reloaded.delivery.attempts, 1);
        assert!(store.load_testimonials("s1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_failed_notification_keeps_set_and_marks_pending() {
        let store = Arc::new(MemoryStore::new());
        let submission = stored(&store).await;
        let sink = ResultSink::new(store.clone(), Arc::new(FailingNotifier), Duration::from_secs(1));

        let delivery = sink.commit(&submission, &set(&submission)).await.unwrap();
        assert_eq!(delivery.status, DeliveryStatus::Pending);
        assert!(delivery.last_error.unwrap().contains("503"));

        let reloaded = store.load_submission(&submission.document_id).await.unwrap();
        assert_eq!(reloaded.status, SubmissionStatus::Completed);
        assert_eq!(reloaded.delivery.status, DeliveryStatus::Pending);
        assert_eq!(store.pending_deliveries().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_hanging_notifier_times_out() {
        let store = Arc::new(MemoryStore::new());
        let submission = stored(&store).await;
        let sink = ResultSink::new(store.clone(), Arc::new(HangingNotifier), Duration::from_millis(20));

        let delivery = sink.deliver(&submission).await;
        assert_eq!(delivery.status, DeliveryStatus::Pending);
        assert!(delivery.last_error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_delivery_abandoned_after_max_attempts() {
        let store = Arc::new(MemoryStore::new());
        let submission = stored(&store).await;
        let sink = ResultSink::new(store.clone(), Arc::new(FailingNotifier), Duration::from_secs(1))
            .with_max_delivery_attempts(2);

        let first = sink.commit(&submission, &set(&submission)).await.unwrap();
        assert_eq!(first.status, DeliveryStatus::Pending);

        let pending = store.pending_deliveries().await.unwrap();
        assert_eq!(pending.len(), 1);
        let second = sink.deliver(&pending[0]).await;
        assert_eq!(second.status, DeliveryStatus::Abandoned);
        assert_eq!(second.attempts, 2);

        assert!(store.pending_deliveries().await.unwrap().is_empty());
        let reloaded = store.load_submission(&submission.document_id).await.unwrap();
        assert_eq!(reloaded.delivery.status, DeliveryStatus::Abandoned);
        assert_eq!(reloaded.status, SubmissionStatus::Completed);
    }
}

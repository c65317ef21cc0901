//! Persistence collaborator.
//!
//! `SubmissionStore` is injected into the pipeline; the gateway provides a
//! MongoDB implementation and `MemoryStore` backs tests and dev mode.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::survey::{
    DeliveryState, DeliveryStatus, DocumentId, NewSubmission, Submission, SubmissionStatus,
};
use crate::testimonial::TestimonialSet;

#[async_trait]
pub trait SubmissionStore: Send + Sync {
    /// Persist a parsed submission with status `pending`.
    ///
    /// Fails with `Duplicate` if the submission identifier is already stored.
    async fn insert_submission(&self, new: NewSubmission) -> Result<Submission, StoreError>;

    async fn load_submission(&self, id: &DocumentId) -> Result<Submission, StoreError>;

    async fn set_status(&self, id: &DocumentId, status: SubmissionStatus) -> Result<(), StoreError>;

    async fn record_retry(&self, id: &DocumentId, retry_count: u32) -> Result<(), StoreError>;

    async fn set_delivery(&self, id: &DocumentId, delivery: &DeliveryState) -> Result<(), StoreError>;

    /// Upsert keyed by submission identifier.
    async fn save_testimonials(&self, set: &TestimonialSet) -> Result<(), StoreError>;

    async fn load_testimonials(&self, submission_id: &str)
        -> Result<Option<TestimonialSet>, StoreError>;

    /// Medium testimonials of the most recently saved sets, newest first,
    /// skipping the set belonging to `exclude_submission_id`.
    async fn recent_testimonials(
        &self,
        limit: usize,
        exclude_submission_id: &str,
    ) -> Result<Vec<String>, StoreError>;

    /// Submissions whose notification is awaiting retry.
    async fn pending_deliveries(&self) -> Result<Vec<Submission>, StoreError>;

    /// Submissions left `pending` or `running`.
    async fn unfinished_runs(&self) -> Result<Vec<Submission>, StoreError>;

    /// Cheap reachability check.
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[derive(Default)]
struct MemoryState {
    submissions: HashMap<DocumentId, Submission>,
    testimonials: HashMap<String, TestimonialSet>,
    /// Submission ids in save order, most recent last
    saved_order: Vec<String>,
}

/// In-process store.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a testimonial set directly, as if an earlier run had saved it.
    pub async fn seed_testimonials(&self, set: TestimonialSet) {
        let mut state = self.state.write().await;
        state.saved_order.retain(|id| id != &set.submission_id);
        state.saved_order.push(set.submission_id.clone());
        state.testimonials.insert(set.submission_id.clone(), set);
    }

    pub async fn submission_count(&self) -> usize {
        self.state.read().await.submissions.len()
    }
}

fn not_found(id: &DocumentId) -> StoreError {
    StoreError::NotFound(id.to_string())
}

#[async_trait]
impl SubmissionStore for MemoryStore {
    async fn insert_submission(&self, new: NewSubmission) -> Result<Submission, StoreError> {
        let mut state = self.state.write().await;
        if state
            .submissions
            .values()
            .any(|s| s.submission_id == new.submission_id)
        {
            return Err(StoreError::Duplicate(new.submission_id));
        }

        let document_id = DocumentId::new(uuid::Uuid::new_v4().simple().to_string());
        let submission = Submission::from_new(document_id.clone(), new);
        state.submissions.insert(document_id, submission.clone());
        Ok(submission)
    }

    async fn load_submission(&self, id: &DocumentId) -> Result<Submission, StoreError> {
        self.state
            .read()
            .await
            .submissions
            .get(id)
            .cloned()
            .ok_or_else(|| not_found(id))
    }

    async fn set_status(&self, id: &DocumentId, status: SubmissionStatus) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let submission = state.submissions.get_mut(id).ok_or_else(|| not_found(id))?;
        submission.status = status;
        Ok(())
    }

    async fn record_retry(&self, id: &DocumentId, retry_count: u32) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let submission = state.submissions.get_mut(id).ok_or_else(|| not_found(id))?;
        submission.retry_count = retry_count;
        Ok(())
    }

    async fn set_delivery(&self, id: &DocumentId, delivery: &DeliveryState) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let submission = state.submissions.get_mut(id).ok_or_else(|| not_found(id))?;
        submission.delivery = delivery.clone();
        Ok(())
    }

    async fn save_testimonials(&self, set: &TestimonialSet) -> Result<(), StoreError> {
        self.seed_testimonials(set.clone()).await;
        Ok(())
    }

    async fn load_testimonials(
        &self,
        submission_id: &str,
    ) -> Result<Option<TestimonialSet>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .testimonials
            .get(submission_id)
            .cloned())
    }

    async fn recent_testimonials(
        &self,
        limit: usize,
        exclude_submission_id: &str,
    ) -> Result<Vec<String>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .saved_order
            .iter()
            .rev()
            .filter(|id| id.as_str() != exclude_submission_id)
            .filter_map(|id| state.testimonials.get(id))
            .filter_map(|set| set.medium_testimonial.clone())
            .take(limit)
            .collect())
    }

    async fn pending_deliveries(&self) -> Result<Vec<Submission>, StoreError> {
        let state = self.state.read().await;
        let mut pending: Vec<Submission> = state
            .submissions
            .values()
            .filter(|s| s.delivery.status == DeliveryStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|s| s.created_at);
        Ok(pending)
    }

    async fn unfinished_runs(&self) -> Result<Vec<Submission>, StoreError> {
        let state = self.state.read().await;
        let mut unfinished: Vec<Submission> = state
            .submissions
            .values()
            .filter(|s| s.status.is_unfinished())
            .cloned()
            .collect();
        unfinished.sort_by_key(|s| s.created_at);
        Ok(unfinished)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::survey::SurveyAnswers;
    use crate::testimonial::Completion;
    use tokio_test::assert_err;

    fn new_submission(id: &str) -> NewSubmission {
        NewSubmission {
            submission_id: id.into(),
            form_id: "form".into(),
            webhook_url: "https://example.test".into(),
            contact: "a@b.com".into(),
            answers: SurveyAnswers::default(),
        }
    }

    fn set(submission_id: &str, medium: Option<&str>) -> TestimonialSet {
        TestimonialSet {
            submission_id: submission_id.into(),
            document_id: DocumentId::new(format!("doc-{}", submission_id)),
            summary: "sum".into(),
            context: vec![],
            short_testimonial: Some("s".into()),
            medium_testimonial: medium.map(String::from),
            long_testimonial: Some("l".into()),
            completion: Completion::Complete,
            failures: vec![],
            sentiment: None,
        }
    }

    #[tokio::test]
    async fn test_insert_assigns_id_and_pending_status() {
        let store = MemoryStore::new();
        let submission = store.insert_submission(new_submission("s1")).await.unwrap();

        assert_eq!(submission.status, SubmissionStatus::Pending);
        let loaded = store.load_submission(&submission.document_id).await.unwrap();
        assert_eq!(loaded, submission);
    }

    #[tokio::test]
    async fn test_duplicate_submission_rejected() {
        let store = MemoryStore::new();
        store.insert_submission(new_submission("s1")).await.unwrap();
        let err = assert_err!(store.insert_submission(new_submission("s1")).await);
        assert!(matches!(err, StoreError::Duplicate(_)));
        assert_eq!(store.submission_count().await, 1);
    }

    #[tokio::test]
    async fn test_recent_testimonials_newest_first_with_exclusion() {
        let store = MemoryStore::new();
        store.save_testimonials(&set("a", Some("first"))).await.unwrap();
        store.save_testimonials(&set("b", None)).await.unwrap();
        store.save_testimonials(&set("c", Some("third"))).await.unwrap();

        assert_eq!(
            store.recent_testimonials(10, "").await.unwrap(),
            vec!["third".to_string(), "first".to_string()]
        );
        assert_eq!(
            store.recent_testimonials(10, "c").await.unwrap(),
            vec!["first".to_string()]
        );
        assert_eq!(store.recent_testimonials(1, "").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_submission_id() {
        let store = MemoryStore::new();
        store.save_testimonials(&set("a", Some("old"))).await.unwrap();
        store.save_testimonials(&set("a", Some("new"))).await.unwrap();

        let loaded = store.load_testimonials("a").await.unwrap().unwrap();
        assert_eq!(loaded.medium_testimonial.as_deref(), Some("new"));
        assert_eq!(store.recent_testimonials(10, "").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_document_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .set_status(&DocumentId::new("missing"), SubmissionStatus::Running)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}

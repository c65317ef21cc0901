//! Submission document schema
//!
//! One document per ingested survey submission. The generated testimonial
//! set is mirrored onto it once a run completes.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use testimony_agent::{
    DeliveryState, DocumentId, NewSubmission, Submission, SubmissionStatus, SurveyAnswers,
    TestimonialSet,
};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for submissions
pub const SUBMISSION_COLLECTION: &str = "submissions";

/// Submission document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SubmissionDoc {
    /// MongoDB document ID, exposed to callers as `insert_id`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at, is_deleted)
    #[serde(default)]
    pub metadata: Metadata,

    /// Upstream form submission identifier (unique)
    pub submission_id: String,

    pub form_id: String,

    pub webhook_url: String,

    /// Respondent contact (email address)
    pub contact: String,

    /// Question/answer pairs in catalog order
    #[serde(default)]
    pub answers: SurveyAnswers,

    /// `pending`, `running`, `completed` or `failed:<kind>`
    pub status: SubmissionStatus,

    /// Failed attempts so far
    #[serde(default)]
    pub retry_count: u32,

    #[serde(default)]
    pub delivery: DeliveryState,

    /// Copy of the stored testimonial set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub testimonials: Option<TestimonialSet>,
}

impl SubmissionDoc {
    /// Create a new pending submission document
    pub fn new(new: NewSubmission) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            submission_id: new.submission_id,
            form_id: new.form_id,
            webhook_url: new.webhook_url,
            contact: new.contact,
            answers: new.answers,
            status: SubmissionStatus::Pending,
            retry_count: 0,
            delivery: DeliveryState::default(),
            testimonials: None,
        }
    }

    /// Convert to the pipeline's record; `None` if the document has no ID
    pub fn into_submission(self) -> Option<Submission> {
        let id = self._id?;
        let created_at = self
            .metadata
            .created_at
            .unwrap_or_else(|| id.timestamp())
            .to_chrono();

        Some(Submission {
            document_id: DocumentId::new(id.to_hex()),
            submission_id: self.submission_id,
            form_id: self.form_id,
            webhook_url: self.webhook_url,
            contact: self.contact,
            answers: self.answers,
            status: self.status,
            retry_count: self.retry_count,
            delivery: self.delivery,
            created_at,
        })
    }
}

impl IntoIndexes for SubmissionDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // Duplicate webhook deliveries must not create a second document
            (
                doc! { "submission_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("submission_id_unique".to_string())
                        .build(),
                ),
            ),
            // Recovery sweep over pending/running runs
            (
                doc! { "status": 1 },
                Some(IndexOptions::builder().name("status_index".to_string()).build()),
            ),
            // Notification redelivery sweep
            (
                doc! { "delivery.status": 1 },
                Some(
                    IndexOptions::builder()
                        .name("delivery_status_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for SubmissionDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

//! MongoDB-backed `SubmissionStore`
//!
//! Document identifiers are the hex form of the submission's ObjectId.
//! Testimonial sets live in their own collection, upserted by submission
//! identifier, and are copied onto the submission document.

use async_trait::async_trait;
use bson::{doc, oid::ObjectId, Document};
use tracing::debug;

use testimony_agent::{
    DeliveryState, DeliveryStatus, DocumentId, NewSubmission, StoreError, Submission,
    SubmissionStatus, SubmissionStore, TestimonialSet,
};

use crate::db::schemas::{
    SubmissionDoc, TestimonialDoc, SUBMISSION_COLLECTION, TESTIMONIAL_COLLECTION,
};
use crate::db::{MongoClient, MongoCollection};
use crate::types::GatewayError;

/// Submission store over the `submissions` and `testimonials` collections
pub struct MongoSubmissionStore {
    client: MongoClient,
    submissions: MongoCollection<SubmissionDoc>,
    testimonials: MongoCollection<TestimonialDoc>,
}

impl MongoSubmissionStore {
    /// Open both collections, creating their indexes
    pub async fn new(client: MongoClient) -> Result<Self, GatewayError> {
        let submissions = client.collection(SUBMISSION_COLLECTION).await?;
        let testimonials = client.collection(TESTIMONIAL_COLLECTION).await?;
        Ok(Self {
            client,
            submissions,
            testimonials,
        })
    }

    async fn update_submission(&self, id: &DocumentId, update: Document) -> Result<(), StoreError> {
        let result = self
            .submissions
            .update_one(id_filter(id)?, update)
            .await
            .map_err(backend)?;
        if result.matched_count == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn find_submissions(&self, filter: Document) -> Result<Vec<Submission>, StoreError> {
        let mut submissions: Vec<Submission> = self
            .submissions
            .find_many(filter)
            .await
            .map_err(backend)?
            .into_iter()
            .filter_map(SubmissionDoc::into_submission)
            .collect();
        submissions.sort_by_key(|s| s.created_at);
        Ok(submissions)
    }
}

/// Filter on `_id`; an identifier that is not an ObjectId can't exist
fn id_filter(id: &DocumentId) -> Result<Document, StoreError> {
    let oid =
        ObjectId::parse_str(id.as_str()).map_err(|_| StoreError::NotFound(id.to_string()))?;
    Ok(doc! { "_id": oid })
}

fn backend(err: GatewayError) -> StoreError {
    match err {
        GatewayError::Conflict(msg) => StoreError::Duplicate(msg),
        other => StoreError::Backend(other.to_string()),
    }
}

fn to_bson<T: serde::Serialize>(value: &T) -> Result<bson::Bson, StoreError> {
    bson::to_bson(value).map_err(|e| StoreError::Backend(format!("BSON encoding failed: {}", e)))
}

#[async_trait]
impl SubmissionStore for MongoSubmissionStore {
    async fn insert_submission(&self, new: NewSubmission) -> Result<Submission, StoreError> {
        let submission_id = new.submission_id.clone();
        let mut doc = SubmissionDoc::new(new);

        let oid = self
            .submissions
            .insert_one(doc.clone())
            .await
            .map_err(|e| match e {
                GatewayError::Conflict(_) => StoreError::Duplicate(submission_id),
                other => backend(other),
            })?;

        debug!(document_id = %oid, "submission document inserted");
        doc._id = Some(oid);
        doc.into_submission()
            .ok_or_else(|| StoreError::Backend("inserted document has no ID".into()))
    }

    async fn load_submission(&self, id: &DocumentId) -> Result<Submission, StoreError> {
        self.submissions
            .find_one(id_filter(id)?)
            .await
            .map_err(backend)?
            .and_then(SubmissionDoc::into_submission)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn set_status(&self, id: &DocumentId, status: SubmissionStatus) -> Result<(), StoreError> {
        self.update_submission(id, doc! { "$set": { "status": status.to_string() } })
            .await
    }

    async fn record_retry(&self, id: &DocumentId, retry_count: u32) -> Result<(), StoreError> {
        self.update_submission(id, doc! { "$set": { "retry_count": retry_count as i64 } })
            .await
    }

    async fn set_delivery(&self, id: &DocumentId, delivery: &DeliveryState) -> Result<(), StoreError> {
        self.update_submission(id, doc! { "$set": { "delivery": to_bson(delivery)? } })
            .await
    }

    async fn save_testimonials(&self, set: &TestimonialSet) -> Result<(), StoreError> {
        let update = TestimonialDoc::upsert_update(set)
            .map_err(|e| StoreError::Backend(format!("BSON encoding failed: {}", e)))?;
        self.testimonials
            .upsert_one(doc! { "submission_id": set.submission_id.as_str() }, update)
            .await
            .map_err(backend)?;

        self.update_submission(
            &set.document_id,
            doc! { "$set": { "testimonials": to_bson(set)? } },
        )
        .await
    }

    async fn load_testimonials(
        &self,
        submission_id: &str,
    ) -> Result<Option<TestimonialSet>, StoreError> {
        Ok(self
            .testimonials
            .find_one(doc! { "submission_id": submission_id })
            .await
            .map_err(backend)?
            .map(TestimonialDoc::into_set))
    }

    async fn recent_testimonials(
        &self,
        limit: usize,
        exclude_submission_id: &str,
    ) -> Result<Vec<String>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let docs = self
            .testimonials
            .find_sorted(
                doc! {
                    "submission_id": { "$ne": exclude_submission_id },
                    "medium_testimonial": { "$type": "string" },
                },
                doc! { "metadata.updated_at": -1 },
                i64::try_from(limit).unwrap_or(i64::MAX),
            )
            .await
            .map_err(backend)?;

        Ok(docs
            .into_iter()
            .filter_map(|doc| doc.medium_testimonial)
            .collect())
    }

    async fn pending_deliveries(&self) -> Result<Vec<Submission>, StoreError> {
        self.find_submissions(doc! { "delivery.status": DeliveryStatus::Pending.as_str() })
            .await
    }

    async fn unfinished_runs(&self) -> Result<Vec<Submission>, StoreError> {
        self.find_submissions(doc! {
            "status": {
                "$in": [
                    SubmissionStatus::Pending.to_string(),
                    SubmissionStatus::Running.to_string(),
                ]
            }
        })
        .await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.client.ping().await.map_err(backend)
    }
}

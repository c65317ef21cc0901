//! Testimonial document schema
//!
//! One document per submission, upserted on every successful run.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use testimony_agent::{Completion, DocumentId, SerializedTurn, TestimonialSet, VariantFailure};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for testimonial sets
pub const TESTIMONIAL_COLLECTION: &str = "testimonials";

/// Testimonial set document stored in MongoDB
///
/// Field names match `TestimonialSet`'s serialized form so the set can be
/// written with a single `$set`.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct TestimonialDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at, is_deleted)
    #[serde(default)]
    pub metadata: Metadata,

    pub submission_id: String,
    pub document_id: DocumentId,
    pub summary: String,

    /// Serialized stage transcript
    #[serde(default)]
    pub context: Vec<SerializedTurn>,

    pub short_testimonial: Option<String>,
    pub medium_testimonial: Option<String>,
    pub long_testimonial: Option<String>,
    pub completion: Completion,

    #[serde(default)]
    pub failures: Vec<VariantFailure>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<f64>,
}

impl TestimonialDoc {
    /// `$set`/`$unset` update that overwrites every field of `set`
    pub fn upsert_update(set: &TestimonialSet) -> Result<Document, bson::ser::Error> {
        let fields = bson::to_document(set)?;
        let mut update = doc! { "$set": fields };
        // Optional fields the serializer skips must not survive from a previous run
        if set.sentiment.is_none() {
            update.insert("$unset", doc! { "sentiment": "" });
        }
        Ok(update)
    }

    pub fn into_set(self) -> TestimonialSet {
        TestimonialSet {
            submission_id: self.submission_id,
            document_id: self.document_id,
            summary: self.summary,
            context: self.context,
            short_testimonial: self.short_testimonial,
            medium_testimonial: self.medium_testimonial,
            long_testimonial: self.long_testimonial,
            completion: self.completion,
            failures: self.failures,
            sentiment: self.sentiment,
        }
    }
}

impl IntoIndexes for TestimonialDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "submission_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("submission_id_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "metadata.created_at": -1 },
                Some(
                    IndexOptions::builder()
                        .name("created_at_index".to_string())
                        .build(),
                ),
            ),
            // Newest-first corpus reads; a re-run counts as a fresh save
            (
                doc! { "metadata.updated_at": -1 },
                Some(
                    IndexOptions::builder()
                        .name("updated_at_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for TestimonialDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(sentiment: Option<f64>) -> TestimonialSet {
        TestimonialSet {
            submission_id: "s-1".into(),
            document_id: DocumentId::new("abc"),
            summary: "Happy customer".into(),
            context: Vec::new(),
            short_testimonial: Some("Short.".into()),
            medium_testimonial: Some("Medium.".into()),
            long_testimonial: None,
            completion: Completion::Partial,
            failures: Vec::new(),
            sentiment,
        }
    }

    #[test]
    fn test_upsert_update_sets_every_field() {
        let update = TestimonialDoc::upsert_update(&set(Some(0.9))).unwrap();
        let fields = update.get_document("$set").unwrap();
        assert_eq!(fields.get_str("submission_id").unwrap(), "s-1");
        assert_eq!(fields.get_str("medium_testimonial").unwrap(), "Medium.");
        assert_eq!(fields.get_str("completion").unwrap(), "partial");
        assert!(fields.get("long_testimonial").unwrap().as_null().is_some());
        assert!(update.get("$unset").is_none());
    }

    #[test]
    fn test_upsert_update_clears_stale_sentiment() {
        let update = TestimonialDoc::upsert_update(&set(None)).unwrap();
        assert!(update.get_document("$unset").unwrap().contains_key("sentiment"));
    }

    #[test]
    fn test_update_fields_read_back_as_document() {
        let original = set(Some(0.5));
        let mut stored = TestimonialDoc::upsert_update(&original)
            .unwrap()
            .get_document("$set")
            .unwrap()
            .clone();
        stored.insert("metadata", bson::to_bson(&Metadata::new()).unwrap());

        let restored: TestimonialDoc = bson::from_document(stored).unwrap();
        assert_eq!(restored.into_set(), original);
    }
}

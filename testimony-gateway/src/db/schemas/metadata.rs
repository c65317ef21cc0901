//! Bookkeeping fields shared by every stored document

use bson::DateTime;
use serde::{Deserialize, Serialize};

/// Timestamps and the soft-delete flag
///
/// `MongoCollection` writes these; schemas only carry them. Reads skip
/// documents flagged `is_deleted`, so records can be retired by hand without
/// losing the audit trail.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Metadata {
    #[serde(default)]
    pub is_deleted: bool,

    /// Last write, including status and delivery updates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime>,
}

impl Metadata {
    /// Metadata for a document about to be inserted
    pub fn new() -> Self {
        let now = DateTime::now();
        Self {
            is_deleted: false,
            updated_at: Some(now),
            created_at: Some(now),
        }
    }
}

//! MongoDB client and collection wrapper

use bson::{doc, oid::ObjectId, DateTime, Document};
use futures::StreamExt;
use mongodb::{
    error::{ErrorKind, WriteFailure},
    options::{IndexOptions, UpdateModifications},
    results::UpdateResult,
    Client, Collection, IndexModel,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{error, info};

use crate::db::schemas::Metadata;
use crate::types::GatewayError;

/// Server error code for a unique index violation
const DUPLICATE_KEY_CODE: i32 = 11000;

/// Trait for schemas that provide index definitions
pub trait IntoIndexes {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)>;
}

/// Trait for schemas with mutable metadata
pub trait MutMetadata {
    fn mut_metadata(&mut self) -> &mut Metadata;
}

/// MongoDB client wrapper
#[derive(Clone)]
pub struct MongoClient {
    client: Client,
    db_name: String,
}

impl MongoClient {
    /// Create a new MongoDB client
    pub async fn new(uri: &str, db_name: &str) -> Result<Self, GatewayError> {
        info!("Connecting to MongoDB at {}", redact_uri(uri));

        // Use serverSelectionTimeoutMS to avoid hanging on unreachable MongoDB
        let timeout_uri = if uri.contains('?') {
            format!("{}&serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        } else {
            format!("{}?serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        };

        let client = Client::with_uri_str(&timeout_uri)
            .await
            .map_err(|e| GatewayError::Database(format!("Failed to connect to MongoDB: {}", e)))?;

        let mongo = Self {
            client,
            db_name: db_name.to_string(),
        };
        mongo.ping().await?;

        info!("Connected to MongoDB database '{}'", db_name);
        Ok(mongo)
    }

    /// Round-trip a `ping` command
    pub async fn ping(&self) -> Result<(), GatewayError> {
        self.client
            .database(&self.db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| GatewayError::Database(format!("MongoDB ping failed: {}", e)))?;
        Ok(())
    }

    /// Get a typed collection
    pub async fn collection<T>(&self, name: &str) -> Result<MongoCollection<T>, GatewayError>
    where
        T: Serialize + DeserializeOwned + Unpin + Send + Sync + IntoIndexes + MutMetadata,
    {
        MongoCollection::new(&self.client, &self.db_name, name).await
    }

    /// Get the database name
    pub fn db_name(&self) -> &str {
        &self.db_name
    }
}

/// Typed MongoDB collection with automatic indexing
#[derive(Debug, Clone)]
pub struct MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync,
{
    inner: Collection<T>,
}

impl<T> MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync + IntoIndexes + MutMetadata,
{
    /// Create a new collection and apply indexes
    pub async fn new(
        client: &Client,
        db_name: &str,
        collection_name: &str,
    ) -> Result<Self, GatewayError> {
        let collection = client.database(db_name).collection::<T>(collection_name);
        let mongo_collection = MongoCollection { inner: collection };

        mongo_collection.apply_indexes().await?;

        Ok(mongo_collection)
    }

    /// Apply schema-defined indexes
    async fn apply_indexes(&self) -> Result<(), GatewayError> {
        let schema_indices = T::into_indices();

        if schema_indices.is_empty() {
            return Ok(());
        }

        let indices: Vec<IndexModel> = schema_indices
            .into_iter()
            .map(|(keys, opts)| IndexModel::builder().keys(keys).options(opts).build())
            .collect();

        self.inner
            .create_indexes(indices)
            .await
            .map_err(|e| GatewayError::Database(format!("Failed to create indexes: {}", e)))?;

        Ok(())
    }

    /// Insert a document, setting metadata timestamps
    ///
    /// A unique index violation comes back as `GatewayError::Conflict`.
    pub async fn insert_one(&self, mut item: T) -> Result<ObjectId, GatewayError> {
        let now = DateTime::now();
        let metadata = item.mut_metadata();
        metadata.is_deleted = false;
        metadata.created_at = Some(now);
        metadata.updated_at = Some(now);

        let result = self.inner.insert_one(item).await.map_err(|e| {
            if is_duplicate_key(&e) {
                GatewayError::Conflict(e.to_string())
            } else {
                GatewayError::Database(format!("Insert failed: {}", e))
            }
        })?;

        result
            .inserted_id
            .as_object_id()
            .ok_or_else(|| GatewayError::Database("Failed to get inserted ID".into()))
    }

    /// Find one document by filter
    pub async fn find_one(&self, filter: Document) -> Result<Option<T>, GatewayError> {
        self.inner
            .find_one(live(filter))
            .await
            .map_err(|e| GatewayError::Database(format!("Find failed: {}", e)))
    }

    /// Find many documents by filter
    pub async fn find_many(&self, filter: Document) -> Result<Vec<T>, GatewayError> {
        let cursor = self
            .inner
            .find(live(filter))
            .await
            .map_err(|e| GatewayError::Database(format!("Find failed: {}", e)))?;

        Ok(collect_cursor(cursor).await)
    }

    /// Find documents by filter, sorted, returning at most `limit`
    pub async fn find_sorted(
        &self,
        filter: Document,
        sort: Document,
        limit: i64,
    ) -> Result<Vec<T>, GatewayError> {
        let cursor = self
            .inner
            .find(live(filter))
            .sort(sort)
            .limit(limit)
            .await
            .map_err(|e| GatewayError::Database(format!("Find failed: {}", e)))?;

        Ok(collect_cursor(cursor).await)
    }

    /// Update one document, stamping `metadata.updated_at`
    ///
    /// Only `$set`-style documents are stamped; pipelines pass through.
    pub async fn update_one(
        &self,
        filter: Document,
        update: impl Into<UpdateModifications>,
    ) -> Result<UpdateResult, GatewayError> {
        self.inner
            .update_one(filter, stamp_updated(update.into()))
            .await
            .map_err(|e| GatewayError::Database(format!("Update failed: {}", e)))
    }

    /// Update one document, inserting it when no document matches
    ///
    /// `metadata.created_at` is only written on insert.
    pub async fn upsert_one(
        &self,
        filter: Document,
        update: Document,
    ) -> Result<UpdateResult, GatewayError> {
        let mut update = update;
        let mut on_insert = update
            .get_document("$setOnInsert")
            .cloned()
            .unwrap_or_default();
        on_insert.insert("metadata.created_at", DateTime::now());
        on_insert.insert("metadata.is_deleted", false);
        update.insert("$setOnInsert", on_insert);

        self.inner
            .update_one(filter, stamp_updated(UpdateModifications::Document(update)))
            .upsert(true)
            .await
            .map_err(|e| GatewayError::Database(format!("Upsert failed: {}", e)))
    }
}

/// Exclude soft-deleted documents
fn live(mut filter: Document) -> Document {
    filter.insert("metadata.is_deleted", doc! { "$ne": true });
    filter
}

fn stamp_updated(update: UpdateModifications) -> UpdateModifications {
    match update {
        UpdateModifications::Document(mut update) => {
            let mut set = update.get_document("$set").cloned().unwrap_or_default();
            set.insert("metadata.updated_at", DateTime::now());
            update.insert("$set", set);
            UpdateModifications::Document(update)
        }
        other => other,
    }
}

async fn collect_cursor<T>(cursor: mongodb::Cursor<T>) -> Vec<T>
where
    T: DeserializeOwned + Unpin + Send + Sync,
{
    cursor
        .filter_map(|doc| async {
            match doc {
                Ok(d) => Some(d),
                Err(e) => {
                    error!("Error reading document: {}", e);
                    None
                }
            }
        })
        .collect()
        .await
}

/// Whether a driver error is a unique index violation
pub fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write)) if write.code == DUPLICATE_KEY_CODE
    )
}

/// Strip credentials from a connection string before logging it
fn redact_uri(uri: &str) -> String {
    match (uri.find("://"), uri.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***{}", &uri[..scheme_end], &uri[at..])
        }
        _ => uri.to_string(),
    }
}

#[cfg(test)]
mod tests {
    // Collection behavior needs a running MongoDB instance; these cover the
    // pure document helpers.
    use super::*;

    #[test]
    fn test_live_filter_excludes_deleted() {
        let filter = live(doc! { "status": "pending" });
        assert_eq!(filter.get_str("status").unwrap(), "pending");
        assert_eq!(
            filter.get_document("metadata.is_deleted").unwrap(),
            &doc! { "$ne": true }
        );
    }

    #[test]
    fn test_stamp_updated_merges_into_existing_set() {
        let update = doc! { "$set": { "status": "running" }, "$inc": { "n": 1 } };
        let UpdateModifications::Document(stamped) = stamp_updated(update.into()) else {
            panic!("expected a document update");
        };

        let set = stamped.get_document("$set").unwrap();
        assert_eq!(set.get_str("status").unwrap(), "running");
        assert!(set.get_datetime("metadata.updated_at").is_ok());
        assert!(stamped.get_document("$inc").is_ok());
    }

    #[test]
    fn test_redact_uri_hides_credentials() {
        assert_eq!(
            redact_uri("mongodb://user:secret@db:27017/x"),
            "mongodb://***@db:27017/x"
        );
        assert_eq!(redact_uri("mongodb://localhost:27017"), "mongodb://localhost:27017");
    }
}

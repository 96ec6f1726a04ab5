//! Backing document store.
//!
//! The engine talks to storage only through [`DocumentStore`]. Documents are
//! JSON objects addressed by a string id; the store also tracks insertion
//! order (`seq`) which is the final tie breaker for every read.

mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::error::Result;
use crate::orm::{SortKey, StoreQuery};

pub use sqlite::SqliteStore;

/// A document body: property name -> JSON value.
pub type Document = Map<String, Value>;

/// A document as persisted, with its system fields.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: String,
    /// Insertion sequence
    pub seq: i64,
    pub body: Document,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create the collection if it does not exist yet.
    async fn ensure_collection(&self, collection: &str) -> Result<()>;

    /// Matching documents ordered by `sort`, then insertion order.
    /// `limit = None` returns everything after `skip`.
    async fn find(
        &self,
        collection: &str,
        query: &StoreQuery,
        skip: i64,
        limit: Option<i64>,
        sort: &[SortKey],
    ) -> Result<Vec<StoredDocument>>;

    async fn count(&self, collection: &str, query: &StoreQuery) -> Result<i64>;

    /// Persist a new document under a fresh id.
    async fn insert(&self, collection: &str, body: Document) -> Result<StoredDocument>;

    async fn find_by_id(&self, collection: &str, id: &str) -> Result<Option<StoredDocument>>;

    /// Set each top-level key of `patch` on the document and return the
    /// post-update state, or `None` when no document has this id.
    async fn find_by_id_and_update(
        &self,
        collection: &str,
        id: &str,
        patch: Document,
    ) -> Result<Option<StoredDocument>>;
}

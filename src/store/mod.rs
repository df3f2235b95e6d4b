//! Document Store Module
//!
//! The storage collaborator contract: a store hands out named collections,
//! and a collection supports counting, lookup, filtered finds and upserts
//! keyed by opaque filter documents. Filters and sort specifications are
//! plain JSON maps passed through to the implementation unmodified.
//!
//! One implementation ships with the crate: [`MemoryStore`], an
//! insertion-ordered in-memory store used by the test-suite and suitable as
//! a default backend for small deployments.

mod memory;

use crate::core::Result;
use async_trait::async_trait;
use std::sync::Arc;

pub use memory::MemoryStore;

/// A stored document. Field order is not significant; identity lives in the
/// `_id` key once the store has assigned it.
pub type Document = serde_json::Map<String, serde_json::Value>;

/// Options applied to a [`Collection::find`] call.
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    /// Sort specification: field name to direction, negative for descending.
    pub sort: Option<Document>,
    /// Number of matching documents to skip.
    pub skip: Option<u64>,
    /// Maximum number of documents to return; absent means no limit.
    pub limit: Option<u64>,
}

/// A named collection of documents.
#[async_trait]
pub trait Collection: Send + Sync {
    /// Counts the documents matching `filter`.
    async fn count(&self, filter: &Document) -> Result<u64>;

    /// Returns the first document matching `filter`, if any.
    async fn find_one(&self, filter: &Document) -> Result<Option<Document>>;

    /// Returns all documents matching `filter`, honouring `options`.
    async fn find(&self, filter: &Document, options: FindOptions) -> Result<Vec<Document>>;

    /// Upserts `doc`: replaces the document sharing its `_id`, or inserts it
    /// (assigning an `_id` when absent). Returns the stored document.
    async fn save(&self, doc: Document) -> Result<Document>;

    /// Removes every document matching `filter`, returning how many went.
    async fn remove(&self, filter: &Document) -> Result<u64>;
}

/// A handle onto a document store.
pub trait DocumentStore: Send + Sync {
    /// Returns the named collection, creating it if the store supports that.
    fn collection(&self, name: &str) -> Arc<dyn Collection>;
}

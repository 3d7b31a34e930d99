use async_trait::async_trait;
use crate::core::{Document, StoreError};

/// Outcome of one document inside a bulk write, positionally aligned with
/// the submitted batch.
pub type WriteResult = std::result::Result<String, StoreError>;

/// One row of a bulk document fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRow {
    /// The requested id.
    pub key: String,
    pub doc: std::result::Result<Document, StoreError>,
}

/// A revisioned document store.
///
/// This is the only seam between the force-write algorithms and the storage
/// backend. `MemoryStore` implements it for tests and embedded use, `CouchStore`
/// talks to a CouchDB server over HTTP. Wrap any other backend to get the same
/// conflict resolution.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Name of the database this handle is bound to, if any.
    fn database(&self) -> Option<&str>;

    /// Fetch one document. Fails with `ErrorKind::NotFound` if it is absent.
    async fn get(&self, id: &str) -> Result<Document, StoreError>;

    /// Write one document, returning its new revision.
    ///
    /// Fails with `ErrorKind::Conflict` when `doc.rev` is not the current
    /// revision (or is absent while the document exists).
    async fn insert(&self, doc: &Document) -> Result<String, StoreError>;

    /// Write a batch in one round-trip. Returns one result per submitted
    /// document, in submission order.
    async fn bulk_write(&self, docs: &[Document]) -> Result<Vec<WriteResult>, StoreError>;

    /// Fetch full documents for the given ids.
    async fn fetch(&self, ids: &[String]) -> Result<Vec<FetchRow>, StoreError>;

    /// Fetch current revisions, positionally aligned with `ids`.
    /// Missing or deleted documents yield `None`.
    async fn fetch_revisions(&self, ids: &[String]) -> Result<Vec<Option<String>>, StoreError>;
}

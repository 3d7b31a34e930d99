// ============================================================================
// couchforce Library
// ============================================================================

pub mod connection;
pub mod core;
pub mod force;
pub mod interface;
pub mod storage;

// Re-export main types for convenience
pub use crate::core::{BulkOperation, Document, ErrorKind, Fields, ForceError, Patch, Result, StoreError};
pub use interface::{DocumentStore, FetchRow, WriteResult};
pub use storage::{CouchStore, MemoryStore};

// Re-export force operations
pub use connection::{
    StoreAddress,
    config::{CouchAddress, StoreConfig},
};
pub use force::{
    BulkInsertOptions, BulkPatchOptions, InsertOptions, OverlayPatcher, PatchOptions, Patcher,
    Retries, RetryPolicy, bulk_insert, bulk_patch, insert, patch,
};

use std::sync::Arc;

// ============================================================================
// High-level Client API
// ============================================================================

/// Store handle with retry settings, resolved once and reused for every call.
///
/// The free functions in [`force`] resolve their address on each call; the
/// client does it up front, so an address without a database fails at
/// `connect` time.
///
/// # Examples
///
/// ```
/// use couchforce::{Client, Document, MemoryStore, Patch};
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> couchforce::Result<()> {
/// let client = Client::connect(Arc::new(MemoryStore::new("mydb")))?;
///
/// client.insert(&Document::new("mydoc").set("foo", "bar")).await?;
/// let doc = client.patch(&Patch::new("mydoc").set("baz", 1)).await?;
/// assert_eq!(doc.get("foo"), Some(&serde_json::json!("bar")));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    store: Arc<dyn DocumentStore>,
    retries: Retries,
}

impl Client {
    /// Connect with the default store configuration.
    pub fn connect(address: impl Into<StoreAddress>) -> Result<Self> {
        Self::connect_with_config(address, &StoreConfig::default())
    }

    pub fn connect_with_config(address: impl Into<StoreAddress>, config: &StoreConfig) -> Result<Self> {
        let store = address.into().resolve(config)?;
        Ok(Self {
            store,
            retries: Retries::default(),
        })
    }

    /// Retry settings used by every call made through this client.
    pub fn with_retries(mut self, retries: impl Into<Retries>) -> Self {
        self.retries = retries.into();
        self
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    fn address(&self) -> StoreAddress {
        StoreAddress::Handle(Arc::clone(&self.store))
    }

    pub async fn insert(&self, doc: &Document) -> Result<Document> {
        let options = InsertOptions::default().retries(self.retries.clone());
        insert(self.address(), doc, options).await
    }

    /// Patch with the default overlay merge, creating missing documents.
    pub async fn patch(&self, patch: &Patch) -> Result<Document> {
        self.patch_with(patch, PatchOptions::default()).await
    }

    /// Patch with explicit options. The client's retry settings replace
    /// `options.retries`.
    pub async fn patch_with(&self, patch: &Patch, options: PatchOptions) -> Result<Document> {
        let options = options.retries(self.retries.clone());
        force::patch(self.address(), patch, options).await
    }

    pub async fn bulk_insert(&self, docs: &[Document]) -> Result<Vec<Document>> {
        let options = BulkInsertOptions::default().retries(self.retries.clone());
        bulk_insert(self.address(), docs, options).await
    }

    pub async fn bulk_patch(&self, patches: &[Patch]) -> Result<Vec<Document>> {
        self.bulk_patch_with(patches, BulkPatchOptions::default()).await
    }

    pub async fn bulk_patch_with(
        &self,
        patches: &[Patch],
        options: BulkPatchOptions,
    ) -> Result<Vec<Document>> {
        let options = options.retries(self.retries.clone());
        bulk_patch(self.address(), patches, options).await
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("database", &self.store.database())
            .field("retries", &self.retries)
            .finish()
    }
}

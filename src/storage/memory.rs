use crate::core::{Document, Fields, StoreError};
use crate::interface::{DocumentStore, FetchRow, WriteResult};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// One stored version slot. `fields` is `None` for a deletion tombstone.
struct StoredDocument {
    generation: u64,
    rev: String,
    fields: Option<Fields>,
}

impl StoredDocument {
    fn is_live(&self) -> bool {
        self.fields.is_some()
    }

    fn to_document(&self, id: &str) -> Option<Document> {
        let fields = self.fields.as_ref()?;
        Some(Document {
            id: id.to_string(),
            rev: Some(self.rev.clone()),
            fields: fields.clone(),
        })
    }
}

/// Revision-tracked in-memory document store.
///
/// Follows CouchDB write rules: a write must carry the current revision of a
/// live document, must carry no revision for a new one, and may recreate a
/// deleted document with or without the tombstone revision.
pub struct MemoryStore {
    database: Option<String>,
    docs: RwLock<HashMap<String, StoredDocument>>,
}

impl MemoryStore {
    pub fn new(database: &str) -> Self {
        Self {
            database: Some(database.to_string()),
            docs: RwLock::new(HashMap::new()),
        }
    }

    /// A store handle not bound to any database.
    pub fn unbound() -> Self {
        Self {
            database: None,
            docs: RwLock::new(HashMap::new()),
        }
    }

    /// Delete a document, leaving a tombstone. Returns the tombstone revision.
    pub async fn remove(&self, id: &str, rev: &str) -> Result<String, StoreError> {
        let mut docs = self.docs.write().await;
        let stored = docs
            .get_mut(id)
            .filter(|stored| stored.is_live())
            .ok_or_else(StoreError::not_found)?;

        if stored.rev != rev {
            return Err(StoreError::conflict());
        }

        stored.generation += 1;
        stored.rev = next_rev(stored.generation);
        stored.fields = None;
        Ok(stored.rev.clone())
    }

    /// Number of live documents.
    pub async fn len(&self) -> usize {
        let docs = self.docs.read().await;
        docs.values().filter(|stored| stored.is_live()).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn write_one(docs: &mut HashMap<String, StoredDocument>, doc: &Document) -> WriteResult {
        let generation = match docs.get(&doc.id) {
            Some(stored) if stored.is_live() => {
                if doc.rev.as_deref() != Some(stored.rev.as_str()) {
                    return Err(StoreError::conflict());
                }
                stored.generation
            }
            Some(stored) => {
                if doc.rev.as_ref().is_some_and(|rev| *rev != stored.rev) {
                    return Err(StoreError::conflict());
                }
                stored.generation
            }
            None => {
                if doc.rev.is_some() {
                    return Err(StoreError::conflict());
                }
                0
            }
        };

        let rev = next_rev(generation + 1);
        docs.insert(
            doc.id.clone(),
            StoredDocument {
                generation: generation + 1,
                rev: rev.clone(),
                fields: Some(doc.fields.clone()),
            },
        );
        Ok(rev)
    }
}

fn next_rev(generation: u64) -> String {
    format!("{}-{}", generation, Uuid::new_v4().simple())
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    async fn get(&self, id: &str) -> Result<Document, StoreError> {
        let docs = self.docs.read().await;
        docs.get(id)
            .and_then(|stored| stored.to_document(id))
            .ok_or_else(StoreError::not_found)
    }

    async fn insert(&self, doc: &Document) -> Result<String, StoreError> {
        let mut docs = self.docs.write().await;
        Self::write_one(&mut docs, doc)
    }

    async fn bulk_write(&self, batch: &[Document]) -> Result<Vec<WriteResult>, StoreError> {
        let mut docs = self.docs.write().await;
        Ok(batch
            .iter()
            .map(|doc| Self::write_one(&mut docs, doc))
            .collect())
    }

    async fn fetch(&self, ids: &[String]) -> Result<Vec<FetchRow>, StoreError> {
        let docs = self.docs.read().await;
        Ok(ids
            .iter()
            .map(|id| FetchRow {
                key: id.clone(),
                doc: docs
                    .get(id)
                    .and_then(|stored| stored.to_document(id))
                    .ok_or_else(StoreError::not_found),
            })
            .collect())
    }

    async fn fetch_revisions(&self, ids: &[String]) -> Result<Vec<Option<String>>, StoreError> {
        let docs = self.docs.read().await;
        Ok(ids
            .iter()
            .map(|id| {
                docs.get(id)
                    .filter(|stored| stored.is_live())
                    .map(|stored| stored.rev.clone())
            })
            .collect())
    }
}

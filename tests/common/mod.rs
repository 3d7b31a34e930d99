//! Shared test harness
//!
//! `RecordingStore` wraps a `MemoryStore`, counts calls per operation and can
//! be scripted to misbehave: concurrent writers that make the next writes
//! conflict, deletions racing a re-fetch, injected call failures and
//! per-document bulk write errors.
#![allow(dead_code)]

use async_trait::async_trait;
use couchforce::{Document, DocumentStore, FetchRow, MemoryStore, RetryPolicy, StoreError, WriteResult};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Get,
    Insert,
    BulkWrite,
    Fetch,
    FetchRevisions,
}

#[derive(Default)]
pub struct Calls {
    get: AtomicUsize,
    insert: AtomicUsize,
    bulk_write: AtomicUsize,
    fetch: AtomicUsize,
    fetch_revisions: AtomicUsize,
}

impl Calls {
    fn counter(&self, op: Op) -> &AtomicUsize {
        match op {
            Op::Get => &self.get,
            Op::Insert => &self.insert,
            Op::BulkWrite => &self.bulk_write,
            Op::Fetch => &self.fetch,
            Op::FetchRevisions => &self.fetch_revisions,
        }
    }
}

pub struct RecordingStore {
    inner: MemoryStore,
    calls: Calls,
    /// Writes still to be preceded by a concurrent update of the same ids.
    interfering_writes: AtomicUsize,
    /// `get` calls still to be preceded by a deletion of the document.
    deleting_gets: AtomicUsize,
    failures: Mutex<Vec<(Op, StoreError)>>,
    item_errors: Mutex<HashMap<String, StoreError>>,
    /// Ids submitted by every bulk write, in call order.
    batches: Mutex<Vec<Vec<String>>>,
}

impl RecordingStore {
    pub fn new(database: &str) -> Self {
        Self::wrap(MemoryStore::new(database))
    }

    pub fn wrap(inner: MemoryStore) -> Self {
        Self {
            inner,
            calls: Calls::default(),
            interfering_writes: AtomicUsize::new(0),
            deleting_gets: AtomicUsize::new(0),
            failures: Mutex::new(Vec::new()),
            item_errors: Mutex::new(HashMap::new()),
            batches: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self, op: Op) -> usize {
        self.calls.counter(op).load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        [Op::Get, Op::Insert, Op::BulkWrite, Op::Fetch, Op::FetchRevisions]
            .into_iter()
            .map(|op| self.calls(op))
            .sum()
    }

    pub fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().unwrap().clone()
    }

    /// Let another writer update the target documents right before each of
    /// the next `writes` write calls.
    pub fn interfere(&self, writes: usize) {
        self.interfering_writes.store(writes, Ordering::SeqCst);
    }

    /// Delete the document right before each of the next `gets` reads.
    pub fn delete_before_get(&self, gets: usize) {
        self.deleting_gets.store(gets, Ordering::SeqCst);
    }

    /// Fail the next call of `op` with `err`.
    pub fn fail_next(&self, op: Op, err: StoreError) {
        self.failures.lock().unwrap().push((op, err));
    }

    /// Reject `id` in every bulk write with `err`.
    pub fn reject(&self, id: &str, err: StoreError) {
        self.item_errors.lock().unwrap().insert(id.to_string(), err);
    }

    /// Seed a document directly, bypassing counters and scripts.
    pub async fn seed(&self, doc: Document) -> Document {
        let current = self.inner.get(&doc.id).await.ok().and_then(|current| current.rev);
        let doc = Document { rev: current, ..doc };
        let rev = self.inner.insert(&doc).await.unwrap();
        Document {
            rev: Some(rev),
            ..doc
        }
    }

    pub async fn stored(&self, id: &str) -> Option<Document> {
        self.inner.get(id).await.ok()
    }

    fn enter(&self, op: Op) -> Result<(), StoreError> {
        self.calls.counter(op).fetch_add(1, Ordering::SeqCst);
        let mut failures = self.failures.lock().unwrap();
        match failures.iter().position(|(failing, _)| *failing == op) {
            Some(index) => Err(failures.remove(index).1),
            None => Ok(()),
        }
    }

    fn take(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }

    async fn concurrent_update(&self, id: &str) {
        let rev = self.inner.get(id).await.ok().and_then(|doc| doc.rev);
        let doc = Document {
            rev,
            ..Document::new(id).set("concurrent", json!(true))
        };
        self.inner.insert(&doc).await.unwrap();
    }
}

#[async_trait]
impl DocumentStore for RecordingStore {
    fn database(&self) -> Option<&str> {
        self.inner.database()
    }

    async fn get(&self, id: &str) -> Result<Document, StoreError> {
        self.enter(Op::Get)?;
        if Self::take(&self.deleting_gets) {
            if let Ok(Document { rev: Some(rev), .. }) = self.inner.get(id).await {
                self.inner.remove(id, &rev).await.unwrap();
            }
        }
        self.inner.get(id).await
    }

    async fn insert(&self, doc: &Document) -> Result<String, StoreError> {
        self.enter(Op::Insert)?;
        if Self::take(&self.interfering_writes) {
            self.concurrent_update(&doc.id).await;
        }
        self.inner.insert(doc).await
    }

    async fn bulk_write(&self, docs: &[Document]) -> Result<Vec<WriteResult>, StoreError> {
        self.enter(Op::BulkWrite)?;
        self.batches
            .lock()
            .unwrap()
            .push(docs.iter().map(|doc| doc.id.clone()).collect());

        if Self::take(&self.interfering_writes) {
            for doc in docs {
                self.concurrent_update(&doc.id).await;
            }
        }

        let item_errors = self.item_errors.lock().unwrap().clone();
        let mut results = Vec::with_capacity(docs.len());
        for doc in docs {
            match item_errors.get(&doc.id) {
                Some(err) => results.push(Err(err.clone())),
                None => results.push(self.inner.insert(doc).await),
            }
        }
        Ok(results)
    }

    async fn fetch(&self, ids: &[String]) -> Result<Vec<FetchRow>, StoreError> {
        self.enter(Op::Fetch)?;
        self.inner.fetch(ids).await
    }

    async fn fetch_revisions(&self, ids: &[String]) -> Result<Vec<Option<String>>, StoreError> {
        self.enter(Op::FetchRevisions)?;
        self.inner.fetch_revisions(ids).await
    }
}

/// Retries without sleeping between attempts.
pub fn retries(count: u32) -> RetryPolicy {
    RetryPolicy::immediate(count)
}

pub fn forbidden(reason: &str) -> StoreError {
    StoreError::new(couchforce::ErrorKind::Forbidden, reason)
}

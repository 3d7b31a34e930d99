use super::options::BulkInsertOptions;
use super::retry::{Attempt, Retrier, RetryRound, Round};
use super::{ErrorMap, fail_all, settle};
use crate::connection::StoreAddress;
use crate::core::{BulkOperation, Document, ForceError, Result, StoreError};
use crate::interface::DocumentStore;
use async_trait::async_trait;
use log::debug;

struct BulkInsertCall<'s> {
    store: &'s dyn DocumentStore,
    /// Working copies in input order; they gain revisions as writes succeed.
    docs: Vec<Document>,
    /// Indexes into `docs` still waiting for a successful write.
    pending: Vec<usize>,
    errors: ErrorMap,
}

impl<'s> BulkInsertCall<'s> {
    fn new(store: &'s dyn DocumentStore, docs: Vec<Document>) -> Self {
        Self {
            store,
            pending: (0..docs.len()).collect(),
            docs,
            errors: ErrorMap::new(),
        }
    }

    /// Refresh revisions of pending documents whose revision was cleared by a
    /// conflict.
    async fn reconcile(&mut self) -> std::result::Result<(), ForceError> {
        let stale: Vec<usize> = self
            .pending
            .iter()
            .copied()
            .filter(|&index| self.docs[index].rev.is_none())
            .collect();
        if stale.is_empty() {
            return Ok(());
        }

        let ids: Vec<String> = stale.iter().map(|&index| self.docs[index].id.clone()).collect();
        debug!("bulk insert: fetching revisions of {} conflicted documents", ids.len());
        let revs = self.store.fetch_revisions(&ids).await?;
        if revs.len() != ids.len() {
            return Err(StoreError::bad_response(format!(
                "expected {} revision rows, got {}",
                ids.len(),
                revs.len()
            ))
            .into());
        }

        for (index, rev) in stale.into_iter().zip(revs) {
            self.docs[index].rev = rev;
        }
        Ok(())
    }

    fn finish(self, outcome: Result<()>) -> Result<Vec<Document>> {
        let outstanding = self.pending.iter().map(|&index| self.docs[index].id.as_str());
        settle(BulkOperation::Insert, self.errors, outstanding, outcome)?;
        Ok(self.docs)
    }
}

#[async_trait]
impl<'s> RetryRound for BulkInsertCall<'s> {
    type Output = ();

    fn name(&self) -> &'static str {
        "bulk insert"
    }

    async fn round(&mut self, attempt: Attempt) -> Round<()> {
        let batch: Vec<Document> = self
            .pending
            .iter()
            .map(|&index| self.docs[index].clone())
            .collect();

        let results = match self.store.bulk_write(&batch).await {
            Ok(results) if results.len() == batch.len() => results,
            Ok(results) => {
                return Round::Terminal(
                    StoreError::bad_response(format!(
                        "expected {} bulk results, got {}",
                        batch.len(),
                        results.len()
                    ))
                    .into(),
                );
            }
            Err(err) => return Round::Terminal(err.into()),
        };

        // Last to first, so an id submitted twice keeps the error of its
        // earliest copy
        let submitted = std::mem::take(&mut self.pending);
        let mut conflicted = Vec::new();
        for (index, result) in submitted.into_iter().zip(results).rev() {
            let doc = &mut self.docs[index];
            match result {
                Ok(rev) => {
                    self.errors.remove(&doc.id);
                    doc.rev = Some(rev);
                }
                Err(err) if err.is_conflict() => {
                    self.errors.insert(doc.id.clone(), err.clone().into());
                    doc.rev = None;
                    conflicted.push((index, err));
                }
                Err(err) => {
                    self.errors.insert(doc.id.clone(), err.into());
                }
            }
        }
        for (index, err) in conflicted.into_iter().rev() {
            self.errors
                .entry(self.docs[index].id.clone())
                .or_insert_with(|| err.into());
            self.pending.push(index);
        }

        debug!(
            "bulk insert: round {} settled {} documents, {} conflicted",
            attempt.number,
            batch.len() - self.pending.len(),
            self.pending.len()
        );

        if self.pending.is_empty() {
            return Round::Success(());
        }
        if !attempt.is_last() {
            if let Err(err) = self.reconcile().await {
                return Round::Terminal(err);
            }
        }
        Round::Retryable(ForceError::Unresolved(self.pending.len()))
    }
}

/// Write a batch of documents regardless of their current revisions.
///
/// Each round submits every pending document in one bulk call. Conflicted
/// documents get their current revision re-fetched and are submitted again;
/// any other per-document failure is final for that document.
///
/// On success the documents come back in input order with their new
/// revisions. Otherwise the error is `ForceError::Bulk`, mapping every failed
/// id to its last error.
pub async fn bulk_insert(
    address: impl Into<StoreAddress>,
    docs: &[Document],
    options: BulkInsertOptions,
) -> Result<Vec<Document>> {
    if docs.is_empty() {
        return Ok(Vec::new());
    }

    let store = match address.into().resolve(&options.store) {
        Ok(store) => store,
        Err(err) => {
            let ids = docs.iter().map(|doc| doc.id.as_str());
            return Err(fail_all(BulkOperation::Insert, ids, err));
        }
    };

    let mut call = BulkInsertCall::new(store.as_ref(), docs.to_vec());
    let outcome = Retrier::new(options.retries.policy()).run(&mut call).await;
    call.finish(outcome)
}

use super::options::BulkPatchOptions;
use super::patcher::Patcher;
use super::retry::{Attempt, Retrier, RetryRound, Round};
use super::{ErrorMap, fail_all, settle};
use crate::connection::StoreAddress;
use crate::core::{BulkOperation, Document, ForceError, Patch, Result, StoreError};
use crate::interface::DocumentStore;
use async_trait::async_trait;
use log::debug;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

struct BulkPatchCall<'s> {
    store: &'s dyn DocumentStore,
    patches: Vec<Patch>,
    /// Indexes into `patches` still waiting for a successful write.
    pending: Vec<usize>,
    /// Latest known document per id. Entries are dropped on conflict so the
    /// next round fetches them again.
    bases: HashMap<String, Document>,
    errors: ErrorMap,
    create: bool,
    patcher: Arc<dyn Patcher>,
}

impl<'s> BulkPatchCall<'s> {
    fn id(&self, index: usize) -> &str {
        &self.patches[index].id
    }

    /// Fetch base documents for pending patches that have none cached.
    async fn load_bases(&mut self) -> std::result::Result<(), StoreError> {
        let mut seen = HashSet::new();
        let missing: Vec<String> = self
            .pending
            .iter()
            .map(|&index| &self.patches[index].id)
            .filter(|id| !self.bases.contains_key(*id) && seen.insert(*id))
            .cloned()
            .collect();
        if missing.is_empty() {
            return Ok(());
        }

        debug!("bulk patch: fetching {} base documents", missing.len());
        let rows = self.store.fetch(&missing).await?;

        for row in rows {
            match row.doc {
                Ok(doc) => {
                    self.bases.insert(row.key, doc);
                }
                Err(err) if err.is_not_found() && self.create => {
                    self.bases.insert(row.key.clone(), Document::new(row.key));
                }
                Err(err) => {
                    self.drop_pending(&row.key);
                    self.errors.insert(row.key, err.into());
                }
            }
        }
        Ok(())
    }

    fn drop_pending(&mut self, id: &str) {
        let patches = &self.patches;
        self.pending.retain(|&index| patches[index].id != id);
    }

    fn finish(self, outcome: Result<()>) -> Result<Vec<Document>> {
        let outstanding = self.pending.iter().map(|&index| self.patches[index].id.as_str());
        settle(BulkOperation::Patch, self.errors, outstanding, outcome)?;

        // Output follows the input patches, not the order writes settled in
        self.patches
            .iter()
            .map(|patch| {
                self.bases.get(&patch.id).cloned().ok_or_else(|| {
                    ForceError::from(StoreError::bad_response(format!(
                        "no document resolved for '{}'",
                        patch.id
                    )))
                })
            })
            .collect()
    }
}

#[async_trait]
impl<'s> RetryRound for BulkPatchCall<'s> {
    type Output = ();

    fn name(&self) -> &'static str {
        "bulk patch"
    }

    async fn round(&mut self, attempt: Attempt) -> Round<()> {
        if let Err(err) = self.load_bases().await {
            return Round::Terminal(err.into());
        }

        let mut submitted = Vec::with_capacity(self.pending.len());
        let mut candidates = Vec::with_capacity(self.pending.len());
        for index in std::mem::take(&mut self.pending) {
            let patch = &self.patches[index];
            match self.bases.get(&patch.id) {
                Some(base) => {
                    candidates.push(self.patcher.patch(base, patch));
                    submitted.push(index);
                }
                None => {
                    let err = StoreError::bad_response(format!("store returned no row for '{}'", patch.id));
                    self.errors.insert(patch.id.clone(), err.into());
                }
            }
        }
        self.pending = submitted;

        if candidates.is_empty() {
            return Round::Success(());
        }

        let results = match self.store.bulk_write(&candidates).await {
            Ok(results) if results.len() == candidates.len() => results,
            Ok(results) => {
                return Round::Terminal(
                    StoreError::bad_response(format!(
                        "expected {} bulk results, got {}",
                        candidates.len(),
                        results.len()
                    ))
                    .into(),
                );
            }
            Err(err) => return Round::Terminal(err.into()),
        };

        // Last to first, so an id patched twice keeps the error of its
        // earliest copy
        let submitted = std::mem::take(&mut self.pending);
        let mut conflicted = Vec::new();
        for ((index, mut doc), result) in submitted.into_iter().zip(candidates).zip(results).rev() {
            let id = self.id(index).to_string();
            match result {
                Ok(rev) => {
                    self.errors.remove(&id);
                    doc.rev = Some(rev);
                    self.bases.insert(id, doc);
                }
                Err(err) if err.is_conflict() => {
                    self.errors.insert(id.clone(), err.clone().into());
                    self.bases.remove(&id);
                    conflicted.push((index, err));
                }
                Err(err) => {
                    self.errors.insert(id, err.into());
                }
            }
        }
        // A later success for the same id must not leave a pending copy
        // without its conflict
        for (index, err) in conflicted.into_iter().rev() {
            let id = self.id(index).to_string();
            self.errors.entry(id).or_insert_with(|| err.into());
            self.pending.push(index);
        }

        debug!(
            "bulk patch: round {} left {} conflicted documents",
            attempt.number,
            self.pending.len()
        );

        if self.pending.is_empty() {
            Round::Success(())
        } else {
            Round::Retryable(ForceError::Unresolved(self.pending.len()))
        }
    }
}

/// Read-modify-write a batch of documents.
///
/// Base documents come from `options.docs` (matched by id) or are fetched in
/// one bulk read per round, only for patches without a cached base. Missing
/// documents start out empty when `options.create` is set and fail with
/// `not_found` otherwise. Conflicted documents are re-fetched and patched
/// again in the next round.
///
/// Returns the written documents in the order of `patches`, or
/// `ForceError::Bulk` with the last error of every failed id. Fails before
/// any I/O if a patch carries a `_rev`.
pub async fn bulk_patch(
    address: impl Into<StoreAddress>,
    patches: &[Patch],
    options: BulkPatchOptions,
) -> Result<Vec<Document>> {
    if patches.is_empty() {
        return Ok(Vec::new());
    }
    if let Some(patch) = patches.iter().find(|patch| patch.rev.is_some()) {
        return Err(ForceError::PatchHasRevision(patch.id.clone()));
    }

    let store = match address.into().resolve(&options.store) {
        Ok(store) => store,
        Err(err) => {
            let ids = patches.iter().map(|patch| patch.id.as_str());
            return Err(fail_all(BulkOperation::Patch, ids, err));
        }
    };

    let bases = options
        .docs
        .into_iter()
        .flatten()
        .map(|doc| (doc.id.clone(), doc))
        .collect();

    let mut call = BulkPatchCall {
        store: store.as_ref(),
        patches: patches.to_vec(),
        pending: (0..patches.len()).collect(),
        bases,
        errors: ErrorMap::new(),
        create: options.create,
        patcher: options.patcher,
    };
    let outcome = Retrier::new(options.retries.policy()).run(&mut call).await;
    call.finish(outcome)
}

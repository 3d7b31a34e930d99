use super::options::PatchOptions;
use super::patcher::Patcher;
use super::retry::{Attempt, Retrier, RetryRound, Round};
use crate::connection::StoreAddress;
use crate::core::{Document, ForceError, Patch, Result};
use crate::interface::DocumentStore;
use async_trait::async_trait;
use std::sync::Arc;

struct PatchCall<'s> {
    store: &'s dyn DocumentStore,
    patch: Patch,
    /// Base document for the next round; cleared after a conflict.
    base: Option<Document>,
    create: bool,
    patcher: Arc<dyn Patcher>,
}

impl PatchCall<'_> {
    async fn load_base(&mut self) -> std::result::Result<Document, ForceError> {
        if let Some(base) = self.base.take() {
            return Ok(base);
        }

        match self.store.get(&self.patch.id).await {
            Ok(doc) => Ok(doc),
            Err(err) if err.is_not_found() && self.create => Ok(Document::new(self.patch.id.clone())),
            Err(err) => Err(err.into()),
        }
    }
}

#[async_trait]
impl<'s> RetryRound for PatchCall<'s> {
    type Output = Document;

    fn name(&self) -> &'static str {
        "patch"
    }

    async fn round(&mut self, _attempt: Attempt) -> Round<Document> {
        let base = match self.load_base().await {
            Ok(base) => base,
            Err(err) => return Round::Terminal(err),
        };

        let mut doc = self.patcher.patch(&base, &self.patch);
        match self.store.insert(&doc).await {
            Ok(rev) => {
                doc.rev = Some(rev);
                Round::Success(doc)
            }
            // The base is already consumed, so the next round fetches a fresh one
            Err(err) if err.is_conflict() => Round::Retryable(err.into()),
            Err(err) => Round::Terminal(err.into()),
        }
    }
}

/// Read-modify-write one document.
///
/// The base document is `options.doc` when given, otherwise the current
/// document in the store (or an empty one with the patch id when it is missing
/// and `options.create` is set). `options.patcher` turns base and patch into
/// the document to write. Conflicts re-fetch the base and try again.
///
/// Fails before any I/O if the patch carries a `_rev`.
pub async fn patch(
    address: impl Into<StoreAddress>,
    patch: &Patch,
    options: PatchOptions,
) -> Result<Document> {
    if patch.rev.is_some() {
        return Err(ForceError::PatchHasRevision(patch.id.clone()));
    }

    let store = address.into().resolve(&options.store)?;

    let mut call = PatchCall {
        store: store.as_ref(),
        patch: patch.clone(),
        base: options.doc,
        create: options.create,
        patcher: options.patcher,
    };
    Retrier::new(options.retries.policy()).run(&mut call).await
}

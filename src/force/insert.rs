use super::options::InsertOptions;
use super::retry::{Attempt, Retrier, RetryRound, Round};
use crate::connection::StoreAddress;
use crate::core::{Document, Result};
use crate::interface::DocumentStore;
use async_trait::async_trait;
use log::debug;

struct InsertCall<'s> {
    store: &'s dyn DocumentStore,
    doc: Document,
}

#[async_trait]
impl<'s> RetryRound for InsertCall<'s> {
    type Output = Document;

    fn name(&self) -> &'static str {
        "insert"
    }

    async fn round(&mut self, attempt: Attempt) -> Round<Document> {
        let conflict = match self.store.insert(&self.doc).await {
            Ok(rev) => {
                self.doc.rev = Some(rev);
                return Round::Success(self.doc.clone());
            }
            Err(err) if err.is_conflict() => err,
            Err(err) => return Round::Terminal(err.into()),
        };

        if attempt.is_last() {
            return Round::Retryable(conflict.into());
        }

        match self.store.get(&self.doc.id).await {
            Ok(current) => self.doc.rev = current.rev,
            // Deleted in the meantime: write it as a new document
            Err(err) if err.is_not_found() => self.doc.rev = None,
            Err(err) => return Round::Terminal(err.into()),
        }

        debug!(
            "insert: '{}' conflicted, retrying with rev {:?}",
            self.doc.id, self.doc.rev
        );
        Round::Retryable(conflict.into())
    }
}

/// Write `doc` regardless of its current revision in the store.
///
/// On conflict the current revision is fetched and the write is retried.
/// Any other store error is returned as-is. The caller's document is not
/// modified; the returned copy carries the new revision.
pub async fn insert(
    address: impl Into<StoreAddress>,
    doc: &Document,
    options: InsertOptions,
) -> Result<Document> {
    let store = address.into().resolve(&options.store)?;

    let mut call = InsertCall {
        store: store.as_ref(),
        doc: doc.clone(),
    };
    Retrier::new(options.retries.policy()).run(&mut call).await
}

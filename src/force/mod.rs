//! Force writes: insert and patch documents without knowing their current
//! revision.
//!
//! Every operation runs as rounds under a [`Retrier`]. A round performs the
//! store I/O, classifies the outcome per document and keeps only conflicted
//! documents for the next round. Bulk operations collect per-document
//! failures and report them together as [`ForceError::Bulk`].

mod bulk_insert;
mod bulk_patch;
mod insert;
mod options;
mod patch;
pub mod patcher;
pub mod retry;

pub use bulk_insert::bulk_insert;
pub use bulk_patch::bulk_patch;
pub use insert::insert;
pub use options::{BulkInsertOptions, BulkPatchOptions, InsertOptions, PatchOptions};
pub use patch::patch;
pub use patcher::{OverlayPatcher, Patcher};
pub use retry::{Attempt, Retrier, Retries, RetryPolicy, RetryRound, Round};

use crate::core::{BulkOperation, ForceError, Result};
use std::collections::BTreeMap;

/// Last error seen per document id.
pub(crate) type ErrorMap = BTreeMap<String, ForceError>;

/// Close out a bulk call.
///
/// An error that ended the retry loop is attributed to every outstanding id
/// that has no error of its own. Fails with a composite error if any id
/// failed.
pub(crate) fn settle<'a>(
    operation: BulkOperation,
    mut errors: ErrorMap,
    outstanding: impl IntoIterator<Item = &'a str>,
    outcome: Result<()>,
) -> Result<()> {
    if let Err(err) = outcome {
        for id in outstanding {
            errors.entry(id.to_string()).or_insert_with(|| err.clone());
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ForceError::Bulk { operation, errors })
    }
}

/// Composite error attributing `err` to every id.
pub(crate) fn fail_all<'a>(
    operation: BulkOperation,
    ids: impl IntoIterator<Item = &'a str>,
    err: ForceError,
) -> ForceError {
    let errors = ids
        .into_iter()
        .map(|id| (id.to_string(), err.clone()))
        .collect();
    ForceError::Bulk { operation, errors }
}

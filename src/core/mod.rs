pub mod error;
pub mod types;

pub use error::{BulkOperation, ErrorKind, ForceError, Result, StoreError};
pub use types::{Document, Fields, Patch};

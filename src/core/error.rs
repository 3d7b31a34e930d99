use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Failure category reported by a document store.
///
/// Mirrors the `error` codes CouchDB puts in its error bodies.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The submitted revision does not match the current one.
    Conflict,
    /// The document (or database) does not exist.
    NotFound,
    Forbidden,
    Unauthorized,
    /// The request never produced a store response.
    Transport,
    /// The store answered with something we could not interpret.
    BadResponse,
    /// Any other store-specific code.
    Other(String),
}

impl ErrorKind {
    pub fn from_code(code: &str) -> Self {
        match code {
            "conflict" => Self::Conflict,
            "not_found" => Self::NotFound,
            "forbidden" => Self::Forbidden,
            "unauthorized" => Self::Unauthorized,
            "transport" => Self::Transport,
            "bad_response" => Self::BadResponse,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            Self::Conflict => "conflict",
            Self::NotFound => "not_found",
            Self::Forbidden => "forbidden",
            Self::Unauthorized => "unauthorized",
            Self::Transport => "transport",
            Self::BadResponse => "bad_response",
            Self::Other(code) => code,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A single failed store call or a failed item inside a bulk call.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{}", reason_or_unknown(.reason))]
pub struct StoreError {
    pub kind: ErrorKind,
    pub reason: String,
}

impl StoreError {
    pub fn new(kind: ErrorKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }

    /// Builds an error from the `error`/`reason` pair of a CouchDB body.
    pub fn from_parts(code: Option<&str>, reason: Option<&str>) -> Self {
        Self::new(
            ErrorKind::from_code(code.unwrap_or("unknown")),
            reason.unwrap_or_default(),
        )
    }

    pub fn conflict() -> Self {
        Self::new(ErrorKind::Conflict, "Document update conflict.")
    }

    pub fn not_found() -> Self {
        Self::new(ErrorKind::NotFound, "missing")
    }

    pub fn transport(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transport, reason)
    }

    pub fn bad_response(reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadResponse, reason)
    }

    pub fn is_conflict(&self) -> bool {
        self.kind == ErrorKind::Conflict
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }
}

fn reason_or_unknown(reason: &str) -> &str {
    if reason.is_empty() {
        "Unknown error"
    } else {
        reason
    }
}

/// Which bulk operation produced a composite error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkOperation {
    Insert,
    Patch,
}

impl fmt::Display for BulkOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Insert => "insert",
            Self::Patch => "patch",
        };
        write!(f, "{label}")
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ForceError {
    #[error("No database is selected, did you pass a database in the address?")]
    NoDatabase,

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("The patch object for '{0}' must not contain _rev")]
    PatchHasRevision(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("There are still {0} documents waiting to be written")]
    Unresolved(usize),

    #[error("Failed to bulk {operation} {} documents", .errors.len())]
    Bulk {
        operation: BulkOperation,
        errors: BTreeMap<String, ForceError>,
    },
}

impl ForceError {
    /// Store error kind, if this error came from the store.
    pub fn kind(&self) -> Option<&ErrorKind> {
        match self {
            Self::Store(err) => Some(&err.kind),
            _ => None,
        }
    }

    /// Per-document errors of a composite bulk failure.
    pub fn errors(&self) -> Option<&BTreeMap<String, ForceError>> {
        match self {
            Self::Bulk { errors, .. } => Some(errors),
            _ => None,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Store(err) if err.is_conflict())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Store(err) if err.is_not_found())
    }
}

pub type Result<T> = std::result::Result<T, ForceError>;

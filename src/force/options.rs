use super::patcher::{OverlayPatcher, Patcher};
use super::retry::Retries;
use crate::connection::config::StoreConfig;
use crate::core::Document;
use std::sync::Arc;

/// Options for `insert`.
#[derive(Clone, Default)]
pub struct InsertOptions {
    pub retries: Retries,
    /// Used only when the address is a URL
    pub store: StoreConfig,
}

impl InsertOptions {
    pub fn retries(mut self, retries: impl Into<Retries>) -> Self {
        self.retries = retries.into();
        self
    }

    pub fn store_config(mut self, config: StoreConfig) -> Self {
        self.store = config;
        self
    }
}

/// Options for `bulk_insert`.
#[derive(Clone, Default)]
pub struct BulkInsertOptions {
    pub retries: Retries,
    pub store: StoreConfig,
}

impl BulkInsertOptions {
    pub fn retries(mut self, retries: impl Into<Retries>) -> Self {
        self.retries = retries.into();
        self
    }

    pub fn store_config(mut self, config: StoreConfig) -> Self {
        self.store = config;
        self
    }
}

/// Options for `patch`.
#[derive(Clone)]
pub struct PatchOptions {
    /// Previously fetched base document; skips the first fetch.
    pub doc: Option<Document>,
    /// Create the document when it does not exist yet.
    pub create: bool,
    pub patcher: Arc<dyn Patcher>,
    pub retries: Retries,
    pub store: StoreConfig,
}

impl Default for PatchOptions {
    fn default() -> Self {
        Self {
            doc: None,
            create: true,
            patcher: Arc::new(OverlayPatcher),
            retries: Retries::default(),
            store: StoreConfig::default(),
        }
    }
}

impl PatchOptions {
    pub fn doc(mut self, doc: Document) -> Self {
        self.doc = Some(doc);
        self
    }

    pub fn create(mut self, create: bool) -> Self {
        self.create = create;
        self
    }

    pub fn patcher(mut self, patcher: impl Patcher + 'static) -> Self {
        self.patcher = Arc::new(patcher);
        self
    }

    pub fn retries(mut self, retries: impl Into<Retries>) -> Self {
        self.retries = retries.into();
        self
    }

    pub fn store_config(mut self, config: StoreConfig) -> Self {
        self.store = config;
        self
    }
}

/// Options for `bulk_patch`.
#[derive(Clone)]
pub struct BulkPatchOptions {
    /// Previously fetched base documents, matched to patches by id.
    /// `None` entries are ignored.
    pub docs: Vec<Option<Document>>,
    pub create: bool,
    pub patcher: Arc<dyn Patcher>,
    pub retries: Retries,
    pub store: StoreConfig,
}

impl Default for BulkPatchOptions {
    fn default() -> Self {
        Self {
            docs: Vec::new(),
            create: true,
            patcher: Arc::new(OverlayPatcher),
            retries: Retries::default(),
            store: StoreConfig::default(),
        }
    }
}

impl BulkPatchOptions {
    pub fn docs(mut self, docs: impl IntoIterator<Item = Option<Document>>) -> Self {
        self.docs = docs.into_iter().collect();
        self
    }

    pub fn create(mut self, create: bool) -> Self {
        self.create = create;
        self
    }

    pub fn patcher(mut self, patcher: impl Patcher + 'static) -> Self {
        self.patcher = Arc::new(patcher);
        self
    }

    pub fn retries(mut self, retries: impl Into<Retries>) -> Self {
        self.retries = retries.into();
        self
    }

    pub fn store_config(mut self, config: StoreConfig) -> Self {
        self.store = config;
        self
    }
}

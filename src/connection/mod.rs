pub mod config;

use crate::core::{ForceError, Result};
use crate::interface::DocumentStore;
use crate::storage::CouchStore;
use config::{CouchAddress, StoreConfig};
use std::fmt;
use std::sync::Arc;

/// Where a force operation should write: a CouchDB address, or a store
/// handle that is already built.
#[derive(Clone)]
pub enum StoreAddress {
    Url(String),
    Handle(Arc<dyn DocumentStore>),
}

impl StoreAddress {
    /// Turn the address into a store handle bound to exactly one database.
    ///
    /// Runs before any I/O: an address without a database fails here
    /// instead of inside a retry loop.
    pub fn resolve(&self, config: &StoreConfig) -> Result<Arc<dyn DocumentStore>> {
        let store: Arc<dyn DocumentStore> = match self {
            Self::Url(url) => {
                let address = CouchAddress::parse(url).map_err(ForceError::InvalidAddress)?;
                Arc::new(CouchStore::connect(address, config)?)
            }
            Self::Handle(store) => Arc::clone(store),
        };

        match store.database() {
            Some(database) if !database.is_empty() => Ok(store),
            _ => Err(ForceError::NoDatabase),
        }
    }
}

impl fmt::Debug for StoreAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url(url) => match CouchAddress::parse(url) {
                Ok(address) => f.debug_tuple("Url").field(&address.to_url()).finish(),
                Err(_) => f.debug_tuple("Url").field(url).finish(),
            },
            Self::Handle(store) => f
                .debug_tuple("Handle")
                .field(&store.database().unwrap_or("<no database>"))
                .finish(),
        }
    }
}

impl From<&str> for StoreAddress {
    fn from(url: &str) -> Self {
        Self::Url(url.to_string())
    }
}

impl From<String> for StoreAddress {
    fn from(url: String) -> Self {
        Self::Url(url)
    }
}

impl From<Arc<dyn DocumentStore>> for StoreAddress {
    fn from(store: Arc<dyn DocumentStore>) -> Self {
        Self::Handle(store)
    }
}

impl<S: DocumentStore + 'static> From<Arc<S>> for StoreAddress {
    fn from(store: Arc<S>) -> Self {
        Self::Handle(store)
    }
}

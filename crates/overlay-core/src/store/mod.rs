//! Remote field store boundary
//!
//! The reconciliation engine only talks to the store through [`FieldStore`].
//! [`MemoryStore`] backs tests and offline use; `HttpFieldStore` (feature
//! `http`) talks to the overlay API service.

use crate::error::StoreError;
use crate::field::{FieldAttributes, FieldRecord, RemoteId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

#[cfg(feature = "http")]
pub mod http;
pub mod memory;

#[cfg(feature = "http")]
pub use http::HttpFieldStore;
pub use memory::{MemoryStore, StoreCall};

/// Identifies the document (or session) whose fields are being synchronised
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-document field listing plus per-field create/update/delete
#[async_trait]
pub trait FieldStore: Send + Sync {
    async fn list(&self, document: &DocumentId) -> Result<Vec<FieldRecord>, StoreError>;

    /// Persist a new field; the store assigns its id
    async fn create(
        &self,
        document: &DocumentId,
        attributes: &FieldAttributes,
    ) -> Result<RemoteId, StoreError>;

    async fn update(
        &self,
        document: &DocumentId,
        id: &RemoteId,
        attributes: &FieldAttributes,
    ) -> Result<(), StoreError>;

    async fn delete(&self, document: &DocumentId, id: &RemoteId) -> Result<(), StoreError>;
}

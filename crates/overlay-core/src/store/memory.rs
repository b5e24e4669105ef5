//! In-process field store with call recording and failure injection
//!
//! Every operation yields to the runtime once before touching state so
//! concurrent saves interleave the way they would against a real service.

use super::{DocumentId, FieldStore};
use crate::error::StoreError;
use crate::field::{FieldAttributes, FieldRecord, RemoteId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// One request as seen by the store
#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    List,
    Create(FieldAttributes),
    Update(RemoteId),
    Delete(RemoteId),
}

type FailureRule = Box<dyn Fn(&StoreCall) -> bool + Send + Sync>;

#[derive(Default)]
struct Inner {
    next_id: u64,
    documents: HashMap<DocumentId, Vec<FieldRecord>>,
    calls: Vec<StoreCall>,
    failures: Vec<FailureRule>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a record directly, bypassing call recording
    pub fn seed(&self, document: &DocumentId, attributes: FieldAttributes) -> RemoteId {
        let mut inner = self.inner();
        let id = inner.allocate_id();
        inner
            .documents
            .entry(document.clone())
            .or_default()
            .push(FieldRecord {
                id: id.clone(),
                attributes,
            });
        id
    }

    /// Current records of a document, in creation order
    pub fn records(&self, document: &DocumentId) -> Vec<FieldRecord> {
        self.inner()
            .documents
            .get(document)
            .cloned()
            .unwrap_or_default()
    }

    /// Every call issued so far, including failed ones
    pub fn calls(&self) -> Vec<StoreCall> {
        self.inner().calls.clone()
    }

    /// Return and forget the recorded calls
    pub fn take_calls(&self) -> Vec<StoreCall> {
        std::mem::take(&mut self.inner().calls)
    }

    /// Make every call matching `rule` fail with a network error until cleared
    pub fn fail_when<F>(&self, rule: F)
    where
        F: Fn(&StoreCall) -> bool + Send + Sync + 'static,
    {
        self.inner().failures.push(Box::new(rule));
    }

    pub fn clear_failures(&self) {
        self.inner().failures.clear();
    }
}

impl Inner {
    fn allocate_id(&mut self) -> RemoteId {
        self.next_id += 1;
        RemoteId::new(self.next_id.to_string())
    }

    /// Record the call, then report whether an injected failure applies
    fn record(&mut self, call: StoreCall) -> Result<(), StoreError> {
        let failing = self.failures.iter().any(|rule| rule(&call));
        self.calls.push(call);
        if failing {
            Err(StoreError::Network("injected failure".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl FieldStore for MemoryStore {
    async fn list(&self, document: &DocumentId) -> Result<Vec<FieldRecord>, StoreError> {
        tokio::task::yield_now().await;
        let mut inner = self.inner();
        inner.record(StoreCall::List)?;
        Ok(inner.documents.get(document).cloned().unwrap_or_default())
    }

    async fn create(
        &self,
        document: &DocumentId,
        attributes: &FieldAttributes,
    ) -> Result<RemoteId, StoreError> {
        tokio::task::yield_now().await;
        let mut inner = self.inner();
        inner.record(StoreCall::Create(attributes.clone()))?;
        let id = inner.allocate_id();
        inner
            .documents
            .entry(document.clone())
            .or_default()
            .push(FieldRecord {
                id: id.clone(),
                attributes: attributes.clone(),
            });
        Ok(id)
    }

    async fn update(
        &self,
        document: &DocumentId,
        id: &RemoteId,
        attributes: &FieldAttributes,
    ) -> Result<(), StoreError> {
        tokio::task::yield_now().await;
        let mut inner = self.inner();
        inner.record(StoreCall::Update(id.clone()))?;
        let record = inner
            .documents
            .get_mut(document)
            .and_then(|records| records.iter_mut().find(|r| &r.id == id))
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        record.attributes = attributes.clone();
        Ok(())
    }

    async fn delete(&self, document: &DocumentId, id: &RemoteId) -> Result<(), StoreError> {
        tokio::task::yield_now().await;
        let mut inner = self.inner();
        inner.record(StoreCall::Delete(id.clone()))?;
        let records = inner
            .documents
            .get_mut(document)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        let before = records.len();
        records.retain(|r| &r.id != id);
        if records.len() == before {
            return Err(StoreError::NotFound(id.clone()));
        }
        Ok(())
    }
}

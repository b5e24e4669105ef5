//! Reconciliation of the field registry with a remote field store
//!
//! A save is an explicit diff-then-batch step:
//!
//! 1. Take the snapshot lock (saves are serialised) and fetch the snapshot if
//!    none is cached.
//! 2. Copy the registry's fields at that instant and partition them into
//!    creates (local ids), updates (remote ids whose attributes differ from
//!    the snapshot) and deletes (snapshot ids no longer in the registry).
//! 3. Issue every operation concurrently. A create migrates its field's id
//!    as soon as the store answers.
//! 4. Fold each acknowledged operation into the snapshot. Failed operations
//!    leave their snapshot entry alone, so the next save produces the same
//!    operation again and nothing that already succeeded.

use crate::error::StoreError;
use crate::field::{Field, FieldAttributes, FieldId, LocalId, RemoteId};
use crate::registry::FieldRegistry;
use crate::store::{DocumentId, FieldStore};
use futures::future::join_all;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Registry shared between the editing surface and in-flight saves
pub type SharedRegistry = Arc<Mutex<FieldRegistry>>;

/// Last attributes acknowledged by the store, keyed by remote id
pub type Snapshot = BTreeMap<RemoteId, FieldAttributes>;

pub fn shared(registry: FieldRegistry) -> SharedRegistry {
    Arc::new(Mutex::new(registry))
}

fn lock(registry: &SharedRegistry) -> MutexGuard<'_, FieldRegistry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOp {
    Create,
    Update,
    Delete,
}

impl fmt::Display for SyncOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SyncOp::Create => "create",
            SyncOp::Update => "update",
            SyncOp::Delete => "delete",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncFailure {
    pub field: FieldId,
    pub op: SyncOp,
    pub error: StoreError,
}

/// Outcome of one save pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SaveReport {
    /// Local ids and the remote ids they migrated to
    pub created: Vec<(LocalId, RemoteId)>,
    pub updated: Vec<RemoteId>,
    pub deleted: Vec<RemoteId>,
    pub unchanged: Vec<RemoteId>,
    pub failed: Vec<SyncFailure>,
}

impl SaveReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Ids to hand to [`Reconciler::save_only`] for a targeted retry
    pub fn failed_ids(&self) -> Vec<FieldId> {
        self.failed.iter().map(|f| f.field.clone()).collect()
    }

    pub fn operation_count(&self) -> usize {
        self.created.len() + self.updated.len() + self.deleted.len() + self.failed.len()
    }
}

enum Planned {
    Create(LocalId, FieldAttributes),
    Update(RemoteId, FieldAttributes),
    Delete(RemoteId),
}

enum Outcome {
    Created {
        local: LocalId,
        remote: RemoteId,
        attributes: FieldAttributes,
    },
    Updated(RemoteId, FieldAttributes),
    Deleted(RemoteId),
    Failed(SyncFailure),
}

pub struct Reconciler<S: FieldStore + ?Sized> {
    store: Arc<S>,
    document: DocumentId,
    snapshot: tokio::sync::Mutex<Option<Snapshot>>,
}

impl<S: FieldStore + ?Sized> Reconciler<S> {
    pub fn new(store: Arc<S>, document: DocumentId) -> Self {
        Self {
            store,
            document,
            snapshot: tokio::sync::Mutex::new(None),
        }
    }

    pub fn document(&self) -> &DocumentId {
        &self.document
    }

    /// Copy of the current snapshot, `None` before the first load or save
    pub async fn snapshot(&self) -> Option<Snapshot> {
        self.snapshot.lock().await.clone()
    }

    /// Replace the registry content with the store's listing and reset the snapshot.
    ///
    /// Records on pages the document does not have are skipped and left out
    /// of the snapshot, so a later save never deletes them. Returns the
    /// number of fields loaded.
    pub async fn load(&self, registry: &SharedRegistry) -> Result<usize, StoreError> {
        let mut snapshot = self.snapshot.lock().await;
        let records = self.store.list(&self.document).await?;

        let loaded: BTreeSet<RemoteId> = lock(registry)
            .load_records(records.iter().cloned())
            .into_iter()
            .collect();
        let fresh: Snapshot = records
            .into_iter()
            .filter(|r| loaded.contains(&r.id))
            .map(|r| (r.id, r.attributes))
            .collect();

        let count = fresh.len();
        info!(document = %self.document, fields = count, "Fields loaded");
        *snapshot = Some(fresh);
        Ok(count)
    }

    /// Synchronise every field of the registry
    pub async fn save(&self, registry: &SharedRegistry) -> Result<SaveReport, StoreError> {
        self.run(registry, None).await
    }

    /// Synchronise only `ids`, typically the `failed_ids` of an earlier report.
    ///
    /// An id that is in the snapshot but no longer in the registry is deleted.
    pub async fn save_only(
        &self,
        registry: &SharedRegistry,
        ids: &[FieldId],
    ) -> Result<SaveReport, StoreError> {
        let filter: BTreeSet<FieldId> = ids.iter().cloned().collect();
        self.run(registry, Some(&filter)).await
    }

    async fn run(
        &self,
        registry: &SharedRegistry,
        only: Option<&BTreeSet<FieldId>>,
    ) -> Result<SaveReport, StoreError> {
        let mut guard = self.snapshot.lock().await;
        if guard.is_none() {
            let records = self.store.list(&self.document).await?;
            let document = lock(registry).document().clone();
            *guard = Some(
                records
                    .into_iter()
                    .filter(|r| document.contains_page(r.attributes.page))
                    .map(|r| (r.id, r.attributes))
                    .collect(),
            );
        }
        let snapshot = guard.get_or_insert_with(Snapshot::new);

        // Point-in-time copy; edits made while the save is in flight go to the next one
        let fields = lock(registry).fields().to_vec();
        let (plan, unchanged) = diff(&fields, snapshot, only);

        let futures = plan.into_iter().map(|op| self.execute(op, registry));
        let outcomes = join_all(futures).await;

        let mut report = SaveReport {
            unchanged,
            ..SaveReport::default()
        };
        for outcome in outcomes {
            match outcome {
                Outcome::Created {
                    local,
                    remote,
                    attributes,
                } => {
                    snapshot.insert(remote.clone(), attributes);
                    report.created.push((local, remote));
                }
                Outcome::Updated(id, attributes) => {
                    snapshot.insert(id.clone(), attributes);
                    report.updated.push(id);
                }
                Outcome::Deleted(id) => {
                    snapshot.remove(&id);
                    report.deleted.push(id);
                }
                Outcome::Failed(failure) => report.failed.push(failure),
            }
        }

        if report.is_success() {
            info!(
                document = %self.document,
                created = report.created.len(),
                updated = report.updated.len(),
                deleted = report.deleted.len(),
                unchanged = report.unchanged.len(),
                "Fields saved"
            );
        } else {
            warn!(
                document = %self.document,
                failed = report.failed.len(),
                succeeded = report.operation_count() - report.failed.len(),
                "Save finished with failures"
            );
        }
        Ok(report)
    }

    async fn execute(&self, op: Planned, registry: &SharedRegistry) -> Outcome {
        match op {
            Planned::Create(local, attributes) => {
                match self.store.create(&self.document, &attributes).await {
                    Ok(remote) => {
                        let migrated = lock(registry).migrate_id(local, remote.clone());
                        if migrated {
                            debug!(%local, %remote, "Field created");
                        } else {
                            debug!(%local, %remote, "Field created after local removal");
                        }
                        Outcome::Created {
                            local,
                            remote,
                            attributes,
                        }
                    }
                    Err(error) => failed(FieldId::Local(local), SyncOp::Create, error),
                }
            }
            Planned::Update(id, attributes) => {
                match self.store.update(&self.document, &id, &attributes).await {
                    Ok(()) => {
                        debug!(%id, "Field updated");
                        Outcome::Updated(id, attributes)
                    }
                    Err(error) => failed(FieldId::Remote(id), SyncOp::Update, error),
                }
            }
            Planned::Delete(id) => match self.store.delete(&self.document, &id).await {
                Ok(()) => {
                    debug!(%id, "Field deleted");
                    Outcome::Deleted(id)
                }
                Err(StoreError::NotFound(_)) => {
                    debug!(%id, "Field already absent from store");
                    Outcome::Deleted(id)
                }
                Err(error) => failed(FieldId::Remote(id), SyncOp::Delete, error),
            },
        }
    }
}

fn failed(field: FieldId, op: SyncOp, error: StoreError) -> Outcome {
    warn!(%field, %op, %error, "Field sync failed");
    Outcome::Failed(SyncFailure { field, op, error })
}

/// Partition `fields` against `snapshot`. Returns the operations to issue and
/// the remote ids that need none.
fn diff(
    fields: &[Field],
    snapshot: &Snapshot,
    only: Option<&BTreeSet<FieldId>>,
) -> (Vec<Planned>, Vec<RemoteId>) {
    let selected = |id: &FieldId| only.map_or(true, |ids| ids.contains(id));
    let mut plan = Vec::new();
    let mut unchanged = Vec::new();
    let mut present = BTreeSet::new();

    for field in fields {
        if let FieldId::Remote(id) = &field.id {
            present.insert(id.clone());
        }
        if !selected(&field.id) {
            continue;
        }
        let attributes = field.attributes();
        match &field.id {
            FieldId::Local(local) => plan.push(Planned::Create(*local, attributes)),
            FieldId::Remote(id) => match snapshot.get(id) {
                Some(known) if *known == attributes => unchanged.push(id.clone()),
                _ => plan.push(Planned::Update(id.clone(), attributes)),
            },
        }
    }

    for id in snapshot.keys() {
        if !present.contains(id) && selected(&FieldId::Remote(id.clone())) {
            plan.push(Planned::Delete(id.clone()));
        }
    }

    (plan, unchanged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::{Point, Size};
    use crate::document::DocumentRef;
    use crate::field::{FieldType, RecipientId};
    use crate::store::{MemoryStore, StoreCall};
    use pretty_assertions::assert_eq;

    fn doc_id() -> DocumentId {
        DocumentId::new("lease")
    }

    fn new_registry() -> FieldRegistry {
        FieldRegistry::new(DocumentRef::uniform("Lease", 2, Size::letter()))
    }

    fn attrs(x: f64) -> FieldAttributes {
        FieldAttributes {
            field_type: FieldType::Text,
            page: 1,
            position: Point::new(x, 100.0),
            size: Size::new(150.0, 30.0),
            value: None,
            signature_data: None,
            recipient_id: RecipientId::new("r1"),
            label: None,
            required: false,
            options: Vec::new(),
        }
    }

    fn counts(calls: &[StoreCall]) -> (usize, usize, usize) {
        calls.iter().fold((0, 0, 0), |(c, u, d), call| match call {
            StoreCall::Create(_) => (c + 1, u, d),
            StoreCall::Update(_) => (c, u + 1, d),
            StoreCall::Delete(_) => (c, u, d + 1),
            StoreCall::List => (c, u, d),
        })
    }

    /// Store holding B, C and D; registry loaded from it
    async fn loaded() -> (
        Arc<MemoryStore>,
        Reconciler<MemoryStore>,
        SharedRegistry,
        [RemoteId; 3],
    ) {
        let store = Arc::new(MemoryStore::new());
        let b = store.seed(&doc_id(), attrs(10.0));
        let c = store.seed(&doc_id(), attrs(20.0));
        let d = store.seed(&doc_id(), attrs(30.0));
        let reconciler = Reconciler::new(store.clone(), doc_id());
        let registry = shared(new_registry());
        assert_eq!(reconciler.load(&registry).await.unwrap(), 3);
        store.take_calls();
        (store, reconciler, registry, [b, c, d])
    }

    #[tokio::test]
    async fn test_save_issues_minimal_operations() {
        let (store, reconciler, registry, [b, c, d]) = loaded().await;
        let a = {
            let mut reg = lock(&registry);
            let a = reg
                .add(FieldType::Text, 1, Point::new(5.0, 5.0), RecipientId::new("r1"))
                .unwrap();
            reg.move_to(&FieldId::Remote(c.clone()), 2, Point::new(50.0, 60.0))
                .unwrap();
            reg.remove(&FieldId::Remote(d.clone())).unwrap();
            a
        };

        let report = reconciler.save(&registry).await.unwrap();

        assert_eq!(counts(&store.calls()), (1, 1, 1));
        assert!(store.calls().contains(&StoreCall::Update(c.clone())));
        assert!(store.calls().contains(&StoreCall::Delete(d.clone())));
        assert_eq!(report.unchanged, vec![b]);
        assert_eq!(report.updated, vec![c]);
        assert_eq!(report.deleted, vec![d]);
        let FieldId::Local(local) = a.id else {
            panic!("new field should start local");
        };
        assert_eq!(report.created.len(), 1);
        assert_eq!(report.created[0].0, local);
        assert!(report.is_success());
    }

    #[tokio::test]
    async fn test_create_migrates_identity() {
        let (store, reconciler, registry, _) = loaded().await;
        let local = lock(&registry)
            .add(FieldType::Date, 1, Point::new(5.0, 5.0), RecipientId::new("r1"))
            .unwrap()
            .id;

        let report = reconciler.save(&registry).await.unwrap();
        let remote = report.created[0].1.clone();

        let reg = lock(&registry);
        assert!(reg.get(&local).is_none());
        assert!(reg.get(&FieldId::Remote(remote.clone())).is_some());
        assert!(reg.fields().iter().all(|f| !f.id.is_local()));
        drop(reg);

        // A second save references the new id and has nothing to do
        store.take_calls();
        let again = reconciler.save(&registry).await.unwrap();
        assert!(store.calls().is_empty());
        assert!(again.unchanged.contains(&remote));
    }

    #[tokio::test]
    async fn test_partial_failure_retries_only_failed_create() {
        let (store, reconciler, registry, [_, c, _]) = loaded().await;
        let a = {
            let mut reg = lock(&registry);
            reg.move_to(&FieldId::Remote(c.clone()), 1, Point::new(400.0, 400.0))
                .unwrap();
            reg.add(FieldType::Text, 1, Point::ORIGIN, RecipientId::new("r1"))
                .unwrap()
        };
        store.fail_when(|call| matches!(call, StoreCall::Create(_)));

        let first = reconciler.save(&registry).await.unwrap();
        assert_eq!(first.failed_ids(), vec![a.id.clone()]);
        assert_eq!(first.failed[0].op, SyncOp::Create);
        assert_eq!(first.updated, vec![c.clone()]);
        assert!(lock(&registry).get(&a.id).is_some());

        store.clear_failures();
        store.take_calls();
        let second = reconciler.save(&registry).await.unwrap();
        assert_eq!(counts(&store.calls()), (1, 0, 0));
        assert!(second.is_success());
        assert_eq!(store.records(&doc_id()).len(), 4);
    }

    #[tokio::test]
    async fn test_save_only_retries_subset() {
        let (store, reconciler, registry, [b, c, _]) = loaded().await;
        {
            let mut reg = lock(&registry);
            reg.move_to(&FieldId::Remote(b.clone()), 1, Point::new(1.0, 1.0))
                .unwrap();
            reg.move_to(&FieldId::Remote(c.clone()), 1, Point::new(2.0, 2.0))
                .unwrap();
        }
        let report = reconciler
            .save_only(&registry, &[FieldId::Remote(c.clone())])
            .await
            .unwrap();
        assert_eq!(report.updated, vec![c]);
        assert_eq!(store.take_calls(), vec![StoreCall::Update(report.updated[0].clone())]);

        // b is still dirty and goes out with the next full save
        let rest = reconciler.save(&registry).await.unwrap();
        assert_eq!(rest.updated, vec![b]);
    }

    #[tokio::test]
    async fn test_local_only_removal_makes_no_call() {
        let (store, reconciler, registry, _) = loaded().await;
        {
            let mut reg = lock(&registry);
            let f = reg
                .add(FieldType::Text, 1, Point::ORIGIN, RecipientId::new("r1"))
                .unwrap();
            reg.remove(&f.id).unwrap();
        }
        let report = reconciler.save(&registry).await.unwrap();
        assert!(store.calls().is_empty());
        assert_eq!(report.operation_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_saves_do_not_duplicate_creates() {
        let (store, reconciler, registry, _) = loaded().await;
        lock(&registry)
            .add(FieldType::Text, 1, Point::ORIGIN, RecipientId::new("r1"))
            .unwrap();

        let (first, second) = tokio::join!(reconciler.save(&registry), reconciler.save(&registry));
        assert_eq!(first.unwrap().created.len(), 1);
        assert!(second.unwrap().created.is_empty());
        assert_eq!(counts(&store.calls()).0, 1);
    }

    #[tokio::test]
    async fn test_fields_added_during_save_wait_for_next_save() {
        let (store, reconciler, registry, _) = loaded().await;
        lock(&registry)
            .add(FieldType::Text, 1, Point::ORIGIN, RecipientId::new("r1"))
            .unwrap();

        let late = async {
            lock(&registry)
                .add(FieldType::Email, 2, Point::ORIGIN, RecipientId::new("r1"))
                .unwrap()
        };
        let (report, late) = tokio::join!(reconciler.save(&registry), late);
        assert_eq!(report.unwrap().created.len(), 1);
        assert!(lock(&registry).get(&late.id).is_some());

        store.take_calls();
        let next = reconciler.save(&registry).await.unwrap();
        assert_eq!(next.created.len(), 1);
        assert_eq!(counts(&store.calls()), (1, 0, 0));
    }

    #[tokio::test]
    async fn test_create_after_local_removal_is_deleted_next_save() {
        let (store, reconciler, registry, _) = loaded().await;
        let field = lock(&registry)
            .add(FieldType::Text, 1, Point::ORIGIN, RecipientId::new("r1"))
            .unwrap();

        let remove = async {
            tokio::task::yield_now().await;
            lock(&registry).remove(&field.id).unwrap()
        };
        let (report, removed) = tokio::join!(reconciler.save(&registry), remove);
        assert!(removed.is_some());
        let remote = report.unwrap().created[0].1.clone();

        store.take_calls();
        let next = reconciler.save(&registry).await.unwrap();
        assert_eq!(next.deleted, vec![remote.clone()]);
        assert_eq!(store.calls(), vec![StoreCall::Delete(remote)]);
    }

    #[tokio::test]
    async fn test_delete_of_missing_remote_counts_as_done() {
        let (store, reconciler, registry, [b, _, _]) = loaded().await;
        store.delete(&doc_id(), &b).await.unwrap();
        lock(&registry).remove(&FieldId::Remote(b.clone())).unwrap();

        let report = reconciler.save(&registry).await.unwrap();
        assert!(report.is_success());
        assert_eq!(report.deleted, vec![b.clone()]);
        assert!(!reconciler.snapshot().await.unwrap().contains_key(&b));
    }

    #[tokio::test]
    async fn test_load_skips_out_of_range_pages() {
        let store = Arc::new(MemoryStore::new());
        let mut stray = attrs(0.0);
        stray.page = 9;
        let stray_id = store.seed(&doc_id(), stray);
        store.seed(&doc_id(), attrs(1.0));

        let reconciler = Reconciler::new(store.clone(), doc_id());
        let registry = shared(new_registry());
        assert_eq!(reconciler.load(&registry).await.unwrap(), 1);

        // The stray record is neither shown nor deleted
        let report = reconciler.save(&registry).await.unwrap();
        assert!(report.deleted.is_empty());
        assert!(store.records(&doc_id()).iter().any(|r| r.id == stray_id));
    }

    #[tokio::test]
    async fn test_save_without_load_fetches_snapshot() {
        let store = Arc::new(MemoryStore::new());
        let orphan = store.seed(&doc_id(), attrs(0.0));
        let reconciler = Reconciler::new(store.clone(), doc_id());
        let registry = shared(new_registry());

        let report = reconciler.save(&registry).await.unwrap();
        assert_eq!(store.calls()[0], StoreCall::List);
        assert_eq!(report.deleted, vec![orphan]);
    }

    #[tokio::test]
    async fn test_failed_listing_aborts_save() {
        let store = Arc::new(MemoryStore::new());
        store.fail_when(|call| *call == StoreCall::List);
        let reconciler = Reconciler::new(store.clone(), doc_id());
        let registry = shared(new_registry());
        assert!(matches!(
            reconciler.save(&registry).await,
            Err(StoreError::Network(_))
        ));
        assert!(reconciler.snapshot().await.is_none());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use crate::coords::{Point, Size};
    use crate::document::DocumentRef;
    use crate::field::{FieldType, RecipientId};
    use crate::store::MemoryStore;
    use proptest::prelude::*;

    #[derive(Debug, Clone)]
    enum Edit {
        Add(f64, f64),
        Move(usize, f64, f64),
        Remove(usize),
        Save,
    }

    fn edit() -> impl Strategy<Value = Edit> {
        prop_oneof![
            (0.0f64..600.0, 0.0f64..780.0).prop_map(|(x, y)| Edit::Add(x, y)),
            (0usize..20, 0.0f64..600.0, 0.0f64..780.0).prop_map(|(i, x, y)| Edit::Move(i, x, y)),
            (0usize..20).prop_map(Edit::Remove),
            Just(Edit::Save),
        ]
    }

    proptest! {
        /// Property: after any edit sequence ending in a clean save, the store mirrors the registry
        #[test]
        fn store_mirrors_registry_after_save(
            edits in prop::collection::vec(edit(), 1..25),
            failing in any::<bool>(),
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            runtime.block_on(async {
                let store = Arc::new(MemoryStore::new());
                let doc = DocumentId::new("p");
                let reconciler = Reconciler::new(store.clone(), doc.clone());
                let registry = shared(FieldRegistry::new(DocumentRef::uniform("p", 1, Size::letter())));
                if failing {
                    store.fail_when(|call| matches!(call, crate::store::StoreCall::Update(_)));
                }

                for edit in edits {
                    match edit {
                        Edit::Add(x, y) => {
                            lock(&registry).add(FieldType::Text, 1, Point::new(x, y), RecipientId::new("r")).unwrap();
                        }
                        Edit::Move(i, x, y) => {
                            let mut reg = lock(&registry);
                            if let Some(id) = reg.fields().get(i).map(|f| f.id.clone()) {
                                reg.move_to(&id, 1, Point::new(x, y)).unwrap();
                            }
                        }
                        Edit::Remove(i) => {
                            let mut reg = lock(&registry);
                            if let Some(id) = reg.fields().get(i).map(|f| f.id.clone()) {
                                reg.remove(&id).unwrap();
                            }
                        }
                        Edit::Save => {
                            reconciler.save(&registry).await.unwrap();
                        }
                    }
                }

                store.clear_failures();
                let report = reconciler.save(&registry).await.unwrap();
                prop_assert!(report.is_success());

                let mut stored: Vec<(RemoteId, FieldAttributes)> = store
                    .records(&doc)
                    .into_iter()
                    .map(|r| (r.id, r.attributes))
                    .collect();
                stored.sort_by(|a, b| a.0.cmp(&b.0));
                let mut local: Vec<(RemoteId, FieldAttributes)> = lock(&registry)
                    .fields()
                    .iter()
                    .map(|f| (f.id.as_remote().cloned().unwrap(), f.attributes()))
                    .collect();
                local.sort_by(|a, b| a.0.cmp(&b.0));
                prop_assert_eq!(stored, local);
                Ok(())
            })?;
        }
    }
}

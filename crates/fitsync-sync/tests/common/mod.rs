//! Shared fixtures for fitsync-sync integration tests

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fitsync_cache::{DatabasePool, SqliteLocalStore, SqliteMutationQueue};
use fitsync_core::domain::{
    Collection, EntityRecord, MutationEntry, Operation, RecordId, TenantId,
};
use fitsync_core::ports::{
    CommittedWrite, ILocalStore, IMutationQueue, IReachabilityProbe, IRemoteStore, RemoteFilter,
};
use fitsync_sync::{ChangeBus, ConnectivityMonitor, SyncEngine};

// ============================================================================
// FakeRemoteStore
// ============================================================================

/// A call observed by the fake remote store
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    Select(Collection),
    Insert(Collection, EntityRecord),
    Update(Collection, String, EntityRecord),
    Delete(Collection, String),
}

/// In-memory remote store that records every call
///
/// Inserted rows get ids from `next_ids` first, then `c-1`, `c-2`, ...
/// Calls whose record id or `name` field is in `fail_keys` fail, and so
/// does everything while `unreachable` is set.
#[derive(Default)]
pub struct FakeRemoteStore {
    calls: Mutex<Vec<RemoteCall>>,
    rows: Mutex<HashMap<Collection, Vec<EntityRecord>>>,
    next_ids: Mutex<VecDeque<String>>,
    fail_keys: Mutex<HashSet<String>>,
    counter: AtomicUsize,
    unreachable: AtomicBool,
}

impl FakeRemoteStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_next_id(&self, id: &str) {
        self.next_ids.lock().unwrap().push_back(id.to_string());
    }

    pub fn fail_on(&self, key: &str) {
        self.fail_keys.lock().unwrap().insert(key.to_string());
    }

    pub fn clear_failures(&self) {
        self.fail_keys.lock().unwrap().clear();
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    pub fn seed(&self, collection: Collection, record: EntityRecord) {
        self.rows
            .lock()
            .unwrap()
            .entry(collection)
            .or_default()
            .push(record);
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn rows(&self, collection: Collection) -> Vec<EntityRecord> {
        self.rows
            .lock()
            .unwrap()
            .get(&collection)
            .cloned()
            .unwrap_or_default()
    }

    fn check(&self, record_id: Option<&str>, record: Option<&EntityRecord>) -> anyhow::Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            anyhow::bail!("network unreachable");
        }
        let fail_keys = self.fail_keys.lock().unwrap();
        if let Some(id) = record_id {
            if fail_keys.contains(id) {
                anyhow::bail!("simulated failure for {id}");
            }
        }
        if let Some(name) = record.and_then(|r| r.get("name")).and_then(|v| v.as_str()) {
            if fail_keys.contains(name) {
                anyhow::bail!("simulated failure for {name}");
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl IRemoteStore for FakeRemoteStore {
    async fn select(
        &self,
        collection: Collection,
        filter: &RemoteFilter,
    ) -> anyhow::Result<Vec<EntityRecord>> {
        self.calls.lock().unwrap().push(RemoteCall::Select(collection));
        self.check(None, None)?;
        Ok(self
            .rows(collection)
            .into_iter()
            .filter(|r| filter.matches(r))
            .collect())
    }

    async fn insert(
        &self,
        collection: Collection,
        record: &EntityRecord,
    ) -> anyhow::Result<EntityRecord> {
        self.calls
            .lock()
            .unwrap()
            .push(RemoteCall::Insert(collection, record.clone()));
        self.check(None, Some(record))?;

        let id = match self.next_ids.lock().unwrap().pop_front() {
            Some(id) => id,
            None => format!("c-{}", self.counter.fetch_add(1, Ordering::SeqCst) + 1),
        };
        let mut stored = record.clone();
        stored.set_id(&RecordId::new(id)?);
        self.seed(collection, stored.clone());
        Ok(stored)
    }

    async fn update(
        &self,
        collection: Collection,
        id: &RecordId,
        patch: &EntityRecord,
    ) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(RemoteCall::Update(
            collection,
            id.to_string(),
            patch.clone(),
        ));
        self.check(Some(id.as_str()), Some(patch))?;

        let mut rows = self.rows.lock().unwrap();
        if let Some(row) = rows
            .entry(collection)
            .or_default()
            .iter_mut()
            .find(|r| r.id().as_ref() == Some(id))
        {
            row.merge(patch);
        }
        Ok(())
    }

    async fn delete(&self, collection: Collection, id: &RecordId) -> anyhow::Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(RemoteCall::Delete(collection, id.to_string()));
        self.check(Some(id.as_str()), None)?;

        self.rows
            .lock()
            .unwrap()
            .entry(collection)
            .or_default()
            .retain(|r| r.id().as_ref() != Some(id));
        Ok(())
    }
}

// ============================================================================
// FakeProbe
// ============================================================================

pub struct FakeProbe {
    pub reachable: AtomicBool,
}

impl FakeProbe {
    pub fn new(reachable: bool) -> Arc<Self> {
        Arc::new(Self {
            reachable: AtomicBool::new(reachable),
        })
    }
}

#[async_trait::async_trait]
impl IReachabilityProbe for FakeProbe {
    async fn probe(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Failing storage wrappers
// ============================================================================

/// Local store whose id reconcile fails while `fail_confirm` is set
pub struct FlakyStore {
    pub inner: Arc<SqliteLocalStore>,
    pub fail_confirm: AtomicBool,
}

impl FlakyStore {
    pub fn new(inner: Arc<SqliteLocalStore>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            fail_confirm: AtomicBool::new(true),
        })
    }
}

#[async_trait::async_trait]
impl ILocalStore for FlakyStore {
    async fn initialize(&self) -> anyhow::Result<()> {
        self.inner.initialize().await
    }

    async fn get_all(
        &self,
        collection: Collection,
        tenant: Option<&TenantId>,
    ) -> anyhow::Result<Vec<EntityRecord>> {
        self.inner.get_all(collection, tenant).await
    }

    async fn get_by_id(
        &self,
        collection: Collection,
        id: &RecordId,
    ) -> anyhow::Result<Option<EntityRecord>> {
        self.inner.get_by_id(collection, id).await
    }

    async fn put(
        &self,
        collection: Collection,
        record: EntityRecord,
    ) -> anyhow::Result<EntityRecord> {
        self.inner.put(collection, record).await
    }

    async fn delete(&self, collection: Collection, id: &RecordId) -> anyhow::Result<()> {
        self.inner.delete(collection, id).await
    }

    async fn commit_with_mutation(
        &self,
        collection: Collection,
        operation: Operation,
        record: EntityRecord,
    ) -> anyhow::Result<CommittedWrite> {
        self.inner
            .commit_with_mutation(collection, operation, record)
            .await
    }

    async fn confirm_insert(
        &self,
        collection: Collection,
        entry_id: &str,
        temp_id: &RecordId,
        server: &EntityRecord,
    ) -> anyhow::Result<u64> {
        if self.fail_confirm.load(Ordering::SeqCst) {
            anyhow::bail!("disk I/O error");
        }
        self.inner
            .confirm_insert(collection, entry_id, temp_id, server)
            .await
    }

    async fn set_cached_tenant(&self, tenant: &TenantId) -> anyhow::Result<()> {
        self.inner.set_cached_tenant(tenant).await
    }

    async fn cached_tenant(&self) -> anyhow::Result<Option<TenantId>> {
        self.inner.cached_tenant().await
    }
}

/// Queue that refuses new entries and delegates everything else
pub struct FullQueue {
    pub inner: Arc<SqliteMutationQueue>,
}

#[async_trait::async_trait]
impl IMutationQueue for FullQueue {
    async fn enqueue(&self, _entry: &MutationEntry) -> anyhow::Result<()> {
        anyhow::bail!("database or disk is full")
    }

    async fn drain_all(&self) -> anyhow::Result<Vec<MutationEntry>> {
        self.inner.drain_all().await
    }

    async fn remove(&self, entry_id: &str) -> anyhow::Result<()> {
        self.inner.remove(entry_id).await
    }

    async fn increment_retry(&self, entry_id: &str, error: Option<&str>) -> anyhow::Result<()> {
        self.inner.increment_retry(entry_id, error).await
    }

    async fn rewrite_entity_id(
        &self,
        collection: Collection,
        old_id: &RecordId,
        new_id: &RecordId,
    ) -> anyhow::Result<u64> {
        self.inner.rewrite_entity_id(collection, old_id, new_id).await
    }

    async fn mark_confirmed(&self, entry_id: &str, permanent: &RecordId) -> anyhow::Result<()> {
        self.inner.mark_confirmed(entry_id, permanent).await
    }

    async fn len(&self) -> anyhow::Result<usize> {
        self.inner.len().await
    }

    async fn try_claim_drain(&self, owner: &str, ttl: Duration) -> anyhow::Result<bool> {
        self.inner.try_claim_drain(owner, ttl).await
    }

    async fn release_drain(&self, owner: &str) -> anyhow::Result<()> {
        self.inner.release_drain(owner).await
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub store: Arc<SqliteLocalStore>,
    pub queue: Arc<SqliteMutationQueue>,
    pub remote: Arc<FakeRemoteStore>,
    pub probe: Arc<FakeProbe>,
    pub connectivity: Arc<ConnectivityMonitor>,
    pub bus: Arc<ChangeBus>,
}

impl Harness {
    pub async fn new() -> Self {
        let db = DatabasePool::in_memory()
            .await
            .expect("Failed to create in-memory database");
        Self::with_database(db, FakeRemoteStore::new())
    }

    /// Opens a cache file, as a second process sharing it would
    pub async fn open(path: &Path, remote: Arc<FakeRemoteStore>) -> Self {
        let db = DatabasePool::new(path)
            .await
            .expect("Failed to open database file");
        Self::with_database(db, remote)
    }

    fn with_database(db: DatabasePool, remote: Arc<FakeRemoteStore>) -> Self {
        let probe = FakeProbe::new(true);
        Self {
            store: Arc::new(SqliteLocalStore::new(db.clone())),
            queue: Arc::new(SqliteMutationQueue::new(db)),
            remote,
            connectivity: Arc::new(ConnectivityMonitor::new(probe.clone())),
            probe,
            bus: ChangeBus::new(),
        }
    }

    pub fn engine(&self) -> SyncEngine {
        SyncEngine::new(self.store.clone(), self.queue.clone(), self.remote.clone())
    }

    /// Takes the monitor offline through a failed probe
    pub async fn go_offline(&self) {
        self.probe.reachable.store(false, Ordering::SeqCst);
        self.connectivity.check().await;
    }

    /// Number of INSERT calls the remote store received
    pub fn remote_inserts(&self) -> usize {
        self.remote
            .calls()
            .iter()
            .filter(|c| matches!(c, RemoteCall::Insert(..)))
            .count()
    }

    pub async fn go_online(&self) {
        self.probe.reachable.store(true, Ordering::SeqCst);
        self.connectivity.check().await;
    }
}

pub fn client(name: &str) -> EntityRecord {
    EntityRecord::new().with("name", name)
}

pub fn rid(id: &str) -> RecordId {
    RecordId::new(id).unwrap()
}

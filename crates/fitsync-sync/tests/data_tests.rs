//! Integration tests for DataService

mod common;

use std::sync::{Arc, Mutex};

use fitsync_core::domain::{
    ChangeEvent, ChangeKind, ChangeSource, Collection, EntityRecord, TenantId,
};
use fitsync_core::ports::{ILocalStore, IMutationQueue};
use fitsync_sync::{DataService, SyncError, WriteOptions, WriteOutcome};

use common::{client, rid, FullQueue, Harness};

fn tenant(id: &str) -> TenantId {
    TenantId::new(id).unwrap()
}

fn record_events(h: &Harness) -> Arc<Mutex<Vec<ChangeEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    h.bus.subscribe(
        None,
        Arc::new(move |e: &ChangeEvent| {
            sink.lock().unwrap().push(e.clone());
            Ok(())
        }),
    );
    events
}

async fn service(h: &Harness, trainer: &str) -> DataService {
    let mut data = DataService::new(h.store.clone(), h.queue.clone(), h.bus.clone())
        .with_tenant(tenant(trainer))
        .with_remote(h.remote.clone(), h.connectivity.clone());
    data.init().await.unwrap();
    data
}

// ============================================================================
// Writes
// ============================================================================

#[tokio::test]
async fn test_offline_write_is_durable_and_queued() {
    let h = Harness::new().await;
    h.go_offline().await;
    let data = service(&h, "trainer-1").await;

    let written = data
        .create_item(Collection::Clients, client("Ann"), WriteOptions::default())
        .await
        .unwrap();
    assert!(written.is_queued());

    let id = written.record.id().unwrap();
    let stored = data.get(Collection::Clients, &id).await.unwrap().unwrap();
    assert_eq!(stored, written.record);
    assert_eq!(stored.trainer_id(), Some(tenant("trainer-1")));
    assert!(stored.created_at().is_some());

    let entries = h.queue.drain_all().await.unwrap();
    assert_eq!(entries.len(), 1);
    match &written.outcome {
        WriteOutcome::Queued { entry_id } => assert_eq!(&entries[0].id, entry_id),
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[tokio::test]
async fn test_local_only_write_skips_queue() {
    let h = Harness::new().await;
    let data = service(&h, "trainer-1").await;

    let written = data
        .create_item(
            Collection::Exercises,
            EntityRecord::new().with("id", "e-1").with("name", "Squat"),
            WriteOptions::local_only(),
        )
        .await
        .unwrap();

    assert_eq!(written.outcome, WriteOutcome::LocalOnly);
    assert_eq!(h.queue.len().await.unwrap(), 0);
    assert!(data.get(Collection::Exercises, &rid("e-1")).await.unwrap().is_some());
}

#[tokio::test]
async fn test_failed_enqueue_keeps_local_write_and_notifies() {
    let h = Harness::new().await;
    let events = record_events(&h);
    let queue = Arc::new(FullQueue {
        inner: h.queue.clone(),
    });
    let mut data = DataService::new(h.store.clone(), queue, h.bus.clone())
        .with_tenant(tenant("trainer-1"));
    data.init().await.unwrap();

    let written = data
        .create_item(Collection::Clients, client("Ann"), WriteOptions::default())
        .await
        .unwrap();

    match &written.outcome {
        WriteOutcome::EnqueueFailed { reason } => assert!(reason.contains("full")),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert!(!written.is_queued());

    let id = written.record.id().unwrap();
    let stored = h.store.get_by_id(Collection::Clients, &id).await.unwrap();
    assert_eq!(stored, Some(written.record.clone()));
    assert_eq!(h.queue.len().await.unwrap(), 0);

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, ChangeKind::Insert);
    assert_eq!(events[0].source, ChangeSource::Local);
    assert_eq!(events[0].id.as_deref(), Some(id.as_str()));
}

#[tokio::test]
async fn test_atomic_enqueue_commits_record_and_entry_together() {
    let h = Harness::new().await;
    let mut data = DataService::new(h.store.clone(), h.queue.clone(), h.bus.clone())
        .with_tenant(tenant("trainer-1"))
        .with_atomic_enqueue(true);
    data.init().await.unwrap();

    let written = data
        .create_item(Collection::Workouts, client("Legs"), WriteOptions::default())
        .await
        .unwrap();

    assert!(written.is_queued());
    let entries = h.queue.drain_all().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].entity_id(), written.record.id());
}

#[tokio::test]
async fn test_update_merges_patch_and_keeps_id() {
    let h = Harness::new().await;
    let data = service(&h, "trainer-1").await;
    let created = data
        .create_item(
            Collection::Clients,
            client("Ann").with("goal", "strength"),
            WriteOptions::default(),
        )
        .await
        .unwrap();
    let id = created.record.id().unwrap();

    let updated = data
        .update_item(
            Collection::Clients,
            &id,
            EntityRecord::new().with("id", "other").with("goal", "endurance"),
            WriteOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(updated.record.id(), Some(id.clone()));
    assert_eq!(updated.record.get("name").unwrap(), "Ann");
    assert_eq!(updated.record.get("goal").unwrap(), "endurance");
    assert_eq!(h.queue.len().await.unwrap(), 2);
}

#[tokio::test]
async fn test_update_and_delete_of_missing_record_fail() {
    let h = Harness::new().await;
    let data = service(&h, "trainer-1").await;

    let err = data
        .update_item(
            Collection::Clients,
            &rid("nope"),
            EntityRecord::new(),
            WriteOptions::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::NotFound { .. }));

    let err = data
        .delete_item(Collection::Clients, &rid("nope"), WriteOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::NotFound { .. }));
    assert_eq!(h.queue.len().await.unwrap(), 0);
}

#[tokio::test]
async fn test_delete_queues_last_known_state() {
    let h = Harness::new().await;
    let data = service(&h, "trainer-1").await;
    let created = data
        .create_item(Collection::Clients, client("Ann"), WriteOptions::local_only())
        .await
        .unwrap();
    let id = created.record.id().unwrap();

    data.delete_item(Collection::Clients, &id, WriteOptions::default())
        .await
        .unwrap();

    assert!(data.get(Collection::Clients, &id).await.unwrap().is_none());
    let entries = h.queue.drain_all().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].payload.get("name").unwrap(), "Ann");
}

#[tokio::test]
async fn test_every_write_publishes_a_local_event() {
    let h = Harness::new().await;
    let events = record_events(&h);
    let data = service(&h, "trainer-1").await;

    let created = data
        .create_item(Collection::Clients, client("Ann"), WriteOptions::default())
        .await
        .unwrap();
    let id = created.record.id().unwrap();
    data.update_item(
        Collection::Clients,
        &id,
        EntityRecord::new().with("name", "Anna"),
        WriteOptions::default(),
    )
    .await
    .unwrap();
    data.delete_item(Collection::Clients, &id, WriteOptions::default())
        .await
        .unwrap();

    let events = events.lock().unwrap();
    let kinds: Vec<ChangeKind> = events.iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![ChangeKind::Insert, ChangeKind::Update, ChangeKind::Delete]
    );
    assert!(events.iter().all(|e| e.source == ChangeSource::Local));
    assert!(events.iter().all(|e| e.id.as_deref() == Some(id.as_str())));
}

// ============================================================================
// Tenant handling
// ============================================================================

#[tokio::test]
async fn test_list_is_scoped_to_tenant() {
    let h = Harness::new().await;
    let ann = service(&h, "trainer-1").await;
    ann.create_item(Collection::Clients, client("Ann"), WriteOptions::default())
        .await
        .unwrap();
    let bob = service(&h, "trainer-2").await;
    bob.create_item(Collection::Clients, client("Bob"), WriteOptions::default())
        .await
        .unwrap();

    let listed = ann.list(Collection::Clients).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert!(listed
        .iter()
        .all(|r| r.trainer_id() == Some(tenant("trainer-1"))));
}

#[tokio::test]
async fn test_init_falls_back_to_cached_tenant() {
    let h = Harness::new().await;
    service(&h, "trainer-1").await;

    let mut offline_start = DataService::new(h.store.clone(), h.queue.clone(), h.bus.clone());
    offline_start.init().await.unwrap();

    assert_eq!(offline_start.tenant(), Some(&tenant("trainer-1")));
    assert_eq!(
        h.store.cached_tenant().await.unwrap(),
        Some(tenant("trainer-1"))
    );
}

// ============================================================================
// Remote refresh
// ============================================================================

#[tokio::test]
async fn test_refresh_mirrors_remote_rows() {
    let h = Harness::new().await;
    let events = record_events(&h);
    let data = service(&h, "trainer-1").await;

    h.remote.seed(
        Collection::Clients,
        client("Ann").with("id", "c-1").with("trainer_id", "trainer-1"),
    );
    h.remote.seed(
        Collection::Clients,
        client("Eve").with("id", "c-2").with("trainer_id", "trainer-2"),
    );
    // Stale local copy that no longer exists remotely
    data.create_item(
        Collection::Clients,
        client("Old").with("id", "c-9"),
        WriteOptions::local_only(),
    )
    .await
    .unwrap();

    let summary = data.refresh(Collection::Clients).await.unwrap();
    assert_eq!(summary.upserted, 1);
    assert_eq!(summary.removed, 1);
    assert_eq!(summary.skipped, 0);

    let listed = data.list(Collection::Clients).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id().unwrap().as_str(), "c-1");
    assert_eq!(h.queue.len().await.unwrap(), 0);

    let last = events.lock().unwrap().last().cloned().unwrap();
    assert_eq!(last.kind, ChangeKind::Refresh);
    assert_eq!(last.collection, Collection::Clients);
}

#[tokio::test]
async fn test_refresh_keeps_pending_and_temporary_records() {
    let h = Harness::new().await;
    let data = service(&h, "trainer-1").await;

    h.remote.seed(
        Collection::Clients,
        client("Ann").with("id", "c-1").with("trainer_id", "trainer-1"),
    );
    data.create_item(
        Collection::Clients,
        client("Ann").with("id", "c-1"),
        WriteOptions::local_only(),
    )
    .await
    .unwrap();
    data.update_item(
        Collection::Clients,
        &rid("c-1"),
        EntityRecord::new().with("name", "Ann (edited)"),
        WriteOptions::default(),
    )
    .await
    .unwrap();
    let temp = data
        .create_item(Collection::Clients, client("New"), WriteOptions::default())
        .await
        .unwrap();

    let summary = data.refresh(Collection::Clients).await.unwrap();
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.removed, 0);

    let edited = data
        .get(Collection::Clients, &rid("c-1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(edited.get("name").unwrap(), "Ann (edited)");
    assert!(data
        .get(Collection::Clients, &temp.record.id().unwrap())
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_refresh_requires_connectivity_and_remote() {
    let h = Harness::new().await;
    let data = service(&h, "trainer-1").await;
    h.go_offline().await;
    assert!(matches!(
        data.refresh(Collection::Clients).await,
        Err(SyncError::Offline)
    ));

    let mut local = DataService::new(h.store.clone(), h.queue.clone(), h.bus.clone());
    local.init().await.unwrap();
    assert!(matches!(
        local.refresh(Collection::Clients).await,
        Err(SyncError::Remote(_))
    ));
}

#[tokio::test]
async fn test_refresh_surfaces_remote_failure() {
    let h = Harness::new().await;
    let data = service(&h, "trainer-1").await;
    h.remote.set_unreachable(true);

    assert!(matches!(
        data.refresh(Collection::Clients).await,
        Err(SyncError::Remote(_))
    ));
}

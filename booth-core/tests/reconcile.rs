//! Mirror reconciler passes over the in-memory stores

use booth_core::sync::ReconcileStats;
use booth_core::{Config, CoreServices, MemoryServices, MirrorReconciler};
use serde_json::json;
use shared::models::{CallerRef, EventCreate, EventDocument};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn services() -> MemoryServices {
    CoreServices::in_memory(&Config::default())
}

fn reconciler(svc: &MemoryServices, batch_size: usize) -> MirrorReconciler {
    MirrorReconciler::new(
        svc.services.sync.clone(),
        batch_size,
        Duration::from_millis(20),
        CancellationToken::new(),
    )
}

async fn create(svc: &MemoryServices, caller: &CallerRef, slug: &str) {
    // Distinct creation times keep the paging order unambiguous
    tokio::time::sleep(Duration::from_millis(2)).await;
    svc.services
        .sync
        .create_event(
            caller,
            EventCreate {
                slug: slug.into(),
                title: slug.to_uppercase(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn pass_repairs_rows_missed_while_mirror_was_down() {
    let svc = services();
    let ana = svc.accounts.seed_legacy("ana@example.com", "ana", 10).unwrap().id;
    let caller = CallerRef::Legacy(ana);

    create(&svc, &caller, "first").await;
    svc.mirror.set_unavailable(true);
    for slug in ["second", "third", "fourth"] {
        create(&svc, &caller, slug).await;
    }
    svc.mirror.set_unavailable(false);
    assert_eq!(svc.mirror.event_count(), 1);

    // Batch smaller than the document count exercises paging
    let stats = reconciler(&svc, 2).run_pass().await;
    assert_eq!(
        stats,
        ReconcileStats {
            scanned: 4,
            upserted: 4,
            backfilled: 3,
            failed: 0,
        }
    );
    assert_eq!(svc.mirror.event_count(), 4);

    for doc in svc.services.sync.list_events(&caller).await.unwrap() {
        let row = svc.mirror.event_by_key(ana, &doc.slug).unwrap();
        assert_eq!(doc.mirror_ref, Some(row.id));
    }

    // A second pass is idempotent
    let stats = reconciler(&svc, 2).run_pass().await;
    assert_eq!(stats.upserted, 4);
    assert_eq!(stats.backfilled, 0);
    assert_eq!(svc.mirror.event_count(), 4);
}

#[tokio::test]
async fn unresolvable_owner_counts_as_failure() {
    let svc = services();
    let ana = svc.accounts.seed_legacy("ana@example.com", "ana", 10).unwrap().id;
    create(&svc, &CallerRef::Legacy(ana), "gala").await;

    let orphan: EventDocument = serde_json::from_value(json!({
        "_id": "evt-orphan",
        "type": "event",
        "user_id": "Rr0UnknownId",
        "slug": "lost",
        "created_at": "2024-03-01T00:00:00.000Z",
        "updated_at": "2024-03-01T00:00:00.000Z"
    }))
    .unwrap();
    svc.services.sync.events().create(&orphan).await.unwrap();

    let stats = reconciler(&svc, 100).run_pass().await;
    assert_eq!(stats.scanned, 2);
    assert_eq!(stats.upserted, 1);
    assert_eq!(stats.failed, 1);
}

#[tokio::test]
async fn mirror_outage_during_pass_is_counted() {
    let svc = services();
    let ana = svc.accounts.seed_legacy("ana@example.com", "ana", 10).unwrap().id;
    create(&svc, &CallerRef::Legacy(ana), "gala").await;

    svc.mirror.set_unavailable(true);
    let stats = reconciler(&svc, 10).run_pass().await;
    assert_eq!(stats.scanned, 1);
    assert_eq!(stats.failed, 1);
}

#[tokio::test]
async fn run_stops_on_shutdown() {
    let svc = services();
    let ana = svc.accounts.seed_legacy("ana@example.com", "ana", 10).unwrap().id;
    svc.mirror.set_unavailable(true);
    create(&svc, &CallerRef::Legacy(ana), "gala").await;
    svc.mirror.set_unavailable(false);

    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(
        MirrorReconciler::new(
            svc.services.sync.clone(),
            10,
            Duration::from_millis(10),
            shutdown.clone(),
        )
        .run(),
    );

    // The first tick fires immediately
    let mut repaired = false;
    for _ in 0..100 {
        if svc.mirror.event_count() == 1 {
            repaired = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(repaired, "reconciler never repaired the mirror");

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("reconciler did not stop")
        .unwrap();
}

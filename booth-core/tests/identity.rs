//! Identity resolution against the in-memory stores

use booth_core::{Config, CoreError, CoreServices, MemoryServices};
use serde_json::json;
use shared::models::{CallerRef, EventCreate, EventDocument};
use std::collections::HashSet;

fn services() -> MemoryServices {
    CoreServices::in_memory(&Config::default())
}

fn uuid_event(doc_id: &str, owner: &str, slug: &str) -> EventDocument {
    serde_json::from_value(json!({
        "_id": doc_id,
        "type": "event",
        "user_id": owner,
        "slug": slug,
        "title": "Imported",
        "created_at": "2025-06-01T10:00:00.000Z",
        "updated_at": "2025-06-01T10:00:00.000Z"
    }))
    .unwrap()
}

#[tokio::test]
async fn legacy_id_is_returned_without_lookup() {
    let svc = services();
    let id = svc.services.resolver.resolve(&CallerRef::Legacy(404)).await.unwrap();
    assert_eq!(id, 404);
    assert_eq!(svc.accounts.legacy_count(), 0);
}

#[tokio::test]
async fn uuid_joins_legacy_row_by_email() {
    let svc = services();
    let legacy = svc.accounts.seed_legacy("ana@example.com", "ana", 50).unwrap();
    svc.accounts
        .seed_uuid("Zp4kQ8rT1vWx", Some("ana@example.com"), Some("Ana"), Some("ana"));

    let id = svc
        .services
        .resolver
        .resolve(&CallerRef::Uuid("Zp4kQ8rT1vWx".into()))
        .await
        .unwrap();
    assert_eq!(id, legacy.id);
    assert_eq!(svc.accounts.legacy_count(), 1);
}

#[tokio::test]
async fn uuid_without_legacy_row_is_synthesized_once() {
    let svc = services();
    svc.accounts
        .seed_uuid("Zp4kQ8rT1vWx", Some("bo@example.com"), Some("Bo Lindqvist"), None);
    let caller = CallerRef::Uuid("Zp4kQ8rT1vWx".into());

    let first = svc.services.resolver.resolve_account(&caller).await.unwrap();
    let second = svc.services.resolver.resolve(&caller).await.unwrap();

    assert_eq!(first.id, second);
    assert_eq!(first.email, "bo@example.com");
    assert_eq!(first.slug.as_deref(), Some("bo-lindqvist"));
    assert_eq!(first.full_name.as_deref(), Some("Bo Lindqvist"));
    assert_eq!(first.tokens_remaining, 1000);
    assert_eq!(svc.accounts.legacy_count(), 1);

    let grants = svc.accounts.transactions_of(first.id);
    assert_eq!(grants.len(), 1);
    assert_eq!(grants[0].transaction_type, "initial_grant");
    assert_eq!(grants[0].amount, 1000);
    assert_eq!(grants[0].balance_after, 1000);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_synthesis_creates_one_account() {
    let svc = services();
    svc.accounts
        .seed_uuid("Zp4kQ8rT1vWx", Some("cy@example.com"), None, Some("cy"));

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let resolver = svc.services.resolver.clone();
            tokio::spawn(async move {
                resolver
                    .resolve(&CallerRef::Uuid("Zp4kQ8rT1vWx".into()))
                    .await
            })
        })
        .collect();

    let mut ids = HashSet::new();
    for h in handles {
        ids.insert(h.await.unwrap().unwrap());
    }

    assert_eq!(ids.len(), 1);
    assert_eq!(svc.accounts.legacy_count(), 1);
    let id = ids.into_iter().next().unwrap();
    assert_eq!(svc.accounts.transactions_of(id).len(), 1);
}

#[tokio::test]
async fn colliding_slug_gets_uuid_suffix() {
    let svc = services();
    svc.accounts.seed_legacy("someone@example.com", "dana", 0).unwrap();
    svc.accounts
        .seed_uuid("Q7Zk2mP9xYw3", Some("dana@example.com"), None, Some("dana"));

    let account = svc
        .services
        .resolver
        .resolve_account(&CallerRef::Uuid("Q7Zk2mP9xYw3".into()))
        .await
        .unwrap();
    assert_eq!(account.slug.as_deref(), Some("dana-q7zk2mp9"));
    assert_eq!(account.email, "dana@example.com");
}

#[tokio::test]
async fn event_reference_resolves_to_owner() {
    let svc = services();
    let owner = svc.accounts.seed_legacy("ed@example.com", "ed", 10).unwrap();
    let report = svc
        .services
        .sync
        .create_event(
            &CallerRef::Legacy(owner.id),
            EventCreate {
                slug: "launch".into(),
                title: "Launch".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let id = svc
        .services
        .resolver
        .resolve(&CallerRef::Event(report.value.id.clone()))
        .await
        .unwrap();
    assert_eq!(id, owner.id);
}

#[tokio::test]
async fn event_owned_by_uuid_resolves_through_email() {
    let svc = services();
    let legacy = svc.accounts.seed_legacy("fi@example.com", "fi", 10).unwrap();
    svc.accounts
        .seed_uuid("Hn3sVb7Kq2Lm", Some("fi@example.com"), None, None);
    svc.services
        .sync
        .events()
        .create(&uuid_event("evt-imported-1", "Hn3sVb7Kq2Lm", "summer"))
        .await
        .unwrap();

    let id = svc
        .services
        .resolver
        .resolve(&CallerRef::Event("evt-imported-1".into()))
        .await
        .unwrap();
    assert_eq!(id, legacy.id);
}

#[tokio::test]
async fn slug_resolves_legacy_then_uuid() {
    let svc = services();
    let legacy = svc.accounts.seed_legacy("gil@example.com", "gil", 10).unwrap();
    svc.accounts
        .seed_uuid("Wq8eRt5yUi0o", Some("hana@example.com"), Some("Hana"), Some("hana"));

    let resolver = &svc.services.resolver;
    assert_eq!(
        resolver.resolve(&CallerRef::Slug("gil".into())).await.unwrap(),
        legacy.id
    );

    let hana = resolver.resolve(&CallerRef::Slug("hana".into())).await.unwrap();
    assert_ne!(hana, legacy.id);
    assert_eq!(svc.accounts.legacy_count(), 2);
}

#[tokio::test]
async fn missing_identity_is_unresolvable() {
    let svc = services();
    svc.accounts.seed_uuid("NoMail000001", None, Some("Ghost"), None);
    let resolver = &svc.services.resolver;

    let cases = [
        CallerRef::Anonymous,
        CallerRef::Uuid("does-not-exist".into()),
        CallerRef::Uuid("NoMail000001".into()),
        CallerRef::Event("event:missing".into()),
        CallerRef::Slug("nobody".into()),
    ];
    for caller in cases {
        let err = resolver.resolve(&caller).await.unwrap_err();
        assert!(
            matches!(err, CoreError::Unresolvable(_)),
            "{caller} should be unresolvable, got {err:?}"
        );
        assert!(err.is_retryable());
    }
    assert_eq!(svc.accounts.legacy_count(), 0);
}

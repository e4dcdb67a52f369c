//! Token ledger against the in-memory account store
//!
//! Concurrency tests run on a multi-threaded runtime so that charges for the
//! same account genuinely race for the balance lock.

use booth_core::ledger::PriceSource;
use booth_core::{Config, CoreError, CoreServices, MemoryServices};
use rand::Rng;
use shared::models::{AccountId, CallerRef, CreditReason, LedgerTransaction};

fn services() -> MemoryServices {
    CoreServices::in_memory(&Config::default())
}

fn account(svc: &MemoryServices, slug: &str, balance: i64) -> AccountId {
    svc.accounts
        .seed_legacy(&format!("{slug}@example.com"), slug, balance)
        .unwrap()
        .id
}

/// Every row's balance_after is the previous one plus its amount, and the
/// amounts add up to the final balance.
fn assert_chain(rows: &[LedgerTransaction], final_balance: i64) {
    let mut running = 0;
    for row in rows {
        running += row.amount;
        assert_eq!(row.balance_after, running, "broken chain at transaction {}", row.id);
    }
    assert_eq!(running, final_balance);
}

#[tokio::test]
async fn price_walks_the_cascade() {
    let svc = services();
    let ana = account(&svc, "ana", 100);
    let ledger = &svc.services.ledger;

    let p = ledger.price(ana, "fal-ai/flux-realism", Some(2)).await.unwrap();
    assert_eq!((p.tokens, p.source), (2, PriceSource::Explicit));

    svc.accounts.set_custom_price(ana, "fal-ai/flux-realism", 3);
    svc.accounts.set_global_price("fal-ai/flux-realism", 6);
    let p = ledger.price(ana, "fal-ai/flux-realism", None).await.unwrap();
    assert_eq!((p.tokens, p.source), (3, PriceSource::AccountCustom));

    let bo = account(&svc, "bo", 100);
    let p = ledger.price(bo, "fal-ai/flux-realism", None).await.unwrap();
    assert_eq!((p.tokens, p.source), (6, PriceSource::GlobalDefault));

    let p = ledger.price(bo, "fal-ai/insightface-swap", None).await.unwrap();
    assert_eq!((p.tokens, p.source), (8, PriceSource::BuiltinTable));

    let p = ledger.price(bo, "acme/unknown-model", None).await.unwrap();
    assert_eq!((p.tokens, p.source), (5, PriceSource::ConstantDefault));

    // Explicit zero is a price, not an absence
    let p = ledger.price(bo, "fal-ai/insightface-swap", Some(0)).await.unwrap();
    assert_eq!((p.tokens, p.source), (0, PriceSource::Explicit));
}

#[tokio::test]
async fn charge_records_transaction() {
    let svc = services();
    let ana = account(&svc, "ana", 100);

    let receipt = svc
        .services
        .ledger
        .charge_with_event(ana, "fal-ai/flux-realism", None, Some(12))
        .await
        .unwrap();
    assert_eq!(receipt.charged, 4);
    assert_eq!(receipt.new_balance, 96);
    assert_eq!(svc.services.ledger.balance(ana).await.unwrap(), 96);

    let rows = svc.accounts.transactions_of(ana);
    let last = rows.last().unwrap();
    assert_eq!(last.id, receipt.transaction_id);
    assert_eq!(last.amount, -4);
    assert_eq!(last.transaction_type, "generation");
    assert_eq!(last.event_id, Some(12));
    let metadata = last.metadata.as_ref().unwrap();
    assert_eq!(metadata["model_id"], "fal-ai/flux-realism");
    assert_eq!(metadata["price_source"], "builtin_table");
    assert_chain(&rows, 96);
}

#[tokio::test]
async fn balance_may_go_negative() {
    let svc = services();
    let ana = account(&svc, "ana", 3);

    let receipt = svc
        .services
        .ledger
        .charge(ana, "fal-ai/video-generation", None)
        .await
        .unwrap();
    assert_eq!(receipt.new_balance, -22);
    assert_chain(&svc.accounts.transactions_of(ana), -22);
}

#[tokio::test]
async fn invalid_amounts_are_rejected_before_any_write() {
    let svc = services();
    let ana = account(&svc, "ana", 10);
    let ledger = &svc.services.ledger;

    let err = ledger.charge(ana, "fal-ai/fast-sdxl", Some(-1)).await.unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));

    for amount in [0, -5] {
        let err = ledger
            .add(ana, amount, CreditReason::Bonus { note: None })
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    assert_eq!(ledger.balance(ana).await.unwrap(), 10);
    assert_eq!(svc.accounts.transactions_of(ana).len(), 1);
}

#[tokio::test]
async fn credit_past_i64_max_is_rejected() {
    let svc = services();
    let ana = account(&svc, "ana", 10);
    let ledger = &svc.services.ledger;

    let err = ledger
        .add(ana, i64::MAX, CreditReason::Bonus { note: None })
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));

    assert_eq!(ledger.balance(ana).await.unwrap(), 10);
    let rows = svc.accounts.transactions_of(ana);
    assert_eq!(rows.len(), 1);
    assert_chain(&rows, 10);

    // The account stays usable
    ledger.add(ana, 5, CreditReason::Bonus { note: None }).await.unwrap();
    assert_chain(&svc.accounts.transactions_of(ana), 15);
}

#[tokio::test]
async fn negative_table_price_does_not_credit() {
    let svc = services();
    let ana = account(&svc, "ana", 10);
    svc.accounts.set_custom_price(ana, "fal-ai/flux-realism", -3);

    let err = svc
        .services
        .ledger
        .charge(ana, "fal-ai/flux-realism", None)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));
    assert_eq!(svc.services.ledger.balance(ana).await.unwrap(), 10);
    assert_eq!(svc.accounts.transactions_of(ana).len(), 1);
}

#[tokio::test]
async fn unknown_account_is_not_found() {
    let svc = services();
    let ledger = &svc.services.ledger;

    let err = ledger.charge(77, "fal-ai/fast-sdxl", None).await.unwrap_err();
    assert!(matches!(err, CoreError::NotFound { .. }));
    let err = ledger.balance(77).await.unwrap_err();
    assert!(matches!(err, CoreError::NotFound { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_charges_serialize() {
    const CHARGES: i64 = 50;
    let svc = services();
    let ana = account(&svc, "ana", 200);

    let handles: Vec<_> = (0..CHARGES)
        .map(|_| {
            let ledger = svc.services.ledger.clone();
            tokio::spawn(async move { ledger.charge(ana, "fal-ai/fast-sdxl", None).await })
        })
        .collect();
    for h in handles {
        h.await.unwrap().unwrap();
    }

    let balance = svc.services.ledger.balance(ana).await.unwrap();
    assert_eq!(balance, 200 - CHARGES);

    let rows = svc.accounts.transactions_of(ana);
    assert_eq!(rows.len() as i64, CHARGES + 1);
    assert_chain(&rows, balance);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn random_mixed_operations_keep_the_chain() {
    let svc = services();
    let ana = account(&svc, "ana", 500);

    let plan: Vec<i64> = {
        let mut rng = rand::thread_rng();
        (0..120)
            .map(|_| {
                let amount = rng.gen_range(1..=25);
                if rng.gen_bool(0.3) { amount } else { -amount }
            })
            .collect()
    };
    let expected = 500 + plan.iter().sum::<i64>();

    let handles: Vec<_> = plan
        .into_iter()
        .map(|delta| {
            let ledger = svc.services.ledger.clone();
            tokio::spawn(async move {
                if delta > 0 {
                    ledger
                        .add(ana, delta, CreditReason::Refund { note: None })
                        .await
                } else {
                    ledger.charge(ana, "fal-ai/fast-sdxl", Some(-delta)).await
                }
            })
        })
        .collect();
    for h in handles {
        h.await.unwrap().unwrap();
    }

    let balance = svc.services.ledger.balance(ana).await.unwrap();
    assert_eq!(balance, expected);
    assert_chain(&svc.accounts.transactions_of(ana), balance);
}

#[tokio::test]
async fn charging_a_uuid_caller_provisions_first() {
    let svc = services();
    svc.accounts
        .seed_uuid("Xc5vB6nM7qWe", Some("eve@example.com"), Some("Eve"), None);

    let receipt = svc
        .services
        .ledger
        .charge_caller(
            &CallerRef::Uuid("Xc5vB6nM7qWe".into()),
            "fal-ai/flux-realism",
            None,
        )
        .await
        .unwrap();

    assert_eq!(receipt.charged, 4);
    assert_eq!(receipt.new_balance, 996);
    assert_eq!(svc.accounts.legacy_count(), 1);

    let types: Vec<_> = svc
        .accounts
        .transactions_of(receipt.account_id)
        .into_iter()
        .map(|t| t.transaction_type)
        .collect();
    assert_eq!(types, vec!["initial_grant", "generation"]);

    let err = svc
        .services
        .ledger
        .charge_caller(&CallerRef::Anonymous, "fal-ai/flux-realism", None)
        .await
        .unwrap_err();
    assert!(err.is_retryable());
}

#[tokio::test]
async fn history_and_stats() {
    let svc = services();
    let ana = account(&svc, "ana", 0);
    let ledger = &svc.services.ledger;

    ledger
        .add(
            ana,
            500,
            CreditReason::Purchase {
                payment_ref: "pi_3Nx".into(),
                package: Some("starter".into()),
            },
        )
        .await
        .unwrap();
    ledger.charge(ana, "fal-ai/flux-realism", None).await.unwrap();
    ledger.charge(ana, "fal-ai/fast-sdxl", None).await.unwrap();
    ledger
        .add_for_caller(
            &CallerRef::Legacy(ana),
            20,
            CreditReason::Bonus {
                note: Some("launch week".into()),
            },
        )
        .await
        .unwrap();

    let stats = ledger.stats(ana).await.unwrap();
    assert_eq!(stats.balance, 515);
    assert_eq!(stats.total_purchased, 500);
    assert_eq!(stats.total_spent, 5);
    assert_eq!(stats.generation_count, 2);

    let page = ledger.history(ana, 2, 0).await.unwrap();
    assert_eq!(page.len(), 2);
    assert_eq!(page[0].transaction_type, "bonus");
    assert_eq!(page[0].description.as_deref(), Some("launch week"));
    assert_eq!(page[1].amount, -1);

    let rest = ledger.history(ana, 10, 2).await.unwrap();
    let types: Vec<_> = rest.iter().map(|t| t.transaction_type.as_str()).collect();
    assert_eq!(types, vec!["generation", "purchase", "initial_grant"]);

    assert!(ledger.history(ana, -1, 0).await.unwrap().is_empty());
}

//! End-to-end checkout and adjustment flows over the in-memory store.

#![allow(clippy::unwrap_used)] // Tests can unwrap
#![allow(clippy::expect_used)] // Tests can expect

use std::sync::Arc;
use stockpile_core::config::StockConfig;
use stockpile_core::error::StockError;
use stockpile_core::ledger::{AdjustmentReason, EntryReason, EntryType, replay};
use stockpile_core::reservation::ReservationStatus;
use stockpile_core::store::{AdjustmentFilter, Page, StockStore};
use stockpile_core::variant::{ActorId, OrderReference, StockLevels, Variant, VariantId};
use stockpile_service::{AdjustmentApi, Availability, InventoryQueries, ReservationManager};
use stockpile_testing::{InMemoryStockStore, init_test_tracing, test_clock};

struct Fixture {
    store: Arc<InMemoryStockStore>,
    manager: ReservationManager,
    adjustments: AdjustmentApi,
    queries: InventoryQueries,
}

async fn fixture(variants: &[(&str, u32)]) -> Fixture {
    init_test_tracing();
    let store = Arc::new(InMemoryStockStore::new());
    for (id, on_hand) in variants {
        store
            .put_variant(Variant::tracked(VariantId::new(*id), *on_hand))
            .await
            .unwrap();
    }
    let clock = Arc::new(test_clock());
    let store_dyn: Arc<dyn StockStore> = store.clone();
    Fixture {
        manager: ReservationManager::new(store_dyn.clone(), clock.clone(), StockConfig::default()),
        adjustments: AdjustmentApi::new(store_dyn.clone(), clock),
        queries: InventoryQueries::new(store_dyn),
        store,
    }
}

#[tokio::test]
async fn happy_path_reserve_then_commit() {
    let f = fixture(&[("tee-black-m", 10)]).await;
    let variant_id = VariantId::new("tee-black-m");

    let reservation = f.manager.reserve(&variant_id, 2).await.unwrap();
    assert_eq!(reservation.status, ReservationStatus::Active);
    assert_eq!(
        f.queries.available(&variant_id).await.unwrap(),
        Availability::Tracked {
            on_hand: 10,
            reserved: 2,
            available: 8
        }
    );

    f.manager
        .commit(reservation.id, OrderReference::new("order-1001"))
        .await
        .unwrap();

    let variant = f.store.variant(&variant_id).await.unwrap();
    assert_eq!(variant.levels, StockLevels::new(8, 0));

    let held = f.store.reservation(reservation.id).await.unwrap();
    assert_eq!(held.status, ReservationStatus::Committed);
    assert_eq!(held.order_reference, Some(OrderReference::new("order-1001")));

    // Two entries, newest first: the commit, then the reserve.
    let history = f.queries.history(&variant_id, Page::default()).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].entry_type, EntryType::Commit);
    assert_eq!(history[0].quantity_delta, -2);
    assert_eq!(history[0].reason, EntryReason::CheckoutCommit);
    assert_eq!(history[0].reference_id.as_deref(), Some("order-1001"));
    assert_eq!(history[0].resulting_levels(), StockLevels::new(8, 0));
    assert_eq!(history[1].entry_type, EntryType::Reserve);
    assert_eq!(history[1].quantity_delta, 2);
    assert_eq!(history[1].reason, EntryReason::CheckoutReserve);
    assert_eq!(history[1].resulting_levels(), StockLevels::new(10, 2));
}

#[tokio::test]
async fn release_returns_stock_and_is_idempotent() {
    let f = fixture(&[("tee-black-m", 5)]).await;
    let variant_id = VariantId::new("tee-black-m");

    let reservation = f.manager.reserve(&variant_id, 3).await.unwrap();
    f.manager.release(reservation.id).await.unwrap();

    let variant = f.store.variant(&variant_id).await.unwrap();
    assert_eq!(variant.levels, StockLevels::new(5, 0));
    let entries_after_first = f.store.entry_count();

    // Second release: same observable effect as one.
    f.manager.release(reservation.id).await.unwrap();
    assert_eq!(f.store.entry_count(), entries_after_first);
    let variant = f.store.variant(&variant_id).await.unwrap();
    assert_eq!(variant.levels, StockLevels::new(5, 0));
    assert_eq!(
        f.store.reservation(reservation.id).await.unwrap().status,
        ReservationStatus::Released
    );
}

#[tokio::test]
async fn commit_after_release_is_a_state_conflict() {
    let f = fixture(&[("tee-black-m", 5)]).await;
    let variant_id = VariantId::new("tee-black-m");

    let reservation = f.manager.reserve(&variant_id, 1).await.unwrap();
    f.manager.release(reservation.id).await.unwrap();

    let err = f
        .manager
        .commit(reservation.id, OrderReference::new("order-1"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StockError::InvalidReservationState {
            current: ReservationStatus::Released,
            ..
        }
    ));
}

#[tokio::test]
async fn oversell_rejection_two_buyers_one_unit() {
    let f = fixture(&[("mug-large", 1)]).await;
    let variant_id = VariantId::new("mug-large");

    let first = f.manager.reserve(&variant_id, 1).await;
    let second = f.manager.reserve(&variant_id, 1).await;

    assert!(first.is_ok());
    assert!(matches!(
        second.unwrap_err(),
        StockError::InsufficientStock {
            requested: 1,
            available: 0,
            ..
        }
    ));
    let variant = f.store.variant(&variant_id).await.unwrap();
    assert_eq!(variant.levels.reserved, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn no_oversell_under_concurrency() {
    let f = fixture(&[("tee-black-m", 5)]).await;
    let manager = Arc::new(f.manager);
    let variant_id = VariantId::new("tee-black-m");

    let mut handles = Vec::new();
    for _ in 0..20 {
        let manager = manager.clone();
        let variant_id = variant_id.clone();
        handles.push(tokio::spawn(async move {
            manager.reserve(&variant_id, 1).await
        }));
    }

    let mut successes = 0;
    let mut rejections = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(StockError::InsufficientStock { .. }) => rejections += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(successes, 5);
    assert_eq!(rejections, 15);
    let variant = f.store.variant(&variant_id).await.unwrap();
    assert_eq!(variant.levels, StockLevels::new(5, 5));
}

#[tokio::test]
async fn unknown_variant_and_unknown_reservation() {
    let f = fixture(&[]).await;
    let missing = VariantId::new("no-such-sku");

    assert!(matches!(
        f.manager.reserve(&missing, 1).await.unwrap_err(),
        StockError::UnknownVariant(_)
    ));
    assert!(matches!(
        f.queries.available(&missing).await.unwrap_err(),
        StockError::UnknownVariant(_)
    ));
    assert!(matches!(
        f.manager
            .release(stockpile_core::reservation::ReservationId::new())
            .await
            .unwrap_err(),
        StockError::UnknownReservation(_)
    ));
}

#[tokio::test]
async fn zero_quantity_is_rejected_before_the_store() {
    let f = fixture(&[("tee-black-m", 5)]).await;
    let variant_id = VariantId::new("tee-black-m");
    assert!(matches!(
        f.manager.reserve(&variant_id, 0).await.unwrap_err(),
        StockError::InvalidQuantity(0)
    ));
    let op = ActorId::new("op-1");
    assert!(matches!(
        f.adjustments
            .adjust(&variant_id, 0, AdjustmentReason::Correction, None, op)
            .await
            .unwrap_err(),
        StockError::InvalidQuantity(0)
    ));
}

#[tokio::test]
async fn untracked_variant_bypasses_counters_and_ledger() {
    let f = fixture(&[]).await;
    let variant_id = VariantId::new("gift-card");
    f.store
        .put_variant(Variant::untracked(variant_id.clone()))
        .await
        .unwrap();

    assert_eq!(
        f.queries.available(&variant_id).await.unwrap(),
        Availability::Untracked
    );

    // Far more than any tracked stock; always succeeds.
    let reservation = f.manager.reserve(&variant_id, 1_000).await.unwrap();
    assert_eq!(f.store.entry_count(), 0);

    f.manager
        .commit(reservation.id, OrderReference::new("order-7"))
        .await
        .unwrap();
    assert_eq!(f.store.entry_count(), 0);
    assert_eq!(
        f.store.reservation(reservation.id).await.unwrap().status,
        ReservationStatus::Committed
    );

    // Untracked variants stay out of the low-stock report.
    assert!(f.queries.stock_levels(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn adjustments_write_the_ledger_and_respect_reserved() {
    let f = fixture(&[("tee-black-m", 10)]).await;
    let variant_id = VariantId::new("tee-black-m");
    let op = ActorId::new("op-ana");

    f.adjustments
        .adjust(
            &variant_id,
            5,
            AdjustmentReason::Restock,
            Some("PO-220".to_string()),
            op.clone(),
        )
        .await
        .unwrap();
    f.manager.reserve(&variant_id, 12).await.unwrap();

    // 15 on hand, 12 reserved: removing 4 would leave 11 < 12.
    let err = f
        .adjustments
        .adjust(&variant_id, -4, AdjustmentReason::Damage, None, op.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, StockError::AdjustmentBelowReserved { .. }));

    f.adjustments
        .adjust(&variant_id, -3, AdjustmentReason::Damage, None, op.clone())
        .await
        .unwrap();
    let variant = f.store.variant(&variant_id).await.unwrap();
    assert_eq!(variant.levels, StockLevels::new(12, 12));

    // The adjustments view excludes checkout entries and honors filters.
    let all = f
        .queries
        .adjustments(AdjustmentFilter::default(), Page::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 2);
    assert!(all.iter().all(|e| e.entry_type == EntryType::Adjustment));
    assert!(all.iter().all(|e| e.actor_id == op));

    let damage_only = f
        .queries
        .adjustments(
            AdjustmentFilter {
                reason: Some(AdjustmentReason::Damage),
                ..AdjustmentFilter::default()
            },
            Page::default(),
        )
        .await
        .unwrap();
    assert_eq!(damage_only.len(), 1);
    assert_eq!(damage_only[0].quantity_delta, -3);
}

#[tokio::test]
async fn low_stock_report_flags_below_threshold() {
    let f = fixture(&[("tee-black-m", 2), ("mug-large", 50)]).await;
    f.manager
        .reserve(&VariantId::new("mug-large"), 45)
        .await
        .unwrap();

    fn low(report: &[stockpile_service::StockLevel], id: &str) -> bool {
        report
            .iter()
            .find(|r| r.variant_id.as_str() == id)
            .map(|r| r.is_low_stock)
            .unwrap_or_default()
    }

    let report = f.queries.stock_levels(10).await.unwrap();
    assert_eq!(report.len(), 2);
    assert!(low(&report, "tee-black-m")); // available 2
    assert!(low(&report, "mug-large")); // available 5

    let report = f.queries.stock_levels(3).await.unwrap();
    assert!(low(&report, "tee-black-m"));
    assert!(!low(&report, "mug-large"));
}

#[tokio::test]
async fn ledger_replay_reproduces_projector_counters() {
    let f = fixture(&[("tee-black-m", 0)]).await;
    let variant_id = VariantId::new("tee-black-m");
    let op = ActorId::new("op-1");

    f.adjustments
        .adjust(&variant_id, 20, AdjustmentReason::Restock, None, op.clone())
        .await
        .unwrap();
    let r1 = f.manager.reserve(&variant_id, 6).await.unwrap();
    let r2 = f.manager.reserve(&variant_id, 2).await.unwrap();
    f.manager
        .commit(r1.id, OrderReference::new("order-1"))
        .await
        .unwrap();
    f.manager.release(r2.id).await.unwrap();
    f.adjustments
        .adjust(&variant_id, -1, AdjustmentReason::Damage, None, op)
        .await
        .unwrap();

    let variant = f.store.variant(&variant_id).await.unwrap();
    assert_eq!(variant.levels, StockLevels::new(13, 0));

    // History is newest first; replay wants chronological order.
    let mut history = f
        .queries
        .history(&variant_id, Page::first(100))
        .await
        .unwrap();
    history.reverse();
    let replayed = replay(&variant_id, &history).unwrap();
    assert_eq!(replayed, variant.levels);
}

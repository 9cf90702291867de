//! Expiry sweep behavior: TTL enforcement, compare-and-swap races,
//! batch limits.

#![allow(clippy::unwrap_used)] // Tests can unwrap
#![allow(clippy::expect_used)] // Tests can expect

use chrono::TimeDelta;
use std::sync::Arc;
use stockpile_core::clock::Clock;
use stockpile_core::config::StockConfig;
use stockpile_core::error::StockError;
use stockpile_core::ledger::EntryReason;
use stockpile_core::reservation::ReservationStatus;
use stockpile_core::store::{Page, StockStore};
use stockpile_core::variant::{OrderReference, StockLevels, Variant, VariantId};
use stockpile_service::{ExpirySweep, ReservationManager, SweepOutcome};
use stockpile_testing::{InMemoryStockStore, SteppingClock, init_test_tracing, test_clock};

struct Fixture {
    store: Arc<InMemoryStockStore>,
    clock: Arc<SteppingClock>,
    manager: ReservationManager,
    sweep: ExpirySweep,
}

async fn fixture(config: StockConfig, variants: &[(&str, u32)]) -> Fixture {
    init_test_tracing();
    let store = Arc::new(InMemoryStockStore::new());
    for (id, on_hand) in variants {
        store
            .put_variant(Variant::tracked(VariantId::new(*id), *on_hand))
            .await
            .unwrap();
    }
    let clock = Arc::new(SteppingClock::new(test_clock().now()));
    let store_dyn: Arc<dyn StockStore> = store.clone();
    let manager = ReservationManager::new(store_dyn.clone(), clock.clone(), config);
    let (sweep, _shutdown) = ExpirySweep::new(store_dyn, clock.clone(), config);
    Fixture {
        store,
        clock,
        manager,
        sweep,
    }
}

#[tokio::test]
async fn stale_reservation_expires_and_returns_stock() {
    let f = fixture(StockConfig::default(), &[("tee-black-m", 10)]).await;
    let variant_id = VariantId::new("tee-black-m");

    let reservation = f.manager.reserve(&variant_id, 3).await.unwrap();
    assert_eq!(
        f.store.variant(&variant_id).await.unwrap().levels,
        StockLevels::new(10, 3)
    );

    // Within the TTL nothing is stale.
    f.clock.advance(TimeDelta::minutes(10));
    assert_eq!(f.sweep.run_once().await.unwrap(), SweepOutcome::default());

    // At t=20min the 15-minute hold is overdue.
    f.clock.advance(TimeDelta::minutes(10));
    let outcome = f.sweep.run_once().await.unwrap();
    assert_eq!(outcome.expired, 1);
    assert_eq!(outcome.lost_races, 0);

    assert_eq!(
        f.store.reservation(reservation.id).await.unwrap().status,
        ReservationStatus::Expired
    );
    assert_eq!(
        f.store.variant(&variant_id).await.unwrap().levels,
        StockLevels::new(10, 0)
    );

    let history = f.store.history(&variant_id, Page::default()).await.unwrap();
    assert_eq!(history[0].reason, EntryReason::ExpiryRelease);
    assert_eq!(history[0].quantity_delta, -3);
    assert_eq!(history[0].actor_id.as_str(), "system:sweep");
}

#[tokio::test]
async fn commit_after_expiry_is_rejected() {
    let f = fixture(StockConfig::default(), &[("tee-black-m", 5)]).await;
    let reservation = f
        .manager
        .reserve(&VariantId::new("tee-black-m"), 2)
        .await
        .unwrap();

    f.clock.advance(TimeDelta::minutes(30));
    assert_eq!(f.sweep.run_once().await.unwrap().expired, 1);

    let err = f
        .manager
        .commit(reservation.id, OrderReference::new("order-late"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StockError::InvalidReservationState {
            current: ReservationStatus::Expired,
            ..
        }
    ));

    // Release after expiry is the defensive no-op path.
    f.manager.release(reservation.id).await.unwrap();
}

#[tokio::test]
async fn sweep_skips_resolved_reservations() {
    let f = fixture(StockConfig::default(), &[("tee-black-m", 5)]).await;
    let variant_id = VariantId::new("tee-black-m");

    let committed = f.manager.reserve(&variant_id, 1).await.unwrap();
    let released = f.manager.reserve(&variant_id, 1).await.unwrap();
    let stale = f.manager.reserve(&variant_id, 1).await.unwrap();

    f.manager
        .commit(committed.id, OrderReference::new("order-1"))
        .await
        .unwrap();
    f.manager.release(released.id).await.unwrap();

    f.clock.advance(TimeDelta::minutes(30));
    let outcome = f.sweep.run_once().await.unwrap();
    assert_eq!(outcome.expired, 1);

    assert_eq!(
        f.store.reservation(stale.id).await.unwrap().status,
        ReservationStatus::Expired
    );
    assert_eq!(
        f.store.variant(&variant_id).await.unwrap().levels,
        StockLevels::new(4, 0)
    );
}

#[tokio::test]
async fn sweep_honors_batch_limit() {
    let config = StockConfig::default().with_sweep_batch_limit(2);
    let f = fixture(config, &[("tee-black-m", 10)]).await;
    let variant_id = VariantId::new("tee-black-m");

    for _ in 0..5 {
        f.manager.reserve(&variant_id, 1).await.unwrap();
    }
    f.clock.advance(TimeDelta::minutes(30));

    assert_eq!(f.sweep.run_once().await.unwrap().expired, 2);
    assert_eq!(f.sweep.run_once().await.unwrap().expired, 2);
    assert_eq!(f.sweep.run_once().await.unwrap().expired, 1);
    assert_eq!(f.sweep.run_once().await.unwrap().expired, 0);

    assert_eq!(
        f.store.variant(&variant_id).await.unwrap().levels,
        StockLevels::new(10, 0)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_commit_and_sweep_have_exactly_one_winner() {
    // Repeat the race; whichever side wins, the loser must observe a
    // terminal state and the counters must end consistent.
    for _ in 0..20 {
        let f = fixture(StockConfig::default(), &[("tee-black-m", 4)]).await;
        let variant_id = VariantId::new("tee-black-m");
        let reservation = f.manager.reserve(&variant_id, 4).await.unwrap();
        f.clock.advance(TimeDelta::minutes(30));

        let manager = Arc::new(f.manager);
        let sweep = Arc::new(f.sweep);
        let commit_handle = {
            let manager = manager.clone();
            tokio::spawn(async move {
                manager
                    .commit(reservation.id, OrderReference::new("order-race"))
                    .await
            })
        };
        let sweep_handle = {
            let sweep = sweep.clone();
            tokio::spawn(async move { sweep.run_once().await })
        };

        let commit_result = commit_handle.await.unwrap();
        let sweep_outcome = sweep_handle.await.unwrap().unwrap();

        let status = f.store.reservation(reservation.id).await.unwrap().status;
        let levels = f.store.variant(&variant_id).await.unwrap().levels;
        match commit_result {
            Ok(()) => {
                assert_eq!(status, ReservationStatus::Committed);
                assert_eq!(sweep_outcome.expired, 0);
                assert_eq!(levels, StockLevels::new(0, 0));
            }
            Err(StockError::InvalidReservationState { current, .. }) => {
                assert_eq!(current, ReservationStatus::Expired);
                assert_eq!(status, ReservationStatus::Expired);
                assert_eq!(sweep_outcome.expired, 1);
                assert_eq!(levels, StockLevels::new(4, 0));
            }
            Err(other) => panic!("unexpected commit error: {other}"),
        }
        // Either way the hold is resolved and nothing stays reserved.
        assert_eq!(levels.reserved, 0);
    }
}

#[tokio::test]
async fn untracked_holds_expire_without_ledger_entries() {
    let f = fixture(StockConfig::default(), &[]).await;
    let variant_id = VariantId::new("gift-card");
    f.store
        .put_variant(Variant::untracked(variant_id.clone()))
        .await
        .unwrap();

    let reservation = f.manager.reserve(&variant_id, 3).await.unwrap();
    f.clock.advance(TimeDelta::minutes(30));
    assert_eq!(f.sweep.run_once().await.unwrap().expired, 1);
    assert_eq!(
        f.store.reservation(reservation.id).await.unwrap().status,
        ReservationStatus::Expired
    );
    assert_eq!(f.store.entry_count(), 0);
}

//! Checkout-facing reservation lifecycle.

use chrono::TimeDelta;
use std::sync::Arc;
use stockpile_core::clock::Clock;
use stockpile_core::config::StockConfig;
use stockpile_core::error::StockError;
use stockpile_core::reservation::{Reservation, ReservationId, Resolution};
use stockpile_core::store::{ReserveRequest, StockStore};
use stockpile_core::variant::{ActorId, OrderReference, VariantId};

/// Creates time-bounded holds against available stock during checkout and
/// resolves them on payment outcome.
///
/// The manager is intentionally thin: atomicity lives in the store, and the
/// manager adds TTL stamping, system-actor attribution, and the idempotency
/// policy for releases. No hidden session state; callers pass everything
/// per call.
pub struct ReservationManager {
    store: Arc<dyn StockStore>,
    clock: Arc<dyn Clock>,
    ttl: TimeDelta,
}

impl ReservationManager {
    /// Create a manager over a store and clock.
    #[must_use]
    pub fn new(store: Arc<dyn StockStore>, clock: Arc<dyn Clock>, config: StockConfig) -> Self {
        Self {
            store,
            clock,
            ttl: config.reservation_ttl,
        }
    }

    /// Place a hold on `quantity` units of a variant.
    ///
    /// On success the reservation is `active` with
    /// `expires_at = now + TTL`. For untracked variants the hold always
    /// succeeds and touches neither counters nor ledger.
    ///
    /// # Errors
    ///
    /// - [`StockError::InvalidQuantity`]: zero quantity
    /// - [`StockError::UnknownVariant`]: no such variant
    /// - [`StockError::InsufficientStock`]: not enough available stock.
    ///   A hard fail, not retried here: the customer must be told
    ///   immediately
    /// - [`StockError::Storage`]: persistence failure, nothing written
    pub async fn reserve(
        &self,
        variant_id: &VariantId,
        quantity: u32,
    ) -> Result<Reservation, StockError> {
        if quantity == 0 {
            return Err(StockError::InvalidQuantity(0));
        }
        let now = self.clock.now();
        let request = ReserveRequest {
            reservation_id: ReservationId::new(),
            variant_id: variant_id.clone(),
            quantity,
            actor_id: ActorId::system("checkout"),
            now,
            expires_at: now + self.ttl,
        };

        match self.store.reserve(request).await {
            Ok(reservation) => {
                tracing::debug!(
                    reservation_id = %reservation.id,
                    variant_id = %reservation.variant_id,
                    quantity = reservation.quantity,
                    expires_at = %reservation.expires_at,
                    "Reservation created"
                );
                Ok(reservation)
            }
            Err(error) => {
                if matches!(error, StockError::InsufficientStock { .. }) {
                    metrics::counter!("stock.reserve.rejected").increment(1);
                    tracing::info!(
                        variant_id = %variant_id,
                        quantity = quantity,
                        "Reserve rejected: insufficient stock"
                    );
                }
                Err(error)
            }
        }
    }

    /// Finalize a hold into a permanent stock reduction after payment
    /// confirmation.
    ///
    /// # Errors
    ///
    /// - [`StockError::UnknownReservation`]: no such reservation
    /// - [`StockError::InvalidReservationState`]: the hold is already
    ///   terminal (e.g. expired by the sweep, or already committed).
    ///   Callers should treat this as idempotent success when the current
    ///   status matches their intent, and as a conflict otherwise
    /// - [`StockError::Storage`]: persistence failure; neither the status
    ///   transition nor the ledger entry took effect
    pub async fn commit(
        &self,
        reservation_id: ReservationId,
        order_reference: OrderReference,
    ) -> Result<(), StockError> {
        self.store
            .resolve_reservation(
                reservation_id,
                Resolution::Commit,
                Some(order_reference.clone()),
                ActorId::system("checkout"),
                self.clock.now(),
            )
            .await?;
        tracing::debug!(
            reservation_id = %reservation_id,
            order_reference = %order_reference,
            "Reservation committed"
        );
        Ok(())
    }

    /// Cancel a hold, returning its quantity to available stock.
    ///
    /// Idempotent: releasing an already-terminal reservation is a no-op,
    /// not an error - checkout flows call release defensively on multiple
    /// failure paths.
    ///
    /// # Errors
    ///
    /// - [`StockError::UnknownReservation`]: no such reservation
    /// - [`StockError::Storage`]: persistence failure, nothing written
    pub async fn release(&self, reservation_id: ReservationId) -> Result<(), StockError> {
        let result = self
            .store
            .resolve_reservation(
                reservation_id,
                Resolution::Release,
                None,
                ActorId::system("checkout"),
                self.clock.now(),
            )
            .await;
        match result {
            Ok(_) => {
                tracing::debug!(reservation_id = %reservation_id, "Reservation released");
                Ok(())
            }
            Err(StockError::InvalidReservationState { current, .. }) => {
                tracing::debug!(
                    reservation_id = %reservation_id,
                    current = %current,
                    "Release on terminal reservation; no-op"
                );
                Ok(())
            }
            Err(error) => Err(error),
        }
    }
}

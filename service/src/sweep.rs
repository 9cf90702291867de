//! Background expiry of stale reservations.

use std::sync::Arc;
use stockpile_core::clock::Clock;
use stockpile_core::config::StockConfig;
use stockpile_core::error::StockError;
use stockpile_core::reservation::Resolution;
use stockpile_core::store::StockStore;
use stockpile_core::variant::ActorId;
use tokio::sync::watch;

/// What one sweep pass did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    /// Reservations transitioned `active -> expired`.
    pub expired: usize,
    /// Compare-and-swap races lost to a concurrent commit/release between
    /// selection and execution. Expected, not errors.
    pub lost_races: usize,
}

/// Periodic background pass that expires reservations whose TTL has passed,
/// returning their stock to the pool.
///
/// Each candidate goes through the store's compare-and-swap transition, so
/// a reservation the customer commits or releases in the window between
/// selection and execution simply loses the race safely: exactly one of
/// {sweep, checkout flow} transitions the state, and the other observes a
/// non-active status and no-ops.
///
/// # Example
///
/// ```ignore
/// let (sweep, shutdown) = ExpirySweep::new(store, clock, config);
/// let handle = tokio::spawn(sweep.run());
///
/// // In a signal handler:
/// shutdown.send(true).ok();
/// ```
pub struct ExpirySweep {
    store: Arc<dyn StockStore>,
    clock: Arc<dyn Clock>,
    config: StockConfig,
    shutdown: watch::Receiver<bool>,
}

impl ExpirySweep {
    /// Create a sweep over a store and clock.
    ///
    /// Returns the sweep and a shutdown sender. Send `true` to stop
    /// [`ExpirySweep::run`] gracefully.
    #[must_use]
    pub fn new(
        store: Arc<dyn StockStore>,
        clock: Arc<dyn Clock>,
        config: StockConfig,
    ) -> (Self, watch::Sender<bool>) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let sweep = Self {
            store,
            clock,
            config,
            shutdown: shutdown_rx,
        };
        (sweep, shutdown_tx)
    }

    /// Run sweep passes on the configured interval until shutdown.
    ///
    /// A failing pass is logged and retried on the next tick; transient
    /// storage errors must not kill the background task.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.config.sweep_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        tracing::info!(
            interval_secs = self.config.sweep_interval.as_secs(),
            batch_limit = self.config.sweep_batch_limit,
            "Expiry sweep started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.run_once().await {
                        Ok(outcome) if outcome.expired > 0 => {
                            tracing::info!(
                                expired = outcome.expired,
                                lost_races = outcome.lost_races,
                                "Sweep pass expired stale reservations"
                            );
                        }
                        Ok(_) => {}
                        Err(error) => {
                            tracing::error!(error = %error, "Sweep pass failed; will retry");
                        }
                    }
                }
                _ = self.shutdown.changed() => {
                    if *self.shutdown.borrow() {
                        tracing::info!("Expiry sweep shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Run a single sweep pass: select stale active reservations and expire
    /// each via compare-and-swap.
    ///
    /// Exposed separately so tests can drive the sweep deterministically
    /// with a stepping clock.
    ///
    /// # Errors
    ///
    /// Returns [`StockError`] only for the candidate selection query;
    /// per-reservation failures are counted or logged and do not abort the
    /// pass.
    pub async fn run_once(&self) -> Result<SweepOutcome, StockError> {
        let now = self.clock.now();
        let stale = self
            .store
            .expired_active(now, self.config.sweep_batch_limit)
            .await?;

        let mut outcome = SweepOutcome::default();
        for reservation in stale {
            let result = self
                .store
                .resolve_reservation(
                    reservation.id,
                    Resolution::Expire,
                    None,
                    ActorId::system("sweep"),
                    now,
                )
                .await;
            match result {
                Ok(_) => {
                    outcome.expired += 1;
                    metrics::counter!("stock.sweep.expired").increment(1);
                    tracing::debug!(
                        reservation_id = %reservation.id,
                        variant_id = %reservation.variant_id,
                        quantity = reservation.quantity,
                        "Reservation expired"
                    );
                }
                Err(StockError::InvalidReservationState { current, .. }) => {
                    // The checkout flow won the race after we selected the
                    // candidate. Expected; not an error.
                    outcome.lost_races += 1;
                    tracing::debug!(
                        reservation_id = %reservation.id,
                        current = %current,
                        "Sweep lost resolution race; no-op"
                    );
                }
                Err(error) => {
                    tracing::warn!(
                        reservation_id = %reservation.id,
                        error = %error,
                        "Failed to expire reservation; leaving for next pass"
                    );
                }
            }
        }
        Ok(outcome)
    }
}

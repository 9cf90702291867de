//! The `StockStore` trait: the transactional persistence seam.
//!
//! # Design
//!
//! Every write method is ONE atomic transaction and the sole serialization
//! point for a variant's counters: lock/read the counter row, compute the
//! new values through [`crate::variant::Variant::apply`], write the
//! counters, append the ledger row with its resulting snapshot,
//! all-or-nothing. Concurrent writers against the same variant serialize on
//! this path; that is the crux of oversell prevention. The lock is never
//! held across external I/O.
//!
//! Reads never block writers.
//!
//! # Implementations
//!
//! - `PostgresStockStore` (in `stockpile-postgres`): production, row-level
//!   `FOR UPDATE` locking
//! - `InMemoryStockStore` (in `stockpile-testing`): mutex-serialized,
//!   deterministic
//!
//! # Dyn Compatibility
//!
//! This trait uses explicit `Pin<Box<dyn Future>>` returns instead of
//! `async fn` to enable trait object usage (`Arc<dyn StockStore>`), which
//! the services and the background sweep rely on.

use crate::error::StockError;
use crate::ledger::{AdjustmentReason, LedgerEntry};
use crate::reservation::{Reservation, ReservationId, Resolution};
use crate::variant::{ActorId, OrderReference, Variant, VariantId};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;

/// A manual stock correction, as passed to
/// [`StockStore::apply_adjustment`].
#[derive(Clone, Debug)]
pub struct AdjustmentRequest {
    /// The variant to adjust.
    pub variant_id: VariantId,
    /// Signed change to `on_hand`; positive for restock/return, negative
    /// for damage/correction.
    pub quantity_delta: i64,
    /// Operator-facing reason from the fixed enum.
    pub reason: AdjustmentReason,
    /// Optional free-text notes for the ledger.
    pub notes: Option<String>,
    /// The operator making the correction.
    pub actor_id: ActorId,
    /// Timestamp to record (from the caller's [`crate::clock::Clock`]).
    pub now: DateTime<Utc>,
}

/// A checkout hold request, as passed to [`StockStore::reserve`].
#[derive(Clone, Debug)]
pub struct ReserveRequest {
    /// Caller-generated reservation identity.
    pub reservation_id: ReservationId,
    /// The variant to hold stock of.
    pub variant_id: VariantId,
    /// Units to hold; must be positive.
    pub quantity: u32,
    /// Actor recorded on the ledger entry (normally the checkout system
    /// actor).
    pub actor_id: ActorId,
    /// Creation timestamp.
    pub now: DateTime<Utc>,
    /// `now` + TTL; past this the sweep may expire the hold.
    pub expires_at: DateTime<Utc>,
}

/// Pagination window for ledger reads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Page {
    /// Rows to skip.
    pub offset: usize,
    /// Maximum rows to return.
    pub limit: usize,
}

impl Page {
    /// First page with the given limit.
    #[must_use]
    pub const fn first(limit: usize) -> Self {
        Self { offset: 0, limit }
    }
}

impl Default for Page {
    /// First 50 rows.
    fn default() -> Self {
        Self::first(50)
    }
}

/// Filters for [`StockStore::adjustments`]. All fields are conjunctive;
/// `None` means "any".
#[derive(Clone, Debug, Default)]
pub struct AdjustmentFilter {
    /// Restrict to one variant.
    pub variant_id: Option<VariantId>,
    /// Restrict to one operator.
    pub actor_id: Option<ActorId>,
    /// Restrict to one adjustment reason.
    pub reason: Option<AdjustmentReason>,
}

impl AdjustmentFilter {
    /// Restrict to one variant.
    #[must_use]
    pub fn with_variant(mut self, variant_id: VariantId) -> Self {
        self.variant_id = Some(variant_id);
        self
    }

    /// Restrict to one operator.
    #[must_use]
    pub fn with_actor(mut self, actor_id: ActorId) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    /// Restrict to one adjustment reason.
    #[must_use]
    pub const fn with_reason(mut self, reason: AdjustmentReason) -> Self {
        self.reason = Some(reason);
        self
    }
}

/// Persistence abstraction for stock state: counters, ledger, reservations.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; multiple checkout flows for the
/// same or different variants execute in parallel and must be correct under
/// arbitrary interleaving.
pub trait StockStore: Send + Sync {
    /// Seed or update a variant row (identity, `track_inventory` flag, and
    /// for a new variant its starting counters).
    ///
    /// This is collaborator-facing glue: product CRUD itself is out of
    /// scope, but the stock subsystem has to learn that a variant exists.
    ///
    /// # Errors
    ///
    /// - [`StockError::Storage`]: persistence failed
    fn put_variant(
        &self,
        variant: Variant,
    ) -> Pin<Box<dyn Future<Output = Result<(), StockError>> + Send + '_>>;

    /// Read a variant with its current counters.
    ///
    /// # Errors
    ///
    /// - [`StockError::UnknownVariant`]: no such variant
    /// - [`StockError::Storage`]: persistence failed
    fn variant(
        &self,
        variant_id: &VariantId,
    ) -> Pin<Box<dyn Future<Output = Result<Variant, StockError>> + Send + '_>>;

    /// Apply a manual adjustment: one transaction covering the counter
    /// update and the ledger append.
    ///
    /// Adjustments never check `available` - they change `on_hand` directly
    /// - but may not drop it below `reserved`.
    ///
    /// # Errors
    ///
    /// - [`StockError::UnknownVariant`]: no such variant
    /// - [`StockError::AdjustmentBelowReserved`]: would make `available`
    ///   negative
    /// - [`StockError::InvalidQuantity`]: zero delta or out of range
    /// - [`StockError::Storage`]: persistence failed, nothing written
    fn apply_adjustment(
        &self,
        request: AdjustmentRequest,
    ) -> Pin<Box<dyn Future<Output = Result<LedgerEntry, StockError>> + Send + '_>>;

    /// Place a checkout hold: one transaction covering the availability
    /// check, counter update, ledger append, and reservation insert.
    ///
    /// For variants with `track_inventory = false`, only the reservation
    /// row is inserted - no counter change, no ledger entry - and the hold
    /// always succeeds.
    ///
    /// # Errors
    ///
    /// - [`StockError::UnknownVariant`]: no such variant
    /// - [`StockError::InsufficientStock`]: would drive `available`
    ///   negative; the caller must surface this as "out of stock", never
    ///   silently partially reserve
    /// - [`StockError::InvalidQuantity`]: zero quantity
    /// - [`StockError::Storage`]: persistence failed, nothing written
    fn reserve(
        &self,
        request: ReserveRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Reservation, StockError>> + Send + '_>>;

    /// Perform a terminal reservation transition: compare-and-swap the
    /// status from `active` and append the matching ledger entry, in one
    /// transaction. If either part fails, neither takes effect.
    ///
    /// `order_reference` is recorded on commit (and on the reservation row)
    /// for traceability; pass `None` for release/expiry. `actor_id` is the
    /// system component acting (checkout or sweep).
    ///
    /// Returns the ledger entry, or `None` for untracked variants (which
    /// have no counters to move).
    ///
    /// # Errors
    ///
    /// - [`StockError::UnknownReservation`]: no such reservation
    /// - [`StockError::InvalidReservationState`]: the compare-and-swap lost
    ///   - the reservation is already terminal. Expected under racing
    ///     callers; exactly one of {checkout flow, sweep} wins
    /// - [`StockError::Storage`]: persistence failed, nothing written
    fn resolve_reservation(
        &self,
        reservation_id: ReservationId,
        resolution: Resolution,
        order_reference: Option<OrderReference>,
        actor_id: ActorId,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<Option<LedgerEntry>, StockError>> + Send + '_>>;

    /// Read a reservation by id.
    ///
    /// # Errors
    ///
    /// - [`StockError::UnknownReservation`]: no such reservation
    /// - [`StockError::Storage`]: persistence failed
    fn reservation(
        &self,
        reservation_id: ReservationId,
    ) -> Pin<Box<dyn Future<Output = Result<Reservation, StockError>> + Send + '_>>;

    /// All tracked variants with their current counters, for the low-stock
    /// report.
    ///
    /// # Errors
    ///
    /// - [`StockError::Storage`]: persistence failed
    fn stock_levels(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Variant>, StockError>> + Send + '_>>;

    /// A variant's ledger history, newest first.
    ///
    /// # Errors
    ///
    /// - [`StockError::Storage`]: persistence failed
    fn history(
        &self,
        variant_id: &VariantId,
        page: Page,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<LedgerEntry>, StockError>> + Send + '_>>;

    /// Manual adjustment entries matching `filter`, newest first.
    ///
    /// # Errors
    ///
    /// - [`StockError::Storage`]: persistence failed
    fn adjustments(
        &self,
        filter: AdjustmentFilter,
        page: Page,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<LedgerEntry>, StockError>> + Send + '_>>;

    /// Reservations still `active` whose `expires_at` has passed, oldest
    /// first, capped at `limit`. Sweep candidates; the actual expiry still
    /// goes through [`StockStore::resolve_reservation`]'s compare-and-swap,
    /// so a hold the customer resolves between selection and execution
    /// simply loses the race safely.
    ///
    /// # Errors
    ///
    /// - [`StockError::Storage`]: persistence failed
    fn expired_active(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Reservation>, StockError>> + Send + '_>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_page_is_first_fifty() {
        let page = Page::default();
        assert_eq!(page.offset, 0);
        assert_eq!(page.limit, 50);
    }

    #[test]
    fn empty_filter_matches_anything() {
        let filter = AdjustmentFilter::default();
        assert!(filter.variant_id.is_none());
        assert!(filter.actor_id.is_none());
        assert!(filter.reason.is_none());
    }
}

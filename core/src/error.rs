//! Error taxonomy for stock operations.

use crate::reservation::{ReservationId, ReservationStatus};
use crate::variant::VariantId;
use thiserror::Error;

/// Errors that can occur during stock operations.
///
/// The first five variants are business outcomes, recovered locally by the
/// caller (checkout flow, admin UI) into user-facing messages; none should
/// crash a process. [`StockError::Storage`] is the generic persistence
/// failure: the whole transaction was aborted, nothing partial was written,
/// and the caller may retry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StockError {
    /// A reserve requested more units than are available. Hard fail, not
    /// retried automatically: the customer must be told immediately.
    #[error("Insufficient stock for {variant_id}: requested {requested}, available {available}")]
    InsufficientStock {
        /// The variant that could not cover the request.
        variant_id: VariantId,
        /// Units requested.
        requested: u32,
        /// Units actually available at the time of the attempt.
        available: u32,
    },

    /// The referenced variant does not exist; a configuration/data error.
    #[error("Unknown variant: {0}")]
    UnknownVariant(VariantId),

    /// The referenced reservation does not exist. Distinct from
    /// [`StockError::InvalidReservationState`]: a dangling id is a data
    /// error, a lost compare-and-swap race is expected control flow.
    #[error("Unknown reservation: {0}")]
    UnknownReservation(ReservationId),

    /// Commit/release/expiry attempted on a non-active reservation. The
    /// caller must treat this as idempotent success if `current` matches its
    /// intent, otherwise surface a conflict.
    #[error("Reservation {reservation_id} is {current}, not active")]
    InvalidReservationState {
        /// The reservation that was already resolved.
        reservation_id: ReservationId,
        /// Its current (terminal) status.
        current: ReservationStatus,
    },

    /// A manual adjustment would drop `on_hand` below `reserved`, making
    /// `available` negative. The operator must resolve outstanding
    /// reservations first or use a smaller adjustment.
    #[error(
        "Adjustment on {variant_id} would leave on_hand at {on_hand_after}, below reserved {reserved}"
    )]
    AdjustmentBelowReserved {
        /// The variant being adjusted.
        variant_id: VariantId,
        /// Where `on_hand` would have landed.
        on_hand_after: i64,
        /// Outstanding reserved units.
        reserved: u32,
    },

    /// An operator-supplied reason outside the fixed adjustment enum.
    #[error("Unknown adjustment reason: {0}")]
    UnknownAdjustmentReason(String),

    /// A quantity that makes no sense for the operation: zero, the wrong
    /// sign for the entry type, or outside the counter range.
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(i64),

    /// Unexpected persistence failure (lock timeout, connection loss).
    /// The transaction was aborted whole: no partial counter update, no
    /// orphan ledger row.
    #[error("Storage error: {0}")]
    Storage(String),
}

//! Checkout-time stock holds and their state machine.
//!
//! A [`Reservation`] is created `active` and leaves that state through
//! exactly one terminal transition: committed, released, or expired. The
//! transition is a compare-and-swap in the store, so a checkout flow and the
//! expiry sweep can race on the same reservation and exactly one wins; the
//! loser observes a non-active status.

use crate::ledger::EntryReason;
use crate::variant::{OrderReference, VariantId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a reservation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReservationId(Uuid);

impl ReservationId {
    /// Creates a new random `ReservationId`.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a `ReservationId` from a UUID.
    #[must_use]
    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Returns the inner UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ReservationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a reservation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReservationStatus {
    /// Hold is live; stock is reserved (for tracked variants).
    Active,
    /// Payment confirmed; the hold became a permanent stock reduction.
    Committed,
    /// Checkout released the hold.
    Released,
    /// The sweep expired the hold after its TTL passed.
    Expired,
}

impl ReservationStatus {
    /// Whether this is a terminal state (anything but `Active`).
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }

    /// Database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Committed => "committed",
            Self::Released => "released",
            Self::Expired => "expired",
        }
    }

    /// Parse from the database string representation.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::StockError::Storage`] if the string doesn't
    /// match a known status.
    pub fn parse(s: &str) -> Result<Self, crate::error::StockError> {
        match s {
            "active" => Ok(Self::Active),
            "committed" => Ok(Self::Committed),
            "released" => Ok(Self::Released),
            "expired" => Ok(Self::Expired),
            _ => Err(crate::error::StockError::Storage(format!(
                "invalid reservation status: {s}"
            ))),
        }
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The terminal transition a caller is asking the store to perform.
///
/// Restricting the store's compare-and-swap to this enum (rather than
/// [`ReservationStatus`]) means `active → active` cannot be expressed, and
/// each transition carries its ledger reason so they cannot be mismatched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resolution {
    /// Finalize the hold into a sale.
    Commit,
    /// Cancel the hold, returning stock to the pool.
    Release,
    /// Sweep-initiated expiry of a stale hold.
    Expire,
}

impl Resolution {
    /// The status the reservation ends up in.
    #[must_use]
    pub const fn target_status(&self) -> ReservationStatus {
        match self {
            Self::Commit => ReservationStatus::Committed,
            Self::Release => ReservationStatus::Released,
            Self::Expire => ReservationStatus::Expired,
        }
    }

    /// The reason recorded on the resulting ledger entry.
    #[must_use]
    pub const fn reason(&self) -> EntryReason {
        match self {
            Self::Commit => EntryReason::CheckoutCommit,
            Self::Release => EntryReason::CheckoutRelease,
            Self::Expire => EntryReason::ExpiryRelease,
        }
    }
}

/// A time-bounded hold on stock created at checkout start.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    /// Unique identifier.
    pub id: ReservationId,
    /// The variant the hold is against.
    pub variant_id: VariantId,
    /// Units held.
    pub quantity: u32,
    /// Current lifecycle state.
    pub status: ReservationStatus,
    /// When the hold was created.
    pub created_at: DateTime<Utc>,
    /// `created_at` + TTL; past this instant the sweep may expire the hold.
    pub expires_at: DateTime<Utc>,
    /// Set at commit time by the fulfillment collaborator.
    pub order_reference: Option<OrderReference>,
}

impl Reservation {
    /// Whether the hold's TTL has passed at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use chrono::TimeDelta;

    #[test]
    fn status_round_trips() {
        for s in [
            ReservationStatus::Active,
            ReservationStatus::Committed,
            ReservationStatus::Released,
            ReservationStatus::Expired,
        ] {
            assert_eq!(ReservationStatus::parse(s.as_str()).unwrap(), s);
        }
        assert!(ReservationStatus::parse("pending").is_err());
    }

    #[test]
    fn only_active_is_non_terminal() {
        assert!(!ReservationStatus::Active.is_terminal());
        assert!(ReservationStatus::Committed.is_terminal());
        assert!(ReservationStatus::Released.is_terminal());
        assert!(ReservationStatus::Expired.is_terminal());
    }

    #[test]
    fn resolution_pairs_status_and_reason() {
        assert_eq!(
            Resolution::Commit.target_status(),
            ReservationStatus::Committed
        );
        assert_eq!(Resolution::Commit.reason(), EntryReason::CheckoutCommit);
        assert_eq!(Resolution::Expire.reason(), EntryReason::ExpiryRelease);
    }

    #[test]
    fn expiry_is_strict() {
        let created = Utc::now();
        let reservation = Reservation {
            id: ReservationId::new(),
            variant_id: VariantId::new("tee-black-m"),
            quantity: 2,
            status: ReservationStatus::Active,
            created_at: created,
            expires_at: created + TimeDelta::minutes(15),
            order_reference: None,
        };
        assert!(!reservation.is_expired_at(created + TimeDelta::minutes(15)));
        assert!(reservation.is_expired_at(created + TimeDelta::minutes(20)));
    }
}

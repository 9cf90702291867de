//! The append-only stock ledger.
//!
//! Every quantity change (adjustment, reservation, commit, release) is
//! recorded as an immutable [`LedgerEntry`]. Entries are never mutated or
//! deleted; corrections are new entries. Each entry snapshots the resulting
//! counters so an auditor can follow the history without replaying it, and
//! [`replay`] rebuilds the counters from scratch for reconciliation.

use crate::error::StockError;
use crate::variant::{ActorId, StockLevels, Variant, VariantId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a ledger entry, assigned by the store in append
/// order (BIGSERIAL in postgres, an atomic sequence in memory).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntryId(i64);

impl EntryId {
    /// Create an `EntryId` from its raw value.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// The raw value.
    #[must_use]
    pub const fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a ledger entry affects the counters.
///
/// `Release` covers both checkout releases and sweep expiries; the
/// [`EntryReason`] distinguishes them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryType {
    /// Manual correction to `on_hand` (positive or negative).
    Adjustment,
    /// Checkout hold: `reserved` increases.
    Reserve,
    /// Finalized sale: `on_hand` and `reserved` both decrease.
    Commit,
    /// Hold cancelled or expired: `reserved` decreases.
    Release,
}

impl EntryType {
    /// Database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Adjustment => "adjustment",
            Self::Reserve => "reserve",
            Self::Commit => "commit",
            Self::Release => "release",
        }
    }

    /// Parse from the database string representation.
    ///
    /// # Errors
    ///
    /// Returns [`StockError::Storage`] if the string doesn't match a known
    /// entry type.
    pub fn parse(s: &str) -> Result<Self, StockError> {
        match s {
            "adjustment" => Ok(Self::Adjustment),
            "reserve" => Ok(Self::Reserve),
            "commit" => Ok(Self::Commit),
            "release" => Ok(Self::Release),
            _ => Err(StockError::Storage(format!("invalid entry type: {s}"))),
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a ledger entry exists.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryReason {
    /// Operator correction with no more specific reason.
    ManualAdjustment,
    /// New stock received.
    Restock,
    /// Count correction after a physical stocktake.
    Correction,
    /// Units damaged or written off.
    Damage,
    /// Customer return added back to stock.
    Return,
    /// Checkout placed a hold.
    CheckoutReserve,
    /// Payment confirmed, hold finalized.
    CheckoutCommit,
    /// Checkout released its hold (payment failure, cart removal).
    CheckoutRelease,
    /// The sweep expired a stale hold.
    ExpiryRelease,
}

impl EntryReason {
    /// Database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ManualAdjustment => "manual_adjustment",
            Self::Restock => "restock",
            Self::Correction => "correction",
            Self::Damage => "damage",
            Self::Return => "return",
            Self::CheckoutReserve => "checkout_reserve",
            Self::CheckoutCommit => "checkout_commit",
            Self::CheckoutRelease => "checkout_release",
            Self::ExpiryRelease => "expiry_release",
        }
    }

    /// Parse from the database string representation.
    ///
    /// # Errors
    ///
    /// Returns [`StockError::Storage`] if the string doesn't match a known
    /// reason.
    pub fn parse(s: &str) -> Result<Self, StockError> {
        match s {
            "manual_adjustment" => Ok(Self::ManualAdjustment),
            "restock" => Ok(Self::Restock),
            "correction" => Ok(Self::Correction),
            "damage" => Ok(Self::Damage),
            "return" => Ok(Self::Return),
            "checkout_reserve" => Ok(Self::CheckoutReserve),
            "checkout_commit" => Ok(Self::CheckoutCommit),
            "checkout_release" => Ok(Self::CheckoutRelease),
            "expiry_release" => Ok(Self::ExpiryRelease),
            _ => Err(StockError::Storage(format!("invalid entry reason: {s}"))),
        }
    }
}

impl fmt::Display for EntryReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The operator-facing subset of reasons accepted by the adjustment API.
///
/// Using a closed enum makes "reject unrecognized reasons" a property of the
/// type system; [`AdjustmentReason::parse`] covers input arriving as text.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdjustmentReason {
    /// Operator correction with no more specific reason.
    ManualAdjustment,
    /// New stock received.
    Restock,
    /// Count correction after a physical stocktake.
    Correction,
    /// Units damaged or written off.
    Damage,
    /// Customer return added back to stock.
    Return,
}

impl AdjustmentReason {
    /// Database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        self.reason().as_str()
    }

    /// The corresponding full ledger reason.
    #[must_use]
    pub const fn reason(&self) -> EntryReason {
        match self {
            Self::ManualAdjustment => EntryReason::ManualAdjustment,
            Self::Restock => EntryReason::Restock,
            Self::Correction => EntryReason::Correction,
            Self::Damage => EntryReason::Damage,
            Self::Return => EntryReason::Return,
        }
    }

    /// Parse an operator-supplied reason.
    ///
    /// # Errors
    ///
    /// Returns [`StockError::UnknownAdjustmentReason`] for anything outside
    /// the fixed enum, including checkout-only reasons.
    pub fn parse(s: &str) -> Result<Self, StockError> {
        match s {
            "manual_adjustment" => Ok(Self::ManualAdjustment),
            "restock" => Ok(Self::Restock),
            "correction" => Ok(Self::Correction),
            "damage" => Ok(Self::Damage),
            "return" => Ok(Self::Return),
            _ => Err(StockError::UnknownAdjustmentReason(s.to_string())),
        }
    }
}

impl From<AdjustmentReason> for EntryReason {
    fn from(reason: AdjustmentReason) -> Self {
        reason.reason()
    }
}

impl fmt::Display for AdjustmentReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable row of the stock ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Store-assigned identifier, ascending in append order.
    pub id: EntryId,
    /// The variant this entry affects.
    pub variant_id: VariantId,
    /// How the counters were affected.
    pub entry_type: EntryType,
    /// Signed quantity: positive for stock-adding adjustments and reserves,
    /// negative for commits, releases and stock-reducing adjustments.
    pub quantity_delta: i64,
    /// Why the entry exists.
    pub reason: EntryReason,
    /// Order or reservation reference, if any (null for manual adjustments).
    pub reference_id: Option<String>,
    /// Operator-supplied free text.
    pub notes: Option<String>,
    /// Who caused this entry.
    pub actor_id: ActorId,
    /// When the entry was appended.
    pub created_at: DateTime<Utc>,
    /// Snapshot of `on_hand` after this entry, for audit/debug.
    pub resulting_on_hand: u32,
    /// Snapshot of `reserved` after this entry, for audit/debug.
    pub resulting_reserved: u32,
}

impl LedgerEntry {
    /// The counters as of this entry.
    #[must_use]
    pub const fn resulting_levels(&self) -> StockLevels {
        StockLevels::new(self.resulting_on_hand, self.resulting_reserved)
    }
}

/// Rebuild a variant's counters by folding its ledger from zero.
///
/// `entries` must be the variant's complete history in chronological
/// (ascending `created_at`) order; note that query-service reads return
/// newest-first and need reversing before replay. Used for reconciliation
/// after failures and to test that the projector and ledger agree.
///
/// # Errors
///
/// Returns the first [`StockError`] produced by re-applying an entry. A
/// well-formed ledger never errors: every entry was validated against the
/// same arithmetic when it was appended.
pub fn replay<'a>(
    variant_id: &VariantId,
    entries: impl IntoIterator<Item = &'a LedgerEntry>,
) -> Result<StockLevels, StockError> {
    let mut variant = Variant::tracked(variant_id.clone(), 0);
    for entry in entries {
        variant.levels = variant.apply(entry.entry_type, entry.quantity_delta)?;
    }
    Ok(variant.levels)
}

//! Variant identity and the denormalized stock counters.
//!
//! A variant is a sellable unit (product + attributes). The only mutable
//! aggregate state in the subsystem is its `(on_hand, reserved)` counter
//! pair, held in [`StockLevels`]. All counter arithmetic lives here in
//! [`Variant::apply`] so that every store implementation computes
//! transitions exactly the same way.

use crate::error::StockError;
use crate::ledger::EntryType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error type for identifier parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid identifier: {0}")]
pub struct ParseIdError(String);

/// Unique identifier for a product variant.
///
/// Typically a SKU-like string, e.g. `"tee-black-m"`. Immutable identity:
/// variants are referenced, never renamed, by this subsystem.
///
/// # Validation
///
/// - `FromStr::from_str()`: Validates input (rejects empty strings)
/// - `new()`: No validation (for application-controlled input)
///
/// # Examples
///
/// ```
/// use stockpile_core::variant::VariantId;
///
/// let id = VariantId::new("tee-black-m");
/// assert_eq!(id.as_str(), "tee-black-m");
///
/// let parsed: VariantId = "mug-large".parse().unwrap();
/// assert_eq!(parsed, VariantId::new("mug-large"));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VariantId(String);

impl VariantId {
    /// Create a new `VariantId` from a string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the variant ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VariantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for VariantId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err(ParseIdError("variant id cannot be empty".to_string()));
        }
        Ok(Self(s.to_string()))
    }
}

impl From<&str> for VariantId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Identifies who caused a ledger entry: an operator, or a system component.
///
/// Every ledger entry is permanently attributed to an actor for audit.
/// Checkout- and sweep-originated entries use [`ActorId::system`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorId(String);

impl ActorId {
    /// Create a new `ActorId` for a human operator.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Create an `ActorId` for a system component, e.g. `system("checkout")`.
    #[must_use]
    pub fn system(component: &str) -> Self {
        Self(format!("system:{component}"))
    }

    /// Get the actor ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Order reference supplied by the fulfillment collaborator at commit time,
/// recorded on the ledger entry for traceability.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderReference(String);

impl OrderReference {
    /// Create a new `OrderReference`.
    #[must_use]
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    /// Get the reference as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The denormalized stock counters for a variant.
///
/// Invariant: `on_hand >= reserved` at all times, so
/// [`StockLevels::available`] never underflows. The invariant is enforced by
/// [`Variant::apply`], the only transition function, and backed in depth by
/// CHECK constraints in the postgres schema.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevels {
    /// Total physical units currently owned, regardless of reservation status.
    pub on_hand: u32,
    /// Units held against in-progress checkouts, not yet committed or released.
    pub reserved: u32,
}

impl StockLevels {
    /// Create counters from raw values.
    ///
    /// Intended for loading persisted rows; does not re-validate the
    /// invariant (the store schema guarantees it).
    #[must_use]
    pub const fn new(on_hand: u32, reserved: u32) -> Self {
        Self { on_hand, reserved }
    }

    /// Sellable units right now: `on_hand - reserved`.
    #[must_use]
    pub const fn available(&self) -> u32 {
        self.on_hand.saturating_sub(self.reserved)
    }

    /// Whether the `on_hand >= reserved` invariant holds.
    #[must_use]
    pub const fn is_consistent(&self) -> bool {
        self.on_hand >= self.reserved
    }
}

impl fmt::Display for StockLevels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "on_hand={} reserved={} available={}",
            self.on_hand,
            self.reserved,
            self.available()
        )
    }
}

/// A sellable unit as this subsystem sees it: identity, the
/// `track_inventory` flag, and the current counters.
///
/// Product attributes beyond these (name, price, images, ...) belong to the
/// product catalog and are out of scope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    /// Immutable identity.
    pub variant_id: VariantId,
    /// If false, stock checks are bypassed and the variant is always
    /// sellable; reservations are recorded but neither counters nor ledger
    /// are touched.
    pub track_inventory: bool,
    /// Current denormalized counters.
    pub levels: StockLevels,
}

impl Variant {
    /// Create a tracked variant with an initial on-hand quantity.
    #[must_use]
    pub const fn tracked(variant_id: VariantId, on_hand: u32) -> Self {
        Self {
            variant_id,
            track_inventory: true,
            levels: StockLevels::new(on_hand, 0),
        }
    }

    /// Create an untracked variant (stock checks bypassed).
    #[must_use]
    pub const fn untracked(variant_id: VariantId) -> Self {
        Self {
            variant_id,
            track_inventory: false,
            levels: StockLevels::new(0, 0),
        }
    }

    /// Sellable units right now.
    #[must_use]
    pub const fn available(&self) -> u32 {
        self.levels.available()
    }

    /// Compute the counters after applying a ledger entry.
    ///
    /// This is the effect table from the stock-control design, in one place:
    ///
    /// | entry type | on_hand | reserved |
    /// |---|---|---|
    /// | adjustment | `+delta` | unchanged |
    /// | reserve    | unchanged | `+qty` |
    /// | commit     | `-qty` | `-qty` |
    /// | release    | unchanged | `-qty` |
    ///
    /// `quantity_delta` is the signed ledger delta: positive for adjustments
    /// that add stock and for reserves, negative for commits, releases and
    /// stock-reducing adjustments.
    ///
    /// Pure: returns the new counters without mutating the variant. Stores
    /// call this inside their write transaction and persist the result.
    ///
    /// # Errors
    ///
    /// - [`StockError::InsufficientStock`] if a reserve would drive
    ///   `available` negative
    /// - [`StockError::AdjustmentBelowReserved`] if an adjustment would drop
    ///   `on_hand` below `reserved`
    /// - [`StockError::InvalidQuantity`] if the delta's sign does not match
    ///   the entry type, is zero, or overflows the counter range
    /// - [`StockError::Storage`] if a commit/release exceeds `reserved`,
    ///   which indicates corrupted state (a reservation the counters do not
    ///   know about)
    pub fn apply(
        &self,
        entry_type: EntryType,
        quantity_delta: i64,
    ) -> Result<StockLevels, StockError> {
        let levels = self.levels;
        match entry_type {
            EntryType::Adjustment => {
                if quantity_delta == 0 {
                    return Err(StockError::InvalidQuantity(quantity_delta));
                }
                let on_hand_after = i64::from(levels.on_hand)
                    .checked_add(quantity_delta)
                    .ok_or(StockError::InvalidQuantity(quantity_delta))?;
                if on_hand_after < i64::from(levels.reserved) {
                    return Err(StockError::AdjustmentBelowReserved {
                        variant_id: self.variant_id.clone(),
                        on_hand_after,
                        reserved: levels.reserved,
                    });
                }
                let on_hand = u32::try_from(on_hand_after)
                    .map_err(|_| StockError::InvalidQuantity(quantity_delta))?;
                Ok(StockLevels::new(on_hand, levels.reserved))
            }
            EntryType::Reserve => {
                let quantity = positive_quantity(quantity_delta)?;
                if quantity > levels.available() {
                    return Err(StockError::InsufficientStock {
                        variant_id: self.variant_id.clone(),
                        requested: quantity,
                        available: levels.available(),
                    });
                }
                Ok(StockLevels::new(levels.on_hand, levels.reserved + quantity))
            }
            EntryType::Commit => {
                let quantity = negative_quantity(quantity_delta)?;
                let reserved = checked_release(&self.variant_id, levels.reserved, quantity)?;
                // reserved <= on_hand is the standing invariant, so this
                // subtraction cannot underflow once the release is checked.
                Ok(StockLevels::new(levels.on_hand - quantity, reserved))
            }
            EntryType::Release => {
                let quantity = negative_quantity(quantity_delta)?;
                let reserved = checked_release(&self.variant_id, levels.reserved, quantity)?;
                Ok(StockLevels::new(levels.on_hand, reserved))
            }
        }
    }
}

fn positive_quantity(delta: i64) -> Result<u32, StockError> {
    if delta <= 0 {
        return Err(StockError::InvalidQuantity(delta));
    }
    u32::try_from(delta).map_err(|_| StockError::InvalidQuantity(delta))
}

fn negative_quantity(delta: i64) -> Result<u32, StockError> {
    if delta >= 0 {
        return Err(StockError::InvalidQuantity(delta));
    }
    // i64::MIN has no negation; treat it like any other out-of-range delta.
    let magnitude = delta
        .checked_neg()
        .ok_or(StockError::InvalidQuantity(delta))?;
    u32::try_from(magnitude).map_err(|_| StockError::InvalidQuantity(delta))
}

fn checked_release(
    variant_id: &VariantId,
    reserved: u32,
    quantity: u32,
) -> Result<u32, StockError> {
    reserved.checked_sub(quantity).ok_or_else(|| {
        StockError::Storage(format!(
            "counter corruption on {variant_id}: resolving {quantity} units but only {reserved} reserved"
        ))
    })
}

//! Read-only inventory projections.
//!
//! Pure reads of the projector counters (and the ledger, for history);
//! never exposes mutation and never blocks writers.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use stockpile_core::error::StockError;
use stockpile_core::ledger::LedgerEntry;
use stockpile_core::store::{AdjustmentFilter, Page, StockStore};
use stockpile_core::variant::{StockLevels, VariantId};

/// Availability of a single variant.
///
/// Untracked variants are always sellable; representing that as its own
/// variant keeps the "infinite stock" sentinel out of the arithmetic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Availability {
    /// Counters for a tracked variant.
    Tracked {
        /// Total physical units owned.
        on_hand: u32,
        /// Units held by in-progress checkouts.
        reserved: u32,
        /// Sellable units right now.
        available: u32,
    },
    /// Stock checks bypassed; always sellable.
    Untracked,
}

impl Availability {
    /// Whether `quantity` units could be sold right now.
    #[must_use]
    pub const fn can_cover(&self, quantity: u32) -> bool {
        match self {
            Self::Tracked { available, .. } => *available >= quantity,
            Self::Untracked => true,
        }
    }
}

/// One row of the low-stock report.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    /// The variant.
    pub variant_id: VariantId,
    /// Its current counters.
    pub levels: StockLevels,
    /// Whether `available` sits below the requested threshold.
    pub is_low_stock: bool,
}

/// Read-only query service over the stock projector and ledger.
pub struct InventoryQueries {
    store: Arc<dyn StockStore>,
}

impl InventoryQueries {
    /// Create the query service over a store.
    #[must_use]
    pub fn new(store: Arc<dyn StockStore>) -> Self {
        Self { store }
    }

    /// Current availability of one variant.
    ///
    /// # Errors
    ///
    /// - [`StockError::UnknownVariant`]: no such variant
    /// - [`StockError::Storage`]: persistence failed
    pub async fn available(&self, variant_id: &VariantId) -> Result<Availability, StockError> {
        let variant = self.store.variant(variant_id).await?;
        if !variant.track_inventory {
            return Ok(Availability::Untracked);
        }
        Ok(Availability::Tracked {
            on_hand: variant.levels.on_hand,
            reserved: variant.levels.reserved,
            available: variant.available(),
        })
    }

    /// All tracked variants, each flagged when `available < threshold`.
    ///
    /// # Errors
    ///
    /// - [`StockError::Storage`]: persistence failed
    pub async fn stock_levels(&self, threshold: u32) -> Result<Vec<StockLevel>, StockError> {
        let variants = self.store.stock_levels().await?;
        Ok(variants
            .into_iter()
            .map(|v| StockLevel {
                is_low_stock: v.available() < threshold,
                levels: v.levels,
                variant_id: v.variant_id,
            })
            .collect())
    }

    /// A variant's full ledger history, newest first.
    ///
    /// # Errors
    ///
    /// - [`StockError::Storage`]: persistence failed
    pub async fn history(
        &self,
        variant_id: &VariantId,
        page: Page,
    ) -> Result<Vec<LedgerEntry>, StockError> {
        self.store.history(variant_id, page).await
    }

    /// Manual adjustment entries matching `filter`, newest first.
    ///
    /// # Errors
    ///
    /// - [`StockError::Storage`]: persistence failed
    pub async fn adjustments(
        &self,
        filter: AdjustmentFilter,
        page: Page,
    ) -> Result<Vec<LedgerEntry>, StockError> {
        self.store.adjustments(filter, page).await
    }
}

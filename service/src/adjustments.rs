//! Operator-facing manual stock corrections.

use std::sync::Arc;
use stockpile_core::clock::Clock;
use stockpile_core::error::StockError;
use stockpile_core::ledger::{AdjustmentReason, LedgerEntry};
use stockpile_core::store::{AdjustmentRequest, StockStore};
use stockpile_core::variant::{ActorId, VariantId};

/// The only path that changes `on_hand` independently of checkout activity.
///
/// Every call writes a ledger entry permanently attributed to an operator
/// `actor_id`. Admin screens must go through this - a direct counter write
/// would bypass audit and risk breaking `on_hand >= reserved`.
pub struct AdjustmentApi {
    store: Arc<dyn StockStore>,
    clock: Arc<dyn Clock>,
}

impl AdjustmentApi {
    /// Create the API over a store and clock.
    #[must_use]
    pub fn new(store: Arc<dyn StockStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Record a manual correction to a variant's `on_hand`.
    ///
    /// `quantity_change` may be positive (restock, return) or negative
    /// (damage, correction). The reason must come from the fixed operator
    /// enum; text input is parsed via
    /// [`AdjustmentReason::parse`](stockpile_core::ledger::AdjustmentReason::parse).
    ///
    /// # Errors
    ///
    /// - [`StockError::InvalidQuantity`]: zero change
    /// - [`StockError::UnknownVariant`]: no such variant
    /// - [`StockError::AdjustmentBelowReserved`]: would make `available`
    ///   negative; the operator must resolve outstanding reservations first
    /// - [`StockError::Storage`]: persistence failure, nothing written
    pub async fn adjust(
        &self,
        variant_id: &VariantId,
        quantity_change: i64,
        reason: AdjustmentReason,
        notes: Option<String>,
        actor_id: ActorId,
    ) -> Result<LedgerEntry, StockError> {
        if quantity_change == 0 {
            return Err(StockError::InvalidQuantity(0));
        }
        let entry = self
            .store
            .apply_adjustment(AdjustmentRequest {
                variant_id: variant_id.clone(),
                quantity_delta: quantity_change,
                reason,
                notes,
                actor_id: actor_id.clone(),
                now: self.clock.now(),
            })
            .await?;

        tracing::info!(
            variant_id = %variant_id,
            delta = quantity_change,
            reason = %reason,
            actor_id = %actor_id,
            on_hand = entry.resulting_on_hand,
            "Stock adjusted"
        );
        Ok(entry)
    }
}

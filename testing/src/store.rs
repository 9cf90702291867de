//! In-memory `StockStore` for fast, deterministic tests.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard};
use stockpile_core::error::StockError;
use stockpile_core::ledger::{EntryId, EntryReason, EntryType, LedgerEntry};
use stockpile_core::reservation::{Reservation, ReservationId, ReservationStatus, Resolution};
use stockpile_core::store::{AdjustmentFilter, AdjustmentRequest, Page, ReserveRequest, StockStore};
use stockpile_core::variant::{ActorId, OrderReference, Variant, VariantId};

#[derive(Debug, Default)]
struct Inner {
    variants: HashMap<VariantId, Variant>,
    entries: Vec<LedgerEntry>,
    reservations: HashMap<ReservationId, Reservation>,
    next_entry_id: i64,
}

/// In-memory stock store.
///
/// One mutex guards all state, so every write naturally serializes - a
/// coarser version of the per-variant row lock the postgres store takes,
/// which can only strengthen the guarantees under test. State is dropped
/// with the store; nothing is durable.
#[derive(Debug, Default)]
pub struct InMemoryStockStore {
    inner: Mutex<Inner>,
}

impl InMemoryStockStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of ledger entries across all variants. Test helper.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned (a prior test panic).
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn entry_count(&self) -> usize {
        self.inner.lock().expect("store lock poisoned").entries.len()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StockError> {
        self.inner
            .lock()
            .map_err(|_| StockError::Storage("store lock poisoned".to_string()))
    }
}

/// Append a ledger entry and move the counters, within the caller's lock.
/// The single write path for counter state.
#[allow(clippy::too_many_arguments)]
fn append_entry(
    inner: &mut Inner,
    variant_id: &VariantId,
    entry_type: EntryType,
    quantity_delta: i64,
    reason: EntryReason,
    reference_id: Option<String>,
    notes: Option<String>,
    actor_id: ActorId,
    now: DateTime<Utc>,
) -> Result<LedgerEntry, StockError> {
    let variant = inner
        .variants
        .get_mut(variant_id)
        .ok_or_else(|| StockError::UnknownVariant(variant_id.clone()))?;

    let levels = variant.apply(entry_type, quantity_delta)?;
    variant.levels = levels;

    inner.next_entry_id += 1;
    let entry = LedgerEntry {
        id: EntryId::new(inner.next_entry_id),
        variant_id: variant_id.clone(),
        entry_type,
        quantity_delta,
        reason,
        reference_id,
        notes,
        actor_id,
        created_at: now,
        resulting_on_hand: levels.on_hand,
        resulting_reserved: levels.reserved,
    };
    inner.entries.push(entry.clone());
    Ok(entry)
}

fn paginate(mut entries: Vec<LedgerEntry>, page: Page) -> Vec<LedgerEntry> {
    // Newest first; ids tiebreak entries sharing a timestamp (fixed clocks).
    entries.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
    entries.into_iter().skip(page.offset).take(page.limit).collect()
}

impl StockStore for InMemoryStockStore {
    fn put_variant(
        &self,
        variant: Variant,
    ) -> Pin<Box<dyn Future<Output = Result<(), StockError>> + Send + '_>> {
        Box::pin(async move {
            let mut inner = self.lock()?;
            inner.variants.insert(variant.variant_id.clone(), variant);
            Ok(())
        })
    }

    fn variant(
        &self,
        variant_id: &VariantId,
    ) -> Pin<Box<dyn Future<Output = Result<Variant, StockError>> + Send + '_>> {
        let variant_id = variant_id.clone();
        Box::pin(async move {
            let inner = self.lock()?;
            inner
                .variants
                .get(&variant_id)
                .cloned()
                .ok_or(StockError::UnknownVariant(variant_id))
        })
    }

    fn apply_adjustment(
        &self,
        request: AdjustmentRequest,
    ) -> Pin<Box<dyn Future<Output = Result<LedgerEntry, StockError>> + Send + '_>> {
        Box::pin(async move {
            let mut inner = self.lock()?;
            append_entry(
                &mut inner,
                &request.variant_id,
                EntryType::Adjustment,
                request.quantity_delta,
                request.reason.into(),
                None,
                request.notes,
                request.actor_id,
                request.now,
            )
        })
    }

    fn reserve(
        &self,
        request: ReserveRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Reservation, StockError>> + Send + '_>> {
        Box::pin(async move {
            if request.quantity == 0 {
                return Err(StockError::InvalidQuantity(0));
            }
            let mut inner = self.lock()?;
            let tracked = inner
                .variants
                .get(&request.variant_id)
                .ok_or_else(|| StockError::UnknownVariant(request.variant_id.clone()))?
                .track_inventory;

            if tracked {
                append_entry(
                    &mut inner,
                    &request.variant_id,
                    EntryType::Reserve,
                    i64::from(request.quantity),
                    EntryReason::CheckoutReserve,
                    Some(request.reservation_id.to_string()),
                    None,
                    request.actor_id,
                    request.now,
                )?;
            }

            let reservation = Reservation {
                id: request.reservation_id,
                variant_id: request.variant_id,
                quantity: request.quantity,
                status: ReservationStatus::Active,
                created_at: request.now,
                expires_at: request.expires_at,
                order_reference: None,
            };
            inner
                .reservations
                .insert(reservation.id, reservation.clone());
            Ok(reservation)
        })
    }

    fn resolve_reservation(
        &self,
        reservation_id: ReservationId,
        resolution: Resolution,
        order_reference: Option<OrderReference>,
        actor_id: ActorId,
        now: DateTime<Utc>,
    ) -> Pin<Box<dyn Future<Output = Result<Option<LedgerEntry>, StockError>> + Send + '_>> {
        Box::pin(async move {
            let mut inner = self.lock()?;
            let reservation = inner
                .reservations
                .get(&reservation_id)
                .ok_or(StockError::UnknownReservation(reservation_id))?
                .clone();

            // Compare-and-transition: only an active hold may be resolved.
            if reservation.status != ReservationStatus::Active {
                return Err(StockError::InvalidReservationState {
                    reservation_id,
                    current: reservation.status,
                });
            }

            let tracked = inner
                .variants
                .get(&reservation.variant_id)
                .ok_or_else(|| StockError::UnknownVariant(reservation.variant_id.clone()))?
                .track_inventory;

            let entry = if tracked {
                let entry_type = match resolution {
                    Resolution::Commit => EntryType::Commit,
                    Resolution::Release | Resolution::Expire => EntryType::Release,
                };
                let reference = order_reference
                    .as_ref()
                    .map_or_else(|| reservation_id.to_string(), |r| r.as_str().to_string());
                Some(append_entry(
                    &mut inner,
                    &reservation.variant_id,
                    entry_type,
                    -i64::from(reservation.quantity),
                    resolution.reason(),
                    Some(reference),
                    None,
                    actor_id,
                    now,
                )?)
            } else {
                None
            };

            if let Some(held) = inner.reservations.get_mut(&reservation_id) {
                held.status = resolution.target_status();
                if order_reference.is_some() {
                    held.order_reference = order_reference;
                }
            }
            Ok(entry)
        })
    }

    fn reservation(
        &self,
        reservation_id: ReservationId,
    ) -> Pin<Box<dyn Future<Output = Result<Reservation, StockError>> + Send + '_>> {
        Box::pin(async move {
            let inner = self.lock()?;
            inner
                .reservations
                .get(&reservation_id)
                .cloned()
                .ok_or(StockError::UnknownReservation(reservation_id))
        })
    }

    fn stock_levels(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Variant>, StockError>> + Send + '_>> {
        Box::pin(async move {
            let inner = self.lock()?;
            let mut variants: Vec<Variant> = inner
                .variants
                .values()
                .filter(|v| v.track_inventory)
                .cloned()
                .collect();
            variants.sort_by(|a, b| a.variant_id.as_str().cmp(b.variant_id.as_str()));
            Ok(variants)
        })
    }

    fn history(
        &self,
        variant_id: &VariantId,
        page: Page,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<LedgerEntry>, StockError>> + Send + '_>> {
        let variant_id = variant_id.clone();
        Box::pin(async move {
            let inner = self.lock()?;
            let entries: Vec<LedgerEntry> = inner
                .entries
                .iter()
                .filter(|e| e.variant_id == variant_id)
                .cloned()
                .collect();
            Ok(paginate(entries, page))
        })
    }

    fn adjustments(
        &self,
        filter: AdjustmentFilter,
        page: Page,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<LedgerEntry>, StockError>> + Send + '_>> {
        Box::pin(async move {
            let inner = self.lock()?;
            let entries: Vec<LedgerEntry> = inner
                .entries
                .iter()
                .filter(|e| e.entry_type == EntryType::Adjustment)
                .filter(|e| {
                    filter
                        .variant_id
                        .as_ref()
                        .is_none_or(|v| &e.variant_id == v)
                })
                .filter(|e| filter.actor_id.as_ref().is_none_or(|a| &e.actor_id == a))
                .filter(|e| {
                    filter
                        .reason
                        .is_none_or(|r| e.reason == r.reason())
                })
                .cloned()
                .collect();
            Ok(paginate(entries, page))
        })
    }

    fn expired_active(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Reservation>, StockError>> + Send + '_>> {
        Box::pin(async move {
            let inner = self.lock()?;
            let mut stale: Vec<Reservation> = inner
                .reservations
                .values()
                .filter(|r| r.status == ReservationStatus::Active && r.is_expired_at(now))
                .cloned()
                .collect();
            stale.sort_by_key(|r| r.expires_at);
            stale.truncate(limit);
            Ok(stale)
        })
    }
}

//! `PostgresStockStore`: the production `StockStore`.

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{PgConnection, Row};
use std::future::Future;
use std::pin::Pin;
use stockpile_core::error::StockError;
use stockpile_core::ledger::{EntryId, EntryReason, EntryType, LedgerEntry};
use stockpile_core::reservation::{Reservation, ReservationId, ReservationStatus, Resolution};
use stockpile_core::store::{AdjustmentFilter, AdjustmentRequest, Page, ReserveRequest, StockStore};
use stockpile_core::variant::{ActorId, OrderReference, StockLevels, Variant, VariantId};
use uuid::Uuid;

/// PostgreSQL-backed stock store.
///
/// # Serialization discipline
///
/// Each write transaction reads the variant's counter row with
/// `SELECT ... FOR UPDATE`, computes the new counters through
/// [`Variant::apply`], writes them back and appends the ledger row, then
/// commits. The row lock is held only for that window - never across
/// external I/O - which bounds lock hold time while still totally ordering
/// all stock-affecting operations per variant.
///
/// Reservation transitions use a conditional
/// `UPDATE ... WHERE status = 'active'` as the compare-and-swap; zero rows
/// affected means the transition already happened and the caller lost the
/// race.
#[derive(Clone)]
pub struct PostgresStockStore {
    pool: PgPool,
}

impl PostgresStockStore {
    /// Create a store using an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a store with its own connection pool.
    ///
    /// # Errors
    ///
    /// Returns [`StockError::Storage`] if the connection fails.
    pub async fn connect(database_url: &str) -> Result<Self, StockError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| StockError::Storage(format!("Failed to connect: {e}")))?;
        Ok(Self::new(pool))
    }

    /// Run database migrations for the stock tables.
    ///
    /// # Errors
    ///
    /// Returns [`StockError::Storage`] if migration fails.
    pub async fn migrate(&self) -> Result<(), StockError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StockError::Storage(format!("Migration failed: {e}")))?;
        tracing::info!("Stock migrations applied");
        Ok(())
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn storage(e: sqlx::Error) -> StockError {
    StockError::Storage(e.to_string())
}

fn counter(value: i64) -> Result<u32, StockError> {
    u32::try_from(value)
        .map_err(|_| StockError::Storage(format!("counter out of range: {value}")))
}

fn row_to_entry(row: &sqlx::postgres::PgRow) -> Result<LedgerEntry, StockError> {
    Ok(LedgerEntry {
        id: EntryId::new(row.try_get::<i64, _>("id").map_err(storage)?),
        variant_id: VariantId::new(row.try_get::<String, _>("variant_id").map_err(storage)?),
        entry_type: EntryType::parse(&row.try_get::<String, _>("entry_type").map_err(storage)?)?,
        quantity_delta: row.try_get("quantity_delta").map_err(storage)?,
        reason: EntryReason::parse(&row.try_get::<String, _>("reason").map_err(storage)?)?,
        reference_id: row.try_get("reference_id").map_err(storage)?,
        notes: row.try_get("notes").map_err(storage)?,
        actor_id: ActorId::new(row.try_get::<String, _>("actor_id").map_err(storage)?),
        created_at: row.try_get("created_at").map_err(storage)?,
        resulting_on_hand: counter(row.try_get("resulting_on_hand").map_err(storage)?)?,
        resulting_reserved: counter(row.try_get("resulting_reserved").map_err(storage)?)?,
    })
}

fn row_to_reservation(row: &sqlx::postgres::PgRow) -> Result<Reservation, StockError> {
    Ok(Reservation {
        id: ReservationId::from_uuid(row.try_get::<Uuid, _>("id").map_err(storage)?),
        variant_id: VariantId::new(row.try_get::<String, _>("variant_id").map_err(storage)?),
        quantity: counter(row.try_get("quantity").map_err(storage)?)?,
        status: ReservationStatus::parse(&row.try_get::<String, _>("status").map_err(storage)?)?,
        created_at: row.try_get("created_at").map_err(storage)?,
        expires_at: row.try_get("expires_at").map_err(storage)?,
        order_reference: row
            .try_get::<Option<String>, _>("order_reference")
            .map_err(storage)?
            .map(OrderReference::new),
    })
}

/// Read the variant's counter row under a row-level lock.
async fn lock_variant(
    conn: &mut PgConnection,
    variant_id: &VariantId,
) -> Result<Variant, StockError> {
    let row: Option<(bool, i64, i64)> = sqlx::query_as(
        "SELECT track_inventory, on_hand, reserved
         FROM variants_stock
         WHERE variant_id = $1
         FOR UPDATE",
    )
    .bind(variant_id.as_str())
    .fetch_optional(conn)
    .await
    .map_err(storage)?;

    let (track_inventory, on_hand, reserved) =
        row.ok_or_else(|| StockError::UnknownVariant(variant_id.clone()))?;
    Ok(Variant {
        variant_id: variant_id.clone(),
        track_inventory,
        levels: StockLevels::new(counter(on_hand)?, counter(reserved)?),
    })
}

async fn write_counters(
    conn: &mut PgConnection,
    variant_id: &VariantId,
    levels: StockLevels,
) -> Result<(), StockError> {
    sqlx::query(
        "UPDATE variants_stock
         SET on_hand = $2, reserved = $3, updated_at = now()
         WHERE variant_id = $1",
    )
    .bind(variant_id.as_str())
    .bind(i64::from(levels.on_hand))
    .bind(i64::from(levels.reserved))
    .execute(conn)
    .await
    .map_err(storage)?;
    Ok(())
}

/// Append a ledger row carrying the post-transition counter snapshot.
#[allow(clippy::too_many_arguments)]
async fn append_entry(
    conn: &mut PgConnection,
    variant_id: &VariantId,
    entry_type: EntryType,
    quantity_delta: i64,
    reason: EntryReason,
    reference_id: Option<&str>,
    notes: Option<&str>,
    actor_id: &ActorId,
    now: DateTime<Utc>,
    levels: StockLevels,
) -> Result<LedgerEntry, StockError> {
    let (id,): (i64,) = sqlx::query_as(
        "INSERT INTO ledger_entries (
             variant_id, entry_type, quantity_delta, reason, reference_id,
             notes, actor_id, created_at, resulting_on_hand, resulting_reserved
         ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
         RETURNING id",
    )
    .bind(variant_id.as_str())
    .bind(entry_type.as_str())
    .bind(quantity_delta)
    .bind(reason.as_str())
    .bind(reference_id)
    .bind(notes)
    .bind(actor_id.as_str())
    .bind(now)
    .bind(i64::from(levels.on_hand))
    .bind(i64::from(levels.reserved))
    .fetch_one(conn)
    .await
    .map_err(storage)?;

    metrics::counter!("stock.ledger.appended", "entry_type" => entry_type.as_str())
        .increment(1);

    Ok(LedgerEntry {
        id: EntryId::new(id),
        variant_id: variant_id.clone(),
        entry_type,
        quantity_delta,
        reason,
        reference_id: reference_id.map(str::to_string),
        notes: notes.map(str::to_string),
        actor_id: actor_id.clone(),
        created_at: now,
        resulting_on_hand: levels.on_hand,
        resulting_reserved: levels.reserved,
    })
}

impl StockStore for PostgresStockStore {
    fn put_variant(
        &self,
        variant: Variant,
    ) -> Pin<Box<dyn Future<Output = Result<(), StockError>> + Send + '_>> {
        Box::pin(async move {
            // Existing rows keep their counters; only the tracking flag is
            // updated. Counters move exclusively through the ledger.
            sqlx::query(
                "INSERT INTO variants_stock (variant_id, track_inventory, on_hand, reserved)
                 VALUES ($1, $2, $3, $4)
                 ON CONFLICT (variant_id) DO UPDATE
                 SET track_inventory = EXCLUDED.track_inventory, updated_at = now()",
            )
            .bind(variant.variant_id.as_str())
            .bind(variant.track_inventory)
            .bind(i64::from(variant.levels.on_hand))
            .bind(i64::from(variant.levels.reserved))
            .execute(&self.pool)
            .await
            .map_err(storage)?;
            Ok(())
        })
    }

    fn variant(
        &self,
        variant_id: &VariantId,
    ) -> Pin<Box<dyn Future<Output = Result<Variant, StockError>> + Send + '_>> {
        let variant_id = variant_id.clone();
        Box::pin(async move {
            let row: Option<(bool, i64, i64)> = sqlx::query_as(
                "SELECT track_inventory, on_hand, reserved
                 FROM variants_stock
                 WHERE variant_id = $1",
            )
            .bind(variant_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;

            let (track_inventory, on_hand, reserved) =
                row.ok_or_else(|| StockError::UnknownVariant(variant_id.clone()))?;
            Ok(Variant {
                variant_id,
                track_inventory,
                levels: StockLevels::new(counter(on_hand)?, counter(reserved)?),
            })
        })
    }

    fn apply_adjustment(
        &self,
        request: AdjustmentRequest,
    ) -> Pin<Box<dyn Future<Output = Result<LedgerEntry, StockError>> + Send + '_>> {
        Box::pin(async move {
            let mut tx = self.pool.begin().await.map_err(storage)?;

            let variant = lock_variant(&mut tx, &request.variant_id).await?;
            let levels = variant.apply(EntryType::Adjustment, request.quantity_delta)?;
            write_counters(&mut tx, &request.variant_id, levels).await?;
            let entry = append_entry(
                &mut tx,
                &request.variant_id,
                EntryType::Adjustment,
                request.quantity_delta,
                request.reason.into(),
                None,
                request.notes.as_deref(),
                &request.actor_id,
                request.now,
                levels,
            )
            .await?;

            tx.commit().await.map_err(storage)?;
            Ok(entry)
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
            let mut tx = self.pool.begin().await.map_err(storage)?;

            let variant = lock_variant(&mut tx, &request.variant_id).await?;
            if variant.track_inventory {
                let levels =
                    variant.apply(EntryType::Reserve, i64::from(request.quantity))?;
                write_counters(&mut tx, &request.variant_id, levels).await?;
                append_entry(
                    &mut tx,
                    &request.variant_id,
                    EntryType::Reserve,
                    i64::from(request.quantity),
                    EntryReason::CheckoutReserve,
                    Some(&request.reservation_id.to_string()),
                    None,
                    &request.actor_id,
                    request.now,
                    levels,
                )
                .await?;
            }

            sqlx::query(
                "INSERT INTO reservations (id, variant_id, quantity, status, created_at, expires_at)
                 VALUES ($1, $2, $3, 'active', $4, $5)",
            )
            .bind(request.reservation_id.as_uuid())
            .bind(request.variant_id.as_str())
            .bind(i64::from(request.quantity))
            .bind(request.now)
            .bind(request.expires_at)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;

            tx.commit().await.map_err(storage)?;
            Ok(Reservation {
                id: request.reservation_id,
                variant_id: request.variant_id,
                quantity: request.quantity,
                status: ReservationStatus::Active,
                created_at: request.now,
                expires_at: request.expires_at,
                order_reference: None,
            })
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
            let mut tx = self.pool.begin().await.map_err(storage)?;

            // Compare-and-transition: only an active hold matches.
            let transitioned: Option<(String, i64)> = sqlx::query_as(
                "UPDATE reservations
                 SET status = $2, order_reference = COALESCE($3, order_reference)
                 WHERE id = $1 AND status = 'active'
                 RETURNING variant_id, quantity",
            )
            .bind(reservation_id.as_uuid())
            .bind(resolution.target_status().as_str())
            .bind(order_reference.as_ref().map(OrderReference::as_str))
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage)?;

            let Some((variant_id, quantity)) = transitioned else {
                // Lost the race, or the id is dangling; tell them apart.
                let current: Option<(String,)> =
                    sqlx::query_as("SELECT status FROM reservations WHERE id = $1")
                        .bind(reservation_id.as_uuid())
                        .fetch_optional(&mut *tx)
                        .await
                        .map_err(storage)?;
                return match current {
                    Some((status,)) => Err(StockError::InvalidReservationState {
                        reservation_id,
                        current: ReservationStatus::parse(&status)?,
                    }),
                    None => Err(StockError::UnknownReservation(reservation_id)),
                };
            };

            let variant_id = VariantId::new(variant_id);
            let quantity = counter(quantity)?;
            let variant = lock_variant(&mut tx, &variant_id).await?;

            let entry = if variant.track_inventory {
                let entry_type = match resolution {
                    Resolution::Commit => EntryType::Commit,
                    Resolution::Release | Resolution::Expire => EntryType::Release,
                };
                let levels = variant.apply(entry_type, -i64::from(quantity))?;
                write_counters(&mut tx, &variant_id, levels).await?;
                let reference = order_reference
                    .as_ref()
                    .map_or_else(|| reservation_id.to_string(), |r| r.as_str().to_string());
                Some(
                    append_entry(
                        &mut tx,
                        &variant_id,
                        entry_type,
                        -i64::from(quantity),
                        resolution.reason(),
                        Some(&reference),
                        None,
                        &actor_id,
                        now,
                        levels,
                    )
                    .await?,
                )
            } else {
                None
            };

            tx.commit().await.map_err(storage)?;
            Ok(entry)
        })
    }

    fn reservation(
        &self,
        reservation_id: ReservationId,
    ) -> Pin<Box<dyn Future<Output = Result<Reservation, StockError>> + Send + '_>> {
        Box::pin(async move {
            let row = sqlx::query(
                "SELECT id, variant_id, quantity, status, created_at, expires_at, order_reference
                 FROM reservations
                 WHERE id = $1",
            )
            .bind(reservation_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;

            row.as_ref()
                .map(row_to_reservation)
                .transpose()?
                .ok_or(StockError::UnknownReservation(reservation_id))
        })
    }

    fn stock_levels(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Variant>, StockError>> + Send + '_>> {
        Box::pin(async move {
            let rows: Vec<(String, i64, i64)> = sqlx::query_as(
                "SELECT variant_id, on_hand, reserved
                 FROM variants_stock
                 WHERE track_inventory
                 ORDER BY variant_id",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(storage)?;

            rows.into_iter()
                .map(|(variant_id, on_hand, reserved)| {
                    Ok(Variant {
                        variant_id: VariantId::new(variant_id),
                        track_inventory: true,
                        levels: StockLevels::new(counter(on_hand)?, counter(reserved)?),
                    })
                })
                .collect()
        })
    }

    fn history(
        &self,
        variant_id: &VariantId,
        page: Page,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<LedgerEntry>, StockError>> + Send + '_>> {
        let variant_id = variant_id.clone();
        Box::pin(async move {
            let rows = sqlx::query(
                "SELECT id, variant_id, entry_type, quantity_delta, reason, reference_id,
                        notes, actor_id, created_at, resulting_on_hand, resulting_reserved
                 FROM ledger_entries
                 WHERE variant_id = $1
                 ORDER BY created_at DESC, id DESC
                 LIMIT $2 OFFSET $3",
            )
            .bind(variant_id.as_str())
            .bind(page_limit(page.limit)?)
            .bind(page_limit(page.offset)?)
            .fetch_all(&self.pool)
            .await
            .map_err(storage)?;

            rows.iter().map(row_to_entry).collect()
        })
    }

    fn adjustments(
        &self,
        filter: AdjustmentFilter,
        page: Page,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<LedgerEntry>, StockError>> + Send + '_>> {
        Box::pin(async move {
            let rows = sqlx::query(
                "SELECT id, variant_id, entry_type, quantity_delta, reason, reference_id,
                        notes, actor_id, created_at, resulting_on_hand, resulting_reserved
                 FROM ledger_entries
                 WHERE entry_type = 'adjustment'
                   AND ($1::text IS NULL OR variant_id = $1)
                   AND ($2::text IS NULL OR actor_id = $2)
                   AND ($3::text IS NULL OR reason = $3)
                 ORDER BY created_at DESC, id DESC
                 LIMIT $4 OFFSET $5",
            )
            .bind(filter.variant_id.as_ref().map(VariantId::as_str))
            .bind(filter.actor_id.as_ref().map(ActorId::as_str))
            .bind(filter.reason.map(|r| r.as_str()))
            .bind(page_limit(page.limit)?)
            .bind(page_limit(page.offset)?)
            .fetch_all(&self.pool)
            .await
            .map_err(storage)?;

            rows.iter().map(row_to_entry).collect()
        })
    }

    fn expired_active(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Reservation>, StockError>> + Send + '_>> {
        Box::pin(async move {
            let rows = sqlx::query(
                "SELECT id, variant_id, quantity, status, created_at, expires_at, order_reference
                 FROM reservations
                 WHERE status = 'active' AND expires_at < $1
                 ORDER BY expires_at
                 LIMIT $2",
            )
            .bind(now)
            .bind(page_limit(limit)?)
            .fetch_all(&self.pool)
            .await
            .map_err(storage)?;

            rows.iter().map(row_to_reservation).collect()
        })
    }
}

fn page_limit(value: usize) -> Result<i64, StockError> {
    i64::try_from(value).map_err(|_| StockError::Storage(format!("page bound out of range: {value}")))
}

//! # Stockpile Core
//!
//! Core types and traits for the Stockpile inventory stock-control subsystem.
//!
//! Stockpile tracks how many units of a product variant are sellable, holds
//! stock during checkout, commits or releases those holds depending on payment
//! outcome, and records every quantity change in an append-only ledger.
//!
//! ## Core Concepts
//!
//! - **Ledger**: append-only record of every stock-affecting event
//!   ([`ledger::LedgerEntry`]); the source of truth for "how did we get here"
//! - **Projector**: the denormalized `(on_hand, reserved)` counters per
//!   variant ([`variant::StockLevels`]), rebuildable from the ledger at any
//!   time via [`ledger::replay`]
//! - **Reservation**: a time-bounded hold against available stock created at
//!   checkout start ([`reservation::Reservation`])
//! - **Store**: the transactional persistence seam ([`store::StockStore`]);
//!   every write method is a single atomic transaction and the sole
//!   serialization point for a variant's counters
//!
//! ## Invariant
//!
//! For every variant at all times: `on_hand >= reserved >= 0`, so
//! `available = on_hand - reserved` never goes negative. Reservations leave
//! `active` through exactly one terminal transition (committed, released, or
//! expired), enforced by compare-and-transition in the store.
//!
//! ## Example
//!
//! ```ignore
//! use stockpile_core::store::StockStore;
//! use stockpile_core::variant::{Variant, VariantId};
//!
//! async fn seed<S: StockStore + ?Sized>(store: &S) -> Result<(), stockpile_core::error::StockError> {
//!     store
//!         .put_variant(Variant::tracked(VariantId::new("tee-black-m"), 25))
//!         .await?;
//!     Ok(())
//! }
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};

pub mod clock;
pub mod config;
pub mod error;
pub mod ledger;
pub mod reservation;
pub mod store;
pub mod variant;

pub use clock::{Clock, SystemClock};
pub use config::StockConfig;
pub use error::StockError;
pub use ledger::{AdjustmentReason, EntryId, EntryReason, EntryType, LedgerEntry};
pub use reservation::{Reservation, ReservationId, ReservationStatus, Resolution};
pub use store::{AdjustmentFilter, AdjustmentRequest, Page, ReserveRequest, StockStore};
pub use variant::{ActorId, OrderReference, StockLevels, Variant, VariantId};

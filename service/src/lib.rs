//! # Stockpile Service
//!
//! The operational surface of the Stockpile inventory subsystem, over any
//! [`stockpile_core::store::StockStore`]:
//!
//! - [`ReservationManager`]: checkout holds - reserve, commit, release
//! - [`AdjustmentApi`]: operator stock corrections, fully attributed
//! - [`InventoryQueries`]: read-only projections (availability, low stock,
//!   history)
//! - [`ExpirySweep`]: background pass expiring stale holds
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use stockpile_core::{StockConfig, SystemClock};
//! use stockpile_service::{ExpirySweep, ReservationManager};
//!
//! let store = Arc::new(make_store());
//! let clock = Arc::new(SystemClock);
//! let config = StockConfig::default();
//!
//! let manager = ReservationManager::new(store.clone(), clock.clone(), config);
//! let (sweep, shutdown) = ExpirySweep::new(store, clock, config);
//! tokio::spawn(sweep.run());
//!
//! let hold = manager.reserve(&"tee-black-m".into(), 2).await?;
//! // ... payment succeeds ...
//! manager.commit(hold.id, OrderReference::new("order-1001")).await?;
//! # shutdown.send(true).ok();
//! ```

pub mod adjustments;
pub mod queries;
pub mod reservations;
pub mod sweep;

pub use adjustments::AdjustmentApi;
pub use queries::{Availability, InventoryQueries, StockLevel};
pub use reservations::ReservationManager;
pub use sweep::{ExpirySweep, SweepOutcome};

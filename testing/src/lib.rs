//! # Stockpile Testing
//!
//! Testing utilities for the Stockpile inventory subsystem.
//!
//! This crate provides:
//! - [`InMemoryStockStore`]: a deterministic, mutex-serialized `StockStore`
//! - [`FixedClock`] and [`SteppingClock`]: deterministic time
//! - [`init_test_tracing`]: opt-in log output while debugging tests
//!
//! ## Example
//!
//! ```
//! use stockpile_core::store::StockStore;
//! use stockpile_core::variant::{Variant, VariantId};
//! use stockpile_testing::InMemoryStockStore;
//!
//! # tokio_test::block_on(async {
//! let store = InMemoryStockStore::new();
//! store
//!     .put_variant(Variant::tracked(VariantId::new("tee-black-m"), 10))
//!     .await
//!     .unwrap();
//! let variant = store.variant(&VariantId::new("tee-black-m")).await.unwrap();
//! assert_eq!(variant.available(), 10);
//! # });
//! ```

pub mod mocks;
pub mod store;

pub use mocks::{FixedClock, SteppingClock, test_clock};
pub use store::InMemoryStockStore;

/// Install a fmt tracing subscriber for a test run, honoring `RUST_LOG`.
///
/// Safe to call from every test; only the first call wins.
pub fn init_test_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

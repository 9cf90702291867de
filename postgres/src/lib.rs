//! `PostgreSQL` stock store for Stockpile.
//!
//! Production implementation of
//! [`StockStore`](stockpile_core::store::StockStore). Every write is a
//! single transaction that takes a row-level `FOR UPDATE` lock on the
//! variant's counters, so concurrent checkouts against the same variant
//! serialize at the database. Uses runtime-checked sqlx queries, so the
//! crate builds without a live database.
//!
//! # Example
//!
//! ```ignore
//! use stockpile_postgres::PostgresStockStore;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PostgresStockStore::connect("postgres://localhost/shop").await?;
//!     store.migrate().await?;
//!     Ok(())
//! }
//! ```

pub mod store;

pub use store::PostgresStockStore;

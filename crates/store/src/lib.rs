//! Storage for the order fulfillment engine.
//!
//! This crate provides:
//! - The stock ledger with its two consumption flows
//! - Order, order-item and vendor reservation records
//! - In-memory and PostgreSQL implementations behind the same traits

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use store::{OrderStore, OrderUpdate, ReservationStore, StockLedger, Store};

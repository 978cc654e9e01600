//! Domain records for the order fulfillment engine.
//!
//! This crate provides:
//! - Order and order-item records with typed status fields
//! - Vendor reservation records and their compensation outcome
//! - Stock ledger counters and the two consumption flows
//! - The pure derivation of order state from fulfillment leg outcomes

pub mod error;
pub mod order;
pub mod reservation;
mod status;
pub mod stock;

pub use error::DomainError;
pub use order::{
    Address, CustomerIdentity, DerivedState, FulfillmentStatus, ItemFulfillmentStatus, ItemSource,
    LegOutcome, Money, Order, OrderItem, OrderStatus, PaymentStatus, PlaceOrder, PricedLine,
    Resolution, resolve,
};
pub use reservation::{CompensationOutcome, Reservation, ReservationStatus, ReservationSummary};
pub use stock::{StockFlow, StockLevels};

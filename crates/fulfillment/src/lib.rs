//! Order fulfillment for a reseller of vendor-sourced and own goods.
//!
//! This crate provides:
//! - [`OrderService`]: checkout against the priced catalog and order details
//! - [`ReservationCoordinator`]: all-or-nothing vendor reservations
//! - [`FulfillmentSaga`]: the payment-success handler with compensation
//! - [`CancellationHandler`]: payment failure and customer cancellation
//! - [`VendorOrderBatch`]: idempotent consolidated vendor orders
//! - [`VendorClient`] with HTTP, timeout and in-memory implementations

pub mod batch;
pub mod cancellation;
pub mod catalog;
pub mod coordinator;
pub mod error;
pub mod orders;
pub mod saga;
pub mod settings;
pub mod vendor;

pub use batch::{BatchFailure, BatchReport, VendorOrderBatch};
pub use cancellation::CancellationHandler;
pub use catalog::{Catalog, CatalogEntry, InMemoryCatalog};
pub use coordinator::ReservationCoordinator;
pub use error::{FailureKind, FulfillmentError, ItemFailure, Result};
pub use orders::{CartLine, CreateOrder, OrderCreated, OrderItemView, OrderService, OrderView};
pub use saga::{FulfillmentSaga, PaymentOutcome};
pub use settings::{OrderSettings, VendorSettings};
pub use vendor::{
    HttpVendorClient, InMemoryVendorClient, SalesOrderLine, SalesOrderRequest,
    TimeoutVendorClient, VendorClient, VendorError,
};

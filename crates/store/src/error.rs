use common::{OrderId, OrderItemId, ProductId, ReservationId};
use domain::{DomainError, OrderStatus, ReservationStatus};
use thiserror::Error;

/// Errors that can occur when reading or writing fulfillment state.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The stock ledger cannot cover the requested quantity.
    #[error("Insufficient stock for {product_id}: requested {requested}, available {available}")]
    NotAvailable {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("Order item not found: {0}")]
    ItemNotFound(OrderItemId),

    #[error("Reservation not found: {0}")]
    ReservationNotFound(ReservationId),

    /// A conditional order transition found the order in another status.
    #[error("Order {order_id} is {current}, which does not allow this transition")]
    StatusConflict {
        order_id: OrderId,
        current: OrderStatus,
    },

    /// A conditional reservation transition found it in another status.
    #[error("Reservation {reservation_id} is {current}, which does not allow this transition")]
    ReservationConflict {
        reservation_id: ReservationId,
        current: ReservationStatus,
    },

    /// The order already carries a vendor order id.
    #[error("Order {order_id} already has vendor order {existing}")]
    VendorOrderAlreadySet { order_id: OrderId, existing: String },

    /// The operation only applies to own-sourced items.
    #[error("Order item {0} is not an own-stock item")]
    NotOwnItem(OrderItemId),

    /// A stored row could not be turned back into a record.
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Decode error: {0}")]
    Decode(#[from] DomainError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

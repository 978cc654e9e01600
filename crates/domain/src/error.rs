//! Domain error types.

use common::{OrderItemId, ProductId};
use thiserror::Error;

/// Errors raised while building or decoding domain records.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// An order needs at least one line.
    #[error("Order has no items")]
    EmptyCart,

    /// Line quantities must be positive.
    #[error("Invalid quantity for {product_id}: {quantity} (must be greater than 0)")]
    InvalidQuantity { product_id: ProductId, quantity: u32 },

    /// Unit prices cannot be negative.
    #[error("Invalid price for {product_id}: {cents} cents")]
    InvalidPrice { product_id: ProductId, cents: i64 },

    /// A guest order needs a contact email.
    #[error("Guest orders require a contact email")]
    MissingGuestContact,

    /// The payment method was left blank.
    #[error("Payment method is required")]
    MissingPaymentMethod,

    /// Vendor lines must carry the vendor's article id.
    #[error("Vendor item {product_id} has no vendor article id")]
    MissingArticleId { product_id: ProductId },

    /// Reservations exist only for vendor-sourced lines.
    #[error("Order item {0} is not vendor-sourced")]
    NotVendorItem(OrderItemId),

    /// A stored status string did not match any known variant.
    #[error("Unknown {kind} value: {value}")]
    UnknownStatus { kind: &'static str, value: String },
}

/// Convenience type alias for domain results.
pub type Result<T> = std::result::Result<T, DomainError>;

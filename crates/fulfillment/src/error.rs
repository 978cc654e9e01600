//! Fulfillment error types.

use common::{OrderId, OrderItemId, ProductId};
use domain::{DomainError, OrderItem};
use serde::Serialize;
use store::StoreError;
use thiserror::Error;

use crate::vendor::VendorError;

/// Which fulfillment leg an item failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    VendorReservation,
    OwnStockDeduction,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::VendorReservation => write!(f, "vendor_reservation"),
            FailureKind::OwnStockDeduction => write!(f, "own_stock_deduction"),
        }
    }
}

/// A single order line that could not be secured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub kind: FailureKind,
    pub order_item_id: OrderItemId,
    pub product_id: ProductId,
    pub message: String,
}

impl ItemFailure {
    pub fn new(kind: FailureKind, item: &OrderItem, message: impl Into<String>) -> Self {
        Self {
            kind,
            order_item_id: item.id,
            product_id: item.product_id.clone(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.product_id, self.kind, self.message)
    }
}

fn summarize(failures: &[ItemFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors that can occur while creating, fulfilling or cancelling orders.
#[derive(Debug, Error)]
pub enum FulfillmentError {
    /// Bad input from the caller.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Order data rejected by the domain rules.
    #[error("Invalid order: {0}")]
    InvalidOrder(#[from] DomainError),

    /// The stock ledger cannot cover the requested quantity.
    #[error("Insufficient stock for {product_id}: requested {requested}, available {available}")]
    NotAvailable {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// Network failure, timeout or business rejection from the vendor.
    #[error("Vendor API error: {0}")]
    VendorApi(#[from] VendorError),

    /// Storage failure.
    #[error("Persistence error: {0}")]
    Persistence(StoreError),

    /// The requested transition is not allowed from the order's state.
    #[error("Consistency violation: {0}")]
    ConsistencyViolation(String),

    /// At least one vendor item could not be reserved; none remain reserved.
    #[error("Vendor reservation failed for {} item(s): {}", .failures.len(), summarize(.failures))]
    ReservationFailed { failures: Vec<ItemFailure> },

    /// Payment was captured but fulfillment could not be secured.
    #[error("Payment captured for order {order_number} but fulfillment failed: {reason}")]
    FulfillmentAborted {
        order_number: String,
        reason: String,
    },

    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),
}

impl From<StoreError> for FulfillmentError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotAvailable {
                product_id,
                requested,
                available,
            } => FulfillmentError::NotAvailable {
                product_id,
                requested,
                available,
            },
            StoreError::OrderNotFound(order_id) => FulfillmentError::OrderNotFound(order_id),
            StoreError::StatusConflict { order_id, current } => {
                FulfillmentError::ConsistencyViolation(format!(
                    "order {order_id} is {current}, which does not allow this transition"
                ))
            }
            StoreError::VendorOrderAlreadySet { order_id, existing } => {
                FulfillmentError::ConsistencyViolation(format!(
                    "order {order_id} already has vendor order {existing}"
                ))
            }
            other => FulfillmentError::Persistence(other),
        }
    }
}

/// Convenience type alias for fulfillment results.
pub type Result<T> = std::result::Result<T, FulfillmentError>;

#[cfg(test)]
mod tests {
    use super::*;
    use domain::OrderStatus;

    #[test]
    fn test_status_conflict_maps_to_consistency_violation() {
        let err: FulfillmentError = StoreError::StatusConflict {
            order_id: OrderId::new(),
            current: OrderStatus::Shipped,
        }
        .into();
        assert!(
            matches!(err, FulfillmentError::ConsistencyViolation(ref m) if m.contains("shipped"))
        );
    }

    #[test]
    fn test_reservation_failed_lists_every_item() {
        let failure = |product: &str| ItemFailure {
            kind: FailureKind::VendorReservation,
            order_item_id: OrderItemId::new(),
            product_id: ProductId::new(product),
            message: "out of stock".to_string(),
        };
        let err = FulfillmentError::ReservationFailed {
            failures: vec![failure("P1"), failure("P3")],
        };
        let text = err.to_string();
        assert!(text.contains("2 item(s)"));
        assert!(text.contains("P1 (vendor_reservation): out of stock"));
        assert!(text.contains("P3"));
    }
}

//! Order and order-item status machines.

use serde::{Deserialize, Serialize};

use crate::status::status_strings;

/// The business state of an order.
///
/// State transitions:
/// ```text
/// Pending ──► (payment success) ──┬──► Reserved ──► Processing ──► Shipped ──► Delivered
///    │                            ├──► Processing
///    │                            └──► PaymentPending ──► (retry)
///    │
///    └──── Pending / PaymentPending / Reserved ──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Created, awaiting payment.
    #[default]
    Pending,

    /// Payment was captured but fulfillment could not be secured.
    PaymentPending,

    /// Vendor stock is held, awaiting the consolidated vendor order.
    Reserved,

    /// Goods are being fulfilled.
    Processing,

    /// Handed to the carrier.
    Shipped,

    /// Received by the customer (terminal state).
    Delivered,

    /// Cancelled before shipping (terminal state).
    Cancelled,
}

status_strings!(OrderStatus, "order status", {
    Pending => "pending",
    PaymentPending => "payment_pending",
    Reserved => "reserved",
    Processing => "processing",
    Shipped => "shipped",
    Delivered => "delivered",
    Cancelled => "cancelled",
});

impl OrderStatus {
    /// Statuses from which an order may be cancelled.
    pub const CANCELLABLE: [OrderStatus; 3] = [
        OrderStatus::Pending,
        OrderStatus::PaymentPending,
        OrderStatus::Reserved,
    ];

    /// Returns true if the order can be cancelled in this state.
    pub fn can_cancel(&self) -> bool {
        Self::CANCELLABLE.contains(self)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }
}

/// Payment state of an order, independent of fulfillment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Unpaid,
    Paid,
    Failed,
    Refunded,
}

status_strings!(PaymentStatus, "payment status", {
    Unpaid => "unpaid",
    Paid => "paid",
    Failed => "failed",
    Refunded => "refunded",
});

/// How much of an order's goods are secured or on their way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentStatus {
    /// Nothing secured yet.
    #[default]
    Pending,

    /// Vendor stock is reserved; the vendor order has not been placed.
    VendorPending,

    /// Every own item was deducted from local stock; there are no vendor items
    /// or the vendor leg failed.
    OwnFulfilled,

    /// Own items are fulfilled and vendor items are reserved or ordered.
    PartiallyFulfilled,

    /// The consolidated vendor order was placed and no own items were fulfilled.
    VendorFulfilled,

    Shipped,

    /// Fulfillment could not be secured for any leg (terminal until retried).
    Failed,
}

status_strings!(FulfillmentStatus, "fulfillment status", {
    Pending => "pending",
    VendorPending => "vendor_pending",
    OwnFulfilled => "own_fulfilled",
    PartiallyFulfilled => "partially_fulfilled",
    VendorFulfilled => "vendor_fulfilled",
    Shipped => "shipped",
    Failed => "failed",
});

impl FulfillmentStatus {
    /// Fulfillment status after the consolidated vendor order is accepted.
    pub fn after_vendor_submission(own_items_fulfilled: bool) -> Self {
        if own_items_fulfilled {
            FulfillmentStatus::PartiallyFulfilled
        } else {
            FulfillmentStatus::VendorFulfilled
        }
    }
}

/// Fulfillment state of a single order line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ItemFulfillmentStatus {
    #[default]
    Pending,

    /// Vendor stock is held for this line.
    Reserved,

    /// Own stock was deducted for this line.
    StockDeducted,

    /// Own line is secured and counted as fulfilled.
    Fulfilled,

    /// Included in a consolidated vendor order.
    VendorOrdered,

    Shipped,

    Cancelled,

    /// Stock could not be secured for this line.
    Failed,
}

status_strings!(ItemFulfillmentStatus, "item fulfillment status", {
    Pending => "pending",
    Reserved => "reserved",
    StockDeducted => "stock_deducted",
    Fulfilled => "fulfilled",
    VendorOrdered => "vendor_ordered",
    Shipped => "shipped",
    Cancelled => "cancelled",
    Failed => "failed",
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_states() {
        assert_eq!(OrderStatus::default(), OrderStatus::Pending);
        assert_eq!(PaymentStatus::default(), PaymentStatus::Unpaid);
        assert_eq!(FulfillmentStatus::default(), FulfillmentStatus::Pending);
        assert_eq!(
            ItemFulfillmentStatus::default(),
            ItemFulfillmentStatus::Pending
        );
    }

    #[test]
    fn test_can_cancel() {
        assert!(OrderStatus::Pending.can_cancel());
        assert!(OrderStatus::PaymentPending.can_cancel());
        assert!(OrderStatus::Reserved.can_cancel());
        assert!(!OrderStatus::Processing.can_cancel());
        assert!(!OrderStatus::Shipped.can_cancel());
        assert!(!OrderStatus::Delivered.can_cancel());
        assert!(!OrderStatus::Cancelled.can_cancel());
    }

    #[test]
    fn test_string_round_trip_matches_serde() {
        for status in [
            FulfillmentStatus::Pending,
            FulfillmentStatus::VendorPending,
            FulfillmentStatus::OwnFulfilled,
            FulfillmentStatus::PartiallyFulfilled,
            FulfillmentStatus::VendorFulfilled,
            FulfillmentStatus::Shipped,
            FulfillmentStatus::Failed,
        ] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
            assert_eq!(status.as_str().parse::<FulfillmentStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        let err = "teleported".parse::<OrderStatus>().unwrap_err();
        assert!(err.to_string().contains("teleported"));
    }

    #[test]
    fn test_after_vendor_submission() {
        assert_eq!(
            FulfillmentStatus::after_vendor_submission(true),
            FulfillmentStatus::PartiallyFulfilled
        );
        assert_eq!(
            FulfillmentStatus::after_vendor_submission(false),
            FulfillmentStatus::VendorFulfilled
        );
    }
}

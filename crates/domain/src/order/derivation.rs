//! Order state derived from the outcome of each fulfillment leg.

use super::state::{FulfillmentStatus, OrderStatus};

/// Outcome of one fulfillment leg (vendor reservation or own deduction).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegOutcome {
    /// The order has no items for this leg.
    Absent,
    /// Every item of the leg was secured.
    Succeeded,
    /// At least one item of the leg could not be secured.
    Failed,
}

impl LegOutcome {
    /// Builds an outcome from the number of items attempted and failed.
    pub fn from_counts(attempted: usize, failed: usize) -> Self {
        match (attempted, failed) {
            (0, _) => LegOutcome::Absent,
            (_, 0) => LegOutcome::Succeeded,
            _ => LegOutcome::Failed,
        }
    }
}

/// Order state to record once both legs have run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DerivedState {
    pub status: OrderStatus,
    pub fulfillment_status: FulfillmentStatus,
    /// Successfully deducted own items move on to `fulfilled`.
    pub own_items_fulfilled: bool,
}

/// Result of combining the two leg outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Derived(DerivedState),
    /// No combination of secured legs yields a fulfillable order.
    Unfulfillable,
}

/// Derives order status and fulfillment status from the leg outcomes.
///
/// | vendor    | own       | status     | fulfillment         |
/// |-----------|-----------|------------|---------------------|
/// | succeeded | succeeded | processing | partially_fulfilled |
/// | succeeded | failed    | reserved   | vendor_pending      |
/// | failed    | succeeded | processing | own_fulfilled       |
/// | succeeded | absent    | reserved   | vendor_pending      |
/// | absent    | succeeded | processing | own_fulfilled       |
///
/// Every other combination is [`Resolution::Unfulfillable`].
pub fn resolve(vendor: LegOutcome, own: LegOutcome) -> Resolution {
    use LegOutcome::*;

    let derived = |status, fulfillment_status, own_items_fulfilled| {
        Resolution::Derived(DerivedState {
            status,
            fulfillment_status,
            own_items_fulfilled,
        })
    };

    match (vendor, own) {
        (Succeeded, Succeeded) => derived(
            OrderStatus::Processing,
            FulfillmentStatus::PartiallyFulfilled,
            true,
        ),
        (Succeeded, Failed) | (Succeeded, Absent) => derived(
            OrderStatus::Reserved,
            FulfillmentStatus::VendorPending,
            false,
        ),
        (Failed, Succeeded) | (Absent, Succeeded) => derived(
            OrderStatus::Processing,
            FulfillmentStatus::OwnFulfilled,
            true,
        ),
        (Failed, Failed) | (Failed, Absent) | (Absent, Failed) | (Absent, Absent) => {
            Resolution::Unfulfillable
        }
    }
}

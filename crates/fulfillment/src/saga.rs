//! Payment-success handling: securing an order's goods.
//!
//! The saga runs two legs. Vendor items are reserved through the
//! [`ReservationCoordinator`]; own items are deducted from the local ledger.
//! A vendor outage never blocks the own leg. Once both legs have run, the
//! order state is derived from their outcomes, or the local deductions are
//! rolled back when nothing fulfillable was secured.

use common::{OrderId, RequestContext};
use domain::{
    DerivedState, FulfillmentStatus, ItemFulfillmentStatus, LegOutcome, Order, OrderItem,
    OrderStatus, Resolution, resolve,
};
use serde::Serialize;
use store::{OrderStore, OrderUpdate, Store, StoreError};

use crate::coordinator::ReservationCoordinator;
use crate::error::{FailureKind, FulfillmentError, ItemFailure, Result};
use crate::vendor::VendorClient;

/// Result of a successful payment-success run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentOutcome {
    pub order_number: String,
    pub status: OrderStatus,
    pub fulfillment_status: FulfillmentStatus,
    pub message: String,
    /// Lines that could not be secured even though the order proceeds.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<ItemFailure>,
}

/// Drives fulfillment once an order's payment has been captured.
pub struct FulfillmentSaga<S, V> {
    store: S,
    coordinator: ReservationCoordinator<S, V>,
}

impl<S, V> FulfillmentSaga<S, V>
where
    S: Store,
    V: VendorClient,
{
    pub fn new(store: S, vendor: V) -> Self {
        let coordinator = ReservationCoordinator::new(store.clone(), vendor);
        Self { store, coordinator }
    }

    /// Handles a captured payment for `order_id`.
    ///
    /// Accepted only for an unpaid `pending` order or a `payment_pending`
    /// order (a retry after an aborted run). Returns
    /// [`FulfillmentError::FulfillmentAborted`] when payment is recorded but
    /// no fulfillable part of the order could be secured.
    #[tracing::instrument(skip(self, ctx), fields(request_id = %ctx.request_id))]
    pub async fn process_payment_success(
        &self,
        ctx: &RequestContext,
        order_id: OrderId,
        transaction_id: &str,
    ) -> Result<PaymentOutcome> {
        if transaction_id.trim().is_empty() {
            return Err(FulfillmentError::Validation(
                "transaction id must not be empty".to_string(),
            ));
        }

        let started = std::time::Instant::now();
        let result = self.run(order_id, transaction_id).await;

        let outcome = match &result {
            Ok(o) if o.failures.is_empty() => "completed",
            Ok(_) => "partial",
            Err(FulfillmentError::FulfillmentAborted { .. }) => "aborted",
            Err(_) => "error",
        };
        metrics::counter!("fulfillment_saga_total", "outcome" => outcome).increment(1);
        metrics::histogram!("fulfillment_saga_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        result
    }

    async fn run(&self, order_id: OrderId, transaction_id: &str) -> Result<PaymentOutcome> {
        // 1. Record the payment; this also guards against re-entry.
        let order = self.store.record_payment(order_id, transaction_id).await?;
        tracing::info!(order_number = %order.order_number, "payment recorded");

        // The order is claimed now. Aborts and lost races settle it
        // themselves; any other error must hand it back for a retry.
        match self.secure(&order).await {
            Err(
                e @ (FulfillmentError::FulfillmentAborted { .. }
                | FulfillmentError::ConsistencyViolation(_)),
            ) => Err(e),
            Err(e) => Err(self.recover(&order, e).await),
            Ok(outcome) => Ok(outcome),
        }
    }

    async fn secure(&self, order: &Order) -> Result<PaymentOutcome> {
        // 2. Split the order into its two legs.
        let items = self.store.order_items(order.id).await?;
        let (vendor_items, own_items): (Vec<OrderItem>, Vec<OrderItem>) =
            items.into_iter().partition(OrderItem::is_vendor);

        // 3. Vendor leg. A failure is recorded, never fatal here.
        let mut failures = Vec::new();
        if !vendor_items.is_empty() {
            match self.coordinator.reserve_all(order.id, &vendor_items).await {
                Ok(_) => {}
                Err(FulfillmentError::ReservationFailed { failures: vendor }) => {
                    failures.extend(vendor)
                }
                Err(e) => return Err(e),
            }
        }
        let vendor_failed = failures.len();

        // 4. Own leg.
        let mut deducted = Vec::new();
        for item in &own_items {
            match self.store.deduct_item_stock(item.id).await {
                Ok(_) => deducted.push(item),
                Err(e) => {
                    tracing::warn!(
                        product_id = %item.product_id,
                        error = %e,
                        "own stock deduction failed"
                    );
                    if let Err(e) = self
                        .store
                        .set_item_status(item.id, ItemFulfillmentStatus::Failed)
                        .await
                    {
                        tracing::warn!(error = %e, "failed to mark item failed");
                    }
                    failures.push(ItemFailure::new(
                        FailureKind::OwnStockDeduction,
                        item,
                        e.to_string(),
                    ));
                }
            }
        }

        let vendor_leg = LegOutcome::from_counts(vendor_items.len(), vendor_failed);
        let own_leg = LegOutcome::from_counts(own_items.len(), own_items.len() - deducted.len());

        // 5. The vendor leg failed first and own stock was taken: undo it.
        let vendor_failed_first = failures
            .first()
            .is_some_and(|f| f.kind == FailureKind::VendorReservation);
        if vendor_failed_first && !deducted.is_empty() {
            return Err(self.abort(order, &deducted, &failures).await);
        }

        // 6. Derive the order state from the legs.
        match resolve(vendor_leg, own_leg) {
            Resolution::Derived(state) => self.complete(order, &deducted, state, failures).await,
            Resolution::Unfulfillable => Err(self.abort(order, &deducted, &failures).await),
        }
    }

    async fn complete(
        &self,
        order: &Order,
        deducted: &[&OrderItem],
        state: DerivedState,
        failures: Vec<ItemFailure>,
    ) -> Result<PaymentOutcome> {
        // Items first, so a failure here still finds the order `pending`.
        if state.own_items_fulfilled {
            for item in deducted {
                self.store
                    .set_item_status(item.id, ItemFulfillmentStatus::Fulfilled)
                    .await?;
            }
        }

        let updated = match self
            .store
            .update_order(
                order.id,
                &[OrderStatus::Pending],
                OrderUpdate::new()
                    .status(state.status)
                    .fulfillment_status(state.fulfillment_status),
            )
            .await
        {
            Ok(updated) => updated,
            Err(StoreError::StatusConflict { current, .. }) => {
                // Cancelled while the legs ran: give everything back.
                tracing::warn!(current = %current, "order changed during fulfillment");
                self.release_secured(order.id, deducted).await;
                return Err(FulfillmentError::ConsistencyViolation(format!(
                    "order {} became {current} during fulfillment",
                    order.order_number
                )));
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!(
            status = %updated.status,
            fulfillment_status = %updated.fulfillment_status,
            failed_items = failures.len(),
            "fulfillment secured"
        );

        Ok(PaymentOutcome {
            order_number: updated.order_number,
            status: updated.status,
            fulfillment_status: updated.fulfillment_status,
            message: describe(state, failures.len()),
            failures,
        })
    }

    /// Rolls back own deductions and parks the order in `payment_pending`.
    async fn abort(
        &self,
        order: &Order,
        deducted: &[&OrderItem],
        failures: &[ItemFailure],
    ) -> FulfillmentError {
        self.park(order, deducted).await;

        let reason = if failures.is_empty() {
            "no items could be secured".to_string()
        } else {
            failures
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ")
        };
        tracing::error!(
            order_number = %order.order_number,
            reason = %reason,
            "payment captured but fulfillment failed"
        );

        FulfillmentError::FulfillmentAborted {
            order_number: order.order_number.clone(),
            reason,
        }
    }

    /// Undoes whatever an interrupted run secured and parks the order, so
    /// the payment notification can be retried.
    async fn recover(&self, order: &Order, error: FulfillmentError) -> FulfillmentError {
        tracing::error!(
            order_number = %order.order_number,
            error = %error,
            "fulfillment interrupted, releasing secured stock"
        );

        if let Err(e) = self.coordinator.unreserve_all_for_order(order.id).await {
            tracing::error!(error = %e, "failed to release vendor reservations");
        }
        let own_items: Vec<OrderItem> = match self.store.order_items(order.id).await {
            Ok(items) => items.into_iter().filter(|i| !i.is_vendor()).collect(),
            Err(e) => {
                tracing::error!(error = %e, "failed to load order items");
                Vec::new()
            }
        };
        let own_items: Vec<&OrderItem> = own_items.iter().collect();
        self.park(order, &own_items).await;

        error
    }

    /// Restores held own deductions and moves the order from `pending` to
    /// `payment_pending`. If a cancellation got there first, the restored
    /// lines are cancelled instead.
    async fn park(&self, order: &Order, deducted: &[&OrderItem]) {
        for item in deducted {
            if let Err(e) = self
                .store
                .restore_item_stock(item.id, ItemFulfillmentStatus::Pending)
                .await
            {
                tracing::error!(
                    product_id = %item.product_id,
                    error = %e,
                    "failed to restore own stock deduction"
                );
            }
        }

        let parked = self
            .store
            .update_order(
                order.id,
                &[OrderStatus::Pending],
                OrderUpdate::new()
                    .status(OrderStatus::PaymentPending)
                    .fulfillment_status(FulfillmentStatus::Failed),
            )
            .await;
        match parked {
            Ok(_) => {}
            Err(StoreError::StatusConflict { current, .. }) => {
                tracing::warn!(current = %current, "order changed during fulfillment");
                if current == OrderStatus::Cancelled {
                    for item in deducted {
                        if let Err(e) = self
                            .store
                            .set_item_status(item.id, ItemFulfillmentStatus::Cancelled)
                            .await
                        {
                            tracing::warn!(error = %e, "failed to cancel order item");
                        }
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to park order in payment_pending"),
        }
    }

    async fn release_secured(&self, order_id: OrderId, deducted: &[&OrderItem]) {
        if let Err(e) = self.coordinator.unreserve_all_for_order(order_id).await {
            tracing::error!(error = %e, "failed to release vendor reservations");
        }
        for item in deducted {
            if let Err(e) = self
                .store
                .restore_item_stock(item.id, ItemFulfillmentStatus::Cancelled)
                .await
            {
                tracing::error!(error = %e, "failed to restore own stock deduction");
            }
        }
    }
}

fn describe(state: DerivedState, failed_items: usize) -> String {
    let base = match state.fulfillment_status {
        FulfillmentStatus::PartiallyFulfilled => {
            "Payment received; own items fulfilled and vendor items reserved"
        }
        FulfillmentStatus::VendorPending => "Payment received; vendor items reserved",
        FulfillmentStatus::OwnFulfilled => "Payment received; own items fulfilled",
        _ => "Payment received",
    };
    if failed_items == 0 {
        base.to_string()
    } else {
        format!("{base}; {failed_items} item(s) could not be secured")
    }
}

//! Cancellation and payment-failure handling.

use common::{OrderId, RequestContext};
use domain::{ItemFulfillmentStatus, OrderStatus, PaymentStatus};
use store::{OrderStore, OrderUpdate, Store};

use crate::coordinator::ReservationCoordinator;
use crate::error::{FulfillmentError, Result};
use crate::vendor::VendorClient;

/// Cancels orders and gives back everything they hold.
pub struct CancellationHandler<S, V> {
    store: S,
    coordinator: ReservationCoordinator<S, V>,
}

impl<S, V> CancellationHandler<S, V>
where
    S: Store,
    V: VendorClient,
{
    pub fn new(store: S, vendor: V) -> Self {
        let coordinator = ReservationCoordinator::new(store.clone(), vendor);
        Self { store, coordinator }
    }

    /// Cancels an order whose payment failed.
    ///
    /// Releasing held stock is best-effort and never blocks the cancellation.
    /// Repeating the call for an already cancelled order is a no-op.
    #[tracing::instrument(skip(self, ctx), fields(request_id = %ctx.request_id))]
    pub async fn process_payment_failure(
        &self,
        ctx: &RequestContext,
        order_id: OrderId,
        reason: &str,
    ) -> Result<()> {
        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or(FulfillmentError::OrderNotFound(order_id))?;
        if order.status == OrderStatus::Cancelled {
            tracing::info!(order_number = %order.order_number, "order already cancelled");
            return Ok(());
        }

        let order = self
            .store
            .update_order(
                order_id,
                &OrderStatus::CANCELLABLE,
                OrderUpdate::new()
                    .status(OrderStatus::Cancelled)
                    .payment_status(PaymentStatus::Failed)
                    .cancellation_reason(reason),
            )
            .await?;

        metrics::counter!("order_cancellations_total", "reason" => "payment_failure").increment(1);
        tracing::info!(
            order_number = %order.order_number,
            reason,
            "order cancelled after payment failure"
        );

        self.release_holdings(order_id).await;
        Ok(())
    }

    /// Cancels an order on request.
    ///
    /// Only `pending`, `payment_pending` and `reserved` orders can be
    /// cancelled; anything else is a [`FulfillmentError::ConsistencyViolation`]
    /// and changes nothing. A paid order is marked `refunded`.
    #[tracing::instrument(skip(self, ctx), fields(request_id = %ctx.request_id))]
    pub async fn cancel_order(
        &self,
        ctx: &RequestContext,
        order_id: OrderId,
        reason: &str,
    ) -> Result<()> {
        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or(FulfillmentError::OrderNotFound(order_id))?;
        if !order.status.can_cancel() {
            return Err(FulfillmentError::ConsistencyViolation(format!(
                "order {} cannot be cancelled while {}",
                order.order_number, order.status
            )));
        }

        let cancelled = self
            .store
            .update_order(
                order_id,
                &OrderStatus::CANCELLABLE,
                OrderUpdate::new()
                    .status(OrderStatus::Cancelled)
                    .cancellation_reason(reason),
            )
            .await?;

        if cancelled.payment_status == PaymentStatus::Paid {
            self.store
                .update_order(
                    order_id,
                    &[OrderStatus::Cancelled],
                    OrderUpdate::new().payment_status(PaymentStatus::Refunded),
                )
                .await?;
        }

        metrics::counter!("order_cancellations_total", "reason" => "customer").increment(1);
        tracing::info!(order_number = %cancelled.order_number, reason, "order cancelled");

        self.release_holdings(order_id).await;
        Ok(())
    }

    /// Unreserves vendor stock, restores own deductions and cancels items.
    async fn release_holdings(&self, order_id: OrderId) {
        match self.coordinator.unreserve_all_for_order(order_id).await {
            Ok(released) => tracing::debug!(released, "vendor reservations released"),
            Err(e) => tracing::warn!(error = %e, "failed to release vendor reservations"),
        }

        let items = match self.store.order_items(order_id).await {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!(error = %e, "failed to load order items");
                return;
            }
        };

        for item in items {
            let result = if item.stock_held {
                self.store
                    .restore_item_stock(item.id, ItemFulfillmentStatus::Cancelled)
                    .await
                    .map(|_| ())
            } else {
                self.store
                    .set_item_status(item.id, ItemFulfillmentStatus::Cancelled)
                    .await
            };
            if let Err(e) = result {
                tracing::warn!(
                    product_id = %item.product_id,
                    error = %e,
                    "failed to cancel order item"
                );
            }
        }
    }
}

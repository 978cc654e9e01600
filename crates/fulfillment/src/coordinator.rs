//! All-or-nothing reservation of an order's vendor items.

use chrono::Utc;
use common::{OrderId, ReservationId};
use domain::{CompensationOutcome, OrderItem, Reservation, ReservationStatus, ReservationSummary};
use store::{ReservationStore, Store, StoreError};

use crate::error::{FailureKind, FulfillmentError, ItemFailure, Result};
use crate::vendor::VendorClient;

/// Reserves groups of vendor items at the vendor and in the stock ledger.
///
/// Every item is attempted, even after a failure, so the caller sees every
/// problem at once. If any item fails, the items that succeeded are
/// released again before the aggregate error is returned: afterwards either
/// all items are `reserved` or none are.
pub struct ReservationCoordinator<S, V> {
    store: S,
    vendor: V,
}

impl<S, V> ReservationCoordinator<S, V>
where
    S: Store,
    V: VendorClient,
{
    pub fn new(store: S, vendor: V) -> Self {
        Self { store, vendor }
    }

    /// Reserves every vendor item of an order, or none of them.
    ///
    /// Returns [`FulfillmentError::ReservationFailed`] listing every item
    /// that could not be reserved.
    #[tracing::instrument(skip(self, items), fields(items = items.len()))]
    pub async fn reserve_all(
        &self,
        order_id: OrderId,
        items: &[OrderItem],
    ) -> Result<Vec<ReservationId>> {
        let mut secured = Vec::with_capacity(items.len());
        let mut failures = Vec::new();

        for item in items {
            metrics::counter!("reservations_attempted_total").increment(1);

            match self.reserve_one(item).await {
                Ok(reservation_id) => secured.push(reservation_id),
                Err(e) => {
                    metrics::counter!("reservations_failed_total").increment(1);
                    tracing::warn!(
                        product_id = %item.product_id,
                        error = %e,
                        "vendor item reservation failed"
                    );
                    failures.push(ItemFailure::new(
                        FailureKind::VendorReservation,
                        item,
                        e.to_string(),
                    ));
                }
            }
        }

        if failures.is_empty() {
            tracing::info!(reserved = secured.len(), "all vendor items reserved");
            return Ok(secured);
        }

        for reservation_id in &secured {
            if let Err(e) = self.unreserve(*reservation_id).await {
                tracing::error!(
                    reservation_id = %reservation_id,
                    error = %e,
                    "failed to roll back reservation"
                );
            }
        }

        Err(FulfillmentError::ReservationFailed { failures })
    }

    async fn reserve_one(&self, item: &OrderItem) -> Result<ReservationId> {
        let reservation = Reservation::pending(item, Utc::now())?;
        self.store.insert_reservation(&reservation).await?;

        let external_id = match self
            .vendor
            .reserve_item(&reservation.vendor_article_id, reservation.quantity)
            .await
        {
            Ok(external_id) => external_id,
            Err(e) => {
                self.store
                    .fail_reservation(reservation.id, &e.to_string())
                    .await?;
                return Err(e.into());
            }
        };

        match self
            .store
            .confirm_reservation(reservation.id, &external_id)
            .await
        {
            Ok(levels) => {
                tracing::debug!(
                    reservation_id = %reservation.id,
                    external_id = %external_id,
                    available = levels.available_quantity,
                    "reservation confirmed"
                );
                Ok(reservation.id)
            }
            Err(e) => {
                // The vendor holds stock the local ledger cannot back.
                let outcome = self.release_at_vendor(&external_id).await;
                let mut message = e.to_string();
                if let Some(reason) = outcome.failed_reason {
                    message = format!("{message}; vendor release failed: {reason}");
                }
                self.store
                    .fail_reservation(reservation.id, &message)
                    .await?;
                Err(e.into())
            }
        }
    }

    async fn release_at_vendor(&self, external_id: &str) -> CompensationOutcome {
        match self.vendor.release_item(external_id).await {
            Ok(()) => CompensationOutcome::succeeded(),
            Err(e) => {
                tracing::error!(
                    external_id = %external_id,
                    error = %e,
                    "vendor release failed, manual reconciliation required"
                );
                CompensationOutcome::failed(e.to_string())
            }
        }
    }

    /// Releases one reservation at the vendor and in the ledger.
    ///
    /// A no-op returning false unless the reservation is `reserved` with an
    /// external id. A failing vendor release is recorded on the reservation
    /// and never returned.
    #[tracing::instrument(skip(self))]
    pub async fn unreserve(&self, reservation_id: ReservationId) -> Result<bool> {
        let reservation = self
            .store
            .get_reservation(reservation_id)
            .await?
            .ok_or(StoreError::ReservationNotFound(reservation_id))?;

        let Some(external_id) = reservation
            .external_reservation_id
            .as_deref()
            .filter(|_| reservation.is_releasable())
        else {
            return Ok(false);
        };

        let outcome = self.release_at_vendor(external_id).await;
        let released = self
            .store
            .release_reservation(reservation_id, outcome)
            .await?;

        if released {
            metrics::counter!("reservation_compensations_total").increment(1);
            tracing::info!(product_id = %reservation.product_id, "reservation released");
        }
        Ok(released)
    }

    /// Releases every `reserved` reservation of an order.
    ///
    /// Failures are logged per reservation; returns how many were released.
    #[tracing::instrument(skip(self))]
    pub async fn unreserve_all_for_order(&self, order_id: OrderId) -> Result<usize> {
        let reservations = self.store.order_reservations(order_id).await?;
        let mut released = 0;

        for reservation in reservations
            .iter()
            .filter(|r| r.status == ReservationStatus::Reserved)
        {
            match self.unreserve(reservation.id).await {
                Ok(true) => released += 1,
                Ok(false) => {}
                Err(e) => tracing::warn!(
                    reservation_id = %reservation.id,
                    error = %e,
                    "failed to release reservation"
                ),
            }
        }

        Ok(released)
    }

    /// Counts the order's reservations per status.
    pub async fn status(&self, order_id: OrderId) -> Result<ReservationSummary> {
        let reservations = self.store.order_reservations(order_id).await?;
        Ok(ReservationSummary::from_reservations(&reservations))
    }

    /// Returns the order's reservation records.
    pub async fn reservations(&self, order_id: OrderId) -> Result<Vec<Reservation>> {
        Ok(self.store.order_reservations(order_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vendor::InMemoryVendorClient;
    use common::ProductId;
    use domain::{
        Address, CustomerIdentity, ItemSource, Money, Order, PlaceOrder, PricedLine, StockLevels,
    };
    use store::{InMemoryStore, OrderStore, StockLedger};

    fn address() -> Address {
        Address {
            name: "Ada Lovelace".to_string(),
            line1: "1 Analytical Way".to_string(),
            line2: None,
            postal_code: "10115".to_string(),
            city: "Berlin".to_string(),
            country: "DE".to_string(),
        }
    }

    async fn vendor_order(store: &InMemoryStore, products: &[(&str, u32)]) -> Vec<OrderItem> {
        let mut lines = Vec::new();
        for (i, (product, quantity)) in products.iter().enumerate() {
            store
                .register_product(StockLevels::new(*product, 10))
                .await
                .unwrap();
            lines.push(PricedLine {
                product_id: ProductId::new(*product),
                source: ItemSource::Vendor {
                    article_id: format!("A-{}", i + 1),
                },
                sku: format!("SKU-{product}"),
                name: product.to_string(),
                quantity: *quantity,
                unit_price: Money::from_cents(500),
            });
        }

        let (order, items) = Order::place(
            PlaceOrder {
                customer: CustomerIdentity::Guest {
                    email: "guest@example.com".to_string(),
                },
                lines,
                shipping_address: address(),
                billing_address: address(),
                payment_method: "card".to_string(),
                shipping_cost: Money::zero(),
            },
            Utc::now(),
        )
        .unwrap();
        store.insert_order(&order, &items).await.unwrap();
        items
    }

    #[tokio::test]
    async fn test_reserve_all_success() {
        let store = InMemoryStore::new();
        let vendor = InMemoryVendorClient::new();
        let coordinator = ReservationCoordinator::new(store.clone(), vendor.clone());
        let items = vendor_order(&store, &[("P1", 2), ("P2", 1)]).await;
        let order_id = items[0].order_id;

        let ids = coordinator.reserve_all(order_id, &items).await.unwrap();
        assert_eq!(ids.len(), 2);

        let summary = coordinator.status(order_id).await.unwrap();
        assert_eq!(summary.reserved, 2);
        assert!(summary.all_reserved);
        assert_eq!(vendor.active_holds().await, 2);

        let p1 = store.stock_levels(&ProductId::new("P1")).await.unwrap();
        assert_eq!((p1.available_quantity, p1.reserved_quantity), (8, 2));
    }

    #[tokio::test]
    async fn test_failure_releases_every_success() {
        let store = InMemoryStore::new();
        let vendor = InMemoryVendorClient::new();
        vendor.fail_article("A-2").await;
        let coordinator = ReservationCoordinator::new(store.clone(), vendor.clone());
        let items = vendor_order(&store, &[("P1", 1), ("P2", 1), ("P3", 1)]).await;
        let order_id = items[0].order_id;

        let err = coordinator.reserve_all(order_id, &items).await.unwrap_err();
        match err {
            FulfillmentError::ReservationFailed { failures } => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].product_id, ProductId::new("P2"));
                assert_eq!(failures[0].kind, FailureKind::VendorReservation);
            }
            other => panic!("unexpected error: {other}"),
        }

        // the third item was still attempted
        assert_eq!(vendor.reserve_calls().await, 3);
        assert_eq!(vendor.active_holds().await, 0);

        let summary = coordinator.status(order_id).await.unwrap();
        assert_eq!((summary.reserved, summary.unreserved, summary.failed), (0, 2, 1));
        for product in ["P1", "P2", "P3"] {
            let levels = store.stock_levels(&ProductId::new(product)).await.unwrap();
            assert_eq!((levels.available_quantity, levels.reserved_quantity), (10, 0));
        }
    }

    #[tokio::test]
    async fn test_ledger_shortage_releases_vendor_hold() {
        let store = InMemoryStore::new();
        let vendor = InMemoryVendorClient::new();
        let coordinator = ReservationCoordinator::new(store.clone(), vendor.clone());
        let items = vendor_order(&store, &[("P1", 11)]).await;

        let err = coordinator
            .reserve_all(items[0].order_id, &items)
            .await
            .unwrap_err();
        assert!(matches!(err, FulfillmentError::ReservationFailed { .. }));
        assert_eq!(vendor.active_holds().await, 0);

        let reservations = coordinator.reservations(items[0].order_id).await.unwrap();
        assert_eq!(reservations[0].status, ReservationStatus::Failed);
        assert!(reservations[0].error_message.is_some());
    }

    #[tokio::test]
    async fn test_unreserve_is_idempotent() {
        let store = InMemoryStore::new();
        let vendor = InMemoryVendorClient::new();
        let coordinator = ReservationCoordinator::new(store.clone(), vendor.clone());
        let items = vendor_order(&store, &[("P1", 3)]).await;
        let ids = coordinator
            .reserve_all(items[0].order_id, &items)
            .await
            .unwrap();

        assert!(coordinator.unreserve(ids[0]).await.unwrap());
        assert!(!coordinator.unreserve(ids[0]).await.unwrap());

        let levels = store.stock_levels(&ProductId::new("P1")).await.unwrap();
        assert_eq!((levels.available_quantity, levels.reserved_quantity), (10, 0));
        assert_eq!(vendor.release_calls().await, 1);
    }

    #[tokio::test]
    async fn test_failed_vendor_release_is_recorded_not_raised() {
        let store = InMemoryStore::new();
        let vendor = InMemoryVendorClient::new();
        let coordinator = ReservationCoordinator::new(store.clone(), vendor.clone());
        let items = vendor_order(&store, &[("P1", 1), ("P2", 1)]).await;
        let order_id = items[0].order_id;
        coordinator.reserve_all(order_id, &items).await.unwrap();

        vendor.set_fail_on_release(true).await;
        assert_eq!(coordinator.unreserve_all_for_order(order_id).await.unwrap(), 2);

        for reservation in store.order_reservations(order_id).await.unwrap() {
            assert_eq!(reservation.status, ReservationStatus::Unreserved);
            let outcome = reservation.compensation.unwrap();
            assert!(outcome.needs_reconciliation());
        }
        let levels = store.stock_levels(&ProductId::new("P1")).await.unwrap();
        assert_eq!(levels.reserved_quantity, 0);
    }
}

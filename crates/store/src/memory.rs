use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{OrderId, OrderItemId, ProductId, ReservationId};
use domain::{
    CompensationOutcome, FulfillmentStatus, ItemFulfillmentStatus, Order, OrderItem, OrderStatus,
    PaymentStatus, Reservation, ReservationStatus, StockFlow, StockLevels,
};
use tokio::sync::RwLock;

use crate::{
    Result, StoreError,
    store::{OrderStore, OrderUpdate, ReservationStore, StockLedger},
};

#[derive(Default)]
struct MemoryState {
    products: HashMap<ProductId, StockLevels>,
    orders: HashMap<OrderId, Order>,
    items: HashMap<OrderItemId, OrderItem>,
    order_items: HashMap<OrderId, Vec<OrderItemId>>,
    reservations: HashMap<ReservationId, Reservation>,
    order_reservations: HashMap<OrderId, Vec<ReservationId>>,
}

impl MemoryState {
    fn levels(&self, product_id: &ProductId) -> Result<StockLevels> {
        self.products
            .get(product_id)
            .cloned()
            .ok_or_else(|| StoreError::ProductNotFound(product_id.clone()))
    }

    fn reserve_stock(
        &mut self,
        product_id: &ProductId,
        quantity: u32,
        flow: StockFlow,
    ) -> Result<StockLevels> {
        let levels = self
            .products
            .get_mut(product_id)
            .ok_or_else(|| StoreError::ProductNotFound(product_id.clone()))?;
        let updated = levels
            .reserved(quantity, flow)
            .ok_or_else(|| StoreError::NotAvailable {
                product_id: product_id.clone(),
                requested: quantity,
                available: levels.available_quantity,
            })?;
        *levels = updated.clone();
        Ok(updated)
    }

    fn release_stock(
        &mut self,
        product_id: &ProductId,
        quantity: u32,
        flow: StockFlow,
    ) -> Result<StockLevels> {
        let levels = self
            .products
            .get_mut(product_id)
            .ok_or_else(|| StoreError::ProductNotFound(product_id.clone()))?;
        *levels = levels.released(quantity, flow);
        Ok(levels.clone())
    }
}

/// In-memory store for tests and single-process deployments.
///
/// Every operation runs under one write lock, so each call is an atomic
/// unit just like a database transaction.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }
}

#[async_trait]
impl StockLedger for InMemoryStore {
    async fn register_product(&self, levels: StockLevels) -> Result<()> {
        let mut state = self.state.write().await;
        state
            .products
            .entry(levels.product_id.clone())
            .or_insert(levels);
        Ok(())
    }

    async fn stock_levels(&self, product_id: &ProductId) -> Result<StockLevels> {
        self.state.read().await.levels(product_id)
    }

    async fn reserve(
        &self,
        product_id: &ProductId,
        quantity: u32,
        flow: StockFlow,
    ) -> Result<StockLevels> {
        self.state
            .write()
            .await
            .reserve_stock(product_id, quantity, flow)
    }

    async fn release(
        &self,
        product_id: &ProductId,
        quantity: u32,
        flow: StockFlow,
    ) -> Result<StockLevels> {
        self.state
            .write()
            .await
            .release_stock(product_id, quantity, flow)
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn insert_order(&self, order: &Order, items: &[OrderItem]) -> Result<()> {
        let mut state = self.state.write().await;
        state.orders.insert(order.id, order.clone());
        state
            .order_items
            .insert(order.id, items.iter().map(|i| i.id).collect());
        for item in items {
            state.items.insert(item.id, item.clone());
        }
        Ok(())
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(&order_id).cloned())
    }

    async fn order_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>> {
        let state = self.state.read().await;
        let items = state
            .order_items
            .get(&order_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| state.items.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default();
        Ok(items)
    }

    async fn record_payment(&self, order_id: OrderId, transaction_id: &str) -> Result<Order> {
        let mut state = self.state.write().await;
        let order = state
            .orders
            .get_mut(&order_id)
            .ok_or(StoreError::OrderNotFound(order_id))?;

        if !order.accepts_payment() {
            return Err(StoreError::StatusConflict {
                order_id,
                current: order.status,
            });
        }

        let now = Utc::now();
        order.status = OrderStatus::Pending;
        order.payment_status = PaymentStatus::Paid;
        order.fulfillment_status = FulfillmentStatus::Pending;
        order.transaction_id = Some(transaction_id.to_string());
        order.paid_at = Some(now);
        order.updated_at = now;
        Ok(order.clone())
    }

    async fn update_order(
        &self,
        order_id: OrderId,
        expected: &[OrderStatus],
        update: OrderUpdate,
    ) -> Result<Order> {
        let mut state = self.state.write().await;
        let order = state
            .orders
            .get_mut(&order_id)
            .ok_or(StoreError::OrderNotFound(order_id))?;

        if !expected.is_empty() && !expected.contains(&order.status) {
            return Err(StoreError::StatusConflict {
                order_id,
                current: order.status,
            });
        }

        let now = Utc::now();
        if let Some(status) = update.status {
            order.status = status;
            if status == OrderStatus::Cancelled {
                order.cancelled_at = Some(now);
            }
        }
        if let Some(payment_status) = update.payment_status {
            order.payment_status = payment_status;
            if payment_status == PaymentStatus::Paid {
                order.paid_at = Some(now);
            }
        }
        if let Some(fulfillment_status) = update.fulfillment_status {
            order.fulfillment_status = fulfillment_status;
        }
        if let Some(transaction_id) = update.transaction_id {
            order.transaction_id = Some(transaction_id);
        }
        if let Some(reason) = update.cancellation_reason {
            order.cancellation_reason = Some(reason);
        }
        order.updated_at = now;

        Ok(order.clone())
    }

    async fn set_item_status(
        &self,
        item_id: OrderItemId,
        status: ItemFulfillmentStatus,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let item = state
            .items
            .get_mut(&item_id)
            .ok_or(StoreError::ItemNotFound(item_id))?;
        item.transition(status, Utc::now());
        Ok(())
    }

    async fn deduct_item_stock(&self, item_id: OrderItemId) -> Result<StockLevels> {
        let mut state = self.state.write().await;
        let item = state
            .items
            .get(&item_id)
            .ok_or(StoreError::ItemNotFound(item_id))?;
        if item.is_vendor() {
            return Err(StoreError::NotOwnItem(item_id));
        }
        if item.stock_held {
            return state.levels(&item.product_id);
        }

        let (product_id, quantity) = (item.product_id.clone(), item.quantity);
        let levels = state.reserve_stock(&product_id, quantity, StockFlow::Own)?;
        if let Some(item) = state.items.get_mut(&item_id) {
            item.stock_held = true;
            item.transition(ItemFulfillmentStatus::StockDeducted, Utc::now());
        }
        Ok(levels)
    }

    async fn restore_item_stock(
        &self,
        item_id: OrderItemId,
        next_status: ItemFulfillmentStatus,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        let item = state
            .items
            .get(&item_id)
            .ok_or(StoreError::ItemNotFound(item_id))?;
        if !item.stock_held {
            return Ok(false);
        }

        let (product_id, quantity) = (item.product_id.clone(), item.quantity);
        state.release_stock(&product_id, quantity, StockFlow::Own)?;
        if let Some(item) = state.items.get_mut(&item_id) {
            item.stock_held = false;
            item.transition(next_status, Utc::now());
        }
        Ok(true)
    }

    async fn vendor_batch_candidates(&self) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        let mut candidates: Vec<Order> = state
            .orders
            .values()
            .filter(|o| o.awaits_vendor_order())
            .filter(|o| {
                state.order_items.get(&o.id).is_some_and(|ids| {
                    ids.iter().filter_map(|id| state.items.get(id)).any(|i| {
                        i.is_vendor() && i.fulfillment_status == ItemFulfillmentStatus::Reserved
                    })
                })
            })
            .cloned()
            .collect();
        candidates.sort_by_key(|o| o.created_at);
        Ok(candidates)
    }

    async fn record_vendor_submission(
        &self,
        order_id: OrderId,
        vendor_order_id: &str,
        fulfillment_status: FulfillmentStatus,
    ) -> Result<Order> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        let order = state
            .orders
            .get_mut(&order_id)
            .ok_or(StoreError::OrderNotFound(order_id))?;

        if let Some(existing) = &order.vendor_order_id {
            return Err(StoreError::VendorOrderAlreadySet {
                order_id,
                existing: existing.clone(),
            });
        }
        if !order.awaits_vendor_order() {
            return Err(StoreError::StatusConflict {
                order_id,
                current: order.status,
            });
        }

        let now = Utc::now();
        order.vendor_order_id = Some(vendor_order_id.to_string());
        order.fulfillment_status = fulfillment_status;
        order.status = OrderStatus::Processing;
        order.updated_at = now;
        let order = order.clone();

        for id in state.order_reservations.get(&order_id).into_iter().flatten() {
            if let Some(reservation) = state.reservations.get_mut(id)
                && reservation.status == ReservationStatus::Reserved
            {
                reservation.status = ReservationStatus::Ordered;
                reservation.updated_at = now;
            }
        }
        for id in state.order_items.get(&order_id).into_iter().flatten() {
            if let Some(item) = state.items.get_mut(id)
                && item.is_vendor()
                && item.fulfillment_status == ItemFulfillmentStatus::Reserved
            {
                item.transition(ItemFulfillmentStatus::VendorOrdered, now);
            }
        }

        Ok(order)
    }
}

#[async_trait]
impl ReservationStore for InMemoryStore {
    async fn insert_reservation(&self, reservation: &Reservation) -> Result<()> {
        let mut state = self.state.write().await;
        state
            .order_reservations
            .entry(reservation.order_id)
            .or_default()
            .push(reservation.id);
        state
            .reservations
            .insert(reservation.id, reservation.clone());
        Ok(())
    }

    async fn get_reservation(&self, reservation_id: ReservationId) -> Result<Option<Reservation>> {
        Ok(self
            .state
            .read()
            .await
            .reservations
            .get(&reservation_id)
            .cloned())
    }

    async fn order_reservations(&self, order_id: OrderId) -> Result<Vec<Reservation>> {
        let state = self.state.read().await;
        let reservations = state
            .order_reservations
            .get(&order_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| state.reservations.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default();
        Ok(reservations)
    }

    async fn confirm_reservation(
        &self,
        reservation_id: ReservationId,
        external_reservation_id: &str,
    ) -> Result<StockLevels> {
        let mut state = self.state.write().await;
        let reservation = state
            .reservations
            .get(&reservation_id)
            .ok_or(StoreError::ReservationNotFound(reservation_id))?;
        if reservation.status != ReservationStatus::Pending {
            return Err(StoreError::ReservationConflict {
                reservation_id,
                current: reservation.status,
            });
        }

        let (product_id, quantity, item_id) = (
            reservation.product_id.clone(),
            reservation.quantity,
            reservation.order_item_id,
        );
        let levels = state.reserve_stock(&product_id, quantity, StockFlow::Vendor)?;

        let now = Utc::now();
        if let Some(reservation) = state.reservations.get_mut(&reservation_id) {
            reservation.status = ReservationStatus::Reserved;
            reservation.external_reservation_id = Some(external_reservation_id.to_string());
            reservation.stock_held = true;
            reservation.reserved_at = Some(now);
            reservation.updated_at = now;
        }
        if let Some(item) = state.items.get_mut(&item_id) {
            item.transition(ItemFulfillmentStatus::Reserved, now);
        }
        Ok(levels)
    }

    async fn fail_reservation(&self, reservation_id: ReservationId, error: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let reservation = state
            .reservations
            .get_mut(&reservation_id)
            .ok_or(StoreError::ReservationNotFound(reservation_id))?;
        if reservation.status != ReservationStatus::Pending {
            return Err(StoreError::ReservationConflict {
                reservation_id,
                current: reservation.status,
            });
        }
        reservation.status = ReservationStatus::Failed;
        reservation.error_message = Some(error.to_string());
        reservation.updated_at = Utc::now();
        Ok(())
    }

    async fn release_reservation(
        &self,
        reservation_id: ReservationId,
        compensation: CompensationOutcome,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        let reservation = state
            .reservations
            .get(&reservation_id)
            .ok_or(StoreError::ReservationNotFound(reservation_id))?;
        if reservation.status != ReservationStatus::Reserved {
            return Ok(false);
        }

        let (product_id, quantity, was_held, item_id) = (
            reservation.product_id.clone(),
            reservation.quantity,
            reservation.stock_held,
            reservation.order_item_id,
        );
        if was_held {
            state.release_stock(&product_id, quantity, StockFlow::Vendor)?;
        }

        let now = Utc::now();
        if let Some(item) = state.items.get_mut(&item_id)
            && item.fulfillment_status == ItemFulfillmentStatus::Reserved
        {
            item.transition(ItemFulfillmentStatus::Pending, now);
        }
        if let Some(reservation) = state.reservations.get_mut(&reservation_id) {
            reservation.status = ReservationStatus::Unreserved;
            reservation.stock_held = false;
            if let Some(reason) = &compensation.failed_reason {
                reservation.error_message = Some(reason.clone());
            }
            reservation.compensation = Some(compensation);
            reservation.updated_at = now;
        }
        Ok(was_held)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{
        Address, CustomerIdentity, ItemSource, Money, PlaceOrder, PricedLine,
    };

    fn address() -> Address {
        Address {
            name: "Grace Hopper".to_string(),
            line1: "2 Compiler Street".to_string(),
            line2: None,
            postal_code: "1000".to_string(),
            city: "Vienna".to_string(),
            country: "AT".to_string(),
        }
    }

    fn line(product: &str, source: ItemSource, quantity: u32) -> PricedLine {
        PricedLine {
            product_id: ProductId::new(product),
            source,
            sku: format!("SKU-{product}"),
            name: product.to_string(),
            quantity,
            unit_price: Money::from_cents(1000),
        }
    }

    async fn seeded_order(store: &InMemoryStore) -> (Order, Vec<OrderItem>) {
        store
            .register_product(StockLevels::new("P1", 10))
            .await
            .unwrap();
        store
            .register_product(StockLevels::new("P2", 5))
            .await
            .unwrap();

        let (order, items) = Order::place(
            PlaceOrder {
                customer: CustomerIdentity::Guest {
                    email: "guest@example.com".to_string(),
                },
                lines: vec![
                    line(
                        "P1",
                        ItemSource::Vendor {
                            article_id: "A-1".to_string(),
                        },
                        2,
                    ),
                    line("P2", ItemSource::Own, 1),
                ],
                shipping_address: address(),
                billing_address: address(),
                payment_method: "card".to_string(),
                shipping_cost: Money::zero(),
            },
            Utc::now(),
        )
        .unwrap();
        store.insert_order(&order, &items).await.unwrap();
        (order, items)
    }

    #[tokio::test]
    async fn test_reserve_vendor_and_own_flows() {
        let store = InMemoryStore::new();
        store
            .register_product(StockLevels::new("P1", 10))
            .await
            .unwrap();
        let p1 = ProductId::new("P1");

        let levels = store.reserve(&p1, 2, StockFlow::Vendor).await.unwrap();
        assert_eq!(
            (levels.stock_quantity, levels.available_quantity, levels.reserved_quantity),
            (10, 8, 2)
        );

        let levels = store.reserve(&p1, 3, StockFlow::Own).await.unwrap();
        assert_eq!(
            (levels.stock_quantity, levels.available_quantity, levels.reserved_quantity),
            (10, 5, 2)
        );

        let levels = store.release(&p1, 3, StockFlow::Own).await.unwrap();
        assert_eq!((levels.available_quantity, levels.reserved_quantity), (8, 2));
    }

    #[tokio::test]
    async fn test_reserve_rejects_oversell() {
        let store = InMemoryStore::new();
        store
            .register_product(StockLevels::new("P1", 1))
            .await
            .unwrap();

        let err = store
            .reserve(&ProductId::new("P1"), 2, StockFlow::Vendor)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::NotAvailable {
                requested: 2,
                available: 1,
                ..
            }
        ));

        let err = store
            .reserve(&ProductId::new("missing"), 1, StockFlow::Own)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ProductNotFound(_)));
    }

    #[tokio::test]
    async fn test_concurrent_reserves_never_oversell() {
        let store = InMemoryStore::new();
        store
            .register_product(StockLevels::new("P1", 5))
            .await
            .unwrap();

        let attempts = (0..20).map(|_| {
            let store = store.clone();
            async move {
                store
                    .reserve(&ProductId::new("P1"), 1, StockFlow::Vendor)
                    .await
            }
        });
        let results = futures_util::future::join_all(attempts).await;

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 5);
        let levels = store.stock_levels(&ProductId::new("P1")).await.unwrap();
        assert_eq!(levels.available_quantity, 0);
        assert_eq!(levels.reserved_quantity, 5);
    }

    #[tokio::test]
    async fn test_register_product_keeps_existing_counters() {
        let store = InMemoryStore::new();
        store
            .register_product(StockLevels::new("P1", 10))
            .await
            .unwrap();
        store
            .reserve(&ProductId::new("P1"), 4, StockFlow::Own)
            .await
            .unwrap();
        store
            .register_product(StockLevels::new("P1", 99))
            .await
            .unwrap();

        let levels = store.stock_levels(&ProductId::new("P1")).await.unwrap();
        assert_eq!(levels.available_quantity, 6);
    }

    #[tokio::test]
    async fn test_update_order_is_conditional() {
        let store = InMemoryStore::new();
        let (order, _) = seeded_order(&store).await;

        let err = store
            .update_order(
                order.id,
                &[OrderStatus::Shipped],
                OrderUpdate::new().status(OrderStatus::Cancelled),
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::StatusConflict {
                current: OrderStatus::Pending,
                ..
            }
        ));
        let unchanged = store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(unchanged, order);

        let paid = store
            .update_order(
                order.id,
                &[OrderStatus::Pending, OrderStatus::PaymentPending],
                OrderUpdate::new()
                    .payment_status(PaymentStatus::Paid)
                    .transaction_id("tx-1"),
            )
            .await
            .unwrap();
        assert_eq!(paid.payment_status, PaymentStatus::Paid);
        assert_eq!(paid.transaction_id.as_deref(), Some("tx-1"));
        assert!(paid.paid_at.is_some());
    }

    #[tokio::test]
    async fn test_record_payment_claims_order_once() {
        let store = InMemoryStore::new();
        let (order, _) = seeded_order(&store).await;

        let paid = store.record_payment(order.id, "tx-1").await.unwrap();
        assert_eq!(paid.status, OrderStatus::Pending);
        assert_eq!(paid.payment_status, PaymentStatus::Paid);

        let err = store.record_payment(order.id, "tx-2").await.unwrap_err();
        assert!(matches!(err, StoreError::StatusConflict { .. }));
        let stored = store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.transaction_id.as_deref(), Some("tx-1"));
    }

    #[tokio::test]
    async fn test_own_item_deduction_is_flag_guarded() {
        let store = InMemoryStore::new();
        let (_, items) = seeded_order(&store).await;
        let own = &items[1];
        let p2 = ProductId::new("P2");

        store.deduct_item_stock(own.id).await.unwrap();
        store.deduct_item_stock(own.id).await.unwrap();
        let levels = store.stock_levels(&p2).await.unwrap();
        assert_eq!((levels.available_quantity, levels.reserved_quantity), (4, 0));

        assert!(
            store
                .restore_item_stock(own.id, ItemFulfillmentStatus::Cancelled)
                .await
                .unwrap()
        );
        assert!(
            !store
                .restore_item_stock(own.id, ItemFulfillmentStatus::Cancelled)
                .await
                .unwrap()
        );
        let levels = store.stock_levels(&p2).await.unwrap();
        assert_eq!(levels.available_quantity, 5);

        let err = store.deduct_item_stock(items[0].id).await.unwrap_err();
        assert!(matches!(err, StoreError::NotOwnItem(_)));
    }

    #[tokio::test]
    async fn test_reservation_release_is_idempotent() {
        let store = InMemoryStore::new();
        let (_, items) = seeded_order(&store).await;
        let reservation = Reservation::pending(&items[0], Utc::now()).unwrap();
        store.insert_reservation(&reservation).await.unwrap();
        let p1 = ProductId::new("P1");

        store
            .confirm_reservation(reservation.id, "EXT-1")
            .await
            .unwrap();
        let levels = store.stock_levels(&p1).await.unwrap();
        assert_eq!((levels.available_quantity, levels.reserved_quantity), (8, 2));
        let item = &store.order_items(items[0].order_id).await.unwrap()[0];
        assert_eq!(item.fulfillment_status, ItemFulfillmentStatus::Reserved);
        assert!(item.reserved_at.is_some());

        assert!(
            store
                .release_reservation(reservation.id, CompensationOutcome::succeeded())
                .await
                .unwrap()
        );
        assert!(
            !store
                .release_reservation(reservation.id, CompensationOutcome::succeeded())
                .await
                .unwrap()
        );

        let levels = store.stock_levels(&p1).await.unwrap();
        assert_eq!((levels.available_quantity, levels.reserved_quantity), (10, 0));
        let stored = store.get_reservation(reservation.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ReservationStatus::Unreserved);
        assert!(!stored.stock_held);
        assert_eq!(stored.compensation, Some(CompensationOutcome::succeeded()));
        let item = &store.order_items(items[0].order_id).await.unwrap()[0];
        assert_eq!(item.fulfillment_status, ItemFulfillmentStatus::Pending);
    }

    #[tokio::test]
    async fn test_confirm_without_stock_writes_nothing() {
        let store = InMemoryStore::new();
        let (_, items) = seeded_order(&store).await;
        store
            .reserve(&ProductId::new("P1"), 9, StockFlow::Own)
            .await
            .unwrap();
        let reservation = Reservation::pending(&items[0], Utc::now()).unwrap();
        store.insert_reservation(&reservation).await.unwrap();

        let err = store
            .confirm_reservation(reservation.id, "EXT-1")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotAvailable { .. }));

        let stored = store.get_reservation(reservation.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ReservationStatus::Pending);
        assert_eq!(stored.external_reservation_id, None);
    }

    #[tokio::test]
    async fn test_vendor_submission_sets_id_once() {
        let store = InMemoryStore::new();
        let (order, items) = seeded_order(&store).await;
        let reservation = Reservation::pending(&items[0], Utc::now()).unwrap();
        store.insert_reservation(&reservation).await.unwrap();
        store
            .confirm_reservation(reservation.id, "EXT-1")
            .await
            .unwrap();
        store
            .update_order(
                order.id,
                &[],
                OrderUpdate::new()
                    .status(OrderStatus::Reserved)
                    .payment_status(PaymentStatus::Paid),
            )
            .await
            .unwrap();

        assert_eq!(store.vendor_batch_candidates().await.unwrap().len(), 1);

        let updated = store
            .record_vendor_submission(order.id, "VO-1", FulfillmentStatus::VendorFulfilled)
            .await
            .unwrap();
        assert_eq!(updated.vendor_order_id.as_deref(), Some("VO-1"));
        assert_eq!(updated.status, OrderStatus::Processing);
        assert!(store.vendor_batch_candidates().await.unwrap().is_empty());

        let stored = store.get_reservation(reservation.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ReservationStatus::Ordered);
        let item = &store.order_items(order.id).await.unwrap()[0];
        assert_eq!(item.fulfillment_status, ItemFulfillmentStatus::VendorOrdered);

        let err = store
            .record_vendor_submission(order.id, "VO-2", FulfillmentStatus::VendorFulfilled)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::VendorOrderAlreadySet { .. }));
    }

    #[tokio::test]
    async fn test_processing_order_with_reserved_vendor_item_is_candidate() {
        let store = InMemoryStore::new();
        let (order, items) = seeded_order(&store).await;
        let reservation = Reservation::pending(&items[0], Utc::now()).unwrap();
        store.insert_reservation(&reservation).await.unwrap();
        store
            .confirm_reservation(reservation.id, "EXT-1")
            .await
            .unwrap();

        // unpaid orders wait
        assert!(store.vendor_batch_candidates().await.unwrap().is_empty());
        let err = store
            .record_vendor_submission(order.id, "VO-1", FulfillmentStatus::PartiallyFulfilled)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::StatusConflict { .. }));

        store
            .update_order(
                order.id,
                &[],
                OrderUpdate::new()
                    .status(OrderStatus::Processing)
                    .payment_status(PaymentStatus::Paid)
                    .fulfillment_status(FulfillmentStatus::PartiallyFulfilled),
            )
            .await
            .unwrap();
        let candidates = store.vendor_batch_candidates().await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].id, order.id);

        let updated = store
            .record_vendor_submission(order.id, "VO-1", FulfillmentStatus::PartiallyFulfilled)
            .await
            .unwrap();
        assert_eq!(updated.status, OrderStatus::Processing);
        assert_eq!(updated.fulfillment_status, FulfillmentStatus::PartiallyFulfilled);
        assert!(store.vendor_batch_candidates().await.unwrap().is_empty());
    }
}

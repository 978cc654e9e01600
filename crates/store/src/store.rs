use async_trait::async_trait;
use common::{OrderId, OrderItemId, ProductId, ReservationId};
use domain::{
    CompensationOutcome, FulfillmentStatus, ItemFulfillmentStatus, Order, OrderItem, OrderStatus,
    PaymentStatus, Reservation, StockFlow, StockLevels,
};

use crate::Result;

/// Fields to change on an order; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderUpdate {
    pub status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub fulfillment_status: Option<FulfillmentStatus>,
    pub transaction_id: Option<String>,
    pub cancellation_reason: Option<String>,
}

impl OrderUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn payment_status(mut self, status: PaymentStatus) -> Self {
        self.payment_status = Some(status);
        self
    }

    pub fn fulfillment_status(mut self, status: FulfillmentStatus) -> Self {
        self.fulfillment_status = Some(status);
        self
    }

    pub fn transaction_id(mut self, transaction_id: impl Into<String>) -> Self {
        self.transaction_id = Some(transaction_id.into());
        self
    }

    pub fn cancellation_reason(mut self, reason: impl Into<String>) -> Self {
        self.cancellation_reason = Some(reason.into());
        self
    }
}

/// Per-product stock counters.
///
/// `reserve` is a single conditional decrement: it never reads the counters
/// and writes them back, so concurrent callers cannot oversell.
#[async_trait]
pub trait StockLedger: Send + Sync {
    /// Registers a product's counters. Existing products are left untouched.
    async fn register_product(&self, levels: StockLevels) -> Result<()>;

    /// Returns the current counters of a product.
    async fn stock_levels(&self, product_id: &ProductId) -> Result<StockLevels>;

    /// Consumes `quantity` available units.
    ///
    /// The vendor flow moves them into `reserved_quantity`; the own flow is a
    /// plain deduction. Fails with `NotAvailable` when stock is short.
    async fn reserve(
        &self,
        product_id: &ProductId,
        quantity: u32,
        flow: StockFlow,
    ) -> Result<StockLevels>;

    /// Reverses a `reserve` made through the same flow.
    ///
    /// Not idempotent on its own; the flag-guarded operations on
    /// [`OrderStore`] and [`ReservationStore`] are.
    async fn release(
        &self,
        product_id: &ProductId,
        quantity: u32,
        flow: StockFlow,
    ) -> Result<StockLevels>;
}

/// Orders and their line items.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists a new order together with its items.
    async fn insert_order(&self, order: &Order, items: &[OrderItem]) -> Result<()>;

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Returns the order's items in creation order.
    async fn order_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>>;

    /// Marks the order paid and claims it for a fulfillment run.
    ///
    /// Allowed for an unpaid `pending` order or a `payment_pending` retry;
    /// the order is left `pending` and `paid` while the run is in flight.
    /// Otherwise nothing is written and `StatusConflict` is returned.
    async fn record_payment(&self, order_id: OrderId, transaction_id: &str) -> Result<Order>;

    /// Applies `update` if the order's status is one of `expected`.
    ///
    /// An empty `expected` slice applies the update unconditionally. On a
    /// mismatch nothing is written and `StatusConflict` is returned.
    async fn update_order(
        &self,
        order_id: OrderId,
        expected: &[OrderStatus],
        update: OrderUpdate,
    ) -> Result<Order>;

    /// Sets an item's fulfillment status and stamps the matching timestamp.
    async fn set_item_status(&self, item_id: OrderItemId, status: ItemFulfillmentStatus)
    -> Result<()>;

    /// Deducts an own item's quantity from the ledger and marks the item
    /// `stock_deducted`, in one atomic unit.
    ///
    /// Calling it again while the deduction is held changes nothing.
    async fn deduct_item_stock(&self, item_id: OrderItemId) -> Result<StockLevels>;

    /// Returns a held own-item deduction to the ledger and moves the item to
    /// `next_status`. Returns false if nothing was held.
    async fn restore_item_stock(
        &self,
        item_id: OrderItemId,
        next_status: ItemFulfillmentStatus,
    ) -> Result<bool>;

    /// Paid orders in `reserved` or `processing` with a reserved vendor item
    /// and no vendor order id.
    async fn vendor_batch_candidates(&self) -> Result<Vec<Order>>;

    /// Records an accepted vendor order for an order that
    /// [awaits one](domain::Order::awaits_vendor_order).
    ///
    /// Atomically sets the vendor order id (only if unset), the fulfillment
    /// status and `processing`, moves reserved reservations to `ordered` and
    /// reserved vendor items to `vendor_ordered`.
    async fn record_vendor_submission(
        &self,
        order_id: OrderId,
        vendor_order_id: &str,
        fulfillment_status: FulfillmentStatus,
    ) -> Result<Order>;
}

/// Vendor reservation records.
#[async_trait]
pub trait ReservationStore: Send + Sync {
    async fn insert_reservation(&self, reservation: &Reservation) -> Result<()>;

    async fn get_reservation(&self, reservation_id: ReservationId) -> Result<Option<Reservation>>;

    /// Returns the order's reservations in creation order.
    async fn order_reservations(&self, order_id: OrderId) -> Result<Vec<Reservation>>;

    /// Marks a pending reservation `reserved` with the vendor's id, holds its
    /// quantity in the ledger (vendor flow) and marks its item `reserved`.
    ///
    /// Nothing is written if the ledger cannot cover the quantity.
    async fn confirm_reservation(
        &self,
        reservation_id: ReservationId,
        external_reservation_id: &str,
    ) -> Result<StockLevels>;

    /// Marks a pending reservation `failed`.
    async fn fail_reservation(&self, reservation_id: ReservationId, error: &str) -> Result<()>;

    /// Moves a `reserved` reservation to `unreserved`, records the vendor
    /// compensation outcome and returns its held quantity to the ledger.
    /// A linked item still marked `reserved` goes back to `pending`.
    ///
    /// Returns false, changing nothing, if the reservation is not `reserved`.
    async fn release_reservation(
        &self,
        reservation_id: ReservationId,
        compensation: CompensationOutcome,
    ) -> Result<bool>;
}

/// Everything the fulfillment engine needs from storage.
pub trait Store: StockLedger + OrderStore + ReservationStore + Clone + 'static {}

impl<T> Store for T where T: StockLedger + OrderStore + ReservationStore + Clone + 'static {}

//! Order and order-item records.

use chrono::{DateTime, Utc};
use common::{OrderId, OrderItemId, ProductId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::{FulfillmentStatus, ItemFulfillmentStatus, OrderStatus, PaymentStatus};
use super::value_objects::{Address, CustomerIdentity, Money};
use crate::error::DomainError;

/// Where an order line is fulfilled from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ItemSource {
    /// Reserved and ordered from the upstream wholesale vendor.
    Vendor { article_id: String },
    /// Deducted from directly owned inventory.
    Own,
}

impl ItemSource {
    /// Returns the persisted name of the source.
    pub fn kind(&self) -> &'static str {
        match self {
            ItemSource::Vendor { .. } => "vendor",
            ItemSource::Own => "own",
        }
    }

    /// Rebuilds a source from its persisted columns.
    pub fn from_parts(kind: &str, article_id: Option<String>) -> Result<Self, DomainError> {
        match (kind, article_id) {
            ("vendor", Some(article_id)) => Ok(ItemSource::Vendor { article_id }),
            ("own", _) => Ok(ItemSource::Own),
            (other, _) => Err(DomainError::UnknownStatus {
                kind: "item source",
                value: other.to_string(),
            }),
        }
    }

    pub fn article_id(&self) -> Option<&str> {
        match self {
            ItemSource::Vendor { article_id } => Some(article_id),
            ItemSource::Own => None,
        }
    }
}

/// A customer order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub order_number: String,
    pub customer: CustomerIdentity,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub fulfillment_status: FulfillmentStatus,
    pub payment_method: String,
    /// External payment transaction, recorded on payment success.
    pub transaction_id: Option<String>,
    pub subtotal: Money,
    pub shipping_cost: Money,
    pub total: Money,
    pub shipping_address: Address,
    pub billing_address: Address,
    /// Set once, after the consolidated vendor order is accepted.
    pub vendor_order_id: Option<String>,
    pub internal_notes: Option<String>,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

/// A single order line with its price snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    #[serde(flatten)]
    pub source: ItemSource,
    pub sku: String,
    pub name: String,
    pub quantity: u32,
    /// Unit price at order creation; never re-read from the catalog.
    pub unit_price: Money,
    pub fulfillment_status: ItemFulfillmentStatus,
    /// True while an own-stock deduction for this line is outstanding.
    pub stock_held: bool,
    pub reserved_at: Option<DateTime<Utc>>,
    pub stock_deducted_at: Option<DateTime<Utc>>,
    pub vendor_ordered_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
}

impl OrderItem {
    /// Returns the total price for this line (quantity * unit_price).
    pub fn total_price(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }

    pub fn is_vendor(&self) -> bool {
        matches!(self.source, ItemSource::Vendor { .. })
    }

    pub fn vendor_article_id(&self) -> Option<&str> {
        self.source.article_id()
    }

    /// Moves the item to `status`, stamping the matching timestamp.
    pub fn transition(&mut self, status: ItemFulfillmentStatus, now: DateTime<Utc>) {
        self.fulfillment_status = status;
        match status {
            ItemFulfillmentStatus::Reserved => self.reserved_at = Some(now),
            ItemFulfillmentStatus::StockDeducted => self.stock_deducted_at = Some(now),
            ItemFulfillmentStatus::VendorOrdered => self.vendor_ordered_at = Some(now),
            ItemFulfillmentStatus::Shipped => self.shipped_at = Some(now),
            ItemFulfillmentStatus::Pending
            | ItemFulfillmentStatus::Fulfilled
            | ItemFulfillmentStatus::Cancelled
            | ItemFulfillmentStatus::Failed => {}
        }
    }
}

/// A cart line resolved against the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedLine {
    pub product_id: ProductId,
    pub source: ItemSource,
    pub sku: String,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Money,
}

/// Everything needed to place an order.
#[derive(Debug, Clone)]
pub struct PlaceOrder {
    pub customer: CustomerIdentity,
    pub lines: Vec<PricedLine>,
    pub shipping_address: Address,
    pub billing_address: Address,
    pub payment_method: String,
    pub shipping_cost: Money,
}

impl Order {
    /// Validates a placement and builds the pending order with its items.
    pub fn place(
        cmd: PlaceOrder,
        now: DateTime<Utc>,
    ) -> Result<(Order, Vec<OrderItem>), DomainError> {
        cmd.customer.validate()?;
        if cmd.payment_method.trim().is_empty() {
            return Err(DomainError::MissingPaymentMethod);
        }
        if cmd.lines.is_empty() {
            return Err(DomainError::EmptyCart);
        }

        let order_id = OrderId::new();
        let mut items = Vec::with_capacity(cmd.lines.len());
        for line in cmd.lines {
            if line.quantity == 0 {
                return Err(DomainError::InvalidQuantity {
                    product_id: line.product_id,
                    quantity: line.quantity,
                });
            }
            if line.unit_price.is_negative() {
                return Err(DomainError::InvalidPrice {
                    product_id: line.product_id,
                    cents: line.unit_price.cents(),
                });
            }
            if let ItemSource::Vendor { article_id } = &line.source
                && article_id.trim().is_empty()
            {
                return Err(DomainError::MissingArticleId {
                    product_id: line.product_id,
                });
            }

            items.push(OrderItem {
                id: OrderItemId::new(),
                order_id,
                product_id: line.product_id,
                source: line.source,
                sku: line.sku,
                name: line.name,
                quantity: line.quantity,
                unit_price: line.unit_price,
                fulfillment_status: ItemFulfillmentStatus::Pending,
                stock_held: false,
                reserved_at: None,
                stock_deducted_at: None,
                vendor_ordered_at: None,
                shipped_at: None,
            });
        }

        let subtotal: Money = items.iter().map(OrderItem::total_price).sum();
        let order = Order {
            id: order_id,
            order_number: Self::generate_number(now),
            customer: cmd.customer,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Unpaid,
            fulfillment_status: FulfillmentStatus::Pending,
            payment_method: cmd.payment_method,
            transaction_id: None,
            subtotal,
            shipping_cost: cmd.shipping_cost,
            total: subtotal + cmd.shipping_cost,
            shipping_address: cmd.shipping_address,
            billing_address: cmd.billing_address,
            vendor_order_id: None,
            internal_notes: None,
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
            paid_at: None,
            cancelled_at: None,
        };

        Ok((order, items))
    }

    /// Returns true if a payment success may start fulfillment now.
    ///
    /// A `pending` order that is already paid has a fulfillment run in flight.
    pub fn accepts_payment(&self) -> bool {
        match self.status {
            OrderStatus::Pending => self.payment_status != PaymentStatus::Paid,
            OrderStatus::PaymentPending => true,
            _ => false,
        }
    }

    /// Returns true if the order may still receive a consolidated vendor order.
    ///
    /// A mixed order whose own leg is already fulfilled is `processing` while
    /// its vendor items wait for the batch.
    pub fn awaits_vendor_order(&self) -> bool {
        matches!(self.status, OrderStatus::Reserved | OrderStatus::Processing)
            && self.payment_status == PaymentStatus::Paid
            && self.vendor_order_id.is_none()
    }

    /// Generates a human-facing order number, e.g. `ORD-20260101-9F2C41AB`.
    pub fn generate_number(now: DateTime<Utc>) -> String {
        let suffix = Uuid::new_v4().simple().to_string()[..8].to_uppercase();
        format!("ORD-{}-{suffix}", now.format("%Y%m%d"))
    }
}

//! Order placement and the order details view.

use chrono::{DateTime, Utc};
use common::{Caller, OrderId, OrderItemId, ProductId, RequestContext};
use domain::{
    Address, CustomerIdentity, FulfillmentStatus, ItemFulfillmentStatus, Money, Order, OrderItem,
    OrderStatus, PaymentStatus, PlaceOrder,
};
use serde::{Deserialize, Serialize};
use store::{OrderStore, Store};

use crate::catalog::Catalog;
use crate::error::{FulfillmentError, Result};
use crate::settings::OrderSettings;

/// One cart line as submitted by the customer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// A checkout request.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrder {
    pub customer: CustomerIdentity,
    pub lines: Vec<CartLine>,
    pub shipping_address: Address,
    /// Defaults to the shipping address.
    #[serde(default)]
    pub billing_address: Option<Address>,
    pub payment_method: String,
}

/// Returned once an order is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderCreated {
    pub order_id: OrderId,
    pub order_number: String,
    pub total: Money,
    pub status: OrderStatus,
}

/// An order line as shown to a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderItemView {
    pub id: OrderItemId,
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub total_price: Money,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor_article_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fulfillment_status: Option<ItemFulfillmentStatus>,
}

/// An order as shown to a caller.
///
/// Internal fields are `None` (and left out of JSON) unless the caller is
/// privileged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderView {
    pub id: OrderId,
    pub order_number: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub subtotal: Money,
    pub shipping_cost: Money,
    pub total: Money,
    pub shipping_address: Address,
    pub billing_address: Address,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub items: Vec<OrderItemView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fulfillment_status: Option<FulfillmentStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor_order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub internal_notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
}

impl OrderView {
    pub fn new(order: Order, items: Vec<OrderItem>, privileged: bool) -> Self {
        let items = items
            .into_iter()
            .map(|item| OrderItemView {
                total_price: item.total_price(),
                source: privileged.then(|| item.source.kind()),
                vendor_article_id: item
                    .vendor_article_id()
                    .filter(|_| privileged)
                    .map(str::to_string),
                fulfillment_status: privileged.then_some(item.fulfillment_status),
                id: item.id,
                product_id: item.product_id,
                sku: item.sku,
                name: item.name,
                quantity: item.quantity,
                unit_price: item.unit_price,
            })
            .collect();

        Self {
            id: order.id,
            order_number: order.order_number,
            status: order.status,
            payment_status: order.payment_status,
            subtotal: order.subtotal,
            shipping_cost: order.shipping_cost,
            total: order.total,
            shipping_address: order.shipping_address,
            billing_address: order.billing_address,
            cancellation_reason: order.cancellation_reason,
            created_at: order.created_at,
            paid_at: order.paid_at,
            items,
            fulfillment_status: privileged.then_some(order.fulfillment_status),
            vendor_order_id: order.vendor_order_id.filter(|_| privileged),
            internal_notes: order.internal_notes.filter(|_| privileged),
            transaction_id: order.transaction_id.filter(|_| privileged),
        }
    }
}

/// Creates orders and serves order details.
pub struct OrderService<S, C> {
    store: S,
    catalog: C,
    settings: OrderSettings,
}

impl<S, C> OrderService<S, C>
where
    S: Store,
    C: Catalog,
{
    pub fn new(store: S, catalog: C, settings: OrderSettings) -> Self {
        Self {
            store,
            catalog,
            settings,
        }
    }

    /// Prices the cart against the catalog and stores a `pending` order.
    #[tracing::instrument(
        skip(self, ctx, cmd),
        fields(request_id = %ctx.request_id, lines = cmd.lines.len())
    )]
    pub async fn create_order(
        &self,
        ctx: &RequestContext,
        cmd: CreateOrder,
    ) -> Result<OrderCreated> {
        if let (Caller::Customer(caller), Some(customer_id)) =
            (ctx.caller, cmd.customer.customer_id())
            && caller != customer_id
        {
            return Err(FulfillmentError::Validation(
                "orders can only be placed for the signed-in customer".to_string(),
            ));
        }

        let mut lines = Vec::with_capacity(cmd.lines.len());
        for line in &cmd.lines {
            let entry = self
                .catalog
                .lookup(&line.product_id)
                .await?
                .ok_or_else(|| {
                    FulfillmentError::Validation(format!("unknown product {}", line.product_id))
                })?;
            lines.push(entry.price_line(line.quantity));
        }

        let billing_address = cmd
            .billing_address
            .unwrap_or_else(|| cmd.shipping_address.clone());
        let (order, items) = Order::place(
            PlaceOrder {
                customer: cmd.customer,
                lines,
                shipping_address: cmd.shipping_address,
                billing_address,
                payment_method: cmd.payment_method,
                shipping_cost: self.settings.flat_shipping,
            },
            Utc::now(),
        )?;

        self.store.insert_order(&order, &items).await?;
        tracing::info!(
            order_id = %order.id,
            order_number = %order.order_number,
            total = %order.total,
            "order created"
        );

        Ok(OrderCreated {
            order_id: order.id,
            order_number: order.order_number,
            total: order.total,
            status: order.status,
        })
    }

    /// Loads an order for display.
    ///
    /// Signed-in customers only see their own orders. Internal fulfillment
    /// data is only included for privileged callers.
    #[tracing::instrument(skip(self, ctx), fields(request_id = %ctx.request_id))]
    pub async fn get_order_details(
        &self,
        ctx: &RequestContext,
        order_id: OrderId,
    ) -> Result<OrderView> {
        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or(FulfillmentError::OrderNotFound(order_id))?;

        if let Caller::Customer(caller) = ctx.caller
            && order.customer.customer_id() != Some(caller)
        {
            return Err(FulfillmentError::OrderNotFound(order_id));
        }

        let items = self.store.order_items(order_id).await?;
        Ok(OrderView::new(order, items, ctx.is_privileged()))
    }
}

//! Consolidated vendor sales orders.
//!
//! The batch places one vendor order per paid, fully reserved customer
//! order. The candidate query only returns orders without a vendor order id,
//! so running the batch again after a success processes nothing.
//!
//! Two overlapping runs could select the same candidate; callers must make
//! sure runs never overlap.

use common::OrderId;
use domain::{FulfillmentStatus, ItemFulfillmentStatus, Order};
use serde::Serialize;
use store::{OrderStore, Store};

use crate::error::Result;
use crate::settings::VendorSettings;
use crate::vendor::{SalesOrderLine, SalesOrderRequest, VendorClient};

/// A candidate that could not be submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    pub order_id: OrderId,
    pub order_number: String,
    pub message: String,
}

/// Summary of one batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub orders_processed: usize,
    /// Order numbers submitted in this run.
    pub processed_orders: Vec<String>,
    pub errors: Vec<BatchFailure>,
}

enum Submission {
    Submitted(String),
    Skipped,
}

/// Submits reserved vendor items as consolidated vendor orders.
pub struct VendorOrderBatch<S, V> {
    store: S,
    vendor: V,
    settings: VendorSettings,
}

impl<S, V> VendorOrderBatch<S, V>
where
    S: Store,
    V: VendorClient,
{
    pub fn new(store: S, vendor: V, settings: VendorSettings) -> Self {
        Self {
            store,
            vendor,
            settings,
        }
    }

    /// Runs one batch. A failing order is reported and the run continues.
    #[tracing::instrument(skip(self))]
    pub async fn run(&self) -> Result<BatchReport> {
        let candidates = self.store.vendor_batch_candidates().await?;
        tracing::info!(candidates = candidates.len(), "vendor order batch started");

        let mut report = BatchReport::default();
        for order in candidates {
            match self.submit(&order).await {
                Ok(Submission::Submitted(vendor_order_id)) => {
                    metrics::counter!("vendor_batch_orders_total", "result" => "submitted")
                        .increment(1);
                    tracing::info!(
                        order_number = %order.order_number,
                        vendor_order_id = %vendor_order_id,
                        "vendor order placed"
                    );
                    report.orders_processed += 1;
                    report.processed_orders.push(order.order_number);
                }
                Ok(Submission::Skipped) => {
                    metrics::counter!("vendor_batch_orders_total", "result" => "skipped")
                        .increment(1);
                    tracing::debug!(
                        order_number = %order.order_number,
                        "not every vendor item is reserved, skipping"
                    );
                }
                Err(e) => {
                    metrics::counter!("vendor_batch_orders_total", "result" => "failed")
                        .increment(1);
                    tracing::warn!(
                        order_number = %order.order_number,
                        error = %e,
                        "vendor order failed"
                    );
                    report.errors.push(BatchFailure {
                        order_id: order.id,
                        order_number: order.order_number,
                        message: e.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }

    async fn submit(&self, order: &Order) -> Result<Submission> {
        let items = self.store.order_items(order.id).await?;

        let vendor_items: Vec<_> = items.iter().filter(|i| i.is_vendor()).collect();
        let all_reserved = vendor_items
            .iter()
            .all(|i| i.fulfillment_status == ItemFulfillmentStatus::Reserved);
        if vendor_items.is_empty() || !all_reserved {
            return Ok(Submission::Skipped);
        }

        let request = SalesOrderRequest {
            reference: order.order_number.clone(),
            items: vendor_items
                .iter()
                .filter_map(|i| {
                    i.vendor_article_id().map(|article_id| SalesOrderLine {
                        article_id: article_id.to_string(),
                        quantity: i.quantity,
                    })
                })
                .collect(),
            shipping_address: self.settings.shipping_address.clone(),
            payment_terms: self.settings.payment_terms.clone(),
        };

        let vendor_order_id = self.vendor.submit_sales_order(&request).await?;

        let own_items_fulfilled = items
            .iter()
            .any(|i| !i.is_vendor() && i.fulfillment_status == ItemFulfillmentStatus::Fulfilled);
        self.store
            .record_vendor_submission(
                order.id,
                &vendor_order_id,
                FulfillmentStatus::after_vendor_submission(own_items_fulfilled),
            )
            .await?;

        Ok(Submission::Submitted(vendor_order_id))
    }
}

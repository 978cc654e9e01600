//! Vendor reservation records.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use common::{OrderId, OrderItemId, ProductId, ReservationId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::order::OrderItem;
use crate::status::status_strings;

/// Lifecycle of a vendor reservation.
///
/// ```text
/// Pending ──┬──► Reserved ──┬──► Ordered
///           │               └──► Unreserved
///           └──► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    #[default]
    Pending,
    Reserved,
    Failed,
    Unreserved,
    Ordered,
}

status_strings!(ReservationStatus, "reservation status", {
    Pending => "pending",
    Reserved => "reserved",
    Failed => "failed",
    Unreserved => "unreserved",
    Ordered => "ordered",
});

/// Result of a best-effort compensating call against the vendor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompensationOutcome {
    pub attempted: bool,
    pub succeeded: bool,
    pub failed_reason: Option<String>,
}

impl CompensationOutcome {
    pub fn succeeded() -> Self {
        Self {
            attempted: true,
            succeeded: true,
            failed_reason: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            attempted: true,
            succeeded: false,
            failed_reason: Some(reason.into()),
        }
    }

    /// No vendor hold existed, so nothing was called.
    pub fn not_attempted() -> Self {
        Self {
            attempted: false,
            succeeded: false,
            failed_reason: None,
        }
    }

    /// Returns true if a vendor-side hold may still be outstanding.
    pub fn needs_reconciliation(&self) -> bool {
        self.attempted && !self.succeeded
    }
}

/// Correlates one vendor-sourced order line with the vendor's stock hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub order_id: OrderId,
    pub order_item_id: OrderItemId,
    pub product_id: ProductId,
    pub vendor_article_id: String,
    pub quantity: u32,
    pub status: ReservationStatus,
    /// Vendor-side id; present only once reserved.
    pub external_reservation_id: Option<String>,
    pub error_message: Option<String>,
    /// True while this reservation's quantity is held in the local ledger.
    pub stock_held: bool,
    pub compensation: Option<CompensationOutcome>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub reserved_at: Option<DateTime<Utc>>,
}

impl Reservation {
    /// Creates a pending reservation for a vendor-sourced line.
    pub fn pending(item: &OrderItem, now: DateTime<Utc>) -> Result<Self, DomainError> {
        let vendor_article_id = item
            .vendor_article_id()
            .ok_or(DomainError::NotVendorItem(item.id))?
            .to_string();

        Ok(Self {
            id: ReservationId::new(),
            order_id: item.order_id,
            order_item_id: item.id,
            product_id: item.product_id.clone(),
            vendor_article_id,
            quantity: item.quantity,
            status: ReservationStatus::Pending,
            external_reservation_id: None,
            error_message: None,
            stock_held: false,
            compensation: None,
            created_at: now,
            updated_at: now,
            reserved_at: None,
        })
    }

    /// Returns true if an unreserve has anything to undo.
    pub fn is_releasable(&self) -> bool {
        self.status == ReservationStatus::Reserved && self.external_reservation_id.is_some()
    }
}

/// Counts of an order's current reservations per status.
///
/// A retried fulfillment run creates a fresh reservation for every vendor
/// line, so only the latest reservation of each order item is counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReservationSummary {
    pub total: usize,
    pub pending: usize,
    pub reserved: usize,
    pub failed: usize,
    pub unreserved: usize,
    pub ordered: usize,
    pub all_reserved: bool,
}

impl ReservationSummary {
    pub fn from_reservations<'a>(reservations: impl IntoIterator<Item = &'a Reservation>) -> Self {
        let mut latest: HashMap<OrderItemId, &Reservation> = HashMap::new();
        for reservation in reservations {
            // later records win ties
            latest
                .entry(reservation.order_item_id)
                .and_modify(|current| {
                    if reservation.created_at >= current.created_at {
                        *current = reservation;
                    }
                })
                .or_insert(reservation);
        }

        let mut summary = Self::default();
        for reservation in latest.values() {
            summary.total += 1;
            match reservation.status {
                ReservationStatus::Pending => summary.pending += 1,
                ReservationStatus::Reserved => summary.reserved += 1,
                ReservationStatus::Failed => summary.failed += 1,
                ReservationStatus::Unreserved => summary.unreserved += 1,
                ReservationStatus::Ordered => summary.ordered += 1,
            }
        }
        summary.all_reserved = summary.reserved == summary.total;
        summary
    }
}

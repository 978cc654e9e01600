//! Stock ledger counters.

use common::ProductId;
use serde::{Deserialize, Serialize};

use crate::status::status_strings;

/// Which fulfillment flow consumes stock.
///
/// The flows move counters differently: a vendor reservation shifts quantity
/// from available to reserved, while an own deduction only lowers available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockFlow {
    Vendor,
    Own,
}

status_strings!(StockFlow, "stock flow", {
    Vendor => "vendor",
    Own => "own",
});

/// Stock counters of a single product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevels {
    pub product_id: ProductId,
    pub stock_quantity: u32,
    pub available_quantity: u32,
    pub reserved_quantity: u32,
}

impl StockLevels {
    /// A product with `quantity` units on hand, all available.
    pub fn new(product_id: impl Into<ProductId>, quantity: u32) -> Self {
        Self {
            product_id: product_id.into(),
            stock_quantity: quantity,
            available_quantity: quantity,
            reserved_quantity: 0,
        }
    }

    /// Applies a reservation; returns `None` when available stock is short.
    pub fn reserved(&self, quantity: u32, flow: StockFlow) -> Option<Self> {
        let available_quantity = self.available_quantity.checked_sub(quantity)?;
        let reserved_quantity = match flow {
            StockFlow::Vendor => self.reserved_quantity.checked_add(quantity)?,
            StockFlow::Own => self.reserved_quantity,
        };
        Some(Self {
            available_quantity,
            reserved_quantity,
            ..self.clone()
        })
    }

    /// Reverses a reservation made through the same flow.
    pub fn released(&self, quantity: u32, flow: StockFlow) -> Self {
        let reserved_quantity = match flow {
            StockFlow::Vendor => self.reserved_quantity.saturating_sub(quantity),
            StockFlow::Own => self.reserved_quantity,
        };
        Self {
            available_quantity: self.available_quantity.saturating_add(quantity),
            reserved_quantity,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vendor_flow_moves_available_to_reserved() {
        let levels = StockLevels::new("P1", 10);
        let after = levels.reserved(2, StockFlow::Vendor).unwrap();
        assert_eq!(after.stock_quantity, 10);
        assert_eq!(after.available_quantity, 8);
        assert_eq!(after.reserved_quantity, 2);

        assert_eq!(after.released(2, StockFlow::Vendor), levels);
    }

    #[test]
    fn test_own_flow_only_lowers_available() {
        let levels = StockLevels::new("P1", 5);
        let after = levels.reserved(1, StockFlow::Own).unwrap();
        assert_eq!(after.available_quantity, 4);
        assert_eq!(after.reserved_quantity, 0);
        assert_eq!(after.stock_quantity, 5);

        assert_eq!(after.released(1, StockFlow::Own), levels);
    }

    #[test]
    fn test_insufficient_stock() {
        let levels = StockLevels::new("P1", 1);
        assert!(levels.reserved(2, StockFlow::Vendor).is_none());
        assert!(levels.reserved(1, StockFlow::Own).is_some());
    }
}

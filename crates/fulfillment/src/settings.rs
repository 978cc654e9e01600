//! Typed settings for the fulfillment services.

use std::time::Duration;

use domain::{Address, Money};

/// How consolidated vendor orders are placed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorSettings {
    /// Payment terms sent with every sales order.
    pub payment_terms: String,
    /// Where the vendor ships consolidated orders.
    pub shipping_address: Address,
    /// Upper bound for a single vendor call.
    pub timeout: Duration,
}

impl Default for VendorSettings {
    fn default() -> Self {
        Self {
            payment_terms: "prepaid".to_string(),
            shipping_address: Address {
                name: "Fulfillment Center".to_string(),
                line1: "1 Warehouse Way".to_string(),
                line2: None,
                postal_code: "00000".to_string(),
                city: "Unknown".to_string(),
                country: "US".to_string(),
            },
            timeout: Duration::from_millis(10_000),
        }
    }
}

/// Pricing settings applied when orders are created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderSettings {
    /// Flat shipping cost added to every order.
    pub flat_shipping: Money,
}

impl Default for OrderSettings {
    fn default() -> Self {
        Self {
            flat_shipping: Money::zero(),
        }
    }
}

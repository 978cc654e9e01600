//! Application configuration loaded from environment variables.

use std::time::Duration;

use domain::{Address, Money};
use fulfillment::{OrderSettings, VendorSettings};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`, `PORT`: bind address (default `0.0.0.0:3000`)
/// - `RUST_LOG`: tracing filter directive (default `info`)
/// - `LOG_FORMAT`: `text` or `json` (default `text`)
/// - `DATABASE_URL`: PostgreSQL URL; the in-memory store is used when unset
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default `5`)
/// - `VENDOR_API_URL`, `VENDOR_API_KEY`: vendor endpoint; the in-memory
///   vendor is used when the URL is unset
/// - `VENDOR_TIMEOUT_MS`: upper bound per vendor call (default `10000`)
/// - `VENDOR_BATCH_INTERVAL_SECS`: batch period, `0` disables (default `300`)
/// - `VENDOR_PAYMENT_TERMS`: sent with sales orders (default `prepaid`)
/// - `VENDOR_SHIPPING_NAME`, `_LINE1`, `_LINE2`, `_POSTAL_CODE`, `_CITY`,
///   `_COUNTRY`: where the vendor ships consolidated orders
/// - `FLAT_SHIPPING_CENTS`: added to every order total (default `0`)
/// - `CATALOG_PATH`: JSON catalog loaded at startup
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub vendor_api_url: Option<String>,
    pub vendor_api_key: Option<String>,
    pub vendor_timeout: Duration,
    pub batch_interval: Option<Duration>,
    pub vendor: VendorSettings,
    pub orders: OrderSettings,
    pub catalog_path: Option<String>,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |key: &str| var(key).and_then(|v| v.trim().parse::<u64>().ok());

        let vendor_timeout = parsed("VENDOR_TIMEOUT_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.vendor_timeout);
        let batch_interval = match parsed("VENDOR_BATCH_INTERVAL_SECS") {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => defaults.batch_interval,
        };

        let fallback = defaults.vendor.shipping_address.clone();
        let shipping_address = Address {
            name: var("VENDOR_SHIPPING_NAME").unwrap_or(fallback.name),
            line1: var("VENDOR_SHIPPING_LINE1").unwrap_or(fallback.line1),
            line2: var("VENDOR_SHIPPING_LINE2").or(fallback.line2),
            postal_code: var("VENDOR_SHIPPING_POSTAL_CODE").unwrap_or(fallback.postal_code),
            city: var("VENDOR_SHIPPING_CITY").unwrap_or(fallback.city),
            country: var("VENDOR_SHIPPING_COUNTRY").unwrap_or(fallback.country),
        };

        Self {
            host: var("HOST").unwrap_or(defaults.host),
            port: var("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match var("LOG_FORMAT").as_deref() {
                Some("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
            database_url: var("DATABASE_URL").filter(|v| !v.is_empty()),
            database_max_connections: var("DATABASE_MAX_CONNECTIONS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.database_max_connections),
            vendor_api_url: var("VENDOR_API_URL").filter(|v| !v.is_empty()),
            vendor_api_key: var("VENDOR_API_KEY").filter(|v| !v.is_empty()),
            vendor_timeout,
            batch_interval,
            vendor: VendorSettings {
                payment_terms: var("VENDOR_PAYMENT_TERMS").unwrap_or(defaults.vendor.payment_terms),
                shipping_address,
                timeout: vendor_timeout,
            },
            orders: OrderSettings {
                flat_shipping: var("FLAT_SHIPPING_CENTS")
                    .and_then(|v| v.trim().parse::<i64>().ok())
                    .filter(|cents| *cents >= 0)
                    .map(Money::from_cents)
                    .unwrap_or(defaults.orders.flat_shipping),
            },
            catalog_path: var("CATALOG_PATH").filter(|v| !v.is_empty()),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        let vendor = VendorSettings::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            database_max_connections: 5,
            vendor_api_url: None,
            vendor_api_key: None,
            vendor_timeout: vendor.timeout,
            batch_interval: Some(Duration::from_secs(300)),
            vendor,
            orders: OrderSettings::default(),
            catalog_path: None,
        }
    }
}

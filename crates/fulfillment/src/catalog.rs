//! Priced product lookup used when orders are created.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::ProductId;
use domain::{ItemSource, Money, PricedLine};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::Result;

/// A product as the storefront sells it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub product_id: ProductId,
    pub sku: String,
    pub name: String,
    /// Final unit price, markup included.
    pub unit_price: Money,
    #[serde(flatten)]
    pub source: ItemSource,
    /// Units on hand when the product is first registered with the ledger.
    #[serde(default)]
    pub initial_stock: u32,
}

impl CatalogEntry {
    /// Snapshots this entry onto an order line.
    pub fn price_line(&self, quantity: u32) -> PricedLine {
        PricedLine {
            product_id: self.product_id.clone(),
            source: self.source.clone(),
            sku: self.sku.clone(),
            name: self.name.clone(),
            quantity,
            unit_price: self.unit_price,
        }
    }
}

/// Resolves sellable products and their current prices.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn lookup(&self, product_id: &ProductId) -> Result<Option<CatalogEntry>>;
}

/// In-memory catalog, loaded from configuration or built in tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    entries: Arc<RwLock<HashMap<ProductId, CatalogEntry>>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a catalog from a list of entries.
    pub fn from_entries(entries: impl IntoIterator<Item = CatalogEntry>) -> Self {
        let entries = entries
            .into_iter()
            .map(|e| (e.product_id.clone(), e))
            .collect();
        Self {
            entries: Arc::new(RwLock::new(entries)),
        }
    }

    /// Parses a JSON array of entries.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        let entries: Vec<CatalogEntry> = serde_json::from_str(json)?;
        Ok(Self::from_entries(entries))
    }

    pub async fn insert(&self, entry: CatalogEntry) {
        self.entries
            .write()
            .await
            .insert(entry.product_id.clone(), entry);
    }

    /// Changes the price of a product; existing orders keep their snapshot.
    pub async fn set_price(&self, product_id: &ProductId, unit_price: Money) {
        if let Some(entry) = self.entries.write().await.get_mut(product_id) {
            entry.unit_price = unit_price;
        }
    }

    /// Returns every entry, sorted by product id.
    pub async fn entries(&self) -> Vec<CatalogEntry> {
        let mut entries: Vec<_> = self.entries.read().await.values().cloned().collect();
        entries.sort_by(|a, b| a.product_id.as_str().cmp(b.product_id.as_str()));
        entries
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn lookup(&self, product_id: &ProductId) -> Result<Option<CatalogEntry>> {
        Ok(self.entries.read().await.get(product_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_from_json() {
        let catalog = InMemoryCatalog::from_json(
            r#"[
                {"product_id": "P1", "sku": "SKU-1", "name": "Lamp", "unit_price": 1999,
                 "source": "vendor", "article_id": "A-1", "initial_stock": 10},
                {"product_id": "P2", "sku": "SKU-2", "name": "Mug", "unit_price": 499,
                 "source": "own"}
            ]"#,
        )
        .unwrap();

        let lamp = catalog.lookup(&ProductId::new("P1")).await.unwrap().unwrap();
        assert_eq!(lamp.source.article_id(), Some("A-1"));
        assert_eq!(lamp.initial_stock, 10);

        let mug = catalog.lookup(&ProductId::new("P2")).await.unwrap().unwrap();
        assert_eq!(mug.source, ItemSource::Own);
        assert_eq!(mug.initial_stock, 0);

        assert!(catalog.lookup(&ProductId::new("P3")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_price_line_snapshots_current_price() {
        let catalog = InMemoryCatalog::new();
        catalog
            .insert(CatalogEntry {
                product_id: ProductId::new("P1"),
                sku: "SKU-1".to_string(),
                name: "Lamp".to_string(),
                unit_price: Money::from_cents(1999),
                source: ItemSource::Own,
                initial_stock: 3,
            })
            .await;

        let line = catalog
            .lookup(&ProductId::new("P1"))
            .await
            .unwrap()
            .unwrap()
            .price_line(2);
        catalog
            .set_price(&ProductId::new("P1"), Money::from_cents(2499))
            .await;

        assert_eq!(line.unit_price.cents(), 1999);
        assert_eq!(line.quantity, 2);
    }
}

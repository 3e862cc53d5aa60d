//! Product Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::value_objects::{Sku, TaxRate};

/// A sellable catalogue item. Stock is signed because legacy rows may have
/// been oversold before conditional decrements were enforced.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub sku: Sku,
    pub name: String,
    pub price: Decimal,
    pub stock_quantity: i32,
    pub tax_rate: Option<TaxRate>,
    pub unit: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn create(sku: Sku, name: impl Into<String>, price: Decimal) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(), sku, name: name.into(), price, stock_quantity: 0,
            tax_rate: None, unit: "pcs".to_string(), created_at: now, updated_at: now,
        }
    }

    pub fn with_stock(mut self, quantity: i32) -> Self { self.stock_quantity = quantity; self }
    pub fn with_tax_rate(mut self, rate: TaxRate) -> Self { self.tax_rate = Some(rate); self }
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self { self.unit = unit.into(); self }

    pub fn is_in_stock(&self) -> bool { self.stock_quantity > 0 }

    /// The product's own rate, or the store-wide default when unset.
    pub fn effective_tax_rate(&self, global: TaxRate) -> TaxRate { self.tax_rate.unwrap_or(global) }

    /// Takes `qty` units off the shelf, refusing to go below zero.
    pub fn remove_stock(&mut self, qty: u32) -> Result<StockChange, ProductError> {
        let qty = i32::try_from(qty).map_err(|_| ProductError::InsufficientStock { available: self.stock_quantity })?;
        if qty > self.stock_quantity {
            return Err(ProductError::InsufficientStock { available: self.stock_quantity });
        }
        let before = self.stock_quantity;
        self.stock_quantity -= qty;
        self.touch();
        Ok(StockChange { product_id: self.id, before, after: self.stock_quantity })
    }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

/// Before/after snapshot of a single stock movement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockChange {
    pub product_id: Uuid,
    pub before: i32,
    pub after: i32,
}

impl StockChange {
    pub fn delta(&self) -> i32 { self.after - self.before }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProductError {
    #[error("insufficient stock ({available} available)")]
    InsufficientStock { available: i32 },
}

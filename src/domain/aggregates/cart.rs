//! Cart Aggregate
//!
//! The till's working set of lines. Every line carries a snapshot of the
//! product it was added from, so stock checks on later quantity changes are
//! made against the stock seen at add time.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::aggregates::product::Product;
use crate::domain::value_objects::TaxRate;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Cart {
    lines: Vec<CartLine>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CartLine {
    pub product: Product,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub tax_rate: TaxRate,
    /// `unit_price * quantity`, before tax.
    pub total: Decimal,
    pub tax_amount: Decimal,
    pub line_total: Decimal,
}

impl CartLine {
    fn new(product: Product, global_tax_rate: TaxRate) -> Self {
        let tax_rate = product.effective_tax_rate(global_tax_rate);
        let unit_price = product.price;
        let mut line = Self {
            product, quantity: 1, unit_price, tax_rate,
            total: Decimal::ZERO, tax_amount: Decimal::ZERO, line_total: Decimal::ZERO,
        };
        line.recalculate();
        line
    }

    pub fn product_id(&self) -> Uuid { self.product.id }

    fn recalculate(&mut self) {
        self.total = self.unit_price * Decimal::from(self.quantity);
        self.tax_amount = self.tax_rate.tax_on(self.total);
        self.line_total = self.total + self.tax_amount;
    }
}

impl Cart {
    pub fn new() -> Self { Self::default() }

    pub fn lines(&self) -> &[CartLine] { &self.lines }
    pub fn item_count(&self) -> usize { self.lines.len() }
    pub fn unit_count(&self) -> u32 { self.lines.iter().map(|l| l.quantity).sum() }
    pub fn is_empty(&self) -> bool { self.lines.is_empty() }
    pub fn line(&self, product_id: Uuid) -> Option<&CartLine> { self.lines.iter().find(|l| l.product_id() == product_id) }

    /// Adds one unit of `product`, merging into an existing line.
    pub fn add(&mut self, product: Product, global_tax_rate: TaxRate) -> Result<(), CartError> {
        self.add_units(product, 1, global_tax_rate)
    }

    /// Adds `quantity` units, merging into an existing line. The combined
    /// quantity is checked against stock; a rejection leaves the cart as it was.
    pub fn add_units(&mut self, product: Product, quantity: u32, global_tax_rate: TaxRate) -> Result<(), CartError> {
        if !product.is_in_stock() {
            return Err(CartError::OutOfStock { name: product.name });
        }
        if quantity == 0 { return Ok(()); }
        if let Some(existing) = self.line(product.id) {
            let next = existing.quantity.saturating_add(quantity);
            return self.set_quantity(product.id, next);
        }
        if i64::from(quantity) > i64::from(product.stock_quantity) {
            return Err(CartError::ExceedsStock { name: product.name, available: product.stock_quantity });
        }
        let mut line = CartLine::new(product, global_tax_rate);
        line.quantity = quantity;
        line.recalculate();
        self.lines.push(line);
        Ok(())
    }

    /// Sets the quantity of a line; zero removes it. Quantities above the
    /// product's stock are rejected and leave the line untouched.
    pub fn set_quantity(&mut self, product_id: Uuid, quantity: u32) -> Result<(), CartError> {
        if quantity == 0 {
            self.remove(product_id);
            return Ok(());
        }
        let line = self.lines.iter_mut().find(|l| l.product_id() == product_id).ok_or(CartError::ItemNotFound(product_id))?;
        let available = line.product.stock_quantity;
        if i64::from(quantity) > i64::from(available) {
            return Err(CartError::ExceedsStock { name: line.product.name.clone(), available });
        }
        line.quantity = quantity;
        line.recalculate();
        Ok(())
    }

    pub fn remove(&mut self, product_id: Uuid) { self.lines.retain(|l| l.product_id() != product_id); }

    pub fn clear(&mut self) { self.lines.clear(); }
}

/// Rejections shown to the cashier as warnings. None of them mutate the cart.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CartError {
    #[error("{name} is out of stock")]
    OutOfStock { name: String },
    #[error("only {available} of {name} in stock")]
    ExceedsStock { name: String, available: i32 },
    #[error("product {0} is not in the cart")]
    ItemNotFound(Uuid),
}

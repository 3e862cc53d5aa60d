//! Checkout totals and the discount entry rules behind them.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use crate::domain::aggregates::cart::CartLine;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountKind { #[default] Amount, Percentage }

impl DiscountKind {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Amount => "amount", Self::Percentage => "percentage" }
    }
    pub fn parse(value: &str) -> Option<Self> {
        match value { "amount" => Some(Self::Amount), "percentage" => Some(Self::Percentage), _ => None }
    }
}

/// A validated discount: never negative, percentages never above 100.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Discount {
    kind: DiscountKind,
    value: Decimal,
}

impl Discount {
    pub fn none() -> Self { Self::default() }

    pub fn new(kind: DiscountKind, value: Decimal) -> Result<Self, DiscountError> {
        check(kind, value)?;
        Ok(Self { kind, value })
    }

    pub fn amount(value: Decimal) -> Result<Self, DiscountError> { Self::new(DiscountKind::Amount, value) }
    pub fn percentage(value: Decimal) -> Result<Self, DiscountError> { Self::new(DiscountKind::Percentage, value) }

    pub fn kind(&self) -> DiscountKind { self.kind }
    pub fn value(&self) -> Decimal { self.value }

    /// Money taken off `subtotal`.
    pub fn apply_to(&self, subtotal: Decimal) -> Decimal {
        match self.kind {
            DiscountKind::Percentage => subtotal * self.value / Decimal::ONE_HUNDRED,
            DiscountKind::Amount => self.value,
        }
    }
}

fn check(kind: DiscountKind, value: Decimal) -> Result<(), DiscountError> {
    if value < Decimal::ZERO {
        return Err(DiscountError::Negative(value));
    }
    if kind == DiscountKind::Percentage && value > Decimal::ONE_HUNDRED {
        return Err(DiscountError::PercentageAboveHundred(value));
    }
    Ok(())
}

/// The discount field as the cashier edits it. Rejected values leave the
/// stored discount unchanged.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DiscountInput {
    current: Discount,
}

impl DiscountInput {
    pub fn discount(&self) -> Discount { self.current }

    pub fn set_value(&mut self, value: Decimal) -> Result<(), DiscountError> {
        self.current = Discount::new(self.current.kind, value)?;
        Ok(())
    }

    /// Percentage to amount keeps the number; amount to percentage drops a
    /// value that would not be a valid percentage back to zero.
    pub fn set_kind(&mut self, kind: DiscountKind) {
        let value = match kind {
            DiscountKind::Percentage if self.current.value > Decimal::ONE_HUNDRED => Decimal::ZERO,
            _ => self.current.value,
        };
        self.current = Discount { kind, value };
    }

    pub fn reset(&mut self) { self.current = Discount::none(); }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiscountError {
    #[error("discount cannot be negative ({0})")]
    Negative(Decimal),
    #[error("percentage discount cannot exceed 100 ({0})")]
    PercentageAboveHundred(Decimal),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub subtotal: Decimal,
    pub total_tax: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
}

impl Totals {
    pub fn calculate(lines: &[CartLine], discount: &Discount) -> Self {
        let subtotal: Decimal = lines.iter().map(|l| l.total).sum();
        let total_tax: Decimal = lines.iter().map(|l| l.tax_amount).sum();
        let discount = discount.apply_to(subtotal);
        let total = (subtotal + total_tax - discount).max(Decimal::ZERO);
        Self { subtotal, total_tax, discount, total }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{cart::Cart, product::Product};
    use crate::domain::value_objects::{Sku, TaxRate};

    fn d(v: i64) -> Decimal { Decimal::new(v, 0) }

    fn cart_100_x2_at_18() -> Cart {
        let mut cart = Cart::new();
        let p = Product::create(Sku::new("A").unwrap(), "A", d(100)).with_stock(5).with_tax_rate(TaxRate::new(d(18)).unwrap());
        let id = p.id;
        cart.add(p, TaxRate::zero()).unwrap();
        cart.set_quantity(id, 2).unwrap();
        cart
    }

    #[test]
    fn test_amount_discount() {
        let cart = cart_100_x2_at_18();
        let t = Totals::calculate(cart.lines(), &Discount::amount(d(20)).unwrap());
        assert_eq!(t, Totals { subtotal: d(200), total_tax: d(36), discount: d(20), total: d(216) });
    }

    #[test]
    fn test_percentage_discount() {
        let cart = cart_100_x2_at_18();
        let t = Totals::calculate(cart.lines(), &Discount::percentage(d(10)).unwrap());
        assert_eq!(t.discount, d(20));
        assert_eq!(t.total, d(216));
    }

    #[test]
    fn test_total_never_below_zero() {
        let cart = cart_100_x2_at_18();
        let t = Totals::calculate(cart.lines(), &Discount::amount(d(10_000)).unwrap());
        assert_eq!(t.total, Decimal::ZERO);
        let t = Totals::calculate(&[], &Discount::none());
        assert_eq!(t, Totals::default());
    }

    #[test]
    fn test_discount_validation() {
        assert_eq!(Discount::percentage(d(101)), Err(DiscountError::PercentageAboveHundred(d(101))));
        assert_eq!(Discount::amount(d(-1)), Err(DiscountError::Negative(d(-1))));
        assert!(Discount::amount(d(500)).is_ok());
    }

    #[test]
    fn test_input_rejects_invalid_and_keeps_previous() {
        let mut input = DiscountInput::default();
        input.set_kind(DiscountKind::Percentage);
        input.set_value(d(40)).unwrap();
        assert!(input.set_value(d(140)).is_err());
        assert_eq!(input.discount().value(), d(40));
    }

    #[test]
    fn test_kind_switching() {
        let mut input = DiscountInput::default();
        input.set_kind(DiscountKind::Percentage);
        input.set_value(d(60)).unwrap();
        input.set_kind(DiscountKind::Amount);
        assert_eq!(input.discount(), Discount::amount(d(60)).unwrap());

        input.set_value(d(150)).unwrap();
        input.set_kind(DiscountKind::Percentage);
        assert_eq!(input.discount().value(), Decimal::ZERO);

        input.set_kind(DiscountKind::Amount);
        input.set_value(d(80)).unwrap();
        input.set_kind(DiscountKind::Percentage);
        assert_eq!(input.discount().value(), d(80));
    }
}

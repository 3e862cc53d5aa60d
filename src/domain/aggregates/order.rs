//! Order Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::aggregates::cart::CartLine;
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::totals::{DiscountKind, Totals};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub customer_id: Option<Uuid>,
    pub contact: Contact,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub discount_kind: DiscountKind,
    pub discount_value: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub status: OrderStatus,
    pub source: OrderSource,
    pub idempotency_key: Option<Uuid>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

/// Who the order is for. Walk-in sales carry whatever the cashier typed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Immutable snapshot of a cart line taken when the order is placed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub sku: String,
    pub unit: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub tax_amount: Decimal,
    pub line_total: Decimal,
}

impl OrderLine {
    pub fn snapshot(order_id: Uuid, line: &CartLine) -> Self {
        Self {
            id: Uuid::now_v7(),
            order_id,
            product_id: line.product.id,
            product_name: line.product.name.clone(),
            sku: line.product.sku.to_string(),
            unit: line.product.unit.clone(),
            quantity: line.quantity,
            unit_price: line.unit_price,
            tax_amount: line.tax_amount,
            line_total: line.line_total,
        }
    }
}

macro_rules! string_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str { match self { $(Self::$variant => $text),+ } }
            pub fn parse(value: &str) -> Option<Self> { match value { $($text => Some(Self::$variant),)+ _ => None } }
        }
        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(self.as_str()) }
        }
    };
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus { #[default] Pending, Confirmed, Processing, Shipped, Delivered, Cancelled, Refunded }
string_enum!(OrderStatus { Pending => "pending", Confirmed => "confirmed", Processing => "processing", Shipped => "shipped", Delivered => "delivered", Cancelled => "cancelled", Refunded => "refunded" });

impl OrderStatus {
    /// Whether the order's money still counts as revenue.
    pub fn counts_as_revenue(&self) -> bool { !matches!(self, Self::Cancelled | Self::Refunded) }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus { #[default] Pending, Paid, PartiallyPaid, Refunded, Failed }
string_enum!(PaymentStatus { Pending => "pending", Paid => "paid", PartiallyPaid => "partially_paid", Refunded => "refunded", Failed => "failed" });

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod { #[default] Cash, Card, Upi, BankTransfer, Credit }
string_enum!(PaymentMethod { Cash => "cash", Card => "card", Upi => "upi", BankTransfer => "bank_transfer", Credit => "credit" });

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSource { #[default] Pos, Ecommerce }
string_enum!(OrderSource { Pos => "pos", Ecommerce => "ecommerce" });

impl Order {
    /// A paid, confirmed till sale.
    pub fn place_pos(totals: &Totals, discount_kind: DiscountKind, discount_value: Decimal, payment_method: PaymentMethod) -> Self {
        let id = Uuid::now_v7();
        let now = Utc::now();
        let order_number = order_number(now);
        let mut order = Self {
            id, order_number: order_number.clone(), customer_id: None, contact: Contact::default(),
            subtotal: totals.subtotal, tax: totals.total_tax, discount_kind, discount_value,
            discount: totals.discount, total: totals.total, payment_method,
            payment_status: PaymentStatus::Paid, status: OrderStatus::Confirmed, source: OrderSource::Pos,
            idempotency_key: None, notes: None, created_at: now, updated_at: now, events: vec![],
        };
        order.raise_event(DomainEvent::Order(OrderEvent::Placed { order_id: id, order_number, total: totals.total }));
        order
    }

    /// Rebuilds an order read back from storage; no events are raised.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: Uuid, order_number: String, customer_id: Option<Uuid>, contact: Contact, totals: Totals,
        discount_kind: DiscountKind, discount_value: Decimal, payment_method: PaymentMethod,
        payment_status: PaymentStatus, status: OrderStatus, source: OrderSource, idempotency_key: Option<Uuid>,
        notes: Option<String>, created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id, order_number, customer_id, contact, subtotal: totals.subtotal, tax: totals.total_tax,
            discount_kind, discount_value, discount: totals.discount, total: totals.total, payment_method,
            payment_status, status, source, idempotency_key, notes, created_at, updated_at, events: vec![],
        }
    }

    pub fn totals(&self) -> Totals {
        Totals { subtotal: self.subtotal, total_tax: self.tax, discount: self.discount, total: self.total }
    }

    /// Admin status change. Any status may follow any other.
    pub fn set_status(&mut self, status: OrderStatus) {
        if status == self.status { return; }
        let from = self.status;
        self.status = status;
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::StatusChanged { order_id: self.id, from, to: status }));
    }

    pub fn set_payment_status(&mut self, status: PaymentStatus) { self.payment_status = status; self.touch(); }

    /// Draws a fresh order number after the store reported the old one taken.
    /// A pending `Placed` event is updated to match.
    pub fn renumber(&mut self) {
        self.order_number = order_number(self.created_at);
        for event in &mut self.events {
            if let DomainEvent::Order(OrderEvent::Placed { order_number, .. }) = event {
                order_number.clone_from(&self.order_number);
            }
        }
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

/// `POS-yymmdd-NNNNNNNN`: the sale date plus eight random digits.
fn order_number(at: DateTime<Utc>) -> String {
    format!("POS-{}-{:08}", at.format("%y%m%d"), rand::random::<u32>() % 100_000_000)
}

/// Append-only stock ledger entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryTransaction {
    pub id: Uuid,
    pub product_id: Uuid,
    pub quantity_change: i32,
    pub stock_before: i32,
    pub stock_after: i32,
    pub order_id: Option<Uuid>,
    pub transaction_type: String,
    pub created_at: DateTime<Utc>,
}

impl InventoryTransaction {
    pub fn sale(order_id: Uuid, change: &crate::domain::aggregates::product::StockChange) -> Self {
        Self {
            id: Uuid::now_v7(), product_id: change.product_id, quantity_change: change.delta(),
            stock_before: change.before, stock_after: change.after, order_id: Some(order_id),
            transaction_type: "sale".to_string(), created_at: Utc::now(),
        }
    }
}

//! Sales reporting over already-fetched orders.

use std::collections::BTreeMap;
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use uuid::Uuid;
use crate::domain::aggregates::{Order, PaymentMethod};

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SalesSummary {
    pub order_count: usize,
    pub revenue_orders: usize,
    pub gross_revenue: Decimal,
    pub tax_collected: Decimal,
    pub discounts_given: Decimal,
    pub average_order_value: Decimal,
    pub by_payment_method: Vec<PaymentShare>,
    pub by_status: BTreeMap<String, usize>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PaymentShare {
    pub method: PaymentMethod,
    pub revenue: Decimal,
    /// Share of gross revenue, 0-100, two decimal places.
    pub percent: Decimal,
}

fn round2(value: Decimal) -> Decimal { value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero) }

impl SalesSummary {
    /// Cancelled and refunded orders are counted by status but excluded from
    /// every money figure.
    pub fn from_orders(orders: &[Order]) -> Self {
        let mut summary = Self { order_count: orders.len(), ..Self::default() };
        let mut by_method: BTreeMap<&'static str, (PaymentMethod, Decimal)> = BTreeMap::new();

        for order in orders {
            *summary.by_status.entry(order.status.as_str().to_string()).or_default() += 1;
            if !order.status.counts_as_revenue() { continue; }
            summary.revenue_orders += 1;
            summary.gross_revenue += order.total;
            summary.tax_collected += order.tax;
            summary.discounts_given += order.discount;
            by_method.entry(order.payment_method.as_str()).or_insert((order.payment_method, Decimal::ZERO)).1 += order.total;
        }

        if summary.revenue_orders > 0 {
            summary.average_order_value = round2(summary.gross_revenue / Decimal::from(summary.revenue_orders));
        }
        summary.by_payment_method = by_method
            .into_values()
            .map(|(method, revenue)| {
                let percent = if summary.gross_revenue.is_zero() {
                    Decimal::ZERO
                } else {
                    round2(revenue * Decimal::ONE_HUNDRED / summary.gross_revenue)
                };
                PaymentShare { method, revenue, percent }
            })
            .collect();
        summary
    }
}

/// One flat row per order, shaped for spreadsheet export.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OrderExportRow {
    pub order_id: Uuid,
    pub order_number: String,
    pub date: DateTime<Utc>,
    pub customer: String,
    pub phone: String,
    pub source: String,
    pub status: String,
    pub payment_method: String,
    pub payment_status: String,
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub discount: Decimal,
    pub total: Decimal,
}

pub fn export_rows(orders: &[Order]) -> Vec<OrderExportRow> {
    orders
        .iter()
        .map(|o| OrderExportRow {
            order_id: o.id,
            order_number: o.order_number.clone(),
            date: o.created_at,
            customer: o.contact.name.clone().unwrap_or_else(|| "Walk-in".to_string()),
            phone: o.contact.phone.clone().unwrap_or_default(),
            source: o.source.as_str().to_string(),
            status: o.status.as_str().to_string(),
            payment_method: o.payment_method.as_str().to_string(),
            payment_status: o.payment_status.as_str().to_string(),
            subtotal: o.subtotal,
            tax: o.tax,
            discount: o.discount,
            total: o.total,
        })
        .collect()
}

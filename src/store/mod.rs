//! Table-oriented persistence for the back office.
//!
//! Each method is one independent write or read. Callers sequence them; no
//! method spans more than one table except `delete_order`, which removes the
//! order's lines with it.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;
use crate::domain::aggregates::{Customer, InventoryTransaction, Order, OrderLine, OrderSource, OrderStatus, PaymentStatus, Product, StockChange};

pub use memory::InMemoryStore;
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },
    #[error("insufficient stock for product {product_id} ({available} available)")]
    InsufficientStock { product_id: Uuid, available: i32 },
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupt row: {0}")]
    CorruptRow(String),
}

/// Narrows an order listing. Empty filter matches everything.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub source: Option<OrderSource>,
    pub search: Option<String>,
}

impl OrderFilter {
    pub fn matches(&self, order: &Order) -> bool {
        if self.status.is_some_and(|s| s != order.status) { return false; }
        if self.source.is_some_and(|s| s != order.source) { return false; }
        match self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            None => true,
            Some(needle) => {
                let needle = needle.to_lowercase();
                order.order_number.to_lowercase().contains(&needle)
                    || order.contact.name.as_deref().is_some_and(|n| n.to_lowercase().contains(&needle))
            }
        }
    }
}

#[async_trait]
pub trait Store: Send + Sync + 'static {
    async fn list_products(&self) -> Result<Vec<Product>, StoreError>;
    async fn product(&self, id: Uuid) -> Result<Option<Product>, StoreError>;
    async fn insert_product(&self, product: &Product) -> Result<(), StoreError>;

    async fn list_customers(&self) -> Result<Vec<Customer>, StoreError>;
    async fn customer(&self, id: Uuid) -> Result<Option<Customer>, StoreError>;
    async fn insert_customer(&self, customer: &Customer) -> Result<(), StoreError>;

    async fn order_by_idempotency_key(&self, key: Uuid) -> Result<Option<Order>, StoreError>;
    async fn insert_order(&self, order: &Order) -> Result<(), StoreError>;
    async fn insert_order_lines(&self, lines: &[OrderLine]) -> Result<(), StoreError>;

    /// Removes `quantity` units in one step and reports the stock on either
    /// side of the change. Fails rather than going below zero.
    async fn decrement_stock(&self, product_id: Uuid, quantity: u32) -> Result<StockChange, StoreError>;
    async fn insert_inventory_transaction(&self, tx: &InventoryTransaction) -> Result<(), StoreError>;
    async fn inventory_transactions(&self, product_id: Uuid) -> Result<Vec<InventoryTransaction>, StoreError>;

    /// Newest first.
    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError>;
    async fn order(&self, id: Uuid) -> Result<Option<Order>, StoreError>;
    async fn order_lines(&self, order_id: Uuid) -> Result<Vec<OrderLine>, StoreError>;
    async fn update_order_status(&self, id: Uuid, status: OrderStatus, payment_status: Option<PaymentStatus>) -> Result<Option<Order>, StoreError>;
    async fn delete_order(&self, id: Uuid) -> Result<bool, StoreError>;
}

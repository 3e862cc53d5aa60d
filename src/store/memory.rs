//! In-process store used when no database is configured, and by tests.

use std::collections::HashMap;
use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;
use crate::domain::aggregates::{Customer, InventoryTransaction, Order, OrderLine, OrderStatus, PaymentStatus, Product, ProductError, StockChange};
use super::{OrderFilter, Store, StoreError};

#[derive(Default)]
struct Tables {
    products: HashMap<Uuid, Product>,
    customers: HashMap<Uuid, Customer>,
    orders: Vec<Order>,
    order_lines: Vec<OrderLine>,
    inventory: Vec<InventoryTransaction>,
}

#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self { Self::default() }

    pub async fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        let store = Self::new();
        {
            let mut t = store.tables.write().await;
            t.products.extend(products.into_iter().map(|p| (p.id, p)));
        }
        store
    }

    pub async fn order_count(&self) -> usize { self.tables.read().await.orders.len() }
    pub async fn order_line_count(&self) -> usize { self.tables.read().await.order_lines.len() }
    pub async fn ledger_len(&self) -> usize { self.tables.read().await.inventory.len() }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        let mut products: Vec<Product> = self.tables.read().await.products.values().cloned().collect();
        products.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(products)
    }

    async fn product(&self, id: Uuid) -> Result<Option<Product>, StoreError> {
        Ok(self.tables.read().await.products.get(&id).cloned())
    }

    async fn insert_product(&self, product: &Product) -> Result<(), StoreError> {
        let mut t = self.tables.write().await;
        if t.products.values().any(|p| p.sku == product.sku) {
            return Err(StoreError::Conflict(format!("sku {} already exists", product.sku)));
        }
        t.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn list_customers(&self) -> Result<Vec<Customer>, StoreError> {
        let mut customers: Vec<Customer> = self.tables.read().await.customers.values().cloned().collect();
        customers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(customers)
    }

    async fn customer(&self, id: Uuid) -> Result<Option<Customer>, StoreError> {
        Ok(self.tables.read().await.customers.get(&id).cloned())
    }

    async fn insert_customer(&self, customer: &Customer) -> Result<(), StoreError> {
        self.tables.write().await.customers.insert(customer.id, customer.clone());
        Ok(())
    }

    async fn order_by_idempotency_key(&self, key: Uuid) -> Result<Option<Order>, StoreError> {
        let t = self.tables.read().await;
        Ok(t.orders.iter().find(|o| o.idempotency_key == Some(key)).cloned())
    }

    async fn insert_order(&self, order: &Order) -> Result<(), StoreError> {
        let mut t = self.tables.write().await;
        if t.orders.iter().any(|o| o.order_number == order.order_number) {
            return Err(StoreError::Conflict(format!("order number {} already exists", order.order_number)));
        }
        if let Some(key) = order.idempotency_key {
            if t.orders.iter().any(|o| o.idempotency_key == Some(key)) {
                return Err(StoreError::Conflict(format!("idempotency key {key} already used")));
            }
        }
        t.orders.push(order.clone());
        Ok(())
    }

    async fn insert_order_lines(&self, lines: &[OrderLine]) -> Result<(), StoreError> {
        self.tables.write().await.order_lines.extend_from_slice(lines);
        Ok(())
    }

    async fn decrement_stock(&self, product_id: Uuid, quantity: u32) -> Result<StockChange, StoreError> {
        let mut t = self.tables.write().await;
        let product = t.products.get_mut(&product_id).ok_or(StoreError::NotFound { entity: "product", id: product_id })?;
        product.remove_stock(quantity).map_err(|e| match e {
            ProductError::InsufficientStock { available } => StoreError::InsufficientStock { product_id, available },
        })
    }

    async fn insert_inventory_transaction(&self, tx: &InventoryTransaction) -> Result<(), StoreError> {
        self.tables.write().await.inventory.push(tx.clone());
        Ok(())
    }

    async fn inventory_transactions(&self, product_id: Uuid) -> Result<Vec<InventoryTransaction>, StoreError> {
        let t = self.tables.read().await;
        Ok(t.inventory.iter().filter(|tx| tx.product_id == product_id).cloned().collect())
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError> {
        let t = self.tables.read().await;
        let mut orders: Vec<Order> = t.orders.iter().filter(|o| filter.matches(o)).cloned().collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn order(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        Ok(self.tables.read().await.orders.iter().find(|o| o.id == id).cloned())
    }

    async fn order_lines(&self, order_id: Uuid) -> Result<Vec<OrderLine>, StoreError> {
        let t = self.tables.read().await;
        Ok(t.order_lines.iter().filter(|l| l.order_id == order_id).cloned().collect())
    }

    async fn update_order_status(&self, id: Uuid, status: OrderStatus, payment_status: Option<PaymentStatus>) -> Result<Option<Order>, StoreError> {
        let mut t = self.tables.write().await;
        let Some(order) = t.orders.iter_mut().find(|o| o.id == id) else { return Ok(None) };
        order.set_status(status);
        if let Some(ps) = payment_status { order.set_payment_status(ps); }
        order.take_events();
        Ok(Some(order.clone()))
    }

    async fn delete_order(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut t = self.tables.write().await;
        let before = t.orders.len();
        t.orders.retain(|o| o.id != id);
        if t.orders.len() == before { return Ok(false); }
        t.order_lines.retain(|l| l.order_id != id);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::PaymentMethod;
    use crate::domain::totals::{DiscountKind, Totals};
    use crate::domain::value_objects::Sku;
    use rust_decimal::Decimal;

    fn product(stock: i32) -> Product {
        Product::create(Sku::new("M-1").unwrap(), "Charger", Decimal::new(499, 0)).with_stock(stock)
    }

    #[tokio::test]
    async fn test_decrement_stock_refuses_negative() {
        let p = product(3);
        let id = p.id;
        let store = InMemoryStore::with_products([p]).await;
        let change = store.decrement_stock(id, 2).await.unwrap();
        assert_eq!((change.before, change.after), (3, 1));
        let err = store.decrement_stock(id, 2).await.unwrap_err();
        assert!(matches!(err, StoreError::InsufficientStock { available: 1, .. }));
        assert_eq!(store.product(id).await.unwrap().unwrap().stock_quantity, 1);
        assert!(matches!(store.decrement_stock(Uuid::new_v4(), 1).await, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_duplicate_sku_conflicts() {
        let store = InMemoryStore::new();
        store.insert_product(&product(1)).await.unwrap();
        assert!(matches!(store.insert_product(&product(1)).await, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_delete_order_cascades_lines() {
        let store = InMemoryStore::new();
        let mut order = Order::place_pos(&Totals::default(), DiscountKind::Amount, Decimal::ZERO, PaymentMethod::Cash);
        order.idempotency_key = Some(Uuid::new_v4());
        store.insert_order(&order).await.unwrap();
        assert!(matches!(store.insert_order(&order).await, Err(StoreError::Conflict(_))));

        let mut cart = crate::domain::aggregates::Cart::new();
        cart.add(product(2), crate::domain::value_objects::TaxRate::zero()).unwrap();
        let lines: Vec<OrderLine> = cart.lines().iter().map(|l| OrderLine::snapshot(order.id, l)).collect();
        store.insert_order_lines(&lines).await.unwrap();
        assert_eq!(store.order_lines(order.id).await.unwrap().len(), 1);

        assert!(store.delete_order(order.id).await.unwrap());
        assert_eq!(store.order_line_count().await, 0);
        assert!(!store.delete_order(order.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_order_number_conflicts() {
        let store = InMemoryStore::new();
        let first = Order::place_pos(&Totals::default(), DiscountKind::Amount, Decimal::ZERO, PaymentMethod::Cash);
        store.insert_order(&first).await.unwrap();
        let mut second = Order::place_pos(&Totals::default(), DiscountKind::Amount, Decimal::ZERO, PaymentMethod::Card);
        second.order_number.clone_from(&first.order_number);
        assert!(matches!(store.insert_order(&second).await, Err(StoreError::Conflict(_))));
        assert_eq!(store.order_count().await, 1);
    }

    #[tokio::test]
    async fn test_update_status() {
        let store = InMemoryStore::new();
        let order = Order::place_pos(&Totals::default(), DiscountKind::Amount, Decimal::ZERO, PaymentMethod::Cash);
        store.insert_order(&order).await.unwrap();
        let updated = store.update_order_status(order.id, OrderStatus::Refunded, Some(PaymentStatus::Refunded)).await.unwrap().unwrap();
        assert_eq!(updated.status, OrderStatus::Refunded);
        assert_eq!(updated.payment_status, PaymentStatus::Refunded);
        assert!(store.update_order_status(Uuid::new_v4(), OrderStatus::Cancelled, None).await.unwrap().is_none());
    }
}

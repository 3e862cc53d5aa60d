//! PostgreSQL store backed by `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use uuid::Uuid;
use crate::domain::aggregates::{Contact, Customer, CustomerType, InventoryTransaction, Order, OrderLine, OrderSource, OrderStatus, PaymentMethod, PaymentStatus, Product, StockChange};
use crate::domain::totals::{DiscountKind, Totals};
use crate::domain::value_objects::{Sku, TaxRate};
use super::{OrderFilter, Store, StoreError};

#[derive(Clone)]
pub struct PgStore { pool: PgPool }

impl PgStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new().max_connections(10).connect(database_url).await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await.map_err(|e| StoreError::Database(e.into()))
    }
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid, sku: String, name: String, price: Decimal, stock_quantity: i32,
    tax_rate: Option<Decimal>, unit: String, created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = StoreError;
    fn try_from(r: ProductRow) -> Result<Self, Self::Error> {
        let sku = Sku::new(r.sku).map_err(|e| StoreError::CorruptRow(format!("product {}: {e}", r.id)))?;
        let tax_rate = r.tax_rate.map(TaxRate::new).transpose().map_err(|e| StoreError::CorruptRow(format!("product {}: {e}", r.id)))?;
        Ok(Product {
            id: r.id, sku, name: r.name, price: r.price, stock_quantity: r.stock_quantity,
            tax_rate, unit: r.unit, created_at: r.created_at, updated_at: r.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CustomerRow {
    id: Uuid, name: String, email: Option<String>, phone: Option<String>, customer_type: String,
    credit_limit: Decimal, outstanding_balance: Decimal, created_at: DateTime<Utc>,
}

impl TryFrom<CustomerRow> for Customer {
    type Error = StoreError;
    fn try_from(r: CustomerRow) -> Result<Self, Self::Error> {
        let customer_type = CustomerType::parse(&r.customer_type).ok_or_else(|| corrupt("customer", r.id, &r.customer_type))?;
        Ok(Customer {
            id: r.id, name: r.name, email: r.email, phone: r.phone, customer_type,
            credit_limit: r.credit_limit, outstanding_balance: r.outstanding_balance, created_at: r.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid, order_number: String, customer_id: Option<Uuid>, contact_name: Option<String>,
    contact_email: Option<String>, contact_phone: Option<String>, subtotal: Decimal, tax: Decimal,
    discount_kind: String, discount_value: Decimal, discount: Decimal, total: Decimal,
    payment_method: String, payment_status: String, status: String, source: String,
    idempotency_key: Option<Uuid>, notes: Option<String>, created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;
    fn try_from(r: OrderRow) -> Result<Self, Self::Error> {
        let discount_kind = DiscountKind::parse(&r.discount_kind).ok_or_else(|| corrupt("order", r.id, &r.discount_kind))?;
        let payment_method = PaymentMethod::parse(&r.payment_method).ok_or_else(|| corrupt("order", r.id, &r.payment_method))?;
        let payment_status = PaymentStatus::parse(&r.payment_status).ok_or_else(|| corrupt("order", r.id, &r.payment_status))?;
        let status = OrderStatus::parse(&r.status).ok_or_else(|| corrupt("order", r.id, &r.status))?;
        let source = OrderSource::parse(&r.source).ok_or_else(|| corrupt("order", r.id, &r.source))?;
        let contact = Contact { name: r.contact_name, email: r.contact_email, phone: r.contact_phone };
        let totals = Totals { subtotal: r.subtotal, total_tax: r.tax, discount: r.discount, total: r.total };
        Ok(Order::restore(
            r.id, r.order_number, r.customer_id, contact, totals, discount_kind, r.discount_value,
            payment_method, payment_status, status, source, r.idempotency_key, r.notes, r.created_at, r.updated_at,
        ))
    }
}

#[derive(sqlx::FromRow)]
struct OrderLineRow {
    id: Uuid, order_id: Uuid, product_id: Uuid, product_name: String, sku: String, unit: String,
    quantity: i32, unit_price: Decimal, tax_amount: Decimal, line_total: Decimal,
}

impl TryFrom<OrderLineRow> for OrderLine {
    type Error = StoreError;
    fn try_from(r: OrderLineRow) -> Result<Self, Self::Error> {
        let quantity = u32::try_from(r.quantity).map_err(|_| corrupt("order line", r.id, &r.quantity.to_string()))?;
        Ok(OrderLine {
            id: r.id, order_id: r.order_id, product_id: r.product_id, product_name: r.product_name,
            sku: r.sku, unit: r.unit, quantity, unit_price: r.unit_price, tax_amount: r.tax_amount, line_total: r.line_total,
        })
    }
}

#[derive(sqlx::FromRow)]
struct InventoryRow {
    id: Uuid, product_id: Uuid, quantity_change: i32, stock_before: i32, stock_after: i32,
    order_id: Option<Uuid>, transaction_type: String, created_at: DateTime<Utc>,
}

impl From<InventoryRow> for InventoryTransaction {
    fn from(r: InventoryRow) -> Self {
        Self {
            id: r.id, product_id: r.product_id, quantity_change: r.quantity_change, stock_before: r.stock_before,
            stock_after: r.stock_after, order_id: r.order_id, transaction_type: r.transaction_type, created_at: r.created_at,
        }
    }
}

fn corrupt(entity: &str, id: Uuid, value: &str) -> StoreError {
    StoreError::CorruptRow(format!("{entity} {id}: unexpected value {value:?}"))
}

fn collect<R, T: TryFrom<R, Error = StoreError>>(rows: Vec<R>) -> Result<Vec<T>, StoreError> {
    rows.into_iter().map(T::try_from).collect()
}

/// Maps unique-constraint violations to `Conflict`.
fn conflict_or(e: sqlx::Error, what: &str) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Conflict(format!("{what} already exists ({})", db.constraint().unwrap_or("unique")))
        }
        _ => StoreError::Database(e),
    }
}

const ORDER_COLUMNS: &str = "id, order_number, customer_id, contact_name, contact_email, contact_phone, subtotal, tax, discount_kind, discount_value, discount, total, payment_method, payment_status, status, source, idempotency_key, notes, created_at, updated_at";

#[async_trait]
impl Store for PgStore {
    async fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        let rows = sqlx::query_as::<_, ProductRow>("SELECT * FROM products ORDER BY name").fetch_all(&self.pool).await?;
        collect(rows)
    }

    async fn product(&self, id: Uuid) -> Result<Option<Product>, StoreError> {
        sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE id = $1").bind(id)
            .fetch_optional(&self.pool).await?.map(Product::try_from).transpose()
    }

    async fn insert_product(&self, p: &Product) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO products (id, sku, name, price, stock_quantity, tax_rate, unit, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)")
            .bind(p.id).bind(p.sku.as_str()).bind(&p.name).bind(p.price).bind(p.stock_quantity)
            .bind(p.tax_rate.map(|r| r.percent())).bind(&p.unit).bind(p.created_at).bind(p.updated_at)
            .execute(&self.pool).await.map_err(|e| conflict_or(e, "sku"))?;
        Ok(())
    }

    async fn list_customers(&self) -> Result<Vec<Customer>, StoreError> {
        let rows = sqlx::query_as::<_, CustomerRow>("SELECT * FROM customers ORDER BY name").fetch_all(&self.pool).await?;
        collect(rows)
    }

    async fn customer(&self, id: Uuid) -> Result<Option<Customer>, StoreError> {
        sqlx::query_as::<_, CustomerRow>("SELECT * FROM customers WHERE id = $1").bind(id)
            .fetch_optional(&self.pool).await?.map(Customer::try_from).transpose()
    }

    async fn insert_customer(&self, c: &Customer) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO customers (id, name, email, phone, customer_type, credit_limit, outstanding_balance, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)")
            .bind(c.id).bind(&c.name).bind(&c.email).bind(&c.phone).bind(c.customer_type.as_str())
            .bind(c.credit_limit).bind(c.outstanding_balance).bind(c.created_at)
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn order_by_idempotency_key(&self, key: Uuid) -> Result<Option<Order>, StoreError> {
        sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE idempotency_key = $1")).bind(key)
            .fetch_optional(&self.pool).await?.map(Order::try_from).transpose()
    }

    async fn insert_order(&self, o: &Order) -> Result<(), StoreError> {
        sqlx::query(&format!("INSERT INTO orders ({ORDER_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)"))
            .bind(o.id).bind(&o.order_number).bind(o.customer_id).bind(&o.contact.name).bind(&o.contact.email)
            .bind(&o.contact.phone).bind(o.subtotal).bind(o.tax).bind(o.discount_kind.as_str()).bind(o.discount_value)
            .bind(o.discount).bind(o.total).bind(o.payment_method.as_str()).bind(o.payment_status.as_str())
            .bind(o.status.as_str()).bind(o.source.as_str()).bind(o.idempotency_key).bind(&o.notes)
            .bind(o.created_at).bind(o.updated_at)
            .execute(&self.pool).await.map_err(|e| conflict_or(e, "order"))?;
        Ok(())
    }

    async fn insert_order_lines(&self, lines: &[OrderLine]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for l in lines {
            let quantity = i32::try_from(l.quantity).map_err(|_| StoreError::CorruptRow(format!("order line {}: quantity overflow", l.id)))?;
            sqlx::query("INSERT INTO order_items (id, order_id, product_id, product_name, sku, unit, quantity, unit_price, tax_amount, line_total) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)")
                .bind(l.id).bind(l.order_id).bind(l.product_id).bind(&l.product_name).bind(&l.sku).bind(&l.unit)
                .bind(quantity).bind(l.unit_price).bind(l.tax_amount).bind(l.line_total)
                .execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn decrement_stock(&self, product_id: Uuid, quantity: u32) -> Result<StockChange, StoreError> {
        let qty = i32::try_from(quantity).map_err(|_| StoreError::InsufficientStock { product_id, available: i32::MAX })?;
        let updated: Option<(i32,)> = sqlx::query_as("UPDATE products SET stock_quantity = stock_quantity - $2, updated_at = NOW() WHERE id = $1 AND stock_quantity >= $2 RETURNING stock_quantity")
            .bind(product_id).bind(qty).fetch_optional(&self.pool).await?;
        if let Some((after,)) = updated {
            return Ok(StockChange { product_id, before: after + qty, after });
        }
        let current: Option<(i32,)> = sqlx::query_as("SELECT stock_quantity FROM products WHERE id = $1")
            .bind(product_id).fetch_optional(&self.pool).await?;
        match current {
            Some((available,)) => Err(StoreError::InsufficientStock { product_id, available }),
            None => Err(StoreError::NotFound { entity: "product", id: product_id }),
        }
    }

    async fn insert_inventory_transaction(&self, t: &InventoryTransaction) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO inventory_transactions (id, product_id, quantity_change, stock_before, stock_after, order_id, transaction_type, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)")
            .bind(t.id).bind(t.product_id).bind(t.quantity_change).bind(t.stock_before).bind(t.stock_after)
            .bind(t.order_id).bind(&t.transaction_type).bind(t.created_at)
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn inventory_transactions(&self, product_id: Uuid) -> Result<Vec<InventoryTransaction>, StoreError> {
        let rows = sqlx::query_as::<_, InventoryRow>("SELECT * FROM inventory_transactions WHERE product_id = $1 ORDER BY created_at")
            .bind(product_id).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(InventoryTransaction::from).collect())
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError> {
        let search = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()).map(|s| format!("%{s}%"));
        let rows = sqlx::query_as::<_, OrderRow>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE ($1::text IS NULL OR status = $1) AND ($2::text IS NULL OR source = $2) \
             AND ($3::text IS NULL OR order_number ILIKE $3 OR contact_name ILIKE $3) ORDER BY created_at DESC"))
            .bind(filter.status.map(|s| s.as_str())).bind(filter.source.map(|s| s.as_str())).bind(search)
            .fetch_all(&self.pool).await?;
        collect(rows)
    }

    async fn order(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        sqlx::query_as::<_, OrderRow>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1")).bind(id)
            .fetch_optional(&self.pool).await?.map(Order::try_from).transpose()
    }

    async fn order_lines(&self, order_id: Uuid) -> Result<Vec<OrderLine>, StoreError> {
        let rows = sqlx::query_as::<_, OrderLineRow>("SELECT * FROM order_items WHERE order_id = $1 ORDER BY id")
            .bind(order_id).fetch_all(&self.pool).await?;
        collect(rows)
    }

    async fn update_order_status(&self, id: Uuid, status: OrderStatus, payment_status: Option<PaymentStatus>) -> Result<Option<Order>, StoreError> {
        sqlx::query_as::<_, OrderRow>(&format!(
            "UPDATE orders SET status = $2, payment_status = COALESCE($3, payment_status), updated_at = NOW() WHERE id = $1 RETURNING {ORDER_COLUMNS}"))
            .bind(id).bind(status.as_str()).bind(payment_status.map(|s| s.as_str()))
            .fetch_optional(&self.pool).await?.map(Order::try_from).transpose()
    }

    async fn delete_order(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM orders WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }
}

//! OpenSASE POS - Self-hosted Point of Sale

use anyhow::Result;
use axum::{extract::{Path, Query, State}, http::StatusCode, response::{Html, IntoResponse}, routing::{get, put}, Json, Router};
use opensase_pos::domain::aggregates::{Contact, Customer, CustomerType, Order, OrderLine, OrderStatus, PaymentMethod, PaymentStatus, Product};
use opensase_pos::domain::value_objects::{Sku, TaxRate};
use opensase_pos::reports::{self, OrderExportRow, SalesSummary};
use opensase_pos::{receipt, CheckoutOutcome, DiscountKind, InMemoryStore, NotifyOptions, OrderFilter, OrderSubmitter, PgStore, PosConfig, PosError, SaleSession, Store, StoreError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;
use validator::Validate;

#[derive(Clone)] pub struct AppState { pub store: Arc<dyn Store>, pub submitter: Arc<OrderSubmitter> }

type ApiError = (StatusCode, String);

fn fail(e: impl Into<PosError>) -> ApiError {
    let e = e.into();
    let status = match &e {
        PosError::ProductNotFound | PosError::OrderNotFound | PosError::CustomerNotFound | PosError::Store(StoreError::NotFound { .. }) => StatusCode::NOT_FOUND,
        PosError::Store(StoreError::Conflict(_) | StoreError::InsufficientStock { .. }) => StatusCode::CONFLICT,
        PosError::Cart(_) | PosError::Discount(_) | PosError::Invalid(_) | PosError::Checkout(opensase_pos::CheckoutError::Validation(_)) => StatusCode::UNPROCESSABLE_ENTITY,
        PosError::Store(_) | PosError::Checkout(_) => {
            tracing::error!(error = %e, "request failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, e.to_string())
}

fn invalid(e: impl std::fmt::Display) -> ApiError { fail(PosError::Invalid(e.to_string())) }

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();
    let config = PosConfig::from_env()?;

    let store: Arc<dyn Store> = match config.database_url.as_deref() {
        Some(url) => {
            let pg = PgStore::connect(url).await?;
            pg.migrate().await?;
            Arc::new(pg)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, orders will be kept in memory only");
            Arc::new(InMemoryStore::new())
        }
    };
    let submitter = Arc::new(OrderSubmitter::new(store.clone(), Arc::new(opensase_pos::notify::LinkLogger), config.checkout_settings()));
    let state = AppState { store, submitter };

    let app = Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "opensase-pos"})) }))
        .route("/api/v1/products", get(list_products).post(create_product))
        .route("/api/v1/products/:id", get(get_product))
        .route("/api/v1/customers", get(list_customers).post(create_customer))
        .route("/api/v1/checkout", axum::routing::post(checkout))
        .route("/api/v1/orders", get(list_orders))
        .route("/api/v1/orders/:id", get(get_order).delete(delete_order))
        .route("/api/v1/orders/:id/status", put(update_order_status))
        .route("/api/v1/orders/:id/receipt", get(order_receipt))
        .route("/api/v1/reports/sales", get(sales_report))
        .route("/api/v1/reports/export", get(export_report))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()))
        .with_state(state);

    tracing::info!("🚀 OpenSASE POS listening on 0.0.0.0:{}", config.port);
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?, app).await?;
    Ok(())
}

async fn list_products(State(s): State<AppState>) -> Result<Json<Vec<Product>>, ApiError> {
    s.store.list_products().await.map(Json).map_err(fail)
}

async fn get_product(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Product>, ApiError> {
    s.store.product(id).await.map_err(fail)?.map(Json).ok_or_else(|| fail(PosError::ProductNotFound))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 50))] pub sku: String,
    #[validate(length(min = 1, max = 200))] pub name: String,
    pub price: Decimal,
    #[validate(range(min = 0))] pub stock_quantity: Option<i32>,
    pub tax_rate: Option<Decimal>,
    pub unit: Option<String>,
}

async fn create_product(State(s): State<AppState>, Json(r): Json<CreateProductRequest>) -> Result<(StatusCode, Json<Product>), ApiError> {
    r.validate().map_err(invalid)?;
    if r.price < Decimal::ZERO { return Err(invalid("price cannot be negative")); }
    let mut p = Product::create(Sku::new(&r.sku).map_err(invalid)?, &r.name, r.price).with_stock(r.stock_quantity.unwrap_or(0));
    if let Some(rate) = r.tax_rate { p = p.with_tax_rate(TaxRate::new(rate).map_err(invalid)?); }
    if let Some(unit) = r.unit.filter(|u| !u.trim().is_empty()) { p = p.with_unit(unit); }
    s.store.insert_product(&p).await.map_err(fail)?;
    tracing::info!(product_id = %p.id, sku = %p.sku, "product created");
    Ok((StatusCode::CREATED, Json(p)))
}

async fn list_customers(State(s): State<AppState>) -> Result<Json<Vec<Customer>>, ApiError> {
    s.store.list_customers().await.map(Json).map_err(fail)
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCustomerRequest {
    #[validate(length(min = 1, max = 200))] pub name: String,
    #[validate(email)] pub email: Option<String>,
    #[validate(length(min = 6, max = 20))] pub phone: Option<String>,
    pub customer_type: Option<CustomerType>,
    pub credit_limit: Option<Decimal>,
}

async fn create_customer(State(s): State<AppState>, Json(r): Json<CreateCustomerRequest>) -> Result<(StatusCode, Json<Customer>), ApiError> {
    r.validate().map_err(invalid)?;
    let mut c = Customer::create(r.name);
    c.email = r.email;
    c.phone = r.phone;
    c.customer_type = r.customer_type.unwrap_or_default();
    c.credit_limit = r.credit_limit.unwrap_or(Decimal::ZERO).max(Decimal::ZERO);
    s.store.insert_customer(&c).await.map_err(fail)?;
    Ok((StatusCode::CREATED, Json(c)))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CheckoutRequest {
    #[validate] #[serde(default)] pub items: Vec<CheckoutItem>,
    #[serde(default)] pub discount_kind: DiscountKind,
    #[serde(default)] pub discount_value: Decimal,
    pub customer_id: Option<Uuid>,
    #[validate(length(max = 200))] pub walk_in_name: Option<String>,
    #[validate(length(max = 20))] pub walk_in_phone: Option<String>,
    #[serde(default)] pub notify: NotifyOptions,
    #[serde(default)] pub payment_method: PaymentMethod,
    pub notes: Option<String>,
    pub idempotency_key: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CheckoutItem { pub product_id: Uuid, #[validate(range(min = 1))] pub quantity: u32 }

async fn checkout(State(s): State<AppState>, Json(r): Json<CheckoutRequest>) -> Result<(StatusCode, Json<CheckoutOutcome>), ApiError> {
    r.validate().map_err(invalid)?;
    let mut session = SaleSession::new();
    if let Some(key) = r.idempotency_key { session = session.with_idempotency_key(key); }
    let global_rate = s.submitter.settings().global_tax_rate;
    for item in &r.items {
        let product = s.store.product(item.product_id).await.map_err(fail)?.ok_or_else(|| fail(PosError::ProductNotFound))?;
        session.cart.add_units(product, item.quantity, global_rate).map_err(fail)?;
    }
    session.discount.set_kind(r.discount_kind);
    session.discount.set_value(r.discount_value).map_err(fail)?;
    if let Some(id) = r.customer_id {
        session.customer = Some(s.store.customer(id).await.map_err(fail)?.ok_or_else(|| fail(PosError::CustomerNotFound))?);
    }
    session.walk_in = Contact { name: r.walk_in_name, email: None, phone: r.walk_in_phone };
    session.notify = r.notify;
    session.payment_method = r.payment_method;
    session.notes = r.notes;

    let outcome = s.submitter.submit(&mut session).await.map_err(fail)?;
    let status = if outcome.replayed { StatusCode::OK } else { StatusCode::CREATED };
    if outcome.is_partial() {
        tracing::warn!(order_id = %outcome.order.id, failures = outcome.failures().count(), "order placed with partial failures");
    }
    Ok((status, Json(outcome)))
}

async fn list_orders(State(s): State<AppState>, Query(f): Query<OrderFilter>) -> Result<Json<Vec<Order>>, ApiError> {
    s.store.list_orders(&f).await.map(Json).map_err(fail)
}

#[derive(Debug, Serialize)] pub struct OrderDetail { pub order: Order, pub lines: Vec<OrderLine> }

async fn load_order(s: &AppState, id: Uuid) -> Result<OrderDetail, ApiError> {
    let order = s.store.order(id).await.map_err(fail)?.ok_or_else(|| fail(PosError::OrderNotFound))?;
    let lines = s.store.order_lines(id).await.map_err(fail)?;
    Ok(OrderDetail { order, lines })
}

async fn get_order(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<OrderDetail>, ApiError> {
    load_order(&s, id).await.map(Json)
}

async fn delete_order(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<StatusCode, ApiError> {
    if !s.store.delete_order(id).await.map_err(fail)? { return Err(fail(PosError::OrderNotFound)); }
    tracing::info!(order_id = %id, "order deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)] pub struct UpdateStatusRequest { pub status: OrderStatus, pub payment_status: Option<PaymentStatus> }

async fn update_order_status(State(s): State<AppState>, Path(id): Path<Uuid>, Json(r): Json<UpdateStatusRequest>) -> Result<Json<Order>, ApiError> {
    let order = s.store.update_order_status(id, r.status, r.payment_status).await.map_err(fail)?.ok_or_else(|| fail(PosError::OrderNotFound))?;
    tracing::info!(order_id = %id, status = %order.status, "order status updated");
    Ok(Json(order))
}

async fn order_receipt(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<impl IntoResponse, ApiError> {
    let detail = load_order(&s, id).await?;
    Ok(Html(receipt::render_html(&detail.order, &detail.lines, &s.submitter.settings().receipt)))
}

async fn sales_report(State(s): State<AppState>, Query(f): Query<OrderFilter>) -> Result<Json<SalesSummary>, ApiError> {
    let orders = s.store.list_orders(&f).await.map_err(fail)?;
    Ok(Json(SalesSummary::from_orders(&orders)))
}

async fn export_report(State(s): State<AppState>, Query(f): Query<OrderFilter>) -> Result<Json<Vec<OrderExportRow>>, ApiError> {
    let orders = s.store.list_orders(&f).await.map_err(fail)?;
    Ok(Json(reports::export_rows(&orders)))
}

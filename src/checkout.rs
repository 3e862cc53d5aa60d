//! Till checkout: turns a sale session into a persisted order.
//!
//! The writes are independent calls made in order: the order row, its
//! lines, then one stock decrement and ledger entry per line. Only the first
//! two are fatal. Stock and ledger failures are recorded on the outcome and
//! processing moves on to the next line, so callers must check
//! [`CheckoutOutcome::is_partial`].

use std::sync::Arc;
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;
use crate::domain::aggregates::customer::non_blank;
use crate::domain::aggregates::{Cart, Contact, Customer, InventoryTransaction, Order, OrderLine, PaymentMethod};
use crate::domain::events::{DomainEvent, InventoryEvent, NotificationEvent, OrderEvent};
use crate::domain::totals::{DiscountInput, Totals};
use crate::domain::value_objects::TaxRate;
use crate::notify::{self, Dispatcher, OutboundMessage};
use crate::receipt::{self, ReceiptSettings};
use crate::store::{Store, StoreError};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, serde::Deserialize)]
pub struct NotifyOptions {
    #[serde(default)]
    pub email: bool,
    #[serde(default)]
    pub sms: bool,
    #[serde(default)]
    pub whatsapp: bool,
}

/// Everything the product-sale tab holds between checkouts.
#[derive(Clone, Debug)]
pub struct SaleSession {
    pub cart: Cart,
    pub discount: DiscountInput,
    pub customer: Option<Customer>,
    pub walk_in: Contact,
    pub notify: NotifyOptions,
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
    idempotency_key: Uuid,
}

impl Default for SaleSession {
    fn default() -> Self { Self::new() }
}

impl SaleSession {
    pub fn new() -> Self {
        Self {
            cart: Cart::new(), discount: DiscountInput::default(), customer: None, walk_in: Contact::default(),
            notify: NotifyOptions::default(), payment_method: PaymentMethod::Cash, notes: None,
            idempotency_key: Uuid::new_v4(),
        }
    }

    /// Reuses a key issued by the client so a resubmitted request dedupes.
    pub fn with_idempotency_key(mut self, key: Uuid) -> Self { self.idempotency_key = key; self }

    pub fn idempotency_key(&self) -> Uuid { self.idempotency_key }

    pub fn totals(&self) -> Totals { Totals::calculate(self.cart.lines(), &self.discount.discount()) }

    /// Phone for SMS/WhatsApp: the customer's, else whatever was typed for a walk-in.
    pub fn resolved_phone(&self) -> Option<&str> {
        self.customer.as_ref().and_then(Customer::contact_phone).or_else(|| non_blank(self.walk_in.phone.as_deref()))
    }

    pub fn resolved_email(&self) -> Option<&str> { self.customer.as_ref().and_then(Customer::contact_email) }

    fn contact(&self) -> Contact {
        let name = match &self.customer {
            Some(c) => Some(c.name.clone()),
            None => non_blank(self.walk_in.name.as_deref()).map(str::to_string),
        };
        Contact { name, email: self.resolved_email().map(str::to_string), phone: self.resolved_phone().map(str::to_string) }
    }

    pub fn reset(&mut self) { *self = Self::new(); }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("cart is empty")]
    EmptyCart,
    #[error("customer has no email address")]
    MissingEmail,
    #[error("no phone number to send the receipt to")]
    MissingPhone,
}

#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("could not save order: {0}")]
    OrderWrite(#[source] StoreError),
    #[error("could not save order lines: {0}")]
    LinesWrite(#[source] StoreError),
    #[error("idempotency lookup failed: {0}")]
    Lookup(#[source] StoreError),
}

#[derive(Clone, Debug, Serialize)]
pub struct CheckoutOutcome {
    pub order: Order,
    pub lines: Vec<OrderLine>,
    pub events: Vec<DomainEvent>,
    pub messages: Vec<OutboundMessage>,
    pub receipt_html: String,
    pub replayed: bool,
}

impl CheckoutOutcome {
    /// The order exists but some stock, ledger or notification step failed.
    pub fn is_partial(&self) -> bool { self.events.iter().any(DomainEvent::is_failure) }

    pub fn failures(&self) -> impl Iterator<Item = &DomainEvent> { self.events.iter().filter(|e| e.is_failure()) }
}

#[derive(Clone, Debug)]
pub struct CheckoutSettings {
    pub global_tax_rate: TaxRate,
    pub phone_country_code: String,
    pub receipt: ReceiptSettings,
}

const ORDER_NUMBER_ATTEMPTS: u32 = 3;

pub struct OrderSubmitter {
    store: Arc<dyn Store>,
    dispatcher: Arc<dyn Dispatcher>,
    settings: CheckoutSettings,
}

impl OrderSubmitter {
    pub fn new(store: Arc<dyn Store>, dispatcher: Arc<dyn Dispatcher>, settings: CheckoutSettings) -> Self {
        Self { store, dispatcher, settings }
    }

    pub fn settings(&self) -> &CheckoutSettings { &self.settings }

    /// Checks everything that must hold before the first write.
    pub fn validate(session: &SaleSession) -> Result<(), ValidationError> {
        if session.cart.is_empty() { return Err(ValidationError::EmptyCart); }
        if session.notify.email && session.resolved_email().is_none() { return Err(ValidationError::MissingEmail); }
        if (session.notify.sms || session.notify.whatsapp) && session.resolved_phone().is_none() {
            return Err(ValidationError::MissingPhone);
        }
        Ok(())
    }

    /// Places the order. On success the session is reset; on error it is
    /// left as it was so the cashier can retry.
    pub async fn submit(&self, session: &mut SaleSession) -> Result<CheckoutOutcome, CheckoutError> {
        Self::validate(session)?;
        let key = session.idempotency_key();

        if let Some(existing) = self.store.order_by_idempotency_key(key).await.map_err(CheckoutError::Lookup)? {
            return self.replay(session, existing).await;
        }

        let discount = session.discount.discount();
        let totals = session.totals();
        let mut order = Order::place_pos(&totals, discount.kind(), discount.value(), session.payment_method);
        order.customer_id = session.customer.as_ref().map(|c| c.id);
        order.contact = session.contact();
        order.idempotency_key = Some(key);
        order.notes = session.notes.clone();

        if let Some(existing) = self.insert_order(&mut order, key).await? {
            return self.replay(session, existing).await;
        }
        let mut events = order.take_events();

        let lines: Vec<OrderLine> = session.cart.lines().iter().map(|l| OrderLine::snapshot(order.id, l)).collect();
        if let Err(e) = self.store.insert_order_lines(&lines).await {
            error!(error = %e, order_id = %order.id, "order line insert failed");
            // Remove the header so a retry with the same key starts clean.
            if let Err(cleanup) = self.store.delete_order(order.id).await {
                error!(error = %cleanup, order_id = %order.id, "could not remove order without lines");
            }
            return Err(CheckoutError::LinesWrite(e));
        }

        for line in &lines {
            self.apply_stock(order.id, line, &mut events).await;
        }

        let messages = self.dispatch_notifications(session, &order, &lines, &mut events).await;
        let receipt_html = receipt::render_html(&order, &lines, &self.settings.receipt);

        info!(
            order_id = %order.id, order_number = %order.order_number, total = %order.total,
            lines = lines.len(), failures = events.iter().filter(|e| e.is_failure()).count(),
            "checkout complete"
        );
        session.reset();
        Ok(CheckoutOutcome { order, lines, events, messages, receipt_html, replayed: false })
    }

    async fn replay(&self, session: &mut SaleSession, existing: Order) -> Result<CheckoutOutcome, CheckoutError> {
        let key = session.idempotency_key();
        info!(order_id = %existing.id, idempotency_key = %key, "checkout replayed");
        let lines = self.store.order_lines(existing.id).await.map_err(CheckoutError::Lookup)?;
        let events = vec![DomainEvent::Order(OrderEvent::Replayed { order_id: existing.id, idempotency_key: key })];
        let receipt_html = receipt::render_html(&existing, &lines, &self.settings.receipt);
        session.reset();
        Ok(CheckoutOutcome { order: existing, lines, events, messages: vec![], receipt_html, replayed: true })
    }

    /// Writes the order header. A unique conflict is either a concurrent
    /// submit under the same key, returned as `Some(existing)`, or a taken
    /// order number, which is redrawn.
    async fn insert_order(&self, order: &mut Order, key: Uuid) -> Result<Option<Order>, CheckoutError> {
        let mut attempt = 1;
        loop {
            let err = match self.store.insert_order(order).await {
                Ok(()) => return Ok(None),
                Err(e) => e,
            };
            if matches!(err, StoreError::Conflict(_)) {
                if let Some(existing) = self.store.order_by_idempotency_key(key).await.map_err(CheckoutError::Lookup)? {
                    return Ok(Some(existing));
                }
                if attempt < ORDER_NUMBER_ATTEMPTS {
                    warn!(order_number = %order.order_number, attempt, "order number taken, drawing another");
                    order.renumber();
                    attempt += 1;
                    continue;
                }
            }
            error!(error = %err, order_number = %order.order_number, "order insert failed");
            return Err(CheckoutError::OrderWrite(err));
        }
    }

    async fn apply_stock(&self, order_id: Uuid, line: &OrderLine, events: &mut Vec<DomainEvent>) {
        let change = match self.store.decrement_stock(line.product_id, line.quantity).await {
            Ok(change) => change,
            Err(e) => {
                warn!(error = %e, product_id = %line.product_id, quantity = line.quantity, "stock decrement failed");
                events.push(DomainEvent::Inventory(InventoryEvent::StockDecrementFailed {
                    product_id: line.product_id, quantity: line.quantity, reason: e.to_string(),
                }));
                return;
            }
        };
        events.push(DomainEvent::Inventory(InventoryEvent::StockDecremented {
            product_id: change.product_id, before: change.before, after: change.after,
        }));
        let tx = InventoryTransaction::sale(order_id, &change);
        if let Err(e) = self.store.insert_inventory_transaction(&tx).await {
            warn!(error = %e, product_id = %line.product_id, "inventory ledger write failed");
            events.push(DomainEvent::Inventory(InventoryEvent::LedgerWriteFailed { product_id: line.product_id, reason: e.to_string() }));
        }
    }

    async fn dispatch_notifications(&self, session: &SaleSession, order: &Order, lines: &[OrderLine], events: &mut Vec<DomainEvent>) -> Vec<OutboundMessage> {
        let text = receipt::render_text(order, lines, &self.settings.receipt);
        let mut pending = Vec::new();
        if session.notify.email {
            if let Some(to) = session.resolved_email() {
                let subject = format!("Invoice {} from {}", order.order_number, self.settings.receipt.store_name);
                pending.push(notify::email_link(to, &subject, &text));
            }
        }
        if let Some(phone) = session.resolved_phone() {
            if session.notify.sms { pending.push(notify::sms_link(phone, &text)); }
            if session.notify.whatsapp { pending.push(notify::whatsapp_link(phone, &self.settings.phone_country_code, &text)); }
        }

        let mut sent = Vec::with_capacity(pending.len());
        for message in pending {
            let channel = message.channel.as_str().to_string();
            match self.dispatcher.dispatch(&message).await {
                Ok(()) => {
                    events.push(DomainEvent::Notification(NotificationEvent::Sent { channel, url: message.url.clone() }));
                    sent.push(message);
                }
                Err(e) => {
                    warn!(error = %e, channel = %channel, order_id = %order.id, "notification failed");
                    events.push(DomainEvent::Notification(NotificationEvent::Failed { channel, reason: e.to_string() }));
                }
            }
        }
        sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use crate::domain::aggregates::{OrderStatus, PaymentStatus, Product, StockChange};
    use crate::domain::totals::DiscountKind;
    use crate::domain::value_objects::Sku;
    use crate::notify::{Channel, DispatchError};
    use crate::store::{InMemoryStore, OrderFilter};

    /// Delegates to an in-memory store, failing the operations it is told to.
    #[derive(Default)]
    struct FlakyStore {
        inner: InMemoryStore,
        fail_order_insert: bool,
        fail_lines_insert: bool,
        fail_ledger: bool,
        fail_stock_for: HashSet<Uuid>,
        stock_attempts: Mutex<Vec<Uuid>>,
        /// Key lookups that report no order, as a racing submit would see.
        stale_key_lookups: Mutex<u32>,
        /// Order inserts rejected as a duplicate order number.
        taken_numbers: Mutex<u32>,
        attempted_numbers: Mutex<Vec<String>>,
    }

    fn boom() -> StoreError { StoreError::Database(sqlx::Error::PoolTimedOut) }

    fn take_one(counter: &Mutex<u32>) -> bool {
        let mut n = counter.lock().unwrap();
        if *n == 0 { return false; }
        *n -= 1;
        true
    }

    #[async_trait]
    impl Store for FlakyStore {
        async fn list_products(&self) -> Result<Vec<Product>, StoreError> { self.inner.list_products().await }
        async fn product(&self, id: Uuid) -> Result<Option<Product>, StoreError> { self.inner.product(id).await }
        async fn insert_product(&self, p: &Product) -> Result<(), StoreError> { self.inner.insert_product(p).await }
        async fn list_customers(&self) -> Result<Vec<Customer>, StoreError> { self.inner.list_customers().await }
        async fn customer(&self, id: Uuid) -> Result<Option<Customer>, StoreError> { self.inner.customer(id).await }
        async fn insert_customer(&self, c: &Customer) -> Result<(), StoreError> { self.inner.insert_customer(c).await }
        async fn order_by_idempotency_key(&self, key: Uuid) -> Result<Option<Order>, StoreError> {
            if take_one(&self.stale_key_lookups) { return Ok(None); }
            self.inner.order_by_idempotency_key(key).await
        }
        async fn insert_order(&self, o: &Order) -> Result<(), StoreError> {
            self.attempted_numbers.lock().unwrap().push(o.order_number.clone());
            if self.fail_order_insert { return Err(boom()); }
            if take_one(&self.taken_numbers) { return Err(StoreError::Conflict("order number already exists".into())); }
            self.inner.insert_order(o).await
        }
        async fn insert_order_lines(&self, lines: &[OrderLine]) -> Result<(), StoreError> {
            if self.fail_lines_insert { return Err(boom()); }
            self.inner.insert_order_lines(lines).await
        }
        async fn decrement_stock(&self, product_id: Uuid, quantity: u32) -> Result<StockChange, StoreError> {
            self.stock_attempts.lock().unwrap().push(product_id);
            if self.fail_stock_for.contains(&product_id) { return Err(boom()); }
            self.inner.decrement_stock(product_id, quantity).await
        }
        async fn insert_inventory_transaction(&self, tx: &InventoryTransaction) -> Result<(), StoreError> {
            if self.fail_ledger { return Err(boom()); }
            self.inner.insert_inventory_transaction(tx).await
        }
        async fn inventory_transactions(&self, product_id: Uuid) -> Result<Vec<InventoryTransaction>, StoreError> { self.inner.inventory_transactions(product_id).await }
        async fn list_orders(&self, f: &OrderFilter) -> Result<Vec<Order>, StoreError> { self.inner.list_orders(f).await }
        async fn order(&self, id: Uuid) -> Result<Option<Order>, StoreError> { self.inner.order(id).await }
        async fn order_lines(&self, order_id: Uuid) -> Result<Vec<OrderLine>, StoreError> { self.inner.order_lines(order_id).await }
        async fn update_order_status(&self, id: Uuid, s: OrderStatus, p: Option<PaymentStatus>) -> Result<Option<Order>, StoreError> { self.inner.update_order_status(id, s, p).await }
        async fn delete_order(&self, id: Uuid) -> Result<bool, StoreError> { self.inner.delete_order(id).await }
    }

    #[derive(Default)]
    struct RecordingDispatcher { sent: Mutex<Vec<OutboundMessage>>, fail: bool }

    #[async_trait]
    impl Dispatcher for RecordingDispatcher {
        async fn dispatch(&self, message: &OutboundMessage) -> Result<(), DispatchError> {
            if self.fail { return Err(DispatchError::Failed { channel: message.channel.as_str(), reason: "client unavailable".into() }); }
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    fn rate(p: i64) -> TaxRate { TaxRate::new(Decimal::new(p, 0)).unwrap() }

    fn settings() -> CheckoutSettings {
        CheckoutSettings { global_tax_rate: rate(18), phone_country_code: "91".into(), receipt: ReceiptSettings::default() }
    }

    fn product(sku: &str, price: i64, stock: i32) -> Product {
        Product::create(Sku::new(sku).unwrap(), sku, Decimal::new(price, 0)).with_stock(stock)
    }

    async fn seeded(store: FlakyStore, products: &[Product]) -> Arc<FlakyStore> {
        for p in products { store.inner.insert_product(p).await.unwrap(); }
        Arc::new(store)
    }

    fn session_with(products: &[(Product, u32)]) -> SaleSession {
        let mut s = SaleSession::new();
        for (p, qty) in products {
            s.cart.add(p.clone(), rate(18)).unwrap();
            s.cart.set_quantity(p.id, *qty).unwrap();
        }
        s
    }

    fn submitter(store: Arc<FlakyStore>, dispatcher: Arc<RecordingDispatcher>) -> OrderSubmitter {
        OrderSubmitter::new(store, dispatcher, settings())
    }

    #[tokio::test]
    async fn test_happy_path_writes_everything_and_resets() {
        let a = product("A", 100, 5);
        let store = seeded(FlakyStore::default(), &[a.clone()]).await;
        let sub = submitter(store.clone(), Arc::default());
        let mut session = session_with(&[(a.clone(), 2)]);
        session.discount.set_value(Decimal::new(20, 0)).unwrap();
        let key = session.idempotency_key();

        let outcome = sub.submit(&mut session).await.unwrap();
        assert!(!outcome.is_partial());
        assert_eq!(outcome.order.total, Decimal::new(216, 0));
        assert_eq!(outcome.order.idempotency_key, Some(key));
        assert_eq!(outcome.lines.len(), 1);
        assert_eq!(store.inner.order_count().await, 1);
        assert_eq!(store.inner.ledger_len().await, 1);
        assert_eq!(store.inner.product(a.id).await.unwrap().unwrap().stock_quantity, 3);
        let ledger = store.inner.inventory_transactions(a.id).await.unwrap();
        assert_eq!((ledger[0].stock_before, ledger[0].stock_after, ledger[0].quantity_change), (5, 3, -2));

        assert!(session.cart.is_empty());
        assert_ne!(session.idempotency_key(), key);
        assert!(outcome.receipt_html.contains(&outcome.order.order_number));
    }

    #[tokio::test]
    async fn test_empty_cart_writes_nothing() {
        let store = seeded(FlakyStore::default(), &[]).await;
        let sub = submitter(store.clone(), Arc::default());
        let err = sub.submit(&mut SaleSession::new()).await.unwrap_err();
        assert!(matches!(err, CheckoutError::Validation(ValidationError::EmptyCart)));
        assert_eq!(store.inner.order_count().await, 0);
    }

    #[tokio::test]
    async fn test_sms_without_phone_writes_nothing() {
        let a = product("A", 10, 5);
        let store = seeded(FlakyStore::default(), &[a.clone()]).await;
        let sub = submitter(store.clone(), Arc::default());
        let mut session = session_with(&[(a.clone(), 1)]);
        session.notify.sms = true;
        session.walk_in.phone = Some("   ".into());

        let err = sub.submit(&mut session).await.unwrap_err();
        assert!(matches!(err, CheckoutError::Validation(ValidationError::MissingPhone)));
        assert_eq!(store.inner.order_count().await, 0);
        assert_eq!(store.inner.product(a.id).await.unwrap().unwrap().stock_quantity, 5);
        assert!(store.stock_attempts.lock().unwrap().is_empty());
        assert_eq!(session.cart.item_count(), 1);
    }

    #[tokio::test]
    async fn test_email_requires_customer_email() {
        let a = product("A", 10, 5);
        let store = seeded(FlakyStore::default(), &[a.clone()]).await;
        let sub = submitter(store.clone(), Arc::default());
        let mut session = session_with(&[(a, 1)]);
        session.notify.email = true;
        session.customer = Some(Customer::create("Ravi").with_phone("9845012345"));
        let err = sub.submit(&mut session).await.unwrap_err();
        assert!(matches!(err, CheckoutError::Validation(ValidationError::MissingEmail)));
        assert_eq!(store.inner.order_count().await, 0);
    }

    #[tokio::test]
    async fn test_stock_failure_does_not_stop_later_lines() {
        let (a, b, c) = (product("A", 10, 5), product("B", 20, 5), product("C", 30, 5));
        let store = FlakyStore { fail_stock_for: HashSet::from([b.id]), ..Default::default() };
        let store = seeded(store, &[a.clone(), b.clone(), c.clone()]).await;
        let sub = submitter(store.clone(), Arc::default());
        let mut session = session_with(&[(a.clone(), 1), (b.clone(), 2), (c.clone(), 3)]);

        let outcome = sub.submit(&mut session).await.unwrap();
        assert_eq!(*store.stock_attempts.lock().unwrap(), vec![a.id, b.id, c.id]);
        assert!(outcome.is_partial());
        assert_eq!(outcome.failures().count(), 1);
        assert_eq!(store.inner.product(a.id).await.unwrap().unwrap().stock_quantity, 4);
        assert_eq!(store.inner.product(b.id).await.unwrap().unwrap().stock_quantity, 5);
        assert_eq!(store.inner.product(c.id).await.unwrap().unwrap().stock_quantity, 2);
        assert!(session.cart.is_empty());
    }

    #[tokio::test]
    async fn test_ledger_failure_is_swallowed() {
        let a = product("A", 10, 5);
        let store = seeded(FlakyStore { fail_ledger: true, ..Default::default() }, &[a.clone()]).await;
        let sub = submitter(store.clone(), Arc::default());
        let outcome = sub.submit(&mut session_with(&[(a.clone(), 2)])).await.unwrap();
        assert!(matches!(outcome.failures().next(), Some(DomainEvent::Inventory(InventoryEvent::LedgerWriteFailed { .. }))));
        assert_eq!(store.inner.product(a.id).await.unwrap().unwrap().stock_quantity, 3);
        assert_eq!(store.inner.order_count().await, 1);
    }

    #[tokio::test]
    async fn test_order_insert_failure_keeps_session() {
        let a = product("A", 10, 5);
        let store = seeded(FlakyStore { fail_order_insert: true, ..Default::default() }, &[a.clone()]).await;
        let sub = submitter(store.clone(), Arc::default());
        let mut session = session_with(&[(a.clone(), 2)]);
        let key = session.idempotency_key();
        assert!(matches!(sub.submit(&mut session).await, Err(CheckoutError::OrderWrite(_))));
        assert_eq!(session.cart.unit_count(), 2);
        assert_eq!(session.idempotency_key(), key);
        assert!(store.stock_attempts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lines_failure_removes_order_header() {
        let a = product("A", 10, 5);
        let store = seeded(FlakyStore { fail_lines_insert: true, ..Default::default() }, &[a.clone()]).await;
        let sub = submitter(store.clone(), Arc::default());
        let mut session = session_with(&[(a, 1)]);
        assert!(matches!(sub.submit(&mut session).await, Err(CheckoutError::LinesWrite(_))));
        assert_eq!(store.inner.order_count().await, 0);
        assert_eq!(session.cart.item_count(), 1);
    }

    #[tokio::test]
    async fn test_same_key_replays_instead_of_duplicating() {
        let a = product("A", 10, 5);
        let store = seeded(FlakyStore::default(), &[a.clone()]).await;
        let sub = submitter(store.clone(), Arc::default());
        let key = Uuid::new_v4();

        let first = sub.submit(&mut session_with(&[(a.clone(), 1)]).with_idempotency_key(key)).await.unwrap();
        let second = sub.submit(&mut session_with(&[(a.clone(), 1)]).with_idempotency_key(key)).await.unwrap();
        assert!(second.replayed);
        assert_eq!(second.order.id, first.order.id);
        assert_eq!(store.inner.order_count().await, 1);
        assert_eq!(store.inner.product(a.id).await.unwrap().unwrap().stock_quantity, 4);
    }

    #[tokio::test]
    async fn test_racing_submit_with_same_key_is_replayed() {
        let a = product("A", 10, 5);
        let store = seeded(FlakyStore { stale_key_lookups: Mutex::new(1), ..Default::default() }, &[a.clone()]).await;
        let sub = submitter(store.clone(), Arc::default());
        let key = Uuid::new_v4();
        let mut winner = Order::place_pos(&Totals::default(), DiscountKind::Amount, Decimal::ZERO, PaymentMethod::Cash);
        winner.idempotency_key = Some(key);
        store.inner.insert_order(&winner).await.unwrap();

        let mut session = session_with(&[(a.clone(), 1)]).with_idempotency_key(key);
        let outcome = sub.submit(&mut session).await.unwrap();
        assert!(outcome.replayed);
        assert_eq!(outcome.order.id, winner.id);
        assert_eq!(store.inner.order_count().await, 1);
        assert!(store.stock_attempts.lock().unwrap().is_empty());
        assert!(session.cart.is_empty());
    }

    #[tokio::test]
    async fn test_taken_order_number_is_redrawn() {
        let a = product("A", 10, 5);
        let store = seeded(FlakyStore { taken_numbers: Mutex::new(1), ..Default::default() }, &[a.clone()]).await;
        let sub = submitter(store.clone(), Arc::default());

        let outcome = sub.submit(&mut session_with(&[(a, 1)])).await.unwrap();
        let attempts = store.attempted_numbers.lock().unwrap().clone();
        assert_eq!(attempts.len(), 2);
        assert_ne!(attempts[0], attempts[1]);
        assert_eq!(outcome.order.order_number, attempts[1]);
        assert!(matches!(
            outcome.events.first(),
            Some(DomainEvent::Order(OrderEvent::Placed { order_number, .. })) if order_number == &attempts[1]
        ));
        assert_eq!(store.inner.order_count().await, 1);
    }

    #[tokio::test]
    async fn test_repeated_scans_charge_every_unit() {
        let a = product("A", 100, 10);
        let store = seeded(FlakyStore::default(), &[a.clone()]).await;
        let sub = submitter(store.clone(), Arc::default());
        let mut session = SaleSession::new();
        session.cart.add_units(a.clone(), 1, rate(0)).unwrap();
        session.cart.add_units(a.clone(), 1, rate(0)).unwrap();

        let outcome = sub.submit(&mut session).await.unwrap();
        assert_eq!(outcome.lines.len(), 1);
        assert_eq!(outcome.lines[0].quantity, 2);
        assert_eq!(outcome.order.total, Decimal::new(200, 0));
        assert_eq!(store.inner.product(a.id).await.unwrap().unwrap().stock_quantity, 8);
    }

    #[tokio::test]
    async fn test_notifications_use_walk_in_phone() {
        let a = product("A", 10, 5);
        let store = seeded(FlakyStore::default(), &[a.clone()]).await;
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let sub = submitter(store, dispatcher.clone());
        let mut session = session_with(&[(a, 1)]);
        session.notify = NotifyOptions { email: false, sms: true, whatsapp: true };
        session.walk_in = Contact { name: Some("Walk-in".into()), email: None, phone: Some("98450 12345".into()) };

        let outcome = sub.submit(&mut session).await.unwrap();
        let channels: Vec<Channel> = dispatcher.sent.lock().unwrap().iter().map(|m| m.channel).collect();
        assert_eq!(channels, vec![Channel::Sms, Channel::Whatsapp]);
        assert!(outcome.messages[1].url.starts_with("https://wa.me/919845012345?text="));
        assert_eq!(outcome.order.contact.phone.as_deref(), Some("98450 12345"));
    }

    #[tokio::test]
    async fn test_dispatch_failure_does_not_fail_checkout() {
        let a = product("A", 10, 5);
        let store = seeded(FlakyStore::default(), &[a.clone()]).await;
        let dispatcher = Arc::new(RecordingDispatcher { fail: true, ..Default::default() });
        let sub = submitter(store.clone(), dispatcher);
        let mut session = session_with(&[(a, 1)]);
        session.customer = Some(Customer::create("Meena").with_email("meena@example.com"));
        session.notify.email = true;

        let outcome = sub.submit(&mut session).await.unwrap();
        assert!(outcome.messages.is_empty());
        assert!(matches!(outcome.failures().next(), Some(DomainEvent::Notification(NotificationEvent::Failed { .. }))));
        assert_eq!(outcome.order.contact.email.as_deref(), Some("meena@example.com"));
        assert_eq!(store.inner.order_count().await, 1);
    }
}

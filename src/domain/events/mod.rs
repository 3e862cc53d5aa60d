//! Domain events
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;
use crate::domain::aggregates::order::OrderStatus;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DomainEvent {
    Order(OrderEvent),
    Inventory(InventoryEvent),
    Notification(NotificationEvent),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order_id: Uuid, order_number: String, total: Decimal },
    Replayed { order_id: Uuid, idempotency_key: Uuid },
    StatusChanged { order_id: Uuid, from: OrderStatus, to: OrderStatus },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum InventoryEvent {
    StockDecremented { product_id: Uuid, before: i32, after: i32 },
    StockDecrementFailed { product_id: Uuid, quantity: u32, reason: String },
    LedgerWriteFailed { product_id: Uuid, reason: String },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NotificationEvent {
    Sent { channel: String, url: String },
    Failed { channel: String, reason: String },
}

impl DomainEvent {
    /// True for events that leave the order in a partially applied state.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            DomainEvent::Inventory(InventoryEvent::StockDecrementFailed { .. } | InventoryEvent::LedgerWriteFailed { .. })
                | DomainEvent::Notification(NotificationEvent::Failed { .. })
        )
    }
}

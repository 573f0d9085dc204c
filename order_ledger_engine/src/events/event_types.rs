use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::{Actor, Order, OrderId, OrderStatusType, Payment, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreatedEvent {
    pub order: Order,
    pub payment: Payment,
}

impl OrderCreatedEvent {
    pub fn new(order: Order, payment: Payment) -> Self {
        Self { order, payment }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusChangedEvent {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub old_status: OrderStatusType,
    pub new_status: OrderStatusType,
    pub note: Option<String>,
    pub actor: Option<Actor>,
    pub timestamp: DateTime<Utc>,
}

impl OrderStatusChangedEvent {
    /// Builds the event from the order as it was written. The new status and note come from the last history entry.
    pub fn new(old_status: OrderStatusType, order: &Order) -> Self {
        let entry = order.last_entry();
        Self {
            order_id: order.order_id.clone(),
            user_id: order.user_id.clone(),
            old_status,
            new_status: order.status,
            note: entry.and_then(|e| e.note.clone()),
            actor: entry.and_then(|e| e.actor.clone()),
            timestamp: entry.map(|e| e.timestamp).unwrap_or(order.updated_at),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentCompletedEvent {
    pub payment: Payment,
}

impl PaymentCompletedEvent {
    pub fn new(payment: Payment) -> Self {
        Self { payment }
    }
}

/// Emitted when a refund is initiated, and again whenever its money movement settles (processed or failed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundIssuedEvent {
    pub payment: Payment,
}

impl RefundIssuedEvent {
    pub fn new(payment: Payment) -> Self {
        Self { payment }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventType {
    OrderCreated(OrderCreatedEvent),
    OrderStatusChanged(OrderStatusChangedEvent),
    PaymentCompleted(PaymentCompletedEvent),
    RefundIssued(RefundIssuedEvent),
}

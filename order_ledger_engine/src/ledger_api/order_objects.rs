use std::fmt::Display;

use chrono::{DateTime, Utc};
use ol_common::Money;
use serde::{Deserialize, Serialize};

use crate::db_types::{
    Actor,
    LineItem,
    Order,
    OrderId,
    OrderStatusType,
    Payment,
    PaymentId,
    PaymentMethod,
    PaymentStatusType,
    ShippingAddress,
    UserId,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderQueryFilter {
    pub user_id: Option<UserId>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub status: Option<Vec<OrderStatusType>>,
}

impl OrderQueryFilter {
    pub fn with_user_id(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_status(mut self, status: OrderStatusType) -> Self {
        self.status.get_or_insert_with(Vec::new).push(status);
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.user_id.is_none() && self.status.is_none() && self.since.is_none() && self.until.is_none()
    }

    /// Applies the filter to a single order. Backends that cannot push the filter into a query use this.
    pub fn matches(&self, order: &Order) -> bool {
        self.user_id.as_ref().map(|u| &order.user_id == u).unwrap_or(true) &&
            self.status.as_ref().map(|s| s.is_empty() || s.contains(&order.status)).unwrap_or(true) &&
            self.since.map(|t| order.created_at >= t).unwrap_or(true) &&
            self.until.map(|t| order.created_at <= t).unwrap_or(true)
    }
}

impl Display for OrderQueryFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            write!(f, "No filters.")?;
            return Ok(());
        }
        if let Some(user_id) = &self.user_id {
            write!(f, "user_id: {user_id}. ")?;
        }
        if let Some(since) = &self.since {
            write!(f, "since {since}. ")?;
        }
        if let Some(until) = &self.until {
            write!(f, "until {until}. ")?;
        }
        if let Some(statuses) = &self.status {
            let statuses = statuses.iter().map(|s| s.to_string()).collect::<Vec<String>>().join(",");
            write!(f, "statuses: [{statuses}]. ")?;
        }
        Ok(())
    }
}

/// A request to move an order to a new status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTransition {
    pub target: OrderStatusType,
    pub note: Option<String>,
    pub actor: Option<Actor>,
    /// When set, the transition only applies if the order is still at this version. A stale version yields
    /// `Conflict` without retrying.
    #[serde(default)]
    pub expected_version: Option<i64>,
}

impl OrderTransition {
    pub fn new(target: OrderStatusType) -> Self {
        Self { target, note: None, actor: None, expected_version: None }
    }

    pub fn with_note<S: Into<String>>(mut self, note: S) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_actor<S: Into<String>>(mut self, actor: S) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn at_version(mut self, version: i64) -> Self {
        self.expected_version = Some(version);
        self
    }
}

#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    pub order: Order,
    /// False if the order was already in the target status.
    pub changed: bool,
    /// The payment, if this transition initiated a refund on it.
    pub refund_initiated: Option<Payment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub user_id: UserId,
    pub line_items: Vec<LineItem>,
    pub shipping_address: ShippingAddress,
    pub method: PaymentMethod,
    #[serde(default)]
    pub currency: Option<String>,
    /// The total the client displayed. If given, it must match the computed total exactly.
    #[serde(default)]
    pub expected_total: Option<Money>,
    /// A cart-level idempotency key. Repeating a checkout with the same id and contents returns the original order.
    #[serde(default)]
    pub order_id: Option<OrderId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutResult {
    pub order_id: OrderId,
    pub payment_id: PaymentId,
    pub order_status: OrderStatusType,
    pub payment_status: PaymentStatusType,
    pub total: Money,
}

impl CheckoutResult {
    pub fn new(order: &Order, payment: &Payment) -> Self {
        Self {
            order_id: order.order_id.clone(),
            payment_id: payment.payment_id.clone(),
            order_status: order.status,
            payment_status: payment.status,
            total: order.total,
        }
    }
}

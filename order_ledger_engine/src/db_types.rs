//! Ledger data types.
//!
//! These are the documents persisted by the ledger backends and returned by the public API. An [`Order`] and its
//! [`Payment`] are separate aggregates, each carrying its own append-only status history and an optimistic
//! concurrency `version`.
use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use ol_common::Money;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Error)]
#[error("Invalid value: {0}")]
pub struct ConversionError(String);

macro_rules! string_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = ConversionError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let s = s.trim();
                if s.is_empty() {
                    Err(ConversionError(format!("{} cannot be empty", stringify!($name))))
                } else {
                    Ok(Self(s.to_string()))
                }
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}{}", $prefix, self.0)
            }
        }
    };
}

//--------------------------------------        Ids            ---------------------------------------------------------
string_id!(OrderId, "#");
string_id!(PaymentId, "pay:");
string_id!(UserId, "user:");
string_id!(ProductId, "sku:");

impl OrderId {
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl PaymentId {
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

/// Identity recorded against audit entries. Supplied by the caller; never authenticated here.
pub type Actor = String;

//--------------------------------------   OrderStatusType     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatusType {
    /// The order has been created at checkout. No payment has been collected yet.
    Pending,
    /// Payment has been collected (or COD confirmed) and the order is being prepared.
    Processing,
    /// The order has left the warehouse.
    Shipped,
    /// Terminal. The order reached the customer.
    Delivered,
    /// Terminal. The order was cancelled by the customer or an admin.
    Cancelled,
}

impl OrderStatusType {
    pub const ALL: [OrderStatusType; 5] = [Self::Pending, Self::Processing, Self::Shipped, Self::Delivered, Self::Cancelled];

    /// The order status graph:
    ///
    /// ```text
    /// Pending → Processing → Shipped → Delivered
    /// Pending|Processing|Shipped → Cancelled
    /// ```
    ///
    /// A status is never reachable from itself; idempotent re-application is handled by the lifecycle manager.
    pub fn can_transition_to(&self, target: OrderStatusType) -> bool {
        use OrderStatusType::*;
        matches!(
            (self, target),
            (Pending, Processing) |
                (Processing, Shipped) |
                (Shipped, Delivered) |
                (Pending | Processing | Shipped, Cancelled)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatusType::Pending => write!(f, "Pending"),
            OrderStatusType::Processing => write!(f, "Processing"),
            OrderStatusType::Shipped => write!(f, "Shipped"),
            OrderStatusType::Delivered => write!(f, "Delivered"),
            OrderStatusType::Cancelled => write!(f, "Cancelled"),
        }
    }
}

impl FromStr for OrderStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "shipped" => Ok(Self::Shipped),
            "delivered" => Ok(Self::Delivered),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            s => Err(ConversionError(format!("Invalid order status: {s}"))),
        }
    }
}

//--------------------------------------  PaymentStatusType    ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentStatusType {
    /// Created alongside the order. Nothing has been charged or collected.
    Pending,
    /// A card charge is in flight with the gateway.
    Processing,
    /// Money has been received.
    Completed,
    /// The charge failed or was abandoned. Card payments may be retried from here.
    Failed,
    /// A refund was initiated. See [`Refund::status`] for the state of the money movement.
    Refunded,
}

impl PaymentStatusType {
    pub const ALL: [PaymentStatusType; 5] =
        [Self::Pending, Self::Processing, Self::Completed, Self::Failed, Self::Refunded];

    /// The payment status graph:
    ///
    /// ```text
    /// Pending → Processing → Completed → Refunded
    /// Pending|Processing → Failed
    /// Failed → Processing   (retry)
    /// ```
    ///
    /// COD collection moves `Pending → Completed` directly; that edge is only available through
    /// [`PaymentStatusType::can_collect_cash`].
    pub fn can_transition_to(&self, target: PaymentStatusType) -> bool {
        use PaymentStatusType::*;
        matches!(
            (self, target),
            (Pending, Processing) |
                (Processing, Completed) |
                (Completed, Refunded) |
                (Pending | Processing, Failed) |
                (Failed, Processing)
        )
    }

    pub fn can_collect_cash(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

impl Display for PaymentStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentStatusType::Pending => write!(f, "Pending"),
            PaymentStatusType::Processing => write!(f, "Processing"),
            PaymentStatusType::Completed => write!(f, "Completed"),
            PaymentStatusType::Failed => write!(f, "Failed"),
            PaymentStatusType::Refunded => write!(f, "Refunded"),
        }
    }
}

impl FromStr for PaymentStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "refunded" => Ok(Self::Refunded),
            s => Err(ConversionError(format!("Invalid payment status: {s}"))),
        }
    }
}

//--------------------------------------    PaymentMethod      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentMethod {
    /// Cash on delivery
    Cod,
    Card,
}

impl Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentMethod::Cod => write!(f, "Cod"),
            PaymentMethod::Card => write!(f, "Card"),
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cod" => Ok(Self::Cod),
            "card" => Ok(Self::Card),
            s => Err(ConversionError(format!("Invalid payment method: {s}"))),
        }
    }
}

//--------------------------------------     RefundStatus      ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RefundStatus {
    Pending,
    Processed,
    Failed,
}

impl Display for RefundStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefundStatus::Pending => write!(f, "Pending"),
            RefundStatus::Processed => write!(f, "Processed"),
            RefundStatus::Failed => write!(f, "Failed"),
        }
    }
}

//--------------------------------------      LineItem         ---------------------------------------------------------
/// A line item, with the unit price snapshotted at checkout. The catalog is never consulted again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_price: Money,
}

impl LineItem {
    pub fn new<P: Into<ProductId>>(product_id: P, quantity: i64, unit_price: Money) -> Self {
        Self { product_id: product_id.into(), quantity, unit_price }
    }

    /// `unit_price * quantity`, or `None` if the product overflows.
    pub fn subtotal(&self) -> Option<Money> {
        self.unit_price.checked_mul(self.quantity)
    }
}

/// Sums the line item subtotals. Returns `None` on overflow.
pub fn order_total(items: &[LineItem]) -> Option<Money> {
    items.iter().try_fold(Money::default(), |acc, item| item.subtotal().and_then(|s| acc.checked_add(s)))
}

//--------------------------------------   ShippingAddress     ---------------------------------------------------------
/// A snapshot of the delivery address at checkout time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub name: String,
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    pub city: String,
    #[serde(default)]
    pub region: Option<String>,
    pub postal_code: String,
    pub country: String,
}

//--------------------------------------   OrderStatusEntry    ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusEntry {
    pub status: OrderStatusType,
    pub note: Option<String>,
    pub actor: Option<Actor>,
    pub timestamp: DateTime<Utc>,
}

//--------------------------------------        Order          ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub line_items: Vec<LineItem>,
    pub subtotal: Money,
    pub total: Money,
    pub currency: String,
    pub shipping_address: ShippingAddress,
    pub status: OrderStatusType,
    /// Mirror of the linked payment's status. Only the transaction coordinator writes this.
    pub payment_status: PaymentStatusType,
    pub status_history: Vec<OrderStatusEntry>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Sets the status and appends the matching audit entry. The caller persists both in one write.
    pub fn push_status(&mut self, status: OrderStatusType, note: Option<String>, actor: Option<Actor>) {
        let timestamp = Utc::now();
        self.status = status;
        self.updated_at = timestamp;
        self.status_history.push(OrderStatusEntry { status, note, actor, timestamp });
    }

    pub fn last_entry(&self) -> Option<&OrderStatusEntry> {
        self.status_history.last()
    }

    /// True if the order was created from the given request, ignoring timestamps. Used to make checkout with a
    /// caller-supplied order id idempotent.
    pub fn is_equivalent(&self, order: &NewOrder) -> bool {
        self.order_id == order.order_id &&
            self.user_id == order.user_id &&
            self.line_items == order.line_items &&
            self.currency == order.currency &&
            self.shipping_address == order.shipping_address
    }
}

//--------------------------------------       NewOrder        ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub line_items: Vec<LineItem>,
    /// Sum of the line item subtotals, computed at checkout.
    pub total: Money,
    pub currency: String,
    pub shipping_address: ShippingAddress,
    pub created_at: DateTime<Utc>,
}

impl NewOrder {
    /// Builds the stored document in its initial state: `Pending`, with a single history entry.
    pub fn into_order(self) -> Order {
        let entry = OrderStatusEntry {
            status: OrderStatusType::Pending,
            note: Some("Order created".to_string()),
            actor: Some(self.user_id.as_str().to_string()),
            timestamp: self.created_at,
        };
        Order {
            order_id: self.order_id,
            user_id: self.user_id,
            line_items: self.line_items,
            subtotal: self.total,
            total: self.total,
            currency: self.currency,
            shipping_address: self.shipping_address,
            status: OrderStatusType::Pending,
            payment_status: PaymentStatusType::Pending,
            status_history: vec![entry],
            version: 1,
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}

//--------------------------------------   Method payloads     ---------------------------------------------------------
/// Card payment details. Only masked card metadata is ever stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardDetails {
    pub charge_intent_ref: Option<String>,
    pub charge_id: Option<String>,
    pub receipt_ref: Option<String>,
    pub card_brand: Option<String>,
    pub card_last4: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodDetails {
    pub receipt_number: String,
    pub collected_by: Actor,
    pub collected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Refund {
    pub amount: Money,
    pub reason: String,
    pub status: RefundStatus,
    pub processed_by: Actor,
    pub processed_at: Option<DateTime<Utc>>,
    pub gateway_refund_ref: Option<String>,
    pub failure_reason: Option<String>,
    /// Issuance attempts that ended in a definitive failure.
    #[serde(default)]
    pub failed_attempts: i64,
}

//--------------------------------------  PaymentStatusEntry   ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentStatusEntry {
    pub status: PaymentStatusType,
    pub detail: Option<String>,
    pub timestamp: DateTime<Utc>,
}

//--------------------------------------       Payment         ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub payment_id: PaymentId,
    pub order_id: OrderId,
    pub user_id: UserId,
    pub amount: Money,
    pub currency: String,
    pub method: PaymentMethod,
    pub status: PaymentStatusType,
    pub card: Option<CardDetails>,
    pub cod: Option<CodDetails>,
    pub refund: Option<Refund>,
    pub status_history: Vec<PaymentStatusEntry>,
    pub attempt_count: i64,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Sets the status and appends the matching history entry. The caller persists both in one write.
    pub fn push_status(&mut self, status: PaymentStatusType, detail: Option<String>) {
        let timestamp = Utc::now();
        self.status = status;
        self.updated_at = timestamp;
        self.status_history.push(PaymentStatusEntry { status, detail, timestamp });
    }

    pub fn last_entry(&self) -> Option<&PaymentStatusEntry> {
        self.status_history.last()
    }

    pub fn charge_id(&self) -> Option<&str> {
        self.card.as_ref().and_then(|c| c.charge_id.as_deref())
    }

    pub fn refund_status(&self) -> Option<RefundStatus> {
        self.refund.as_ref().map(|r| r.status)
    }
}

//--------------------------------------      NewPayment       ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPayment {
    pub payment_id: PaymentId,
    pub order_id: OrderId,
    pub user_id: UserId,
    pub amount: Money,
    pub currency: String,
    pub method: PaymentMethod,
    pub created_at: DateTime<Utc>,
}

impl NewPayment {
    pub fn for_order(order: &NewOrder, method: PaymentMethod) -> Self {
        Self {
            payment_id: PaymentId::random(),
            order_id: order.order_id.clone(),
            user_id: order.user_id.clone(),
            amount: order.total,
            currency: order.currency.clone(),
            method,
            created_at: order.created_at,
        }
    }

    pub fn into_payment(self) -> Payment {
        let entry = PaymentStatusEntry {
            status: PaymentStatusType::Pending,
            detail: Some(format!("{} payment created", self.method)),
            timestamp: self.created_at,
        };
        let card = match self.method {
            PaymentMethod::Card => Some(CardDetails::default()),
            PaymentMethod::Cod => None,
        };
        Payment {
            payment_id: self.payment_id,
            order_id: self.order_id,
            user_id: self.user_id,
            amount: self.amount,
            currency: self.currency,
            method: self.method,
            status: PaymentStatusType::Pending,
            card,
            cod: None,
            refund: None,
            status_history: vec![entry],
            attempt_count: 0,
            last_attempt_at: None,
            version: 1,
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}

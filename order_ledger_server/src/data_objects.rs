//! Request and response bodies for the HTTP API.
//!
//! Checkout and the card webhook accept the engine's own [`CheckoutRequest`] and [`ChargeResult`] types directly.
use order_ledger_engine::{
    db_types::{OrderId, OrderStatusType, PaymentId, PaymentStatusType, RefundStatus},
    order_objects::{OrderTransition, TransitionOutcome},
    payment_objects::{PaymentProgress, RefundOutcome},
};
use ol_common::Money;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodCompleteParams {
    pub collector: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardChargeParams {
    pub payment_method_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdateParams {
    pub status: OrderStatusType,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub actor: Option<String>,
    /// Optimistic concurrency guard. The update is rejected with `409` if the order has moved past this version.
    #[serde(default)]
    pub expected_version: Option<i64>,
}

impl From<StatusUpdateParams> for OrderTransition {
    fn from(params: StatusUpdateParams) -> Self {
        OrderTransition {
            target: params.status,
            note: params.note,
            actor: params.actor,
            expected_version: params.expected_version,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundParams {
    pub amount: Money,
    pub reason: String,
    pub actor: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundConfirmParams {
    pub reference: String,
    pub actor: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserOrdersQuery {
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentProgressResponse {
    pub order_id: OrderId,
    pub payment_id: PaymentId,
    pub order_status: OrderStatusType,
    pub payment_status: PaymentStatusType,
}

impl From<PaymentProgress> for PaymentProgressResponse {
    fn from(progress: PaymentProgress) -> Self {
        Self {
            order_status: progress.order_status(),
            payment_status: progress.payment_status(),
            order_id: progress.order.order_id,
            payment_id: progress.payment.payment_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdateResponse {
    pub order_id: OrderId,
    pub order_status: OrderStatusType,
    pub payment_status: PaymentStatusType,
    pub note: Option<String>,
    pub version: i64,
    /// False when the order was already in the requested status.
    pub changed: bool,
    pub refund_status: Option<RefundStatus>,
}

impl From<TransitionOutcome> for StatusUpdateResponse {
    fn from(outcome: TransitionOutcome) -> Self {
        let refund_status = outcome.refund_initiated.as_ref().and_then(|p| p.refund_status());
        let order = outcome.order;
        Self {
            note: order.last_entry().and_then(|e| e.note.clone()),
            order_id: order.order_id,
            order_status: order.status,
            payment_status: order.payment_status,
            version: order.version,
            changed: outcome.changed,
            refund_status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundResponse {
    pub payment_id: PaymentId,
    pub payment_status: PaymentStatusType,
    pub refund_status: RefundStatus,
    pub amount: Money,
}

impl From<RefundOutcome> for RefundResponse {
    fn from(outcome: RefundOutcome) -> Self {
        let amount = outcome.payment.refund.as_ref().map(|r| r.amount).unwrap_or_default();
        Self {
            payment_id: outcome.payment.payment_id,
            payment_status: outcome.payment.status,
            refund_status: outcome.refund_status,
            amount,
        }
    }
}

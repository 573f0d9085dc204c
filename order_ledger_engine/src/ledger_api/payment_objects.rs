use serde::{Deserialize, Serialize};

use crate::db_types::{Order, OrderStatusType, Payment, PaymentStatusType, RefundStatus};

/// The state of an order and its payment after a coordinated payment step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentProgress {
    pub order: Order,
    pub payment: Payment,
}

impl PaymentProgress {
    pub fn new(order: Order, payment: Payment) -> Self {
        Self { order, payment }
    }

    pub fn order_status(&self) -> OrderStatusType {
        self.order.status
    }

    pub fn payment_status(&self) -> PaymentStatusType {
        self.payment.status
    }
}

/// The state of a refund after the coordinator has tried to move the money.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundOutcome {
    pub payment: Payment,
    pub refund_status: RefundStatus,
}

impl RefundOutcome {
    /// Returns `None` if the payment carries no refund.
    pub fn from_payment(payment: Payment) -> Option<Self> {
        let refund_status = payment.refund_status()?;
        Some(Self { payment, refund_status })
    }
}

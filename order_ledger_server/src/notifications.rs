//! Event subscribers for the server.
//!
//! Notification delivery (email, push, webhooks to the storefront) lives outside the ledger. The server subscribes to
//! every ledger event and writes it to the `ols::events` log target, which is where a delivery service picks them up.
use futures::future::BoxFuture;
use log::*;
use order_ledger_engine::{
    db_types::RefundStatus,
    events::{EventHandlers, EventHooks, OrderCreatedEvent, OrderStatusChangedEvent, RefundIssuedEvent},
};

pub const NOTIFICATION_EVENT_BUFFER_SIZE: usize = 50;
const EVENT_LOG_TARGET: &str = "ols::events";

pub fn create_notification_event_handlers() -> EventHandlers {
    let mut hooks = EventHooks::default();
    // --- On OrderCreated Handler ---
    hooks.on_order_created(|ev| {
        let OrderCreatedEvent { order, payment } = ev;
        info!(
            target: EVENT_LOG_TARGET,
            "📬️ Order {} created for {}. {} {} by {}. Payment {}.",
            order.order_id,
            order.user_id,
            order.total.format_in(&order.currency),
            order.currency,
            payment.method,
            payment.payment_id
        );
        no_op()
    });
    // --- On OrderStatusChanged Handler ---
    hooks.on_order_status_changed(|ev| {
        let OrderStatusChangedEvent { order_id, user_id, old_status, new_status, note, actor, timestamp } = ev;
        info!(
            target: EVENT_LOG_TARGET,
            "📬️ Order {order_id} ({user_id}) moved from {old_status} to {new_status} at {timestamp} by {}. {}",
            actor.as_deref().unwrap_or("system"),
            note.unwrap_or_default()
        );
        no_op()
    });
    // --- On PaymentCompleted Handler ---
    hooks.on_payment_completed(|ev| {
        let payment = ev.payment;
        info!(
            target: EVENT_LOG_TARGET,
            "📬️ Payment {} for order {} completed. {} {} by {}.",
            payment.payment_id,
            payment.order_id,
            payment.amount.format_in(&payment.currency),
            payment.currency,
            payment.method
        );
        no_op()
    });
    // --- On RefundIssued Handler ---
    hooks.on_refund_issued(|ev| {
        let RefundIssuedEvent { payment } = ev;
        match payment.refund.as_ref() {
            Some(refund) if refund.status == RefundStatus::Failed => warn!(
                target: EVENT_LOG_TARGET,
                "📬️ Refund of {} {} on payment {} (order {}) failed and is waiting to be retried.",
                refund.amount.format_in(&payment.currency),
                payment.currency,
                payment.payment_id,
                payment.order_id
            ),
            Some(refund) => info!(
                target: EVENT_LOG_TARGET,
                "📬️ Refund of {} {} on payment {} (order {}) is {}. Reason: {}",
                refund.amount.format_in(&payment.currency),
                payment.currency,
                payment.payment_id,
                payment.order_id,
                refund.status,
                refund.reason
            ),
            None => warn!(target: EVENT_LOG_TARGET, "📬️ Refund event for payment {} has no refund", payment.payment_id),
        }
        no_op()
    });
    EventHandlers::new(NOTIFICATION_EVENT_BUFFER_SIZE, hooks)
}

fn no_op() -> BoxFuture<'static, ()> {
    Box::pin(async {})
}

use std::{collections::HashSet, time::Duration};

use cucumber::{then, when};
use ol_common::Money;
use order_ledger_engine::{
    db_types::{LineItem, Order, OrderId, OrderStatusType, Payment, PaymentMethod, PaymentStatusType, RefundStatus, ShippingAddress},
    order_objects::{CheckoutRequest, OrderTransition},
    traits::ChargeResult,
};

use crate::cucumber::LedgerWorld;

fn address() -> ShippingAddress {
    ShippingAddress {
        name: "Test Customer".into(),
        line1: "1 Main Street".into(),
        line2: None,
        city: "Springfield".into(),
        region: None,
        postal_code: "12345".into(),
        country: "US".into(),
    }
}

async fn order(world: &LedgerWorld, order_id: &str) -> Order {
    world.coordinator().orders().get(&OrderId::from(order_id)).await.expect("Error fetching order")
}

async fn payment(world: &LedgerWorld, order_id: &str) -> Payment {
    world.coordinator().payments().get_for_order(&OrderId::from(order_id)).await.expect("Error fetching payment")
}

//------------------------------------------------  When  -------------------------------------------------------------

#[when(expr = "{string} checks out order {string} with {int} x {string} at {int} cents paying by {word}")]
async fn checkout(
    world: &mut LedgerWorld,
    user: String,
    order_id: String,
    quantity: i64,
    product: String,
    price: i64,
    method: String,
) {
    let method = method.parse::<PaymentMethod>().expect("Invalid payment method");
    let request = CheckoutRequest {
        user_id: user.into(),
        line_items: vec![LineItem::new(product, quantity, Money::from(price))],
        shipping_address: address(),
        method,
        currency: None,
        expected_total: None,
        order_id: Some(OrderId::from(order_id)),
    };
    let result = world.coordinator().checkout(request).await;
    world.record(result);
}

#[when(expr = "the courier {string} collects cash for order {string}")]
async fn collect_cash(world: &mut LedgerWorld, courier: String, order_id: String) {
    let result = world.coordinator().collect_cod_payment(&OrderId::from(order_id), &courier).await;
    world.record(result);
}

#[when(expr = "the gateway confirms charge {string} for order {string}")]
async fn gateway_confirms(world: &mut LedgerWorld, charge_id: String, order_id: String) {
    let amount = payment(world, &order_id).await.amount;
    let charge = ChargeResult {
        charge_id,
        amount,
        receipt_ref: Some("rcpt-001".into()),
        card_brand: Some("mastercard".into()),
        card_last4: Some("5555444433331111".into()),
    };
    let result = world.coordinator().process_card_charge(&OrderId::from(order_id), charge).await;
    world.record(result);
}

#[when(expr = "the gateway confirms charge {string} for {int} cents on order {string}")]
async fn gateway_confirms_amount(world: &mut LedgerWorld, charge_id: String, amount: i64, order_id: String) {
    let charge = ChargeResult {
        charge_id,
        amount: Money::from(amount),
        receipt_ref: None,
        card_brand: Some("visa".into()),
        card_last4: Some("4242".into()),
    };
    let result = world.coordinator().process_card_charge(&OrderId::from(order_id), charge).await;
    world.record(result);
}

#[when(expr = "{string} pays for order {string} with card token {string}")]
async fn pay_with_card(world: &mut LedgerWorld, _user: String, order_id: String, token: String) {
    let result = world.coordinator().charge_card(&OrderId::from(order_id), &token).await;
    world.record(result);
}

#[when(expr = "{string} cancels order {string} because {string}")]
async fn cancel(world: &mut LedgerWorld, actor: String, order_id: String, reason: String) {
    let result = world.coordinator().cancel_order(&OrderId::from(order_id), &actor, &reason).await;
    world.record(result);
}

#[when(expr = "admin {string} moves order {string} to {word}")]
async fn admin_moves(world: &mut LedgerWorld, admin: String, order_id: String, status: String) {
    let target = status.parse::<OrderStatusType>().expect("Invalid order status");
    let transition = OrderTransition::new(target).with_actor(admin).with_note(format!("Moved to {target}"));
    let result = world.coordinator().change_order_status(&OrderId::from(order_id), transition).await;
    world.record(result);
}

#[when(expr = "admin {string} refunds {int} cents on the payment for order {string}")]
async fn admin_refunds(world: &mut LedgerWorld, admin: String, amount: i64, order_id: String) {
    let payment_id = payment(world, &order_id).await.payment_id;
    let result =
        world.coordinator().refund_payment(&payment_id, Money::from(amount), "Customer complaint", &admin).await;
    world.record(result);
}

#[when(expr = "the refund for order {string} is retried")]
async fn retry_refund(world: &mut LedgerWorld, order_id: String) {
    let payment_id = payment(world, &order_id).await.payment_id;
    let result = world.coordinator().retry_refund(&payment_id).await;
    world.record(result);
}

#[when(expr = "{string} confirms the cash refund for order {string} with reference {string}")]
async fn confirm_cash_refund(world: &mut LedgerWorld, actor: String, order_id: String, reference: String) {
    let payment_id = payment(world, &order_id).await.payment_id;
    let result = world.coordinator().confirm_manual_refund(&payment_id, &reference, &actor).await;
    world.record(result);
}

#[when("the reconciliation sweep runs")]
async fn reconciliation(world: &mut LedgerWorld) {
    let result = world.coordinator().reconcile_stale_payments(chrono::Duration::zero(), 100).await;
    world.record(result);
}

#[when(expr = "the reconciliation sweep runs for payments older than {int} seconds or with {int} attempt(s)")]
async fn reconciliation_with(world: &mut LedgerWorld, seconds: i64, attempts: i64) {
    let result = world.coordinator().reconcile_stale_payments(chrono::Duration::seconds(seconds), attempts).await;
    world.record(result);
}

#[when(expr = "I pause for {int}ms")]
async fn pause(_world: &mut LedgerWorld, ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

//------------------------------------------------  Then  -------------------------------------------------------------

#[then("the last operation succeeded")]
async fn last_ok(world: &mut LedgerWorld) {
    assert!(world.last_error.is_none(), "Expected success, but got {:?}", world.last_error);
}

#[then(expr = "the last operation failed with {word}")]
async fn last_failed(world: &mut LedgerWorld, code: String) {
    let err = world.last_error.as_ref().expect("Expected the last operation to fail");
    assert_eq!(err.code(), code, "Unexpected error: {err}");
}

#[then(expr = "order {string} is {word}")]
async fn order_status(world: &mut LedgerWorld, order_id: String, status: String) {
    let expected = status.parse::<OrderStatusType>().expect("Invalid order status");
    let order = order(world, &order_id).await;
    assert_eq!(order.status, expected);
    assert_eq!(order.status_history.last().map(|e| e.status), Some(expected));
}

#[then(expr = "order {string} has payment status {word}")]
async fn order_payment_status(world: &mut LedgerWorld, order_id: String, status: String) {
    let expected = status.parse::<PaymentStatusType>().expect("Invalid payment status");
    assert_eq!(order(world, &order_id).await.payment_status, expected);
}

#[then(expr = "order {string} has {int} history entries")]
async fn order_history(world: &mut LedgerWorld, order_id: String, count: usize) {
    let order = order(world, &order_id).await;
    assert_eq!(order.status_history.len(), count, "History: {:?}", order.status_history);
}

#[then(expr = "the payment for order {string} is {word}")]
async fn payment_status(world: &mut LedgerWorld, order_id: String, status: String) {
    let expected = status.parse::<PaymentStatusType>().expect("Invalid payment status");
    let payment = payment(world, &order_id).await;
    assert_eq!(payment.status, expected);
    assert_eq!(payment.status_history.last().map(|e| e.status), Some(expected));
}

#[then(expr = "the payment for order {string} has {int} history entries")]
async fn payment_history(world: &mut LedgerWorld, order_id: String, count: usize) {
    let payment = payment(world, &order_id).await;
    assert_eq!(payment.status_history.len(), count, "History: {:?}", payment.status_history);
}

#[then(expr = "the payment for order {string} has a COD receipt number")]
async fn cod_receipt(world: &mut LedgerWorld, order_id: String) {
    let payment = payment(world, &order_id).await;
    let cod = payment.cod.expect("No COD details recorded");
    assert!(cod.receipt_number.starts_with("COD-"), "Bad receipt number {}", cod.receipt_number);
}

#[then(expr = "the card on the payment for order {string} ends in {string}")]
async fn card_last4(world: &mut LedgerWorld, order_id: String, last4: String) {
    let payment = payment(world, &order_id).await;
    let card = payment.card.expect("No card details recorded");
    assert_eq!(card.card_last4.as_deref(), Some(last4.as_str()));
}

#[then(expr = "the payment for order {string} was captured by charge {string}")]
async fn captured_by(world: &mut LedgerWorld, order_id: String, charge_id: String) {
    assert_eq!(payment(world, &order_id).await.charge_id(), Some(charge_id.as_str()));
}

#[then(expr = "the payment for order {string} has {int} attempt(s)")]
async fn attempts(world: &mut LedgerWorld, order_id: String, count: i64) {
    assert_eq!(payment(world, &order_id).await.attempt_count, count);
}

#[then(expr = "the refund for order {string} is {word} for {int} cents")]
async fn refund_state(world: &mut LedgerWorld, order_id: String, status: String, amount: i64) {
    let payment = payment(world, &order_id).await;
    let refund = payment.refund.expect("No refund recorded");
    let expected = match status.as_str() {
        "Pending" => RefundStatus::Pending,
        "Processed" => RefundStatus::Processed,
        "Failed" => RefundStatus::Failed,
        s => panic!("Unknown refund status {s}"),
    };
    assert_eq!(refund.status, expected);
    assert_eq!(refund.amount, Money::from(amount));
}

#[then(expr = "the payment for order {string} has no refund")]
async fn no_refund(world: &mut LedgerWorld, order_id: String) {
    assert!(payment(world, &order_id).await.refund.is_none());
}

#[then(expr = "the gateway received {int} charge request(s)")]
async fn charge_requests(world: &mut LedgerWorld, count: usize) {
    assert_eq!(world.gateway().charge_requests().len(), count);
}

#[then(expr = "the gateway saw {int} different refund idempotency key(s)")]
async fn refund_keys(world: &mut LedgerWorld, count: usize) {
    let keys = world.gateway().refund_requests().into_iter().map(|r| r.idempotency_key).collect::<HashSet<_>>();
    assert_eq!(keys.len(), count, "Keys: {keys:?}");
}

#[then(expr = "the gateway received {int} refund request(s)")]
async fn refund_requests(world: &mut LedgerWorld, count: usize) {
    assert_eq!(world.gateway().refund_requests().len(), count);
}

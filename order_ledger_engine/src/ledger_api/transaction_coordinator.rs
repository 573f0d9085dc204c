use std::{fmt::Debug, future::Future, time::Duration};

use chrono::Utc;
use log::*;
use ol_common::{Money, DEFAULT_CURRENCY_CODE};

use crate::{
    db_types::{
        order_total,
        Actor,
        NewOrder,
        NewPayment,
        Order,
        OrderId,
        OrderStatusType,
        Payment,
        PaymentId,
        PaymentMethod,
        PaymentStatusType,
        RefundStatus,
    },
    events::{
        EventProducers,
        OrderCreatedEvent,
        OrderStatusChangedEvent,
        PaymentCompletedEvent,
        RefundIssuedEvent,
    },
    helpers::{charge_idempotency_key, refund_idempotency_key},
    ledger_api::{
        errors::LedgerError,
        order_lifecycle_api::OrderLifecycleApi,
        order_objects::{CheckoutRequest, CheckoutResult, OrderTransition, TransitionOutcome},
        payment_lifecycle_api::PaymentLifecycleApi,
        payment_objects::{PaymentProgress, RefundOutcome},
        retry::RetryPolicy,
    },
    traits::{
        ChargeRequest,
        ChargeResult,
        GatewayError,
        LedgerDatabase,
        LedgerDatabaseError,
        PaymentGateway,
        ReconciliationResult,
        RefundRequest,
    },
};

const SYSTEM_ACTOR: &str = "system";

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub retry: RetryPolicy,
    /// Upper bound on a single gateway call.
    pub gateway_timeout: Duration,
    /// Used when a checkout request does not name a currency.
    pub default_currency: String,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            gateway_timeout: Duration::from_secs(10),
            default_currency: DEFAULT_CURRENCY_CODE.to_string(),
        }
    }
}

/// `TransactionCoordinator` drives the multi-step flows that touch both an order and its payment: checkout, payment
/// collection, cancellation with refund, and admin refunds.
///
/// Each step is a single compare-and-swap write on one aggregate, so a flow can be interrupted between steps. Every
/// flow is written to be safely re-driven: repeating a call picks up from wherever the previous attempt stopped.
/// The coordinator is the only writer of `Order::payment_status`.
pub struct TransactionCoordinator<B, G> {
    db: B,
    orders: OrderLifecycleApi<B>,
    payments: PaymentLifecycleApi<B>,
    gateway: G,
    producers: EventProducers,
    config: CoordinatorConfig,
}

impl<B, G> Debug for TransactionCoordinator<B, G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TransactionCoordinator")
    }
}

impl<B: Clone, G> TransactionCoordinator<B, G> {
    pub fn new(db: B, gateway: G, producers: EventProducers, config: CoordinatorConfig) -> Self {
        let orders = OrderLifecycleApi::new(db.clone()).with_policy(config.retry);
        let payments = PaymentLifecycleApi::new(db.clone()).with_policy(config.retry);
        Self { db, orders, payments, gateway, producers, config }
    }

    pub fn orders(&self) -> &OrderLifecycleApi<B> {
        &self.orders
    }

    pub fn payments(&self) -> &PaymentLifecycleApi<B> {
        &self.payments
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }
}

impl<B, G> TransactionCoordinator<B, G>
where
    B: LedgerDatabase,
    G: PaymentGateway,
{
    //------------------------------------------   Checkout   ---------------------------------------------------------

    /// Turns a priced cart into an order and its payment, created together.
    ///
    /// If the request carries an `order_id` that already exists with the same contents, the existing ids are returned
    /// and nothing is written. Any failure leaves no live order behind and is reported as `CheckoutFailed`.
    pub async fn checkout(&self, request: CheckoutRequest) -> Result<CheckoutResult, LedgerError> {
        let total = validate_cart(&request)?;
        let method = request.method;
        let new_order = NewOrder {
            order_id: request.order_id.clone().unwrap_or_else(OrderId::random),
            user_id: request.user_id,
            line_items: request.line_items,
            total,
            currency: request.currency.unwrap_or_else(|| self.config.default_currency.clone()),
            shipping_address: request.shipping_address,
            created_at: Utc::now(),
        };
        if request.order_id.is_some() {
            if let Some(existing) = self.db.fetch_order(&new_order.order_id).await? {
                return self.existing_checkout(existing, &new_order, method).await;
            }
        }
        let new_payment = NewPayment::for_order(&new_order, method);
        match self.db.insert_checkout(new_order.clone(), new_payment).await {
            Ok((order, payment)) => {
                info!("🛒️ Order {} created for {} ({total} {}, {method})", order.order_id, order.user_id, order.currency);
                let result = CheckoutResult::new(&order, &payment);
                self.producers.publish_order_created(OrderCreatedEvent::new(order, payment));
                Ok(result)
            },
            Err(LedgerDatabaseError::OrderAlreadyExists(id)) => {
                debug!("🛒️ Order {id} was created concurrently. Resolving to the existing order.");
                let existing = self.orders.get(&id).await?;
                self.existing_checkout(existing, &new_order, method).await
            },
            Err(e) => {
                warn!("🛒️ Checkout for {} failed: {e}", new_order.user_id);
                Err(LedgerError::CheckoutFailed(e.to_string()))
            },
        }
    }

    async fn existing_checkout(
        &self,
        existing: Order,
        requested: &NewOrder,
        method: PaymentMethod,
    ) -> Result<CheckoutResult, LedgerError> {
        if !existing.is_equivalent(requested) {
            return Err(LedgerError::CheckoutFailed(format!(
                "Order id {} is already in use for a different cart",
                existing.order_id
            )));
        }
        // A concurrent checkout may still be between its order and payment writes
        for attempt in 0..=self.config.retry.max_conflict_retries {
            if let Some(payment) = self.db.fetch_payment_for_order(&existing.order_id).await? {
                if payment.method != method {
                    return Err(LedgerError::CheckoutFailed(format!(
                        "Order {} was checked out with a different payment method",
                        existing.order_id
                    )));
                }
                debug!("🛒️ Repeated checkout for order {} resolved to payment {}", existing.order_id, payment.payment_id);
                let order = self.orders.get(&existing.order_id).await?;
                return Ok(CheckoutResult::new(&order, &payment));
            }
            if existing.status == OrderStatusType::Cancelled {
                break;
            }
            self.config.retry.sleep(attempt).await;
        }
        Err(LedgerError::CheckoutFailed(format!("Checkout for order {} did not complete", existing.order_id)))
    }

    //------------------------------------------   Payments   ---------------------------------------------------------

    /// Records cash collection for a COD order and moves the order to `Processing`.
    ///
    /// If the payment was already collected by an earlier, interrupted call, only the order step is performed.
    pub async fn collect_cod_payment(&self, order_id: &OrderId, collector: &str) -> Result<PaymentProgress, LedgerError> {
        let order = self.orders.get(order_id).await?;
        if order.status == OrderStatusType::Cancelled {
            return Err(LedgerError::InvalidState(format!("Order {order_id} is cancelled")));
        }
        let payment = self.payments.get_for_order(order_id).await?;
        let payment = if payment.status == PaymentStatusType::Completed {
            debug!("💵️ Payment {} was already collected. Resuming with the order step.", payment.payment_id);
            payment
        } else {
            let payment = self.payments.complete_cod_payment(&payment.payment_id, collector).await?;
            info!("💵️ Cash for order {order_id} collected by {collector}");
            self.producers.publish_payment_completed(PaymentCompletedEvent::new(payment.clone()));
            payment
        };
        self.mirror_payment_status(order_id, payment.status).await;
        let order = self.advance_after_payment(order_id).await?;
        Ok(PaymentProgress::new(order, payment))
    }

    /// Charges the customer's card through the gateway and, on success, moves the order to `Processing`.
    ///
    /// * A timeout leaves the payment `Processing`: the charge may still land, and the gateway webhook or a
    ///   reconciliation sweep settles it.
    /// * A decline fails the payment. The charge can be attempted again later.
    /// * Transient gateway errors are retried with backoff before the payment is failed.
    pub async fn charge_card(&self, order_id: &OrderId, payment_method_token: &str) -> Result<PaymentProgress, LedgerError> {
        let order = self.orders.get(order_id).await?;
        if order.status != OrderStatusType::Pending {
            return Err(LedgerError::InvalidState(format!("Order {order_id} is {} and cannot be charged", order.status)));
        }
        let payment = self.payments.get_for_order(order_id).await?;
        let intent = charge_idempotency_key(payment.payment_id.as_str(), payment.attempt_count + 1);
        let payment = self.payments.begin_card_payment(&payment.payment_id, &intent).await?;
        self.mirror_payment_status(order_id, payment.status).await;
        let request = ChargeRequest {
            amount: payment.amount,
            currency: payment.currency.clone(),
            payment_method_token: payment_method_token.to_string(),
            idempotency_key: intent,
        };
        let gateway = &self.gateway;
        match self.with_gateway_retries("create_charge", || gateway.create_charge(request.clone())).await {
            Ok(charge) => self.process_card_charge(order_id, charge).await,
            Err(GatewayError::Timeout) => {
                warn!("💳️ Charge for payment {} timed out. Leaving it in Processing.", payment.payment_id);
                Err(GatewayError::Timeout.into())
            },
            Err(e) => {
                warn!("💳️ Charge for payment {} failed: {e}", payment.payment_id);
                let failed = self.payments.fail_payment(&payment.payment_id, &e.to_string()).await?;
                self.mirror_payment_status(order_id, failed.status).await;
                Err(e.into())
            },
        }
    }

    /// Applies a successful charge reported by the gateway. Duplicate deliveries are harmless.
    ///
    /// If the order was cancelled while the charge was in flight, the money is refunded straight away. A charge that
    /// lands on a payment that was already failed (a declined retry, or a sweep that gave up too early) is still
    /// recorded: the payment is reopened and completed, so the money is either kept against the order or refunded.
    pub async fn process_card_charge(&self, order_id: &OrderId, charge: ChargeResult) -> Result<PaymentProgress, LedgerError> {
        let mut before = self.payments.get_for_order(order_id).await?;
        if before.status == PaymentStatusType::Failed {
            warn!("💳️ Charge {} arrived for failed payment {}. Reopening it.", charge.charge_id, before.payment_id);
            before = self.payments.reopen_for_late_charge(&before.payment_id, &charge).await?;
        }
        let payment = self.payments.complete_card_payment(&before.payment_id, &charge).await?;
        if before.status != PaymentStatusType::Completed && payment.status == PaymentStatusType::Completed {
            info!("💳️ Charge {} for order {order_id} captured", charge.charge_id);
            self.producers.publish_payment_completed(PaymentCompletedEvent::new(payment.clone()));
        }
        self.mirror_payment_status(order_id, payment.status).await;
        let order = self.advance_after_payment(order_id).await?;
        let payment = self.payments.get(&payment.payment_id).await?;
        Ok(PaymentProgress::new(order, payment))
    }

    /// Moves a freshly paid order to `Processing`. An order that has moved on already is left alone, and a
    /// cancelled one has its payment refunded.
    async fn advance_after_payment(&self, order_id: &OrderId) -> Result<Order, LedgerError> {
        let transition =
            OrderTransition::new(OrderStatusType::Processing).with_note("Payment received").with_actor(SYSTEM_ACTOR);
        match self.orders.transition(order_id, transition).await {
            Ok(outcome) => {
                self.publish_status_change(&outcome);
                Ok(outcome.order)
            },
            Err(LedgerError::InvalidTransition { from, .. }) => {
                let order = self.orders.get(order_id).await?;
                if order.status == OrderStatusType::Cancelled {
                    warn!("💳️ Payment for order {order_id} arrived after it was cancelled. Refunding.");
                    let transition = OrderTransition::new(OrderStatusType::Cancelled)
                        .with_note("Payment received after cancellation")
                        .with_actor(SYSTEM_ACTOR);
                    self.cancel_with(order_id, transition).await.map(|o| o.order)
                } else {
                    debug!("📦️ Order {order_id} was already past {from}. Nothing to advance.");
                    Ok(order)
                }
            },
            Err(e) => {
                error!("📦️ Payment for order {order_id} is recorded, but the order could not be advanced: {e}");
                Err(e)
            },
        }
    }

    //------------------------------------------   Status changes   ---------------------------------------------------

    /// Cancels the order. A collected payment is refunded in full: card refunds are issued through the gateway, cash
    /// refunds are left `Pending` until someone confirms the money was handed back.
    pub async fn cancel_order(&self, order_id: &OrderId, actor: &str, reason: &str) -> Result<TransitionOutcome, LedgerError> {
        let transition = OrderTransition::new(OrderStatusType::Cancelled).with_note(reason).with_actor(actor);
        self.cancel_with(order_id, transition).await
    }

    /// The admin status change. Cancellation goes through [`Self::cancel_order`] so that refunds happen.
    pub async fn change_order_status(
        &self,
        order_id: &OrderId,
        transition: OrderTransition,
    ) -> Result<TransitionOutcome, LedgerError> {
        if transition.target == OrderStatusType::Cancelled {
            return self.cancel_with(order_id, transition).await;
        }
        let outcome = self.orders.transition(order_id, transition).await?;
        self.publish_status_change(&outcome);
        Ok(outcome)
    }

    async fn cancel_with(&self, order_id: &OrderId, transition: OrderTransition) -> Result<TransitionOutcome, LedgerError> {
        let mut outcome = self.orders.transition(order_id, transition).await?;
        self.publish_status_change(&outcome);
        if let Some(refunded) = &outcome.refund_initiated {
            self.producers.publish_refund_issued(RefundIssuedEvent::new(refunded.clone()));
        }
        if let Some(payment) = self.db.fetch_payment_for_order(order_id).await? {
            let payment = match payment.status {
                PaymentStatusType::Pending => {
                    self.payments.fail_payment(&payment.payment_id, "Order cancelled before payment").await?
                },
                PaymentStatusType::Refunded => self.settle_refund(payment).await?,
                _ => payment,
            };
            outcome.order = self.mirror_payment_status(order_id, payment.status).await.unwrap_or(outcome.order);
            if outcome.refund_initiated.is_some() {
                outcome.refund_initiated = Some(payment);
            }
        }
        Ok(outcome)
    }

    //------------------------------------------   Refunds   ----------------------------------------------------------

    /// Admin refund of a completed payment, partial or full. Card refunds are issued through the gateway
    /// immediately; the returned status says whether the money has moved.
    pub async fn refund_payment(
        &self,
        payment_id: &PaymentId,
        amount: Money,
        reason: &str,
        actor: &Actor,
    ) -> Result<RefundOutcome, LedgerError> {
        let payment = self.payments.initiate_refund(payment_id, amount, reason, actor).await?;
        info!("💸️ Refund of {amount} on payment {payment_id} initiated by {actor}");
        self.producers.publish_refund_issued(RefundIssuedEvent::new(payment.clone()));
        self.mirror_payment_status(&payment.order_id, payment.status).await;
        let payment = self.settle_refund(payment).await?;
        refund_outcome(payment)
    }

    /// Re-issues a card refund that is still pending or that failed.
    pub async fn retry_refund(&self, payment_id: &PaymentId) -> Result<RefundOutcome, LedgerError> {
        let payment = self.payments.get(payment_id).await?;
        match payment.refund_status() {
            None => return Err(LedgerError::InvalidState(format!("Payment {payment_id} has no refund"))),
            Some(RefundStatus::Processed) => return refund_outcome(payment),
            Some(_) => {},
        }
        if payment.method != PaymentMethod::Card {
            return Err(LedgerError::InvalidState(format!(
                "Payment {payment_id} was paid in cash. Confirm the refund once the cash has been returned"
            )));
        }
        let payment = self.settle_refund(payment).await?;
        refund_outcome(payment)
    }

    /// Records that a cash refund was handed back to the customer.
    pub async fn confirm_manual_refund(
        &self,
        payment_id: &PaymentId,
        reference: &str,
        actor: &Actor,
    ) -> Result<RefundOutcome, LedgerError> {
        let payment = self.payments.get(payment_id).await?;
        if payment.method != PaymentMethod::Cod {
            return Err(LedgerError::InvalidState(format!(
                "Payment {payment_id} is a card payment. Card refunds are settled by the gateway"
            )));
        }
        let payment = self.payments.mark_refund_processed(payment_id, reference).await?;
        info!("💸️ Cash refund for payment {payment_id} confirmed by {actor} ({reference})");
        self.producers.publish_refund_issued(RefundIssuedEvent::new(payment.clone()));
        refund_outcome(payment)
    }

    /// Moves the money for a card refund that has not been processed yet and records the outcome on the payment.
    /// Gateway failures are recorded on the refund, not returned.
    async fn settle_refund(&self, payment: Payment) -> Result<Payment, LedgerError> {
        let refund = match &payment.refund {
            Some(r) if r.status != RefundStatus::Processed => r.clone(),
            _ => return Ok(payment),
        };
        if payment.method != PaymentMethod::Card {
            debug!("💸️ Cash refund for payment {} awaits manual confirmation", payment.payment_id);
            return Ok(payment);
        }
        let Some(charge_id) = payment.charge_id().map(String::from) else {
            let updated = self.payments.mark_refund_failed(&payment.payment_id, "No charge id on record").await?;
            return Ok(updated);
        };
        let request = RefundRequest {
            charge_id,
            amount: refund.amount,
            reason: refund.reason.clone(),
            idempotency_key: refund_idempotency_key(payment.payment_id.as_str(), refund.failed_attempts + 1),
        };
        let gateway = &self.gateway;
        let updated = match self.with_gateway_retries("issue_refund", || gateway.issue_refund(request.clone())).await {
            Ok(refund_ref) => {
                info!("💸️ Refund for payment {} processed ({refund_ref})", payment.payment_id);
                self.payments.mark_refund_processed(&payment.payment_id, &refund_ref).await?
            },
            Err(e) => {
                error!("💸️ Refund for payment {} failed: {e}. It can be retried.", payment.payment_id);
                self.payments.mark_refund_failed(&payment.payment_id, &e.to_string()).await?
            },
        };
        self.producers.publish_refund_issued(RefundIssuedEvent::new(updated.clone()));
        Ok(updated)
    }

    //------------------------------------------   Reconciliation   ---------------------------------------------------

    /// Fails card payments that have been `Processing` for longer than `max_age`, or that have used up
    /// `max_attempts`. The order's payment status is mirrored. Payments that cannot be failed are reported as skipped.
    ///
    /// A payment that only qualifies on its attempt count is left alone while its last attempt could still be waiting
    /// on the gateway (see [`Self::in_flight_window`]).
    pub async fn reconcile_stale_payments(
        &self,
        max_age: chrono::Duration,
        max_attempts: i64,
    ) -> Result<ReconciliationResult, LedgerError> {
        let now = Utc::now();
        let cutoff = now - max_age;
        let settled_before = now - self.in_flight_window();
        let stale = self.db.fetch_stale_payments(PaymentStatusType::Processing, cutoff, max_attempts).await?;
        let mut result = ReconciliationResult::default();
        for payment in stale {
            let last_attempt = payment.last_attempt_at.unwrap_or(payment.updated_at);
            if last_attempt >= cutoff && last_attempt >= settled_before {
                debug!("🕰️ Payment {} has used its attempts, but the last one may still be in flight", payment.payment_id);
                continue;
            }
            match self.payments.fail_payment(&payment.payment_id, "reconciliation timeout").await {
                Ok(failed) => {
                    self.mirror_payment_status(&failed.order_id, failed.status).await;
                    result.failed.push(failed);
                },
                Err(e) => {
                    warn!("🕰️ Could not reconcile payment {}: {e}", payment.payment_id);
                    result.skipped.push((payment.payment_id, payment.order_id, e.to_string()));
                },
            }
        }
        Ok(result)
    }

    //------------------------------------------   Helpers   ----------------------------------------------------------

    /// Copies the payment status onto the order. Failure is logged, not returned: the mirror is re-synced by the
    /// next coordinated step on this order.
    async fn mirror_payment_status(&self, order_id: &OrderId, status: PaymentStatusType) -> Option<Order> {
        match self.orders.sync_payment_status(order_id, status).await {
            Ok(order) => Some(order),
            Err(e) => {
                warn!("📦️ Could not mirror payment status {status} onto order {order_id}: {e}");
                None
            },
        }
    }

    /// How long a charge attempt can stay with the gateway: every try, each bounded by the gateway timeout.
    pub fn in_flight_window(&self) -> chrono::Duration {
        let tries = self.config.retry.max_gateway_retries.saturating_add(1);
        let window = self.config.gateway_timeout.saturating_mul(tries);
        chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::days(1))
    }

    fn publish_status_change(&self, outcome: &TransitionOutcome) {
        if !outcome.changed {
            return;
        }
        let history = &outcome.order.status_history;
        let old_status = history.iter().rev().nth(1).map(|e| e.status).unwrap_or(OrderStatusType::Pending);
        self.producers.publish_order_status_changed(OrderStatusChangedEvent::new(old_status, &outcome.order));
    }

    async fn with_gateway_retries<T, F, Fut>(&self, op: &str, mut f: F) -> Result<T, GatewayError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let policy = self.config.retry;
        let mut attempt = 0;
        loop {
            let result = tokio::time::timeout(self.config.gateway_timeout, f()).await.unwrap_or(Err(GatewayError::Timeout));
            match result {
                Err(e) if e.is_retryable() && attempt < policy.max_gateway_retries => {
                    warn!("💳️ Gateway {op} failed: {e}. Retrying ({})", attempt + 1);
                    policy.sleep(attempt).await;
                    attempt += 1;
                },
                result => return result,
            }
        }
    }
}

fn refund_outcome(payment: Payment) -> Result<RefundOutcome, LedgerError> {
    let id = payment.payment_id.clone();
    RefundOutcome::from_payment(payment).ok_or_else(|| LedgerError::InvalidState(format!("Payment {id} has no refund")))
}

/// Checks the cart and returns its total.
fn validate_cart(request: &CheckoutRequest) -> Result<Money, LedgerError> {
    if request.user_id.as_str().trim().is_empty() {
        return Err(LedgerError::CheckoutFailed("A user id is required".to_string()));
    }
    if request.line_items.is_empty() {
        return Err(LedgerError::CheckoutFailed("The cart is empty".to_string()));
    }
    if let Some(item) = request.line_items.iter().find(|i| i.quantity <= 0) {
        return Err(LedgerError::CheckoutFailed(format!("Invalid quantity {} for {}", item.quantity, item.product_id)));
    }
    if let Some(item) = request.line_items.iter().find(|i| i.unit_price.is_negative()) {
        return Err(LedgerError::CheckoutFailed(format!("Negative price for {}", item.product_id)));
    }
    let total = order_total(&request.line_items)
        .ok_or_else(|| LedgerError::CheckoutFailed("The order total is too large".to_string()))?;
    if let Some(expected) = request.expected_total {
        if expected != total {
            return Err(LedgerError::CheckoutFailed(format!("The cart total is {total}, not {expected}")));
        }
    }
    Ok(total)
}

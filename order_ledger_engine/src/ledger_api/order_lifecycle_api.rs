use std::fmt::Debug;

use chrono::Utc;
use log::*;

use crate::{
    db_types::{Order, OrderId, OrderStatusType, Payment, PaymentStatusType, UserId},
    ledger_api::{
        errors::LedgerError,
        order_objects::{OrderQueryFilter, OrderTransition, TransitionOutcome},
        payment_lifecycle_api::PaymentLifecycleApi,
        retry::RetryPolicy,
    },
    traits::{LedgerDatabase, LedgerDatabaseError},
};

/// `OrderLifecycleApi` owns every legal change to an [`Order`].
///
/// The allowed moves are
///
/// ```text
/// Pending → Processing → Shipped → Delivered
/// Pending | Processing | Shipped → Cancelled
/// ```
///
/// | From \ To  | Pending | Processing | Shipped | Delivered | Cancelled |
/// |------------|---------|------------|---------|-----------|-----------|
/// | Pending    | no-op   | ok         | Err     | Err       | ok (1)    |
/// | Processing | Err     | no-op      | ok      | Err       | ok (1)    |
/// | Shipped    | Err     | Err        | no-op   | ok        | ok (1)    |
/// | Delivered  | Err     | Err        | Err     | no-op     | Err       |
/// | Cancelled  | Err     | Err        | Err     | Err       | no-op (1) |
///
/// (1) If the linked payment has been collected, a full refund is initiated on it. Re-applying `Cancelled` re-runs
/// this check, so an interrupted cancellation can be completed by simply cancelling again.
pub struct OrderLifecycleApi<B> {
    db: B,
    payments: PaymentLifecycleApi<B>,
    policy: RetryPolicy,
}

impl<B> Debug for OrderLifecycleApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderLifecycleApi")
    }
}

impl<B: Clone> Clone for OrderLifecycleApi<B> {
    fn clone(&self) -> Self {
        Self { db: self.db.clone(), payments: self.payments.clone(), policy: self.policy }
    }
}

impl<B: Clone> OrderLifecycleApi<B> {
    pub fn new(db: B) -> Self {
        let payments = PaymentLifecycleApi::new(db.clone());
        Self { db, payments, policy: RetryPolicy::default() }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.payments = self.payments.with_policy(policy);
        self.policy = policy;
        self
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B> OrderLifecycleApi<B>
where B: LedgerDatabase
{
    pub async fn get(&self, order_id: &OrderId) -> Result<Order, LedgerError> {
        self.db.fetch_order(order_id).await?.ok_or_else(|| LedgerError::NotFound(format!("Order {order_id}")))
    }

    /// The user's orders, newest first, optionally restricted to one status.
    pub async fn list_by_user(
        &self,
        user_id: &UserId,
        status: Option<OrderStatusType>,
    ) -> Result<Vec<Order>, LedgerError> {
        let mut query = OrderQueryFilter::default().with_user_id(user_id.clone());
        if let Some(status) = status {
            query = query.with_status(status);
        }
        trace!("📦️ Listing orders: {query}");
        let orders = self.db.search_orders(query).await?;
        Ok(orders)
    }

    /// Moves the order to `transition.target`. See the type-level documentation for the rules.
    ///
    /// Rejected transitions leave the order untouched and are not recorded in its history.
    ///
    /// An unpinned transition that collides with another write is retried only while the order is still in the status
    /// it was first read in. If a competing writer moved the order on, the caller's decision was made against a status
    /// that no longer holds and the transition fails with [`LedgerError::Conflict`].
    pub async fn transition(
        &self,
        order_id: &OrderId,
        transition: OrderTransition,
    ) -> Result<TransitionOutcome, LedgerError> {
        let mut attempt = 0;
        let mut first_seen = None;
        loop {
            let order = self.get(order_id).await?;
            let target = transition.target;
            if order.status == target {
                trace!("📦️ Order {order_id} is already {target}");
                let refund_initiated = self.compensate_if_cancelled(&order, &transition).await?;
                return Ok(TransitionOutcome { order, changed: false, refund_initiated });
            }
            let seen = *first_seen.get_or_insert(order.status);
            if seen != order.status {
                info!("📦️ Order {order_id} moved from {seen} to {} concurrently. Rejecting {target} transition", order.status);
                return Err(LedgerError::Conflict(format!("Order {order_id}")));
            }
            if let Some(v) = transition.expected_version {
                if v != order.version {
                    info!("📦️ Order {order_id} is at version {}, not {v}. Rejecting {target} transition", order.version);
                    return Err(LedgerError::Conflict(format!("Order {order_id}")));
                }
            }
            if !order.status.can_transition_to(target) {
                return Err(LedgerError::invalid_transition(order.status, target));
            }
            let expected_version = order.version;
            let mut next = order;
            next.push_status(target, transition.note.clone(), transition.actor.clone());
            match self.db.update_order(&next, expected_version).await {
                Ok(stored) => {
                    info!("📦️ Order {order_id} moved to {target} (v{})", stored.version);
                    let refund_initiated = self.compensate_if_cancelled(&stored, &transition).await?;
                    return Ok(TransitionOutcome { order: stored, changed: true, refund_initiated });
                },
                Err(LedgerDatabaseError::VersionConflict { .. })
                    if transition.expected_version.is_none() && attempt < self.policy.max_conflict_retries =>
                {
                    debug!("📦️ Concurrent update on order {order_id}. Retrying ({})", attempt + 1);
                    self.policy.sleep(attempt).await;
                    attempt += 1;
                },
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Mirrors the linked payment's status onto the order. No history entry is written. Only the transaction
    /// coordinator should call this.
    pub async fn sync_payment_status(
        &self,
        order_id: &OrderId,
        payment_status: PaymentStatusType,
    ) -> Result<Order, LedgerError> {
        let mut attempt = 0;
        loop {
            let mut order = self.get(order_id).await?;
            if order.payment_status == payment_status {
                return Ok(order);
            }
            let expected_version = order.version;
            order.payment_status = payment_status;
            order.updated_at = Utc::now();
            match self.db.update_order(&order, expected_version).await {
                Ok(stored) => {
                    trace!("📦️ Order {order_id} payment status is now {payment_status}");
                    return Ok(stored);
                },
                Err(LedgerDatabaseError::VersionConflict { .. }) if attempt < self.policy.max_conflict_retries => {
                    self.policy.sleep(attempt).await;
                    attempt += 1;
                },
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// A cancelled order must not keep the customer's money. If the linked payment is `Completed`, a full refund is
    /// initiated. Returns the refunded payment if this call initiated the refund.
    async fn compensate_if_cancelled(
        &self,
        order: &Order,
        transition: &OrderTransition,
    ) -> Result<Option<Payment>, LedgerError> {
        if order.status != OrderStatusType::Cancelled {
            return Ok(None);
        }
        let payment = match self.db.fetch_payment_for_order(&order.order_id).await? {
            Some(p) if p.status == PaymentStatusType::Completed => p,
            _ => return Ok(None),
        };
        let actor = transition.actor.clone().unwrap_or_else(|| "system".to_string());
        let reason = transition.note.clone().unwrap_or_else(|| "Order cancelled".to_string());
        info!("📦️ Order {} was cancelled with payment {} collected. Initiating refund.", order.order_id, payment.payment_id);
        match self.payments.initiate_refund(&payment.payment_id, payment.amount, &reason, &actor).await {
            Ok(refunded) => Ok(Some(refunded)),
            Err(LedgerError::InvalidState(_)) => {
                // Someone else refunded it in the meantime
                let current = self.payments.get(&payment.payment_id).await?;
                if current.status == PaymentStatusType::Refunded {
                    Ok(None)
                } else {
                    Err(LedgerError::InvalidState(format!(
                        "Could not refund payment {} for cancelled order {}",
                        payment.payment_id, order.order_id
                    )))
                }
            },
            Err(e) => {
                error!(
                    "📦️ Order {} is cancelled but the refund for payment {} failed: {e}. Cancel again to retry.",
                    order.order_id, payment.payment_id
                );
                Err(e)
            },
        }
    }
}

use std::fmt::Debug;

use chrono::Utc;
use log::*;
use ol_common::Money;

use crate::{
    db_types::{
        Actor,
        CodDetails,
        OrderId,
        Payment,
        PaymentId,
        PaymentMethod,
        PaymentStatusType,
        Refund,
        RefundStatus,
    },
    helpers::{cod_receipt_number, mask_card_digits},
    ledger_api::{errors::LedgerError, retry::RetryPolicy},
    traits::{ChargeResult, LedgerDatabase, LedgerDatabaseError},
};

/// `PaymentLifecycleApi` owns every legal change to a [`Payment`].
///
/// Every operation re-reads the payment, validates the change against the payment status graph, applies it together
/// with exactly one history entry (refund sub-status updates excepted) and writes it back with a version
/// compare-and-swap. Version collisions are retried according to the [`RetryPolicy`].
pub struct PaymentLifecycleApi<B> {
    db: B,
    policy: RetryPolicy,
}

impl<B> Debug for PaymentLifecycleApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaymentLifecycleApi")
    }
}

impl<B: Clone> Clone for PaymentLifecycleApi<B> {
    fn clone(&self) -> Self {
        Self { db: self.db.clone(), policy: self.policy }
    }
}

impl<B> PaymentLifecycleApi<B> {
    pub fn new(db: B) -> Self {
        Self { db, policy: RetryPolicy::default() }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B> PaymentLifecycleApi<B>
where B: LedgerDatabase
{
    pub async fn get(&self, payment_id: &PaymentId) -> Result<Payment, LedgerError> {
        self.db.fetch_payment(payment_id).await?.ok_or_else(|| LedgerError::NotFound(format!("Payment {payment_id}")))
    }

    pub async fn get_for_order(&self, order_id: &OrderId) -> Result<Payment, LedgerError> {
        self.db
            .fetch_payment_for_order(order_id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(format!("Payment for order {order_id}")))
    }

    /// Moves a card payment to `Processing` ahead of a charge attempt, from `Pending` or (as a retry) `Failed`.
    /// The attempt counter and timestamp are stamped in the same write.
    pub async fn begin_card_payment(&self, payment_id: &PaymentId, charge_intent_ref: &str) -> Result<Payment, LedgerError> {
        self.modify(payment_id, |payment| {
            if payment.method != PaymentMethod::Card {
                return Err(LedgerError::InvalidState(format!("Payment {payment_id} is not a card payment")));
            }
            if !matches!(payment.status, PaymentStatusType::Pending | PaymentStatusType::Failed) {
                return Err(LedgerError::invalid_transition(payment.status, PaymentStatusType::Processing));
            }
            let now = Utc::now();
            payment.attempt_count += 1;
            payment.last_attempt_at = Some(now);
            payment.card.get_or_insert_with(Default::default).charge_intent_ref = Some(charge_intent_ref.to_string());
            let detail = format!("Charge attempt {} started ({charge_intent_ref})", payment.attempt_count);
            payment.push_status(PaymentStatusType::Processing, Some(detail));
            Ok(true)
        })
        .await
    }

    /// Takes a `Failed` card payment back to `Processing` because the gateway reported a charge for it after all, for
    /// instance when a sweep gave up on a charge that was still in flight. The charge must match the payment amount.
    /// The attempt counter is left alone: no new attempt was made.
    pub async fn reopen_for_late_charge(&self, payment_id: &PaymentId, charge: &ChargeResult) -> Result<Payment, LedgerError> {
        self.modify(payment_id, |payment| {
            if payment.method != PaymentMethod::Card {
                return Err(LedgerError::InvalidState(format!("Payment {payment_id} is not a card payment")));
            }
            if payment.status != PaymentStatusType::Failed {
                return Err(LedgerError::invalid_transition(payment.status, PaymentStatusType::Processing));
            }
            if charge.amount != payment.amount {
                return Err(LedgerError::InvalidState(format!(
                    "Late charge {} is for {}, but payment {payment_id} is for {}",
                    charge.charge_id, charge.amount, payment.amount
                )));
            }
            let detail = format!("Gateway reported charge {} after the payment was failed", charge.charge_id);
            payment.push_status(PaymentStatusType::Processing, Some(detail));
            Ok(true)
        })
        .await
    }

    /// Records a successful charge. Duplicate deliveries of the same charge are accepted and change nothing.
    pub async fn complete_card_payment(&self, payment_id: &PaymentId, charge: &ChargeResult) -> Result<Payment, LedgerError> {
        self.modify(payment_id, |payment| {
            if payment.method != PaymentMethod::Card {
                return Err(LedgerError::InvalidState(format!("Payment {payment_id} is not a card payment")));
            }
            if matches!(payment.status, PaymentStatusType::Completed | PaymentStatusType::Refunded) {
                return match payment.charge_id() {
                    Some(id) if id == charge.charge_id => {
                        debug!("💳️ Charge {} for payment {payment_id} was already recorded", charge.charge_id);
                        Ok(false)
                    },
                    other => Err(LedgerError::InvalidState(format!(
                        "Payment {payment_id} was already completed by charge {}",
                        other.unwrap_or("(unknown)")
                    ))),
                };
            }
            if payment.status != PaymentStatusType::Processing {
                return Err(LedgerError::invalid_transition(payment.status, PaymentStatusType::Completed));
            }
            if charge.amount != payment.amount {
                return Err(LedgerError::InvalidState(format!(
                    "Charge {} is for {}, but payment {payment_id} is for {}",
                    charge.charge_id, charge.amount, payment.amount
                )));
            }
            let card = payment.card.get_or_insert_with(Default::default);
            card.charge_id = Some(charge.charge_id.clone());
            card.receipt_ref = charge.receipt_ref.clone();
            card.card_brand = charge.card_brand.clone();
            card.card_last4 = mask_card_digits(charge.card_last4.as_deref());
            payment.push_status(PaymentStatusType::Completed, Some(format!("Charge {} captured", charge.charge_id)));
            Ok(true)
        })
        .await
    }

    /// Records cash collection for a COD payment. Only valid from `Pending`. A receipt number is generated.
    pub async fn complete_cod_payment(&self, payment_id: &PaymentId, collector: &str) -> Result<Payment, LedgerError> {
        self.modify(payment_id, |payment| {
            if payment.method != PaymentMethod::Cod {
                return Err(LedgerError::InvalidState(format!("Payment {payment_id} is not a cash-on-delivery payment")));
            }
            if !payment.status.can_collect_cash() {
                return Err(LedgerError::invalid_transition(payment.status, PaymentStatusType::Completed));
            }
            let collected_at = Utc::now();
            let receipt_number = cod_receipt_number(collected_at);
            let detail = format!("Cash collected by {collector}. Receipt {receipt_number}");
            payment.cod = Some(CodDetails { receipt_number, collected_by: collector.to_string(), collected_at });
            payment.push_status(PaymentStatusType::Completed, Some(detail));
            Ok(true)
        })
        .await
    }

    /// Marks a `Pending` or `Processing` payment as `Failed`. Failing an already failed payment is a no-op.
    pub async fn fail_payment(&self, payment_id: &PaymentId, reason: &str) -> Result<Payment, LedgerError> {
        self.modify(payment_id, |payment| {
            if payment.status == PaymentStatusType::Failed {
                return Ok(false);
            }
            if !payment.status.can_transition_to(PaymentStatusType::Failed) {
                return Err(LedgerError::invalid_transition(payment.status, PaymentStatusType::Failed));
            }
            payment.push_status(PaymentStatusType::Failed, Some(reason.to_string()));
            Ok(true)
        })
        .await
    }

    /// Attaches a refund to a completed payment and moves it to `Refunded`.
    ///
    /// The money has not moved yet when this returns: the refund starts out `Pending`, and
    /// [`Self::mark_refund_processed`] or [`Self::mark_refund_failed`] record the outcome later.
    pub async fn initiate_refund(
        &self,
        payment_id: &PaymentId,
        amount: Money,
        reason: &str,
        actor: &Actor,
    ) -> Result<Payment, LedgerError> {
        self.modify(payment_id, |payment| {
            if payment.status != PaymentStatusType::Completed {
                return Err(LedgerError::InvalidState(format!(
                    "Payment {payment_id} is {}. Only completed payments can be refunded",
                    payment.status
                )));
            }
            if !amount.is_positive() || amount > payment.amount {
                return Err(LedgerError::InvalidState(format!(
                    "Refund amount {amount} must be positive and at most the payment amount {}",
                    payment.amount
                )));
            }
            payment.refund = Some(Refund {
                amount,
                reason: reason.to_string(),
                status: RefundStatus::Pending,
                processed_by: actor.clone(),
                processed_at: None,
                gateway_refund_ref: None,
                failure_reason: None,
                failed_attempts: 0,
            });
            payment.push_status(PaymentStatusType::Refunded, Some(format!("Refund of {amount} initiated by {actor}: {reason}")));
            Ok(true)
        })
        .await
    }

    /// Records that the refunded money has reached the customer. Repeating the call with the same reference is a no-op.
    pub async fn mark_refund_processed(&self, payment_id: &PaymentId, refund_ref: &str) -> Result<Payment, LedgerError> {
        self.modify(payment_id, |payment| {
            let refund = payment
                .refund
                .as_mut()
                .ok_or_else(|| LedgerError::InvalidState(format!("Payment {payment_id} has no refund")))?;
            if refund.status == RefundStatus::Processed {
                return if refund.gateway_refund_ref.as_deref() == Some(refund_ref) {
                    Ok(false)
                } else {
                    Err(LedgerError::InvalidState(format!("The refund for payment {payment_id} was already processed")))
                };
            }
            refund.status = RefundStatus::Processed;
            refund.processed_at = Some(Utc::now());
            refund.gateway_refund_ref = Some(refund_ref.to_string());
            refund.failure_reason = None;
            Ok(true)
        })
        .await
    }

    /// Records that moving the refunded money failed. The payment stays `Refunded`; the refund can be retried.
    pub async fn mark_refund_failed(&self, payment_id: &PaymentId, reason: &str) -> Result<Payment, LedgerError> {
        self.modify(payment_id, |payment| {
            let refund = payment
                .refund
                .as_mut()
                .ok_or_else(|| LedgerError::InvalidState(format!("Payment {payment_id} has no refund")))?;
            if refund.status == RefundStatus::Processed {
                return Err(LedgerError::InvalidState(format!("The refund for payment {payment_id} was already processed")));
            }
            refund.status = RefundStatus::Failed;
            refund.failure_reason = Some(reason.to_string());
            refund.failed_attempts += 1;
            Ok(true)
        })
        .await
    }

    /// Read, apply `f`, compare-and-swap. `f` returns `Ok(false)` when the payment is already in the requested state,
    /// in which case nothing is written.
    async fn modify<F>(&self, payment_id: &PaymentId, mut f: F) -> Result<Payment, LedgerError>
    where F: FnMut(&mut Payment) -> Result<bool, LedgerError> {
        let mut attempt = 0;
        loop {
            let mut payment = self.get(payment_id).await?;
            let expected_version = payment.version;
            if !f(&mut payment)? {
                return Ok(payment);
            }
            payment.updated_at = Utc::now();
            match self.db.update_payment(&payment, expected_version).await {
                Ok(stored) => {
                    debug!("💳️ Payment {payment_id} is now {} (v{})", stored.status, stored.version);
                    return Ok(stored);
                },
                Err(LedgerDatabaseError::VersionConflict { .. }) if attempt < self.policy.max_conflict_retries => {
                    debug!("💳️ Concurrent update on payment {payment_id}. Retrying ({})", attempt + 1);
                    self.policy.sleep(attempt).await;
                    attempt += 1;
                },
                Err(e) => return Err(e.into()),
            }
        }
    }
}

use chrono::{DateTime, Utc};
use log::*;
use thiserror::Error;

use crate::{
    db_types::{NewOrder, NewPayment, Order, OrderId, OrderStatusType, Payment, PaymentId, PaymentStatusType},
    ledger_api::order_objects::OrderQueryFilter,
};

#[derive(Debug, Clone, Error)]
pub enum LedgerDatabaseError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Order {0} already exists")]
    OrderAlreadyExists(OrderId),
    #[error("A payment for order {0} already exists")]
    PaymentAlreadyExists(OrderId),
    #[error("Order {0} does not exist")]
    OrderNotFound(OrderId),
    #[error("Payment {0} does not exist")]
    PaymentNotFound(PaymentId),
    #[error("Stale write for {id}. Expected version {expected}, but the stored version is {actual}")]
    VersionConflict { id: String, expected: i64, actual: i64 },
    #[error("Could not (de)serialize a stored document: {0}")]
    SerializationError(String),
}

impl From<sqlx::Error> for LedgerDatabaseError {
    fn from(e: sqlx::Error) -> Self {
        LedgerDatabaseError::DatabaseError(e.to_string())
    }
}

impl From<serde_json::Error> for LedgerDatabaseError {
    fn from(e: serde_json::Error) -> Self {
        LedgerDatabaseError::SerializationError(e.to_string())
    }
}

/// The Ledger Store contract.
///
/// Orders and payments are stored as whole documents. Every write after creation is a compare-and-swap on the
/// document `version`: the write succeeds only if the stored version equals `expected_version`, in which case the
/// stored version becomes `expected_version + 1`. Backends never cache documents between calls.
#[allow(async_fn_in_trait)]
pub trait LedgerDatabase: Clone {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Creates an order and its payment together.
    ///
    /// The default implementation is a saga: the order is inserted first, then the payment. If the payment insert
    /// fails, the freshly created order is moved to `Cancelled` with an explanatory note before the error is
    /// returned, so no live order is ever left without a payment. Backends with multi-row transactions should
    /// override this with a single atomic write.
    async fn insert_checkout(
        &self,
        order: NewOrder,
        payment: NewPayment,
    ) -> Result<(Order, Payment), LedgerDatabaseError> {
        let order = self.insert_order(order).await?;
        match self.insert_payment(payment).await {
            Ok(payment) => Ok((order, payment)),
            Err(e) => {
                warn!("🗃️ Payment insert for order {} failed: {e}. Compensating by cancelling the order.", order.order_id);
                let mut compensated = order.clone();
                let version = compensated.version;
                compensated.push_status(
                    OrderStatusType::Cancelled,
                    Some(format!("Checkout aborted: {e}")),
                    Some("system".to_string()),
                );
                if let Err(e2) = self.update_order(&compensated, version).await {
                    error!("🗃️ Could not compensate order {}: {e2}. Manual intervention is required.", order.order_id);
                }
                Err(e)
            },
        }
    }

    /// Inserts a new order. Fails with [`LedgerDatabaseError::OrderAlreadyExists`] if the id is taken.
    async fn insert_order(&self, order: NewOrder) -> Result<Order, LedgerDatabaseError>;

    /// Inserts a new payment. Fails with [`LedgerDatabaseError::PaymentAlreadyExists`] if the order already has one.
    async fn insert_payment(&self, payment: NewPayment) -> Result<Payment, LedgerDatabaseError>;

    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, LedgerDatabaseError>;

    async fn fetch_payment(&self, payment_id: &PaymentId) -> Result<Option<Payment>, LedgerDatabaseError>;

    async fn fetch_payment_for_order(&self, order_id: &OrderId) -> Result<Option<Payment>, LedgerDatabaseError>;

    /// Persists the whole order document if, and only if, the stored version is `expected_version`.
    /// Returns the stored document with its new version.
    async fn update_order(&self, order: &Order, expected_version: i64) -> Result<Order, LedgerDatabaseError>;

    /// Persists the whole payment document if, and only if, the stored version is `expected_version`.
    /// Returns the stored document with its new version.
    async fn update_payment(&self, payment: &Payment, expected_version: i64) -> Result<Payment, LedgerDatabaseError>;

    /// Orders matching the filter, newest first.
    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, LedgerDatabaseError>;

    /// Payments in `status` whose last attempt is older than `older_than`, or that have been attempted at least
    /// `max_attempts` times.
    async fn fetch_stale_payments(
        &self,
        status: PaymentStatusType,
        older_than: DateTime<Utc>,
        max_attempts: i64,
    ) -> Result<Vec<Payment>, LedgerDatabaseError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), LedgerDatabaseError> {
        Ok(())
    }
}

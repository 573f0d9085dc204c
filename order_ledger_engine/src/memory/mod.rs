//! In-memory Ledger Store.
//!
//! `MemoryDatabase` keeps orders and payments in process memory. It enforces exactly the same rules as the SQLite
//! backend (unique ids, one payment per order, version compare-and-swap), which makes it a faithful stand-in for tests
//! and for embedding the engine without persistence. Checkout uses the saga provided by [`LedgerDatabase`].
use std::{
    collections::HashMap,
    fmt::Debug,
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use chrono::{DateTime, Utc};
use log::*;

use crate::{
    db_types::{NewOrder, NewPayment, Order, OrderId, Payment, PaymentId, PaymentStatusType},
    ledger_api::order_objects::OrderQueryFilter,
    traits::{LedgerDatabase, LedgerDatabaseError},
};

#[derive(Default)]
struct Tables {
    orders: HashMap<OrderId, Order>,
    payments: HashMap<PaymentId, Payment>,
    payment_by_order: HashMap<OrderId, PaymentId>,
}

#[derive(Clone, Default)]
pub struct MemoryDatabase {
    tables: Arc<RwLock<Tables>>,
}

impl Debug for MemoryDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MemoryDatabase")
    }
}

fn poisoned<T>(_: T) -> LedgerDatabaseError {
    LedgerDatabaseError::DatabaseError("In-memory store lock is poisoned".to_string())
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, LedgerDatabaseError> {
        self.tables.read().map_err(poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, LedgerDatabaseError> {
        self.tables.write().map_err(poisoned)
    }

    pub fn order_count(&self) -> usize {
        self.read().map(|t| t.orders.len()).unwrap_or_default()
    }

    pub fn payment_count(&self) -> usize {
        self.read().map(|t| t.payments.len()).unwrap_or_default()
    }
}

impl LedgerDatabase for MemoryDatabase {
    fn url(&self) -> &str {
        "memory://"
    }

    async fn insert_order(&self, order: NewOrder) -> Result<Order, LedgerDatabaseError> {
        let mut tables = self.write()?;
        if tables.orders.contains_key(&order.order_id) {
            return Err(LedgerDatabaseError::OrderAlreadyExists(order.order_id));
        }
        let order = order.into_order();
        tables.orders.insert(order.order_id.clone(), order.clone());
        debug!("🧠️ Order [{}] inserted", order.order_id);
        Ok(order)
    }

    async fn insert_payment(&self, payment: NewPayment) -> Result<Payment, LedgerDatabaseError> {
        let mut tables = self.write()?;
        if !tables.orders.contains_key(&payment.order_id) {
            return Err(LedgerDatabaseError::OrderNotFound(payment.order_id));
        }
        if tables.payment_by_order.contains_key(&payment.order_id) || tables.payments.contains_key(&payment.payment_id)
        {
            return Err(LedgerDatabaseError::PaymentAlreadyExists(payment.order_id));
        }
        let payment = payment.into_payment();
        tables.payment_by_order.insert(payment.order_id.clone(), payment.payment_id.clone());
        tables.payments.insert(payment.payment_id.clone(), payment.clone());
        debug!("🧠️ Payment [{}] for order [{}] inserted", payment.payment_id, payment.order_id);
        Ok(payment)
    }

    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, LedgerDatabaseError> {
        Ok(self.read()?.orders.get(order_id).cloned())
    }

    async fn fetch_payment(&self, payment_id: &PaymentId) -> Result<Option<Payment>, LedgerDatabaseError> {
        Ok(self.read()?.payments.get(payment_id).cloned())
    }

    async fn fetch_payment_for_order(&self, order_id: &OrderId) -> Result<Option<Payment>, LedgerDatabaseError> {
        let tables = self.read()?;
        Ok(tables.payment_by_order.get(order_id).and_then(|id| tables.payments.get(id)).cloned())
    }

    async fn update_order(&self, order: &Order, expected_version: i64) -> Result<Order, LedgerDatabaseError> {
        let mut tables = self.write()?;
        let stored = tables
            .orders
            .get_mut(&order.order_id)
            .ok_or_else(|| LedgerDatabaseError::OrderNotFound(order.order_id.clone()))?;
        if stored.version != expected_version {
            return Err(LedgerDatabaseError::VersionConflict {
                id: order.order_id.to_string(),
                expected: expected_version,
                actual: stored.version,
            });
        }
        // Only the mutable parts of the document are taken from the caller
        stored.status = order.status;
        stored.payment_status = order.payment_status;
        stored.status_history = order.status_history.clone();
        stored.updated_at = order.updated_at;
        stored.version = expected_version + 1;
        trace!("🧠️ Order [{}] updated to version {}", stored.order_id, stored.version);
        Ok(stored.clone())
    }

    async fn update_payment(&self, payment: &Payment, expected_version: i64) -> Result<Payment, LedgerDatabaseError> {
        let mut tables = self.write()?;
        let stored = tables
            .payments
            .get_mut(&payment.payment_id)
            .ok_or_else(|| LedgerDatabaseError::PaymentNotFound(payment.payment_id.clone()))?;
        if stored.version != expected_version {
            return Err(LedgerDatabaseError::VersionConflict {
                id: payment.payment_id.to_string(),
                expected: expected_version,
                actual: stored.version,
            });
        }
        stored.status = payment.status;
        stored.card = payment.card.clone();
        stored.cod = payment.cod.clone();
        stored.refund = payment.refund.clone();
        stored.status_history = payment.status_history.clone();
        stored.attempt_count = payment.attempt_count;
        stored.last_attempt_at = payment.last_attempt_at;
        stored.updated_at = payment.updated_at;
        stored.version = expected_version + 1;
        trace!("🧠️ Payment [{}] updated to version {}", stored.payment_id, stored.version);
        Ok(stored.clone())
    }

    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, LedgerDatabaseError> {
        let tables = self.read()?;
        let mut orders = tables.orders.values().filter(|o| query.matches(o)).cloned().collect::<Vec<Order>>();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn fetch_stale_payments(
        &self,
        status: PaymentStatusType,
        older_than: DateTime<Utc>,
        max_attempts: i64,
    ) -> Result<Vec<Payment>, LedgerDatabaseError> {
        let tables = self.read()?;
        let mut payments = tables
            .payments
            .values()
            .filter(|p| {
                p.status == status &&
                    (p.last_attempt_at.unwrap_or(p.updated_at) < older_than || p.attempt_count >= max_attempts)
            })
            .cloned()
            .collect::<Vec<Payment>>();
        payments.sort_by(|a, b| a.updated_at.cmp(&b.updated_at));
        Ok(payments)
    }
}

//! `SqliteDatabase` is the production Ledger Store.
//!
//! It implements [`LedgerDatabase`] on top of a SQLite connection pool. Checkout creates the order and its payment in
//! one SQL transaction, so the saga fallback in the trait is never needed here.
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use sqlx::SqlitePool;

use super::db::{db_url, new_pool, orders, payments};
use crate::{
    db_types::{NewOrder, NewPayment, Order, OrderId, Payment, PaymentId, PaymentStatusType},
    ledger_api::order_objects::OrderQueryFilter,
    traits::{LedgerDatabase, LedgerDatabaseError},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl LedgerDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_checkout(
        &self,
        order: NewOrder,
        payment: NewPayment,
    ) -> Result<(Order, Payment), LedgerDatabaseError> {
        let mut tx = self.pool.begin().await?;
        let order = orders::insert_order(order, &mut tx).await?;
        let payment = payments::insert_payment(payment, &mut tx).await?;
        tx.commit().await?;
        debug!("🗃️ Checkout for order [{}] with payment [{}] committed", order.order_id, payment.payment_id);
        Ok((order, payment))
    }

    async fn insert_order(&self, order: NewOrder) -> Result<Order, LedgerDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        orders::insert_order(order, &mut conn).await
    }

    async fn insert_payment(&self, payment: NewPayment) -> Result<Payment, LedgerDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        payments::insert_payment(payment, &mut conn).await
    }

    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, LedgerDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_order(order_id, &mut conn).await
    }

    async fn fetch_payment(&self, payment_id: &PaymentId) -> Result<Option<Payment>, LedgerDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        payments::fetch_payment(payment_id, &mut conn).await
    }

    async fn fetch_payment_for_order(&self, order_id: &OrderId) -> Result<Option<Payment>, LedgerDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        payments::fetch_payment_for_order(order_id, &mut conn).await
    }

    async fn update_order(&self, order: &Order, expected_version: i64) -> Result<Order, LedgerDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        orders::update_order(order, expected_version, &mut conn).await
    }

    async fn update_payment(&self, payment: &Payment, expected_version: i64) -> Result<Payment, LedgerDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        payments::update_payment(payment, expected_version, &mut conn).await
    }

    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, LedgerDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        orders::search_orders(query, &mut conn).await
    }

    async fn fetch_stale_payments(
        &self,
        status: PaymentStatusType,
        older_than: DateTime<Utc>,
        max_attempts: i64,
    ) -> Result<Vec<Payment>, LedgerDatabaseError> {
        let mut conn = self.pool.acquire().await?;
        payments::fetch_stale_payments(status, older_than, max_attempts, &mut conn).await
    }

    async fn close(&mut self) -> Result<(), LedgerDatabaseError> {
        self.pool.close().await;
        Ok(())
    }
}

impl SqliteDatabase {
    /// Creates a new database API object, using `OLS_DATABASE_URL` or the default location.
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Brings the schema up to date. Safe to call on every start-up.
    pub async fn run_migrations(&self) -> Result<(), LedgerDatabaseError> {
        sqlx::migrate!("./src/sqlite/migrations")
            .run(&self.pool)
            .await
            .map_err(|e| LedgerDatabaseError::DatabaseError(format!("Migration failed: {e}")))?;
        info!("🗃️ Database migrations complete");
        Ok(())
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

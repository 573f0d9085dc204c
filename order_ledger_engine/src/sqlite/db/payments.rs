use chrono::{DateTime, Utc};
use log::{debug, trace};
use ol_common::Money;
use sqlx::{FromRow, SqliteConnection};

use crate::{
    db_types::{NewPayment, OrderId, Payment, PaymentId, PaymentStatusType},
    traits::LedgerDatabaseError,
};

#[derive(Debug, Clone, FromRow)]
pub struct PaymentRow {
    pub payment_id: String,
    pub order_id: String,
    pub user_id: String,
    pub amount: i64,
    pub currency: String,
    pub method: String,
    pub status: String,
    pub card: Option<String>,
    pub cod: Option<String>,
    pub refund: Option<String>,
    pub status_history: String,
    pub attempt_count: i64,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn from_json_opt<T: serde::de::DeserializeOwned>(s: Option<String>) -> Result<Option<T>, LedgerDatabaseError> {
    s.map(|s| serde_json::from_str(&s)).transpose().map_err(LedgerDatabaseError::from)
}

fn to_json_opt<T: serde::Serialize>(v: Option<&T>) -> Result<Option<String>, LedgerDatabaseError> {
    v.map(serde_json::to_string).transpose().map_err(LedgerDatabaseError::from)
}

impl TryFrom<PaymentRow> for Payment {
    type Error = LedgerDatabaseError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        let parse_err = |e: crate::db_types::ConversionError| LedgerDatabaseError::SerializationError(e.to_string());
        Ok(Payment {
            payment_id: PaymentId::from(row.payment_id),
            order_id: OrderId::from(row.order_id),
            user_id: row.user_id.into(),
            amount: Money::from(row.amount),
            currency: row.currency,
            method: row.method.parse().map_err(parse_err)?,
            status: row.status.parse().map_err(parse_err)?,
            card: from_json_opt(row.card)?,
            cod: from_json_opt(row.cod)?,
            refund: from_json_opt(row.refund)?,
            status_history: serde_json::from_str(&row.status_history)?,
            attempt_count: row.attempt_count,
            last_attempt_at: row.last_attempt_at,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Inserts a new payment. The `order_id` column is unique, so a second payment for the same order fails with
/// [`LedgerDatabaseError::PaymentAlreadyExists`].
pub async fn insert_payment(payment: NewPayment, conn: &mut SqliteConnection) -> Result<Payment, LedgerDatabaseError> {
    let order_id = payment.order_id.clone();
    let payment = payment.into_payment();
    let row: PaymentRow = sqlx::query_as(
        r#"
            INSERT INTO payments (
                payment_id,
                order_id,
                user_id,
                amount,
                currency,
                method,
                status,
                card,
                cod,
                refund,
                status_history,
                attempt_count,
                last_attempt_at,
                version,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING *;
        "#,
    )
    .bind(payment.payment_id.as_str())
    .bind(payment.order_id.as_str())
    .bind(payment.user_id.as_str())
    .bind(payment.amount.value())
    .bind(&payment.currency)
    .bind(payment.method.to_string())
    .bind(payment.status.to_string())
    .bind(to_json_opt(payment.card.as_ref())?)
    .bind(to_json_opt(payment.cod.as_ref())?)
    .bind(to_json_opt(payment.refund.as_ref())?)
    .bind(serde_json::to_string(&payment.status_history)?)
    .bind(payment.attempt_count)
    .bind(payment.last_attempt_at)
    .bind(payment.version)
    .bind(payment.created_at)
    .bind(payment.updated_at)
    .fetch_one(conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(ref de) if de.is_unique_violation() => {
            LedgerDatabaseError::PaymentAlreadyExists(order_id.clone())
        },
        sqlx::Error::Database(ref de) if de.is_foreign_key_violation() => {
            LedgerDatabaseError::OrderNotFound(order_id.clone())
        },
        e => e.into(),
    })?;
    debug!("💳️ Payment [{}] for order [{}] inserted", row.payment_id, row.order_id);
    row.try_into()
}

pub async fn fetch_payment(
    payment_id: &PaymentId,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, LedgerDatabaseError> {
    let row: Option<PaymentRow> = sqlx::query_as("SELECT * FROM payments WHERE payment_id = $1")
        .bind(payment_id.as_str())
        .fetch_optional(conn)
        .await?;
    row.map(Payment::try_from).transpose()
}

pub async fn fetch_payment_for_order(
    order_id: &OrderId,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, LedgerDatabaseError> {
    let row: Option<PaymentRow> = sqlx::query_as("SELECT * FROM payments WHERE order_id = $1")
        .bind(order_id.as_str())
        .fetch_optional(conn)
        .await?;
    row.map(Payment::try_from).transpose()
}

/// Writes the whole payment document if the stored version is still `expected_version`.
pub async fn update_payment(
    payment: &Payment,
    expected_version: i64,
    conn: &mut SqliteConnection,
) -> Result<Payment, LedgerDatabaseError> {
    let row: Option<PaymentRow> = sqlx::query_as(
        r#"
            UPDATE payments SET
                status = $1,
                card = $2,
                cod = $3,
                refund = $4,
                status_history = $5,
                attempt_count = $6,
                last_attempt_at = $7,
                updated_at = $8,
                version = version + 1
            WHERE payment_id = $9 AND version = $10
            RETURNING *;
        "#,
    )
    .bind(payment.status.to_string())
    .bind(to_json_opt(payment.card.as_ref())?)
    .bind(to_json_opt(payment.cod.as_ref())?)
    .bind(to_json_opt(payment.refund.as_ref())?)
    .bind(serde_json::to_string(&payment.status_history)?)
    .bind(payment.attempt_count)
    .bind(payment.last_attempt_at)
    .bind(payment.updated_at)
    .bind(payment.payment_id.as_str())
    .bind(expected_version)
    .fetch_optional(&mut *conn)
    .await?;
    match row {
        Some(row) => {
            trace!("💳️ Payment [{}] updated to version {}", row.payment_id, row.version);
            row.try_into()
        },
        None => match fetch_payment(&payment.payment_id, conn).await? {
            None => Err(LedgerDatabaseError::PaymentNotFound(payment.payment_id.clone())),
            Some(current) => Err(LedgerDatabaseError::VersionConflict {
                id: payment.payment_id.to_string(),
                expected: expected_version,
                actual: current.version,
            }),
        },
    }
}

/// Payments in `status` that were last attempted before `older_than`, or that have used up their attempts.
pub async fn fetch_stale_payments(
    status: PaymentStatusType,
    older_than: DateTime<Utc>,
    max_attempts: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<Payment>, LedgerDatabaseError> {
    let rows: Vec<PaymentRow> = sqlx::query_as(
        r#"
            SELECT * FROM payments
            WHERE status = $1 AND (COALESCE(last_attempt_at, updated_at) < $2 OR attempt_count >= $3)
            ORDER BY updated_at ASC
        "#,
    )
    .bind(status.to_string())
    .bind(older_than)
    .bind(max_attempts)
    .fetch_all(conn)
    .await?;
    trace!("💳️ {} stale {status} payments found", rows.len());
    rows.into_iter().map(Payment::try_from).collect()
}

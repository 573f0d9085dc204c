use chrono::{DateTime, Utc};
use log::{debug, trace};
use ol_common::Money;
use sqlx::{FromRow, QueryBuilder, SqliteConnection};

use crate::{
    db_types::{NewOrder, Order, OrderId},
    ledger_api::order_objects::OrderQueryFilter,
    traits::LedgerDatabaseError,
};

/// The storage shape of an order. Embedded collections are JSON text and enums are their display names.
#[derive(Debug, Clone, FromRow)]
pub struct OrderRow {
    pub order_id: String,
    pub user_id: String,
    pub line_items: String,
    pub subtotal: i64,
    pub total: i64,
    pub currency: String,
    pub shipping_address: String,
    pub status: String,
    pub payment_status: String,
    pub status_history: String,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = LedgerDatabaseError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let parse_err = |e: crate::db_types::ConversionError| LedgerDatabaseError::SerializationError(e.to_string());
        Ok(Order {
            order_id: OrderId::from(row.order_id),
            user_id: row.user_id.into(),
            line_items: serde_json::from_str(&row.line_items)?,
            subtotal: Money::from(row.subtotal),
            total: Money::from(row.total),
            currency: row.currency,
            shipping_address: serde_json::from_str(&row.shipping_address)?,
            status: row.status.parse().map_err(parse_err)?,
            payment_status: row.payment_status.parse().map_err(parse_err)?,
            status_history: serde_json::from_str(&row.status_history)?,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Inserts a new order using the given connection. This is not atomic. You can embed this call inside a transaction
/// if you need to ensure atomicity, and pass `&mut *tx` as the connection argument.
pub async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, LedgerDatabaseError> {
    let order_id = order.order_id.clone();
    let order = order.into_order();
    let row: OrderRow = sqlx::query_as(
        r#"
            INSERT INTO orders (
                order_id,
                user_id,
                line_items,
                subtotal,
                total,
                currency,
                shipping_address,
                status,
                payment_status,
                status_history,
                version,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING *;
        "#,
    )
    .bind(order.order_id.as_str())
    .bind(order.user_id.as_str())
    .bind(serde_json::to_string(&order.line_items)?)
    .bind(order.subtotal.value())
    .bind(order.total.value())
    .bind(&order.currency)
    .bind(serde_json::to_string(&order.shipping_address)?)
    .bind(order.status.to_string())
    .bind(order.payment_status.to_string())
    .bind(serde_json::to_string(&order.status_history)?)
    .bind(order.version)
    .bind(order.created_at)
    .bind(order.updated_at)
    .fetch_one(conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(ref de) if de.is_unique_violation() => LedgerDatabaseError::OrderAlreadyExists(order_id),
        e => e.into(),
    })?;
    debug!("📝️ Order [{}] inserted", row.order_id);
    row.try_into()
}

pub async fn fetch_order(order_id: &OrderId, conn: &mut SqliteConnection) -> Result<Option<Order>, LedgerDatabaseError> {
    let row: Option<OrderRow> =
        sqlx::query_as("SELECT * FROM orders WHERE order_id = $1").bind(order_id.as_str()).fetch_optional(conn).await?;
    row.map(Order::try_from).transpose()
}

/// Writes the whole order document if the stored version is still `expected_version`.
pub async fn update_order(
    order: &Order,
    expected_version: i64,
    conn: &mut SqliteConnection,
) -> Result<Order, LedgerDatabaseError> {
    let row: Option<OrderRow> = sqlx::query_as(
        r#"
            UPDATE orders SET
                status = $1,
                payment_status = $2,
                status_history = $3,
                updated_at = $4,
                version = version + 1
            WHERE order_id = $5 AND version = $6
            RETURNING *;
        "#,
    )
    .bind(order.status.to_string())
    .bind(order.payment_status.to_string())
    .bind(serde_json::to_string(&order.status_history)?)
    .bind(order.updated_at)
    .bind(order.order_id.as_str())
    .bind(expected_version)
    .fetch_optional(&mut *conn)
    .await?;
    match row {
        Some(row) => {
            trace!("📝️ Order [{}] updated to version {}", row.order_id, row.version);
            row.try_into()
        },
        None => {
            let current = fetch_order(&order.order_id, conn).await?;
            match current {
                None => Err(LedgerDatabaseError::OrderNotFound(order.order_id.clone())),
                Some(current) => Err(LedgerDatabaseError::VersionConflict {
                    id: order.order_id.to_string(),
                    expected: expected_version,
                    actual: current.version,
                }),
            }
        },
    }
}

/// Fetches orders according to criteria specified in the `OrderQueryFilter`
///
/// Resulting orders are ordered by `created_at`, newest first.
pub async fn search_orders(query: OrderQueryFilter, conn: &mut SqliteConnection) -> Result<Vec<Order>, LedgerDatabaseError> {
    let OrderQueryFilter { user_id, since, until, status } = query;
    let status = status.filter(|s| !s.is_empty());
    let mut builder = QueryBuilder::new("SELECT * FROM orders ");
    if user_id.is_some() || status.is_some() || since.is_some() || until.is_some() {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(user_id) = user_id {
        where_clause.push("user_id = ");
        where_clause.push_bind_unseparated(user_id.0);
    }
    if let Some(statuses) = status {
        where_clause.push("status IN (");
        for (i, status) in statuses.iter().enumerate() {
            if i > 0 {
                where_clause.push_unseparated(", ");
            }
            where_clause.push_bind_unseparated(status.to_string());
        }
        where_clause.push_unseparated(")");
    }
    if let Some(since) = since {
        where_clause.push("created_at >= ");
        where_clause.push_bind_unseparated(since);
    }
    if let Some(until) = until {
        where_clause.push("created_at <= ");
        where_clause.push_bind_unseparated(until);
    }
    builder.push(" ORDER BY created_at DESC");

    trace!("📝️ Executing query: {}", builder.sql());
    let rows = builder.build_query_as::<OrderRow>().fetch_all(conn).await?;
    trace!("📝️ Result of search_orders: {:?}", rows.len());
    rows.into_iter().map(Order::try_from).collect()
}

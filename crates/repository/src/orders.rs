use async_trait::async_trait;
use chrono::{DateTime, Utc};
use model::{NewOrder, Order, OrderId, OrderStatus};
use tokio_postgres::{Client, Row, Transaction};

use crate::RepositoryError;

const ORDER_COLUMNS: &str = "id, telegram_id, telegram_username, name, recipient_name, contact_type, \
                             contact_value, latitude, longitude, address_text, delivery_date, delivery_time, \
                             card_text, is_anonymous, items_total, delivery_cost, total, status, created_at";

/// # OrdersRepository
///
/// Repository interface for the `orders` table.
///
/// Orders are the main aggregates of the shop; their items live in
/// `order_items` and are handled by [`crate::ItemsRepository`].
#[async_trait]
pub trait OrdersRepository: Send + Sync {
    /// Insert an order row in a transaction and return its id.
    ///
    /// Returns `None` when the requester already used the order's idempotency key.
    async fn insert_tx(&self, tx: &Transaction<'_>, order: &NewOrder) -> Result<Option<OrderId>, RepositoryError>;

    /// The requester's order stored under `key`, without its items.
    async fn find_by_idempotency_key(&self, db: &Client, telegram_id: i64, key: &str) -> Result<Order, RepositoryError>;

    /// Orders of a Telegram user without their items, most recent first.
    async fn list_by_telegram_id(&self, db: &Client, telegram_id: i64) -> Result<Vec<Order>, RepositoryError>;

    async fn get_status(&self, db: &Client, order_id: OrderId) -> Result<OrderStatus, RepositoryError>;

    /// Returns the number of updated rows.
    async fn update_status(
        &self,
        db: &Client,
        order_id: OrderId,
        expected: Option<OrderStatus>,
        status: OrderStatus,
    ) -> Result<u64, RepositoryError>;
}

/// PostgreSQL implementation of the OrdersRepository trait.
#[derive(Debug, Default, Clone, Copy)]
pub struct PgOrdersRepository;

impl PgOrdersRepository {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl OrdersRepository for PgOrdersRepository {
    async fn insert_tx(&self, tx: &Transaction<'_>, order: &NewOrder) -> Result<Option<OrderId>, RepositoryError> {
        let query = r#"
            INSERT INTO orders (
                telegram_id, telegram_username, name, recipient_name, contact_type, contact_value,
                latitude, longitude, address_text, delivery_date, delivery_time, card_text,
                is_anonymous, items_total, delivery_cost, total, idempotency_key
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17)
            ON CONFLICT (telegram_id, idempotency_key) DO NOTHING
            RETURNING id
        "#;
        let row = tx
            .query_opt(query, &[
                &order.telegram_id,
                &order.telegram_username,
                &order.name,
                &order.recipient_name,
                &order.contact_type.as_str(),
                &order.contact_value,
                &order.latitude,
                &order.longitude,
                &order.address_text,
                &order.delivery_date,
                &order.delivery_time,
                &order.card_text,
                &order.is_anonymous,
                &order.items_total,
                &order.delivery_cost,
                &order.total,
                &order.idempotency_key,
            ])
            .await?;
        Ok(row.map(|row| row.get("id")))
    }

    async fn find_by_idempotency_key(&self, db: &Client, telegram_id: i64, key: &str) -> Result<Order, RepositoryError> {
        let query = format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE telegram_id = $1 AND idempotency_key = $2"
        );
        match db.query_opt(&query, &[&telegram_id, &key]).await? {
            Some(row) => order_from_row(&row),
            None => Err(RepositoryError::NotFound),
        }
    }

    async fn list_by_telegram_id(&self, db: &Client, telegram_id: i64) -> Result<Vec<Order>, RepositoryError> {
        let query = format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE telegram_id = $1 ORDER BY created_at DESC, id DESC"
        );
        let rows = db.query(&query, &[&telegram_id]).await?;
        rows.iter().map(order_from_row).collect()
    }

    async fn get_status(&self, db: &Client, order_id: OrderId) -> Result<OrderStatus, RepositoryError> {
        let row = db
            .query_opt("SELECT status FROM orders WHERE id = $1", &[&order_id])
            .await?;
        match row {
            Some(row) => parse_column(row.try_get("status")?),
            None => Err(RepositoryError::NotFound),
        }
    }

    async fn update_status(
        &self,
        db: &Client,
        order_id: OrderId,
        expected: Option<OrderStatus>,
        status: OrderStatus,
    ) -> Result<u64, RepositoryError> {
        let updated = match expected {
            Some(expected) => {
                db.execute(
                    "UPDATE orders SET status = $1 WHERE id = $2 AND status = $3",
                    &[&status.as_str(), &order_id, &expected.as_str()],
                )
                .await?
            }
            None => {
                db.execute(
                    "UPDATE orders SET status = $1 WHERE id = $2",
                    &[&status.as_str(), &order_id],
                )
                .await?
            }
        };
        Ok(updated)
    }
}

fn order_from_row(row: &Row) -> Result<Order, RepositoryError> {
    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    Ok(Order {
        id: row.try_get("id")?,
        telegram_id: row.try_get("telegram_id")?,
        telegram_username: row.try_get("telegram_username")?,
        name: row.try_get("name")?,
        recipient_name: row.try_get("recipient_name")?,
        contact_type: parse_column(row.try_get("contact_type")?)?,
        contact_value: row.try_get("contact_value")?,
        latitude: row.try_get("latitude")?,
        longitude: row.try_get("longitude")?,
        address_text: row.try_get("address_text")?,
        delivery_date: row.try_get("delivery_date")?,
        delivery_time: row.try_get("delivery_time")?,
        card_text: row.try_get("card_text")?,
        is_anonymous: row.try_get("is_anonymous")?,
        items_total: row.try_get("items_total")?,
        delivery_cost: row.try_get("delivery_cost")?,
        total: row.try_get("total")?,
        status: parse_column(row.try_get("status")?)?,
        created_at,
        items: Vec::new(), // filled by the store
    })
}

/// Parses an enum stored as text.
pub(crate) fn parse_column<T>(value: &str) -> Result<T, RepositoryError>
where
    T: std::str::FromStr<Err = model::ParseEnumError>,
{
    value
        .parse()
        .map_err(|e: model::ParseEnumError| RepositoryError::Decode(e.to_string()))
}

use std::collections::HashMap;

use async_trait::async_trait;
use model::{NewOrderItem, OrderId, OrderItem};
use tokio_postgres::{Client, Transaction};

use crate::RepositoryError;
use crate::orders::parse_column;

/// # ItemsRepository
///
/// Repository interface for the `order_items` table.
///
/// Items are written once together with their order and never updated.
#[async_trait]
pub trait ItemsRepository: Send + Sync {
    async fn insert_tx(&self, tx: &Transaction<'_>, items: &[NewOrderItem], order_id: OrderId) -> Result<(), RepositoryError>;

    /// Items of several orders at once, grouped by order id, in insertion order.
    async fn get_by_order_ids(&self, db: &Client, order_ids: &[OrderId]) -> Result<HashMap<OrderId, Vec<OrderItem>>, RepositoryError>;
}

/// PostgreSQL implementation of the ItemsRepository trait.
#[derive(Debug, Default, Clone, Copy)]
pub struct PgItemsRepository;

impl PgItemsRepository {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ItemsRepository for PgItemsRepository {
    async fn insert_tx(&self, tx: &Transaction<'_>, items: &[NewOrderItem], order_id: OrderId) -> Result<(), RepositoryError> {
        let query = r#"
            INSERT INTO order_items (order_id, product_name, product_photo, size, price, quantity)
            VALUES ($1, $2, $3, $4, $5, $6)
        "#;
        let statement = tx.prepare(query).await?;
        for it in items {
            tx.execute(&statement, &[
                &order_id, &it.product_name, &it.product_photo, &it.size.as_str(), &it.price, &it.quantity,
            ]).await?;
        }
        Ok(())
    }

    async fn get_by_order_ids(&self, db: &Client, order_ids: &[OrderId]) -> Result<HashMap<OrderId, Vec<OrderItem>>, RepositoryError> {
        let mut grouped: HashMap<OrderId, Vec<OrderItem>> = HashMap::new();
        if order_ids.is_empty() {
            return Ok(grouped);
        }

        let query = r#"
            SELECT id, order_id, product_name, product_photo, size, price, quantity
            FROM order_items WHERE order_id = ANY($1)
            ORDER BY id
        "#;
        let rows = db.query(query, &[&order_ids]).await?;
        for row in rows {
            let item = OrderItem {
                id: row.try_get("id")?,
                order_id: row.try_get("order_id")?,
                product_name: row.try_get("product_name")?,
                product_photo: row.try_get("product_photo")?,
                size: parse_column(row.try_get("size")?)?,
                price: row.try_get("price")?,
                quantity: row.try_get("quantity")?,
            };
            grouped.entry(item.order_id).or_default().push(item);
        }
        Ok(grouped)
    }
}

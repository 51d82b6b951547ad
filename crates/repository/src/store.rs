use async_trait::async_trait;
use deadpool_postgres::Pool;
use model::{NewOrder, Order, OrderId, OrderStatus};
use tracing::{debug, instrument};

use crate::{
    CreatedOrder, ItemsRepository, OrderStore, OrdersRepository, PgItemsRepository,
    PgOrdersRepository, RepositoryError,
};

/// PostgreSQL-backed [`OrderStore`].
///
/// Every operation checks out one pooled connection and returns it when the
/// operation finishes, on success and on error alike.
pub struct PgOrderStore<R1 = PgOrdersRepository, R2 = PgItemsRepository> {
    db_pool: Pool,
    orders_repo: R1,
    items_repo: R2,
}

impl PgOrderStore {
    pub fn new(db_pool: Pool) -> Self {
        Self::with_repositories(db_pool, PgOrdersRepository::new(), PgItemsRepository::new())
    }
}

impl<R1, R2> PgOrderStore<R1, R2>
where
    R1: OrdersRepository,
    R2: ItemsRepository,
{
    pub fn with_repositories(db_pool: Pool, orders_repo: R1, items_repo: R2) -> Self {
        Self {
            db_pool,
            orders_repo,
            items_repo,
        }
    }
}

#[async_trait]
impl<R1, R2> OrderStore for PgOrderStore<R1, R2>
where
    R1: OrdersRepository,
    R2: ItemsRepository,
{
    /// The order row is inserted with `RETURNING id` and the items reference that
    /// id inside the same transaction. Dropping the transaction without commit
    /// (any `?` below) rolls everything back.
    #[instrument(skip(self, order), fields(telegram_id = order.telegram_id, items = order.items.len()))]
    async fn create_order_with_items(&self, order: &NewOrder) -> Result<CreatedOrder, RepositoryError> {
        let mut client = self.db_pool.get().await?;
        let tx = client.transaction().await?;

        let Some(order_id) = self.orders_repo.insert_tx(&tx, order).await? else {
            // The requester already used this key. Nothing was written, and the
            // stored order is only handed back if it is the same submission.
            tx.rollback().await?;
            let key = order.idempotency_key.as_deref().unwrap_or_default();
            let mut existing = self
                .orders_repo
                .find_by_idempotency_key(&client, order.telegram_id, key)
                .await?;
            let mut items = self.items_repo.get_by_order_ids(&client, &[existing.id]).await?;
            existing.items = items.remove(&existing.id).unwrap_or_default();

            if !existing.matches_submission(order) {
                debug!(order_id = existing.id, "idempotency key reused for a different order");
                return Err(RepositoryError::IdempotencyKeyReused(existing.id));
            }
            debug!(order_id = existing.id, "order with this idempotency key already exists");
            return Ok(CreatedOrder {
                order_id: existing.id,
                created: false,
            });
        };

        self.items_repo.insert_tx(&tx, &order.items, order_id).await?;
        tx.commit().await?;

        debug!(order_id, "order committed");
        Ok(CreatedOrder { order_id, created: true })
    }

    #[instrument(skip(self))]
    async fn list_orders_for_requester(&self, telegram_id: i64) -> Result<Vec<Order>, RepositoryError> {
        let client = self.db_pool.get().await?;
        let mut orders = self.orders_repo.list_by_telegram_id(&client, telegram_id).await?;

        let ids: Vec<OrderId> = orders.iter().map(|o| o.id).collect();
        let mut items = self.items_repo.get_by_order_ids(&client, &ids).await?;
        for order in &mut orders {
            order.items = items.remove(&order.id).unwrap_or_default();
        }
        Ok(orders)
    }

    #[instrument(skip(self))]
    async fn get_status(&self, order_id: OrderId) -> Result<OrderStatus, RepositoryError> {
        let client = self.db_pool.get().await?;
        self.orders_repo.get_status(&client, order_id).await
    }

    #[instrument(skip(self))]
    async fn update_status(
        &self,
        order_id: OrderId,
        expected: Option<OrderStatus>,
        status: OrderStatus,
    ) -> Result<(), RepositoryError> {
        let client = self.db_pool.get().await?;
        match self.orders_repo.update_status(&client, order_id, expected, status).await? {
            0 => Err(RepositoryError::NotFound),
            _ => Ok(()),
        }
    }
}

//! # Data Repository Layer
//!
//! This crate defines the storage contracts used by the order service
//! ([`OrderStore`], [`CatalogStore`]) and their PostgreSQL implementations.
//! Table-level repositories ([`OrdersRepository`], [`ItemsRepository`]) work on a
//! borrowed client or transaction; [`PgOrderStore`] composes them into the
//! atomic "order with items" operation over a connection pool.

mod catalog;
mod items;
mod orders;
mod store;

use async_trait::async_trait;
use model::{NewOrder, NewProduct, Order, OrderId, OrderStatus, Product, ProductFilter, ProductId};
use thiserror::Error;
use tokio_postgres::error::SqlState;

pub use catalog::PgCatalogStore;
pub use items::{ItemsRepository, PgItemsRepository};
pub use orders::{OrdersRepository, PgOrdersRepository};
pub use store::PgOrderStore;

/// # RepositoryError
///
/// Error types that can occur during repository operations.
///
/// Whatever the variant, a failed write leaves no partial data behind.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database-related errors, wrapping the underlying PostgreSQL error
    #[error("Database error: {0}")]
    Db(#[source] tokio_postgres::Error),
    /// No pooled connection could be obtained.
    #[error("Pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),
    /// No result found.
    #[error("Not found")]
    NotFound,
    /// A schema constraint rejected the write. Mapped from PostgreSQL SQLSTATE
    /// class 23 and 22001; the memory store raises it from its own checks.
    #[error("Constraint violation: {0}")]
    Constraint(String),
    /// The requester already used this idempotency key for a different order.
    #[error("Idempotency key already used for order #{0}")]
    IdempotencyKeyReused(OrderId),
    /// A stored value could not be mapped back onto the model.
    #[error("Decode error: {0}")]
    Decode(String),
}

/// SQLSTATE class 23 (CHECK, NOT NULL, UNIQUE, FOREIGN KEY) plus an
/// over-long value for a VARCHAR column.
fn is_constraint_violation(code: &SqlState) -> bool {
    code.code().starts_with("23") || *code == SqlState::STRING_DATA_RIGHT_TRUNCATION
}

impl From<tokio_postgres::Error> for RepositoryError {
    fn from(err: tokio_postgres::Error) -> Self {
        match err.as_db_error() {
            Some(db) if is_constraint_violation(db.code()) => {
                RepositoryError::Constraint(db.message().to_string())
            }
            _ => RepositoryError::Db(err),
        }
    }
}

/// Result of [`OrderStore::create_order_with_items`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreatedOrder {
    pub order_id: OrderId,
    /// `false` when an order with the same idempotency key already existed and
    /// nothing was written.
    pub created: bool,
}

/// # OrderStore
///
/// Persistence contract for orders and their line items.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Writes the order and every item as one atomic unit and returns the new id.
    ///
    /// Idempotency keys are scoped to the requester (`telegram_id`). A repeated
    /// key returns the existing id with `created = false` only when the stored
    /// order matches the submission, otherwise
    /// [`RepositoryError::IdempotencyKeyReused`]. On error nothing has been
    /// written for this order.
    async fn create_order_with_items(&self, order: &NewOrder) -> Result<CreatedOrder, RepositoryError>;

    /// All orders of one Telegram user, most recent first, items included.
    async fn list_orders_for_requester(&self, telegram_id: i64) -> Result<Vec<Order>, RepositoryError>;

    /// Current status of an order, or [`RepositoryError::NotFound`].
    async fn get_status(&self, order_id: OrderId) -> Result<OrderStatus, RepositoryError>;

    /// Overwrites the status of one order.
    ///
    /// With `expected` set the update only applies while the stored status still
    /// equals it. Zero affected rows yield [`RepositoryError::NotFound`].
    async fn update_status(
        &self,
        order_id: OrderId,
        expected: Option<OrderStatus>,
        status: OrderStatus,
    ) -> Result<(), RepositoryError>;
}

/// # CatalogStore
///
/// Read access to the product catalog, plus initial seeding.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>, RepositoryError>;

    async fn get_product(&self, id: ProductId) -> Result<Product, RepositoryError>;

    /// Inserts `products` only if the catalog is empty. Returns how many were inserted.
    async fn seed_products(&self, products: &[NewProduct]) -> Result<usize, RepositoryError>;
}

//! In-memory implementation of the order and catalog stores.
//!
//! Used as the `memory` store backend for local development and as the
//! store behind the service tests. It enforces the same constraints as the
//! SQL schema, and a failed create leaves no trace: all checks run before
//! anything is inserted, under one write lock.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use model::{
    NewOrder, NewProduct, Order, OrderId, OrderItem, OrderStatus, Product, ProductFilter,
    ProductId,
};
use repository::{CatalogStore, CreatedOrder, OrderStore, RepositoryError};
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Default)]
struct State {
    orders: BTreeMap<OrderId, Order>,
    /// Keyed by `(telegram_id, idempotency_key)`.
    idempotency_keys: HashMap<(i64, String), OrderId>,
    products: BTreeMap<ProductId, Product>,
    next_order_id: OrderId,
    next_item_id: i64,
    next_product_id: ProductId,
}

/// Thread-safe in-memory order and catalog store.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    inner: Arc<RwLock<State>>,
}

impl MemoryStore {
    /// Create a new, empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored orders and order items, for inspection in tests.
    pub async fn row_counts(&self) -> (usize, usize) {
        let state = self.inner.read().await;
        let items = state.orders.values().map(|o| o.items.len()).sum();
        (state.orders.len(), items)
    }

    /// Get a cloned order by id (None if not found).
    pub async fn get(&self, order_id: OrderId) -> Option<Order> {
        self.inner.read().await.orders.get(&order_id).cloned()
    }
}

/// Mirrors the CHECK, NOT NULL and length constraints of the `orders` and
/// `order_items` tables.
fn check_constraints(order: &NewOrder) -> Result<(), RepositoryError> {
    let money = [
        ("items_total", order.items_total),
        ("delivery_cost", order.delivery_cost),
        ("total", order.total),
    ];
    for (column, value) in money {
        if value < 0 {
            return Err(RepositoryError::Constraint(format!("orders.{column} must be >= 0")));
        }
    }

    let lengths = [
        ("recipient_name", Some(order.recipient_name.as_str()), 200),
        ("contact_value", Some(order.contact_value.as_str()), 100),
        ("latitude", Some(order.latitude.as_str()), 50),
        ("longitude", Some(order.longitude.as_str()), 50),
        ("delivery_date", Some(order.delivery_date.as_str()), 50),
        ("delivery_time", Some(order.delivery_time.as_str()), 50),
        ("name", order.name.as_deref(), 200),
        ("telegram_username", order.telegram_username.as_deref(), 100),
        ("idempotency_key", order.idempotency_key.as_deref(), 100),
    ];
    for (column, value, max) in lengths {
        if value.is_some_and(|v| v.chars().count() > max) {
            return Err(RepositoryError::Constraint(format!(
                "orders.{column} longer than {max} characters"
            )));
        }
    }

    for item in &order.items {
        if item.price < 0 {
            return Err(RepositoryError::Constraint("order_items.price must be >= 0".into()));
        }
        if item.quantity <= 0 {
            return Err(RepositoryError::Constraint("order_items.quantity must be > 0".into()));
        }
        if item.product_name.chars().count() > 200 || item.product_photo.chars().count() > 500 {
            return Err(RepositoryError::Constraint(
                "order_items product snapshot too long".into(),
            ));
        }
    }
    Ok(())
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn create_order_with_items(&self, order: &NewOrder) -> Result<CreatedOrder, RepositoryError> {
        let mut state = self.inner.write().await;

        if let Some(key) = &order.idempotency_key {
            let scoped = (order.telegram_id, key.clone());
            if let Some(&order_id) = state.idempotency_keys.get(&scoped) {
                let same = state
                    .orders
                    .get(&order_id)
                    .is_some_and(|existing| existing.matches_submission(order));
                if !same {
                    return Err(RepositoryError::IdempotencyKeyReused(order_id));
                }
                return Ok(CreatedOrder { order_id, created: false });
            }
        }
        check_constraints(order)?;

        state.next_order_id += 1;
        let order_id = state.next_order_id;

        let mut items = Vec::with_capacity(order.items.len());
        for item in &order.items {
            state.next_item_id += 1;
            items.push(OrderItem {
                id: state.next_item_id,
                order_id,
                product_name: item.product_name.clone(),
                product_photo: item.product_photo.clone(),
                size: item.size,
                price: item.price,
                quantity: item.quantity,
            });
        }

        let stored = Order {
            id: order_id,
            telegram_id: order.telegram_id,
            telegram_username: order.telegram_username.clone(),
            name: order.name.clone(),
            recipient_name: order.recipient_name.clone(),
            contact_type: order.contact_type,
            contact_value: order.contact_value.clone(),
            latitude: order.latitude.clone(),
            longitude: order.longitude.clone(),
            address_text: order.address_text.clone(),
            delivery_date: order.delivery_date.clone(),
            delivery_time: order.delivery_time.clone(),
            card_text: order.card_text.clone(),
            is_anonymous: order.is_anonymous,
            items_total: order.items_total,
            delivery_cost: order.delivery_cost,
            total: order.total,
            status: OrderStatus::Pending,
            created_at: Utc::now(),
            items,
        };

        if let Some(key) = &order.idempotency_key {
            state
                .idempotency_keys
                .insert((order.telegram_id, key.clone()), order_id);
        }
        state.orders.insert(order_id, stored);

        debug!(order_id, "order stored in memory");
        Ok(CreatedOrder { order_id, created: true })
    }

    async fn list_orders_for_requester(&self, telegram_id: i64) -> Result<Vec<Order>, RepositoryError> {
        let state = self.inner.read().await;
        let mut orders: Vec<Order> = state
            .orders
            .values()
            .filter(|o| o.telegram_id == telegram_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(orders)
    }

    async fn get_status(&self, order_id: OrderId) -> Result<OrderStatus, RepositoryError> {
        let state = self.inner.read().await;
        state
            .orders
            .get(&order_id)
            .map(|o| o.status)
            .ok_or(RepositoryError::NotFound)
    }

    async fn update_status(
        &self,
        order_id: OrderId,
        expected: Option<OrderStatus>,
        status: OrderStatus,
    ) -> Result<(), RepositoryError> {
        let mut state = self.inner.write().await;
        match state.orders.get_mut(&order_id) {
            Some(order) if expected.is_none_or(|e| e == order.status) => {
                order.status = status;
                Ok(())
            }
            _ => Err(RepositoryError::NotFound),
        }
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn list_products(&self, filter: &ProductFilter) -> Result<Vec<Product>, RepositoryError> {
        let state = self.inner.read().await;
        Ok(state
            .products
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect())
    }

    async fn get_product(&self, id: ProductId) -> Result<Product, RepositoryError> {
        let state = self.inner.read().await;
        state.products.get(&id).cloned().ok_or(RepositoryError::NotFound)
    }

    async fn seed_products(&self, products: &[NewProduct]) -> Result<usize, RepositoryError> {
        let mut state = self.inner.write().await;
        if !state.products.is_empty() {
            return Ok(0);
        }
        for p in products {
            state.next_product_id += 1;
            let id = state.next_product_id;
            state.products.insert(
                id,
                Product {
                    id,
                    name: p.name.clone(),
                    category: p.category.clone(),
                    description: p.description.clone(),
                    price: p.price,
                    photo_url: p.photo_url.clone(),
                    is_available: true,
                    is_popular: p.is_popular,
                    is_express: p.is_express,
                    created_at: Utc::now(),
                },
            );
        }
        Ok(products.len())
    }
}

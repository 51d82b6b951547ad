//! Business logic layer for order management.
//!
//! This module defines the [`OrderService`] trait and its async implementation [`OrderServiceImpl`].
//! A submission runs validate → persist atomically → notify, in that order:
//!
//! - validation failures return before the store is touched;
//! - store failures return before any notification is attempted;
//! - notification failures are logged by the dispatcher and never reach the caller,
//!   the order counts as placed once it is committed.

pub mod validation;

use std::sync::Arc;

use async_trait::async_trait;
use model::{Order, OrderId, OrderRequest, OrderStatus};
use notifier::NotificationDispatcher;
use repository::{OrderStore, RepositoryError};
use thiserror::Error;
use tracing::{info, instrument, warn};

pub use validation::ValidationError;

/// Acknowledgement returned to the customer after a successful submission.
pub const ORDER_ACCEPTED_MESSAGE: &str = "Order accepted! Please wait for confirmation.";

/// The main error type for all operations in [`OrderService`] and [`OrderServiceImpl`].
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The request is malformed; nothing was written.
    #[error("Invalid order: {0}")]
    Validation(#[from] ValidationError),
    /// The store could not complete the operation; nothing was written.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[source] RepositoryError),
    /// No order with this id.
    #[error("Order #{0} not found")]
    NotFound(OrderId),
    /// The status string is not a known status.
    #[error("Unknown order status '{0}'")]
    InvalidStatus(String),
    /// The state machine does not allow this change.
    #[error("Cannot change order status from {from} to {to}")]
    IllegalTransition { from: OrderStatus, to: OrderStatus },
    /// The status changed concurrently between read and update.
    #[error("Order #{0} was modified concurrently")]
    Conflict(OrderId),
    /// The requester already placed a different order under this idempotency key.
    #[error("Idempotency key already used for order #{0}")]
    IdempotencyKeyReused(OrderId),
}

impl From<RepositoryError> for ServiceError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::IdempotencyKeyReused(order_id) => {
                ServiceError::IdempotencyKeyReused(order_id)
            }
            other => ServiceError::StoreUnavailable(other),
        }
    }
}

/// Outcome of an accepted submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSubmission {
    pub order_id: OrderId,
    pub message: String,
}

/// Business rules that deployments may switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderPolicy {
    /// Reject status changes outside the order state machine.
    pub enforce_status_transitions: bool,
    /// Reject submissions whose totals do not add up.
    pub verify_totals: bool,
}

impl Default for OrderPolicy {
    fn default() -> Self {
        Self {
            enforce_status_transitions: true,
            verify_totals: false,
        }
    }
}

/// Trait describing business operations for order management.
#[async_trait]
pub trait OrderService: Send + Sync {
    /// Validates, persists and announces a new order.
    ///
    /// # Errors
    /// Returns [`ServiceError::Validation`] if the request is rejected,
    /// [`ServiceError::IdempotencyKeyReused`] if the requester's key belongs to a
    /// different order and [`ServiceError::StoreUnavailable`] if it could not be
    /// persisted. Notification problems are never reported here.
    async fn submit_order(&self, request: &OrderRequest) -> Result<OrderSubmission, ServiceError>;

    /// Orders of a Telegram user, most recent first.
    async fn list_orders(&self, telegram_id: i64) -> Result<Vec<Order>, ServiceError>;

    /// Changes the status of an order and returns the new status.
    ///
    /// # Errors
    /// [`ServiceError::NotFound`] for an unknown id, [`ServiceError::InvalidStatus`]
    /// for an unknown status, [`ServiceError::IllegalTransition`] when the policy
    /// enforces the state machine.
    async fn set_status(&self, order_id: OrderId, status: &str) -> Result<OrderStatus, ServiceError>;
}

/// [`OrderService`] over any [`OrderStore`].
pub struct OrderServiceImpl<S: ?Sized> {
    store: Arc<S>,
    dispatcher: NotificationDispatcher,
    policy: OrderPolicy,
}

impl<S> OrderServiceImpl<S>
where
    S: OrderStore + ?Sized,
{
    /// Constructs a new [`OrderServiceImpl`] from the provided dependencies.
    pub fn new(store: Arc<S>, dispatcher: NotificationDispatcher, policy: OrderPolicy) -> Self {
        Self {
            store,
            dispatcher,
            policy,
        }
    }
}

fn not_found_as(order_id: OrderId) -> impl Fn(RepositoryError) -> ServiceError {
    move |err| match err {
        RepositoryError::NotFound => ServiceError::NotFound(order_id),
        other => ServiceError::StoreUnavailable(other),
    }
}

#[async_trait]
impl<S> OrderService for OrderServiceImpl<S>
where
    S: OrderStore + ?Sized,
{
    #[instrument(skip(self, request), fields(telegram_id = ?request.telegram_id))]
    async fn submit_order(&self, request: &OrderRequest) -> Result<OrderSubmission, ServiceError> {
        let order = validation::validate(request).inspect_err(|e| {
            info!(field = %e.field(), "order rejected: {}", e);
        })?;
        if self.policy.verify_totals {
            validation::verify_totals(&order)?;
        }

        let created = self.store.create_order_with_items(&order).await.inspect_err(|e| {
            warn!(error = %e, "failed to persist order");
        })?;

        if created.created {
            info!(order_id = created.order_id, items = order.items.len(), "order created");
            self.dispatcher.dispatch(created.order_id, &order).await;
        } else {
            info!(order_id = created.order_id, "duplicate submission, returning existing order");
        }

        Ok(OrderSubmission {
            order_id: created.order_id,
            message: ORDER_ACCEPTED_MESSAGE.to_string(),
        })
    }

    #[instrument(skip(self))]
    async fn list_orders(&self, telegram_id: i64) -> Result<Vec<Order>, ServiceError> {
        Ok(self.store.list_orders_for_requester(telegram_id).await?)
    }

    #[instrument(skip(self))]
    async fn set_status(&self, order_id: OrderId, status: &str) -> Result<OrderStatus, ServiceError> {
        let next: OrderStatus = status
            .trim()
            .parse()
            .map_err(|_| ServiceError::InvalidStatus(status.to_string()))?;

        if !self.policy.enforce_status_transitions {
            self.store
                .update_status(order_id, None, next)
                .await
                .map_err(not_found_as(order_id))?;
            info!(order_id, status = %next, "order status overwritten");
            return Ok(next);
        }

        let current = self
            .store
            .get_status(order_id)
            .await
            .map_err(not_found_as(order_id))?;
        if !current.can_transition_to(next) {
            return Err(ServiceError::IllegalTransition {
                from: current,
                to: next,
            });
        }

        self.store
            .update_status(order_id, Some(current), next)
            .await
            .map_err(|err| match err {
                RepositoryError::NotFound => ServiceError::Conflict(order_id),
                other => ServiceError::StoreUnavailable(other),
            })?;

        info!(order_id, from = %current, to = %next, "order status changed");
        Ok(next)
    }
}

//! New-order notifications for the shop operator.
//!
//! [`NotificationDispatcher`] is the boundary the order service talks to. It
//! makes at most one delivery attempt per order and never returns an error:
//! failures are logged and dropped, so a persisted order is never affected by
//! the messaging endpoint being down.

mod format;
mod telegram;

use std::sync::Arc;

use async_trait::async_trait;
use model::{NewOrder, OrderId};
use thiserror::Error;
use tracing::{error, info, warn};

pub use format::{customer_message, escape_html, format_order_message, format_price};
pub use telegram::TelegramNotifier;

/// Errors produced while delivering a notification.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The endpoint could not be reached or the request timed out.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The endpoint answered with a non-success status.
    #[error("endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
    /// The notifier is misconfigured.
    #[error("configuration error: {0}")]
    Config(String),
}

/// A channel that can announce a freshly persisted order.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, order_id: OrderId, order: &NewOrder) -> Result<(), NotifyError>;
}

/// Best-effort wrapper around an optional [`Notifier`].
#[derive(Clone)]
pub struct NotificationDispatcher {
    notifier: Option<Arc<dyn Notifier>>,
}

impl NotificationDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            notifier: Some(notifier),
        }
    }

    /// A dispatcher that only logs that notifications are off.
    pub fn disabled() -> Self {
        Self { notifier: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.notifier.is_some()
    }

    /// Announces the order. Errors are logged here and go no further.
    pub async fn dispatch(&self, order_id: OrderId, order: &NewOrder) {
        let Some(notifier) = &self.notifier else {
            warn!(order_id, "notifications are not configured, order #{} not announced", order_id);
            return;
        };

        match notifier.notify(order_id, order).await {
            Ok(()) => info!(order_id, "notification for order #{} sent", order_id),
            Err(e) => error!(order_id, error = %e, "failed to send notification for order #{}", order_id),
        }
    }
}
